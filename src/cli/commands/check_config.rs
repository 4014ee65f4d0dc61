//! check-config command - Validate and print the resolved configuration

use std::fmt::Write as _;

use anyhow::{Context as _, Result};

use crate::core::config::{Config, ConfigError};
use crate::forge::ForgeProvider;
use crate::manifest::resolve_managers;

/// Print the resolved configuration, failing on anything unresolvable.
pub fn check_config(config: &Config) -> Result<()> {
    let text = describe(config).context("Configuration is invalid")?;
    print!("{}", text);
    println!("configuration ok");
    Ok(())
}

/// Render every resolved setting. Secrets are shown only as set/unset.
pub fn describe(config: &Config) -> Result<String, ConfigError> {
    let provider_name = config.remote_provider_name()?;
    let provider = ForgeProvider::parse(provider_name).ok_or_else(|| ConfigError::Unsupported {
        kind: "remote provider",
        name: provider_name.to_string(),
        available: crate::forge::valid_forge_names().to_vec(),
    })?;
    let forge = match provider {
        ForgeProvider::GitLab => config.gitlab()?,
        ForgeProvider::GitHub => config.github()?,
    };
    let git = config.git()?;
    let request = config.request();
    let scheduler = config.scheduler();
    let registry = config.registry();
    let managers: Vec<_> = resolve_managers(&config.manager_names())?
        .iter()
        .map(|m| m.name())
        .collect();

    let mut out = String::new();
    let path = config
        .path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<inline>".to_string());
    // Writing to a String cannot fail.
    let _ = writeln!(out, "source:               {}", path);
    let _ = writeln!(out, "remote_provider:      {}", provider);
    let _ = writeln!(out, "  url:                {}", forge.url);
    let _ = writeln!(out, "  token:              {}", set_or_unset(&forge.token));
    let _ = writeln!(out, "  timeout:            {}s", forge.timeout.as_secs());
    let _ = writeln!(out, "policy:               {}", config.policy_name());
    let _ = writeln!(out, "managers:             {}", managers.join(", "));
    let _ = writeln!(out, "filter_tag:           {}", scheduler.filter_tag);
    let _ = writeln!(out, "poll_interval:        {}s", scheduler.poll_interval.as_secs());
    let _ = writeln!(out, "max_concurrent:       {}", scheduler.max_concurrent);
    let _ = writeln!(out, "repo_timeout:         {}s", scheduler.repo_timeout.as_secs());
    let _ = writeln!(out, "strict_apply:         {}", scheduler.strict_apply);
    let _ = writeln!(out, "git.branch:           {}", git.branch);
    let _ = writeln!(out, "git.commit_prefix:    {}", git.commit_prefix);
    let _ = writeln!(
        out,
        "git.author:           {} <{}>",
        git.author.name, git.author.email
    );
    let _ = writeln!(out, "git.auth.username:    {}", git.credentials.username);
    let _ = writeln!(
        out,
        "git.auth.password:    {}",
        set_or_unset(&git.credentials.password)
    );
    let _ = writeln!(out, "request.title:        {}", request.title);
    let _ = writeln!(out, "request.remove_branch: {}", request.remove_source_branch);
    let _ = writeln!(out, "request.squash:       {}", request.squash);
    let _ = writeln!(out, "registry.url:         {}", registry.url);
    let _ = writeln!(out, "log_level:            {}", config.log_level());
    Ok(out)
}

fn set_or_unset(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<set>"
    }
}
