//! policy
//!
//! Update policies: which dependencies move, and to what version.
//!
//! # Contract
//!
//! [`UpdatePolicy::decide`] looks up the latest release of every dependency
//! through the manager and returns an [`UpdateDecision`] that:
//!
//! - only names dependencies present in the input set
//! - only contains entries whose target differs from (is newer than) the
//!   current version
//! - keeps the input's declaration order
//!
//! A failed lookup aborts the whole decision. Nothing is applied from a
//! partial result. A dependency without any stable release is left out.
//!
//! Versions are compared by semver precedence; build metadata is ignored.
//!
//! # Policies
//!
//! - [`simple`]: any newer release qualifies
//! - [`compatible`]: only releases within the current semver-compatible range

pub mod compatible;
pub mod simple;

pub use compatible::CompatiblePolicy;
pub use simple::SimplePolicy;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tracing::{debug, warn};

use crate::core::config::ConfigError;
use crate::core::types::{DependencySet, PlannedUpdate, UpdateDecision};
use crate::manifest::DependencyManager;
use crate::registry::LookupError;

/// Decision function over a parsed dependency set.
#[async_trait]
pub trait UpdatePolicy: Send + Sync {
    /// Policy name as used in configuration.
    fn name(&self) -> &'static str;

    /// Decide which dependencies to update.
    async fn decide(
        &self,
        deps: &DependencySet,
        manager: &dyn DependencyManager,
    ) -> Result<UpdateDecision, LookupError>;
}

/// Look up every dependency and keep the newer releases `accept` allows.
pub(crate) async fn decide_with<F>(
    deps: &DependencySet,
    manager: &dyn DependencyManager,
    accept: F,
) -> Result<UpdateDecision, LookupError>
where
    F: Fn(&Version, &Version) -> bool + Send + Sync,
{
    let mut decision = UpdateDecision::new();
    for dep in deps {
        let Some(latest) = manager.latest_version(dep).await? else {
            debug!(dependency = %dep.name, "no stable release, skipping");
            continue;
        };
        if latest.cmp_precedence(&dep.version) == Ordering::Greater
            && accept(&dep.version, &latest)
        {
            debug!(dependency = %dep.name, from = %dep.version, to = %latest, "update available");
            decision.push(PlannedUpdate {
                name: dep.name.clone(),
                from: dep.version.clone(),
                to: latest,
            });
        }
    }
    Ok(decision)
}

/// Create a policy by configured name.
///
/// An empty name selects `simple` with a warning.
///
/// # Errors
///
/// `ConfigError::Unsupported` for an unknown name.
pub fn create_policy(name: &str) -> Result<Arc<dyn UpdatePolicy>, ConfigError> {
    let normalized = name.trim().to_lowercase();
    match normalized.as_str() {
        "" => {
            warn!("no update policy configured, using simple");
            Ok(Arc::new(SimplePolicy))
        }
        "simple" => Ok(Arc::new(SimplePolicy)),
        "compatible" => Ok(Arc::new(CompatiblePolicy)),
        _ => Err(ConfigError::Unsupported {
            kind: "policy",
            name: name.to_string(),
            available: valid_policy_names().to_vec(),
        }),
    }
}

/// Valid policy names for configuration validation.
pub fn valid_policy_names() -> &'static [&'static str] {
    &["simple", "compatible"]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use semver::Version;

    use crate::core::types::{Dependency, DependencySet};
    use crate::manifest::GoModManager;
    use crate::registry::StaticVersionSource;

    pub fn set(entries: &[(&str, &str)]) -> DependencySet {
        let mut deps = DependencySet::new();
        for (name, version) in entries {
            deps.push(Dependency::new(*name, Version::parse(version).unwrap()))
                .unwrap();
        }
        deps
    }

    pub fn manager(latest: &[(&str, &str)]) -> GoModManager {
        manager_from(latest.iter().fold(StaticVersionSource::new(), |s, (n, v)| s.with(n, v)))
    }

    pub fn manager_from(source: StaticVersionSource) -> GoModManager {
        GoModManager::new(Arc::new(source))
    }
}
