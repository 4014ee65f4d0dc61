//! manifest::gomod
//!
//! Go module manifest (`go.mod`).
//!
//! # Format handling
//!
//! The file is kept as its original lines. Parsing records, for every
//! `require` entry, the line it sits on and the byte range of its version
//! token; mutation rewrites only that range. Everything else, including
//! comments, spacing, line endings and other directives, is written back
//! untouched.
//!
//! Recognized forms:
//!
//! ```text
//! require github.com/pkg/errors v0.9.1
//! require (
//!     golang.org/x/mod v0.14.0
//!     golang.org/x/sys v0.15.0 // indirect
//! )
//! ```
//!
//! Entries marked `// indirect` are tracked but not reported as
//! dependencies. Versions lose their leading `v` for semver comparison
//! and get it back when written.

use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use tracing::debug;

use super::{DependencyManager, ManifestError};
use crate::core::types::{Dependency, DependencySet};
use crate::registry::{LookupError, VersionSource};

/// Manifest file name.
pub const GO_MOD: &str = "go.mod";

/// Ecosystem name used for registry lookups.
const ECOSYSTEM: &str = "go";

/// Go modules dependency manager.
pub struct GoModManager {
    source: Arc<dyn VersionSource>,
    document: Option<GoModDocument>,
}

impl std::fmt::Debug for GoModManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoModManager")
            .field("parsed", &self.document.is_some())
            .finish()
    }
}

/// Parsed file: raw lines plus the location of every requirement.
#[derive(Debug, Clone)]
struct GoModDocument {
    lines: Vec<String>,
    requires: Vec<Requirement>,
}

#[derive(Debug, Clone)]
struct Requirement {
    path: String,
    version: Version,
    indirect: bool,
    line: usize,
    /// Byte range of the version token (including its `v`) within the line
    span: Range<usize>,
}

impl GoModManager {
    pub fn new(source: Arc<dyn VersionSource>) -> Self {
        Self {
            source,
            document: None,
        }
    }
}

#[async_trait]
impl DependencyManager for GoModManager {
    fn name(&self) -> &'static str {
        "go"
    }

    fn manifest_file_name(&self) -> &'static str {
        GO_MOD
    }

    fn parse(&mut self, contents: &[u8]) -> Result<DependencySet, ManifestError> {
        let document = GoModDocument::parse(contents)?;

        let mut deps = DependencySet::new();
        for req in document.requires.iter().filter(|r| !r.indirect) {
            // duplicates were rejected while parsing
            let _ = deps.push(Dependency::new(req.path.clone(), req.version.clone()));
        }
        debug!(
            direct = deps.len(),
            indirect = document.requires.len() - deps.len(),
            "parsed go.mod"
        );

        self.document = Some(document);
        Ok(deps)
    }

    async fn latest_version(&self, dep: &Dependency) -> Result<Option<Version>, LookupError> {
        self.source.latest_release(ECOSYSTEM, &dep.name).await
    }

    fn mutate(&mut self, dep: &Dependency) -> Result<(), ManifestError> {
        let document = self
            .document
            .as_mut()
            .ok_or_else(|| ManifestError::NotFound(dep.name.clone()))?;
        document.set_version(dep)
    }

    fn serialize(&self) -> Result<Vec<u8>, ManifestError> {
        let document = self.document.as_ref().ok_or_else(|| ManifestError::Serialize {
            file: GO_MOD,
            message: "no manifest has been parsed".to_string(),
        })?;
        Ok(document.lines.concat().into_bytes())
    }
}

/// Block the parser is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    None,
    Require,
    /// `replace (`, `exclude (`, `retract (` and friends
    Other,
}

impl GoModDocument {
    fn parse(contents: &[u8]) -> Result<Self, ManifestError> {
        let text = std::str::from_utf8(contents).map_err(|e| ManifestError::Parse {
            file: GO_MOD,
            message: e.to_string(),
        })?;
        let lines: Vec<String> = text.split_inclusive('\n').map(str::to_string).collect();

        let mut requires = Vec::new();
        let mut seen = HashSet::new();
        let mut block = Block::None;
        let mut block_start = 0;

        for (index, raw) in lines.iter().enumerate() {
            let (content, comment) = split_comment(raw);
            let trimmed = content.trim();

            match block {
                Block::Require | Block::Other => {
                    if trimmed == ")" {
                        block = Block::None;
                    } else if block == Block::Require && !trimmed.is_empty() {
                        let req = parse_requirement(index, raw, content, comment)?;
                        push_unique(&mut requires, &mut seen, req)?;
                    }
                }
                Block::None => {
                    let mut words = trimmed.splitn(2, char::is_whitespace);
                    let directive = words.next().unwrap_or("");
                    let rest = words.next().unwrap_or("").trim();

                    if rest == "(" {
                        block = if directive == "require" {
                            Block::Require
                        } else {
                            Block::Other
                        };
                        block_start = index;
                    } else if directive == "require" {
                        if rest == "()" {
                            continue;
                        }
                        let offset = content.len() - content.trim_start().len() + "require".len();
                        let req = parse_requirement_at(index, raw, content, offset, comment)?;
                        push_unique(&mut requires, &mut seen, req)?;
                    }
                }
            }
        }

        if block != Block::None {
            return Err(parse_error(block_start, "unterminated block".to_string()));
        }

        Ok(Self { lines, requires })
    }

    fn set_version(&mut self, dep: &Dependency) -> Result<(), ManifestError> {
        let req = self
            .requires
            .iter_mut()
            .find(|r| !r.indirect && r.path == dep.name)
            .ok_or_else(|| ManifestError::NotFound(dep.name.clone()))?;

        let token = format!("v{}", dep.version);
        let line = &mut self.lines[req.line];
        line.replace_range(req.span.clone(), &token);
        req.span = req.span.start..req.span.start + token.len();
        req.version = dep.version.clone();
        Ok(())
    }
}

fn parse_error(index: usize, message: String) -> ManifestError {
    ManifestError::Parse {
        file: GO_MOD,
        message: format!("line {}: {}", index + 1, message),
    }
}

/// Split a line into its content and the text of a trailing `//` comment.
fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.find("//") {
        Some(pos) => (&line[..pos], Some(line[pos + 2..].trim())),
        None => (line.trim_end_matches(['\r', '\n']), None),
    }
}

/// Whether a comment marks the requirement as indirect.
fn is_indirect(comment: Option<&str>) -> bool {
    comment.is_some_and(|c| c == "indirect" || c.starts_with("indirect;"))
}

fn parse_requirement(
    index: usize,
    raw: &str,
    content: &str,
    comment: Option<&str>,
) -> Result<Requirement, ManifestError> {
    parse_requirement_at(index, raw, content, 0, comment)
}

/// Parse `path version` starting at byte `offset` of `content`.
fn parse_requirement_at(
    index: usize,
    raw: &str,
    content: &str,
    offset: usize,
    comment: Option<&str>,
) -> Result<Requirement, ManifestError> {
    let body = &content[offset..];
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let (path, version_token) = match tokens.as_slice() {
        [path, version] => (*path, *version),
        [path] => {
            return Err(parse_error(
                index,
                format!("requirement '{}' has no version", path),
            ))
        }
        _ => {
            return Err(parse_error(
                index,
                format!("malformed requirement '{}'", body.trim()),
            ))
        }
    };

    let path = path.trim_matches('"').to_string();
    let Some(bare) = version_token.strip_prefix('v') else {
        return Err(parse_error(
            index,
            format!("version '{}' of {} must start with 'v'", version_token, path),
        ));
    };
    let version = Version::parse(bare).map_err(|e| {
        parse_error(
            index,
            format!("invalid version '{}' of {}: {}", version_token, path, e),
        )
    })?;

    // The version is the last token before any comment
    let end = content.trim_end().len();
    let start = end - version_token.len();
    debug_assert_eq!(&raw[start..end], version_token);

    Ok(Requirement {
        path,
        version,
        indirect: is_indirect(comment),
        line: index,
        span: start..end,
    })
}

fn push_unique(
    requires: &mut Vec<Requirement>,
    seen: &mut HashSet<String>,
    req: Requirement,
) -> Result<(), ManifestError> {
    if !seen.insert(req.path.clone()) {
        return Err(parse_error(
            req.line,
            format!("duplicate requirement for {}", req.path),
        ));
    }
    requires.push(req);
    Ok(())
}
