//! policy::compatible
//!
//! Only updates that stay within the current semver-compatible range:
//! same major for `>= 1.0.0`, same minor for `0.x`.

use async_trait::async_trait;
use semver::Version;

use super::{decide_with, UpdatePolicy};
use crate::core::types::{DependencySet, UpdateDecision};
use crate::manifest::DependencyManager;
use crate::registry::LookupError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CompatiblePolicy;

/// Whether `candidate` is semver-compatible with `current`.
pub fn is_compatible(current: &Version, candidate: &Version) -> bool {
    match current.major {
        0 => candidate.major == 0 && candidate.minor == current.minor,
        major => candidate.major == major,
    }
}

#[async_trait]
impl UpdatePolicy for CompatiblePolicy {
    fn name(&self) -> &'static str {
        "compatible"
    }

    async fn decide(
        &self,
        deps: &DependencySet,
        manager: &dyn DependencyManager,
    ) -> Result<UpdateDecision, LookupError> {
        decide_with(deps, manager, is_compatible).await
    }
}
