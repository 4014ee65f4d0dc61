//! policy::simple
//!
//! Move every dependency to its latest release, majors included.

use async_trait::async_trait;

use super::{decide_with, UpdatePolicy};
use crate::core::types::{DependencySet, UpdateDecision};
use crate::manifest::DependencyManager;
use crate::registry::LookupError;

/// Include a dependency iff its latest release is newer than the current version.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplePolicy;

#[async_trait]
impl UpdatePolicy for SimplePolicy {
    fn name(&self) -> &'static str {
        "simple"
    }

    // TODO: support a max-bump threshold (e.g. "minor") once configurable per repo
    async fn decide(
        &self,
        deps: &DependencySet,
        manager: &dyn DependencyManager,
    ) -> Result<UpdateDecision, LookupError> {
        decide_with(deps, manager, |_, _| true).await
    }
}
