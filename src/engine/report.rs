//! engine::report
//!
//! Per-batch reporting: what happened to every repository in one pass.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::pipeline::{PipelineError, RunOutcome, Step};

/// Result of one repository run within a batch.
#[derive(Debug, Clone)]
pub struct RepoReport {
    pub repository: String,
    pub outcome: Result<RunOutcome, PipelineError>,
}

impl RepoReport {
    pub fn new(repository: impl Into<String>, outcome: Result<RunOutcome, PipelineError>) -> Self {
        Self {
            repository: repository.into(),
            outcome,
        }
    }
}

/// Everything one batch did.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<RepoReport>,
    /// Set when the candidate listing failed and no repository was processed
    pub listing_error: Option<String>,
}

impl BatchReport {
    pub(crate) fn start() -> Self {
        let now = Utc::now();
        Self {
            batch_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            entries: Vec::new(),
            listing_error: None,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.entries.sort_by(|a, b| a.repository.cmp(&b.repository));
        self
    }

    pub fn processed(&self) -> usize {
        self.entries.len()
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::Updated { .. }))
    }

    pub fn up_to_date(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::UpToDate))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::AlreadyPending))
    }

    /// Repositories without a supported manifest.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RunOutcome::NoManifest))
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_err()).count()
    }

    /// Whether every repository run (and the listing) succeeded.
    pub fn is_clean(&self) -> bool {
        self.listing_error.is_none() && self.failed() == 0
    }

    pub fn get(&self, repository: &str) -> Option<&RepoReport> {
        self.entries.iter().find(|e| e.repository == repository)
    }

    fn count(&self, pred: impl Fn(&RunOutcome) -> bool) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.as_ref().map(&pred).unwrap_or(false))
            .count()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_id: self.batch_id,
            started_at: self.started_at,
            duration_ms: (self.finished_at - self.started_at).num_milliseconds(),
            processed: self.processed(),
            updated: self.updated(),
            up_to_date: self.up_to_date(),
            pending: self.pending(),
            skipped: self.skipped(),
            failed: self.failed(),
            listing_error: self.listing_error.clone(),
            failures: self
                .entries
                .iter()
                .filter_map(|e| {
                    e.outcome.as_ref().err().map(|err| FailureSummary {
                        repository: e.repository.clone(),
                        step: err.step,
                        error: err.source.to_string(),
                    })
                })
                .collect(),
        }
    }

    /// Emit the batch summary through tracing.
    pub fn log(&self) {
        let summary = self.summary();
        let json = serde_json::to_string(&summary).unwrap_or_default();
        if self.is_clean() {
            info!(
                batch = %self.batch_id,
                processed = summary.processed,
                updated = summary.updated,
                summary = %json,
                "batch complete"
            );
        } else {
            warn!(
                batch = %self.batch_id,
                processed = summary.processed,
                failed = summary.failed,
                summary = %json,
                "batch complete with failures"
            );
        }
    }
}

/// Serializable digest of a [`BatchReport`].
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub processed: usize,
    pub updated: usize,
    pub up_to_date: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing_error: Option<String>,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub repository: String,
    pub step: Step,
    pub error: String,
}
