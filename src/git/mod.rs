//! git
//!
//! Single interface for all Git operations.
//!
//! # Architecture
//!
//! This module is the **only doorway** to Git: no other module imports
//! `git2`, and nothing shells out to the git CLI.
//!
//! Each repository run gets its own [`GitWorkflow`], an isolated clone in
//! a temporary directory that is driven through a strict state machine
//! and deleted when the workflow is dropped.
//!
//! # Example
//!
//! ```ignore
//! use upkeep::git::GitWorkflow;
//!
//! let mut wf = GitWorkflow::new(settings.credentials.clone());
//! wf.clone(&repository)?;
//! wf.branch_from_default(&settings.branch)?;
//! let manifest = wf.read_file("go.mod")?;
//! wf.commit("go.mod", &updated, &settings.author, &message)?;
//! wf.push()?;
//! ```

mod workflow;

pub use workflow::{GitError, GitWorkflow, WorkflowState};
