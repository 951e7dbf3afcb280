//! Typed failures surfaced by the reconciler.
//!
//! Everything propagates as `anyhow::Error`; these variants sit at the root of
//! the chain so callers can tell the failure classes apart with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::context::Phase;

const SYNC_FORK_DOCS: &str = "https://docs.github.com/en/pull-requests/collaborating-with-pull-requests/working-with-forks/syncing-a-fork";

#[derive(Debug, Error)]
pub enum ForkflowError {
    /// Malformed arguments; nothing has been touched yet.
    #[error("usage: {0}")]
    Usage(String),

    #[error("required tool '{tool}' not found on PATH")]
    MissingDependency { tool: String },

    #[error("`{command}` failed (exit code {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error(
        "cannot merge upstream/{branch} into {owner}/{repo} automatically; the merge was aborted.\n\
         Resolve the divergence by hand (fetch upstream, merge {branch}, fix conflicts, push), then rerun.\n\
         See {docs}",
        docs = SYNC_FORK_DOCS
    )]
    MergeConflict {
        owner: String,
        repo: String,
        branch: String,
    },

    #[error("fork request for {repo} failed: {reason}")]
    ForkRequestFailed { repo: String, reason: String },

    #[error("{} exists but is not a clean checkout of {expected_url}", .path.display())]
    DestinationOccupied { path: PathBuf, expected_url: String },

    #[error("reconciliation context field '{0}' was already recorded")]
    ContextFieldRewritten(&'static str),

    #[error("reconciliation step {to:?} cannot follow {from:?}")]
    PhaseOutOfOrder { from: Phase, to: Phase },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_conflict_names_fork_and_docs() {
        let err = ForkflowError::MergeConflict {
            owner: "alice".to_string(),
            repo: "widgets".to_string(),
            branch: "main".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("alice/widgets"));
        assert!(msg.contains("aborted"));
        assert!(msg.contains(SYNC_FORK_DOCS));
    }
}
