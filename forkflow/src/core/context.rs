//! Run-time facts discovered while reconciling, plus the forward-only phase.

use std::path::{Path, PathBuf};

use crate::core::clone_policy::CloneDecision;
use crate::error::ForkflowError;

/// Position in the fixed step sequence. Phases never move backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Start,
    ForkChecked,
    CloneDecided,
    Cloned,
    UpstreamTracked,
    Synced,
    Branched,
    PushBound,
    Done,
}

/// Mutable state threaded through every step.
///
/// `workdir` is the current working context: it starts as the invocation
/// directory and moves into the clone once one is made. Every other field is
/// recorded exactly once by the step that discovers it, and later steps read
/// their inputs back from here.
#[derive(Debug, Clone)]
pub struct ReconciliationContext {
    workdir: PathBuf,
    /// Phases entered so far, strictly increasing; optional phases may be absent.
    trail: Vec<Phase>,
    was_already_forked: Option<bool>,
    clone_decision: Option<CloneDecision>,
    current_remote_url: Option<Option<String>>,
    working_dir_clean: Option<bool>,
    main_branch: Option<String>,
}

impl ReconciliationContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            trail: vec![Phase::Start],
            was_already_forked: None,
            clone_decision: None,
            current_remote_url: None,
            working_dir_clean: None,
            main_branch: None,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn phase(&self) -> Phase {
        self.trail.last().copied().unwrap_or(Phase::Start)
    }

    /// True if the run passed through `phase`.
    pub fn reached(&self, phase: Phase) -> bool {
        self.trail.contains(&phase)
    }

    /// Enter `next`, which must come strictly after the current phase.
    pub fn advance(&mut self, next: Phase) -> Result<(), ForkflowError> {
        let from = self.phase();
        if next <= from {
            return Err(ForkflowError::PhaseOutOfOrder { from, to: next });
        }
        self.trail.push(next);
        Ok(())
    }

    /// Switch the working context (after a clone, or when reusing a sibling checkout).
    pub fn enter(&mut self, dir: impl Into<PathBuf>) {
        self.workdir = dir.into();
    }

    pub fn record_fork_state(&mut self, was_already_forked: bool) -> Result<(), ForkflowError> {
        set_once(&mut self.was_already_forked, was_already_forked, "was_already_forked")
    }

    pub fn record_clone_decision(&mut self, decision: CloneDecision) -> Result<(), ForkflowError> {
        set_once(&mut self.clone_decision, decision, "clone_decision")
    }

    /// `None` records that the directory had no `origin` (or no repository).
    pub fn record_remote_url(&mut self, url: Option<String>) -> Result<(), ForkflowError> {
        set_once(&mut self.current_remote_url, url, "current_remote_url")
    }

    pub fn record_working_dir_clean(&mut self, clean: bool) -> Result<(), ForkflowError> {
        set_once(&mut self.working_dir_clean, clean, "working_dir_clean")
    }

    pub fn record_main_branch(&mut self, branch: String) -> Result<(), ForkflowError> {
        set_once(&mut self.main_branch, branch, "main_branch")
    }

    pub fn was_already_forked(&self) -> Option<bool> {
        self.was_already_forked
    }

    pub fn clone_decision(&self) -> Option<CloneDecision> {
        self.clone_decision
    }

    pub fn current_remote_url(&self) -> Option<&str> {
        self.current_remote_url.as_ref().and_then(|url| url.as_deref())
    }

    pub fn working_dir_clean(&self) -> Option<bool> {
        self.working_dir_clean
    }

    pub fn main_branch(&self) -> Option<&str> {
        self.main_branch.as_deref()
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), ForkflowError> {
    if slot.is_some() {
        return Err(ForkflowError::ContextFieldRewritten(field));
    }
    *slot = Some(value);
    Ok(())
}
