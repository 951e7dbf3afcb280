//! Orchestration of the fork → clone → track → sync → branch → bind sequence.
//!
//! Each step observes state through the git adapter and acts only when the
//! observed state differs from the target, so rerunning against the same
//! local and remote state issues no duplicate side effects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::clone_policy::{CloneDecision, DirectoryState, decide_clone};
use crate::core::context::{Phase, ReconciliationContext};
use crate::core::target::TargetDescriptor;
use crate::error::ForkflowError;
use crate::io::config::ForkflowConfig;
use crate::io::fork_api::{ForkApi, ForkRequest};
use crate::io::git::{Git, MergeOutcome, RemoteAdd};
use crate::io::process::CommandRunner;

const ORIGIN: &str = "origin";
const UPSTREAM: &str = "upstream";

/// Knobs the reconciler takes from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Main-line branch override; detected when `None`.
    pub default_branch: Option<String>,
}

impl From<&ForkflowConfig> for ReconcileSettings {
    fn from(cfg: &ForkflowConfig) -> Self {
        Self {
            default_branch: cfg.default_branch.clone(),
        }
    }
}

/// How the checkout was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutAction {
    /// The invocation directory already was a clean checkout of the fork.
    ReusedCurrent,
    /// The clone destination already held a clean checkout of the fork.
    ReusedExisting,
    Cloned,
}

/// What the branch step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    SwitchedLocal,
    /// Only `origin/<branch>` existed; a local tracking branch was created.
    TrackedRemote,
    Created,
}

/// Facts about a finished reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Checkout the branch is ready in.
    pub workdir: PathBuf,
    pub was_already_forked: bool,
    pub clone_decision: CloneDecision,
    /// `origin` of the invocation directory, if it had one.
    pub invocation_origin: Option<String>,
    /// False when the invocation directory had uncommitted or untracked changes.
    pub invocation_clean: bool,
    pub checkout: CheckoutAction,
    pub upstream_remote: RemoteAdd,
    pub synced: bool,
    pub main_branch: String,
    pub branch: String,
    pub branch_action: BranchAction,
}

impl ReconcileOutcome {
    fn from_context(
        ctx: &ReconciliationContext,
        branch: &str,
        checkout: CheckoutAction,
        upstream_remote: RemoteAdd,
        branch_action: BranchAction,
    ) -> Result<Self> {
        Ok(Self {
            workdir: ctx.workdir().to_path_buf(),
            was_already_forked: recorded(ctx.was_already_forked(), "was_already_forked")?,
            clone_decision: recorded(ctx.clone_decision(), "clone_decision")?,
            invocation_origin: ctx.current_remote_url().map(str::to_string),
            invocation_clean: recorded(ctx.working_dir_clean(), "working_dir_clean")?,
            checkout,
            upstream_remote,
            synced: ctx.reached(Phase::Synced),
            main_branch: recorded(ctx.main_branch(), "main_branch")?.to_string(),
            branch: branch.to_string(),
            branch_action,
        })
    }
}

/// Drive the repository from whatever state it is in to: forked, checked out,
/// tracking upstream, synced (for pre-existing forks), on `target.branch()`
/// with its push target bound to `origin`.
#[instrument(skip_all, fields(user = target.user(), repo = target.repo(), branch = target.branch()))]
pub fn reconcile<R: CommandRunner, A: ForkApi>(
    target: &TargetDescriptor,
    settings: &ReconcileSettings,
    runner: &R,
    fork_api: &A,
    invocation_dir: &Path,
) -> Result<ReconcileOutcome> {
    let mut ctx = ReconciliationContext::new(invocation_dir);
    info!(
        fork = %target.fork_url(),
        upstream = %target.upstream_url(),
        auth = %target.auth(),
        "reconciling"
    );

    let was_already_forked = ensure_fork(target, runner, fork_api, ctx.workdir())?;
    ctx.record_fork_state(was_already_forked)?;
    ctx.advance(Phase::ForkChecked)?;

    let checkout = ensure_checkout(target, runner, &mut ctx)?;
    let git = Git::new(runner, ctx.workdir());

    let upstream_remote = track_upstream(target, &git)?;
    ctx.advance(Phase::UpstreamTracked)?;

    if recorded(ctx.was_already_forked(), "was_already_forked")? {
        ctx.record_main_branch(sync_main(target, settings, &git)?)?;
        ctx.advance(Phase::Synced)?;
    } else {
        info!("fork was just created, skipping sync");
        let main = resolve_main_branch(&git, settings.default_branch.as_deref(), None)?;
        ctx.record_main_branch(main)?;
    }

    let main_branch = recorded(ctx.main_branch(), "main_branch")?.to_string();
    let branch_action = ensure_branch(target.branch(), &main_branch, &git)?;
    ctx.advance(Phase::Branched)?;

    git.set_branch_upstream(target.branch(), ORIGIN)
        .with_context(|| format!("bind {} to {ORIGIN}", target.branch()))?;
    info!(branch = target.branch(), remote = ORIGIN, "push target bound");
    ctx.advance(Phase::PushBound)?;
    ctx.advance(Phase::Done)?;

    ReconcileOutcome::from_context(&ctx, target.branch(), checkout, upstream_remote, branch_action)
}

fn recorded<T>(value: Option<T>, field: &str) -> Result<T> {
    value.with_context(|| format!("{field} not recorded"))
}

/// Check the fork; request it when missing. Returns `was_already_forked`.
///
/// The request is sent once and not followed up: a fork the host has not
/// finished creating makes the clone step fail.
#[instrument(skip_all)]
fn ensure_fork<R: CommandRunner, A: ForkApi>(
    target: &TargetDescriptor,
    runner: &R,
    fork_api: &A,
    workdir: &Path,
) -> Result<bool> {
    let fork_url = target.fork_url();
    if Git::new(runner, workdir).ls_remote(&fork_url)? {
        info!(%fork_url, "fork already exists");
        return Ok(true);
    }

    info!(%fork_url, "fork not found, requesting one");
    fork_api.create_fork(&ForkRequest {
        upstream_owner: target.upstream_owner().to_string(),
        repo: target.repo().to_string(),
        user: target.user().to_string(),
    })?;
    Ok(false)
}

/// Decide between reusing a checkout and cloning, then move the working
/// context into the checkout.
#[instrument(skip_all)]
fn ensure_checkout<R: CommandRunner>(
    target: &TargetDescriptor,
    runner: &R,
    ctx: &mut ReconciliationContext,
) -> Result<CheckoutAction> {
    let fork_url = target.fork_url();
    let state = observe_directory(&Git::new(runner, ctx.workdir()))?;
    ctx.record_remote_url(state.origin_url.clone())?;
    ctx.record_working_dir_clean(!state.is_dirty)?;

    let decision = decide_clone(&state, &fork_url);
    ctx.record_clone_decision(decision)?;
    ctx.advance(Phase::CloneDecided)?;

    let CloneDecision::CloneNeeded(reason) = decision else {
        info!(workdir = %ctx.workdir().display(), "reusing current checkout");
        return Ok(CheckoutAction::ReusedCurrent);
    };

    let dest = target.local_path(ctx.workdir());
    info!(?reason, dest = %dest.display(), "clone needed");
    if dest.exists() {
        let existing = observe_directory(&Git::new(runner, &dest))?;
        if decide_clone(&existing, &fork_url) == CloneDecision::Reuse {
            info!(dest = %dest.display(), "reusing existing clone");
            ctx.enter(dest);
            return Ok(CheckoutAction::ReusedExisting);
        }
        return Err(ForkflowError::DestinationOccupied {
            path: dest,
            expected_url: fork_url,
        }
        .into());
    }

    Git::new(runner, ctx.workdir()).clone_into(&fork_url, &dest)?;
    ctx.enter(dest);
    ctx.advance(Phase::Cloned)?;
    Ok(CheckoutAction::Cloned)
}

fn observe_directory<R: CommandRunner>(git: &Git<'_, R>) -> Result<DirectoryState> {
    if !git.has_repo_metadata()? {
        return Ok(DirectoryState {
            metadata_present: false,
            is_dirty: false,
            origin_url: None,
        });
    }
    Ok(DirectoryState {
        metadata_present: true,
        is_dirty: git.is_dirty()?,
        origin_url: git.remote_url(ORIGIN)?,
    })
}

/// Add the `upstream` remote. An existing one is kept as is.
#[instrument(skip_all)]
fn track_upstream<R: CommandRunner>(target: &TargetDescriptor, git: &Git<'_, R>) -> Result<RemoteAdd> {
    let added = git.add_remote(UPSTREAM, &target.upstream_url())?;
    if added == RemoteAdd::Added {
        info!(url = %target.upstream_url(), "tracking upstream");
    }
    let remotes = git.list_remotes()?;
    info!("remotes:\n{remotes}");
    Ok(added)
}

/// Merge upstream's main line into the local one and push it to the fork.
/// A merge left in progress is aborted before the error is returned.
#[instrument(skip_all)]
fn sync_main<R: CommandRunner>(
    target: &TargetDescriptor,
    settings: &ReconcileSettings,
    git: &Git<'_, R>,
) -> Result<String> {
    git.fetch(UPSTREAM)?;
    let main = resolve_main_branch(git, settings.default_branch.as_deref(), Some(UPSTREAM))?;
    git.checkout_branch(&main)?;

    let rev = format!("{UPSTREAM}/{main}");
    match git.merge_no_edit(&rev)? {
        MergeOutcome::Merged => {
            git.push(ORIGIN, &main)?;
            info!(branch = %main, "fork synced with upstream");
            Ok(main)
        }
        MergeOutcome::Failed(out) => {
            if !git.merge_in_progress()? {
                return Err(ForkflowError::CommandFailed {
                    command: format!("git merge --no-edit {rev}"),
                    exit_code: out.exit_code,
                    stderr: out.stderr.trim().to_string(),
                }
                .into());
            }
            git.merge_abort().context("abort conflicted merge")?;
            warn!(branch = %main, "sync aborted");
            Err(ForkflowError::MergeConflict {
                owner: target.user().to_string(),
                repo: target.repo().to_string(),
                branch: main,
            }
            .into())
        }
    }
}

/// Configured name, else `main` when present (on `remote`, or locally when
/// `remote` is `None`), else `master`.
fn resolve_main_branch<R: CommandRunner>(
    git: &Git<'_, R>,
    configured: Option<&str>,
    remote: Option<&str>,
) -> Result<String> {
    if let Some(name) = configured {
        return Ok(name.to_string());
    }
    let has_main = match remote {
        Some(remote) => git.remote_branch_exists(remote, "main")?,
        None => git.branch_exists("main")?,
    };
    Ok(if has_main { "main" } else { "master" }.to_string())
}

#[instrument(skip_all, fields(branch))]
fn ensure_branch<R: CommandRunner>(branch: &str, main: &str, git: &Git<'_, R>) -> Result<BranchAction> {
    if git.branch_exists(branch)? {
        git.checkout_branch(branch)?;
        info!(branch, "switched to existing branch");
        return Ok(BranchAction::SwitchedLocal);
    }
    if git.remote_branch_exists(ORIGIN, branch)? {
        git.checkout_tracking_branch(ORIGIN, branch)?;
        info!(branch, "checked out branch from fork");
        return Ok(BranchAction::TrackedRemote);
    }
    git.checkout_new_branch_from(branch, main)?;
    info!(branch, from = main, "created branch");
    Ok(BranchAction::Created)
}
