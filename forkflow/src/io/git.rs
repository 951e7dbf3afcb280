//! Git adapter for the reconciler.
//!
//! Every git primitive the reconciler needs is a typed method here. Command
//! lines stay private to this module; callers see booleans, options and small
//! outcome enums.

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::process::{CommandRequest, CommandResult, CommandRunner};

/// `git remote add` exits with this status when the name is taken.
const REMOTE_EXISTS_EXIT_CODE: i32 = 3;

/// Outcome of adding a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAdd {
    Added,
    /// A remote with that name was already configured; it was left untouched.
    AlreadyExists,
}

/// Outcome of a non-interactive merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    /// Nonzero exit. Whether a merge is left in progress is for the caller to check.
    Failed(CommandResult),
}

/// Git commands bound to one working directory.
#[derive(Debug)]
pub struct Git<'a, R: CommandRunner> {
    runner: &'a R,
    workdir: PathBuf,
}

impl<'a, R: CommandRunner> Git<'a, R> {
    pub fn new(runner: &'a R, workdir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
        }
    }

    /// True if the working directory sits inside a git repository.
    pub fn has_repo_metadata(&self) -> Result<bool> {
        Ok(self.run(&["rev-parse", "--git-dir"])?.success())
    }

    /// Changed paths (including untracked) from porcelain status.
    pub fn status_porcelain(&self) -> Result<Vec<String>> {
        let out = self.capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True if there is any uncommitted or untracked change.
    #[instrument(skip_all)]
    pub fn is_dirty(&self) -> Result<bool> {
        let changed = self.status_porcelain()?;
        if !changed.is_empty() {
            debug!(?changed, "worktree not clean");
        }
        Ok(!changed.is_empty())
    }

    /// Configured URL of remote `name`, or `None` if no such remote exists.
    ///
    /// Reads the raw config value; `url.*.insteadOf` rewrites are not applied.
    pub fn remote_url(&self, name: &str) -> Result<Option<String>> {
        let key = format!("remote.{name}.url");
        let out = self.run(&["config", "--get", &key])?;
        if !out.success() {
            return Ok(None);
        }
        Ok(Some(out.stdout.trim().to_string()))
    }

    /// Check `url` with `ls-remote`. Terminal prompting is disabled so an
    /// unknown repository fails instead of asking for credentials.
    #[instrument(skip_all, fields(url))]
    pub fn ls_remote(&self, url: &str) -> Result<bool> {
        let request = self
            .request(&["ls-remote", "--heads", url])
            .with_env("GIT_TERMINAL_PROMPT", "0");
        let out = self.runner.run(&request)?;
        debug!(reachable = out.success(), "ls-remote finished");
        Ok(out.success())
    }

    /// Clone `url` into `dest` (relative to the working directory or absolute).
    #[instrument(skip_all, fields(url, dest = %dest.display()))]
    pub fn clone_into(&self, url: &str, dest: &Path) -> Result<()> {
        let dest = dest.to_string_lossy().into_owned();
        self.checked(&["clone", url, dest.as_str()])?;
        Ok(())
    }

    /// Add remote `name`. An existing remote with that name is reported, not replaced.
    #[instrument(skip_all, fields(name, url))]
    pub fn add_remote(&self, name: &str, url: &str) -> Result<RemoteAdd> {
        let out = self.run(&["remote", "add", name, url])?;
        if out.success() {
            debug!("remote added");
            return Ok(RemoteAdd::Added);
        }
        // Older git dies with 128 instead of 3; the follow-up lookup is authoritative.
        if out.exit_code == REMOTE_EXISTS_EXIT_CODE || self.remote_url(name)?.is_some() {
            warn!(name, "remote already exists, leaving it untouched");
            return Ok(RemoteAdd::AlreadyExists);
        }
        Err(failure("remote add", &out))
    }

    /// `git remote -v` output.
    pub fn list_remotes(&self) -> Result<String> {
        self.capture(&["remote", "-v"])
    }

    pub fn fetch(&self, remote: &str) -> Result<()> {
        self.checked(&["fetch", remote])?;
        Ok(())
    }

    /// True if the fully qualified ref (e.g. `refs/heads/main`) exists.
    pub fn ref_exists(&self, reference: &str) -> Result<bool> {
        Ok(self
            .run(&["show-ref", "--verify", "--quiet", reference])?
            .success())
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/heads/{branch}"))
    }

    /// Check whether `remote/branch` is known locally as a remote-tracking ref.
    pub fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        self.ref_exists(&format!("refs/remotes/{remote}/{branch}"))
    }

    /// Checkout an existing local branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.checked(&["checkout", branch])?;
        Ok(())
    }

    /// Create local `branch` tracking `remote/branch` and check it out.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn checkout_tracking_branch(&self, remote: &str, branch: &str) -> Result<()> {
        let remote_ref = format!("{remote}/{branch}");
        debug!(branch, %remote_ref, "checking out remote-tracking branch");
        self.checked(&["checkout", "-b", branch, "--track", &remote_ref])?;
        Ok(())
    }

    /// Create `branch` at `start_point` and check it out.
    #[instrument(skip_all, fields(branch, start_point))]
    pub fn checkout_new_branch_from(&self, branch: &str, start_point: &str) -> Result<()> {
        debug!(branch, start_point, "creating and checking out new branch");
        self.checked(&["checkout", "-b", branch, start_point])?;
        Ok(())
    }

    /// Merge `rev` into the current branch without opening an editor.
    #[instrument(skip_all, fields(rev))]
    pub fn merge_no_edit(&self, rev: &str) -> Result<MergeOutcome> {
        let out = self.run(&["merge", "--no-edit", rev])?;
        if out.success() {
            return Ok(MergeOutcome::Merged);
        }
        warn!(exit_code = out.exit_code, stderr = %out.stderr.trim(), "merge did not complete");
        Ok(MergeOutcome::Failed(out))
    }

    /// True while a merge is waiting to be concluded or aborted.
    pub fn merge_in_progress(&self) -> Result<bool> {
        Ok(self
            .run(&["rev-parse", "-q", "--verify", "MERGE_HEAD"])?
            .success())
    }

    pub fn merge_abort(&self) -> Result<()> {
        self.checked(&["merge", "--abort"])?;
        Ok(())
    }

    #[instrument(skip_all, fields(remote, branch))]
    pub fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.checked(&["push", remote, branch])?;
        Ok(())
    }

    /// Point `branch` at `remote/branch` so a bare `git push` needs no arguments.
    /// Writes config only; nothing is pushed.
    #[instrument(skip_all, fields(branch, remote))]
    pub fn set_branch_upstream(&self, branch: &str, remote: &str) -> Result<()> {
        let remote_key = format!("branch.{branch}.remote");
        let merge_key = format!("branch.{branch}.merge");
        let merge_ref = format!("refs/heads/{branch}");
        self.checked(&["config", &remote_key, remote])?;
        self.checked(&["config", &merge_key, &merge_ref])?;
        Ok(())
    }

    fn request(&self, args: &[&str]) -> CommandRequest {
        CommandRequest::new("git", args, &self.workdir)
    }

    fn capture(&self, args: &[&str]) -> Result<String> {
        self.runner.run_capture(&self.request(args))
    }

    fn checked(&self, args: &[&str]) -> Result<CommandResult> {
        self.runner.run_checked(&self.request(args))
    }

    fn run(&self, args: &[&str]) -> Result<CommandResult> {
        self.runner.run(&self.request(args))
    }
}

fn failure(what: &str, out: &CommandResult) -> anyhow::Error {
    anyhow!(
        "git {what} failed (exit code {}): {}",
        out.exit_code,
        out.stderr.trim()
    )
}

/// Path of one `XY path` porcelain line; renames yield the new path.
fn parse_status_line(line: &str) -> Result<String> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(path.trim().to_string());
    }
    let Some(path) = line.get(3..).filter(|path| !path.trim().is_empty()) else {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    };
    Ok(match path.split_once("->") {
        Some((_, new)) => new.trim().to_string(),
        None => path.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::process::SystemRunner;
    use crate::test_support::{ScriptedRunner, TestRepo, failed, ok};

    #[test]
    fn parses_untracked_line() {
        assert_eq!(parse_status_line("?? foo.txt").expect("parse"), "foo.txt");
        assert_eq!(parse_status_line(" M src/lib.rs").expect("parse"), "src/lib.rs");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        assert_eq!(parse_status_line("R  old.txt -> new.txt").expect("parse"), "new.txt");
    }

    #[test]
    fn short_porcelain_line_is_rejected() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn failed_merge_carries_command_output() {
        let runner = ScriptedRunner::new()
            .on("git merge", failed(1, "merge: upstream/trunk - not something we can merge"));
        let git = Git::new(&runner, "/work");
        match git.merge_no_edit("upstream/trunk").expect("merge") {
            MergeOutcome::Failed(out) => {
                assert_eq!(out.exit_code, 1);
                assert!(out.stderr.contains("not something we can merge"));
            }
            MergeOutcome::Merged => panic!("merge should have failed"),
        }
    }

    #[test]
    fn remote_add_exit_three_is_already_exists() {
        let runner = ScriptedRunner::new()
            .on("git remote add upstream", failed(3, "error: remote upstream already exists."));
        let git = Git::new(&runner, "/work");
        assert_eq!(
            git.add_remote("upstream", "git@github.com:acme/w.git").expect("add"),
            RemoteAdd::AlreadyExists
        );
    }

    #[test]
    fn remote_add_other_failure_is_error() {
        let runner = ScriptedRunner::new()
            .on("git remote add", failed(128, "fatal: not a git repository"))
            .on("git config --get remote.upstream.url", failed(1, ""));
        let git = Git::new(&runner, "/work");
        assert!(git.add_remote("upstream", "x").is_err());
    }

    #[test]
    fn ls_remote_disables_terminal_prompt() {
        let runner = ScriptedRunner::new().on("git ls-remote", ok(""));
        let git = Git::new(&runner, "/work");
        assert!(git.ls_remote("https://github.com/a/b.git").expect("check"));
        let calls = runner.requests();
        assert_eq!(
            calls[0].env,
            vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
        );
    }

    #[test]
    fn detects_dirty_and_clean_trees() {
        let repo = TestRepo::new().expect("repo");
        let runner = repo.runner();
        let git = Git::new(&runner, repo.path());
        assert!(!git.is_dirty().expect("status"));

        std::fs::write(repo.path().join("scratch.txt"), "x").expect("write");
        assert!(git.is_dirty().expect("status"));
    }

    #[test]
    fn real_remote_add_twice_keeps_first_url() {
        let repo = TestRepo::new().expect("repo");
        let runner = repo.runner();
        let git = Git::new(&runner, repo.path());
        assert_eq!(git.add_remote("upstream", "/first").expect("add"), RemoteAdd::Added);
        assert_eq!(
            git.add_remote("upstream", "/second").expect("add again"),
            RemoteAdd::AlreadyExists
        );
        assert_eq!(git.remote_url("upstream").expect("url"), Some("/first".to_string()));
        assert_eq!(git.remote_url("nope").expect("url"), None);
    }

    #[test]
    fn branch_checks_and_creation() {
        let repo = TestRepo::new().expect("repo");
        let runner = repo.runner();
        let git = Git::new(&runner, repo.path());
        assert!(git.branch_exists("main").expect("exists"));
        assert!(!git.branch_exists("feat").expect("exists"));

        let head = || {
            runner
                .run_capture(&CommandRequest::new("git", &["rev-parse", "--abbrev-ref", "HEAD"], repo.path()))
                .expect("head")
        };
        git.checkout_new_branch_from("feat", "main").expect("create");
        assert_eq!(head(), "feat");
        assert!(git.branch_exists("feat").expect("exists"));
        git.checkout_branch("main").expect("checkout");
        assert_eq!(head(), "main");
    }

    #[test]
    fn set_branch_upstream_is_idempotent() {
        let repo = TestRepo::new().expect("repo");
        let runner = repo.runner();
        let git = Git::new(&runner, repo.path());
        git.set_branch_upstream("main", "origin").expect("first");
        git.set_branch_upstream("main", "origin").expect("second");

        let merge = runner
            .run_capture(&CommandRequest::new(
                "git",
                &["config", "--get-all", "branch.main.merge"],
                repo.path(),
            ))
            .expect("config");
        assert_eq!(merge, "refs/heads/main");
    }

    #[test]
    fn metadata_absent_outside_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ceiling = temp.path().parent().expect("tempdir parent");
        let runner = SystemRunner::new().with_env("GIT_CEILING_DIRECTORIES", &ceiling.to_string_lossy());
        let git = Git::new(&runner, temp.path());
        assert!(!git.has_repo_metadata().expect("check"));
    }
}
