//! Test-only helpers: a scripted command runner, a counting fork API, and a
//! sandbox for tests that need real git repositories.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::fork_api::{ForkApi, ForkRequest};
use crate::io::process::{CommandRequest, CommandResult, CommandRunner, SystemRunner};

/// Successful result with `stdout`.
pub fn ok(stdout: &str) -> CommandResult {
    CommandResult {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Failed result with `exit_code` and `stderr`.
pub fn failed(exit_code: i32, stderr: &str) -> CommandResult {
    CommandResult {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

struct Rule {
    prefix: String,
    results: RefCell<VecDeque<CommandResult>>,
}

/// Command runner that answers from a script and records every request.
///
/// Rules match on the command line prefix (`git ls-remote`, ...); the first
/// matching rule wins. A rule with several results hands them out in order and
/// then keeps repeating the last one. Unmatched commands succeed with empty
/// output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    requests: RefCell<Vec<CommandRequest>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, prefix: &str, result: CommandResult) -> Self {
        self.on_sequence(prefix, vec![result])
    }

    pub fn on_sequence(mut self, prefix: &str, results: Vec<CommandResult>) -> Self {
        self.rules.push(Rule {
            prefix: prefix.to_string(),
            results: RefCell::new(results.into()),
        });
        self
    }

    pub fn requests(&self) -> Vec<CommandRequest> {
        self.requests.borrow().clone()
    }

    /// Command lines in invocation order.
    pub fn command_lines(&self) -> Vec<String> {
        self.requests.borrow().iter().map(CommandRequest::display).collect()
    }

    /// Number of recorded commands starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    /// Index of the first command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.command_lines()
            .iter()
            .position(|line| line.starts_with(prefix))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.requests.borrow_mut().push(request.clone());
        let line = request.display();
        let Some(rule) = self.rules.iter().find(|rule| line.starts_with(&rule.prefix)) else {
            return Ok(ok(""));
        };
        let mut results = rule.results.borrow_mut();
        let result = if results.len() > 1 {
            results.pop_front()
        } else {
            results.front().cloned()
        };
        result.ok_or_else(|| anyhow!("rule '{}' has no results", rule.prefix))
    }
}

/// Fork API that only counts calls, optionally failing them.
#[derive(Default)]
pub struct CountingForkApi {
    calls: Cell<usize>,
    fail: bool,
}

impl CountingForkApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: Cell::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ForkApi for CountingForkApi {
    fn create_fork(&self, _request: &ForkRequest) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            return Err(anyhow!("scripted fork failure"));
        }
        Ok(())
    }
}

/// Temporary directory with an isolated git configuration.
///
/// Remote URLs under `https://{SANDBOX_HOST}/` are rewritten to bare
/// repositories below `remotes/`, so the reconciler can run end to end
/// against local repositories.
pub struct GitSandbox {
    temp: TempDir,
    env: Vec<(String, String)>,
    runner: SystemRunner,
}

pub const SANDBOX_HOST: &str = "forge.test";

impl GitSandbox {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create sandbox")?;
        let root = temp.path();
        let remotes = root.join("remotes");
        fs::create_dir_all(&remotes).context("create remotes dir")?;
        fs::create_dir_all(root.join("work")).context("create work dir")?;

        let config_path = root.join("gitconfig");
        let config = format!(
            "[user]\n\tname = Forkflow Test\n\temail = forkflow@example.test\n\
             [init]\n\tdefaultBranch = main\n\
             [advice]\n\tdetachedHead = false\n\
             [url \"{}/\"]\n\tinsteadOf = https://{SANDBOX_HOST}/\n",
            remotes.display()
        );
        fs::write(&config_path, config).context("write sandbox gitconfig")?;

        let env = vec![
            ("GIT_CONFIG_GLOBAL".to_string(), config_path.to_string_lossy().into_owned()),
            ("GIT_CONFIG_NOSYSTEM".to_string(), "1".to_string()),
            ("GIT_CEILING_DIRECTORIES".to_string(), root.to_string_lossy().into_owned()),
        ];
        let runner = env
            .iter()
            .fold(SystemRunner::new(), |runner, (key, value)| runner.with_env(key, value));
        Ok(Self { temp, env, runner })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Empty directory the reconciler is started from.
    pub fn work_dir(&self) -> PathBuf {
        self.root().join("work")
    }

    /// Environment that binds git to the sandbox configuration, for spawning
    /// processes (such as the forkflow binary) outside [`GitSandbox::runner`].
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Runner bound to the sandbox configuration.
    pub fn runner(&self) -> &SystemRunner {
        &self.runner
    }

    /// Filesystem location backing `https://{SANDBOX_HOST}/{owner}/{repo}.git`.
    pub fn remote_path(&self, owner: &str, repo: &str) -> PathBuf {
        self.root().join("remotes").join(owner).join(format!("{repo}.git"))
    }

    /// Create `owner/repo` as a bare remote whose `main` has one commit.
    pub fn seed_remote(&self, owner: &str, repo: &str) -> Result<PathBuf> {
        let seed = self.root().join(format!("seed-{owner}-{repo}"));
        fs::create_dir_all(&seed).context("create seed dir")?;
        self.git(&seed, &["init"])?;
        commit_file(self, &seed, "README.md", "hello\n", "initial commit")?;

        let bare = self.remote_path(owner, repo);
        self.git(self.root(), &["clone", "--bare", &seed.to_string_lossy(), &bare.to_string_lossy()])?;
        Ok(bare)
    }

    /// Bare-clone `from` as `owner/repo`, the way a host creates a fork.
    pub fn fork_remote(&self, from: &Path, owner: &str, repo: &str) -> Result<PathBuf> {
        let bare = self.remote_path(owner, repo);
        self.git(self.root(), &["clone", "--bare", &from.to_string_lossy(), &bare.to_string_lossy()])?;
        Ok(bare)
    }

    /// Commit `name` with `contents` onto `main` of the bare remote `bare`.
    pub fn push_commit(&self, bare: &Path, name: &str, contents: &str, message: &str) -> Result<()> {
        let scratch = tempfile::tempdir_in(self.root()).context("scratch dir")?;
        let checkout = scratch.path().join("c");
        self.git(self.root(), &["clone", &bare.to_string_lossy(), &checkout.to_string_lossy()])?;
        commit_file(self, &checkout, name, contents, message)?;
        self.git(&checkout, &["push", "origin", "main"])?;
        Ok(())
    }

    /// Run git in `dir` and return trimmed stdout, failing on nonzero exit.
    pub fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        self.runner.run_capture(&CommandRequest::new("git", args, dir))
    }
}

fn commit_file(sandbox: &GitSandbox, dir: &Path, name: &str, contents: &str, message: &str) -> Result<()> {
    fs::write(dir.join(name), contents).with_context(|| format!("write {name}"))?;
    sandbox.git(dir, &["add", name])?;
    sandbox.git(dir, &["commit", "-m", message])?;
    Ok(())
}

/// Fork API that performs the fork inside a [`GitSandbox`].
pub struct SandboxForkApi<'a> {
    sandbox: &'a GitSandbox,
    calls: Cell<usize>,
}

impl<'a> SandboxForkApi<'a> {
    pub fn new(sandbox: &'a GitSandbox) -> Self {
        Self {
            sandbox,
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl ForkApi for SandboxForkApi<'_> {
    fn create_fork(&self, request: &ForkRequest) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        let upstream = self
            .sandbox
            .remote_path(&request.upstream_owner, &request.repo);
        self.sandbox
            .fork_remote(&upstream, &request.user, &request.repo)?;
        Ok(())
    }
}

/// Real git repository on `main` with one commit, inside its own sandbox.
pub struct TestRepo {
    sandbox: GitSandbox,
    path: PathBuf,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let sandbox = GitSandbox::new()?;
        let path = sandbox.work_dir();
        sandbox.git(&path, &["init"])?;
        commit_file(&sandbox, &path, "README.md", "hello\n", "initial commit")?;
        Ok(Self { sandbox, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn runner(&self) -> SystemRunner {
        self.sandbox.runner().clone()
    }
}
