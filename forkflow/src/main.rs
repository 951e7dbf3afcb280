//! Fork a hosted repository and prepare a feature branch for a pull request.
//!
//! Forks `owner/repo` into the user's account when needed, clones it (or
//! reuses a clean checkout), tracks the original as `upstream`, syncs the
//! main line of a pre-existing fork, and checks out the requested branch with
//! its push target set to `origin`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, ValueEnum};

use forkflow::core::clone_policy::{CloneDecision, CloneReason};
use forkflow::core::target::{AuthMode, TargetDescriptor};
use forkflow::error::ForkflowError;
use forkflow::exit_codes;
use forkflow::io::config::load_config;
use forkflow::io::fork_api::{GithubForkApi, TerminalPrompt};
use forkflow::io::preflight::require_tool;
use forkflow::io::process::SystemRunner;
use forkflow::logging;
use forkflow::reconcile::{CheckoutAction, ReconcileOutcome, ReconcileSettings, reconcile};

#[derive(Parser)]
#[command(
    name = "forkflow",
    version,
    about = "Fork, clone, sync and branch a repository for a pull request"
)]
struct Cli {
    /// Transport for git remotes.
    #[arg(value_enum)]
    auth: Auth,
    /// Account that owns (or will own) the fork.
    user: String,
    /// Repository to fork: `name` (default upstream owner) or `owner/name`.
    repo: String,
    /// Branch to create or switch to.
    branch: String,
    /// TOML file overriding host, API base, upstream owner and main branch.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Upstream owner for a bare `repo` name (overrides the config file and the built-in default).
    #[arg(long)]
    upstream_owner: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Auth {
    Ssh,
    Https,
}

impl From<Auth> for AuthMode {
    fn from(auth: Auth) -> Self {
        match auth {
            Auth::Ssh => AuthMode::Ssh,
            Auth::Https => AuthMode::Https,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                exit_codes::FAILURE
            } else {
                exit_codes::OK
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    logging::init();
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        if matches!(err.downcast_ref::<ForkflowError>(), Some(ForkflowError::Usage(_))) {
            eprintln!("{}", Cli::command().render_usage());
        }
        std::process::exit(exit_codes::FAILURE);
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = load_config(cli.config.as_deref())?;
    let owner = cli.upstream_owner.as_deref().unwrap_or(cfg.upstream_owner.as_str());
    let target = TargetDescriptor::new(
        cli.auth.into(),
        &cfg.host,
        &cli.user,
        &cli.repo,
        &cli.branch,
        owner,
    )?;
    require_tool("git")?;

    let cwd = std::env::current_dir().context("resolve current directory")?;
    let api = GithubForkApi::new(&cfg.api_base, TerminalPrompt);
    let outcome = reconcile(
        &target,
        &ReconcileSettings::from(&cfg),
        &SystemRunner::new(),
        &api,
        &cwd,
    )?;
    print_summary(&outcome);
    Ok(())
}

fn print_summary(outcome: &ReconcileOutcome) {
    let checkout = match (outcome.checkout, outcome.clone_decision) {
        (CheckoutAction::ReusedCurrent, _) => "reused current checkout".to_string(),
        (CheckoutAction::ReusedExisting, _) => "reused existing clone".to_string(),
        (CheckoutAction::Cloned, _) if !outcome.invocation_clean => {
            "cloned fork; current directory has local changes".to_string()
        }
        (CheckoutAction::Cloned, CloneDecision::CloneNeeded(CloneReason::OriginMismatch)) => {
            match &outcome.invocation_origin {
                Some(url) => format!("cloned fork; current origin is {url}"),
                None => "cloned fork; current directory has no origin".to_string(),
            }
        }
        (CheckoutAction::Cloned, _) => "cloned fork".to_string(),
    };
    let sync = if outcome.synced {
        format!("{} synced with upstream", outcome.main_branch)
    } else {
        "new fork, no sync needed".to_string()
    };
    println!(
        "branch '{}' ready in {} ({checkout}; {sync})",
        outcome.branch,
        outcome.workdir.display()
    );
    println!("commit your work, then run `git push` to publish it to origin");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positionals() {
        let cli = Cli::parse_from(["forkflow", "ssh", "alice", "acme/widgets", "feat"]);
        assert_eq!(cli.auth, Auth::Ssh);
        assert_eq!(cli.user, "alice");
        assert_eq!(cli.repo, "acme/widgets");
        assert_eq!(cli.branch, "feat");
        assert!(cli.config.is_none());
    }

    #[test]
    fn parse_upstream_owner_flag() {
        let cli = Cli::parse_from([
            "forkflow",
            "https",
            "alice",
            "widgets",
            "feat",
            "--upstream-owner",
            "acme",
        ]);
        assert_eq!(cli.auth, Auth::Https);
        assert_eq!(cli.upstream_owner.as_deref(), Some("acme"));
    }

    #[test]
    fn rejects_unknown_auth() {
        assert!(Cli::try_parse_from(["forkflow", "ftp", "alice", "widgets", "feat"]).is_err());
    }

    #[test]
    fn rejects_missing_branch() {
        assert!(Cli::try_parse_from(["forkflow", "ssh", "alice", "widgets"]).is_err());
    }
}
