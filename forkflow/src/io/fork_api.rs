//! Fork creation through the hosting REST API.
//!
//! The [`ForkApi`] trait lets the reconciler request a fork without knowing
//! about HTTP. Tests substitute a counting fake.

use std::io::{BufRead, IsTerminal, Write};
use std::process::Command;

use anyhow::{Context, Result, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info, instrument, warn};

use crate::error::ForkflowError;

const USER_AGENT: &str = concat!("forkflow/", env!("CARGO_PKG_VERSION"));

/// Which repository to fork, and on whose behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkRequest {
    pub upstream_owner: String,
    pub repo: String,
    /// Account that will own the fork; also the basic-auth user name.
    pub user: String,
}

/// Abstraction over the fork-creation endpoint.
pub trait ForkApi {
    /// Ask the host to fork `request.repo` into `request.user`'s account.
    /// Repeating the call for an existing fork is a server-side no-op.
    fn create_fork(&self, request: &ForkRequest) -> Result<()>;
}

/// Supplies the secret paired with a user name for basic authentication.
pub trait CredentialSource {
    fn secret(&self, user: &str) -> Result<String>;
}

/// Reads the secret from stdin after prompting on stderr. Echo is switched
/// off while a terminal is attached.
pub struct TerminalPrompt;

impl CredentialSource for TerminalPrompt {
    fn secret(&self, user: &str) -> Result<String> {
        let echo_off = EchoOff::engage();
        eprint!("{}", prompt_text(user, echo_off.is_some()));
        std::io::stderr().flush().context("flush prompt")?;
        let mut line = String::new();
        let read = std::io::stdin().lock().read_line(&mut line);
        if echo_off.is_some() {
            // The typed newline was not echoed.
            eprintln!();
        }
        drop(echo_off);
        read.context("read token")?;
        let token = line.trim().to_string();
        if token.is_empty() {
            bail!("no token entered for {user}");
        }
        Ok(token)
    }
}

fn prompt_text(user: &str, hidden: bool) -> String {
    let note = if hidden { "input hidden" } else { "input will be visible" };
    format!("API token for {user} ({note}): ")
}

/// Terminal echo disabled through `stty` until dropped.
struct EchoOff {
    saved: Option<String>,
}

impl EchoOff {
    fn engage() -> Option<Self> {
        if !cfg!(unix) || !std::io::stdin().is_terminal() {
            return None;
        }
        let saved = Command::new("stty")
            .arg("-g")
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string());
        let status = Command::new("stty").arg("-echo").status().ok()?;
        if !status.success() {
            debug!("stty -echo failed, token input stays visible");
            return None;
        }
        Some(Self { saved })
    }
}

impl Drop for EchoOff {
    fn drop(&mut self) {
        let restore = self.saved.as_deref().unwrap_or("echo");
        if let Err(err) = Command::new("stty").arg(restore).status() {
            warn!(%err, "could not restore terminal echo");
        }
    }
}

/// `POST {api_base}/repos/{owner}/{repo}/forks` with basic auth.
pub struct GithubForkApi<C: CredentialSource> {
    api_base: String,
    credentials: C,
    agent: ureq::Agent,
}

impl<C: CredentialSource> GithubForkApi<C> {
    pub fn new(api_base: &str, credentials: C) -> Self {
        let agent = ureq::AgentBuilder::new().user_agent(USER_AGENT).build();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            agent,
        }
    }
}

impl<C: CredentialSource> ForkApi for GithubForkApi<C> {
    #[instrument(skip_all, fields(owner = %request.upstream_owner, repo = %request.repo))]
    fn create_fork(&self, request: &ForkRequest) -> Result<()> {
        let url = fork_endpoint(&self.api_base, &request.upstream_owner, &request.repo);
        let secret = self.credentials.secret(&request.user)?;
        let failed = |reason: String| ForkflowError::ForkRequestFailed {
            repo: format!("{}/{}", request.upstream_owner, request.repo),
            reason,
        };

        debug!(%url, "requesting fork");
        match self
            .agent
            .post(&url)
            .set("Accept", "application/vnd.github+json")
            .set("Authorization", &basic_auth(&request.user, &secret))
            .call()
        {
            Ok(resp) => {
                info!(status = resp.status(), "fork requested");
                Ok(())
            }
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                warn!(status = code, "fork request rejected");
                Err(failed(format!("HTTP {code}: {}", body.trim())).into())
            }
            Err(err) => Err(failed(err.to_string()).into()),
        }
    }
}

pub fn fork_endpoint(api_base: &str, owner: &str, repo: &str) -> String {
    format!("{}/repos/{owner}/{repo}/forks", api_base.trim_end_matches('/'))
}

fn basic_auth(user: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{secret}")))
}
