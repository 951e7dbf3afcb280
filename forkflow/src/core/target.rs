//! Target descriptor: what the operator asked for, plus the URLs and paths
//! derived from it.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ForkflowError;

/// Transport used for git remotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Ssh,
    Https,
}

impl AuthMode {
    /// Remote URL prefix for `host` under this transport.
    pub fn remote_prefix(self, host: &str) -> String {
        match self {
            AuthMode::Ssh => format!("git@{host}:"),
            AuthMode::Https => format!("https://{host}/"),
        }
    }
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Ssh => f.write_str("ssh"),
            AuthMode::Https => f.write_str("https"),
        }
    }
}

/// Immutable description of the desired end state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    auth: AuthMode,
    host: String,
    user: String,
    upstream_owner: String,
    repo: String,
    branch: String,
}

impl TargetDescriptor {
    /// Build a descriptor, rejecting empty or malformed fields.
    ///
    /// `repo` may be `name` or `owner/name`; an explicit owner wins over
    /// `default_owner`.
    pub fn new(
        auth: AuthMode,
        host: &str,
        user: &str,
        repo: &str,
        branch: &str,
        default_owner: &str,
    ) -> Result<Self, ForkflowError> {
        let (owner, name) = repo.split_once('/').unwrap_or((default_owner, repo));

        require_field("host", host)?;
        require_name("user", user)?;
        require_name("upstream owner", owner)?;
        require_name("repo", name)?;
        validate_branch_name(branch)?;

        Ok(Self {
            auth,
            host: host.to_string(),
            user: user.to_string(),
            upstream_owner: owner.to_string(),
            repo: name.to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn auth(&self) -> AuthMode {
        self.auth
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn upstream_owner(&self) -> &str {
        &self.upstream_owner
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn remote_prefix(&self) -> String {
        self.auth.remote_prefix(&self.host)
    }

    /// URL of the user's fork (the `origin` remote).
    pub fn fork_url(&self) -> String {
        format!("{}{}/{}.git", self.remote_prefix(), self.user, self.repo)
    }

    /// URL of the original repository (the `upstream` remote).
    pub fn upstream_url(&self) -> String {
        format!(
            "{}{}/{}.git",
            self.remote_prefix(),
            self.upstream_owner,
            self.repo
        )
    }

    /// Where a fresh clone lands, relative to `base`.
    pub fn local_path(&self, base: &Path) -> PathBuf {
        base.join(&self.repo)
    }
}

fn require_field(field: &str, value: &str) -> Result<(), ForkflowError> {
    if value.trim().is_empty() {
        return Err(ForkflowError::Usage(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_name(field: &str, value: &str) -> Result<(), ForkflowError> {
    require_field(field, value)?;
    if value.contains('/') || value.chars().any(char::is_whitespace) {
        return Err(ForkflowError::Usage(format!(
            "{field} '{value}' must not contain '/' or whitespace"
        )));
    }
    Ok(())
}

/// Subset of `git check-ref-format` rules that matter for a branch argument.
fn validate_branch_name(branch: &str) -> Result<(), ForkflowError> {
    require_field("branch", branch)?;
    const FORBIDDEN: [char; 7] = ['~', '^', ':', '?', '*', '[', '\\'];
    let invalid = branch.starts_with('-')
        || branch.ends_with('/')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.chars().any(char::is_whitespace)
        || branch.chars().any(|c| FORBIDDEN.contains(&c));
    if invalid {
        return Err(ForkflowError::Usage(format!(
            "'{branch}' is not a valid branch name"
        )));
    }
    Ok(())
}
