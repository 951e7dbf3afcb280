//! Optional forkflow configuration (TOML), selected with `--config`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Owner of the original repositories when `repo` is a bare name.
pub const DEFAULT_UPSTREAM_OWNER: &str = "octocat";

/// Forkflow configuration.
///
/// Every field has a default, so an absent file behaves like an empty one.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForkflowConfig {
    /// Git hosting domain used to build remote URLs.
    pub host: String,

    /// Base URL of the hosting REST API.
    pub api_base: String,

    /// Account owning the original repository, used when `repo` has no `owner/` part.
    pub upstream_owner: String,

    /// Force the main-line branch name instead of detecting `main` vs `master`.
    pub default_branch: Option<String>,
}

impl Default for ForkflowConfig {
    fn default() -> Self {
        Self {
            host: "github.com".to_string(),
            api_base: "https://api.github.com".to_string(),
            upstream_owner: DEFAULT_UPSTREAM_OWNER.to_string(),
            default_branch: None,
        }
    }
}

impl ForkflowConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow!("host must not be empty"));
        }
        if self.api_base.trim().is_empty() {
            return Err(anyhow!("api_base must not be empty"));
        }
        if self.upstream_owner.trim().is_empty() {
            return Err(anyhow!("upstream_owner must not be empty"));
        }
        if let Some(branch) = &self.default_branch
            && branch.trim().is_empty()
        {
            return Err(anyhow!("default_branch must not be empty when set"));
        }
        Ok(())
    }
}

/// Load config from a TOML file, or defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<ForkflowConfig> {
    let Some(path) = path else {
        let cfg = ForkflowConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    };
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForkflowConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}
