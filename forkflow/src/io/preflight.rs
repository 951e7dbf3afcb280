//! Required external tools.

use std::path::PathBuf;

use tracing::debug;
use which::which;

use crate::error::ForkflowError;

/// Resolve `tool` on `PATH` or fail with [`ForkflowError::MissingDependency`].
pub fn require_tool(tool: &str) -> Result<PathBuf, ForkflowError> {
    match which(tool) {
        Ok(path) => {
            debug!(tool, path = %path.display(), "found required tool");
            Ok(path)
        }
        Err(_) => Err(ForkflowError::MissingDependency {
            tool: tool.to_string(),
        }),
    }
}
