//! Stable exit codes for the forkflow CLI.

/// The branch is ready.
pub const OK: i32 = 0;
/// Bad arguments, missing tool, unmergeable sync, or any failed external command.
pub const FAILURE: i32 = 1;
