//! Fork, clone, sync and branch a hosted repository, ready for a pull request.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (target URLs, the clone-reuse
//!   policy, the reconciliation context). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (process execution, git, the
//!   hosting API, config files). Isolated behind traits to enable fakes in tests.
//!
//! [`reconcile`] coordinates core logic with I/O to implement the CLI.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod reconcile;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
