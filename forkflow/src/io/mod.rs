//! Side-effecting adapters: processes, git, the hosting API, config files.

pub mod config;
pub mod fork_api;
pub mod git;
pub mod preflight;
pub mod process;
