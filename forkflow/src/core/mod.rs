//! Deterministic, pure logic for the reconciler.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod clone_policy;
pub mod context;
pub mod target;
