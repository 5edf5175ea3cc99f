//! Cross-crate test suites for the Warden workspace.
//!
//! The suites live under `tests/`, split into `e2e/`, `property/` and
//! `concurrency/` and wired together through `tests/warden_tests.rs`.
//! Shared fixture plumbing is in `tests/support.rs`.
