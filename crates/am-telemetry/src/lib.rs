//! Logging setup shared by the agent service binaries and tests.
//!
//! All crates log through `tracing`; this crate owns the one place where a
//! `tracing-subscriber` is installed, in either human-readable or JSON form.

pub mod logging;
