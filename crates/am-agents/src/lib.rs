//! Task execution for the agent service.
//!
//! - [`vcs`]: clone, pull, commit and push through `git`
//! - [`pipeline`]: one assistant turn end to end
//! - [`bootstrap`]: idempotent project setup
//! - [`deploy`]: build and run with assistant repair on failure
//! - [`handlers`]: worker-pool bindings for each task kind

pub mod bootstrap;
pub mod deploy;
pub mod handlers;
pub mod pipeline;
pub mod vcs;
