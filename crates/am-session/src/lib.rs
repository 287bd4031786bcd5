//! Shell sessions and process execution for project working trees.
//!
//! - [`shell`]: one long-lived shell per project with sentinel-delimited,
//!   strictly ordered command execution
//! - [`manager`]: the `project_guid -> session` map and the
//!   [`CommandExecutor`](manager::CommandExecutor) facade used by pipelines
//! - [`cli_adapter`]: argv construction and output parsing per assistant CLI

pub mod cli_adapter;
pub mod manager;
pub mod shell;
