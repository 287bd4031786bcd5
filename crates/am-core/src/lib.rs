//! Core types and shared building blocks for the app-maker agent service.
//!
//! - [`types`]: roles, assistant kinds, dev stages, task kinds and payloads
//! - [`config`]: TOML configuration with `AGENTS_*` environment overrides
//! - [`workspace`]: project working-tree paths and assistant detection
//! - [`cache`] / [`session_store`]: TTL cache and conversation-id persistence

pub mod cache;
pub mod config;
pub mod session_store;
pub mod types;
pub mod workspace;
