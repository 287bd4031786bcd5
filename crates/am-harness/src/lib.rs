//! Task execution harness for the agent service.
//!
//! This crate provides the at-least-once task plane that sits between the
//! HTTP ingress and the agent pipelines:
//! - [`task`]: task descriptors, queue names, options and result records
//! - [`broker`]: the broker abstraction and its in-memory implementation
//!   (weighted priority queues, retries, retention)
//! - [`mux`]: handler trait, handler errors and the kind demultiplexer
//! - [`project_lock`]: per-project mutual exclusion for task execution
//! - [`worker`]: the bounded worker pool that drives handlers
//! - [`shutdown`]: cooperative shutdown signalling

pub mod broker;
pub mod mux;
pub mod project_lock;
pub mod shutdown;
pub mod task;
pub mod worker;
