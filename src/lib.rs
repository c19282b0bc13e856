//! AIDF — an autonomous coding-agent task runner.
//!
//! An [`executor::Executor`] drives one task file through PreFlight, an
//! iteration loop against a pluggable [`provider::Provider`], and PostFlight
//! bookkeeping (status section, lifecycle-folder move, commit/push).
//! [`parallel::ParallelExecutor`] fans that out across several tasks at
//! once, scheduling around scope conflicts so independent work runs
//! concurrently. [`watcher`] turns the whole thing into a long-running
//! daemon over `.ai/tasks/pending/`, and [`mcp`] exposes the same task
//! state to Model Context Protocol clients.

pub mod config;
pub mod context;
pub mod conversation;
pub mod errors;
pub mod executor;
pub mod git_ops;
pub mod mcp;
pub mod parallel;
pub mod provider;
pub mod scope;
pub mod task;
pub mod tools;
pub mod validator;
pub mod watcher;

pub use config::Config;
pub use context::LoadedContext;
pub use errors::{AidfError, Result};
pub use executor::{Executor, ExecutorResult, RunOptions};
pub use parallel::{ParallelExecutor, ParallelOptions, ParallelResult};
pub use task::Task;
