//! Narrow shell-spawning helpers shared by [`crate::validator::Validator`]
//! and [`crate::provider::tool_handler::ToolHandler`]'s `run_command`.
//!
//! The teacher's broader 50+ tool registry (file/git/cargo/container/
//! browser/knowledge-graph tools wired through a `Tool` trait + registry)
//! has no counterpart here: file reads/writes/listing and command execution
//! are implemented directly in `ToolHandler` and `Validator` against the
//! six built-in tools. Only the shell-selection helper survives the trim.

pub mod shell;
