//! Context types consumed, never produced, by the core.
//!
//! Parsing AGENTS.md/role/skill markdown into these shapes is an external
//! loader's job. The core only reads a [`LoadedContext`]
//! by reference and never mutates it.

use crate::task::Task;
use serde::{Deserialize, Serialize};

/// A role persona that parameterizes the prompt (developer, architect, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub content: String,
}

/// A portable named prompt fragment injected as structured `<skill>` XML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub content: String,
}

/// An optional multi-task plan the current task belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    pub content: String,
}

/// Aggregate context passed to the Executor by reference for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedContext {
    pub agents_content: String,
    pub role: Option<Role>,
    pub task: Task,
    pub plan: Option<Plan>,
    pub skills: Vec<Skill>,
}
