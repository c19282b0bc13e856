//! Prompt composition.
//!
//! Concatenates project context, role, skills, task, resume/blocked
//! history, validation feedback, and execution instructions into the
//! single string handed to `Provider::execute`.

use crate::context::LoadedContext;
use crate::executor::ExecutorState;

const COMPLETION_INSTRUCTIONS: &str = "\
When the task is fully done, emit <TASK_COMPLETE> (or <DONE>) in your \
response, or call the `task_complete` tool. If you get stuck and cannot \
make further progress, emit <TASK_BLOCKED: reason> describing why, or \
call the `task_blocked` tool with a reason.";

/// Build the prompt for the next iteration.
pub fn build(context: &LoadedContext, state: &ExecutorState) -> String {
    let mut sections = Vec::new();

    if !context.agents_content.trim().is_empty() {
        sections.push(format!("# Project Context\n\n{}", context.agents_content.trim()));
    }

    if let Some(role) = &context.role {
        sections.push(format!("# Role: {}\n\n{}", role.id, role.content.trim()));
    }

    if !context.skills.is_empty() {
        let mut skills_block = String::from("# Skills\n");
        for skill in &context.skills {
            skills_block.push_str(&format!(
                "<skill name=\"{}\" description=\"{}\">\n{}\n</skill>\n",
                skill.name,
                skill.description,
                skill.content.trim()
            ));
        }
        sections.push(skills_block);
    }

    sections.push(format!(
        "# Task\n\nGoal: {}\n\nType: {}\n\nRequirements:\n{}\n\nNotes:\n{}",
        context.task.goal, context.task.task_type, context.task.requirements, context.task.notes
    ));

    if !context.task.definition_of_done.is_empty() {
        let mut dod = String::from("# Definition of Done\n");
        for item in &context.task.definition_of_done {
            dod.push_str(&format!("- [{}] {}\n", if item.checked { "x" } else { " " }, item.text));
        }
        sections.push(dod);
    }

    if let Some(blocked) = &context.task.blocked_status {
        sections.push(format!(
            "# Resuming From Blocked State\n\nPrevious blocking issue: {}\n\nFiles previously modified:\n{}",
            blocked.blocking_issue,
            blocked.files_modified.iter().map(|f| format!("- {}", f)).collect::<Vec<_>>().join("\n")
        ));
    }

    if let Some(error) = &state.last_validation_error {
        sections.push(format!(
            "# Previous Validation Failed\n\nYour previous iteration signaled completion but validation failed: {}. Please fix and re-signal.",
            error
        ));
    }

    sections.push(format!("# Execution Instructions\n\n{}", COMPLETION_INSTRUCTIONS));

    sections.join("\n\n---\n\n")
}
