//! Task data model and the narrow task-file round-trip helpers the
//! Executor needs. Full AGENTS/role/skill markdown parsing is an
//! external loader concern (see [`crate::context`]); this module only
//! handles the `## Goal` / `## Scope` / ... sections the Executor itself
//! reads and rewrites during PostFlight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-task file/change scope, evaluated by [`crate::scope::ScopeGuard`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskScope {
    pub allowed: Vec<String>,
    pub forbidden: Vec<String>,
    #[serde(rename = "askBefore")]
    pub ask_before: Vec<String>,
}

/// State recorded when a task was previously left `blocked` and is now
/// being resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedStatus {
    pub previous_iteration: usize,
    pub files_modified: Vec<String>,
    pub blocking_issue: String,
    pub started_at: DateTime<Utc>,
    pub blocked_at: DateTime<Utc>,
}

/// A unit of work loaded from a task markdown file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub file_path: PathBuf,
    pub goal: String,
    pub task_type: String,
    pub requirements: String,
    pub notes: String,
    pub suggested_roles: Vec<String>,
    pub scope: TaskScope,
    pub definition_of_done: Vec<DoDItem>,
    pub blocked_status: Option<BlockedStatus>,
}

/// One `- [ ] ...` / `- [x] ...` line under `## Definition of Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoDItem {
    pub text: String,
    pub checked: bool,
}

/// Which lifecycle folder (if any) a task file currently sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleFolder {
    Pending,
    Completed,
    Blocked,
    /// Outside any recognized folder — left in place (backward compat).
    Unrecognized,
}

impl LifecycleFolder {
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            Self::Pending => Some("pending"),
            Self::Completed => Some("completed"),
            Self::Blocked => Some("blocked"),
            Self::Unrecognized => None,
        }
    }

    /// Classify a task file path by inspecting its parent directory name:
    /// `pending`, `completed`, and `blocked` are recognized lifecycle
    /// folders, anything else is unrecognized.
    pub fn classify(path: &Path) -> Self {
        match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
            Some("pending") => Self::Pending,
            Some("completed") => Self::Completed,
            Some("blocked") => Self::Blocked,
            _ => Self::Unrecognized,
        }
    }
}

impl Task {
    /// Parse the subset of the task-file format the Executor reads:
    /// `## Goal`, `## Task Type`, `## Suggested Roles`, `## Scope` (with
    /// `### Allowed` / `### Forbidden` / `### Ask Before`),
    /// `## Requirements`, `## Definition of Done`, `## Notes`.
    ///
    /// Status sections appended by a previous run (`## Status: BLOCKED`)
    /// are parsed into `blocked_status` when present.
    pub fn parse(file_path: PathBuf, content: &str) -> crate::errors::Result<Self> {
        let sections = split_sections(content);

        let goal = sections.get("goal").cloned().unwrap_or_default().trim().to_string();
        let task_type = sections
            .get("task type")
            .cloned()
            .unwrap_or_default()
            .trim()
            .to_string();
        let requirements = sections
            .get("requirements")
            .cloned()
            .unwrap_or_default()
            .trim()
            .to_string();
        let notes = sections.get("notes").cloned().unwrap_or_default().trim().to_string();

        let suggested_roles = sections
            .get("suggested roles")
            .map(|s| parse_bullets(s))
            .unwrap_or_default();

        let scope = sections
            .get("scope")
            .map(|s| parse_scope(s))
            .unwrap_or_default();

        let definition_of_done = sections
            .get("definition of done")
            .map(|s| parse_dod(s))
            .unwrap_or_default();

        let blocked_status = sections.get("status: blocked").map(|s| parse_blocked_status(s));

        Ok(Task {
            file_path,
            goal,
            task_type,
            requirements,
            notes,
            suggested_roles,
            scope,
            definition_of_done,
            blocked_status,
        })
    }
}

/// Split a task file into `## <heading>` (lowercased) -> body text.
fn split_sections(content: &str) -> std::collections::HashMap<String, String> {
    let mut sections = std::collections::HashMap::new();
    let mut current: Option<String> = None;
    let mut buf = String::new();

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(key) = current.take() {
                sections.insert(key, std::mem::take(&mut buf));
            }
            current = Some(heading.trim().to_lowercase());
        } else if current.is_some() {
            buf.push_str(line);
            buf.push('\n');
        }
    }
    if let Some(key) = current {
        sections.insert(key, buf);
    }
    sections
}

fn parse_bullets(section: &str) -> Vec<String> {
    section
        .lines()
        .filter_map(|l| l.trim().strip_prefix("- "))
        .map(|s| s.trim_matches('`').trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_scope(section: &str) -> TaskScope {
    let mut scope = TaskScope::default();
    let mut current: Option<&mut Vec<String>> = None;

    for line in section.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("### ") {
            current = match rest.trim().to_lowercase().as_str() {
                "allowed" => Some(&mut scope.allowed),
                "forbidden" => Some(&mut scope.forbidden),
                "ask before" => Some(&mut scope.ask_before),
                _ => None,
            };
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(ref mut list) = current {
                list.push(item.trim_matches('`').trim().to_string());
            }
        }
    }
    scope
}

fn parse_dod(section: &str) -> Vec<DoDItem> {
    section
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("- [x] ").or_else(|| trimmed.strip_prefix("- [X] ")) {
                Some(DoDItem { text: rest.trim().to_string(), checked: true })
            } else if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
                Some(DoDItem { text: rest.trim().to_string(), checked: false })
            } else {
                None
            }
        })
        .collect()
}

fn parse_blocked_status(section: &str) -> BlockedStatus {
    let mut previous_iteration = 0;
    let mut blocking_issue = String::new();
    let mut files_modified = Vec::new();
    let mut in_files = false;

    for line in section.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("Iteration: ") {
            previous_iteration = rest.trim().parse().unwrap_or(0);
            in_files = false;
        } else if let Some(rest) = trimmed.strip_prefix("Blocking issue: ") {
            blocking_issue = rest.trim().to_string();
            in_files = false;
        } else if trimmed == "Files modified:" {
            in_files = true;
        } else if in_files {
            if let Some(item) = trimmed.strip_prefix("- ") {
                files_modified.push(item.to_string());
            }
        }
    }

    let now = Utc::now();
    BlockedStatus {
        previous_iteration,
        files_modified,
        blocking_issue,
        started_at: now,
        blocked_at: now,
    }
}

/// Append a `## Status: ...` (or other) section to a task file's raw
/// content, used by PostFlight to record the outcome of a run and
/// by the reactive scope check to record a violation
/// mid-loop. A trailing newline separates sections.
pub fn append_section(content: &str, section: &str) -> String {
    let mut out = content.trim_end().to_string();
    out.push_str("\n\n");
    out.push_str(section.trim_end());
    out.push('\n');
    out
}

/// Render the `## Status: COMPLETED` section written on successful
/// completion.
pub fn render_completed_section(iterations: usize, files_modified: &[String], elapsed_secs: u64) -> String {
    let mut s = String::from("## Status: COMPLETED\n\n");
    s.push_str("```\n");
    s.push_str(&format!("Iterations: {}\n", iterations));
    s.push_str(&format!("Elapsed: {}s\n", elapsed_secs));
    s.push_str("```\n\n");
    s.push_str("Files modified:\n");
    for f in files_modified {
        s.push_str(&format!("- {}\n", f));
    }
    s
}

/// Render the `## Status: BLOCKED` section.
pub fn render_blocked_section(
    iteration: usize,
    files_modified: &[String],
    blocking_issue: &str,
    started_at: DateTime<Utc>,
) -> String {
    let mut s = String::from("## Status: BLOCKED\n\n");
    s.push_str(&format!("Iteration: {}\n", iteration));
    s.push_str(&format!("Blocking issue: {}\n", blocking_issue));
    s.push_str(&format!("Started at: {}\n", started_at.to_rfc3339()));
    s.push_str(&format!("Blocked at: {}\n", Utc::now().to_rfc3339()));
    s.push_str("Files modified:\n");
    for f in files_modified {
        s.push_str(&format!("- {}\n", f));
    }
    s.push_str("\nRun `aidf run --resume <task>` to continue from here.\n");
    s
}

/// Render the `## Status: FAILED` section.
pub fn render_failed_section(iteration: usize, error: &str) -> String {
    format!(
        "## Status: FAILED\n\nIteration: {}\nError: {}\n",
        iteration, error
    )
}

/// Render the execution-history section written when a resumed task
/// completes, replacing the need to keep the stale `## Status: BLOCKED`
/// section around.
pub fn render_execution_history_section(
    original_blocking_issue: &str,
    resumed_at_iteration: usize,
    final_iterations: usize,
) -> String {
    format!(
        "## Execution History\n\n- Blocked: {}\n- Resumed at iteration {}\n- Completed after {} total iterations\n",
        original_blocking_issue, resumed_at_iteration, final_iterations
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"## Goal
Implement the widget factory.

## Task Type
feature

## Suggested Roles
- developer
- tester

## Scope
### Allowed
- `src/**`
### Forbidden
- `.env*`
### Ask Before
- `Cargo.toml`

## Requirements
Must compile.

## Definition of Done
- [x] Widget trait defined
- [ ] Tests pass

## Notes
None.
"#;

    #[test]
    fn parses_full_task_file() {
        let task = Task::parse(PathBuf::from("t.md"), SAMPLE).unwrap();
        assert_eq!(task.goal, "Implement the widget factory.");
        assert_eq!(task.task_type, "feature");
        assert_eq!(task.suggested_roles, vec!["developer", "tester"]);
        assert_eq!(task.scope.allowed, vec!["src/**"]);
        assert_eq!(task.scope.forbidden, vec![".env*"]);
        assert_eq!(task.scope.ask_before, vec!["Cargo.toml"]);
        assert_eq!(task.definition_of_done.len(), 2);
        assert!(task.definition_of_done[0].checked);
        assert!(!task.definition_of_done[1].checked);
        assert!(task.blocked_status.is_none());
    }

    #[test]
    fn classifies_lifecycle_folder() {
        assert_eq!(
            LifecycleFolder::classify(Path::new("/proj/.ai/tasks/pending/t.md")),
            LifecycleFolder::Pending
        );
        assert_eq!(
            LifecycleFolder::classify(Path::new("/proj/.ai/tasks/blocked/t.md")),
            LifecycleFolder::Blocked
        );
        assert_eq!(
            LifecycleFolder::classify(Path::new("/proj/random/t.md")),
            LifecycleFolder::Unrecognized
        );
    }

    #[test]
    fn backtick_stripped_from_scope_patterns() {
        let scope = parse_scope("### Allowed\n- `src/**/*.rs`\n");
        assert_eq!(scope.allowed, vec!["src/**/*.rs"]);
    }

    #[test]
    fn append_section_separates_with_blank_line() {
        let out = append_section("## Goal\nDo it.\n", "## Status: COMPLETED\n\nok");
        assert!(out.contains("## Goal\nDo it.\n\n## Status: COMPLETED"));
    }

    #[test]
    fn blocked_section_contains_resume_instruction() {
        let section = render_blocked_section(3, &["src/a.rs".to_string()], "missing API key", Utc::now());
        assert!(section.contains("Blocking issue: missing API key"));
        assert!(section.contains("aidf run --resume"));
    }

    #[test]
    fn resumed_status_parses_back_into_blocked_status() {
        let section = render_blocked_section(3, &[], "missing API key", Utc::now());
        let content = format!("## Goal\nx\n\n{}", section);
        let task = Task::parse(PathBuf::from("t.md"), &content).unwrap();
        let blocked = task.blocked_status.expect("blocked status parsed");
        assert_eq!(blocked.previous_iteration, 3);
        assert_eq!(blocked.blocking_issue, "missing API key");
    }
}
