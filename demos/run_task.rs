//! Drives a single task file to completion programmatically, the way
//! `aidf run <task>` does internally — useful as a starting point for
//! embedding the executor in a larger tool instead of shelling out to the
//! CLI binary.

use aidf::config::Config;
use aidf::context::LoadedContext;
use aidf::executor::RunOptions;
use aidf::git_ops::Git2Ops;
use aidf::task::Task;
use aidf::Executor;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let working_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let task_path = working_dir.join(".ai/tasks/pending/example-task.md");

    if !task_path.exists() {
        std::fs::create_dir_all(task_path.parent().unwrap())?;
        std::fs::write(
            &task_path,
            "## Goal\n\
             Add a health-check endpoint.\n\n\
             ## Task Type\n\
             feature\n\n\
             ## Scope\n\n\
             ### Allowed\n\
             - `src/**`\n\n\
             ### Forbidden\n\
             - `Cargo.toml`\n\n\
             ## Requirements\n\
             Return 200 OK with an empty body.\n\n\
             ## Definition of Done\n\
             - [ ] Endpoint responds on GET /health\n",
        )?;
    }

    let content = std::fs::read_to_string(&task_path)?;
    let task = Task::parse(task_path.clone(), &content)?;
    let context = LoadedContext { agents_content: String::new(), role: None, task, plan: None, skills: vec![] };

    let git_ops = Arc::new(Git2Ops::new(working_dir.clone()));
    let executor = Executor::new(Config::default(), git_ops);

    let result = executor.run(context, RunOptions::new(working_dir)).await;
    println!("{:?} after {} iteration(s): {}", result.status, result.iterations, result.task_path.display());

    Ok(())
}
