//! Runs every task file currently pending under a working directory
//! concurrently, the way `aidf run --parallel <task>...` does — useful to
//! see the scope-conflict-aware wave scheduling in isolation.

use aidf::config::Config;
use aidf::context::LoadedContext;
use aidf::git_ops::Git2Ops;
use aidf::parallel::{ParallelExecutor, ParallelOptions};
use aidf::task::Task;
use aidf::watcher;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let working_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let pending_dir = working_dir.join(".ai/tasks/pending");

    let mut contexts = Vec::new();
    for path in watcher::scan_pending(&pending_dir) {
        let content = std::fs::read_to_string(&path)?;
        let task = Task::parse(path, &content)?;
        contexts.push(LoadedContext { agents_content: String::new(), role: None, task, plan: None, skills: vec![] });
    }

    if contexts.is_empty() {
        println!("no pending tasks under {}", pending_dir.display());
        return Ok(());
    }

    let git_ops = Arc::new(Git2Ops::new(working_dir.clone()));
    let parallel = ParallelExecutor::new(Config::default(), git_ops);
    let result = parallel.run(contexts, ParallelOptions::new(working_dir)).await;

    for task_result in &result.results {
        println!(
            "{:?} — {} ({} iteration(s))",
            task_result.status,
            task_result.task_path.display(),
            task_result.iterations
        );
    }
    println!("overall success: {}", result.success);

    Ok(())
}
