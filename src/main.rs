//! `aidf` — thin CLI adapter around the core.
//!
//! All decision logic lives in [`aidf::Executor`]/[`aidf::ParallelExecutor`];
//! this binary only parses arguments, assembles a [`aidf::LoadedContext`]
//! from an already-on-disk task file, wires up a [`Git2Ops`], and prints
//! progress. Interactive prompts, spinners, colors, and config-file
//! discovery are explicit non-goals — flags and built-in defaults
//! are the only configuration surface here.

use aidf::config::{Config, ProviderType};
use aidf::context::LoadedContext;
use aidf::executor::{ExecutorCallbacks, ExecutorStatus, PhaseEvent, RunOptions};
use aidf::git_ops::{Git2Ops, GitOps};
use aidf::parallel::{ParallelExecutor, ParallelOptions};
use aidf::task::Task;
use aidf::watcher::{self, WatchOptions};
use aidf::Executor;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aidf")]
#[command(about = "A task runner for autonomous AI coding agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Working directory the task's scope, validation, and git operations
    /// are rooted at. Defaults to the current directory.
    #[arg(short = 'C', long, value_name = "DIR", global = true)]
    workdir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task (or several, with --parallel) to a terminal state.
    Run {
        /// Path to a task markdown file, or its bare name under
        /// `.ai/tasks/pending/`. Defaults to the first pending task found.
        task: Option<String>,

        /// Provider to drive this run with.
        #[arg(long, value_enum, default_value = "claude-cli")]
        provider: ProviderType,

        /// Model identifier passed to the provider.
        #[arg(long)]
        model: Option<String>,

        /// Maximum iterations before the run ends blocked.
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Build the prompt for the next iteration and print it without
        /// calling the provider.
        #[arg(long)]
        dry_run: bool,

        /// Resume a task currently sitting in `.ai/tasks/blocked/`.
        #[arg(long)]
        resume: bool,

        /// Run several tasks concurrently instead of the single `task`
        /// argument (scope-conflict-aware scheduling).
        #[arg(long, num_args = 1.., value_name = "TASK")]
        parallel: Vec<String>,

        /// Bound on how many tasks in `--parallel` run at once.
        #[arg(long, default_value_t = 3)]
        concurrency: usize,

        /// Mark the run for an eventual PR (honored by an external
        /// collaborator; the core does not open pull requests itself).
        #[arg(long)]
        auto_pr: bool,
    },
    /// Watch `.ai/tasks/pending/` and run each task file as it settles.
    Watch {
        /// Provider to drive each picked-up task with.
        #[arg(long, value_enum, default_value = "claude-cli")]
        provider: ProviderType,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "aidf=info".into()))
        .init();

    let cli = Cli::parse();
    let workdir = cli.workdir.unwrap_or_else(|| PathBuf::from("."));

    let exit_code = match cli.command {
        Commands::Run {
            task,
            provider,
            model,
            max_iterations,
            dry_run,
            resume,
            parallel,
            concurrency,
            auto_pr,
        } => {
            let config = build_config(provider, model, max_iterations, auto_pr);
            if parallel.is_empty() {
                run_single(&workdir, task, resume, dry_run, config).await
            } else {
                run_parallel(&workdir, parallel, concurrency, config).await
            }
        }
        Commands::Watch { provider } => run_watch(&workdir, provider).await,
    };

    std::process::exit(exit_code);
}

fn build_config(provider: ProviderType, model: Option<String>, max_iterations: Option<usize>, auto_pr: bool) -> Config {
    let mut config = Config::default();
    config.provider.provider_type = provider;
    if let Some(model) = model {
        config.provider.model = model;
    }
    if let Some(max_iterations) = max_iterations {
        config.execution.max_iterations = max_iterations;
    }
    config.permissions.auto_pr = auto_pr;
    config
}

/// Resolve a task argument (bare name, relative path, or absolute path) to
/// a task file on disk, falling back to the first file
/// `watcher::scan_pending` finds under `.ai/tasks/pending/` when no task
/// was named.
fn resolve_task_path(workdir: &Path, task: Option<String>) -> Result<PathBuf> {
    if let Some(task) = task {
        let candidate = PathBuf::from(&task);
        if candidate.is_absolute() && candidate.exists() {
            return Ok(candidate);
        }
        let direct = workdir.join(&task);
        if direct.exists() {
            return Ok(direct);
        }
        for folder in ["pending", "blocked", "completed"] {
            let guess = workdir.join(".ai/tasks").join(folder).join(&task);
            if guess.exists() {
                return Ok(guess);
            }
        }
        bail!("task file not found: {}", task);
    }

    let pending_dir = workdir.join(".ai/tasks/pending");
    let mut pending = watcher::scan_pending(&pending_dir);
    pending.sort();
    pending
        .into_iter()
        .next()
        .with_context(|| format!("no pending task files under {}", pending_dir.display()))
}

/// Build a [`LoadedContext`] from a task file on disk. Role/plan/skill
/// loading is an external-loader concern left empty
/// here; only `AGENTS.md` is read, if present, for project context.
fn load_context(workdir: &Path, task_path: &Path) -> Result<LoadedContext> {
    let content = std::fs::read_to_string(task_path)
        .with_context(|| format!("failed to read task file {}", task_path.display()))?;
    let task = Task::parse(task_path.to_path_buf(), &content)?;

    let agents_content = [workdir.join(".ai/AGENTS.md"), workdir.join("AGENTS.md")]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .unwrap_or_default();

    Ok(LoadedContext { agents_content, role: None, task, plan: None, skills: vec![] })
}

/// Prints iteration/phase progress to stdout and denies any `ASK_USER`
/// scope prompt by default — a full interactive confirmation UI is a
/// named CLI non-goal.
struct CliCallbacks {
    label: Option<String>,
}

#[async_trait::async_trait]
impl ExecutorCallbacks for CliCallbacks {
    fn on_phase(&self, event: PhaseEvent) {
        println!("{}[phase] {:?}", self.prefix(), event);
    }

    fn on_iteration(&self, state: &aidf::executor::ExecutorState) {
        println!(
            "{}[iteration {}] {} file(s) modified, {} consecutive failure(s), {} conversation message(s)",
            self.prefix(),
            state.iteration,
            state.files_modified.len(),
            state.consecutive_failures,
            state.conversation_message_count
        );
    }

    fn on_output(&self, chunk: &str) {
        println!("{}{}", self.prefix(), chunk);
    }

    async fn on_ask_user(&self, prompt: &str, files: &[String]) -> bool {
        println!(
            "{}[scope] {} ({} file(s)) — denied by default in non-interactive mode",
            self.prefix(),
            prompt,
            files.len()
        );
        false
    }
}

impl CliCallbacks {
    fn prefix(&self) -> String {
        match &self.label {
            Some(label) => format!("[{}] ", label),
            None => String::new(),
        }
    }
}

async fn run_single(workdir: &Path, task: Option<String>, resume: bool, dry_run: bool, config: Config) -> i32 {
    let task_path = match resolve_task_path(workdir, task) {
        Ok(path) => path,
        Err(err) => {
            eprintln!("error: {err:#}");
            return 2;
        }
    };

    let context = match load_context(workdir, &task_path) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("error: {err:#}");
            return 2;
        }
    };

    if resume && context.task.blocked_status.is_none() {
        eprintln!("error: --resume given but {} has no recorded blocked status", task_path.display());
        return 2;
    }

    let git_ops: Arc<dyn GitOps> = Arc::new(Git2Ops::new(workdir.to_path_buf()));
    let executor = Executor::new(config, git_ops);

    let mut options = RunOptions::new(workdir.to_path_buf());
    options.dry_run = dry_run;
    options.callbacks = Arc::new(CliCallbacks { label: None });

    let result = executor.run(context, options).await;
    print_result(&result);

    match result.status {
        ExecutorStatus::Completed | ExecutorStatus::DryRun => 0,
        _ => 1,
    }
}

async fn run_parallel(workdir: &Path, tasks: Vec<String>, concurrency: usize, config: Config) -> i32 {
    let mut contexts = Vec::with_capacity(tasks.len());
    for task in tasks {
        let task_path = match resolve_task_path(workdir, Some(task)) {
            Ok(path) => path,
            Err(err) => {
                eprintln!("error: {err:#}");
                return 2;
            }
        };
        match load_context(workdir, &task_path) {
            Ok(context) => contexts.push(context),
            Err(err) => {
                eprintln!("error: {err:#}");
                return 2;
            }
        }
    }

    let git_ops: Arc<dyn GitOps> = Arc::new(Git2Ops::new(workdir.to_path_buf()));
    let parallel = ParallelExecutor::new(config, git_ops);
    let mut options = ParallelOptions::new(workdir.to_path_buf());
    options.concurrency = concurrency;

    let result = parallel.run(contexts, options).await;
    for r in &result.results {
        print_result(r);
    }

    if result.success {
        0
    } else {
        1
    }
}

async fn run_watch(workdir: &Path, provider: ProviderType) -> i32 {
    let pending_dir = workdir.join(".ai/tasks/pending");
    let workdir = workdir.to_path_buf();

    let outcome = watcher::run(WatchOptions::new(pending_dir), move |task_path| {
        let workdir = workdir.clone();
        async move {
            let context = match load_context(&workdir, &task_path) {
                Ok(context) => context,
                Err(err) => {
                    eprintln!("error: {err:#}");
                    return;
                }
            };

            let mut config = Config::default();
            config.provider.provider_type = provider;

            let git_ops: Arc<dyn GitOps> = Arc::new(Git2Ops::new(workdir.clone()));
            let executor = Executor::new(config, git_ops);
            let mut options = RunOptions::new(workdir.clone());
            let label = task_path.file_stem().map(|s| s.to_string_lossy().to_string());
            options.callbacks = Arc::new(CliCallbacks { label });

            let result = executor.run(context, options).await;
            print_result(&result);
        }
    })
    .await;

    match outcome {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("watcher error: {err:#}");
            1
        }
    }
}

fn print_result(result: &aidf::ExecutorResult) {
    println!(
        "\n=== {} — {:?} after {} iteration(s) ===",
        result.task_path.display(),
        result.status,
        result.iterations
    );
    if !result.files_modified.is_empty() {
        println!("files modified:");
        for f in &result.files_modified {
            println!("  - {}", f);
        }
    }
    if let Some(reason) = &result.blocked_reason {
        println!("blocked: {}", reason);
    }
    if let Some(error) = &result.error {
        println!("error [{:?}/{:?}]: {}", result.error_category, result.error_code, error);
    }
}
