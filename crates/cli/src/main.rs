//! `ironloop` — the agent's command line.
//!
//! `chat` and `heartbeat` run one full orchestrator invocation (and then a
//! compaction evaluation); `run` keeps doing that on a timer, which is what
//! the warden supervises. `tasks`, `memory`, and `status` talk to the store
//! directly without touching the model.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ironloop_agent::orchestrator::{HEARTBEAT_PREFIX, Orchestrator, OrchestratorConfig};
use ironloop_agent::tools::handoff::HandoffTool;
use ironloop_agent::tools::{executor_registry, light_registry, research_registry};
use ironloop_agent::{Compactor, LoopTuning, build_loop, handle_and_compact, ops_loop, research_loop};
use ironloop_config::{AppConfig, Paths};
use ironloop_core::memory::NewMemory;
use ironloop_core::model::ModelClient;
use ironloop_core::session::SessionStore;
use ironloop_core::task::TaskStatus;
use ironloop_model::AnthropicClient;
use ironloop_store::Store;
use ironloop_supervisor::list_crash_logs;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "ironloop", version, about = "Autonomous software agent control plane")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one message to the agent and print its report.
    Chat {
        #[arg(long)]
        message: String,
    },
    /// Send one scheduler tick.
    Heartbeat,
    /// Run continuously, sending a heartbeat every interval.
    Run {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Inspect and edit the task list.
    Tasks {
        #[command(subcommand)]
        command: TasksCommand,
    },
    /// Inspect and edit long-term memory.
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
    /// Show configuration and store health.
    Status,
}

#[derive(Subcommand)]
enum TasksCommand {
    List,
    Add {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 3)]
        priority: i32,
    },
    Start { id: i64 },
    Complete { id: i64 },
    Remove { id: i64 },
}

#[derive(Subcommand)]
enum MemoryCommand {
    Recall {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    Search {
        term: String,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    Store {
        content: String,
        #[arg(long, default_value = "")]
        tags: String,
        #[arg(long, default_value_t = 3)]
        importance: i32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let paths = Paths::resolve();
    let config = AppConfig::load(&paths.root).context("loading configuration")?;
    let store = open_store(&paths).await?;

    match cli.command {
        Command::Chat { message } => {
            let (orchestrator, compactor) = build_plane(&config, &paths, store)?;
            let report = handle_and_compact(&orchestrator, &compactor, &message).await;
            println!("{}", report.text);
        }
        Command::Heartbeat => {
            let (orchestrator, compactor) = build_plane(&config, &paths, store)?;
            let report =
                handle_and_compact(&orchestrator, &compactor, &heartbeat_message()).await;
            println!("{}", report.text);
        }
        Command::Run { interval_secs } => {
            let (orchestrator, compactor) = build_plane(&config, &paths, store)?;
            let interval = Duration::from_secs(interval_secs.max(1));
            info!(interval_secs, "agent running");
            loop {
                let report =
                    handle_and_compact(&orchestrator, &compactor, &heartbeat_message()).await;
                info!(report = %report.text, "heartbeat handled");
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = tokio::signal::ctrl_c() => {
                        info!("shutting down");
                        break;
                    }
                }
            }
        }
        Command::Tasks { command } => run_tasks(&store, command).await?,
        Command::Memory { command } => run_memory(&store, command).await?,
        Command::Status => run_status(&config, &paths, &store).await?,
    }
    Ok(())
}

fn heartbeat_message() -> String {
    format!("{HEARTBEAT_PREFIX} scheduled tick")
}

async fn open_store(paths: &Paths) -> Result<Store> {
    let db = paths.store_file();
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Store::open(&format!("sqlite://{}", db.display()))
        .await
        .context("opening store")
}

/// Wire the whole control plane: model client, tool registries, the three
/// loops, the orchestrator, and the compactor.
fn build_plane(
    config: &AppConfig,
    paths: &Paths,
    store: Store,
) -> Result<(Orchestrator, Compactor)> {
    let api_key = config
        .model
        .api_key
        .clone()
        .context("no API key: set IRONLOOP_API_KEY or model.api_key in config.toml")?;
    let model: Arc<dyn ModelClient> = Arc::new(
        AnthropicClient::new(api_key, config.model.model.clone())
            .with_base_url(config.model.base_url.clone())
            .with_timeout(Duration::from_secs(config.model.request_timeout_secs)),
    );

    let root = &paths.root;
    let platform = config.agent.platform_url.clone();
    let ops_dir = paths.ops_dir();

    let reviewer_tools = || light_registry(store.clone(), root, platform.clone());
    let build_tools = executor_registry(
        store.clone(),
        root,
        platform.clone(),
        HandoffTool::manual(&ops_dir),
    );
    let ops_tools = executor_registry(
        store.clone(),
        root,
        platform.clone(),
        HandoffTool::feedback(&ops_dir),
    );
    let research_tools = research_registry(store.clone(), root, platform.clone());

    let tuning = LoopTuning {
        max_iterations: config.agent.max_iterations,
        max_tool_iterations: config.agent.max_tool_iterations,
        max_output_tokens: config.model.max_tokens,
    };
    let build = build_loop(model.clone(), build_tools, reviewer_tools(), tuning);
    let ops = ops_loop(model.clone(), ops_tools, reviewer_tools(), tuning);
    let research = research_loop(model.clone(), research_tools, reviewer_tools(), tuning);

    let sessions = Arc::new(SessionStore::new());
    let orchestrator = Orchestrator::new(
        model.clone(),
        sessions.clone(),
        store.clone(),
        reviewer_tools(),
        build,
        ops,
        research,
        OrchestratorConfig {
            app_name: "ironloop".into(),
            user_id: "owner".into(),
            ops_dir,
            failure_dir: paths.failure_dir(),
            max_output_tokens: config.model.max_tokens,
        },
    );
    let compactor = Compactor::new(sessions, store, model)
        .with_threshold(config.compaction.threshold_tokens)
        .with_max_output_tokens(config.model.max_tokens);
    Ok((orchestrator, compactor))
}

async fn run_tasks(store: &Store, command: TasksCommand) -> Result<()> {
    match command {
        TasksCommand::List => {
            let tasks = store.list_tasks(None).await?;
            if tasks.is_empty() {
                println!("no tasks");
            }
            for task in tasks {
                println!(
                    "#{} [P{}] {} ({}){}",
                    task.id,
                    task.priority,
                    task.title,
                    task.status,
                    if task.description.is_empty() {
                        String::new()
                    } else {
                        format!(" — {}", task.description)
                    }
                );
            }
        }
        TasksCommand::Add { title, description, priority } => {
            let task = store.add_task(&title, &description, priority).await?;
            println!("added #{}: {}", task.id, task.title);
        }
        TasksCommand::Start { id } => {
            let task = store.start_task(id).await?;
            println!("started #{}: {}", task.id, task.title);
        }
        TasksCommand::Complete { id } => {
            let task = store.complete_task(id).await?;
            println!("completed #{}: {}", task.id, task.title);
        }
        TasksCommand::Remove { id } => {
            store.remove_task(id).await?;
            println!("removed #{id}");
        }
    }
    Ok(())
}

async fn run_memory(store: &Store, command: MemoryCommand) -> Result<()> {
    let print_records = |records: Vec<ironloop_core::memory::MemoryRecord>| {
        if records.is_empty() {
            println!("no memories");
        }
        for record in records {
            println!(
                "#{} [{}] {} ({})",
                record.id,
                record.kind,
                record.content,
                record.created_at.format("%Y-%m-%d %H:%M")
            );
        }
    };

    match command {
        MemoryCommand::Recall { limit } => print_records(store.recall_memories(limit).await?),
        MemoryCommand::Search { term, limit } => {
            print_records(store.search_memories(&term, limit).await?)
        }
        MemoryCommand::Store { content, tags, importance } => {
            let id = store
                .store_memory(NewMemory::new(content).tags(tags).importance(importance))
                .await?;
            println!("stored #{id}");
        }
    }
    Ok(())
}

async fn run_status(config: &AppConfig, paths: &Paths, store: &Store) -> Result<()> {
    println!("root:       {}", paths.root.display());
    println!("model:      {} @ {}", config.model.model, config.model.base_url);
    println!(
        "api key:    {}",
        if config.model.api_key.is_some() { "configured" } else { "missing" }
    );
    println!("memories:   {}", store.memory_count().await?);
    println!(
        "tasks:      {} pending, {} in progress, {} completed",
        store.task_count(TaskStatus::Pending).await?,
        store.task_count(TaskStatus::InProgress).await?,
        store.task_count(TaskStatus::Completed).await?,
    );
    let crashes = list_crash_logs(&paths.failure_dir(), usize::MAX);
    println!("crash logs: {}", crashes.len());
    if let Some(latest) = crashes.first() {
        println!("  latest: {}", latest.summary);
    }
    Ok(())
}
