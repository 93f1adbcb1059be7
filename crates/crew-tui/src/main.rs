use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crew_agents::{AgentClient, CommandAgentClient};
use crew_core::{
    load_settings, Settings, Status, StoryDraft, StoryId, Task, TaskDraft, TaskId, TaskPatch,
    Validate, DEFAULT_CONFIG_FILE,
};
use crew_git::{GitCli, RepositoryManager, WorktreeProvider};
use crew_tui::{parse_checklist, run_tui, Backend, EventSources, TuiApp};
use crewd::{
    ChatConfig, ChatRunner, DispatchConfig, DispatchEvent, McpServer, MemoryTaskStore,
    ServiceError, SqliteTaskStore, TaskDispatcher, TaskFilter, TaskService, TaskStore, TaskTools,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_TICK_MS: u64 = 250;
const LOG_FILE_PREFIX: &str = "crew.log";

/// crew - plan stories and tasks, and hand tasks to coding agents.
#[derive(Parser, Debug)]
#[command(name = "crew")]
#[command(author, version, about = "Story and task board with agent dispatch", long_about = None)]
struct Cli {
    /// Settings file. A missing file means defaults.
    #[arg(long, global = true, env = "CREW_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Overrides `core.workdir`.
    #[arg(long, global = true, env = "CREW_WORKDIR")]
    workdir: Option<PathBuf>,

    /// Overrides `logger.level`. RUST_LOG still wins when set.
    #[arg(long = "log-level", global = true, env = "CREW_LOG")]
    log_level: Option<String>,

    /// Keep stories and tasks in memory only.
    #[arg(long, global = true)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive board (default)
    Tui,
    /// Serve the task tools over MCP on stdin/stdout
    Mcp,
    /// Story commands
    Story {
        #[command(subcommand)]
        command: StoryCommands,
    },
    /// Task commands
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Inspect settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum StoryCommands {
    List {
        #[arg(long)]
        status: Option<Status>,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        status: Option<Status>,
    },
}

#[derive(Subcommand, Debug)]
enum TaskCommands {
    List {
        #[arg(long)]
        status: Option<Status>,
        /// Only tasks of this story
        #[arg(long, conflicts_with = "unassigned")]
        story: Option<String>,
        /// Only tasks without a story
        #[arg(long)]
        unassigned: bool,
    },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        story: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        /// Repository name from `core.repositories`
        #[arg(long)]
        repo: Option<String>,
        #[arg(long = "repo-url")]
        repo_url: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        /// Checklist items separated by ';', prefix "[x]" for done
        #[arg(long)]
        checklist: Option<String>,
    },
    /// Merge-update a task. An empty value clears an optional field.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        status: Option<Status>,
        #[arg(long)]
        story: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        repo: Option<String>,
        #[arg(long = "repo-url")]
        repo_url: Option<String>,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        checklist: Option<String>,
    },
    /// First task with the given status, or null
    Next {
        #[arg(long, default_value = "ready")]
        status: Status,
    },
    /// Run a task through the agent and wait for it
    Dispatch { id: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    Show,
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;
    let command = cli.command.unwrap_or(Commands::Tui);

    let _guard = init_logging(&settings, matches!(command, Commands::Tui))?;
    tracing::debug!(workdir = %settings.core.workdir.display(), "settings loaded");

    match command {
        Commands::Tui => run_board(settings, cli.ephemeral).await,
        Commands::Mcp => {
            let service = build_service(&settings, cli.ephemeral)?;
            let mut server = McpServer::new(TaskTools::new(service));
            server.run_stdio().await.context("mcp server failed")
        }
        Commands::Story { command } => {
            run_story_command(build_service(&settings, cli.ephemeral)?, command).await
        }
        Commands::Task { command } => run_task_command(&settings, cli.ephemeral, command).await,
        Commands::Config { command } => run_config_command(&settings, command),
    }
}

fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = load_settings(&cli.config)?;
    if let Some(workdir) = &cli.workdir {
        settings.core.workdir = workdir.clone();
    }
    if let Some(level) = &cli.log_level {
        settings.logger.level = level.clone();
    }
    Ok(settings)
}

/// The board owns the terminal, so its logs go to a rolling file.
fn init_logging(settings: &Settings, to_file: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logger.level));

    if to_file {
        let dir = settings.logs_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))?;
        return Ok(Some(guard));
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialise logging: {err}"))?;
    Ok(None)
}

fn build_service(settings: &Settings, ephemeral: bool) -> Result<TaskService> {
    let store: Arc<dyn TaskStore> = if ephemeral {
        Arc::new(MemoryTaskStore::new())
    } else {
        ensure_dir(&settings.core.workdir)?;
        Arc::new(SqliteTaskStore::new(settings.database_path()))
    };
    Ok(TaskService::new(store))
}

fn build_agents(settings: &Settings) -> Arc<dyn AgentClient> {
    Arc::new(CommandAgentClient::new(
        settings.agent.command.clone(),
        settings.agent.args.clone(),
    ))
}

fn build_worktrees(settings: &Settings) -> Arc<dyn WorktreeProvider> {
    Arc::new(RepositoryManager::new(
        GitCli::default(),
        &settings.core.workdir,
    ))
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

async fn run_board(settings: Settings, ephemeral: bool) -> Result<()> {
    let service = build_service(&settings, ephemeral)?;
    ensure_dir(&settings.core.workdir)?;
    let agents = build_agents(&settings);

    let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();
    let dispatcher = TaskDispatcher::new(
        service.clone(),
        build_worktrees(&settings),
        Arc::clone(&agents),
        DispatchConfig::from_settings(&settings),
    )
    .with_events(dispatch_tx);
    let (chat_tx, chat_rx) = mpsc::unbounded_channel();
    let chat = ChatRunner::new(agents, ChatConfig::from_settings(&settings), chat_tx);

    tracing::info!(ephemeral, "starting board");
    run_tui(
        TuiApp::with_settings(&settings),
        Backend::new(service, dispatcher, chat),
        EventSources {
            chat: chat_rx,
            dispatch: dispatch_rx,
        },
        Duration::from_millis(DEFAULT_TICK_MS),
    )
    .await?;
    Ok(())
}

async fn run_story_command(service: TaskService, command: StoryCommands) -> Result<()> {
    match command {
        StoryCommands::List { status } => print_json(&service.list_stories(status).await?),
        StoryCommands::Create {
            name,
            description,
            status,
        } => {
            let mut draft = StoryDraft::new(name, description);
            draft.status = status;
            print_json(&service.create_story(draft).await?)
        }
    }
}

async fn run_task_command(settings: &Settings, ephemeral: bool, command: TaskCommands) -> Result<()> {
    let service = build_service(settings, ephemeral)?;
    match command {
        TaskCommands::List {
            status,
            story,
            unassigned,
        } => {
            print_json(&list_tasks(&service, status, story, unassigned).await?)
        }
        TaskCommands::Next { status } => print_json(&service.next_task(status).await?),
        TaskCommands::Create {
            name,
            description,
            status,
            story,
            agent,
            repo,
            repo_url,
            branch,
            checklist,
        } => {
            let mut draft = TaskDraft::new(name, description);
            draft.status = status;
            draft.story_id = story.map(StoryId::new);
            draft.agent = agent;
            draft.repository_name = repo;
            draft.repository_url = repo_url;
            draft.branch_name = branch;
            draft.checklist = checklist.as_deref().map(parse_checklist);
            print_json(&service.create_task(draft).await?)
        }
        TaskCommands::Update {
            id,
            name,
            description,
            status,
            story,
            agent,
            repo,
            repo_url,
            branch,
            checklist,
        } => {
            let patch = TaskPatch {
                name,
                description,
                status,
                agent: clearable(agent),
                repository_name: clearable(repo),
                repository_url: clearable(repo_url),
                branch_name: clearable(branch),
                story_id: clearable(story).map(|story| story.map(StoryId::new)),
                checklist: clearable(checklist).map(|raw| raw.as_deref().map(parse_checklist)),
            };
            print_json(&service.update_task(&TaskId::new(id), patch).await?)
        }
        TaskCommands::Dispatch { id } => dispatch_task(settings, service, TaskId::new(id)).await,
    }
}

async fn list_tasks(
    service: &TaskService,
    status: Option<Status>,
    story: Option<String>,
    unassigned: bool,
) -> Result<Vec<Task>, ServiceError> {
    if unassigned {
        let mut tasks = service.list_unassigned_tasks().await?;
        if let Some(status) = status {
            tasks.retain(|task| task.status == status);
        }
        return Ok(tasks);
    }

    let mut filter = TaskFilter::all();
    if let Some(status) = status {
        filter = filter.with_status(status);
    }
    if let Some(story) = story {
        filter = filter.with_story(StoryId::new(story));
    }
    service.list_tasks(&filter).await
}

async fn dispatch_task(settings: &Settings, service: TaskService, task_id: TaskId) -> Result<()> {
    ensure_dir(&settings.core.workdir)?;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let dispatcher = TaskDispatcher::new(
        service,
        build_worktrees(settings),
        build_agents(settings),
        DispatchConfig::from_settings(settings),
    )
    .with_events(events_tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                DispatchEvent::Started { worktree, .. } => {
                    eprintln!("agent started in {}", worktree.display())
                }
                DispatchEvent::Output { text, .. } => println!("{text}"),
                DispatchEvent::Finished { .. } | DispatchEvent::Failed { .. } => break,
            }
        }
    });

    let result = dispatcher.dispatch(&task_id).await;
    drop(dispatcher);
    let _ = printer.await;

    let report = result?;
    eprintln!(
        "task {} finished on branch {} in {}",
        report.task_id,
        report.branch,
        report.worktree.display()
    );
    Ok(())
}

fn run_config_command(settings: &Settings, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            print!("{}", toml::to_string_pretty(settings)?);
            Ok(())
        }
        ConfigCommands::Validate => {
            let issues = settings.validate();
            for issue in &issues {
                let level = if issue.is_error() { "error" } else { "warning" };
                println!("{level}: {} ({})", issue.message, issue.code);
            }
            let errors = issues.iter().filter(|issue| issue.is_error()).count();
            if errors > 0 {
                bail!("{errors} settings error(s)");
            }
            println!("settings ok");
            Ok(())
        }
    }
}

/// `Some("")` clears the field, `Some(value)` sets it, `None` leaves it.
fn clearable(value: Option<String>) -> Option<Option<String>> {
    value.map(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
