use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;

use stoz_lib::api::types::{MigrationOptionsPatch, TaskState, TaskStatus};
use stoz_lib::tasks::{format_bytes, history};
use stoz_lib::workflow::actions;
use stoz_lib::workflow::{DestinationPatch, FileSessionStorage};
use stoz_lib::{
    ClientConfig, ClientState, HttpGateway, MemoryNavigator, PollCadence, ProgressView, SyncEvent,
    WorkflowStep,
};

#[derive(Parser)]
#[command(name = "stoz-cli")]
#[command(about = "Storage migration client", long_about = None)]
struct Cli {
    /// YAML config file
    #[arg(short, long, default_value = "stoz.yaml")]
    config: PathBuf,

    /// Override the server address from the config
    #[arg(short, long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan source volumes (cached for a few minutes)
    Scan {
        #[arg(short, long)]
        force: bool,
    },
    /// Discover destination devices on the network
    Devices {
        /// Use the device at this index as the destination
        #[arg(long)]
        select: Option<usize>,
        #[arg(short, long)]
        username: Option<String>,
        /// Test the connection to the selected device (never stored)
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Choose source folders
    Select {
        paths: Vec<String>,
        /// Toggle each path instead of replacing the selection
        #[arg(short, long)]
        toggle: bool,
        #[arg(long)]
        clear: bool,
    },
    /// Set the destination
    Configure {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        username: Option<String>,
        /// Needed to list storages; never stored
        #[arg(short, long)]
        password: Option<String>,
        /// Storage target name
        #[arg(long)]
        storage: Option<String>,
        #[arg(long)]
        sub_path: Option<String>,
        /// Manual base path, used when no storage is chosen
        #[arg(long)]
        base_path: Option<String>,
    },
    /// Set migration options
    Options {
        #[arg(long)]
        overwrite: Option<bool>,
        #[arg(long)]
        skip_errors: Option<bool>,
        #[arg(long)]
        preserve_times: Option<bool>,
        #[arg(long)]
        include_recycle: Option<bool>,
    },
    /// Start the migration and monitor it
    Start {
        #[arg(short, long)]
        password: String,
        #[arg(long)]
        no_monitor: bool,
    },
    /// Follow a task's progress (Ctrl-C cancels it)
    Monitor {
        task_id: Option<String>,
        /// Poll at the slower history-view cadence
        #[arg(long)]
        detail: bool,
    },
    Pause {
        task_id: Option<String>,
    },
    Resume {
        task_id: Option<String>,
    },
    Cancel {
        task_id: Option<String>,
    },
    /// List past migrations
    History {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long)]
        status: Option<TaskState>,
    },
    /// Forget the current session
    Reset,
    /// Pick up a migration that was being monitored before
    ResumeSession,
}

type State = ClientState<HttpGateway>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut config = ClientConfig::load(&cli.config)?;
    if let Some(server) = cli.server {
        config.server = server;
    }
    let session = Arc::new(FileSessionStorage::new(config.session_dir.clone()));
    let mut state = ClientState::connect(config, session);

    match cli.command {
        Command::Scan { force } => scan(&state, force).await,
        Command::Devices {
            select,
            username,
            password,
        } => devices(&state, select, username, password).await,
        Command::Select {
            paths,
            toggle,
            clear,
        } => select(&state, paths, toggle, clear).await,
        Command::Configure {
            host,
            username,
            password,
            storage,
            sub_path,
            base_path,
        } => {
            let patch = DestinationPatch {
                host,
                username,
                password,
                base_path,
                sub_path,
                ..Default::default()
            };
            configure(&state, patch, storage).await
        }
        Command::Options {
            overwrite,
            skip_errors,
            preserve_times,
            include_recycle,
        } => {
            let mut workflow = state.workflow.lock().await;
            workflow.set_options(MigrationOptionsPatch {
                overwrite_existing: overwrite,
                skip_errors,
                preserve_times,
                include_recycle,
            });
            println!("⚙️  Options: {:?}", workflow.options());
            Ok(())
        }
        Command::Start {
            password,
            no_monitor,
        } => {
            let task_id = start(&state, password).await?;
            if no_monitor {
                return Ok(());
            }
            monitor(&state, &task_id, PollCadence::Wizard).await
        }
        Command::Monitor { task_id, detail } => {
            let task_id = resolve_task_id(&state, task_id).await?;
            let cadence = if detail {
                PollCadence::Detail
            } else {
                PollCadence::Wizard
            };
            monitor(&state, &task_id, cadence).await
        }
        Command::Pause { task_id } => {
            let task_id = resolve_task_id(&state, task_id).await?;
            state.synchronizer.pause(&task_id).await?;
            println!("⏸️  Pause requested for {task_id}");
            Ok(())
        }
        Command::Resume { task_id } => {
            let task_id = resolve_task_id(&state, task_id).await?;
            state.synchronizer.resume(&task_id).await?;
            println!("▶️  Resume requested for {task_id}");
            Ok(())
        }
        Command::Cancel { task_id } => {
            let task_id = resolve_task_id(&state, task_id).await?;
            state.synchronizer.cancel(&task_id).await?;
            println!("🛑 Cancel requested for {task_id}");
            Ok(())
        }
        Command::History { page, status } => show_history(&state, page, status).await,
        Command::Reset => {
            state.reset().await;
            println!("🧹 Session cleared");
            Ok(())
        }
        Command::ResumeSession => {
            let mut navigator = MemoryNavigator::new("/");
            match state.recover(&mut navigator).await {
                Some(route) => {
                    println!("🔁 Resuming {route}");
                    let task_id = state
                        .workflow
                        .lock()
                        .await
                        .task_id()
                        .map(str::to_string)
                        .context("Session has no task")?;
                    monitor(&state, &task_id, PollCadence::Wizard).await
                }
                None => {
                    let step = state.workflow.lock().await.step();
                    println!("Nothing to resume (current step: {step:?})");
                    Ok(())
                }
            }
        }
    }
}

async fn resolve_task_id(state: &State, task_id: Option<String>) -> anyhow::Result<String> {
    if let Some(task_id) = task_id {
        return Ok(task_id);
    }
    state
        .workflow
        .lock()
        .await
        .task_id()
        .map(str::to_string)
        .context("No task id given and none in the current session")
}

async fn scan(state: &State, force: bool) -> anyhow::Result<()> {
    println!("💾 Scanning source volumes...");
    let mut workflow = state.workflow.lock().await;
    let result = actions::load_scan(state.api.as_ref(), &mut workflow, force).await?;

    println!("Scanned at {}", result.scanned_at);
    for volume in &result.volumes {
        println!("📁 {} ({})", volume.name, volume.path);
        for folder in &volume.folders {
            let mark = if workflow.selection().contains(&folder.path) {
                "✅"
            } else {
                "  "
            };
            println!(
                "   {} {:<40} {:>12} {:>8} files",
                mark,
                folder.path,
                format_bytes(folder.size),
                folder.file_count
            );
        }
    }
    Ok(())
}

async fn devices(
    state: &State,
    select: Option<usize>,
    username: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    println!("🔍 Discovering devices...");
    let mut workflow = state.workflow.lock().await;
    let devices = actions::discover_devices(state.api.as_ref(), &mut workflow).await?;

    println!("Found {} device(s):", devices.len());
    println!("{:<4} {:<24} {:<28} {:<10}", "#", "NAME", "HOST", "VERSION");
    println!("{}", "-".repeat(68));
    for (i, device) in devices.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:<28} {:<10}",
            i,
            device.device_name,
            device.host(),
            device.os_version
        );
    }

    let Some(index) = select else {
        return Ok(());
    };
    let device = devices
        .get(index)
        .cloned()
        .with_context(|| format!("No device at index {index}"))?;
    println!("👉 Selected {}", device.host());
    workflow.select_device(Some(device));

    if username.is_some() || password.is_some() {
        workflow.set_destination(DestinationPatch {
            username,
            password,
            ..Default::default()
        })?;
        actions::test_connection(state.api.as_ref(), &workflow).await?;
        println!("✅ Connection OK");
    }
    Ok(())
}

async fn select(state: &State, paths: Vec<String>, toggle: bool, clear: bool) -> anyhow::Result<()> {
    let mut workflow = state.workflow.lock().await;
    if clear {
        workflow.clear_selection();
    }
    if toggle {
        for path in &paths {
            workflow.toggle_selection(path);
        }
    } else if !paths.is_empty() {
        workflow.set_selection(paths);
    }

    println!("📋 Selected {} folder(s):", workflow.selection().len());
    for path in workflow.selection() {
        println!("   {path}");
    }
    if workflow.advance(WorkflowStep::Configure) {
        println!("➡️  Next: configure the destination");
    }
    Ok(())
}

async fn configure(state: &State, patch: DestinationPatch, storage: Option<String>) -> anyhow::Result<()> {
    let mut workflow = state.workflow.lock().await;
    let has_password = patch.password.is_some();
    workflow.set_destination(patch)?;

    if has_password {
        let storages = actions::refresh_storages(state.api.as_ref(), &mut workflow).await?;
        println!("{:<20} {:<24} {:<8} {:<12} {:<8}", "NAME", "PATH", "TYPE", "FREE", "HEALTH");
        println!("{}", "-".repeat(74));
        for target in &storages {
            println!(
                "{:<20} {:<24} {:<8} {:<12} {:<8}",
                target.name,
                target.path,
                format!("{:?}", target.kind),
                format_bytes(target.available_bytes()),
                if target.is_healthy() { "ok" } else { "⚠️" }
            );
        }

        if let Some(name) = storage {
            let target = storages
                .iter()
                .find(|t| t.name == name)
                .cloned()
                .with_context(|| format!("No storage named {name}"))?;
            workflow.set_destination(DestinationPatch {
                storage: Some(Some(target)),
                ..Default::default()
            })?;
        }
    } else if storage.is_some() {
        anyhow::bail!("--password is required to choose a storage target");
    }

    let destination = workflow.destination();
    println!("🎯 Destination: {}@{}", destination.username, destination.host);
    println!("   Base path: {}", destination.base_path);
    if let Some(error) = workflow.destination_error() {
        eprintln!("   ⚠️  {error}");
    }
    Ok(())
}

async fn start(state: &State, password: String) -> anyhow::Result<String> {
    let mut workflow = state.workflow.lock().await;
    workflow.set_destination(DestinationPatch {
        password: Some(password),
        ..Default::default()
    })?;

    let task_id = actions::start_migration(state.api.as_ref(), &mut workflow).await?;
    println!("🚀 Migration started: {task_id}");
    println!("   Base path: {}", workflow.destination().base_path);
    Ok(task_id)
}

fn render(pb: &ProgressBar, status: &TaskStatus) {
    let view = ProgressView::from_status(status);
    pb.set_length(view.bytes.total.max(1));
    pb.set_position(view.bytes.done);

    let mut message = format!(
        "{} {:.1}% {}/{} files",
        view.state.label(),
        view.percent,
        view.files.done,
        view.files.total
    );
    if let Some(verify) = view.verification {
        message.push_str(&format!(" (verified {}/{})", verify.done, verify.total));
    } else if let Some(file) = &view.current_file {
        message.push_str(&format!(" - {}", file.path));
    }
    pb.set_message(message);
}

async fn monitor(state: &State, task_id: &str, cadence: PollCadence) -> anyhow::Result<()> {
    let mut events = state.synchronizer.subscribe();
    state
        .synchronizer
        .attach(task_id, cadence)
        .await
        .with_context(|| format!("Failed to load task {task_id}"))?;

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")?
            .progress_chars("#>-"),
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut cancel_requested = false;
    let last = loop {
        tokio::select! {
            _ = &mut interrupt => {
                interrupt.set(tokio::signal::ctrl_c());
                if cancel_requested {
                    // Second Ctrl-C: stop watching, leave the task alone.
                    break None;
                }
                cancel_requested = true;
                pb.println("🛑 Cancelling (Ctrl-C again to stop watching)...");
                if let Err(e) = state.synchronizer.cancel(task_id).await {
                    pb.println(format!("❌ Cancel failed: {e}"));
                    cancel_requested = false;
                }
            }
            event = events.recv() => match event {
                Ok(SyncEvent::PollFailed { message, .. }) => {
                    pb.println(format!("⚠️  {message}"));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break None,
            },
            _ = ticker.tick() => {}
        }

        let snapshot = state.tasks.read().await.live_status(task_id).cloned();
        if let Some(status) = snapshot {
            render(&pb, &status);
            if status.status.is_terminal() {
                break Some(status);
            }
        }
    };
    state.synchronizer.detach(task_id);

    let Some(status) = last else {
        pb.abandon_with_message("Stopped watching");
        return Ok(());
    };

    match status.status {
        TaskState::Completed => pb.finish_with_message("✅ Migration complete!"),
        TaskState::Cancelled => pb.abandon_with_message("🛑 Migration cancelled"),
        _ => pb.abandon_with_message("❌ Migration failed!"),
    }
    println!();
    println!("📊 Results:");
    println!("   Files: {}/{}", status.processed_files, status.total_files);
    println!(
        "   Transferred: {} / {}",
        format_bytes(status.transferred_size),
        format_bytes(status.total_size)
    );
    if status.failed_files > 0 || status.verify_failed_files > 0 {
        println!(
            "   ⚠️  Failed: {} (verification: {})",
            status.failed_files, status.verify_failed_files
        );
    }
    if !status.error.is_empty() {
        eprintln!("❌ Error: {}", status.error);
    }

    if status.status == TaskState::Failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn show_history(state: &State, page: u32, status: Option<TaskState>) -> anyhow::Result<()> {
    history::load_page(state.api.as_ref(), &state.tasks, page).await?;

    let mut tasks = state.tasks.write().await;
    tasks.set_filter(status);
    let pagination = tasks.pagination();
    println!(
        "📜 Page {}/{} ({} tasks)",
        pagination.page + 1,
        pagination.total_pages.max(1),
        pagination.total
    );
    println!(
        "{:<38} {:<10} {:<12} {:<22} {:<20}",
        "TASK ID", "STATUS", "FILES", "SIZE", "CREATED"
    );
    println!("{}", "-".repeat(104));
    for task in tasks.filtered_tasks() {
        let created = task
            .created_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{:<38} {:<10} {:<12} {:<22} {:<20}",
            task.task_id,
            task.status.label(),
            format!("{}/{}", task.processed_files, task.total_files),
            format!(
                "{} / {}",
                format_bytes(task.transferred_size),
                format_bytes(task.total_size)
            ),
            created
        );
    }
    Ok(())
}
