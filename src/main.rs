#![forbid(unsafe_code)]

//! `procwarden` daemon binary.
//!
//! Loads configuration, runs the startup sequence, arbitrates the service
//! port, launches background processes and their supervisors, serves the
//! local API and IPC socket, and hands control to the termination sequence
//! when asked to stop.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use procwarden::config::GlobalConfig;
use procwarden::context::{Channel, SessionContext};
use procwarden::dispatch::{Controller, Directive};
use procwarden::ipc::server::{spawn_ipc_server, IpcState};
use procwarden::orchestrator::child_monitor;
use procwarden::orchestrator::port_arbiter::PortArbiter;
use procwarden::orchestrator::power::PowerControl;
use procwarden::orchestrator::registry::ProcessRegistry;
use procwarden::orchestrator::restart::RestartCoordinator;
use procwarden::orchestrator::spawner::{self, ActiveChildren};
use procwarden::orchestrator::startup::StartupSequencer;
use procwarden::orchestrator::termination::TerminationSequencer;
use procwarden::orchestrator::watcher::RestartWatcher;
use procwarden::persistence::db;
use procwarden::persistence::restart_repo::RestartRepo;
use procwarden::speech::{ConsoleConversation, Conversation};
use procwarden::supervisor::system::SystemSupervisor;
use procwarden::supervisor::ProcessSupervisor;
use procwarden::{api, AppError, Result};

/// Upper bound for background tasks to wind down before termination.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "procwarden", about = "Process and session lifecycle controller", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Do not read phrases from stdin; control happens over IPC only.
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("procwarden bootstrap");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    let termination = runtime.block_on(run(args))?;
    termination.run()
}

async fn run(args: Cli) -> Result<TerminationSequencer> {
    // ── Load configuration ──────────────────────────────
    let config = Arc::new(GlobalConfig::load_from_path(&args.config)?);
    info!(name = config.name, "configuration loaded");

    let ctx = Arc::new(SessionContext::from_config(&config));
    let conversation: Arc<dyn Conversation> = Arc::new(ConsoleConversation);
    let supervisor: Arc<dyn ProcessSupervisor> =
        Arc::new(SystemSupervisor::new(GlobalConfig::root_password()));

    // ── Startup sequence ────────────────────────────────
    StartupSequencer::from_config(&config, Arc::clone(&ctx), Arc::clone(&conversation)).run();

    // ── Durable state ───────────────────────────────────
    let db = Arc::new(db::connect(&config.db_path()).await?);
    info!("database connected");

    let registry = Arc::new(ProcessRegistry::new(
        config.registry_path(),
        config.name.clone(),
        Arc::clone(&supervisor),
    ));

    let termination = TerminationSequencer::from_config(
        &config,
        Arc::clone(&ctx),
        Arc::clone(&conversation),
        Arc::clone(&supervisor),
        Arc::clone(&registry),
    )?;

    // ── Service port ────────────────────────────────────
    let ct = CancellationToken::new();
    let terminate = CancellationToken::new();

    let arbiter = PortArbiter::new(Arc::clone(&supervisor), Arc::clone(&ctx), config.entry_asset())?;
    let acquisition = arbiter.acquire(&config.server.host, config.server.port).await?;
    let api_handle = acquisition.into_listener().map(|listener| {
        let entry_asset = config.entry_asset();
        let api_ct = ct.clone();
        tokio::spawn(async move {
            if let Err(err) = api::serve(listener, entry_asset, api_ct).await {
                error!(%err, "local API failed");
            }
        })
    });

    // ── Background processes ────────────────────────────
    let children = ActiveChildren::default();
    let started = spawner::launch_all(&config, &registry, &children).await;
    info!(started, "background processes launched");

    let monitor_handle = child_monitor::spawn_child_monitor(
        Arc::clone(&children),
        Arc::clone(&registry),
        child_monitor::POLL_INTERVAL,
        ct.clone(),
    );

    let watcher_handle = RestartWatcher::new(
        RestartRepo::new(Arc::clone(&db)),
        Arc::clone(&registry),
        Arc::clone(&supervisor),
        Arc::clone(&children),
        config.working_dir.clone(),
    )
    .spawn(Duration::from_secs(config.restart.poll_seconds), ct.clone());

    // ── Controller ──────────────────────────────────────
    let restarts = Arc::new(RestartCoordinator::new(
        RestartRepo::new(Arc::clone(&db)),
        Arc::clone(&registry),
    ));
    let power = PowerControl::new(
        Arc::clone(&ctx),
        Arc::clone(&supervisor),
        config.keywords.clone(),
    );
    let controller = Arc::new(Controller::new(config.keywords.clone(), restarts, power));

    // ── IPC ─────────────────────────────────────────────
    let auth_token = uuid::Uuid::new_v4().to_string();
    write_token(&config.ipc_token_path(), &auth_token)?;
    let ipc_state = Arc::new(IpcState {
        controller: Arc::clone(&controller),
        registry: Arc::clone(&registry),
        auth_token: Some(auth_token),
        affirmative: config.keywords.ok.first().cloned().unwrap_or_default(),
        terminate: terminate.clone(),
    });
    let ipc_handle = match spawn_ipc_server(config.ipc.name.clone(), ipc_state, ct.clone()) {
        Ok(handle) => Some(handle),
        Err(err) => {
            error!(%err, "IPC server unavailable; continuing without it");
            None
        }
    };

    // ── Console ─────────────────────────────────────────
    if !args.no_console {
        spawn_console(
            Arc::clone(&controller),
            Arc::clone(&ctx),
            Arc::clone(&conversation),
            terminate.clone(),
        );
    }

    info!("procwarden ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = terminate.cancelled() => info!("termination requested"),
    }
    ct.cancel();

    let drain = async {
        if let Some(handle) = api_handle {
            let _ = handle.await;
        }
        if let Some(handle) = ipc_handle {
            let _ = handle.await;
        }
        let _ = tokio::join!(monitor_handle, watcher_handle);
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        warn!("background tasks did not stop in time");
    }

    Ok(termination)
}

/// Read phrases from stdin on a blocking thread and route them through the
/// controller as spoken requests.
fn spawn_console(
    controller: Arc<Controller>,
    ctx: Arc<SessionContext>,
    conversation: Arc<dyn Conversation>,
    terminate: CancellationToken,
) {
    let runtime = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        while !terminate.is_cancelled() {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => {
                    info!("console closed");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "console read failed");
                    break;
                }
            }
            let phrase = line.trim();
            if phrase.is_empty() || !ctx.is_listening() {
                continue;
            }
            match runtime.block_on(controller.handle(phrase, Channel::Voice, conversation.as_ref())) {
                Ok(Directive::Continue) => {}
                Ok(Directive::Terminate) => {
                    terminate.cancel();
                    break;
                }
                Err(err) => error!(%err, "failed to handle phrase"),
            }
        }
    });
}

fn write_token(path: &std::path::Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, token)
        .map_err(|err| AppError::Ipc(format!("failed to write ipc token {}: {err}", path.display())))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
