//! Command-line interface.
//!
//! ```bash
//! avatar-overlay start --port 3001 --static-dir public
//! avatar-overlay start --detach --log-file logs/overlay.log
//! avatar-overlay stop
//! avatar-overlay mcp              # stdio MCP + HTTP on the configured port
//! avatar-overlay mcp --no-http    # stdio MCP only
//! avatar-overlay watch --url http://127.0.0.1:3001
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown

pub mod process;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::mcp::serve_stdio;
use crate::player::{BatchPlayer, ImageResolver, LogRenderer};
use crate::server::{self, AppState};
use crate::state::AvatarStateStore;
use crate::sync::{spawn_display, HttpViewSource, PollingSynchronizer};
use crate::telemetry::{init_tracing, LogTarget};

/// Avatar overlay state server and display client
#[derive(Parser, Debug)]
#[command(name = "avatar-overlay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server
    Start(StartArgs),
    /// Stop a server started with --detach
    Stop(StopArgs),
    /// Serve the avatar tools over MCP on stdio
    Mcp(McpArgs),
    /// Poll a running server and play its expressions to the log
    Watch(WatchArgs),
}

/// Flags shared by every command that hosts the state store.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// HTTP port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Expression catalog file
    #[arg(short = 'c', long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Directory served for unmatched paths
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,
}

impl ServerArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = catalog.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = Some(dir.clone());
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StartArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Run in the background and record the pid
    #[arg(short = 'd', long)]
    pub detach: bool,

    /// Append logs to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Pid file path
    #[arg(long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,
}

impl StartArgs {
    pub fn config(&self, mut config: Config) -> Config {
        self.server.apply(&mut config);
        if let Some(path) = &self.log_file {
            config.log_file = Some(path.clone());
        }
        if let Some(path) = &self.pid_file {
            config.pid_file = path.clone();
        }
        config
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct StopArgs {
    /// Pid file path
    #[arg(long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct McpArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Do not start the HTTP server alongside stdio
    #[arg(long)]
    pub no_http: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct WatchArgs {
    /// Server base URL (default: derived from host and port)
    #[arg(long)]
    pub url: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}

/// Run a parsed command line to completion.
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env().context("Invalid environment configuration")?;
    match cli.command {
        Command::Start(args) => start(args.config(config), args.detach).await,
        Command::Stop(args) => {
            init_tracing(LogTarget::Stdout)?;
            stop(args.pid_file.as_deref().unwrap_or(config.pid_file.as_path()))
        }
        Command::Mcp(args) => {
            let mut config = config;
            args.server.apply(&mut config);
            mcp(config, !args.no_http).await
        }
        Command::Watch(args) => watch(config, args).await,
    }
}

fn build_store(config: &Config) -> Arc<AvatarStateStore> {
    let catalog = Catalog::load(&config.catalog_path);
    info!(
        path = ?config.catalog_path,
        expressions = catalog.len(),
        "Expression catalog loaded"
    );
    Arc::new(AvatarStateStore::new(Arc::new(catalog)))
}

async fn start(config: Config, detach: bool) -> Result<()> {
    if detach {
        init_tracing(LogTarget::Stdout)?;
        return start_detached(&config);
    }

    init_tracing(LogTarget::file_or(config.log_file.as_deref(), LogTarget::Stdout))?;
    process::check_existing(&config.pid_file)?;
    process::write_pid_file(&config.pid_file, std::process::id())?;

    let result = serve_foreground(&config).await;
    process::remove_pid_file(&config.pid_file);
    result
}

async fn serve_foreground(config: &Config) -> Result<()> {
    let store = build_store(config);
    let bind_addr = config.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {bind_addr}"))?;
    server::serve(
        listener,
        AppState::new(store),
        config.static_dir.clone(),
        shutdown_signal(),
    )
    .await
    .context("Server failed")
}

/// `<tmp>/avatar-overlay.log`
pub fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("avatar-overlay.log")
}

/// Arguments for the re-executed foreground server.
fn detached_args(config: &Config, log_file: &Path) -> Vec<String> {
    let mut args = vec![
        "start".to_string(),
        "--port".to_string(),
        config.port.to_string(),
        "--host".to_string(),
        config.host.clone(),
        "--catalog".to_string(),
        config.catalog_path.display().to_string(),
        "--pid-file".to_string(),
        config.pid_file.display().to_string(),
        "--log-file".to_string(),
        log_file.display().to_string(),
    ];
    if let Some(dir) = &config.static_dir {
        args.push("--static-dir".to_string());
        args.push(dir.display().to_string());
    }
    args
}

fn start_detached(config: &Config) -> Result<()> {
    process::check_existing(&config.pid_file)?;
    let log_file = config.log_file.clone().unwrap_or_else(default_log_path);
    let pid = process::spawn_detached(&detached_args(config, &log_file))?;
    process::write_pid_file(&config.pid_file, pid)?;
    info!(
        pid = pid,
        url = %config.base_url(),
        log_file = ?log_file,
        "avatar-overlay started in background"
    );
    Ok(())
}

fn stop(pid_file: &Path) -> Result<()> {
    let Some(pid) = process::read_pid_file(pid_file)? else {
        warn!(path = ?pid_file, "No PID file found; is the server running?");
        return Ok(());
    };
    if !process::is_running(pid) {
        warn!(pid = pid, "Process not running; removing stale PID file");
        process::remove_pid_file(pid_file);
        return Ok(());
    }
    process::terminate(pid)?;
    process::remove_pid_file(pid_file);
    info!(pid = pid, "avatar-overlay stopped");
    Ok(())
}

async fn mcp(config: Config, with_http: bool) -> Result<()> {
    init_tracing(LogTarget::file_or(config.log_file.as_deref(), LogTarget::Stderr))?;
    let state = AppState::new(build_store(&config));

    let (stop_http, http_stopped) = tokio::sync::oneshot::channel::<()>();
    let mut http = None;
    if with_http {
        match TcpListener::bind(config.bind_addr()).await {
            Ok(listener) => {
                http = Some(tokio::spawn(server::serve(
                    listener,
                    state.clone(),
                    config.static_dir.clone(),
                    async move {
                        let _ = http_stopped.await;
                    },
                )));
            }
            Err(e) => {
                warn!(
                    addr = %config.bind_addr(),
                    error = %e,
                    "HTTP server unavailable; continuing with stdio only"
                );
            }
        }
    }

    tokio::select! {
        result = serve_stdio(&state.mcp) => result.context("MCP stdio transport failed")?,
        _ = shutdown_signal() => {}
    }

    let _ = stop_http.send(());
    if let Some(handle) = http {
        match handle.await {
            Ok(Err(e)) => warn!(error = %e, "HTTP server ended with error"),
            Err(e) => warn!(error = %e, "HTTP server task failed"),
            Ok(Ok(())) => {}
        }
    }
    Ok(())
}

async fn watch(mut config: Config, args: WatchArgs) -> Result<()> {
    if let Some(ms) = args.interval_ms {
        config.poll_interval = Duration::from_millis(ms.max(1));
    }
    init_tracing(LogTarget::file_or(config.log_file.as_deref(), LogTarget::Stdout))?;

    let source = HttpViewSource::new(args.url.unwrap_or_else(|| config.base_url()));
    info!(url = %source.base_url(), "Watching avatar state");

    let catalog = tokio::select! {
        catalog = wait_for_catalog(&source, config.poll_interval) => catalog,
        _ = shutdown_signal() => return Ok(()),
    };
    let resolver = ImageResolver::new().with_catalog(Arc::new(catalog));
    let display = spawn_display(
        PollingSynchronizer::new(source).with_interval(config.poll_interval),
        BatchPlayer::new(resolver),
        LogRenderer::new(),
    );

    shutdown_signal().await;
    display.shutdown().await;
    Ok(())
}

/// Retry the catalog fetch every `retry` until the server answers.
async fn wait_for_catalog(source: &HttpViewSource, retry: Duration) -> Catalog {
    loop {
        match source.fetch_catalog().await {
            Ok(catalog) => return catalog,
            Err(e) => {
                warn!(error = %e, "Catalog fetch failed; retrying");
                tokio::time::sleep(retry).await;
            }
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
