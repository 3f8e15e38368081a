//! ifcast daemon - iftop supervision and WebSocket broadcast server
//!
//! This binary drives one iftop subprocess per configured interface,
//! parses its output into per-connection bandwidth samples, and
//! streams them to browser clients over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! ifcastd start -c /etc/ifcast.toml
//!
//! # Start the daemon (background/daemonized)
//! ifcastd start -d
//!
//! # Stop the daemon
//! ifcastd stop
//!
//! # Check daemon status
//! ifcastd status
//!
//! # Enable debug logging
//! RUST_LOG=ifcastd=debug ifcastd start
//! ```
//!
//! # Signal Handling
//!
//! SIGTERM/SIGINT trigger a graceful shutdown: every sampler
//! subprocess is killed and reaped and every client session closed
//! before the process exits.

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ifcastd::broadcast::{spawn_broadcaster, ClientRegistry};
use ifcastd::config::{DaemonConfig, DEFAULT_CONFIG_PATH};
use ifcastd::hosts::HostNames;
use ifcastd::sampler::{spawn_interface_sampler, SamplerSettings};
use ifcastd::server::{self, AppState};
use ifcastd::store::spawn_store;

/// ifcast daemon - per-interface bandwidth broadcast
#[derive(Parser, Debug)]
#[command(name = "ifcastd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Config file path (falls back to $IFCAST_CONFIG, then the
        /// default location)
        #[arg(short = 'c', long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ifcast");
    state_dir.join("ifcastd.pid")
}

/// Returns the path to the log file.
fn log_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("ifcast");
    state_dir.join("ifcastd.log")
}

/// Reads the PID from the PID file, if it exists.
fn read_pid() -> Option<u32> {
    let path = pid_file_path();
    let mut file = File::open(&path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Writes the current PID to the PID file.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file.
fn remove_pid_file() {
    let path = pid_file_path();
    let _ = fs::remove_file(path);
}

/// Checks if a process with the given PID is running.
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{}", pid)).exists()
}

/// Checks if the daemon is already running.
fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file - remove it
        remove_pid_file();
    }
    None
}

/// Sends SIGTERM to the daemon process.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let result = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {}", pid);
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Resolves the config path: flag, then environment, then default.
fn resolve_config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var("IFCAST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {})", pid);
                eprintln!("Use 'ifcastd stop' to stop it first.");
                process::exit(1);
            }

            let config_path = resolve_config_path(config);

            if daemon {
                // Daemonize before starting the tokio runtime
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config_path);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {})...", pid);
                stop_daemon(pid)?;

                // Wait for process to exit (up to 5 seconds)
                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {})", pid);
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = File::create(&log_path).context("Failed to create log file for stderr")?;

    let daemonize = Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr);

    daemonize.start().context("Failed to daemonize")?;

    Ok(())
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config_path: PathBuf) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ifcastd=info".parse()?)
                .add_directive("ifcast_core=info".parse()?)
                .add_directive("ifcast_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        config = %config_path.display(),
        "ifcast daemon starting"
    );

    let config = DaemonConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // CAP_NET_RAW can stand in for root, so this is only a warning
    if unsafe { libc::geteuid() } != 0 {
        warn!("Not running as root; the sampler may fail to open capture sockets");
    }

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    // Host names are loaded once; misses are quiet no-ops
    let hosts = Arc::new(
        HostNames::load(
            config.ethers_file.as_deref(),
            config.lease_command.as_deref(),
        )
        .await,
    );
    if !hosts.is_empty() {
        info!(entries = hosts.len(), "Host name map loaded");
    }

    // Spawn the interface state store, seeded with every configured
    // interface so clients always see the full set
    let store = spawn_store(config.interfaces.clone());
    info!(interfaces = config.interfaces.len(), "Interface store started");

    let registry = Arc::new(ClientRegistry::new(
        config.max_clients,
        config.client_queue_depth,
    ));
    let broadcaster = spawn_broadcaster(&store, Arc::clone(&registry), cancel_token.clone());

    // One supervision task per interface. Interfaces missing from the
    // host are a per-interface config error; the rest continue.
    let host_interfaces = sysinfo::Networks::new_with_refreshed_list();
    let settings = SamplerSettings::from(&config);
    let mut sampler_handles = Vec::with_capacity(config.interfaces.len());

    for iface in &config.interfaces {
        let present = host_interfaces
            .iter()
            .any(|(name, _)| name.as_str() == iface.id.as_str());
        if !present {
            error!(
                interface = %iface.id,
                "Configured interface not present on this host, marking failed"
            );
            store.mark_failed(iface.id.clone()).await;
            continue;
        }

        sampler_handles.push(spawn_interface_sampler(
            settings.clone(),
            iface.clone(),
            Arc::clone(&hosts),
            store.clone(),
            cancel_token.clone(),
        ));
    }

    let state = AppState {
        store,
        registry,
        cancel_token: cancel_token.clone(),
    };

    if let Err(e) = server::serve(config.listen_addr, state).await {
        error!(error = %e, "Server error");
        cancel_token.cancel();
    }

    // The server only returns once sessions are closing; wait for the
    // samplers to kill and reap their subprocesses before exiting.
    cancel_token.cancel();
    for handle in sampler_handles {
        let _ = handle.await;
    }
    let _ = broadcaster.await;

    info!("ifcast daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
