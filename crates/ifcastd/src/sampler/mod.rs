//! Per-interface sampler subprocess supervision.
//!
//! Each configured interface gets one long-lived task that keeps one
//! sampling subprocess running against that interface, feeds its
//! stdout through the block parser, and applies completed samples to
//! the store in emission order.
//!
//! Failure handling per the error taxonomy:
//! - privilege errors (the tool needs raw sockets) and a missing
//!   command are configuration errors: the interface is marked failed
//!   immediately and never retried; other interfaces are unaffected
//! - any other exit restarts the subprocess after exponential backoff,
//!   escalating to a permanent failure mark after too many consecutive
//!   failures

pub mod parse;

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use ifcast_core::{InterfaceConfig, InterfaceId};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::hosts::HostNames;
use crate::store::StoreHandle;
use parse::BlockParser;

/// Supervision tunables, extracted from the daemon config.
#[derive(Debug, Clone)]
pub struct SamplerSettings {
    /// Sampling command invoked per interface.
    pub command: String,

    /// Connections kept per sample.
    pub display_cap: usize,

    /// First restart delay.
    pub backoff_base: Duration,

    /// Upper bound on the restart delay.
    pub backoff_cap: Duration,

    /// Consecutive failures before the interface is marked
    /// permanently failed.
    pub max_consecutive_failures: u32,
}

impl From<&DaemonConfig> for SamplerSettings {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            command: config.sampler_command.clone(),
            display_cap: config.top_connections,
            backoff_base: config.backoff_base(),
            backoff_cap: config.backoff_cap(),
            max_consecutive_failures: config.max_consecutive_failures,
        }
    }
}

/// How one subprocess run ended.
enum RunOutcome {
    /// Shutdown was requested; the child has been killed and reaped.
    Cancelled,

    /// The command could not be spawned at all.
    SpawnFailed(std::io::Error),

    /// Stderr indicates the tool lacked permission for raw capture.
    PrivilegeError(String),

    /// The subprocess exited on its own.
    Exited {
        /// Whether this run produced at least one valid sample.
        produced_samples: bool,
    },
}

/// Spawns the supervision task for one interface.
pub fn spawn_interface_sampler(
    settings: SamplerSettings,
    interface: InterfaceConfig,
    hosts: Arc<HostNames>,
    store: StoreHandle,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(supervise(settings, interface, hosts, store, cancel_token))
}

async fn supervise(
    settings: SamplerSettings,
    interface: InterfaceConfig,
    hosts: Arc<HostNames>,
    store: StoreHandle,
    cancel_token: CancellationToken,
) {
    let id = interface.id.clone();
    let mut consecutive_failures: u32 = 0;

    info!(
        interface = %id,
        command = settings.command,
        "Sampler supervision starting"
    );

    loop {
        if cancel_token.is_cancelled() {
            break;
        }

        match run_sampler_once(&settings, &id, &hosts, &store, &cancel_token).await {
            RunOutcome::Cancelled => break,

            RunOutcome::SpawnFailed(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(
                    interface = %id,
                    command = settings.command,
                    "Sampler command not found, marking interface failed"
                );
                store.mark_failed(id.clone()).await;
                break;
            }

            RunOutcome::PrivilegeError(detail) => {
                error!(
                    interface = %id,
                    detail,
                    "Sampler lacks capture privileges, marking interface failed"
                );
                store.mark_failed(id.clone()).await;
                break;
            }

            RunOutcome::SpawnFailed(e) => {
                warn!(interface = %id, error = %e, "Failed to spawn sampler");
                consecutive_failures = consecutive_failures.saturating_add(1);
            }

            RunOutcome::Exited { produced_samples } => {
                if produced_samples {
                    consecutive_failures = 0;
                }
                consecutive_failures = consecutive_failures.saturating_add(1);
            }
        }

        store.record_failure(id.clone(), consecutive_failures).await;

        if consecutive_failures >= settings.max_consecutive_failures {
            error!(
                interface = %id,
                consecutive_failures,
                "Too many consecutive sampler failures, marking interface failed"
            );
            store.mark_failed(id.clone()).await;
            break;
        }

        let delay = backoff_delay(
            settings.backoff_base,
            settings.backoff_cap,
            consecutive_failures,
        );
        warn!(
            interface = %id,
            consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            "Sampler exited, restarting after backoff"
        );

        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!(interface = %id, "Sampler supervision ended");
}

/// Restart delay for the nth consecutive failure: `base * 2^(n-1)`,
/// capped. Monotonic non-decreasing in `consecutive_failures`.
pub fn backoff_delay(base: Duration, cap: Duration, consecutive_failures: u32) -> Duration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    base.saturating_mul(2u32.saturating_pow(exponent)).min(cap)
}

/// Runs one subprocess from spawn to exit.
///
/// A fresh `BlockParser` is constructed per run, so a restarted
/// subprocess can never merge a stale partial block with new output.
async fn run_sampler_once(
    settings: &SamplerSettings,
    id: &InterfaceId,
    hosts: &Arc<HostNames>,
    store: &StoreHandle,
    cancel_token: &CancellationToken,
) -> RunOutcome {
    let mut child = match Command::new(&settings.command)
        .args([
            "-i",
            id.as_str(),
            "-t",
            "-P",
            "-N",
            "-L",
            &settings.display_cap.to_string(),
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return RunOutcome::SpawnFailed(e),
    };

    debug!(interface = %id, pid = child.id(), "Sampler subprocess started");

    let Some(stdout) = child.stdout.take() else {
        warn!(interface = %id, "Sampler subprocess has no stdout pipe");
        let _ = child.start_kill();
        let _ = child.wait().await;
        return RunOutcome::Exited {
            produced_samples: false,
        };
    };
    let stderr = child.stderr.take();

    let mut parser = BlockParser::new(id.clone(), settings.display_cap).with_hosts(Arc::clone(hosts));
    let mut lines = BufReader::new(stdout).lines();
    let mut produced_samples = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel_token.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                debug!(interface = %id, "Sampler subprocess terminated for shutdown");
                return RunOutcome::Cancelled;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(sample) = parser.push_line(&line) {
                            produced_samples = true;
                            if let Err(e) = store.apply_sample(sample).await {
                                warn!(interface = %id, error = %e, "Store rejected sample");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(interface = %id, error = %e, "Sampler stdout read error");
                        break;
                    }
                }
            }
        }
    }

    // Stdout closed: the subprocess is exiting. Collect stderr for
    // failure classification before reaping.
    let mut stderr_text = String::new();
    if let Some(mut pipe) = stderr {
        let _ = pipe.read_to_string(&mut stderr_text).await;
    }
    let status = child.wait().await;

    if looks_like_privilege_error(&stderr_text) {
        return RunOutcome::PrivilegeError(stderr_text.trim().to_string());
    }

    match status {
        Ok(status) => warn!(
            interface = %id,
            status = %status,
            stderr = stderr_text.trim(),
            produced_samples,
            "Sampler subprocess exited"
        ),
        Err(e) => warn!(interface = %id, error = %e, "Failed to reap sampler subprocess"),
    }

    RunOutcome::Exited { produced_samples }
}

/// Heuristic over stderr for the tool's raw-socket permission
/// failures.
fn looks_like_privilege_error(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("permission denied")
        || lowered.contains("operation not permitted")
        || lowered.contains("pcap_open_live")
        || lowered.contains("must run as root")
}
