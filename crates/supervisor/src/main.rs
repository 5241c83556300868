//! `ironloop-warden` — keeps the agent process alive and hot-swaps builds.
//!
//! Foreground loop: spawn the agent binary, mirror its output into the agent
//! log, poll for a staged binary. When one appears the child is stopped, the
//! binary swapped, and the replacement watched through a crash window; an
//! exit inside the window rolls the swap back and records a crash log for
//! the orchestrator to surface.

use anyhow::{Context, Result};
use clap::Parser;
use ironloop_config::{AppConfig, Paths};
use ironloop_supervisor::{
    ExitDisposition, HotSwap, SupervisorState, handle_exit, list_crash_logs, tail_lines,
};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ironloop-warden", about = "Process supervisor for the ironloop agent")]
struct Args {
    /// Arguments passed to the agent binary.
    #[arg(trailing_var_arg = true, default_values_t = [String::from("run")])]
    agent_args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let paths = Paths::resolve();
    let config = AppConfig::load(&paths.root).context("loading configuration")?;

    let swap = HotSwap::new(paths.binary(), paths.staged_binary(), paths.prev_binary());
    let poll = Duration::from_secs(config.supervisor.poll_interval_secs);
    let watch_window = Duration::from_secs(config.supervisor.watch_window_secs);

    info!(
        binary = %swap.current.display(),
        staged = %swap.staged.display(),
        "warden starting"
    );
    for log in list_crash_logs(&paths.failure_dir(), 3) {
        warn!(crash = %log.summary, "previous crash on record");
    }

    let mut state = SupervisorState::Stable;
    loop {
        if !swap.current.exists() {
            if swap.staged_ready() {
                info!("no current binary, installing staged build");
                swap.swap()?;
            } else {
                sleep(poll).await;
                continue;
            }
        }

        let mut child = spawn_agent(&paths, &args.agent_args).await?;
        let started = Instant::now();
        info!(state = ?state, pid = child.id(), "agent started");

        // run until the child exits or a staged binary interrupts it
        let status = loop {
            tokio::select! {
                status = child.wait() => break Some(status?),
                _ = sleep(poll) => {
                    if swap.staged_ready() {
                        state = SupervisorState::Swapping;
                        info!("staged binary detected, stopping agent for swap");
                        child.start_kill().ok();
                        child.wait().await.ok();
                        break None;
                    }
                }
            }
        };

        match status {
            None => {
                // child stopped for a swap
                match swap.swap() {
                    Ok(()) => {
                        state = SupervisorState::Watching;
                        info!(window_secs = watch_window.as_secs(), "watching new binary");
                    }
                    Err(e) => {
                        error!(error = %e, "swap failed, keeping current binary");
                        state = SupervisorState::Stable;
                    }
                }
            }
            Some(status) => {
                let uptime = started.elapsed();
                let output = std::fs::read_to_string(paths.agent_log()).unwrap_or_default();
                let disposition = handle_exit(
                    &swap,
                    state,
                    uptime,
                    watch_window,
                    &status.to_string(),
                    &paths.failure_dir(),
                    &output,
                );
                state = SupervisorState::Stable;
                if disposition == ExitDisposition::Restart {
                    warn!(%status, uptime_secs = uptime.as_secs(), "agent exited, restarting");
                    sleep(poll).await;
                }
            }
        }
    }
}

/// Spawn the agent with stdout/stderr mirrored into the agent log, which the
/// crash log's output tail is cut from.
async fn spawn_agent(paths: &Paths, agent_args: &[String]) -> Result<Child> {
    if let Some(parent) = paths.agent_log().parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let mut child = Command::new(paths.binary())
        .args(agent_args)
        .current_dir(&paths.root)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("spawning {}", paths.binary().display()))?;

    if let Some(stdout) = child.stdout.take() {
        mirror_to_log(stdout, paths.agent_log());
    }
    if let Some(stderr) = child.stderr.take() {
        mirror_to_log(stderr, paths.agent_log());
    }
    Ok(child)
}

fn mirror_to_log(
    stream: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    log_path: std::path::PathBuf,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        let Ok(mut log) = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        else {
            return;
        };
        while let Ok(Some(line)) = lines.next_line().await {
            let _ = log.write_all(line.as_bytes()).await;
            let _ = log.write_all(b"\n").await;
        }
        // keep the log from growing without bound across long runs
        if let Ok(content) = tokio::fs::read_to_string(&log_path).await {
            if content.len() > 1024 * 1024 {
                let _ = tokio::fs::write(&log_path, tail_lines(&content, 2000)).await;
            }
        }
    });
}
