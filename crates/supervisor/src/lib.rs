//! # Ironloop Supervisor
//!
//! The hot-swap machinery behind the `ironloop-warden` binary. The warden
//! keeps the agent binary running, installs a staged replacement when one
//! appears, watches the new build through a crash window, and rolls back to
//! the previous binary when the new one dies inside it.
//!
//! The swap itself is plain filesystem state: `current` is the running
//! binary, `staged` is where a build loop drops its candidate, `previous`
//! is the backup taken at swap time. Crash logs land in a dedicated
//! directory; the orchestrator reads them back at startup so a rolled-back
//! failure becomes a task for the next build cycle.

use chrono::Utc;
use ironloop_core::error::SupervisorError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Lines of captured child output kept in a crash log.
pub const OUTPUT_TAIL_LINES: usize = 80;

/// Where the supervisor is in its swap lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Running the current binary, polling for a staged one.
    Stable,
    /// Installing a staged binary.
    Swapping,
    /// New binary running, inside the crash window.
    Watching,
    /// New binary crashed inside the window; restoring the backup.
    RollingBack,
}

/// The three binary paths a swap operates on.
#[derive(Debug, Clone)]
pub struct HotSwap {
    pub current: PathBuf,
    pub staged: PathBuf,
    pub previous: PathBuf,
}

impl HotSwap {
    pub fn new(
        current: impl Into<PathBuf>,
        staged: impl Into<PathBuf>,
        previous: impl Into<PathBuf>,
    ) -> Self {
        Self {
            current: current.into(),
            staged: staged.into(),
            previous: previous.into(),
        }
    }

    /// Whether a non-empty staged binary is waiting to be installed.
    pub fn staged_ready(&self) -> bool {
        fs::metadata(&self.staged).map(|m| m.len() > 0).unwrap_or(false)
    }

    /// Whether a backup exists to roll back to.
    pub fn can_roll_back(&self) -> bool {
        self.previous.exists()
    }

    /// Install the staged binary: back up current, copy staged over it,
    /// make it executable, remove the staged file. A failure mid-install
    /// restores the backup before returning the error.
    pub fn swap(&self) -> Result<(), SupervisorError> {
        if self.current.exists() {
            fs::copy(&self.current, &self.previous)
                .map_err(|e| SupervisorError::SwapFailed(format!("backup: {e}")))?;
        }

        if let Err(e) = self.install(&self.staged) {
            warn!(error = %e, "install failed, restoring backup");
            if self.previous.exists() {
                let _ = self.install(&self.previous);
            }
            return Err(SupervisorError::SwapFailed(format!("install: {e}")));
        }

        fs::remove_file(&self.staged)
            .map_err(|e| SupervisorError::SwapFailed(format!("unstage: {e}")))?;
        info!(binary = %self.current.display(), "staged binary installed");
        Ok(())
    }

    /// Restore the backup over the current binary.
    pub fn rollback(&self) -> Result<(), SupervisorError> {
        if !self.previous.exists() {
            return Err(SupervisorError::RollbackFailed("no backup to restore".into()));
        }
        self.install(&self.previous)
            .map_err(|e| SupervisorError::RollbackFailed(e.to_string()))?;
        info!(binary = %self.current.display(), "previous binary restored");
        Ok(())
    }

    fn install(&self, source: &Path) -> std::io::Result<()> {
        fs::copy(source, &self.current)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.current, fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

/// What follows an agent exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    /// Crash inside the watch window; the previous binary was restored.
    RolledBack,
    /// Ordinary exit; restart the current binary.
    Restart,
}

/// Handle an agent exit. A death inside the watch window gets a crash log
/// and a rollback; anything else is a plain restart.
pub fn handle_exit(
    swap: &HotSwap,
    state: SupervisorState,
    uptime: Duration,
    watch_window: Duration,
    status: &str,
    failure_dir: &Path,
    agent_output: &str,
) -> ExitDisposition {
    if state == SupervisorState::Watching && uptime < watch_window {
        let state = SupervisorState::RollingBack;
        let reason = format!("new binary exited after {}s: {status}", uptime.as_secs());
        warn!(?state, %reason, "crash inside watch window, rolling back");
        if let Err(e) = write_crash_log(failure_dir, &reason, agent_output) {
            warn!(error = %e, "failed to write crash log");
        }
        if let Err(e) = swap.rollback() {
            warn!(error = %e, "rollback failed, keeping crashed binary");
        }
        return ExitDisposition::RolledBack;
    }

    if state == SupervisorState::Watching {
        info!("new binary survived the watch window");
    }
    ExitDisposition::Restart
}

/// One crash log on disk, newest first in listings.
#[derive(Debug, Clone)]
pub struct CrashLog {
    pub path: PathBuf,
    /// The header line: when it crashed and why.
    pub summary: String,
}

/// Write a timestamped crash log containing the failure signal and the tail
/// of the captured child output. Returns the log path.
pub fn write_crash_log(
    dir: &Path,
    reason: &str,
    output: &str,
) -> Result<PathBuf, SupervisorError> {
    fs::create_dir_all(dir)?;
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("crash-{stamp}.log"));
    let body = format!(
        "crash at {}: {reason}\n\n{}\n",
        Utc::now().to_rfc3339(),
        tail_lines(output, OUTPUT_TAIL_LINES)
    );
    fs::write(&path, body)?;
    warn!(log = %path.display(), reason, "crash log written");
    Ok(path)
}

/// List crash logs, newest first. Missing directory means no crashes.
pub fn list_crash_logs(dir: &Path, limit: usize) -> Vec<CrashLog> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("crash-") && n.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();
    // timestamp is in the file name, so lexical order is chronological
    paths.sort();
    paths.reverse();
    paths.truncate(limit);

    paths
        .into_iter()
        .map(|path| {
            let summary = fs::read_to_string(&path)
                .ok()
                .and_then(|s| s.lines().next().map(str::to_string))
                .unwrap_or_else(|| "unreadable crash log".into());
            CrashLog { path, summary }
        })
        .collect()
}

/// The last `n` lines of `text`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::write(path, content).unwrap();
    }

    fn swap_in(dir: &Path) -> HotSwap {
        HotSwap::new(
            dir.join("ironloop"),
            dir.join("ironloop.new"),
            dir.join("ironloop.prev"),
        )
    }

    #[test]
    fn staged_ready_requires_non_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        assert!(!swap.staged_ready());

        write(&swap.staged, "");
        assert!(!swap.staged_ready());

        write(&swap.staged, "new binary");
        assert!(swap.staged_ready());
    }

    #[test]
    fn swap_installs_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.current, "v1");
        write(&swap.staged, "v2");

        swap.swap().unwrap();

        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v2");
        assert_eq!(fs::read_to_string(&swap.previous).unwrap(), "v1");
        assert!(!swap.staged.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&swap.current).unwrap().permissions().mode();
            assert_eq!(mode & 0o755, 0o755);
        }
    }

    #[test]
    fn first_swap_works_without_existing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.staged, "v1");

        swap.swap().unwrap();
        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v1");
        assert!(!swap.can_roll_back());
    }

    #[test]
    fn rollback_restores_previous() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.current, "v1");
        write(&swap.staged, "v2");
        swap.swap().unwrap();

        swap.rollback().unwrap();
        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v1");
    }

    #[test]
    fn rollback_without_backup_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        assert!(matches!(
            swap.rollback(),
            Err(SupervisorError::RollbackFailed(_))
        ));
    }

    #[test]
    fn crash_in_watch_window_logs_and_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.current, "v1");
        write(&swap.staged, "v2");
        swap.swap().unwrap();

        let started = std::time::Instant::now();
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 1"])
            .status()
            .unwrap();
        let uptime = started.elapsed();

        let failure_dir = dir.path().join("build-failures");
        let disposition = handle_exit(
            &swap,
            SupervisorState::Watching,
            uptime,
            Duration::from_secs(30),
            &status.to_string(),
            &failure_dir,
            "agent output tail",
        );

        assert_eq!(disposition, ExitDisposition::RolledBack);
        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v1");
        let logs = list_crash_logs(&failure_dir, 10);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].summary.contains("new binary exited"));
    }

    #[test]
    fn survival_past_window_keeps_the_new_binary() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.current, "v1");
        write(&swap.staged, "v2");
        swap.swap().unwrap();

        let started = std::time::Instant::now();
        let status = std::process::Command::new("sh")
            .args(["-c", "sleep 0.2"])
            .status()
            .unwrap();
        let uptime = started.elapsed();

        let failure_dir = dir.path().join("build-failures");
        let disposition = handle_exit(
            &swap,
            SupervisorState::Watching,
            uptime,
            Duration::from_millis(10),
            &status.to_string(),
            &failure_dir,
            "",
        );

        assert_eq!(disposition, ExitDisposition::Restart);
        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v2");
        assert!(list_crash_logs(&failure_dir, 10).is_empty());
    }

    #[test]
    fn exit_outside_watching_state_is_a_plain_restart() {
        let dir = tempfile::tempdir().unwrap();
        let swap = swap_in(dir.path());
        write(&swap.current, "v1");

        let failure_dir = dir.path().join("build-failures");
        let disposition = handle_exit(
            &swap,
            SupervisorState::Stable,
            Duration::from_secs(1),
            Duration::from_secs(30),
            "exit status: 1",
            &failure_dir,
            "",
        );

        assert_eq!(disposition, ExitDisposition::Restart);
        assert_eq!(fs::read_to_string(&swap.current).unwrap(), "v1");
        assert!(list_crash_logs(&failure_dir, 10).is_empty());
    }

    #[test]
    fn crash_log_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let logs_dir = dir.path().join("build-failures");

        let output: String = (0..120).map(|i| format!("line {i}\n")).collect();
        write_crash_log(&logs_dir, "exited with code 101", &output).unwrap();

        let logs = list_crash_logs(&logs_dir, 10);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].summary.contains("exited with code 101"));

        let body = fs::read_to_string(&logs[0].path).unwrap();
        // only the tail of the output is kept
        assert!(body.contains("line 119"));
        assert!(!body.contains("line 10\n"));
    }

    #[test]
    fn listing_caps_and_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        for stamp in ["20260101-000000", "20260102-000000", "20260103-000000"] {
            write(
                &dir.path().join(format!("crash-{stamp}.log")),
                &format!("crash at {stamp}: boom\n"),
            );
        }
        write(&dir.path().join("notes.txt"), "not a crash log");

        let logs = list_crash_logs(dir.path(), 2);
        assert_eq!(logs.len(), 2);
        assert!(logs[0].summary.contains("20260103"));
        assert!(logs[1].summary.contains("20260102"));
    }

    #[test]
    fn missing_log_dir_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_crash_logs(&dir.path().join("nope"), 5).is_empty());
    }

    #[test]
    fn tail_keeps_short_text_whole() {
        assert_eq!(tail_lines("a\nb", 80), "a\nb");
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
    }
}
