//! Status file: publishes the server's state as JSON for operators and
//! supervisors, on every state transition and every few hundred ticks.
//!
//! Uses atomic write pattern: write to temp file then rename.
use crate::daemon::DaemonState;
use crate::runtime::RuntimeState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The JSON payload written to the status file.
#[derive(Debug, Clone, Serialize)]
pub struct StatusData {
    pub pid: u32,
    pub state: RuntimeState,
    pub daemon: DaemonState,
    pub ticks: u64,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Manages the status file lifecycle.
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Atomically write status data to the status file.
    ///
    /// Writes to a temporary file in the same directory, then renames it over
    /// the target so readers never see a partial write.
    pub fn write(&self, data: &StatusData) -> Result<(), StatusError> {
        let json =
            serde_json::to_string_pretty(data).map_err(|e| StatusError::Serialize { source: e })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StatusError::Write {
            path: dir.to_path_buf(),
            source: e,
        })?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| StatusError::Write {
                path: tmp.path().to_path_buf(),
                source: e,
            })?;

        let from = tmp.path().to_path_buf();
        tmp.persist(&self.path).map_err(|e| StatusError::Rename {
            from,
            to: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Remove the status file (on clean shutdown).
    pub fn remove(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Builds [`StatusData`] for each update and decides when ticks are worth
/// publishing.
pub struct StatusTracker {
    file: StatusFile,
    pid: u32,
    daemon: DaemonState,
    started_at: DateTime<Utc>,
    interval_ticks: u64,
    last_published_tick: u64,
    state: RuntimeState,
}

impl StatusTracker {
    pub fn new(path: PathBuf, daemon: DaemonState, interval_ticks: u64) -> Self {
        Self {
            file: StatusFile::new(path),
            pid: std::process::id(),
            daemon,
            started_at: Utc::now(),
            interval_ticks,
            last_published_tick: 0,
            state: RuntimeState::Initializing,
        }
    }

    /// Record a state transition and write the status file.
    pub fn update(&mut self, state: RuntimeState, ticks: u64) {
        self.state = state;
        self.publish(ticks);
    }

    /// Called after every fired tick; writes every `interval_ticks` ticks.
    pub fn tick(&mut self, ticks: u64) {
        if self.interval_ticks == 0 {
            return;
        }
        if ticks.saturating_sub(self.last_published_tick) >= self.interval_ticks {
            self.publish(ticks);
        }
    }

    fn publish(&mut self, ticks: u64) {
        let data = StatusData {
            pid: self.pid,
            state: self.state,
            daemon: self.daemon,
            ticks,
            started_at: self.started_at,
            last_update: Utc::now(),
        };
        self.last_published_tick = ticks;
        if let Err(e) = self.file.write(&data) {
            tracing::warn!(error = %e, "failed to write status file");
        }
    }

    pub fn remove(&self) {
        self.file.remove();
    }
}

/// Errors from status file operations.
#[derive(Debug)]
pub enum StatusError {
    Serialize {
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusError::Serialize { source } => write!(f, "failed to serialize status: {source}"),
            StatusError::Write { path, source } => {
                write!(
                    f,
                    "failed to write temp status file in {}: {source}",
                    path.display()
                )
            }
            StatusError::Rename { from, to, source } => {
                write!(
                    f,
                    "failed to rename {} -> {}: {source}",
                    from.display(),
                    to.display()
                )
            }
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatusError::Serialize { source } => Some(source),
            StatusError::Write { source, .. } => Some(source),
            StatusError::Rename { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_json(path: &Path) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn write_produces_readable_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.status");
        let sf = StatusFile::new(path.clone());

        let now = Utc::now();
        sf.write(&StatusData {
            pid: 4242,
            state: RuntimeState::Running,
            daemon: DaemonState::ChildRunning,
            ticks: 1000,
            started_at: now,
            last_update: now,
        })
        .unwrap();

        let json = read_json(&path);
        assert_eq!(json["pid"], 4242);
        assert_eq!(json["state"], "running");
        assert_eq!(json["daemon"], "child_running");
        assert_eq!(json["ticks"], 1000);
    }

    #[test]
    fn write_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.status");
        let mut tracker = StatusTracker::new(path.clone(), DaemonState::Foreground, 10);
        tracker.update(RuntimeState::Initializing, 0);
        tracker.update(RuntimeState::Running, 0);

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(read_json(&path)["state"], "running");
    }

    #[test]
    fn tracker_publishes_every_interval() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.status");
        let mut tracker = StatusTracker::new(path.clone(), DaemonState::Foreground, 10);
        tracker.update(RuntimeState::Running, 0);

        tracker.tick(9);
        assert_eq!(read_json(&path)["ticks"], 0);
        tracker.tick(10);
        assert_eq!(read_json(&path)["ticks"], 10);
        tracker.tick(15);
        assert_eq!(read_json(&path)["ticks"], 10);
    }

    #[test]
    fn zero_interval_only_publishes_transitions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.status");
        let mut tracker = StatusTracker::new(path.clone(), DaemonState::Foreground, 0);
        tracker.update(RuntimeState::Running, 0);
        tracker.tick(5000);
        assert_eq!(read_json(&path)["ticks"], 0);
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.status");
        let mut tracker = StatusTracker::new(path.clone(), DaemonState::Foreground, 0);
        tracker.update(RuntimeState::Terminating, 3);
        assert!(path.exists());
        tracker.remove();
        assert!(!path.exists());
    }

    #[test]
    fn write_to_nonexistent_dir_fails() {
        let sf = StatusFile::new(PathBuf::from("/nonexistent-dir/deep/server.status"));
        let now = Utc::now();
        let err = sf
            .write(&StatusData {
                pid: 1,
                state: RuntimeState::Running,
                daemon: DaemonState::Foreground,
                ticks: 0,
                started_at: now,
                last_update: now,
            })
            .unwrap_err();
        assert!(matches!(err, StatusError::Write { .. }));
    }
}
