//! Background mode: fork, let the parent report and exit, and point the
//! child's stdout/stderr at an append-only log file.
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Where this process stands with respect to background mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonState {
    Foreground,
    ParentDetaching,
    ChildRunning,
}

/// Result of [`detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetachOutcome {
    /// We are the original process; the service now runs as `child`.
    ParentShouldExit { child: u32 },
    /// We are the background service, output already redirected.
    ChildContinues,
    /// This platform cannot fork; nothing happened.
    Unsupported,
}

impl DetachOutcome {
    pub fn state(&self) -> DaemonState {
        match self {
            DetachOutcome::ParentShouldExit { .. } => DaemonState::ParentDetaching,
            DetachOutcome::ChildContinues => DaemonState::ChildRunning,
            DetachOutcome::Unsupported => DaemonState::Foreground,
        }
    }
}

/// Errors that can occur while detaching.
#[derive(Debug)]
pub enum DaemonError {
    /// fork() failed; we are still the only process.
    Fork { source: io::Error },
    /// The child could not open its log file.
    LogOpen { path: PathBuf, source: io::Error },
    /// The child could not point `stream` at the log file.
    Redirect {
        stream: &'static str,
        source: io::Error,
    },
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Fork { source } => write!(f, "unable to fork: {}", source),
            DaemonError::LogOpen { path, source } => {
                write!(f, "unable to open logfile {}: {}", path.display(), source)
            }
            DaemonError::Redirect { stream, source } => {
                write!(f, "re-routing {} failed: {}", stream, source)
            }
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Fork { source }
            | DaemonError::LogOpen { source, .. }
            | DaemonError::Redirect { source, .. } => Some(source),
        }
    }
}

/// Fork into the background.
///
/// Must run before any thread is spawned: only the calling thread survives
/// in the child.
#[cfg(unix)]
pub fn detach(log_path: &Path) -> Result<DetachOutcome, DaemonError> {
    use nix::unistd::{fork, ForkResult};

    // SAFETY: the process is still single-threaded at this point.
    match unsafe { fork() } {
        Err(e) => Err(DaemonError::Fork { source: e.into() }),
        Ok(ForkResult::Parent { child }) => Ok(DetachOutcome::ParentShouldExit {
            child: child.as_raw().unsigned_abs(),
        }),
        Ok(ForkResult::Child) => {
            enter_child(log_path)?;
            Ok(DetachOutcome::ChildContinues)
        }
    }
}

#[cfg(not(unix))]
pub fn detach(_log_path: &Path) -> Result<DetachOutcome, DaemonError> {
    Ok(DetachOutcome::Unsupported)
}

/// Child-side setup: leave the terminal's session, then send stdout and
/// stderr to the log file. No output stream may stay unreachable, so either
/// redirection failing is fatal.
#[cfg(unix)]
pub fn enter_child(log_path: &Path) -> Result<(), DaemonError> {
    use std::io::Write;
    use std::os::fd::AsRawFd;

    let log = open_log(log_path)?;

    if let Err(e) = nix::unistd::setsid() {
        // Still usable, just not fully detached from the terminal's session.
        eprintln!("dedicated: setsid failed: {e}");
    }

    let _ = io::stdout().flush();
    redirect_into(&log, io::stdout().as_raw_fd(), "stdout")?;
    redirect_into(&log, io::stderr().as_raw_fd(), "stderr")?;
    Ok(())
}

/// Open `path` for appending, creating it if needed.
pub fn open_log(path: &Path) -> Result<File, DaemonError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DaemonError::LogOpen {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Make descriptor `target` refer to `log`.
#[cfg(unix)]
pub fn redirect_into(
    log: &File,
    target: std::os::fd::RawFd,
    stream: &'static str,
) -> Result<(), DaemonError> {
    use std::os::fd::AsRawFd;

    nix::unistd::dup2(log.as_raw_fd(), target)
        .map(|_| ())
        .map_err(|e| DaemonError::Redirect {
            stream,
            source: e.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn outcome_maps_to_state() {
        assert_eq!(
            DetachOutcome::ParentShouldExit { child: 42 }.state(),
            DaemonState::ParentDetaching
        );
        assert_eq!(
            DetachOutcome::ChildContinues.state(),
            DaemonState::ChildRunning
        );
        assert_eq!(DetachOutcome::Unsupported.state(), DaemonState::Foreground);
    }

    #[test]
    fn open_log_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let mut log = open_log(&path).unwrap();
        writeln!(log, "this run").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "earlier run\nthis run\n");
    }

    #[test]
    fn open_log_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.log");
        open_log(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_path_is_log_open_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("server.log");

        let err = open_log(&path).unwrap_err();
        assert!(matches!(err, DaemonError::LogOpen { .. }));
        assert!(err.to_string().contains("unable to open logfile"));
    }

    #[cfg(unix)]
    #[test]
    fn child_setup_fails_before_touching_streams() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("server.log");

        let err = enter_child(&path).unwrap_err();
        assert!(matches!(err, DaemonError::LogOpen { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn redirected_descriptor_writes_into_log() {
        use std::os::fd::AsRawFd;

        let dir = tempdir().unwrap();
        let log_path = dir.path().join("server.log");
        let mut stand_in = File::create(dir.path().join("stand-in")).unwrap();

        let log = open_log(&log_path).unwrap();
        redirect_into(&log, stand_in.as_raw_fd(), "stdout").unwrap();
        write!(stand_in, "tick 1").unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents, "tick 1");
    }

    #[cfg(unix)]
    #[test]
    fn redirect_to_bad_descriptor_is_redirect_error() {
        let dir = tempdir().unwrap();
        let log = open_log(&dir.path().join("server.log")).unwrap();

        let err = redirect_into(&log, -1, "stderr").unwrap_err();
        assert!(matches!(err, DaemonError::Redirect { stream: "stderr", .. }));
    }
}
