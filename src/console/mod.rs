//! Operator console input.
//!
//! The runtime loop asks one question per iteration, "is a line ready?", and
//! must never block on the answer. How that is answered depends on the host:
//!
//! - [`poll`]: the stdin descriptor supports readiness polling, so the main
//!   thread polls it with a zero timeout and reads the line itself.
//! - [`threaded`]: polling is unavailable, so a worker thread blocks on reads
//!   and hands finished lines over through a single-slot event.
//!
//! The strategy is picked once by [`open_stdin`] and hidden behind
//! [`ConsoleInput`].
pub mod line;
#[cfg(unix)]
pub mod poll;
pub mod threaded;

pub use line::LineBuffer;

use serde::Deserialize;

/// A non-blocking source of operator lines.
pub trait ConsoleInput: Send {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Whether a line is ready to read. Never blocks for more than ~1 ms.
    fn input_waiting(&mut self) -> bool;

    /// Copy the next raw line into `line`. Returns `false` if no line was
    /// available or the input has ended.
    fn read_line(&mut self, line: &mut LineBuffer) -> Result<bool, ConsoleError>;

    /// Input has ended and nothing is left to read.
    fn is_closed(&self) -> bool;

    /// Release any background resources. Called once at termination.
    fn shutdown(&mut self) {}
}

/// Which console strategy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleStrategy {
    /// Poll when the host supports it, otherwise fall back to a worker thread.
    #[default]
    Auto,
    Poll,
    Thread,
}

/// Errors from console input.
#[derive(Debug)]
pub enum ConsoleError {
    /// Could not duplicate the stdin descriptor.
    Stdin { source: std::io::Error },
    /// Could not start the input worker thread.
    Worker { source: std::io::Error },
    /// Reading a line failed.
    Read { source: std::io::Error },
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Stdin { source } => write!(f, "cannot open console input: {}", source),
            ConsoleError::Worker { source } => {
                write!(f, "cannot create console thread: {}", source)
            }
            ConsoleError::Read { source } => write!(f, "console read failed: {}", source),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConsoleError::Stdin { source }
            | ConsoleError::Worker { source }
            | ConsoleError::Read { source } => Some(source),
        }
    }
}

/// Resolve `Auto` against what the host's stdin supports.
pub fn resolve_strategy(requested: ConsoleStrategy) -> ConsoleStrategy {
    let pollable = stdin_pollable();
    match requested {
        ConsoleStrategy::Auto if pollable => ConsoleStrategy::Poll,
        ConsoleStrategy::Auto => ConsoleStrategy::Thread,
        ConsoleStrategy::Poll if !pollable => {
            tracing::warn!("console input cannot be polled on this host, using a reader thread");
            ConsoleStrategy::Thread
        }
        other => other,
    }
}

/// Open the operator console on stdin with the resolved strategy.
pub fn open_stdin(requested: ConsoleStrategy) -> Result<Box<dyn ConsoleInput>, ConsoleError> {
    let console: Box<dyn ConsoleInput> = match resolve_strategy(requested) {
        #[cfg(unix)]
        ConsoleStrategy::Poll => Box::new(poll::PolledConsole::stdin()?),
        _ => Box::new(threaded::ThreadedConsole::stdin()?),
    };
    tracing::info!(strategy = console.name(), "console input ready");
    Ok(console)
}

#[cfg(unix)]
fn stdin_pollable() -> bool {
    use std::os::fd::AsFd;
    poll::PolledConsole::probe(std::io::stdin().as_fd())
}

#[cfg(not(unix))]
fn stdin_pollable() -> bool {
    false
}
