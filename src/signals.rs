//! Signal handling for graceful shutdown.
//!
//! SIGINT (Ctrl-C), SIGTERM and SIGQUIT all mean the same thing: leave the
//! runtime loop at the next iteration boundary. The handler stays installed
//! for repeat signals and does nothing but one atomic store.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Process-wide shutdown request. Once set it is never cleared.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// A setter-only handle for signal handlers and collaborators.
    pub fn trigger(&self) -> ShutdownTrigger {
        ShutdownTrigger(Arc::clone(&self.0))
    }
}

/// The one thing a signal handler may do with the runtime: request shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownTrigger(Arc<AtomicBool>);

impl ShutdownTrigger {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn same_flag(&self, other: &ShutdownTrigger) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Read from the signal handler; written once by [`SignalBridge::install`].
static SIGNAL_TARGET: OnceLock<ShutdownTrigger> = OnceLock::new();

/// Errors from signal registration.
#[derive(Debug)]
pub enum SignalError {
    /// `sigaction` rejected one of the handlers.
    Register {
        signal: &'static str,
        source: std::io::Error,
    },
    /// Handlers were already installed for a different shutdown flag.
    AlreadyInstalled,
}

impl std::fmt::Display for SignalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalError::Register { signal, source } => {
                write!(f, "failed to install {} handler: {}", signal, source)
            }
            SignalError::AlreadyInstalled => {
                write!(f, "signal handlers already target another shutdown flag")
            }
        }
    }
}

impl std::error::Error for SignalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SignalError::Register { source, .. } => Some(source),
            SignalError::AlreadyInstalled => None,
        }
    }
}

/// Installed termination-signal handlers.
#[derive(Debug)]
pub struct SignalBridge {
    signals: Vec<&'static str>,
}

impl SignalBridge {
    /// Route SIGINT, SIGTERM and SIGQUIT to `trigger`.
    #[cfg(unix)]
    pub fn install(trigger: ShutdownTrigger) -> Result<Self, SignalError> {
        use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

        if let Err(rejected) = SIGNAL_TARGET.set(trigger) {
            let installed = SIGNAL_TARGET.get().is_some_and(|t| t.same_flag(&rejected));
            if !installed {
                return Err(SignalError::AlreadyInstalled);
            }
        }

        // No SA_RESETHAND: the handler stays in place for repeat signals.
        let action = SigAction::new(
            SigHandler::Handler(on_shutdown_signal),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        let mut signals = Vec::new();
        for signal in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGQUIT] {
            // SAFETY: the handler only performs an atomic load and store.
            unsafe { sigaction(signal, &action) }.map_err(|e| SignalError::Register {
                signal: signal.as_str(),
                source: e.into(),
            })?;
            signals.push(signal.as_str());
        }

        Ok(Self { signals })
    }

    /// Signals are unavailable; shutdown can still be requested through the
    /// flag itself.
    #[cfg(not(unix))]
    pub fn install(trigger: ShutdownTrigger) -> Result<Self, SignalError> {
        let _ = SIGNAL_TARGET.set(trigger);
        tracing::debug!("no signal support on this platform");
        Ok(Self {
            signals: Vec::new(),
        })
    }

    /// Names of the signals routed to the shutdown flag.
    pub fn signals(&self) -> &[&'static str] {
        &self.signals
    }
}

#[cfg(unix)]
extern "C" fn on_shutdown_signal(_signal: std::ffi::c_int) {
    if let Some(trigger) = SIGNAL_TARGET.get() {
        trigger.request();
    }
}
