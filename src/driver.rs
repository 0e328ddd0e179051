//! The headless video driver: the host's display seam, filled in with a
//! driver that has no display at all.
use crate::config::ConfigError;
use crate::console::{self, ConsoleError, ConsoleStrategy};
use crate::daemon::DaemonError;
use crate::game::{CommandDispatcher, FrameBuffer, Game, LoadError};
use crate::runtime::{LoopExit, ServerLoop};
use crate::signals::{SignalBridge, SignalError};

/// Region of the screen that changed. The dedicated driver ignores it.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct DriverParams {
    pub width: u32,
    pub height: u32,
    pub console: ConsoleStrategy,
    /// Off only where the process owns its signal dispositions elsewhere.
    pub install_signals: bool,
}

/// What the host asks of any video driver.
pub trait VideoDriver {
    fn name(&self) -> &'static str;

    fn start(&mut self, params: &DriverParams) -> Result<(), StartupError>;

    fn stop(&mut self);

    // A headless host never redraws or resizes; these stay for other drivers.
    #[allow(dead_code)]
    fn make_dirty(&mut self, rect: DirtyRect);

    /// Run until the server shuts down.
    fn main_loop(&mut self) -> LoopExit;

    /// Returns whether the resolution changed.
    #[allow(dead_code)]
    fn change_resolution(&mut self, width: u32, height: u32) -> bool;
}

pub struct DedicatedDriver<G, D> {
    server: ServerLoop<G, D>,
    signals: Option<SignalBridge>,
}

impl<G, D> DedicatedDriver<G, D>
where
    G: Game,
    D: CommandDispatcher<G>,
{
    pub fn new(server: ServerLoop<G, D>) -> Self {
        Self {
            server,
            signals: None,
        }
    }

    #[cfg(test)]
    pub fn server(&self) -> &ServerLoop<G, D> {
        &self.server
    }
}

impl<G, D> VideoDriver for DedicatedDriver<G, D>
where
    G: Game,
    D: CommandDispatcher<G>,
{
    fn name(&self) -> &'static str {
        "dedicated"
    }

    fn start(&mut self, params: &DriverParams) -> Result<(), StartupError> {
        self.server
            .attach_frame(FrameBuffer::new(params.width, params.height));

        if params.install_signals {
            let trigger = self.server.context().shutdown.trigger();
            let bridge = SignalBridge::install(trigger)?;
            tracing::debug!(signals = ?bridge.signals(), "shutdown signal handlers installed");
            self.signals = Some(bridge);
        }

        // A forked server has no terminal; stdin is not ours to read.
        if !self.server.context().is_forked() {
            let input = console::open_stdin(params.console)?;
            self.server.attach_console(input);
        }

        tracing::info!(
            driver = self.name(),
            width = self.server.frame().width(),
            height = self.server.frame().height(),
            "Loading dedicated server..."
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.server.release();
    }

    fn make_dirty(&mut self, _rect: DirtyRect) {}

    fn main_loop(&mut self) -> LoopExit {
        self.server.run()
    }

    fn change_resolution(&mut self, _width: u32, _height: u32) -> bool {
        false
    }
}

/// Anything that stops the server before the runtime loop starts.
#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Signal(SignalError),
    Daemon(DaemonError),
    Console(ConsoleError),
    Load(LoadError),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "configuration: {e}"),
            StartupError::Signal(e) => write!(f, "signal setup: {e}"),
            StartupError::Daemon(e) => write!(f, "background mode: {e}"),
            StartupError::Console(e) => write!(f, "console input: {e}"),
            StartupError::Load(e) => write!(f, "world load: {e}"),
        }
    }
}

impl std::error::Error for StartupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StartupError::Config(e) => Some(e),
            StartupError::Signal(e) => Some(e),
            StartupError::Daemon(e) => Some(e),
            StartupError::Console(e) => Some(e),
            StartupError::Load(e) => Some(e),
        }
    }
}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<SignalError> for StartupError {
    fn from(e: SignalError) -> Self {
        StartupError::Signal(e)
    }
}

impl From<DaemonError> for StartupError {
    fn from(e: DaemonError) -> Self {
        StartupError::Daemon(e)
    }
}

impl From<ConsoleError> for StartupError {
    fn from(e: ConsoleError) -> Self {
        StartupError::Console(e)
    }
}

impl From<LoadError> for StartupError {
    fn from(e: LoadError) -> Self {
        StartupError::Load(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ConsoleCommands;
    use crate::daemon::DaemonState;
    use crate::runtime::{LoopSettings, RuntimeContext, WorldSource};
    use crate::signals::ShutdownFlag;
    use crate::world::SimWorld;
    use std::path::PathBuf;
    use std::time::Duration;

    // Forked context: start() must not touch the test harness's stdin, and
    // signal installation is left to the signals module's own test.
    fn forked_driver() -> DedicatedDriver<SimWorld, ConsoleCommands<Vec<u8>>> {
        let ctx = RuntimeContext::new(ShutdownFlag::new(), DaemonState::ChildRunning);
        let commands = ConsoleCommands::new(ctx.shutdown.trigger(), Vec::new());
        let settings = LoopSettings {
            tick_interval: Duration::from_millis(1),
            idle_sleep: Duration::ZERO,
            world: WorldSource::Generate,
        };
        DedicatedDriver::new(ServerLoop::new(ctx, settings, SimWorld::new(8), commands))
    }

    fn params() -> DriverParams {
        DriverParams {
            width: 32,
            height: 16,
            console: ConsoleStrategy::Auto,
            install_signals: false,
        }
    }

    #[test]
    fn start_allocates_frame_and_stop_releases_it() {
        let mut driver = forked_driver();
        driver.start(&params()).unwrap();
        assert_eq!(driver.server().frame().len(), 32 * 16);

        driver.stop();
        assert!(driver.server().frame().is_empty());
    }

    #[test]
    fn resolution_is_fixed() {
        let mut driver = forked_driver();
        driver.start(&params()).unwrap();
        assert!(!driver.change_resolution(1024, 768));
        driver.make_dirty(DirtyRect {
            left: 0,
            top: 0,
            width: 10,
            height: 10,
        });
        assert_eq!(driver.server().frame().width(), 32);
    }

    #[test]
    fn main_loop_runs_until_shutdown() {
        let mut driver = forked_driver();
        driver.start(&params()).unwrap();
        driver.server().context().shutdown.trigger().request();

        assert_eq!(driver.main_loop(), LoopExit::Shutdown);
        driver.stop();
    }

    #[test]
    fn startup_errors_keep_their_cause() {
        use std::error::Error;

        let err = StartupError::from(LoadError::Corrupt {
            path: PathBuf::from("saves/a.json"),
            detail: "truncated".to_string(),
        });
        assert!(err.to_string().starts_with("world load:"));
        assert!(err.source().is_some());
    }
}
