//! The dedicated server's runtime loop.
//!
//! One thread, one loop. Every iteration does the same three things in the
//! same order:
//!
//! 1. stop if shutdown was requested (signal, `quit`, or a fatal game error),
//! 2. hand at most one ready console line to the command dispatcher,
//! 3. run at most one simulation tick if its deadline has passed,
//!
//! then sleeps briefly. Nothing in the loop blocks on input.
use crate::console::{ConsoleInput, LineBuffer};
use crate::daemon::DaemonState;
use crate::game::{CommandDispatcher, FrameBuffer, Game, LoadMode};
use crate::signals::ShutdownFlag;
use crate::status::StatusTracker;
use crate::tick::TickScheduler;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

/// Ticks of lag before the loop reports it is running behind.
const LAG_WARN_TICKS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Initializing,
    Running,
    Terminating,
}

/// How the runtime loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown was requested. The only successful outcome.
    Shutdown,
    /// The requested world could not be loaded.
    LoadFailed(String),
    /// The game reported it cannot serve, e.g. networking did not start.
    NotViable,
    /// The game raised an unrecoverable condition while running.
    Fatal(String),
}

impl LoopExit {
    pub fn is_success(&self) -> bool {
        matches!(self, LoopExit::Shutdown)
    }
}

impl From<LoopExit> for ExitCode {
    fn from(exit: LoopExit) -> Self {
        if exit.is_success() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Process-wide state every component is built against.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub shutdown: ShutdownFlag,
    pub daemon: DaemonState,
}

impl RuntimeContext {
    pub fn new(shutdown: ShutdownFlag, daemon: DaemonState) -> Self {
        Self { shutdown, daemon }
    }

    /// Forked into the background: there is no terminal to read from.
    pub fn is_forked(&self) -> bool {
        self.daemon == DaemonState::ChildRunning
    }
}

/// Where the initial world comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldSource {
    Generate,
    Load { path: PathBuf, mode: LoadMode },
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick_interval: Duration,
    pub idle_sleep: Duration,
    pub world: WorldSource,
}

/// Time source for the loop, swappable for tests.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct ServerLoop<G, D> {
    ctx: RuntimeContext,
    settings: LoopSettings,
    game: G,
    dispatcher: D,
    clock: Box<dyn Clock>,
    console: Option<Box<dyn ConsoleInput>>,
    status: Option<StatusTracker>,
    frame: FrameBuffer,
    line: LineBuffer,
    scheduler: Option<TickScheduler>,
    state: RuntimeState,
    lagging: bool,
}

impl<G, D> ServerLoop<G, D>
where
    G: Game,
    D: CommandDispatcher<G>,
{
    pub fn new(ctx: RuntimeContext, settings: LoopSettings, game: G, dispatcher: D) -> Self {
        Self {
            ctx,
            settings,
            game,
            dispatcher,
            clock: Box::new(SystemClock),
            console: None,
            status: None,
            frame: FrameBuffer::new(0, 0),
            line: LineBuffer::new(),
            scheduler: None,
            state: RuntimeState::Initializing,
            lagging: false,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_status(mut self, status: StatusTracker) -> Self {
        self.status = Some(status);
        self
    }

    pub fn attach_console(&mut self, console: Box<dyn ConsoleInput>) {
        self.console = Some(console);
    }

    pub fn attach_frame(&mut self, frame: FrameBuffer) {
        self.frame = frame;
    }

    /// Free the off-screen buffer and stop console input.
    pub fn release(&mut self) {
        self.frame = FrameBuffer::new(0, 0);
        self.stop_console();
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.ctx
    }

    #[cfg(test)]
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    #[cfg(test)]
    pub fn game(&self) -> &G {
        &self.game
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn ticks(&self) -> u64 {
        self.scheduler.as_ref().map_or(0, TickScheduler::ticks_fired)
    }

    /// Run from initialization to termination.
    pub fn run(&mut self) -> LoopExit {
        let exit = match self.initialize() {
            Ok(()) => {
                self.enter_running();
                loop {
                    if let Some(exit) = self.iterate() {
                        break exit;
                    }
                }
            }
            Err(exit) => exit,
        };
        self.terminate(&exit);
        exit
    }

    /// Take the dedicated role and establish the initial world.
    fn initialize(&mut self) -> Result<(), LoopExit> {
        self.set_state(RuntimeState::Initializing);
        self.game.configure_dedicated();

        match &self.settings.world {
            WorldSource::Generate => self.game.generate_new_world(),
            WorldSource::Load { path, mode } => {
                if let Err(e) = self.game.load_world(path, *mode) {
                    tracing::error!(error = %e, "Loading requested map failed. Aborting..");
                    return Err(LoopExit::LoadFailed(e.to_string()));
                }
            }
        }

        if !self.game.is_viable() {
            tracing::error!("Dedicated server could not be launched. Aborting..");
            return Err(LoopExit::NotViable);
        }
        Ok(())
    }

    fn enter_running(&mut self) {
        let scheduler = TickScheduler::new(self.settings.tick_interval, self.clock.now());
        let tick_ms = scheduler.interval().as_millis() as u64;
        self.scheduler = Some(scheduler);
        self.set_state(RuntimeState::Running);
        tracing::info!(
            tick_ms,
            console = self.console.as_ref().map(|c| c.name()),
            "dedicated server running"
        );
    }

    /// One pass of the running loop. Returns the exit once the loop should
    /// stop.
    pub fn iterate(&mut self) -> Option<LoopExit> {
        if self.ctx.shutdown.is_set() {
            tracing::info!("shutdown requested");
            return Some(LoopExit::Shutdown);
        }
        if let Some(reason) = self.game.fatal_condition() {
            tracing::error!(%reason, "fatal game condition");
            return Some(LoopExit::Fatal(reason));
        }

        if !self.ctx.is_forked() {
            self.handle_input();
        }
        self.handle_tick();

        self.clock.sleep(self.settings.idle_sleep);
        None
    }

    fn handle_input(&mut self) {
        let Some(console) = self.console.as_mut() else {
            return;
        };
        if console.is_closed() {
            tracing::info!("console input closed, continuing without operator input");
            self.stop_console();
            return;
        }
        if !console.input_waiting() || self.ctx.shutdown.is_set() {
            return;
        }

        match console.read_line(&mut self.line) {
            Ok(true) => {
                self.line.sanitize();
                let command = self.line.to_command();
                self.dispatcher.execute(&mut self.game, &command);
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read console input"),
        }
    }

    fn handle_tick(&mut self) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let now = self.clock.now();
        if !scheduler.poll(now) {
            return;
        }

        self.game.step();
        self.game.present(&mut self.frame);

        let ticks = scheduler.ticks_fired();
        let behind = scheduler.behind(now);
        if let Some(status) = self.status.as_mut() {
            status.tick(ticks);
        }

        if behind >= LAG_WARN_TICKS && !self.lagging {
            tracing::warn!(behind, "simulation is running behind, catching up one tick per pass");
            self.lagging = true;
        } else if behind == 0 && self.lagging {
            tracing::info!(ticks, "simulation caught up");
            self.lagging = false;
        }
    }

    fn terminate(&mut self, exit: &LoopExit) {
        self.set_state(RuntimeState::Terminating);
        self.stop_console();

        let ticks = self.ticks();
        if exit.is_success() {
            if let Some(status) = &self.status {
                status.remove();
            }
            tracing::info!(ticks, "dedicated server stopped");
        } else {
            tracing::error!(?exit, ticks, "dedicated server stopped with failure");
        }
    }

    fn stop_console(&mut self) {
        if let Some(mut console) = self.console.take() {
            console.shutdown();
        }
    }

    fn set_state(&mut self, state: RuntimeState) {
        self.state = state;
        let ticks = self.ticks();
        if let Some(status) = self.status.as_mut() {
            status.update(state, ticks);
        }
    }
}
