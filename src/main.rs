mod commands;
mod config;
mod console;
mod daemon;
mod driver;
mod game;
mod runtime;
mod signals;
mod status;
mod tick;
mod world;

use clap::Parser;
use config::ServerConfig;
use console::ConsoleStrategy;
use daemon::{DaemonError, DaemonState, DetachOutcome};
use driver::{DedicatedDriver, DriverParams, StartupError, VideoDriver};
use game::LoadMode;
use runtime::{LoopSettings, RuntimeContext, ServerLoop, WorldSource};
use signals::ShutdownFlag;
use status::StatusTracker;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use world::SimWorld;

/// Headless dedicated game server: runs the simulation on a fixed tick,
/// takes operator commands from the terminal, and can detach into the
/// background.
#[derive(Parser, Debug)]
#[command(name = "dedicated", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "dedicated.toml")]
    config: PathBuf,

    /// Fork into the background after startup
    #[arg(short, long)]
    fork: bool,

    /// Log file for background mode (overrides config)
    #[arg(short, long)]
    log_file: Option<PathBuf>,

    /// Saved world to load instead of generating a new one
    #[arg(short = 'g', long, value_name = "FILE")]
    load: Option<PathBuf>,

    /// Treat the loaded world as a scenario (clock restarts at zero)
    #[arg(long, requires = "load")]
    scenario: bool,

    /// Seed for a newly generated world
    #[arg(long)]
    seed: Option<u64>,

    /// How console input is detected (overrides config)
    #[arg(long, value_enum)]
    console: Option<ConsoleStrategy>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (command dispatch, tick lag)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if self.fork {
            config.daemon.background = true;
        }
        if let Some(path) = &self.log_file {
            config.daemon.log_file = path.clone();
        }
        if let Some(path) = &self.load {
            config.world.load = Some(path.clone());
        }
        if self.scenario {
            config.world.load_mode = LoadMode::Scenario;
        }
        if let Some(seed) = self.seed {
            config.world.seed = Some(seed);
        }
        if let Some(strategy) = self.console {
            config.console.strategy = strategy;
        }
    }

    fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dedicated: {e}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dry_run {
        print_resolved(&cli, &config);
        return ExitCode::SUCCESS;
    }

    // Fork before any thread exists: the tracing subscriber, the console
    // worker and the simulation all start in the child.
    let daemon = if config.daemon.background {
        match after_detach(daemon::detach(&config.daemon.log_file)) {
            Ok(state) => state,
            Err(code) => return code,
        }
    } else {
        DaemonState::Foreground
    };

    init_tracing(&cli, daemon);
    tracing::debug!(?cli, "parsed CLI arguments");

    run(&config, daemon)
}

/// Decide how this process continues after forking. `Err` is the exit code
/// of a process that must stop before the server is built: the parent, or a
/// child whose output could not be redirected.
fn after_detach(result: Result<DetachOutcome, DaemonError>) -> Result<DaemonState, ExitCode> {
    match result {
        Ok(DetachOutcome::ParentShouldExit { child }) => {
            println!("Loading dedicated server...");
            println!("  - Forked to background with pid {child}");
            Err(ExitCode::SUCCESS)
        }
        Ok(outcome @ DetachOutcome::ChildContinues) => Ok(outcome.state()),
        Ok(DetachOutcome::Unsupported) => {
            eprintln!("dedicated: background mode is not supported here, staying in the foreground");
            Ok(DaemonState::Foreground)
        }
        Err(e) => {
            eprintln!("dedicated: {}", StartupError::from(e));
            Err(ExitCode::FAILURE)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServerConfig, StartupError> {
    let mut config = ServerConfig::load(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_tracing(cli: &Cli, daemon: DaemonState) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_ansi(daemon != DaemonState::ChildRunning)
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: &ServerConfig, daemon: DaemonState) -> ExitCode {
    let shutdown = ShutdownFlag::new();
    let ctx = RuntimeContext::new(shutdown.clone(), daemon);

    let seed = config.world.seed.unwrap_or_else(clock_seed);
    let world = SimWorld::new(seed);
    let commands = commands::ConsoleCommands::stdout(shutdown.trigger());

    let settings = LoopSettings {
        tick_interval: config.server.tick_interval(),
        idle_sleep: config.server.idle_sleep(),
        world: match &config.world.load {
            Some(path) => WorldSource::Load {
                path: path.clone(),
                mode: config.world.load_mode,
            },
            None => WorldSource::Generate,
        },
    };

    let mut server = ServerLoop::new(ctx, settings, world, commands);
    if let Some(path) = &config.status.file {
        server = server.with_status(StatusTracker::new(
            path.clone(),
            daemon,
            config.status.interval_ticks,
        ));
    }

    let mut driver = DedicatedDriver::new(server);
    let params = DriverParams {
        width: config.server.width,
        height: config.server.height,
        console: config.console.strategy,
        install_signals: true,
    };
    if let Err(e) = driver.start(&params) {
        tracing::error!(error = %e, "Dedicated server could not be launched. Aborting..");
        driver.stop();
        return ExitCode::FAILURE;
    }

    let exit = driver.main_loop();
    driver.stop();
    ExitCode::from(exit)
}

fn clock_seed() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn print_resolved(cli: &Cli, config: &ServerConfig) {
    println!("dedicated v{}", env!("CARGO_PKG_VERSION"));
    println!("Config file: {}", cli.config.display());
    println!();
    println!("[server]");
    println!("  tick_interval_ms = {}", config.server.tick_interval_ms);
    println!("  idle_sleep_ms = {}", config.server.idle_sleep_ms);
    println!("  resolution = {}x{}", config.server.width, config.server.height);
    println!("[daemon]");
    println!("  background = {}", config.daemon.background);
    println!("  log_file = {}", config.daemon.log_file.display());
    println!("[console]");
    println!("  strategy = {:?}", config.console.strategy);
    println!("[world]");
    match &config.world.load {
        Some(path) => println!(
            "  load = {} ({:?})",
            path.display(),
            config.world.load_mode
        ),
        None => println!("  load = (generate new world)"),
    }
    match config.world.seed {
        Some(seed) => println!("  seed = {seed}"),
        None => println!("  seed = (from clock)"),
    }
    println!("[status]");
    match &config.status.file {
        Some(path) => println!(
            "  file = {} (every {} ticks)",
            path.display(),
            config.status.interval_ticks
        ),
        None => println!("  file = (disabled)"),
    }
}
