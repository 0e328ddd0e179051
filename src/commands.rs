//! Built-in operator commands for the reference world.
use crate::game::CommandDispatcher;
use crate::signals::ShutdownTrigger;
use crate::world::SimWorld;
use std::io::Write;
use std::path::Path;

const HELP: &[(&str, &str)] = &[
    ("help", "list commands"),
    ("status", "show tick, seed and checksum"),
    ("save <file>", "write the world to <file>"),
    ("echo <text>", "print <text>"),
    ("quit | exit", "shut the server down"),
];

/// Operator console commands. Replies go to `out` (stdout in the server,
/// which is the log file in background mode).
pub struct ConsoleCommands<W: Write> {
    shutdown: ShutdownTrigger,
    out: W,
}

impl ConsoleCommands<std::io::Stdout> {
    pub fn stdout(shutdown: ShutdownTrigger) -> Self {
        Self::new(shutdown, std::io::stdout())
    }
}

impl<W: Write> ConsoleCommands<W> {
    pub fn new(shutdown: ShutdownTrigger, out: W) -> Self {
        Self { shutdown, out }
    }

    #[cfg(test)]
    fn output(&self) -> &W {
        &self.out
    }

    fn reply(&mut self, text: std::fmt::Arguments<'_>) {
        // Nowhere better to report a failing console stream.
        let _ = writeln!(self.out, "{text}");
        let _ = self.out.flush();
    }
}

impl<W: Write> CommandDispatcher<SimWorld> for ConsoleCommands<W> {
    fn execute(&mut self, world: &mut SimWorld, line: &str) {
        let line = line.trim();
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        if command.is_empty() {
            return;
        }
        tracing::debug!(command, "console command");

        match command.to_ascii_lowercase().as_str() {
            "help" => {
                for (usage, what) in HELP {
                    self.reply(format_args!("  {usage:<14} {what}"));
                }
            }
            "status" => self.reply(format_args!(
                "tick {} seed {} checksum {:016x} frames {}",
                world.tick(),
                world.seed(),
                world.checksum(),
                world.frames_presented()
            )),
            "save" if rest.is_empty() => self.reply(format_args!("usage: save <file>")),
            "save" => match world.save(Path::new(rest)) {
                Ok(()) => {
                    tracing::info!(path = rest, tick = world.tick(), "world saved");
                    self.reply(format_args!("saved to {rest}"));
                }
                Err(e) => {
                    tracing::warn!(path = rest, error = %e, "save failed");
                    self.reply(format_args!("ERROR: save failed: {e}"));
                }
            },
            "echo" => self.reply(format_args!("{rest}")),
            "quit" | "exit" => {
                tracing::info!("shutdown requested from console");
                self.shutdown.request();
            }
            _ => {
                tracing::warn!(command, "unknown console command");
                self.reply(format_args!("ERROR: unknown command '{command}'"));
            }
        }
    }
}
