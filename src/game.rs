//! Boundary to the collaborators the runtime drives but does not own: the
//! simulation, its presentation stage and the operator command language.
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// How a persisted world should be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// A saved game, resumed as-is.
    #[default]
    Savegame,
    /// A scenario: the world is loaded but its clock starts from zero.
    Scenario,
}

/// Errors from loading a persisted world.
#[derive(Debug)]
pub enum LoadError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file is not a world this server understands.
    Corrupt { path: PathBuf, detail: String },
    UnsupportedVersion { path: PathBuf, version: u32 },
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            LoadError::Corrupt { path, detail } => {
                write!(f, "{} is not a valid save: {}", path.display(), detail)
            }
            LoadError::UnsupportedVersion { path, version } => {
                write!(
                    f,
                    "{} has unsupported save version {}",
                    path.display(),
                    version
                )
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { source, .. } => Some(source),
            LoadError::Corrupt { .. } | LoadError::UnsupportedVersion { .. } => None,
        }
    }
}

/// Off-screen pixel buffer handed to the presentation stage each tick.
///
/// One byte per pixel. Headless servers still allocate it so presentation
/// side effects (state publication) run against a real target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            pixels: vec![0; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// The simulation as seen by the runtime loop.
pub trait Game {
    /// Take the dedicated-server role: network server, no local player.
    fn configure_dedicated(&mut self);

    fn generate_new_world(&mut self);

    /// Validate and load a persisted world. Any error is fatal to startup.
    fn load_world(&mut self, path: &Path, mode: LoadMode) -> Result<(), LoadError>;

    /// Whether the service can run, e.g. networking came up.
    fn is_viable(&self) -> bool;

    /// Advance the world by one tick.
    fn step(&mut self);

    /// Hand the current frame to the presentation stage.
    fn present(&mut self, frame: &mut FrameBuffer);

    /// A condition the game cannot recover from. Checked once per iteration;
    /// `Some` ends the loop with a failure outcome.
    fn fatal_condition(&self) -> Option<String> {
        None
    }
}

/// Executes one sanitized operator line against the game.
///
/// Malformed commands are the dispatcher's to report; they never stop the
/// loop.
pub trait CommandDispatcher<G: ?Sized> {
    fn execute(&mut self, game: &mut G, line: &str);
}
