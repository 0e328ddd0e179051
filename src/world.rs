//! Minimal reference simulation so the server binary has something to run.
//!
//! The world is a seeded tick counter with a checksum that changes every
//! step. Saves are small JSON documents; anything else is rejected.
use crate::game::{FrameBuffer, Game, LoadError, LoadMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SAVE_FORMAT: &str = "dedicated-save";
const SAVE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SaveFile {
    format: String,
    version: u32,
    seed: u64,
    tick: u64,
    checksum: u64,
}

#[derive(Debug, Clone)]
pub struct SimWorld {
    seed: u64,
    tick: u64,
    checksum: u64,
    dedicated: bool,
    networking: bool,
    frames_presented: u64,
}

impl SimWorld {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick: 0,
            checksum: seed,
            dedicated: false,
            networking: false,
            frames_presented: 0,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Write the world to `path` in the save format `load_world` accepts.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let save = SaveFile {
            format: SAVE_FORMAT.to_string(),
            version: SAVE_VERSION,
            seed: self.seed,
            tick: self.tick,
            checksum: self.checksum,
        };
        let json = serde_json::to_string_pretty(&save)?;
        std::fs::write(path, json)
    }

    fn read_save(path: &Path) -> Result<SaveFile, LoadError> {
        let contents = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let save: SaveFile = serde_json::from_str(&contents).map_err(|e| LoadError::Corrupt {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if save.format != SAVE_FORMAT {
            return Err(LoadError::Corrupt {
                path: path.to_path_buf(),
                detail: format!("unexpected format '{}'", save.format),
            });
        }
        if save.version != SAVE_VERSION {
            return Err(LoadError::UnsupportedVersion {
                path: path.to_path_buf(),
                version: save.version,
            });
        }
        Ok(save)
    }
}

/// splitmix64 finalizer.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl Game for SimWorld {
    fn configure_dedicated(&mut self) {
        self.dedicated = true;
        self.networking = true;
    }

    fn generate_new_world(&mut self) {
        self.tick = 0;
        self.checksum = self.seed;
        tracing::info!(seed = self.seed, "generated new world");
    }

    fn load_world(&mut self, path: &Path, mode: LoadMode) -> Result<(), LoadError> {
        let save = match Self::read_save(path) {
            Ok(save) => save,
            Err(e) => {
                self.networking = false;
                return Err(e);
            }
        };
        self.seed = save.seed;
        (self.tick, self.checksum) = match mode {
            LoadMode::Savegame => (save.tick, save.checksum),
            LoadMode::Scenario => (0, save.seed),
        };
        tracing::info!(path = %path.display(), ?mode, seed = self.seed, tick = self.tick, "loaded world");
        Ok(())
    }

    fn is_viable(&self) -> bool {
        self.dedicated && self.networking
    }

    fn step(&mut self) {
        self.checksum = mix(self.checksum ^ self.tick);
        self.tick = self.tick.wrapping_add(1);
    }

    fn present(&mut self, frame: &mut FrameBuffer) {
        if let Some(first) = frame.pixels_mut().first_mut() {
            *first = self.checksum as u8;
        }
        self.frames_presented += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dedicated_world(seed: u64) -> SimWorld {
        let mut world = SimWorld::new(seed);
        world.configure_dedicated();
        world
    }

    #[test]
    fn not_viable_until_configured() {
        let world = SimWorld::new(1);
        assert!(!world.is_viable());
        assert!(dedicated_world(1).is_viable());
    }

    #[test]
    fn step_advances_tick_and_checksum() {
        let mut world = dedicated_world(7);
        world.generate_new_world();
        let before = world.checksum();
        world.step();
        assert_eq!(world.tick(), 1);
        assert_ne!(world.checksum(), before);
    }

    #[test]
    fn save_then_load_resumes_same_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("world.json");

        let mut original = dedicated_world(99);
        original.generate_new_world();
        for _ in 0..50 {
            original.step();
        }
        original.save(&path).unwrap();

        let mut restored = dedicated_world(1);
        restored.load_world(&path, LoadMode::Savegame).unwrap();
        assert_eq!(restored.seed(), 99);
        assert_eq!(restored.tick(), 50);
        assert_eq!(restored.checksum(), original.checksum());
    }

    #[test]
    fn scenario_load_restarts_clock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        let mut original = dedicated_world(5);
        for _ in 0..10 {
            original.step();
        }
        original.save(&path).unwrap();

        let mut world = dedicated_world(1);
        world.load_world(&path, LoadMode::Scenario).unwrap();
        assert_eq!(world.tick(), 0);
        assert_eq!(world.seed(), 5);
    }

    #[test]
    fn corrupt_save_is_rejected_and_stops_networking() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "\x00\x01 definitely not json").unwrap();

        let mut world = dedicated_world(1);
        let err = world.load_world(&path, LoadMode::Savegame).unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
        assert!(!world.is_viable());
    }

    #[test]
    fn foreign_format_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("other.json");
        std::fs::write(
            &path,
            r#"{"format":"something-else","version":1,"seed":1,"tick":1,"checksum":1}"#,
        )
        .unwrap();

        let err = dedicated_world(1)
            .load_world(&path, LoadMode::Savegame)
            .unwrap_err();
        assert!(matches!(err, LoadError::Corrupt { .. }));
    }

    #[test]
    fn newer_version_is_unsupported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        std::fs::write(
            &path,
            r#"{"format":"dedicated-save","version":2,"seed":1,"tick":1,"checksum":1}"#,
        )
        .unwrap();

        let err = dedicated_world(1)
            .load_world(&path, LoadMode::Savegame)
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnsupportedVersion { version: 2, .. }
        ));
    }

    #[test]
    fn missing_save_is_io_error() {
        let dir = tempdir().unwrap();
        let err = dedicated_world(1)
            .load_world(&dir.path().join("nope.json"), LoadMode::Savegame)
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn present_counts_frames() {
        let mut world = dedicated_world(3);
        let mut frame = FrameBuffer::new(4, 4);
        world.step();
        world.present(&mut frame);
        assert_eq!(world.frames_presented(), 1);
    }
}
