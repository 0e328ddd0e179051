use crate::console::ConsoleStrategy;
use crate::game::LoadMode;
use crate::tick::DEFAULT_TICK_INTERVAL;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from dedicated.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: LoopConfig,
    pub daemon: DaemonConfig,
    pub console: ConsoleConfig,
    pub world: WorldConfig,
    pub status: StatusConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_interval_ms: u64,
    pub idle_sleep_ms: u64,
    /// Off-screen buffer size handed to the presentation stage.
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub background: bool,
    pub log_file: PathBuf,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    pub strategy: ConsoleStrategy,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WorldConfig {
    /// Saved world to load instead of generating a new one.
    pub load: Option<PathBuf>,
    pub load_mode: LoadMode,
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub file: Option<PathBuf>,
    pub interval_ticks: u64,
}

// --- Default implementations ---

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            idle_sleep_ms: 1,
            width: 640,
            height: 480,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            background: false,
            log_file: PathBuf::from("dedicated.log"),
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            file: None,
            interval_ticks: 1000,
        }
    }
}

impl LoopConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid config value {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl ServerConfig {
    /// Load config from `path`. A missing file yields the defaults; an
    /// unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        Self::parse(&contents, path)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Check values that would make the runtime loop misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "server.tick_interval_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.daemon.log_file.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "daemon.log_file",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_classic_dedicated_server() {
        let config = ServerConfig::default();
        assert_eq!(config.server.tick_interval(), Duration::from_millis(30));
        assert_eq!(config.server.idle_sleep(), Duration::from_millis(1));
        assert!(!config.daemon.background);
        assert_eq!(config.daemon.log_file, PathBuf::from("dedicated.log"));
        assert_eq!(config.console.strategy, ConsoleStrategy::Auto);
        assert!(config.world.load.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.server.tick_interval_ms, 30);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedicated.toml");
        std::fs::write(
            &path,
            r#"
[server]
tick_interval_ms = 50

[world]
load = "saves/autosave.json"
load_mode = "scenario"

[console]
strategy = "thread"
"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.server.tick_interval_ms, 50);
        assert_eq!(config.server.width, 640);
        assert_eq!(
            config.world.load,
            Some(PathBuf::from("saves/autosave.json"))
        );
        assert_eq!(config.world.load_mode, LoadMode::Scenario);
        assert_eq!(config.console.strategy, ConsoleStrategy::Thread);
        assert_eq!(config.status.interval_ticks, 1000);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dedicated.toml");
        std::fs::write(&path, "[server]\ntick_interval_ms = \"fast\"\n").unwrap();

        let err = ServerConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("dedicated.toml"));
    }

    #[test]
    fn zero_tick_interval_is_invalid() {
        let mut config = ServerConfig::default();
        config.server.tick_interval_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.tick_interval_ms"));
    }

    #[test]
    fn unknown_console_strategy_is_rejected() {
        let err = ServerConfig::parse(
            "[console]\nstrategy = \"telepathy\"\n",
            Path::new("inline.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
