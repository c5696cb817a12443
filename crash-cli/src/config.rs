use anyhow::Context;
use crash_core::OracleConfig;
use crash_engine::GameConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";

/// Optional `config.json` in the data directory. Missing sections fall back
/// to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub game: GameConfig,
    pub oracle: OracleConfig,
}

impl CliConfig {
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: CliConfig = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        config.game.validate()?;
        config.oracle.validate()?;

        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crash")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.game.tick_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"{ "oracle": { "base_url": "http://localhost:9000" } }"#,
        )
        .unwrap();

        let config = CliConfig::load(temp_dir.path()).unwrap();
        assert_eq!(config.oracle.base_url, "http://localhost:9000");
        assert_eq!(config.game.growth_rate, 0.01);
    }

    #[test]
    fn test_invalid_game_config_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = CliConfig::default();
        config.game.growth_rate = 0.0;
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            serde_json::to_string(&config).unwrap(),
        )
        .unwrap();

        assert!(CliConfig::load(temp_dir.path()).is_err());
    }
}
