//! Configuration management

use crate::application::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bot configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    pub bot: BotConfig,
    pub runtime: RuntimeConfig,
    pub storage: StorageConfig,
    pub plugins: PluginConfig,
    pub adapters: AdaptersConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BotConfig {
    pub name: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: "keel-bot".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RuntimeConfig {
    /// Number of shared workers
    pub workers: usize,
    /// Capacity of each dedicated plugin's queue
    pub queue_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_limit: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StorageConfig {
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/keel-bot.db"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PluginConfig {
    /// Plugins that are registered but not started
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AdaptersConfig {
    pub console: ConsoleConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConsoleConfig {
    pub bot_id: i64,
    pub operator_id: i64,
    pub operator_name: String,
    /// Whether the operator counts as a platform administrator
    pub operator_is_admin: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            bot_id: 1,
            operator_id: 2,
            operator_name: "operator".to_string(),
            operator_is_admin: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Parse(format!("Failed to read config: {}", e)))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults; environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            Self::load(path)?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `BOT_*` overrides read through `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("BOT_DB_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(workers) = lookup("BOT_WORKERS") {
            self.runtime.workers = workers
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("BOT_WORKERS={}", workers)))?;
        }
        if let Some(level) = lookup("BOT_LOG_LEVEL") {
            self.logging.level = level;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.name.trim().is_empty() {
            return Err(ConfigError::MissingField("bot.name".to_string()));
        }
        if self.runtime.workers == 0 {
            return Err(ConfigError::InvalidValue("runtime.workers must be at least 1".to_string()));
        }
        if self.runtime.queue_limit == 0 {
            return Err(ConfigError::InvalidValue("runtime.queue-limit must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn is_disabled(&self, plugin: &str) -> bool {
        self.plugins.disabled.iter().any(|p| p == plugin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = Config::from_yaml(
            "runtime:\n  workers: 2\nplugins:\n  disabled: [greet]\nadapters:\n  console:\n    operator-name: ada\n",
        )
        .unwrap();
        assert_eq!(config.runtime.workers, 2);
        assert_eq!(config.runtime.queue_limit, 256);
        assert!(config.is_disabled("greet"));
        assert!(!config.is_disabled("help"));
        assert_eq!(config.adapters.console.operator_name, "ada");
        assert_eq!(config.bot.name, "keel-bot");
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [("BOT_WORKERS", "8"), ("BOT_DB_PATH", "/tmp/x.db")].into();
        let config = Config::default()
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.runtime.workers, 8);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn zero_workers_rejected() {
        assert!(matches!(
            Config::from_yaml("runtime:\n  workers: 0\n"),
            Err(ConfigError::InvalidValue(_))
        ));
        let env: HashMap<&str, &str> = [("BOT_WORKERS", "many")].into();
        assert!(Config::default().apply_env(|k| env.get(k).map(|v| v.to_string())).is_err());
    }

    #[test]
    fn default_round_trips_through_yaml() {
        let yaml = Config::default().to_yaml().unwrap();
        assert!(yaml.contains("queue-limit"));
        let back = Config::from_yaml(&yaml).unwrap();
        assert_eq!(back.storage.path, Config::default().storage.path);
    }
}
