//! Configuration management for guildhall
//!
//! Defaults, TOML files and `GUILDHALL_<SECTION>_<KEY>` environment
//! overrides, all funnelled through [`GuildhallConfig::validate`].

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildhallConfig {
    pub sessions: SessionConfig,
    pub guilds: GuildRulesConfig,
    pub recruitment: RecruitmentConfig,
    pub relations: RelationConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Presentation-thread settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Window between arming a destructive action and its auto-cancel
    #[serde(with = "humantime_serde")]
    pub confirmation_timeout: Duration,

    /// Word that aborts chat capture without submitting a value
    pub input_cancel_keyword: String,

    /// Capacity of the session loop's command channel
    pub command_buffer: usize,

    /// Content rows per page on paginated screens
    pub page_rows: usize,
}

/// Naming and capacity rules for guilds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildRulesConfig {
    pub name_min_len: usize,
    pub name_max_len: usize,
    pub tag_min_len: usize,
    pub tag_max_len: usize,
    pub description_max_len: usize,
    pub default_capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecruitmentConfig {
    #[serde(with = "humantime_serde")]
    pub invitation_ttl: Duration,

    pub application_message_max_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationConfig {
    /// How long a PENDING proposal waits for the other side
    #[serde(with = "humantime_serde")]
    pub proposal_ttl: Duration,

    /// Lifetime of an accepted truce
    #[serde(with = "humantime_serde")]
    pub truce_duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Database file, required for the sqlite backend
    pub sqlite_path: Option<PathBuf>,

    /// Connection pool size
    pub pool_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_timestamp: bool,
    pub with_target: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(10),
            input_cancel_keyword: "cancel".to_string(),
            command_buffer: 256,
            page_rows: 6,
        }
    }
}

impl Default for GuildRulesConfig {
    fn default() -> Self {
        Self {
            name_min_len: 3,
            name_max_len: 16,
            tag_min_len: 2,
            tag_max_len: 6,
            description_max_len: 120,
            default_capacity: 20,
        }
    }
}

impl Default for RecruitmentConfig {
    fn default() -> Self {
        Self {
            invitation_ttl: Duration::from_secs(30 * 60),
            application_message_max_len: 100,
        }
    }
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            proposal_ttl: Duration::from_secs(24 * 60 * 60),
            truce_duration: Duration::from_secs(72 * 60 * 60),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sqlite_path: None,
            pool_size: 4,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

fn override_from_env<T>(key: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(key) {
        *target = raw.parse().map_err(|e: T::Err| ConfigError::Env {
            key: key.to_string(),
            reason: e.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

fn override_duration_from_env(key: &str, target: &mut Duration) -> Result<(), ConfigError> {
    if let Ok(raw) = env::var(key) {
        *target = humantime_serde::re::humantime::parse_duration(&raw).map_err(|e| ConfigError::Env {
            key: key.to_string(),
            reason: e.to_string(),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

impl GuildhallConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: GUILDHALL_<SECTION>_<KEY>
    /// Example: GUILDHALL_SESSIONS_CONFIRMATION_TIMEOUT=15s
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    /// Layer `GUILDHALL_*` variables over the current values
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        override_duration_from_env(
            "GUILDHALL_SESSIONS_CONFIRMATION_TIMEOUT",
            &mut self.sessions.confirmation_timeout,
        )?;
        override_from_env(
            "GUILDHALL_SESSIONS_INPUT_CANCEL_KEYWORD",
            &mut self.sessions.input_cancel_keyword,
        )?;
        override_from_env("GUILDHALL_SESSIONS_COMMAND_BUFFER", &mut self.sessions.command_buffer)?;
        override_from_env("GUILDHALL_SESSIONS_PAGE_ROWS", &mut self.sessions.page_rows)?;

        override_from_env("GUILDHALL_GUILDS_NAME_MIN_LEN", &mut self.guilds.name_min_len)?;
        override_from_env("GUILDHALL_GUILDS_NAME_MAX_LEN", &mut self.guilds.name_max_len)?;
        override_from_env("GUILDHALL_GUILDS_TAG_MIN_LEN", &mut self.guilds.tag_min_len)?;
        override_from_env("GUILDHALL_GUILDS_TAG_MAX_LEN", &mut self.guilds.tag_max_len)?;
        override_from_env(
            "GUILDHALL_GUILDS_DESCRIPTION_MAX_LEN",
            &mut self.guilds.description_max_len,
        )?;
        override_from_env("GUILDHALL_GUILDS_DEFAULT_CAPACITY", &mut self.guilds.default_capacity)?;

        override_duration_from_env(
            "GUILDHALL_RECRUITMENT_INVITATION_TTL",
            &mut self.recruitment.invitation_ttl,
        )?;
        override_from_env(
            "GUILDHALL_RECRUITMENT_APPLICATION_MESSAGE_MAX_LEN",
            &mut self.recruitment.application_message_max_len,
        )?;

        override_duration_from_env(
            "GUILDHALL_RELATIONS_PROPOSAL_TTL",
            &mut self.relations.proposal_ttl,
        )?;
        override_duration_from_env(
            "GUILDHALL_RELATIONS_TRUCE_DURATION",
            &mut self.relations.truce_duration,
        )?;

        override_from_env("GUILDHALL_STORE_BACKEND", &mut self.store.backend)?;
        if let Ok(path) = env::var("GUILDHALL_STORE_SQLITE_PATH") {
            self.store.sqlite_path = Some(PathBuf::from(path));
        }
        override_from_env("GUILDHALL_STORE_POOL_SIZE", &mut self.store.pool_size)?;

        override_from_env("GUILDHALL_LOGGING_LEVEL", &mut self.logging.level)?;
        override_from_env("GUILDHALL_LOGGING_JSON_FORMAT", &mut self.logging.json_format)?;
        override_from_env("GUILDHALL_LOGGING_WITH_TIMESTAMP", &mut self.logging.with_timestamp)?;
        override_from_env("GUILDHALL_LOGGING_WITH_TARGET", &mut self.logging.with_target)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("confirmation_timeout", self.sessions.confirmation_timeout),
            ("invitation_ttl", self.recruitment.invitation_ttl),
            ("proposal_ttl", self.relations.proposal_ttl),
            ("truce_duration", self.relations.truce_duration),
        ];
        if let Some((key, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration(*key));
        }

        let counts = [
            ("command_buffer", self.sessions.command_buffer),
            ("page_rows", self.sessions.page_rows),
            ("default_capacity", self.guilds.default_capacity as usize),
            ("pool_size", self.store.pool_size as usize),
        ];
        if let Some((key, _)) = counts.iter().find(|(_, n)| *n == 0) {
            return Err(ConfigError::ZeroCount(*key));
        }

        let bounds = [
            ("name", self.guilds.name_min_len, self.guilds.name_max_len),
            ("tag", self.guilds.tag_min_len, self.guilds.tag_max_len),
        ];
        for (field, min, max) in bounds {
            if min == 0 || min > max {
                return Err(ConfigError::LengthBounds { field, min, max });
            }
        }

        if self.sessions.input_cancel_keyword.trim().is_empty() {
            return Err(ConfigError::BlankCancelKeyword);
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.sqlite_path.is_none() {
            return Err(ConfigError::MissingSqlitePath);
        }
        if crate::logging::LogLevel::from_str(&self.logging.level).is_none() {
            return Err(ConfigError::UnknownLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GuildhallConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sessions.confirmation_timeout, Duration::from_secs(10));
        assert_eq!(config.recruitment.invitation_ttl, Duration::from_secs(1800));
        assert_eq!(config.sessions.input_cancel_keyword, "cancel");
    }

    #[test]
    fn test_config_validation() {
        let mut config = GuildhallConfig::default();
        config.sessions.confirmation_timeout = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("confirmation_timeout"))
        ));

        config = GuildhallConfig::default();
        config.relations.truce_duration = Duration::ZERO;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("truce_duration"))
        ));

        config = GuildhallConfig::default();
        config.store.pool_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroCount("pool_size"))));

        config = GuildhallConfig::default();
        config.guilds.name_min_len = 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LengthBounds { field: "name", min: 20, max: 16 })
        ));

        config = GuildhallConfig::default();
        config.sessions.input_cancel_keyword = "  ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::BlankCancelKeyword)));

        config = GuildhallConfig::default();
        config.store.backend = StoreBackend::Sqlite;
        assert!(matches!(config.validate(), Err(ConfigError::MissingSqlitePath)));
        config.store.sqlite_path = Some(PathBuf::from("guilds.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        match GuildhallConfig::from_file(&missing) {
            Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected a read error, got {:?}", other),
        }

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[sessions\nconfirmation_timeout = 3").unwrap();
        assert!(matches!(
            GuildhallConfig::from_file(&broken),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_bad_env_duration_reports_key_and_value() {
        let key = "GUILDHALL_TEST_ONLY_BAD_DURATION";
        env::set_var(key, "soon");
        let mut target = Duration::from_secs(1);
        let result = override_duration_from_env(key, &mut target);
        env::remove_var(key);

        match result {
            Err(ConfigError::Env { key: k, value, .. }) => {
                assert_eq!(k, key);
                assert_eq!(value, "soon");
            }
            other => panic!("expected an env error, got {:?}", other),
        }
        assert_eq!(target, Duration::from_secs(1));
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = GuildhallConfig::default();

        config.logging.level = "invalid".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownLogLevel(level)) if level == "invalid"));

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guildhall.toml");
        std::fs::write(
            &path,
            "[sessions]\nconfirmation_timeout = \"15s\"\n\n[store]\nbackend = \"sqlite\"\nsqlite_path = \"g.db\"\n",
        )
        .unwrap();

        let config = GuildhallConfig::from_file(&path).unwrap();
        assert_eq!(config.sessions.confirmation_timeout, Duration::from_secs(15));
        assert_eq!(config.sessions.page_rows, 6);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.guilds.name_max_len, 16);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.toml");

        let mut config = GuildhallConfig::default();
        config.relations.truce_duration = Duration::from_secs(3600);
        config.save_to_file(&path).unwrap();

        let reloaded = GuildhallConfig::from_file(&path).unwrap();
        assert_eq!(reloaded.relations.truce_duration, Duration::from_secs(3600));
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("SQLite".parse::<StoreBackend>(), Ok(StoreBackend::Sqlite));
        assert!("postgres".parse::<StoreBackend>().is_err());
    }
}
