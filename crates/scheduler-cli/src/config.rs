//! Configuration file management for the scheduler binary.
//!
//! Provides a TOML-based config file at `~/.config/scheduler/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use scheduler_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub poll: PollSection,
    #[serde(default)]
    pub compensation: CompensationSection,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub cron: CronSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PollSection {
    pub delay_ms: Option<u64>,
    pub batch: Option<usize>,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            delay_ms: None,
            batch: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CompensationSection {
    pub default_root: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RunnerSection {
    pub strict: Option<bool>,
    pub allowed_prefixes: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CronSection {
    pub interval_secs: Option<u64>,
    pub initial_delay_secs: Option<u64>,
}

impl Default for CronSection {
    fn default() -> Self {
        Self {
            interval_secs: None,
            initial_delay_secs: None,
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the scheduler config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/scheduler` or
/// `~/.config/scheduler`. We intentionally ignore the platform-specific
/// `dirs::config_dir()` (which returns `~/Library/Application Support` on
/// macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("scheduler");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("scheduler")
}

/// Return the path to the scheduler config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub db_config: DbConfig,
    pub poll_delay: Duration,
    pub poll_batch: usize,
    pub compensation_default_root: Option<String>,
    pub runner_strict: bool,
    pub runner_allowed_prefixes: Vec<String>,
    pub cron_interval: Duration,
    pub cron_initial_delay: Duration,
}

impl SchedulerConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB URL: `cli_db_url` > `SCHED_DATABASE_URL` env > config file's
    ///   `database.url` > [`DbConfig::DEFAULT_URL`].
    /// - Every other field: config file value if present, else the default
    ///   named in the field's doc comment. None of these have dedicated env
    ///   vars; operators wanting per-process overrides edit the file.
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("SCHED_DATABASE_URL") {
            url
        } else if let Some(url) = file_config.as_ref().and_then(|c| c.database.url.clone()) {
            url
        } else {
            DbConfig::DEFAULT_URL.to_string()
        };
        let db_config = DbConfig::new(db_url);

        let poll_delay_ms = file_config
            .as_ref()
            .and_then(|c| c.poll.delay_ms)
            .unwrap_or(2000);
        let poll_batch = file_config.as_ref().and_then(|c| c.poll.batch).unwrap_or(16);

        let compensation_default_root = file_config
            .as_ref()
            .and_then(|c| c.compensation.default_root.clone());

        let runner_strict = file_config
            .as_ref()
            .and_then(|c| c.runner.strict)
            .unwrap_or(false);
        let runner_allowed_prefixes = file_config
            .as_ref()
            .and_then(|c| c.runner.allowed_prefixes.clone())
            .unwrap_or_else(|| vec!["builtin.".to_owned(), "sample.".to_owned()]);

        let cron_interval_secs = file_config
            .as_ref()
            .and_then(|c| c.cron.interval_secs)
            .unwrap_or(10);
        let cron_initial_delay_secs = file_config
            .as_ref()
            .and_then(|c| c.cron.initial_delay_secs)
            .unwrap_or(5);

        Ok(Self {
            db_config,
            poll_delay: Duration::from_millis(poll_delay_ms),
            poll_batch,
            compensation_default_root,
            runner_strict,
            runner_allowed_prefixes,
            cron_interval: Duration::from_secs(cron_interval_secs),
            cron_initial_delay: Duration::from_secs(cron_initial_delay_secs),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    #[test]
    fn resolve_with_cli_flag_overrides_all() {
        let _lock = lock_env();
        unsafe { std::env::set_var("SCHED_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = SchedulerConfig::resolve(Some("postgresql://cli:5432/clidb")).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var("SCHED_DATABASE_URL") };
    }

    #[test]
    fn resolve_with_env_var_overrides_default() {
        let _lock = lock_env();
        unsafe { std::env::set_var("SCHED_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = SchedulerConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");

        unsafe { std::env::remove_var("SCHED_DATABASE_URL") };
    }

    #[test]
    fn resolve_defaults_when_nothing_set() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("SCHED_DATABASE_URL") };

        let config = SchedulerConfig::resolve(None).unwrap();
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.poll_batch, 16);
        assert_eq!(config.poll_delay, Duration::from_millis(2000));
        assert!(!config.runner_strict);
        assert_eq!(
            config.runner_allowed_prefixes,
            vec!["builtin.".to_owned(), "sample.".to_owned()]
        );
        assert_eq!(config.cron_interval, Duration::from_secs(10));
        assert_eq!(config.cron_initial_delay, Duration::from_secs(5));
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("scheduler/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }

    #[test]
    fn config_file_roundtrips_through_toml() {
        let cfg = ConfigFile {
            database: DatabaseSection {
                url: Some("postgresql://testhost:5432/testdb".to_owned()),
            },
            poll: PollSection {
                delay_ms: Some(500),
                batch: Some(8),
            },
            compensation: CompensationSection {
                default_root: Some("/var/lib/scheduler".to_owned()),
            },
            runner: RunnerSection {
                strict: Some(true),
                allowed_prefixes: Some(vec!["builtin.".to_owned()]),
            },
            cron: CronSection {
                interval_secs: Some(30),
                initial_delay_secs: Some(2),
            },
        };

        let serialized = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ConfigFile = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.database.url, cfg.database.url);
        assert_eq!(parsed.poll.batch, Some(8));
        assert_eq!(parsed.runner.strict, Some(true));
    }
}
