use crate::engine::EngineError;
use crate::utils::duration_millis;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// What to load test. Immutable once handed to [`RunController::start`](crate::engine::RunController::start).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub url: String,
    #[serde(default = "default_users")]
    pub users: u32,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
    #[serde(default = "default_ramp_up_secs")]
    pub ramp_up_secs: u64,
}

fn default_users() -> u32 {
    10
}

fn default_duration_secs() -> u64 {
    30
}

fn default_ramp_up_secs() -> u64 {
    5
}

impl RunConfig {
    pub fn new(url: impl Into<String>, users: u32, duration_secs: u64, ramp_up_secs: u64) -> Self {
        Self {
            url: url.into(),
            users,
            duration_secs,
            ramp_up_secs,
        }
    }

    /// Load a run plan from a YAML or JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run plan: {}", path.display()))?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let config = if is_json {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON run plan: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid YAML run plan: {}", path.display()))?
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(EngineError::InvalidConfig("target URL is empty".to_string()));
        }

        let parsed = Url::parse(url).map_err(|e| {
            EngineError::InvalidConfig(format!("target URL '{}' is not valid: {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(EngineError::InvalidConfig(format!(
                "unsupported URL scheme '{}', expected http or https",
                parsed.scheme()
            )));
        }

        if self.users < 1 {
            return Err(EngineError::InvalidConfig(
                "user count must be at least 1".to_string(),
            ));
        }

        if self.duration_secs < 1 {
            return Err(EngineError::InvalidConfig(
                "duration must be at least 1 second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs(self.ramp_up_secs)
    }
}

/// Knobs of the load-generation engine that are independent of any single run.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub cadence: Duration,
    #[serde(with = "duration_millis")]
    pub stagger_step: Duration,
    pub stagger_buckets: u32,
    pub target_rps: Option<u32>,
    #[serde(with = "duration_millis")]
    pub pause_poll: Duration,
    pub max_connections: usize,
    pub max_errors: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            cadence: Duration::from_secs(1),
            stagger_step: Duration::from_millis(25),
            stagger_buckets: 8,
            target_rps: None,
            pause_poll: Duration::from_millis(500),
            max_connections: 256,
            max_errors: 1000,
        }
    }
}

/// Longest a paused user may sleep before looking at the run state again.
pub const MAX_PAUSE_POLL: Duration = Duration::from_secs(5);

impl EngineSettings {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.request_timeout.is_zero() {
            return Err(EngineError::InvalidConfig(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        if self.pause_poll.is_zero() || self.pause_poll > MAX_PAUSE_POLL {
            return Err(EngineError::InvalidConfig(format!(
                "pause poll interval must be between 1ms and {}ms",
                MAX_PAUSE_POLL.as_millis()
            )));
        }

        let rps_driven = matches!(self.target_rps, Some(rps) if rps > 0);
        if !rps_driven && self.cadence.is_zero() {
            return Err(EngineError::InvalidConfig(
                "cadence must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct UserConfig {
    pub engine: EngineSettings,
    pub reports: ReportConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ReportConfig {
    pub default_formats: Vec<String>,
    pub output_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_formats: vec!["json".to_string()],
            output_dir: PathBuf::from("surge-reports"),
        }
    }
}

impl UserConfig {
    pub fn load() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Self::load_from(&config_dir)
    }

    pub fn load_from(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.json");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: UserConfig = match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(path = %config_path.display(), error = %e, "ignoring unreadable config file");
                    UserConfig::default()
                }
            };
            Ok(config)
        } else {
            let default_config = UserConfig::default();
            default_config.save_to(config_dir)?;
            Ok(default_config)
        }
    }

    pub fn save_to(&self, config_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(config_dir)?;

        let config_path = config_dir.join("config.json");
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    fn get_config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .map_err(|_| anyhow::anyhow!("Unable to find home directory"))?;

        Ok(PathBuf::from(home).join(".surge"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_sane_config() {
        let config = RunConfig::new("http://localhost:8080/health", 5, 10, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let cases = vec![
            RunConfig::new("", 5, 10, 0),
            RunConfig::new("   ", 5, 10, 0),
            RunConfig::new("not a url", 5, 10, 0),
            RunConfig::new("ftp://example.com", 5, 10, 0),
            RunConfig::new("http://example.com", 0, 10, 0),
            RunConfig::new("http://example.com", 5, 0, 0),
        ];

        for config in cases {
            match config.validate() {
                Err(EngineError::InvalidConfig(_)) => {}
                other => panic!("expected InvalidConfig for {:?}, got {:?}", config, other),
            }
        }
    }

    #[test]
    fn test_engine_settings_validate() {
        assert!(EngineSettings::default().validate().is_ok());

        let cases = vec![
            EngineSettings {
                request_timeout: Duration::ZERO,
                ..EngineSettings::default()
            },
            EngineSettings {
                pause_poll: Duration::ZERO,
                ..EngineSettings::default()
            },
            EngineSettings {
                pause_poll: Duration::from_secs(60),
                ..EngineSettings::default()
            },
            EngineSettings {
                cadence: Duration::ZERO,
                ..EngineSettings::default()
            },
        ];

        for settings in cases {
            match settings.validate() {
                Err(EngineError::InvalidConfig(_)) => {}
                other => panic!("expected InvalidConfig for {:?}, got {:?}", settings, other),
            }
        }

        // the base cadence is unused when a target rate drives the interval
        let rps_driven = EngineSettings {
            cadence: Duration::ZERO,
            target_rps: Some(50),
            ..EngineSettings::default()
        };
        assert!(rps_driven.validate().is_ok());
    }

    #[test]
    fn test_ramp_up_may_exceed_duration() {
        let config = RunConfig::new("https://example.com", 3, 2, 60);
        assert!(config.validate().is_ok());
        assert_eq!(config.ramp_up(), Duration::from_secs(60));
    }

    #[test]
    fn test_load_yaml_plan_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plan.yaml");
        std::fs::write(&path, "url: \"http://127.0.0.1:9000\"\nusers: 3\n").unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.url, "http://127.0.0.1:9000");
        assert_eq!(config.users, 3);
        assert_eq!(config.duration_secs, 30);
        assert_eq!(config.ramp_up_secs, 5);
    }

    #[test]
    fn test_load_json_plan() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"url": "https://example.com", "users": 2, "duration_secs": 4, "ramp_up_secs": 0}"#,
        )
        .unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config, RunConfig::new("https://example.com", 2, 4, 0));
    }

    #[test]
    fn test_user_config_created_on_first_load() {
        let temp_dir = TempDir::new().unwrap();
        let config = UserConfig::load_from(temp_dir.path()).unwrap();

        assert!(temp_dir.path().join("config.json").exists());
        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.reports.default_formats, vec!["json".to_string()]);
    }

    #[test]
    fn test_user_config_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join("config.json"),
            r#"{"engine": {"cadence": 250, "max_connections": 16}}"#,
        )
        .unwrap();

        let config = UserConfig::load_from(temp_dir.path()).unwrap();
        assert_eq!(config.engine.cadence, Duration::from_millis(250));
        assert_eq!(config.engine.max_connections, 16);
        assert_eq!(config.engine.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_user_config_falls_back_on_garbage() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("config.json"), "{ not json").unwrap();

        let config = UserConfig::load_from(temp_dir.path()).unwrap();
        assert_eq!(config.engine, EngineSettings::default());
    }
}
