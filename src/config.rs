//! Cadence configuration.
//!
//! Loaded from `--config`, `.cadence.yml` or `~/.config/cadence/cadence.yml`,
//! falling back to defaults. Every section tolerates missing keys.

use chrono::{NaiveDate, TimeDelta, Weekday};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calendar::WorkingCalendar;
use crate::queue::WorkerConfig;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overrides RUST_LOG when set.
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Where the database and journal live.
    pub storage: StorageConfig,

    /// Background worker settings.
    pub worker: WorkerSettings,

    /// Working week and excluded dates.
    pub calendar: CalendarConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .cadence.yml in current directory
    /// 3. ~/.config/cadence/cadence.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".cadence.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .cadence.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .cadence.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("cadence").join("cadence.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.worker.concurrency == 0 {
            eyre::bail!("worker.concurrency must be > 0");
        }
        if self.worker.claim_ttl_secs == 0 {
            eyre::bail!("worker.claim-ttl-secs must be > 0");
        }
        if self.worker.sweep_interval_secs == 0 {
            eyre::bail!("worker.sweep-interval-secs must be > 0");
        }
        self.calendar.working_calendar()?;
        Ok(())
    }
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding cadence.db.
    #[serde(rename = "db-dir")]
    pub db_dir: PathBuf,

    /// Directory for the occurrence journal written by the daemon.
    #[serde(rename = "data-dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let default_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cadence");

        Self {
            db_dir: default_dir.clone(),
            data_dir: default_dir.join("journal"),
        }
    }
}

/// Background worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Jobs executing at once.
    pub concurrency: usize,

    /// Seconds before a claim left by a crashed worker can be taken over.
    #[serde(rename = "claim-ttl-secs")]
    pub claim_ttl_secs: u64,

    /// Longest idle sleep between queue checks.
    #[serde(rename = "max-idle-secs")]
    pub max_idle_secs: u64,

    /// Seconds between sweeps for runs scheduled by other processes.
    #[serde(rename = "sweep-interval-secs")]
    pub sweep_interval_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            claim_ttl_secs: 600, // 10 minutes
            max_idle_secs: 30,
            sweep_interval_secs: 30,
        }
    }
}

impl WorkerSettings {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::new(self.concurrency)
            .with_max_idle(Duration::from_secs(self.max_idle_secs))
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            claim_ttl: TimeDelta::seconds(self.claim_ttl_secs as i64),
        }
    }
}

/// Working week and excluded dates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Weekday names, e.g. `mon` or `Monday`.
    #[serde(rename = "working-weekdays")]
    pub working_weekdays: Vec<String>,

    /// Dates no occurrence may fall on.
    #[serde(rename = "excluded-dates")]
    pub excluded_dates: Vec<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            working_weekdays: ["mon", "tue", "wed", "thu", "fri"].iter().map(|d| d.to_string()).collect(),
            excluded_dates: Vec::new(),
        }
    }
}

impl CalendarConfig {
    /// Build the process-wide calendar.
    pub fn working_calendar(&self) -> Result<WorkingCalendar> {
        let weekdays = self
            .working_weekdays
            .iter()
            .map(|name| {
                name.parse::<Weekday>()
                    .map_err(|_| eyre::eyre!("calendar.working-weekdays: unknown weekday '{}'", name))
            })
            .collect::<Result<Vec<_>>>()?;
        let calendar = WorkingCalendar::new(weekdays, self.excluded_dates.iter().copied())
            .context("calendar.working-weekdays is invalid")?;
        Ok(calendar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.worker.concurrency, 4);
        assert_eq!(config.worker.claim_ttl_secs, 600);
        assert!(config.log_level.is_none());
        assert!(config.storage.data_dir.ends_with("journal"));
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_is_invalid() {
        let config = Config {
            worker: WorkerSettings {
                concurrency: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_sweep_interval_is_invalid() {
        let config = Config {
            worker: WorkerSettings {
                sweep_interval_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sweep_interval_reaches_worker_config() {
        let yaml = "worker:\n  sweep-interval-secs: 5\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.worker.worker_config().sweep_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_working_week_is_invalid() {
        let config = Config {
            calendar: CalendarConfig {
                working_weekdays: Vec::new(),
                excluded_dates: Vec::new(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
log-level: debug
worker:
  concurrency: 8
calendar:
  working-weekdays: [Mon, Tue, Wed, Thu]
  excluded-dates:
    - 2025-01-08
    - 2025-12-25
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.worker.concurrency, 8);
        // Other fields should have defaults
        assert_eq!(config.worker.claim_ttl_secs, 600);

        let calendar = config.calendar.working_calendar().unwrap();
        assert!(!calendar.is_working_weekday(Weekday::Fri));
        assert!(calendar.is_excluded(NaiveDate::from_ymd_opt(2025, 12, 25).unwrap()));
    }

    #[test]
    fn test_unknown_weekday_rejected() {
        let calendar = CalendarConfig {
            working_weekdays: vec!["funday".to_string()],
            excluded_dates: Vec::new(),
        };
        assert!(calendar.working_calendar().is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("cadence.yml");
        fs::write(&path, "worker:\n  claim-ttl-secs: 30\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.worker.scheduler_config().claim_ttl, TimeDelta::seconds(30));
    }
}
