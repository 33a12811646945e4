use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse view-state config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize view-state config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid view-state config: {0}")]
    Invalid(String),
}

// ===== CONFIG TYPES =====

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ViewStateConfig {
    pub app: AppSection,
    pub reactive: ReactiveSection,
    pub refresh: RefreshSection,
    pub errors: ErrorSection,
}

impl ViewStateConfig {
    /// Parses TOML, migrating or recreating configs written by other versions.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(source)?;
        match config.app.migration_strategy() {
            MigrationStrategy::None => {}
            MigrationStrategy::Upgrade(description) => {
                log::warn!("Migrating view-state config: {description}");
                config.app.version = AppSection::CURRENT_VERSION.to_string();
            }
            MigrationStrategy::Recreate => {
                log::warn!(
                    "Unsupported view-state config version '{}', falling back to defaults",
                    config.app.version
                );
                config = Self::default();
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reactive.max_settle_passes == 0 {
            return Err(ConfigError::Invalid(
                "reactive.max_settle_passes must be at least 1".into(),
            ));
        }
        if self.refresh.enabled && self.refresh.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "refresh.interval_secs must be positive when refresh is enabled".into(),
            ));
        }
        if let Some(status) = self
            .errors
            .reauthenticate_statuses
            .iter()
            .find(|status| self.errors.maintenance_statuses.contains(*status))
        {
            return Err(ConfigError::Invalid(format!(
                "status {status} is listed both for reauthentication and maintenance"
            )));
        }
        Ok(())
    }
}

// AppSection carries the config format version so older files can be migrated
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSection {
    pub version: String,
}

impl AppSection {
    pub const CURRENT_VERSION: &'static str = "1.1.0";

    pub fn needs_migration(&self) -> bool {
        self.version != Self::CURRENT_VERSION
    }

    pub fn migration_strategy(&self) -> MigrationStrategy {
        match self.version.as_str() {
            Self::CURRENT_VERSION => MigrationStrategy::None,
            // 1.0.0 had no [errors] section; serde defaults fill it in.
            "1.0.0" => MigrationStrategy::Upgrade("1.0.0 -> 1.1.0".to_string()),
            _ => MigrationStrategy::Recreate,
        }
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MigrationStrategy {
    None,
    Upgrade(String),
    Recreate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ReactiveSection {
    /// Upper bound on effect passes before a runaway graph is cut off.
    pub max_settle_passes: usize,
}

impl Default for ReactiveSection {
    fn default() -> Self {
        Self {
            max_settle_passes: 100,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RefreshSection {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl RefreshSection {
    /// Refresh period, if auto refresh is on.
    pub fn period(&self) -> Option<Duration> {
        (self.enabled && self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ErrorSection {
    pub reauthenticate_statuses: Vec<u16>,
    pub maintenance_statuses: Vec<u16>,
    pub notification_auto_dismiss_ms: u64,
}

impl Default for ErrorSection {
    fn default() -> Self {
        Self {
            reauthenticate_statuses: vec![401],
            maintenance_statuses: vec![429, 503],
            notification_auto_dismiss_ms: 5000,
        }
    }
}
