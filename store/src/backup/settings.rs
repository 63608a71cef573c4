use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How often the backup timer fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupInterval {
    #[serde(rename = "10min")]
    TenMinutes,
    #[default]
    #[serde(rename = "1hour")]
    OneHour,
    #[serde(rename = "1day")]
    OneDay,
}

impl BackupInterval {
    pub fn period(self) -> Duration {
        match self {
            Self::TenMinutes => Duration::from_secs(10 * 60),
            Self::OneHour => Duration::from_secs(60 * 60),
            Self::OneDay => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TenMinutes => "10min",
            Self::OneHour => "1hour",
            Self::OneDay => "1day",
        }
    }
}

impl fmt::Display for BackupInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "10min" => Ok(Self::TenMinutes),
            "1hour" => Ok(Self::OneHour),
            "1day" => Ok(Self::OneDay),
            other => Err(format!(
                "unknown backup interval '{}' (expected 10min, 1hour or 1day)",
                other
            )),
        }
    }
}

/// Persisted backup configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSettings {
    pub enabled: bool,
    pub interval: BackupInterval,
    pub max_backups: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: BackupInterval::OneHour,
            max_backups: 10,
        }
    }
}
