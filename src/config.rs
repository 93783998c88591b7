use crate::error::ValidationError;
use crate::radio_fx::ReverbIntensity;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MIN_PROGRESS_TICK_MS: u64 = 10;
/// Retries of a failing item are never closer together than this.
const MIN_RETRY_BACKOFF_MS: u64 = 100;

/// Station-wide settings, persisted inside the station file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// How often a listening session reports progress and checks for item end.
    pub progress_tick_ms: u64,
    /// Minimum spacing between retries after a player fails to start.
    pub retry_backoff_ms: u64,
    /// Consecutive start failures before the broadcast is reported unavailable.
    pub max_consecutive_failures: u32,
    pub default_reverb: ReverbIntensity,
    /// Directory holding cached audio for external clips, named by reference.
    pub clip_dir: Option<String>,
    pub output_volume: f32,
}

impl Default for StationConfig {
    fn default() -> Self {
        StationConfig {
            progress_tick_ms: 250,
            retry_backoff_ms: 500,
            max_consecutive_failures: 5,
            default_reverb: ReverbIntensity::Medium,
            clip_dir: None,
            output_volume: 1.0,
        }
    }
}

impl StationConfig {
    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(MIN_PROGRESS_TICK_MS))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.max(MIN_RETRY_BACKOFF_MS))
    }

    /// Update one setting by its key. Used by `config set`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ValidationError> {
        let bad = || ValidationError::BadSetting {
            key: key.to_string(),
            value: value.to_string(),
        };
        match key {
            "progress_tick_ms" => {
                self.progress_tick_ms = value.parse().map_err(|_| bad())?;
            }
            "retry_backoff_ms" => {
                self.retry_backoff_ms = value.parse().map_err(|_| bad())?;
            }
            "max_consecutive_failures" => {
                let n: u32 = value.parse().map_err(|_| bad())?;
                if n == 0 {
                    return Err(bad());
                }
                self.max_consecutive_failures = n;
            }
            "default_reverb" => {
                self.default_reverb = ReverbIntensity::from_str_loose(value)?;
            }
            "clip_dir" => {
                let value = value.trim();
                self.clip_dir = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            "output_volume" => {
                let v: f32 = value.parse().map_err(|_| bad())?;
                if !(0.0..=1.0).contains(&v) {
                    return Err(bad());
                }
                self.output_volume = v;
            }
            _ => return Err(ValidationError::UnknownSetting(key.to_string())),
        }
        Ok(())
    }
}

impl fmt::Display for StationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "progress_tick_ms         = {}", self.progress_tick_ms)?;
        writeln!(f, "retry_backoff_ms         = {}", self.retry_backoff_ms)?;
        writeln!(f, "max_consecutive_failures = {}", self.max_consecutive_failures)?;
        writeln!(f, "default_reverb           = {}", self.default_reverb)?;
        writeln!(
            f,
            "clip_dir                 = {}",
            self.clip_dir.as_deref().unwrap_or("(none)")
        )?;
        write!(f, "output_volume            = {}", self.output_volume)
    }
}
