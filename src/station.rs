use crate::broadcast::{BroadcastDescriptor, GoLive};
use crate::config::StationConfig;
use crate::error::{StoreError, ValidationError};
use crate::timeline::Timeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STATE_FILE: &str = "station.json";
const APP_DIR: &str = "signal_cast";

/// Everything the station persists: settings, the draft timeline being
/// authored, and every broadcast that has gone live.
#[derive(Debug, Serialize, Deserialize)]
pub struct Station {
    #[serde(default)]
    pub config: StationConfig,
    #[serde(default)]
    pub draft: Timeline,
    #[serde(default)]
    pub broadcasts: Vec<BroadcastDescriptor>,
    #[serde(default = "first_id")]
    next_id: u32,
    #[serde(skip)]
    path: Option<PathBuf>,
}

fn first_id() -> u32 {
    1
}

impl Station {
    pub fn new() -> Self {
        Station {
            config: StationConfig::default(),
            draft: Timeline::new(),
            broadcasts: Vec::new(),
            next_id: 1,
            path: None,
        }
    }

    /// `<data dir>/signal_cast/station.json`, or `./station.json` when the
    /// platform has no data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join(STATE_FILE))
            .unwrap_or_else(|| PathBuf::from(STATE_FILE))
    }

    /// Load station state from `path`, or start fresh if missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        let mut station = if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str::<Station>(&data) {
                    Ok(station) => station,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "corrupt station file, starting fresh");
                        Station::new()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read station file");
                    Station::new()
                }
            }
        } else {
            Station::new()
        };
        station.path = Some(path.to_path_buf());
        station
    }

    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    /// Persist current state as pretty JSON.
    pub fn save(&self) -> Result<(), StoreError> {
        let path = self.path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Freeze the draft into a new broadcast and clear the draft.
    pub fn go_live(
        &mut self,
        options: GoLive,
        now: DateTime<Utc>,
    ) -> Result<&BroadcastDescriptor, ValidationError> {
        let name = options.name.trim().to_string();
        if self
            .broadcasts
            .iter()
            .any(|b| b.is_live(now) && b.name.eq_ignore_ascii_case(&name))
        {
            return Err(ValidationError::DuplicateBroadcast(name));
        }

        let descriptor = BroadcastDescriptor::go_live(self.next_id, &self.draft, options, now)?;
        self.next_id += 1;
        info!(
            id = descriptor.id,
            name = %descriptor.name,
            items = descriptor.timeline().len(),
            looping = descriptor.is_looping,
            "broadcast created"
        );
        self.draft.clear();
        self.broadcasts.push(descriptor);
        Ok(&self.broadcasts[self.broadcasts.len() - 1])
    }

    /// Find a broadcast by name (case-insensitive), preferring the newest.
    pub fn find_broadcast(&self, name: &str) -> Option<&BroadcastDescriptor> {
        let name = name.trim();
        self.broadcasts
            .iter()
            .rev()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Take a broadcast off air. Stopping twice keeps the first stop time.
    pub fn stop_broadcast(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<&BroadcastDescriptor, ValidationError> {
        let trimmed = name.trim();
        let descriptor = self
            .broadcasts
            .iter_mut()
            .rev()
            .find(|b| b.name.eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ValidationError::UnknownBroadcast(trimmed.to_string()))?;
        descriptor.stop(now);
        info!(id = descriptor.id, name = %descriptor.name, "broadcast stopped");
        Ok(&*descriptor)
    }

    /// Broadcasts on air or scheduled at `now`.
    pub fn live_broadcasts(&self, now: DateTime<Utc>) -> Vec<&BroadcastDescriptor> {
        self.broadcasts.iter().filter(|b| b.is_live(now)).collect()
    }

    /// Drop ended and stopped broadcasts. Returns how many were removed.
    pub fn prune_ended(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.broadcasts.len();
        self.broadcasts.retain(|b| b.is_live(now));
        before - self.broadcasts.len()
    }
}

impl Default for Station {
    fn default() -> Self {
        Self::new()
    }
}
