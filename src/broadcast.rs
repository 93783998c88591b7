use crate::error::ValidationError;
use crate::timeline::{self, Timeline, TimelineItem, duration_serde};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// When a broadcast's timeline is anchored to the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStart {
    /// Went live immediately at this instant.
    Live(DateTime<Utc>),
    /// Goes live at a future instant.
    Scheduled(DateTime<Utc>),
}

impl BroadcastStart {
    /// Instant at which position zero of the timeline plays.
    pub fn anchor(&self) -> DateTime<Utc> {
        match *self {
            BroadcastStart::Live(at) | BroadcastStart::Scheduled(at) => at,
        }
    }
}

/// Where the broadcast is transmitted from (shown on the station map).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    pub latitude: f64,
    pub longitude: f64,
}

impl Origin {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::BadOrigin {
                latitude,
                longitude,
            });
        }
        Ok(Origin {
            latitude,
            longitude,
        })
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin {
            latitude: 28.6139,
            longitude: 77.2090,
        }
    }
}

/// Author-supplied options for going live.
#[derive(Debug, Clone, Default)]
pub struct GoLive {
    pub name: String,
    pub description: String,
    pub is_looping: bool,
    /// Start later instead of now. Ignored when not in the future.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastStatus {
    Scheduled,
    OnAir,
    Ended,
    Stopped,
}

impl fmt::Display for BroadcastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastStatus::Scheduled => write!(f, "scheduled"),
            BroadcastStatus::OnAir => write!(f, "on air"),
            BroadcastStatus::Ended => write!(f, "ended"),
            BroadcastStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// A frozen, time-anchored timeline. Read-only once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastDescriptor {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub start: BroadcastStart,
    pub is_looping: bool,
    timeline: Vec<TimelineItem>,
    #[serde(with = "duration_serde")]
    total_duration: Duration,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

impl BroadcastDescriptor {
    /// Build a descriptor over a snapshot of `items`.
    pub fn new(
        id: u32,
        name: &str,
        start: BroadcastStart,
        is_looping: bool,
        items: Vec<TimelineItem>,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if items.is_empty() {
            return Err(ValidationError::EmptyTimeline);
        }
        let total_duration = timeline::total_duration(&items);
        Ok(BroadcastDescriptor {
            id,
            name: name.to_string(),
            description: String::new(),
            start,
            is_looping,
            timeline: items,
            total_duration,
            origin: Origin::default(),
            stopped_at: None,
        })
    }

    /// Freeze the authoring timeline into a broadcast. Later edits to
    /// `timeline` do not affect the descriptor.
    pub fn go_live(
        id: u32,
        timeline: &Timeline,
        options: GoLive,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let start = match options.scheduled_at {
            Some(at) if at > now => BroadcastStart::Scheduled(at),
            _ => BroadcastStart::Live(now),
        };
        let mut descriptor = Self::new(
            id,
            &options.name,
            start,
            options.is_looping,
            timeline.items().to_vec(),
        )?;
        descriptor.description = options.description.trim().to_string();
        descriptor.origin = options.origin;
        Ok(descriptor)
    }

    pub fn timeline(&self) -> &[TimelineItem] {
        &self.timeline
    }

    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.start.anchor()
    }

    /// Instant a non-looping broadcast runs out. Looping broadcasts never end.
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        if self.is_looping {
            return None;
        }
        TimeDelta::from_std(self.total_duration)
            .ok()
            .and_then(|total| self.anchor().checked_add_signed(total))
    }

    pub fn status(&self, now: DateTime<Utc>) -> BroadcastStatus {
        if self.stopped_at.is_some() {
            return BroadcastStatus::Stopped;
        }
        if now < self.anchor() {
            return BroadcastStatus::Scheduled;
        }
        match self.ends_at() {
            Some(end) if now >= end => BroadcastStatus::Ended,
            _ => BroadcastStatus::OnAir,
        }
    }

    /// Listed to listeners: on air now or scheduled to start.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status(now),
            BroadcastStatus::OnAir | BroadcastStatus::Scheduled
        )
    }

    /// Mark the broadcast stopped by its author.
    pub fn stop(&mut self, now: DateTime<Utc>) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(now);
        }
    }
}
