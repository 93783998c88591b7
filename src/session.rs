//! Per-listener playback of a broadcast.
//!
//! A session re-derives the broadcast position from its clock whenever it
//! needs to pick an item (tune-in, item end, retry), then keeps exactly one
//! item player running. It never drifts from the schedule for long: every
//! transition restarts from the wall-clock position.

use crate::broadcast::BroadcastDescriptor;
use crate::config::StationConfig;
use crate::player::{ItemPlayer, PlayerBackend};
use crate::scheduler::{Position, resolve_position};
use crate::timeline::{ItemContent, TimelineItem};
use chrono::{DateTime, TimeDelta, Utc};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of "now" for a session.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub progress_tick: Duration,
    pub retry_backoff: Duration,
    pub max_consecutive_failures: u32,
}

impl From<&StationConfig> for SessionConfig {
    fn from(config: &StationConfig) -> Self {
        SessionConfig {
            progress_tick: config.progress_tick(),
            retry_backoff: config.retry_backoff(),
            max_consecutive_failures: config.max_consecutive_failures.max(1),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig::from(&StationConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Non-looping broadcast ran past its last item, or was taken off air.
    BroadcastEnded,
    /// The broadcast has no resolvable item.
    NothingToPlay,
    /// Too many consecutive player failures.
    Unavailable,
    /// The listener stopped or shut the session down.
    TunedOut,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::BroadcastEnded => write!(f, "broadcast ended"),
            StopReason::NothingToPlay => write!(f, "nothing to play"),
            StopReason::Unavailable => write!(f, "broadcast unavailable"),
            StopReason::TunedOut => write!(f, "tuned out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Waiting {
        starts_in: Duration,
    },
    NowPlaying {
        index: usize,
        title: String,
        offset: Duration,
        duration: Duration,
    },
    Progress {
        elapsed: Duration,
        duration: Duration,
        fraction: f32,
    },
    ItemEnded {
        index: usize,
    },
    PlayError {
        index: usize,
        message: String,
        consecutive: u32,
    },
    Stopped {
        reason: StopReason,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    /// Scheduled broadcast that has not reached its anchor yet.
    Waiting { starts_at: DateTime<Utc> },
    Playing {
        index: usize,
        started_at: DateTime<Utc>,
        offset: Duration,
        duration: Duration,
    },
    /// A player failed to start; re-resolve no earlier than `until`.
    Backoff { until: DateTime<Utc> },
    Stopped(StopReason),
}

enum Next {
    Wait(Duration),
    Play {
        index: usize,
        item: TimelineItem,
        offset: Duration,
    },
    Stop(StopReason),
}

pub struct PlaybackSession<B, C = SystemClock> {
    backend: B,
    clock: C,
    config: SessionConfig,
    descriptor: Option<BroadcastDescriptor>,
    state: SessionState,
    player: Option<Box<dyn ItemPlayer>>,
    failures: u32,
}

impl<B, C> PlaybackSession<B, C>
where
    B: PlayerBackend,
    C: Clock,
{
    pub fn new(backend: B, clock: C, config: SessionConfig) -> Self {
        PlaybackSession {
            backend,
            clock,
            config,
            descriptor: None,
            state: SessionState::Idle,
            player: None,
            failures: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn descriptor(&self) -> Option<&BroadcastDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn is_tuned_in(&self) -> bool {
        matches!(
            self.state,
            SessionState::Waiting { .. } | SessionState::Playing { .. } | SessionState::Backoff { .. }
        )
    }

    /// Start following `descriptor`, replacing whatever was playing.
    pub fn tune_in(&mut self, descriptor: BroadcastDescriptor) -> Vec<SessionEvent> {
        self.release_player();
        info!(broadcast = %descriptor.name, id = descriptor.id, "tuning in");
        self.descriptor = Some(descriptor);
        self.failures = 0;
        let mut events = Vec::new();
        self.resolve(&mut events);
        events
    }

    /// Stop listening. No events when not tuned in.
    pub fn stop(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.is_tuned_in() {
            self.finish(StopReason::TunedOut, &mut events);
        }
        events
    }

    /// Periodic poll: item-end detection, retries, waiting and progress.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let now = self.clock.now();
        match self.state.clone() {
            SessionState::Idle | SessionState::Stopped(_) => {}
            SessionState::Waiting { .. } => self.resolve(&mut events),
            SessionState::Backoff { until } => {
                if now >= until {
                    self.resolve(&mut events);
                }
            }
            SessionState::Playing {
                index,
                started_at,
                offset,
                duration,
            } => {
                if self.player.as_ref().is_none_or(|p| p.has_ended()) {
                    debug!(index, "item ended");
                    self.release_player();
                    events.push(SessionEvent::ItemEnded { index });
                    self.resolve(&mut events);
                } else {
                    let played = (now - started_at).to_std().unwrap_or_default();
                    let elapsed = (offset + played).min(duration);
                    let fraction = if duration.is_zero() {
                        0.0
                    } else {
                        (elapsed.as_secs_f64() / duration.as_secs_f64()) as f32
                    };
                    events.push(SessionEvent::Progress {
                        elapsed,
                        duration,
                        fraction,
                    });
                }
            }
        }
        events
    }

    fn resolve(&mut self, events: &mut Vec<SessionEvent>) {
        let now = self.clock.now();
        let Some(descriptor) = self.descriptor.as_ref() else {
            return;
        };

        let next = match resolve_position(descriptor, now) {
            Ok(Position::NotStarted { starts_in }) => Next::Wait(starts_in),
            Ok(Position::Ended { .. } | Position::OffAir { .. }) => {
                Next::Stop(StopReason::BroadcastEnded)
            }
            Ok(Position::Playing {
                index,
                item,
                offset,
                ..
            }) => Next::Play {
                index,
                item: item.clone(),
                offset,
            },
            Err(e) => {
                warn!(broadcast = %descriptor.name, error = %e, "cannot resolve broadcast position");
                Next::Stop(StopReason::NothingToPlay)
            }
        };

        match next {
            Next::Wait(starts_in) => {
                self.state = SessionState::Waiting {
                    starts_at: now + delta(starts_in),
                };
                events.push(SessionEvent::Waiting { starts_in });
            }
            Next::Play {
                index,
                item,
                offset,
            } => self.start_item(index, &item, offset, now, events),
            Next::Stop(reason) => self.finish(reason, events),
        }
    }

    fn start_item(
        &mut self,
        index: usize,
        item: &TimelineItem,
        offset: Duration,
        now: DateTime<Utc>,
        events: &mut Vec<SessionEvent>,
    ) {
        self.release_player();

        let opened = match &item.content {
            ItemContent::ExternalClip(clip) => self
                .backend
                .external_clip(clip)
                .map(|p| (p, clip.trim_start + offset)),
            ItemContent::Speech(speech) => self.backend.speech(speech).map(|p| (p, offset)),
        };
        let started = opened.and_then(|(mut player, seek)| match player.start(seek) {
            Ok(()) => Ok(player),
            Err(e) => {
                player.stop();
                Err(e)
            }
        });

        match started {
            Ok(player) => {
                self.player = Some(player);
                self.failures = 0;
                let title = item.title();
                info!(index, %title, offset_secs = offset.as_secs_f64(), "now playing");
                self.state = SessionState::Playing {
                    index,
                    started_at: now,
                    offset,
                    duration: item.duration,
                };
                events.push(SessionEvent::NowPlaying {
                    index,
                    title,
                    offset,
                    duration: item.duration,
                });
            }
            Err(e) => {
                self.failures += 1;
                warn!(index, error = %e, consecutive = self.failures, "item failed to start");
                events.push(SessionEvent::PlayError {
                    index,
                    message: e.to_string(),
                    consecutive: self.failures,
                });
                if self.failures >= self.config.max_consecutive_failures.max(1) {
                    self.finish(StopReason::Unavailable, events);
                } else {
                    self.state = SessionState::Backoff {
                        until: now + delta(self.config.retry_backoff),
                    };
                }
            }
        }
    }

    fn finish(&mut self, reason: StopReason, events: &mut Vec<SessionEvent>) {
        self.release_player();
        self.descriptor = None;
        info!(%reason, "session stopped");
        self.state = SessionState::Stopped(reason);
        events.push(SessionEvent::Stopped { reason });
    }

    fn release_player(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.stop();
        }
    }
}

impl<B, C> Drop for PlaybackSession<B, C> {
    fn drop(&mut self) {
        if let Some(mut player) = self.player.take() {
            player.stop();
        }
    }
}

fn delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::zero())
}
