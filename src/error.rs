//! Error taxonomy for signal_cast.
//!
//! Validation errors go back to the author; scheduling and synthesis errors
//! are logged and degrade gracefully; playback errors are retried by the
//! session before they surface to the listener.

use thiserror::Error;

/// Authoring-time rejections. A broadcast is never created from invalid input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("trim start {start}s must be non-negative and before trim end {end}s")]
    TrimRange { start: f64, end: f64 },
    #[error("trim end is required when the clip length is unknown")]
    MissingTrimEnd,
    #[error("trim end {end}s exceeds source length {source_len}s")]
    TrimBeyondSource { end: f64, source_len: f64 },
    #[error("fade {which} of {fade}s must be between 0 and the item duration ({duration}s)")]
    Fade {
        which: &'static str,
        fade: f64,
        duration: f64,
    },
    #[error("speech text is empty")]
    EmptyText,
    #[error("external reference is empty")]
    EmptyReference,
    #[error("'{0}' is not a recognised video URL")]
    BadUrl(String),
    #[error("timeline is empty: add at least one clip or speech item")]
    EmptyTimeline,
    #[error("item duration must be greater than zero")]
    ZeroDuration,
    #[error("index {index} out of range (timeline has {len} items)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("unknown reverb intensity '{0}'. Expected: subtle, medium, heavy")]
    UnknownReverb(String),
    #[error("origin ({latitude}, {longitude}) is not a valid coordinate")]
    BadOrigin { latitude: f64, longitude: f64 },
    #[error("broadcast name is empty")]
    EmptyName,
    #[error("broadcast '{0}' already exists")]
    DuplicateBroadcast(String),
    #[error("broadcast '{0}' not found")]
    UnknownBroadcast(String),
    #[error("'{0}' is not an RFC 3339 timestamp")]
    BadTimestamp(String),
    #[error("unknown setting '{0}'")]
    UnknownSetting(String),
    #[error("invalid value '{value}' for setting '{key}'")]
    BadSetting { key: String, value: String },
}

/// Raised when a position cannot be resolved. Never fatal for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulingError {
    #[error("broadcast timeline is empty")]
    EmptyTimeline,
    #[error("no current item: timeline has zero total duration")]
    NoCurrentItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("synthesizer produced no samples")]
    EmptyInput,
    #[error("synthesizer failed: {0}")]
    Synthesizer(String),
    #[error("failed to encode rendered audio: {0}")]
    Encode(String),
    #[error("render worker exited without a result")]
    WorkerLost,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    OutputUnavailable(String),
    #[error("no playable audio for clip '{0}'")]
    ClipUnavailable(String),
    #[error("cannot decode audio: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("station file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("station file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Crate-level error wrapping every category.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
