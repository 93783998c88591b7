use crate::clip_source::ClipLocator;
use crate::error::PlaybackError;
use crate::fade::{FadeEnvelope, FadeSource};
use crate::timeline::{ExternalClip, SpeechClip};
use crate::wav::{self, DecodedWav};
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// One playable item bound to the audio output.
pub trait ItemPlayer {
    /// Begin playback `seek` into the underlying media.
    fn start(&mut self, seek: Duration) -> Result<(), PlaybackError>;
    /// Stop playback and release the output.
    fn stop(&mut self);
    /// True once playback has run out on its own.
    fn has_ended(&self) -> bool;
}

/// Opens the right kind of player for each item variant.
pub trait PlayerBackend {
    fn external_clip(&mut self, clip: &ExternalClip) -> Result<Box<dyn ItemPlayer>, PlaybackError>;
    fn speech(&mut self, speech: &SpeechClip) -> Result<Box<dyn ItemPlayer>, PlaybackError>;
}

// ── rodio backend ───────────────────────────────────────────────────────────

/// Runtime audio backend wrapping rodio. Not `Send`: create it on the thread
/// that plays audio.
pub struct RodioBackend {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    locator: Box<dyn ClipLocator>,
    volume: f32,
}

impl RodioBackend {
    /// Open the default audio output.
    pub fn new(locator: Box<dyn ClipLocator>, volume: f32) -> Result<Self, PlaybackError> {
        let (stream, handle) = OutputStream::try_default().map_err(|e| {
            PlaybackError::OutputUnavailable(format!("Failed to open audio output: {}", e))
        })?;
        Ok(RodioBackend {
            _stream: stream,
            stream_handle: handle,
            locator,
            volume: volume.clamp(0.0, 1.0),
        })
    }
}

impl PlayerBackend for RodioBackend {
    fn external_clip(&mut self, clip: &ExternalClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
        let path = self
            .locator
            .locate(&clip.reference)
            .ok_or_else(|| PlaybackError::ClipUnavailable(clip.reference.clone()))?;
        Ok(Box::new(SinkPlayer {
            handle: self.stream_handle.clone(),
            volume: self.volume,
            media: Media::Clip {
                path,
                clip: clip.clone(),
            },
            sink: None,
        }))
    }

    fn speech(&mut self, speech: &SpeechClip) -> Result<Box<dyn ItemPlayer>, PlaybackError> {
        let decoded = wav::decode_wav(&speech.wav).map_err(PlaybackError::Decode)?;
        Ok(Box::new(SinkPlayer {
            handle: self.stream_handle.clone(),
            volume: self.volume,
            media: Media::Speech(decoded),
            sink: None,
        }))
    }
}

enum Media {
    Clip { path: PathBuf, clip: ExternalClip },
    Speech(DecodedWav),
}

/// Plays one item on its own rodio sink.
struct SinkPlayer {
    handle: OutputStreamHandle,
    volume: f32,
    media: Media,
    sink: Option<Sink>,
}

impl ItemPlayer for SinkPlayer {
    fn start(&mut self, seek: Duration) -> Result<(), PlaybackError> {
        self.stop();
        let sink = Sink::try_new(&self.handle).map_err(|e| {
            PlaybackError::OutputUnavailable(format!("Failed to create audio sink: {}", e))
        })?;
        sink.set_volume(self.volume);

        match &self.media {
            Media::Clip { path, clip } => {
                let file = File::open(path)
                    .map_err(|e| PlaybackError::Decode(format!("Cannot open '{}': {}", path.display(), e)))?;
                let source = Decoder::new(BufReader::new(file)).map_err(|e| {
                    PlaybackError::Decode(format!("Cannot decode '{}': {}", path.display(), e))
                })?;
                // Play from the seek point up to the trim end, with the
                // envelope aligned to the item start.
                let envelope = FadeEnvelope::for_clip(clip);
                let item_pos = seek.saturating_sub(clip.trim_start);
                let remaining = clip.trim_end.saturating_sub(seek);
                let trimmed = source
                    .convert_samples::<f32>()
                    .skip_duration(seek)
                    .take_duration(remaining);
                sink.append(FadeSource::new(trimmed, envelope, item_pos));
            }
            Media::Speech(decoded) => {
                let channels = decoded.channels.max(1);
                let frame = (seek.as_secs_f64() * decoded.sample_rate as f64).round() as usize;
                let skip = (frame * channels as usize).min(decoded.samples.len());
                sink.append(SamplesBuffer::new(
                    channels,
                    decoded.sample_rate,
                    decoded.samples[skip..].to_vec(),
                ));
            }
        }

        sink.play();
        debug!(seek_secs = seek.as_secs_f64(), "item player started");
        self.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn has_ended(&self) -> bool {
        self.sink.as_ref().is_none_or(|s| s.empty())
    }
}

impl Drop for SinkPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}
