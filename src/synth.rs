//! Speech synthesis hand-off: the synthesizer interface and background rendering.
//!
//! Synthesizers emit raw 8-bit unsigned mono PCM at 22050 Hz. Rendering the
//! radio effect is slow relative to interactive use, so it runs on its own
//! worker thread and reports back over a channel.

use crate::error::SynthesisError;
use crate::radio_fx::{RadioFilter, RenderedAudio, ReverbIntensity};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use tracing::{info, warn};

/// Voice parameters passed through to the synthesizer (0–255 scales).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub speed: u8,
    pub pitch: u8,
    pub throat: u8,
    pub mouth: u8,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        VoiceSettings {
            speed: 72,
            pitch: 64,
            throat: 128,
            mouth: 128,
        }
    }
}

/// Produces raw 8-bit unsigned PCM mono at 22050 Hz for a piece of text.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError>;
}

/// Reads a pre-synthesized raw buffer from disk, ignoring text and voice.
#[derive(Debug, Clone)]
pub struct RawPcmFile {
    path: PathBuf,
}

impl RawPcmFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RawPcmFile { path: path.into() }
    }
}

impl SpeechSynthesizer for RawPcmFile {
    fn synthesize(&self, _text: &str, _voice: &VoiceSettings) -> Result<Vec<u8>, SynthesisError> {
        std::fs::read(&self.path).map_err(|e| {
            SynthesisError::Synthesizer(format!("Cannot read '{}': {}", self.path.display(), e))
        })
    }
}

/// Synthesize `text` and render it through the radio filter on the calling thread.
pub fn synthesize_and_render(
    synth: &dyn SpeechSynthesizer,
    filter: &RadioFilter,
    text: &str,
    voice: &VoiceSettings,
    reverb: ReverbIntensity,
    seed: Option<u64>,
) -> Result<RenderedAudio, SynthesisError> {
    let raw = synth.synthesize(text, voice)?;
    let result = match seed {
        Some(seed) => filter.render_seeded(&raw, reverb, seed),
        None => filter.render(&raw, reverb),
    };
    match &result {
        Ok(rendered) => info!(
            chars = text.len(),
            secs = rendered.duration.as_secs_f64(),
            reverb = %reverb,
            "speech rendered"
        ),
        Err(e) => warn!(error = %e, "speech render failed"),
    }
    result
}

/// A render running on the `fx-render` worker thread.
pub struct PendingRender {
    rx: mpsc::Receiver<Result<RenderedAudio, SynthesisError>>,
}

impl PendingRender {
    /// Block until the render completes.
    pub fn wait(self) -> Result<RenderedAudio, SynthesisError> {
        self.rx.recv().unwrap_or(Err(SynthesisError::WorkerLost))
    }

    /// Non-blocking check. `None` while still rendering.
    pub fn try_take(&self) -> Option<Result<RenderedAudio, SynthesisError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(SynthesisError::WorkerLost)),
        }
    }
}

/// Render raw samples on a dedicated worker thread.
pub fn render_in_background(
    filter: Arc<RadioFilter>,
    raw: Vec<u8>,
    reverb: ReverbIntensity,
    seed: Option<u64>,
) -> Result<PendingRender, SynthesisError> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("fx-render".into())
        .spawn(move || {
            let result = match seed {
                Some(seed) => filter.render_seeded(&raw, reverb, seed),
                None => filter.render(&raw, reverb),
            };
            let _ = tx.send(result);
        })
        .map_err(|e| SynthesisError::Synthesizer(format!("cannot spawn render worker: {}", e)))?;
    Ok(PendingRender { rx })
}
