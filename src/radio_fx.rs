//! Radio effect chain for synthesized speech.
//!
//! Raw 8-bit unsigned mono PCM goes through a band-limiting filter pair, a
//! bit-crushing waveshaper and a synthetic convolution reverb, then is encoded
//! as a 16-bit WAV clip ready for the timeline.

use crate::error::SynthesisError;
use crate::wav;
use rustfft::{FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Sample rate of the raw synthesizer output.
pub const SPEECH_SAMPLE_RATE: u32 = 22050;

const HIGHPASS_HZ: f64 = 300.0;
const LOWPASS_HZ: f64 = 3000.0;
/// Biquad resonance, in dB.
const FILTER_Q_DB: f64 = 1.0;
const CRUSH_BITS: i32 = 8;

// Convolver impulse normalization constants.
const GAIN_CALIBRATION: f32 = 0.00125;
const GAIN_CALIBRATION_SAMPLE_RATE: f32 = 44100.0;
const MIN_POWER: f32 = 0.000125;

/// Coarse reverb control: impulse length, decay and dry/wet mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverbIntensity {
    Subtle,
    #[default]
    Medium,
    Heavy,
}

impl fmt::Display for ReverbIntensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReverbIntensity::Subtle => write!(f, "subtle"),
            ReverbIntensity::Medium => write!(f, "medium"),
            ReverbIntensity::Heavy => write!(f, "heavy"),
        }
    }
}

impl ReverbIntensity {
    /// Parse an intensity from a string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Result<Self, crate::error::ValidationError> {
        match s.trim().to_lowercase().as_str() {
            "subtle" => Ok(ReverbIntensity::Subtle),
            "medium" => Ok(ReverbIntensity::Medium),
            "heavy" => Ok(ReverbIntensity::Heavy),
            _ => Err(crate::error::ValidationError::UnknownReverb(s.to_string())),
        }
    }

    /// Impulse response length in seconds.
    pub fn impulse_secs(&self) -> f32 {
        match self {
            ReverbIntensity::Subtle => 0.5,
            ReverbIntensity::Medium => 1.0,
            ReverbIntensity::Heavy => 2.0,
        }
    }

    /// Exponent of the impulse envelope.
    pub fn decay(&self) -> i32 {
        match self {
            ReverbIntensity::Subtle => 2,
            ReverbIntensity::Medium => 3,
            ReverbIntensity::Heavy => 4,
        }
    }

    /// Share of the convolved signal in the final mix.
    pub fn wet_ratio(&self) -> f32 {
        match self {
            ReverbIntensity::Subtle => 0.1,
            ReverbIntensity::Medium => 0.2,
            ReverbIntensity::Heavy => 0.4,
        }
    }
}

/// Output of one render.
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    /// Mono float samples, one per input sample.
    pub pcm: Vec<f32>,
    /// The same samples as a canonical WAV byte stream.
    pub wav: Vec<u8>,
    pub duration: Duration,
    pub sample_rate: u32,
    pub channels: u16,
}

// ── Filters ─────────────────────────────────────────────────────────────────

/// Second-order IIR section (RBJ cookbook coefficients, direct form I).
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn lowpass(sample_rate: u32, freq: f64, q_db: f64) -> Self {
        let (cos, alpha) = Self::prewarp(sample_rate, freq, q_db);
        Self::normalized(
            (1.0 - cos) / 2.0,
            1.0 - cos,
            (1.0 - cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    fn highpass(sample_rate: u32, freq: f64, q_db: f64) -> Self {
        let (cos, alpha) = Self::prewarp(sample_rate, freq, q_db);
        Self::normalized(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    fn prewarp(sample_rate: u32, freq: f64, q_db: f64) -> (f64, f64) {
        let w0 = 2.0 * std::f64::consts::PI * freq / sample_rate as f64;
        let q = 10f64.powf(q_db / 20.0);
        (w0.cos(), w0.sin() / (2.0 * q))
    }

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Biquad {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn process(&mut self, x: f32) -> f32 {
        let x = x as f64;
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }
}

/// Precomputed bit-crusher transfer curve, one entry per quantization step
/// over [-1, 1].
#[derive(Debug, Clone)]
struct CrushCurve {
    step: f32,
    table: Vec<f32>,
}

impl CrushCurve {
    fn new(bits: i32) -> Self {
        let step = 0.5f32.powi(bits);
        let half = 1i32 << bits;
        let table = (-half..=half).map(|i| i as f32 * step).collect();
        CrushCurve { step, table }
    }

    /// Map one sample to the nearest step: `round(x / q) * q` after clamping.
    fn apply(&self, x: f32) -> f32 {
        let half = (self.table.len() / 2) as i32;
        let level = (x.clamp(-1.0, 1.0) / self.step).round() as i32;
        self.table[(level + half).clamp(0, 2 * half) as usize]
    }
}

// ── Reverb ──────────────────────────────────────────────────────────────────

/// Generate a two-channel noise impulse whose envelope is `((len - i) / len)^decay`.
pub fn impulse_response(
    intensity: ReverbIntensity,
    sample_rate: u32,
    rng: &mut fastrand::Rng,
) -> [Vec<f32>; 2] {
    let len = (sample_rate as f32 * intensity.impulse_secs()) as usize;
    let decay = intensity.decay();
    let mut left = Vec::with_capacity(len);
    let mut right = Vec::with_capacity(len);
    for i in 0..len {
        let envelope = ((len - i) as f32 / len as f32).powi(decay);
        left.push((rng.f32() * 2.0 - 1.0) * envelope);
        right.push((rng.f32() * 2.0 - 1.0) * envelope);
    }
    [left, right]
}

/// Scale that brings an impulse to the calibrated convolver power.
fn normalization_scale(channels: &[&[f32]], sample_rate: u32) -> f32 {
    let count: usize = channels.iter().map(|c| c.len()).sum();
    if count == 0 {
        return 1.0;
    }
    let sum_sq: f64 = channels
        .iter()
        .flat_map(|c| c.iter())
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    let mut power = (sum_sq / count as f64).sqrt() as f32;
    if !power.is_finite() || power < MIN_POWER {
        power = MIN_POWER;
    }
    (1.0 / power) * GAIN_CALIBRATION * (GAIN_CALIBRATION_SAMPLE_RATE / sample_rate as f32)
}

/// Linear convolution truncated to the signal length, computed by FFT.
pub fn convolve(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    let n = signal.len();
    if n == 0 || kernel.is_empty() {
        return vec![0.0; n];
    }
    let size = (n + kernel.len() - 1).next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let padded = |data: &[f32]| -> Vec<Complex<f32>> {
        let mut buf: Vec<Complex<f32>> = data.iter().map(|&s| Complex::new(s, 0.0)).collect();
        buf.resize(size, Complex::new(0.0, 0.0));
        buf
    };
    let mut a = padded(signal);
    let mut b = padded(kernel);
    forward.process(&mut a);
    forward.process(&mut b);
    for (x, y) in a.iter_mut().zip(&b) {
        *x *= *y;
    }
    inverse.process(&mut a);

    let norm = 1.0 / size as f32;
    a.iter().take(n).map(|c| c.re * norm).collect()
}

// ── Pipeline ────────────────────────────────────────────────────────────────

/// The radio effect chain. Immutable after construction, so one instance can
/// serve concurrent renders.
#[derive(Debug, Clone)]
pub struct RadioFilter {
    sample_rate: u32,
    curve: CrushCurve,
}

impl RadioFilter {
    pub fn new() -> Self {
        RadioFilter {
            sample_rate: SPEECH_SAMPLE_RATE,
            curve: CrushCurve::new(CRUSH_BITS),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Render with an unseeded reverb; sample content varies between calls.
    pub fn render(
        &self,
        raw: &[u8],
        intensity: ReverbIntensity,
    ) -> Result<RenderedAudio, SynthesisError> {
        self.render_with(raw, intensity, &mut fastrand::Rng::new())
    }

    /// Render with a seeded reverb; identical inputs give identical output.
    pub fn render_seeded(
        &self,
        raw: &[u8],
        intensity: ReverbIntensity,
        seed: u64,
    ) -> Result<RenderedAudio, SynthesisError> {
        self.render_with(raw, intensity, &mut fastrand::Rng::with_seed(seed))
    }

    fn render_with(
        &self,
        raw: &[u8],
        intensity: ReverbIntensity,
        rng: &mut fastrand::Rng,
    ) -> Result<RenderedAudio, SynthesisError> {
        if raw.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }

        let dry = self.shape(raw);

        let [left, right] = impulse_response(intensity, self.sample_rate, rng);
        let scale = normalization_scale(&[left.as_slice(), right.as_slice()], self.sample_rate);
        // Mono destination: the stereo wet signal is down-mixed as (L + R) / 2.
        let kernel: Vec<f32> = left
            .iter()
            .zip(&right)
            .map(|(l, r)| 0.5 * (l + r) * scale)
            .collect();
        let wet = convolve(&dry, &kernel);

        let wet_ratio = intensity.wet_ratio();
        let pcm: Vec<f32> = dry
            .iter()
            .zip(&wet)
            .map(|(d, w)| d * (1.0 - wet_ratio) + w * wet_ratio)
            .collect();

        let wav = wav::encode_wav(&pcm, 1, self.sample_rate).map_err(SynthesisError::Encode)?;
        let duration = Duration::from_secs_f64(pcm.len() as f64 / self.sample_rate as f64);
        debug!(
            samples = pcm.len(),
            reverb = %intensity,
            impulse_len = kernel.len(),
            "rendered radio clip"
        );

        Ok(RenderedAudio {
            pcm,
            wav,
            duration,
            sample_rate: self.sample_rate,
            channels: 1,
        })
    }

    /// Normalize, band-limit and bit-crush raw samples (the dry signal).
    pub fn shape(&self, raw: &[u8]) -> Vec<f32> {
        let mut highpass = Biquad::highpass(self.sample_rate, HIGHPASS_HZ, FILTER_Q_DB);
        let mut lowpass = Biquad::lowpass(self.sample_rate, LOWPASS_HZ, FILTER_Q_DB);
        raw.iter()
            .map(|&s| (s as f32 - 128.0) / 128.0)
            .map(|x| lowpass.process(highpass.process(x)))
            .map(|x| self.curve.apply(x))
            .collect()
    }
}

impl Default for RadioFilter {
    fn default() -> Self {
        Self::new()
    }
}
