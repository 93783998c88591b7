use crate::timeline::ExternalClip;
use rodio::Source;
use std::time::Duration;

/// Linear fade-in/fade-out gain over an item's playable duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeEnvelope {
    fade_in: f64,
    fade_out: f64,
    duration: f64,
}

impl FadeEnvelope {
    pub fn new(fade_in: Duration, fade_out: Duration, duration: Duration) -> Self {
        FadeEnvelope {
            fade_in: fade_in.as_secs_f64(),
            fade_out: fade_out.as_secs_f64(),
            duration: duration.as_secs_f64(),
        }
    }

    pub fn for_clip(clip: &ExternalClip) -> Self {
        Self::new(clip.fade_in, clip.fade_out, clip.duration())
    }

    /// True when the envelope never changes the signal.
    pub fn is_flat(&self) -> bool {
        self.fade_in <= 0.0 && self.fade_out <= 0.0
    }

    /// Gain (0.0–1.0) at `position` from the start of the item.
    pub fn gain_at(&self, position: Duration) -> f32 {
        self.gain_at_secs(position.as_secs_f64())
    }

    fn gain_at_secs(&self, pos: f64) -> f32 {
        let mut gain = 1.0f64;
        if self.fade_in > 0.0 && pos < self.fade_in {
            gain = pos / self.fade_in;
        }
        if self.fade_out > 0.0 {
            let remaining = self.duration - pos;
            if remaining < self.fade_out {
                gain = gain.min(remaining / self.fade_out);
            }
        }
        gain.clamp(0.0, 1.0) as f32
    }
}

/// A Source wrapper that applies a `FadeEnvelope`.
/// `start` is the item position of the first sample, so a listener joining
/// mid-item hears the envelope where the broadcast is.
pub struct FadeSource<S> {
    inner: S,
    envelope: FadeEnvelope,
    start: f64,
    sample_rate: u32,
    channels: u16,
    frame: u64,
    channel: u16,
    gain: f32,
}

impl<S> FadeSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(source: S, envelope: FadeEnvelope, start: Duration) -> Self {
        let sample_rate = source.sample_rate().max(1);
        let channels = source.channels().max(1);
        FadeSource {
            inner: source,
            envelope,
            start: start.as_secs_f64(),
            sample_rate,
            channels,
            frame: 0,
            channel: 0,
            gain: 1.0,
        }
    }
}

impl<S> Iterator for FadeSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;

        // One gain per frame so channels stay balanced.
        if self.channel == 0 {
            let pos = self.start + self.frame as f64 / self.sample_rate as f64;
            self.gain = self.envelope.gain_at_secs(pos);
        }
        self.channel += 1;
        if self.channel >= self.channels {
            self.channel = 0;
            self.frame += 1;
        }

        Some(sample * self.gain)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<S> Source for FadeSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A test source that produces a fixed sequence of samples.
    struct TestSource {
        samples: Vec<f32>,
        pos: usize,
        sample_rate: u32,
        channels: u16,
    }

    impl TestSource {
        fn constant(value: f32, num_samples: usize, sample_rate: u32, channels: u16) -> Self {
            TestSource {
                samples: vec![value; num_samples],
                pos: 0,
                sample_rate,
                channels,
            }
        }
    }

    impl Iterator for TestSource {
        type Item = f32;
        fn next(&mut self) -> Option<f32> {
            let s = self.samples.get(self.pos).copied();
            self.pos += 1;
            s
        }
    }

    impl Source for TestSource {
        fn current_frame_len(&self) -> Option<usize> {
            Some(self.samples.len().saturating_sub(self.pos))
        }
        fn channels(&self) -> u16 {
            self.channels
        }
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn total_duration(&self) -> Option<Duration> {
            None
        }
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn flat_envelope_is_unity() {
        let env = FadeEnvelope::new(Duration::ZERO, Duration::ZERO, secs(10.0));
        assert!(env.is_flat());
        assert_eq!(env.gain_at(secs(0.0)), 1.0);
        assert_eq!(env.gain_at(secs(9.99)), 1.0);
    }

    #[test]
    fn fade_in_ramps_from_zero() {
        let env = FadeEnvelope::new(secs(2.0), Duration::ZERO, secs(10.0));
        assert_eq!(env.gain_at(secs(0.0)), 0.0);
        assert_eq!(env.gain_at(secs(1.0)), 0.5);
        assert_eq!(env.gain_at(secs(2.0)), 1.0);
        assert_eq!(env.gain_at(secs(5.0)), 1.0);
    }

    #[test]
    fn fade_out_ramps_to_zero() {
        let env = FadeEnvelope::new(Duration::ZERO, secs(4.0), secs(10.0));
        assert_eq!(env.gain_at(secs(5.0)), 1.0);
        assert_eq!(env.gain_at(secs(8.0)), 0.5);
        assert_eq!(env.gain_at(secs(10.0)), 0.0);
        assert_eq!(env.gain_at(secs(12.0)), 0.0);
    }

    #[test]
    fn overlapping_fades_take_lower_gain() {
        let env = FadeEnvelope::new(secs(4.0), secs(4.0), secs(4.0));
        assert_eq!(env.gain_at(secs(1.0)), 0.25);
        assert_eq!(env.gain_at(secs(3.0)), 0.25);
    }

    #[test]
    fn envelope_from_clip() {
        let clip = ExternalClip::new("ref", "Song", 30.0, 90.0, None)
            .unwrap()
            .with_fades(3.0, 6.0)
            .unwrap();
        let env = FadeEnvelope::for_clip(&clip);
        assert_eq!(env.gain_at(secs(1.5)), 0.5);
        assert_eq!(env.gain_at(secs(57.0)), 0.5);
    }

    #[test]
    fn source_applies_envelope_per_frame() {
        // 10 Hz stereo: 10 frames = 1 second.
        let source = TestSource::constant(1.0, 20, 10, 2);
        let env = FadeEnvelope::new(secs(1.0), Duration::ZERO, secs(5.0));
        let out: Vec<f32> = FadeSource::new(source, env, Duration::ZERO).collect();
        assert_eq!(out.len(), 20);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.0);
        assert!((out[10] - 0.5).abs() < 1e-6);
        assert_eq!(out[10], out[11]);
    }

    #[test]
    fn source_honours_start_offset() {
        // Joining 4.5 s into a 5 s item with a 1 s fade-out.
        let source = TestSource::constant(1.0, 5, 10, 1);
        let env = FadeEnvelope::new(Duration::ZERO, secs(1.0), secs(5.0));
        let out: Vec<f32> = FadeSource::new(source, env, secs(4.5)).collect();
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out[4] < out[0]);
    }
}
