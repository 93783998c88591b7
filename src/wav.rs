//! Canonical 16-bit PCM WAV encoding for rendered clips.
//!
//! Output is always the 44-byte RIFF header followed by interleaved
//! little-endian `i16` samples.

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;

/// A decoded WAV stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWav {
    pub channels: u16,
    pub sample_rate: u32,
    /// Interleaved samples.
    pub samples: Vec<i16>,
}

impl DecodedWav {
    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}

/// Convert a float sample to 16-bit PCM. Clamps to [-1, 1], then scales
/// negative values by 32768 and non-negative values by 32767, truncating.
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode interleaved float samples as a WAV byte stream.
pub fn encode_wav(samples: &[f32], channels: u16, sample_rate: u32) -> Result<Vec<u8>, String> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| format!("Cannot write WAV header: {}", e))?;
        for &s in samples {
            writer
                .write_sample(to_pcm16(s))
                .map_err(|e| format!("Cannot write WAV samples: {}", e))?;
        }
        writer
            .finalize()
            .map_err(|e| format!("Cannot finalize WAV: {}", e))?;
    }
    Ok(cursor.into_inner())
}

/// Decode a 16-bit PCM WAV byte stream.
pub fn decode_wav(bytes: &[u8]) -> Result<DecodedWav, String> {
    let reader =
        WavReader::new(Cursor::new(bytes)).map_err(|e| format!("Cannot read WAV: {}", e))?;
    let spec = reader.spec();
    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(format!(
            "Unsupported WAV format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        ));
    }
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("Corrupt WAV data: {}", e))?;
    Ok(DecodedWav {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([bytes[at], bytes[at + 1]])
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
    }

    #[test]
    fn header_layout_is_canonical() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let bytes = encode_wav(&samples, 1, 22050).unwrap();

        assert_eq!(bytes.len(), 44 + samples.len() * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32_at(&bytes, 4), bytes.len() as u32 - 8);
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[12..16], b"fmt ");
        assert_eq!(u32_at(&bytes, 16), 16);
        assert_eq!(u16_at(&bytes, 20), 1);
        assert_eq!(u16_at(&bytes, 22), 1);
        assert_eq!(u32_at(&bytes, 24), 22050);
        assert_eq!(u32_at(&bytes, 28), 22050 * 2);
        assert_eq!(u16_at(&bytes, 32), 2);
        assert_eq!(u16_at(&bytes, 34), 16);
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(u32_at(&bytes, 40), (samples.len() * 2) as u32);
    }

    #[test]
    fn stereo_header_fields() {
        let bytes = encode_wav(&[0.1, -0.1, 0.2, -0.2], 2, 44100).unwrap();
        assert_eq!(u16_at(&bytes, 22), 2);
        assert_eq!(u32_at(&bytes, 28), 44100 * 2 * 2);
        assert_eq!(u16_at(&bytes, 32), 4);
    }

    #[test]
    fn pcm16_scaling_is_asymmetric() {
        assert_eq!(to_pcm16(1.0), 32767);
        assert_eq!(to_pcm16(-1.0), -32768);
        assert_eq!(to_pcm16(2.5), 32767);
        assert_eq!(to_pcm16(-3.0), -32768);
        assert_eq!(to_pcm16(0.0), 0);
        assert_eq!(to_pcm16(0.5), 16383);
        assert_eq!(to_pcm16(-0.5), -16384);
    }

    #[test]
    fn samples_written_little_endian() {
        let bytes = encode_wav(&[1.0, -1.0], 1, 8000).unwrap();
        assert_eq!(&bytes[44..48], &[0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn decode_recovers_header_and_samples() {
        let samples: Vec<f32> = (0..100).map(|i| (i as f32 / 50.0) - 1.0).collect();
        let bytes = encode_wav(&samples, 1, 22050).unwrap();
        let decoded = decode_wav(&bytes).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.frames(), samples.len());
        let expected: Vec<i16> = samples.iter().map(|&s| to_pcm16(s)).collect();
        assert_eq!(decoded.samples, expected);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_wav(b"not a wav file").is_err());
    }
}
