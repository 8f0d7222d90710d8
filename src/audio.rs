//! Payload decoding helpers.
//!
//! Inbound chunks carry either raw 16kHz mono PCM or PCM wrapped in a WAV
//! container. The speaker path needs samples, so it decodes here; the
//! transcription providers forward payload bytes untouched.

use crate::defaults;
use crate::error::{Result, VoxbridgeError};
use std::io::Cursor;

/// Decodes a chunk payload into 16-bit PCM samples.
///
/// WAV containers are recognized by their RIFF header; anything else is
/// treated as raw little-endian 16-bit PCM.
pub fn decode_samples(payload: &[u8]) -> Result<Vec<i16>> {
    if payload.starts_with(b"RIFF") {
        decode_wav(payload)
    } else {
        Ok(decode_raw_pcm(payload))
    }
}

fn decode_wav(payload: &[u8]) -> Result<Vec<i16>> {
    let reader =
        hound::WavReader::new(Cursor::new(payload)).map_err(|e| VoxbridgeError::AudioDecode {
            message: format!("invalid WAV container: {}", e),
        })?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(VoxbridgeError::AudioDecode {
            message: format!(
                "unsupported WAV format: {:?} {}-bit",
                spec.sample_format, spec.bits_per_sample
            ),
        });
    }

    reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<i16>, _>>()
        .map_err(|e| VoxbridgeError::AudioDecode {
            message: format!("WAV sample read failed: {}", e),
        })
}

fn decode_raw_pcm(payload: &[u8]) -> Vec<i16> {
    // A trailing odd byte is dropped; transports frame on sample boundaries.
    payload
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Duration of a sample buffer in milliseconds at the pipeline sample rate.
pub fn duration_ms(sample_count: usize) -> u64 {
    (sample_count as u64 * 1000) / defaults::SAMPLE_RATE as u64
}
