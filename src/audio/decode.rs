//! WAV decoding into float channels

use std::io::Cursor;

use super::DecodedAudio;
use crate::{Error, Result};

/// Decode any WAV file `hound` understands into normalized float channels
///
/// Integer samples are scaled by the positive full-scale value of their bit
/// depth (32767 for 16-bit), matching the encoder's quantization.
///
/// # Errors
///
/// Returns error if the bytes are not a readable WAV file
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| Error::Audio(e.to_string()))?;
    let spec = reader.spec();

    tracing::debug!(
        channels = spec.channels,
        sample_rate = spec.sample_rate,
        bits = spec.bits_per_sample,
        format = ?spec.sample_format,
        "decoding wav input"
    );

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(e.to_string()))?,
        hound::SampleFormat::Int => {
            #[allow(clippy::cast_precision_loss)]
            let scale = ((1_i64 << (spec.bits_per_sample.saturating_sub(1))) - 1).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    #[allow(clippy::cast_precision_loss)]
                    s.map(|v| v as f32 / scale)
                })
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(e.to_string()))?
        }
    };

    DecodedAudio::from_interleaved(spec.sample_rate, spec.channels, &interleaved)
}
