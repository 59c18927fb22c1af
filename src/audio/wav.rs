//! Canonical WAV container encoding

use crate::{Error, Result};

/// Media type of the encoded container
pub const MEDIA_TYPE: &str = "audio/wav";

/// Size of the RIFF/WAVE header preceding the sample data
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FMT_CHUNK_LEN: u32 = 16;

/// RIFF size field excludes the `RIFF` tag and the size field itself
const RIFF_OVERHEAD: u32 = 36;

/// Full-scale value for 16-bit quantization
const FULL_SCALE: f32 = 32767.0;

/// Decoded multi-channel float audio
///
/// Samples are nominally in `[-1.0, 1.0]`; out-of-range values are clamped
/// at encode time.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Create audio from per-channel sample sequences
    #[must_use]
    pub const fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Create single-channel audio
    #[must_use]
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self::new(sample_rate, vec![samples])
    }

    /// Split interleaved frames into channels
    ///
    /// A trailing partial frame is dropped.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAudioFormat` if `channel_count` is zero
    pub fn from_interleaved(sample_rate: u32, channel_count: u16, samples: &[f32]) -> Result<Self> {
        if channel_count == 0 {
            return Err(Error::InvalidAudioFormat(
                "channel count must be positive".to_string(),
            ));
        }

        let count = usize::from(channel_count);
        let mut channels = vec![Vec::with_capacity(samples.len() / count); count];
        for frame in samples.chunks_exact(count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Ok(Self::new(sample_rate, channels))
    }

    /// Number of channels
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples of one channel
    #[must_use]
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// Number of complete frames (length of the shortest channel)
    #[must_use]
    pub fn frames(&self) -> usize {
        self.channels.iter().map(Vec::len).min().unwrap_or(0)
    }
}

/// Quantize a float sample to 16-bit PCM
///
/// Clamps to `[-1.0, 1.0]`, scales by 32767 and truncates toward zero, so
/// -1.0 maps to -32767 and -32768 is never produced. NaN maps to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize(sample: f32) -> i16 {
    // Float-to-int `as` truncates toward zero and sends NaN to 0
    (sample.clamp(-1.0, 1.0) * FULL_SCALE) as i16
}

/// A finished 16-bit PCM WAV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioContainer {
    bytes: Vec<u8>,
}

impl AudioContainer {
    /// Encode decoded audio into a canonical WAV container
    ///
    /// Output is byte-identical for identical input.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAudioFormat` if there are no channels, the sample rate
    /// is zero, or the header fields would overflow
    pub fn encode(audio: &DecodedAudio) -> Result<Self> {
        if audio.channel_count() == 0 {
            return Err(Error::InvalidAudioFormat(
                "channel count must be positive".to_string(),
            ));
        }
        if audio.sample_rate == 0 {
            return Err(Error::InvalidAudioFormat(
                "sample rate must be positive".to_string(),
            ));
        }

        let channels = u16::try_from(audio.channel_count()).map_err(|_| {
            Error::InvalidAudioFormat(format!("too many channels: {}", audio.channel_count()))
        })?;
        let block_align = channels
            .checked_mul(BYTES_PER_SAMPLE)
            .ok_or_else(|| Error::InvalidAudioFormat("block alignment overflows".to_string()))?;
        let byte_rate = audio
            .sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(|| Error::InvalidAudioFormat("byte rate overflows".to_string()))?;

        let frames = audio.frames();
        let data_len = u32::try_from(frames)
            .ok()
            .and_then(|f| f.checked_mul(u32::from(block_align)))
            .filter(|len| len.checked_add(RIFF_OVERHEAD).is_some())
            .ok_or_else(|| Error::InvalidAudioFormat("sample data too large".to_string()))?;

        let mut bytes =
            Vec::with_capacity(HEADER_LEN + frames * usize::from(block_align));

        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(RIFF_OVERHEAD + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");

        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
        bytes.extend_from_slice(&PCM_FORMAT.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&audio.sample_rate.to_le_bytes());
        bytes.extend_from_slice(&byte_rate.to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());

        for frame in 0..frames {
            for channel in &audio.channels {
                bytes.extend_from_slice(&quantize(channel[frame]).to_le_bytes());
            }
        }

        tracing::debug!(
            channels,
            sample_rate = audio.sample_rate,
            frames,
            bytes = bytes.len(),
            "encoded wav container"
        );

        Ok(Self { bytes })
    }

    /// Raw container bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the container, returning its bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Channel count declared in the header
    #[must_use]
    pub fn channels(&self) -> u16 {
        self.read_u16(22)
    }

    /// Sample rate declared in the header
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.read_u32(24)
    }

    /// Sample data length declared in the header
    #[must_use]
    pub fn data_len(&self) -> u32 {
        self.read_u32(40)
    }

    fn read_u16(&self, offset: usize) -> u16 {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&self.bytes[offset..offset + 2]);
        u16::from_le_bytes(buf)
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }
}

impl AsRef<[u8]> for AudioContainer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<AudioContainer> for Vec<u8> {
    fn from(container: AudioContainer) -> Self {
        container.bytes
    }
}
