//! Audio container handling
//!
//! Converts decoded float audio into the canonical 16-bit PCM WAV container
//! sent to the STT upstream, and reads arbitrary WAV input back into float
//! channels.

mod decode;
mod wav;

pub use decode::decode;
pub use wav::{AudioContainer, DecodedAudio, HEADER_LEN, MEDIA_TYPE, quantize};
