//! pcmix-file: Audio file decoding
//!
//! Turns a file on disk into fully resident, interleaved f32 PCM:
//! - WAV (via hound) - 8/16/24/32-bit int, 32-bit float
//! - FLAC (via symphonia) - compressed, lossless
//! - MP3 (via symphonia) - compressed, lossy
//!
//! Any other extension is rejected before the file is opened.

mod decode;
mod error;

pub use decode::*;
pub use error::*;
