//! pcmix-audio: Playback device boundary using cpal
//!
//! Opens one output stream with a fixed format and drives a render callback
//! from the device's audio thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ OutputDevice │────▶│ stream thread    │────▶│ cpal Device │
//! │              │     │                  │     │             │
//! │ - open       │     │ - owns Stream    │     │ - callback  │
//! │ - shutdown   │     │ - waits for stop │     │   (render)  │
//! └──────────────┘     └──────────────────┘     └─────────────┘
//! ```

mod device;
mod error;
mod output;

pub use device::*;
pub use error::*;
pub use output::*;

/// Output sample rate the mixer is built around
pub const OUTPUT_SAMPLE_RATE: u32 = 48_000;

/// Output channel count (interleaved stereo)
pub const OUTPUT_CHANNELS: u16 = 2;

/// Output stream configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Fixed device buffer size in frames, `None` lets the backend choose
    pub buffer_frames: Option<u32>,
    /// Output device name, `None` selects the host default
    pub device_name: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: OUTPUT_SAMPLE_RATE,
            channels: OUTPUT_CHANNELS,
            buffer_frames: None,
            device_name: None,
        }
    }
}
