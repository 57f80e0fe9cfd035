//! pcmix-engine: Real-time multi-voice PCM mixer
//!
//! A bounded pool of voices plays fully resident sounds into an interleaved
//! stereo buffer from the device callback. Producer threads start, stop and
//! adjust voices through [`Mixer`]; the callback side runs a [`MixRenderer`].
//!
//! # Architecture
//!
//! ```text
//! producer threads                         device callback thread
//! ┌──────────────┐                         ┌───────────────────┐
//! │ Mixer        │──┐                  ┌──│ MixRenderer       │
//! │ - play/stop  │  │  ┌────────────┐  │  │ - zero buffer     │
//! │ - volume/pan │  ├─▶│ MixerState │◀─┤  │ - mix in steps    │
//! │ PcmSound     │  │  │ (one lock) │  │  │ - limiter         │
//! │ - get/set    │──┘  │ pool+sounds│  │  │ - stats           │
//! └──────────────┘     └────────────┘  │  └───────────────────┘
//!                                      └── lock held only while mixing
//! ```
//!
//! Voices hold a non-owning key to their sound. Dropping or releasing a
//! [`PcmSound`] first pushes every voice that still reads it into its stop
//! fade, under the same lock the mix pass takes.

mod config;
mod error;
mod limiter;
mod mixer;
mod params;
mod pool;
mod render;
mod sound;
mod voice;

pub use config::*;
pub use error::*;
pub use limiter::*;
pub use mixer::Mixer;
pub use params::*;
pub use pool::{MAX_VOICES, VoiceHandle};
pub use render::MixRenderer;
pub use sound::{Channels, PcmSound};

pub use pcmix_audio::{AudioConfig, OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// Per-frame gain step used for declick ramps and the stop-fade cutoff
pub const DECLICK_STEP: f32 = 1.0 / 512.0;

/// Multiplicative decay applied per frame while a voice fades out
pub const STOP_DECAY: f32 = 0.997;

/// Additive decrement seeded from the gain sign when a stop fade begins
pub const STOP_TREND: f32 = 1.0 / 10000.0;
