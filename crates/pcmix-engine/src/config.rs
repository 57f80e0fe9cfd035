//! Mixer configuration

use pcmix_audio::AudioConfig;

/// Default number of frames mixed per voice pass
pub const DEFAULT_MIX_STEP: usize = 256;

/// Mixer configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixerConfig {
    /// Output stream format; its sample rate is also the mixing rate
    pub output: AudioConfig,
    /// Frames mixed per voice pass. Large device buffers are split into
    /// steps of this size so gain ramps and stop detection stay granular.
    pub mix_step: usize,
    /// Open the playback device lazily on first use
    pub auto_start_device: bool,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            output: AudioConfig::default(),
            mix_step: DEFAULT_MIX_STEP,
            auto_start_device: true,
        }
    }
}

impl MixerConfig {
    /// Configuration that never touches a device; mixing is driven by
    /// calling [`MixRenderer::render`](crate::MixRenderer::render) directly.
    pub fn headless() -> Self {
        Self {
            auto_start_device: false,
            ..Self::default()
        }
    }

    /// Same configuration mixing at a different rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.output.sample_rate = sample_rate;
        self
    }

    pub(crate) fn sample_rate(&self) -> u32 {
        self.output.sample_rate.max(1)
    }

    pub(crate) fn step(&self) -> usize {
        self.mix_step.max(1)
    }
}
