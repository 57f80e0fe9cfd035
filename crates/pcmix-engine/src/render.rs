//! Callback-side rendering and playback counters

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::limiter::Limiter;
use crate::mixer::MixerShared;

/// Frames staged per pass when the device is not two channels wide
const SCRATCH_FRAMES: usize = 4096;

// ═══════════════════════════════════════════════════════════════════════════════
// STATS
// ═══════════════════════════════════════════════════════════════════════════════

/// Counters written by the render callback, read lock-free by producers
#[derive(Debug, Default)]
pub(crate) struct MixStats {
    playing: AtomicUsize,
    frames_played: AtomicU64,
    /// f64 seconds stored as bits
    time_played: AtomicU64,
}

impl MixStats {
    fn record(&self, playing: usize, frames: usize, sample_rate: u32) {
        self.playing.store(playing, Ordering::Relaxed);
        self.frames_played.fetch_add(frames as u64, Ordering::Relaxed);

        let seconds = frames as f64 / sample_rate as f64;
        let _ = self
            .time_played
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + seconds).to_bits())
            });
    }

    pub(crate) fn playing(&self) -> usize {
        self.playing.load(Ordering::Relaxed)
    }

    pub(crate) fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    pub(crate) fn time_played(&self) -> f64 {
        f64::from_bits(self.time_played.load(Ordering::Relaxed))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDERER
// ═══════════════════════════════════════════════════════════════════════════════

/// Fills output buffers from the mixer's voices
///
/// One renderer drives one output stream: it owns the limiter state, which
/// carries across calls. Obtained from [`Mixer::renderer`](crate::Mixer::renderer).
pub struct MixRenderer {
    shared: Arc<MixerShared>,
    limiter: Limiter,
    sample_rate: u32,
    mix_step: usize,
    /// Stereo staging for devices that are not two channels wide, never
    /// resized after construction
    scratch: Vec<f32>,
}

impl MixRenderer {
    pub(crate) fn new(shared: Arc<MixerShared>, sample_rate: u32, mix_step: usize) -> Self {
        // Whole mix steps, so staged passes keep the step grid
        let piece = if mix_step >= SCRATCH_FRAMES {
            SCRATCH_FRAMES
        } else {
            SCRATCH_FRAMES / mix_step * mix_step
        };

        Self {
            shared,
            limiter: Limiter::new(),
            sample_rate,
            mix_step,
            scratch: vec![0.0; piece * 2],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current limiter gain
    pub fn limiter_gain(&self) -> f32 {
        self.limiter.gain()
    }

    /// Fill `out`, an interleaved buffer `channels` wide
    ///
    /// Mono outputs receive the average of left and right; channels beyond the
    /// second are silent.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        match channels {
            0 => {}
            2 => self.render_stereo(out),
            _ => {
                let frames = out.len() / channels;
                let piece = self.scratch.len() / 2;
                let mut scratch = std::mem::take(&mut self.scratch);

                for dst in out[..frames * channels].chunks_mut(piece * channels) {
                    let staged = &mut scratch[..dst.len() / channels * 2];
                    self.render_stereo(staged);

                    for (dst, src) in dst.chunks_exact_mut(channels).zip(staged.chunks_exact(2)) {
                        if channels == 1 {
                            dst[0] = (src[0] + src[1]) * 0.5;
                        } else {
                            dst[0] = src[0];
                            dst[1] = src[1];
                            dst[2..].fill(0.0);
                        }
                    }
                }
                out[frames * channels..].fill(0.0);

                self.scratch = scratch;
            }
        }
    }

    /// Fill an interleaved stereo buffer
    pub fn render_stereo(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / 2;
        if frames == 0 {
            return;
        }
        let out = &mut out[..frames * 2];

        let playing = self.shared.mix(out, self.mix_step, self.sample_rate);

        // Outside the lock
        self.limiter.process(out);
        self.shared.stats.record(playing, frames, self.sample_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_accumulate() {
        let stats = MixStats::default();
        stats.record(3, 24_000, 48_000);
        stats.record(1, 48_000, 48_000);

        assert_eq!(stats.playing(), 1);
        assert_eq!(stats.frames_played(), 72_000);
        assert!((stats.time_played() - 1.5).abs() < 1e-12);
    }
}
