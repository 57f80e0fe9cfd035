//! Output soft limiter
//!
//! Runs over the finished interleaved buffer. Every sample is scaled by the
//! running gain; a result above unity knocks the gain down by
//! [`LIMITER_ATTACK`], otherwise the gain creeps back toward 1.0 by
//! [`LIMITER_RECOVERY`]. The gain is never reset between callbacks.

/// Gain multiplier applied per overloaded sample
pub const LIMITER_ATTACK: f32 = 0.96;

/// Gain recovery per sample
pub const LIMITER_RECOVERY: f32 = 0.5 / 65536.0;

#[derive(Debug, Clone, Copy)]
pub struct Limiter {
    gain: f32,
}

impl Default for Limiter {
    fn default() -> Self {
        Self { gain: 1.0 }
    }
}

impl Limiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gain in `(0, 1]`
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Limit `buffer` in place
    #[inline]
    pub fn process(&mut self, buffer: &mut [f32]) {
        let mut gain = self.gain;

        for sample in buffer.iter_mut() {
            let v = *sample * gain;
            *sample = v;
            if v.abs() > 1.0 {
                gain *= LIMITER_ATTACK;
            } else if gain < 1.0 {
                gain = (gain + LIMITER_RECOVERY).min(1.0);
            }
        }

        self.gain = gain;
    }
}
