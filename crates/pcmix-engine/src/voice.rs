//! Voice state machine
//!
//! A voice is one playback instance of a sound. Per mix step it takes either
//! the steady path (gains settled, no boundary ahead, plain interpolation) or
//! the per-frame path, which handles the start countdown, declick ramps,
//! loop wrap, end-of-clip and the stop fade.

use crate::params::PlayParams;
use crate::pool::MAX_VOICES;
use crate::sound::{Channels, SoundBuffer, SoundKey};
use crate::{DECLICK_STEP, STOP_DECAY, STOP_TREND};

/// Per-step values shared by every voice in a mix pass
#[derive(Debug, Clone, Copy)]
pub(crate) struct MixParams {
    pub master_volume: f32,
    /// Seconds per output frame
    pub inv_rate: f64,
    /// Seconds covered by the current step
    pub step_time: f64,
}

impl MixParams {
    pub(crate) fn new(master_volume: f32, sample_rate: u32, frames: usize) -> Self {
        let inv_rate = 1.0 / sample_rate as f64;
        Self {
            master_volume,
            inv_rate,
            step_time: frames as f64 * inv_rate,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Voice {
    /// Sound being played, `None` when the voice is free or fading out
    pub sound: Option<SoundKey>,
    /// Read position in source frames
    pub pos: f64,
    pub start_pos: f64,
    pub stop_pos: f64,
    pub pitch: f32,
    pub volume: f32,
    pub pan: f32,
    gain_l: f32,
    gain_r: f32,
    trend_l: f32,
    trend_r: f32,
    time_to_start: f64,
    channels: Channels,
    /// Upper handle bits; bumped on allocation and on stop
    pub version: u32,
    looping: bool,
    stopping: bool,
    waiting: bool,
}

#[inline(always)]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline(always)]
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Move `gain` one declick step toward `target`
#[inline]
fn ramp_toward(gain: f32, target: f32) -> f32 {
    let delta = target - gain;
    if delta.abs() <= DECLICK_STEP {
        target
    } else if delta > 0.0 {
        gain + DECLICK_STEP
    } else {
        gain - DECLICK_STEP
    }
}

/// One frame of stop-fade decay; snaps to zero below the declick step
#[inline]
fn fade_out(gain: f32, trend: f32) -> f32 {
    if gain.abs() <= DECLICK_STEP {
        0.0
    } else {
        (gain + trend) * STOP_DECAY
    }
}

/// Target per-channel gains. Positive pan attenuates the right channel.
#[inline]
fn wish_gains(master: f32, volume: f32, pan: f32) -> (f32, f32) {
    let base = master * volume;
    (base * (1.0 + pan).min(1.0), base * (1.0 - pan).min(1.0))
}

/// Source position (in frames, truncated) for a time in seconds
#[inline]
fn frames_at(seconds: f32, rate: f64) -> f64 {
    (seconds as f64 * rate) as i64 as f64
}

impl Voice {
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.sound.is_none() && !self.stopping
    }

    #[inline]
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping
    }

    #[inline]
    pub(crate) fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Configure a freshly allocated voice. `params` must already be clamped
    /// and `sound` must hold at least three frames.
    pub(crate) fn start(
        &mut self,
        key: SoundKey,
        sound: &SoundBuffer,
        params: &PlayParams,
        master_volume: f32,
    ) {
        let rate = sound.sample_rate() as f64;
        let last = (sound.frames() - 1) as f64;

        let start_pos = frames_at(params.start, rate).clamp(0.0, last);
        let stop_pos = params
            .end
            .map_or(last, |end| frames_at(end, rate))
            .clamp(start_pos, last);

        let (pos, time_to_start) = if params.defer < 0.0 {
            (frames_at(-params.defer, rate).min(stop_pos), 0.0)
        } else {
            (start_pos, params.defer as f64)
        };

        let (gain_l, gain_r) = wish_gains(master_volume, params.volume, params.pan);

        self.sound = Some(key);
        self.pos = pos;
        self.start_pos = start_pos;
        self.stop_pos = stop_pos;
        self.pitch = params.pitch;
        self.volume = params.volume;
        self.pan = params.pan;
        self.gain_l = gain_l;
        self.gain_r = gain_r;
        self.trend_l = 0.0;
        self.trend_r = 0.0;
        self.time_to_start = time_to_start;
        self.channels = sound.channels();
        self.looping = params.looped;
        self.stopping = false;
        self.waiting = time_to_start != 0.0;
    }

    /// Begin the stop fade
    ///
    /// The fade is a DC hold of the last output value that decays to zero,
    /// so it needs no sample data. `sound` is the buffer the voice was reading,
    /// if it still exists. A voice still waiting to start is freed at once.
    pub(crate) fn set_stop_mode(&mut self, sound: Option<&SoundBuffer>) {
        if self.sound.is_none() || self.stopping {
            self.waiting = false;
            return;
        }

        self.version = self.version.wrapping_add(MAX_VOICES as u32);

        if self.waiting {
            self.waiting = false;
            self.sound = None;
            return;
        }

        let (l, r) = sound.map_or((0.0, 0.0), |s| s.frame(self.pos as usize));
        self.gain_l *= l;
        self.gain_r *= r;
        self.trend_l = -sign(self.gain_l) * STOP_TREND;
        self.trend_r = -sign(self.gain_r) * STOP_TREND;
        self.stopping = true;
        self.sound = None;
    }

    /// Add this voice's contribution to `out` (interleaved stereo)
    ///
    /// `sound` is the resolved buffer for `self.sound`, `None` when the voice
    /// is fading out.
    pub(crate) fn mix_to(&mut self, sound: Option<&SoundBuffer>, out: &mut [f32], params: &MixParams) {
        let (wish_l, wish_r) = wish_gains(params.master_volume, self.volume, self.pan);
        let frames = out.len() / 2;

        if let Some(sound) = sound {
            let advance = sound.sample_rate() as f64 * params.inv_rate * self.pitch as f64;
            let steady = !self.stopping
                && !self.waiting
                && self.gain_l > 0.0
                && self.gain_r > 0.0
                && self.gain_l == wish_l
                && self.gain_r == wish_r
                && self.pos + advance * (frames as f64) < self.stop_pos;

            if steady {
                self.mix_steady(sound, out, advance);
                return;
            }
        } else if !self.stopping {
            // Data vanished without a stop: nothing left to fade from
            self.sound = None;
            self.waiting = false;
            return;
        }

        // Whole step still inside the start delay
        if self.waiting && self.time_to_start > params.step_time {
            self.time_to_start -= params.step_time;
            return;
        }

        self.mix_frames(sound, out, params, wish_l, wish_r);
    }

    fn mix_steady(&mut self, sound: &SoundBuffer, out: &mut [f32], advance: f64) {
        let data = sound.data();
        let last = sound.frames() - 1;
        let (gain_l, gain_r) = (self.gain_l, self.gain_r);
        let mut pos = self.pos;

        match self.channels {
            Channels::Mono => {
                for frame in out.chunks_exact_mut(2) {
                    let i = (pos as usize).min(last);
                    let t = (pos - i as f64) as f32;
                    let v = lerp(data[i], data[i + 1], t);
                    frame[0] += v * gain_l;
                    frame[1] += v * gain_r;
                    pos += advance;
                }
            }
            Channels::Stereo => {
                for frame in out.chunks_exact_mut(2) {
                    let ip = (pos as usize).min(last);
                    let t = (pos - ip as f64) as f32;
                    let i = ip * 2;
                    frame[0] += lerp(data[i], data[i + 2], t) * gain_l;
                    frame[1] += lerp(data[i + 1], data[i + 3], t) * gain_r;
                    pos += advance;
                }
            }
        }

        self.pos = pos;
    }

    fn mix_frames(
        &mut self,
        sound: Option<&SoundBuffer>,
        out: &mut [f32],
        params: &MixParams,
        wish_l: f32,
        wish_r: f32,
    ) {
        let advance = sound.map_or(0.0, |s| s.sample_rate() as f64 * params.inv_rate * self.pitch as f64);

        for frame in out.chunks_exact_mut(2) {
            if self.waiting {
                self.time_to_start -= params.inv_rate;
                if self.time_to_start <= 0.0 {
                    self.waiting = false;
                    self.pos = self.start_pos;
                }
                continue;
            }

            if self.stopping {
                self.gain_l = fade_out(self.gain_l, self.trend_l);
                self.gain_r = fade_out(self.gain_r, self.trend_r);
                if self.gain_l == 0.0 && self.gain_r == 0.0 {
                    self.stopping = false;
                    return;
                }
                frame[0] += self.gain_l;
                frame[1] += self.gain_r;
                continue;
            }

            let Some(sound) = sound else {
                return;
            };

            let (l, r) = self.sample(sound);
            frame[0] += l * self.gain_l;
            frame[1] += r * self.gain_r;

            self.gain_l = ramp_toward(self.gain_l, wish_l);
            self.gain_r = ramp_toward(self.gain_r, wish_r);

            self.pos += advance;
            if self.pos >= self.stop_pos {
                if self.looping {
                    self.pos = self.start_pos;
                } else {
                    self.pos = self.stop_pos;
                    self.set_stop_mode(Some(sound));
                }
            }
        }
    }

    #[inline]
    fn sample(&self, sound: &SoundBuffer) -> (f32, f32) {
        let data = sound.data();
        let ip = (self.pos as usize).min(sound.frames() - 1);
        let t = (self.pos - ip as f64) as f32;

        match self.channels {
            Channels::Mono => {
                let v = lerp(data[ip], data[ip + 1], t);
                (v, v)
            }
            Channels::Stereo => {
                let i = ip * 2;
                (lerp(data[i], data[i + 2], t), lerp(data[i + 1], data[i + 3], t))
            }
        }
    }

    /// Change gain-related parameters; the mix pass ramps toward them
    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub(crate) fn set_pan(&mut self, pan: f32) {
        self.pan = pan;
    }

    pub(crate) fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch;
    }

    #[cfg(test)]
    pub(crate) fn gains(&self) -> (f32, f32) {
        (self.gain_l, self.gain_r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::SoundRegistry;

    fn setup(samples: &[f32], channels: Channels, rate: u32) -> (SoundRegistry, SoundKey) {
        let mut registry = SoundRegistry::default();
        let buffer = SoundBuffer::from_interleaved(samples, channels, rate, "test".to_string());
        let key = registry.insert(buffer);
        (registry, key)
    }

    fn started(registry: &SoundRegistry, key: SoundKey, params: PlayParams) -> Voice {
        let mut voice = Voice::default();
        let buffer = registry.get(key).unwrap();
        voice.start(key, buffer, &params.clamped(), 1.0);
        voice
    }

    fn mix(voice: &mut Voice, registry: &SoundRegistry, frames: usize, rate: u32) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        let params = MixParams::new(1.0, rate, frames);
        let sound = voice.sound.and_then(|k| registry.get(k));
        voice.mix_to(sound, &mut out, &params);
        out
    }

    #[test]
    fn test_short_clip_plays_then_fades() {
        let (registry, key) = setup(&[0.0, 1.0, 0.0, -1.0], Channels::Mono, 1);
        let mut voice = started(&registry, key, PlayParams::default());
        assert_eq!(voice.stop_pos, 3.0);

        let out = mix(&mut voice, &registry, 4, 1);

        let expected = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, -0.9969003, -0.9969003];
        for (i, (a, b)) in out.iter().zip(expected.iter()).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {}: {} != {}", i, a, b);
        }
        assert!(voice.is_stopping());
        assert!(voice.sound.is_none());
        assert_eq!(voice.pos, 3.0);
    }

    #[test]
    fn test_stop_fade_terminates() {
        let (registry, key) = setup(&[1.0; 64], Channels::Mono, 48_000);
        let mut voice = started(&registry, key, PlayParams::default());

        voice.set_stop_mode(registry.get(key));
        assert!(voice.is_stopping());

        let out = mix(&mut voice, &registry, 4096, 48_000);
        assert!(voice.is_empty());
        assert!(out[0] > 0.99, "fade starts at the held level");
        assert_eq!(out[4095 * 2], 0.0);

        // Monotonic decay
        for pair in out.chunks_exact(2).collect::<Vec<_>>().windows(2) {
            assert!(pair[1][0] <= pair[0][0]);
        }
    }

    #[test]
    fn test_stop_fade_of_negative_value_rises_to_zero() {
        let (registry, key) = setup(&[-0.5; 16], Channels::Mono, 48_000);
        let mut voice = started(&registry, key, PlayParams::default());
        voice.set_stop_mode(registry.get(key));

        let (l, r) = voice.gains();
        assert!((l + 0.5).abs() < 1e-6 && (r + 0.5).abs() < 1e-6);

        let out = mix(&mut voice, &registry, 4096, 48_000);
        assert!(out[0] < 0.0 && out[0] > -0.5);
        assert!(voice.is_empty());
    }

    #[test]
    fn test_stop_on_zero_sample_empties_next_frame() {
        let (registry, key) = setup(&[0.0; 16], Channels::Mono, 48_000);
        let mut voice = started(&registry, key, PlayParams::default());
        voice.set_stop_mode(registry.get(key));

        let out = mix(&mut voice, &registry, 8, 48_000);
        assert!(voice.is_empty());
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_stop_bumps_version_once() {
        let (registry, key) = setup(&[0.5; 16], Channels::Mono, 48_000);
        let mut voice = started(&registry, key, PlayParams::default());
        let version = voice.version;

        voice.set_stop_mode(registry.get(key));
        assert_eq!(voice.version, version.wrapping_add(MAX_VOICES as u32));

        voice.set_stop_mode(registry.get(key));
        assert_eq!(voice.version, version.wrapping_add(MAX_VOICES as u32));
    }

    #[test]
    fn test_loop_wraps_to_start() {
        let (registry, key) = setup(&[0.1, 0.2, 0.3, 0.4, 0.5], Channels::Mono, 1);
        let mut voice = started(&registry, key, PlayParams::default().range(1.0, 3.0).looped(true));
        assert_eq!((voice.start_pos, voice.stop_pos), (1.0, 3.0));

        let out = mix(&mut voice, &registry, 6, 1);
        let left: Vec<f32> = out.chunks_exact(2).map(|f| f[0]).collect();
        let expected = [0.2, 0.3, 0.2, 0.3, 0.2, 0.3];
        for (a, b) in left.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6, "{:?}", left);
        }
        assert!(!voice.is_stopping());
        assert!(voice.sound.is_some());
    }

    #[test]
    fn test_deferred_start_waits() {
        let (registry, key) = setup(&[0.5; 4096], Channels::Mono, 1000);
        let mut voice = started(&registry, key, PlayParams::default().defer(0.010));
        assert!(voice.is_waiting());

        // 1000 Hz output: 10 ms is 10 frames
        let out = mix(&mut voice, &registry, 4, 1000);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(voice.is_waiting());

        let out = mix(&mut voice, &registry, 16, 1000);
        let left: Vec<f32> = out.chunks_exact(2).map(|f| f[0]).collect();
        assert!(left[..5].iter().all(|&s| s == 0.0), "{:?}", left);
        assert!(left[7..].iter().all(|&s| (s - 0.5).abs() < 1e-6), "{:?}", left);
        assert!(!voice.is_waiting());
    }

    #[test]
    fn test_stop_while_waiting_frees_immediately() {
        let (registry, key) = setup(&[0.5; 64], Channels::Mono, 1000);
        let mut voice = started(&registry, key, PlayParams::default().defer(1.0));

        voice.set_stop_mode(registry.get(key));
        assert!(voice.is_empty());
        assert!(!voice.is_waiting());
    }

    #[test]
    fn test_negative_defer_seeks() {
        let (registry, key) = setup(&[0.0; 100], Channels::Mono, 10);
        let voice = started(&registry, key, PlayParams::default().seek(2.0));
        assert_eq!(voice.pos, 20.0);
        assert!(!voice.is_waiting());

        let voice = started(&registry, key, PlayParams::default().seek(100.0));
        assert_eq!(voice.pos, 99.0, "seek is clamped to the stop position");
    }

    #[test]
    fn test_range_is_clamped_to_clip() {
        let (registry, key) = setup(&[0.0; 10], Channels::Mono, 1);
        let voice = started(&registry, key, PlayParams::default().range(-5.0, 50.0));
        assert_eq!((voice.start_pos, voice.stop_pos), (0.0, 9.0));

        let voice = started(&registry, key, PlayParams::default().range(6.0, 2.0));
        assert_eq!((voice.start_pos, voice.stop_pos), (6.0, 6.0));
    }

    #[test]
    fn test_volume_change_is_declicked() {
        let (registry, key) = setup(&[1.0; 4096], Channels::Mono, 48_000);
        let mut voice = started(&registry, key, PlayParams::default());

        voice.set_volume(0.0);
        let out = mix(&mut voice, &registry, 1024, 48_000);
        let left: Vec<f32> = out.chunks_exact(2).map(|f| f[0]).collect();

        assert!((left[0] - 1.0).abs() < 1e-6);
        assert!((left[256] - 0.5).abs() < 0.01);
        assert_eq!(left[600], 0.0);
        for pair in left.windows(2) {
            assert!(pair[0] - pair[1] <= DECLICK_STEP + 1e-6);
        }
    }

    #[test]
    fn test_pan_splits_gain() {
        let (registry, key) = setup(&[1.0; 64], Channels::Mono, 48_000);
        let voice = started(&registry, key, PlayParams::default().pan(0.5));
        let (l, r) = voice.gains();
        assert!((l - 1.0).abs() < 1e-6);
        assert!((r - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_source_interpolates_per_channel() {
        let (registry, key) = setup(&[0.0, 1.0, 1.0, 0.0, 0.0, 0.0], Channels::Stereo, 2);
        // Half-speed playback: 4 Hz output over a 2 Hz sound
        let mut voice = started(&registry, key, PlayParams::default());

        let out = mix(&mut voice, &registry, 2, 4);
        assert!((out[0] - 0.0).abs() < 1e-6 && (out[1] - 1.0).abs() < 1e-6);
        assert!((out[2] - 0.5).abs() < 1e-6 && (out[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_steady_path_matches_frame_path() {
        let samples: Vec<f32> = (0..2048).map(|i| (i as f32 * 0.01).sin()).collect();
        let (registry, key) = setup(&samples, Channels::Mono, 44_100);

        let params = PlayParams::default().pitch(1.3);
        let mut fast = started(&registry, key, params);
        let mut slow = started(&registry, key, params);

        let a = mix(&mut fast, &registry, 256, 48_000);

        // Unequal wish forces the per-frame path without changing the gains used
        let mut b = vec![0.0; 512];
        let sound = registry.get(key);
        slow.mix_frames(sound, &mut b, &MixParams::new(1.0, 48_000, 256), 1.0, 1.0);

        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!((fast.pos - slow.pos).abs() < 1e-9);
    }

    #[test]
    fn test_missing_data_frees_voice() {
        let (mut registry, key) = setup(&[0.5; 64], Channels::Mono, 1000);
        let mut voice = started(&registry, key, PlayParams::default());
        registry.remove(key);

        let out = mix(&mut voice, &registry, 8, 1000);
        assert!(voice.is_empty());
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
