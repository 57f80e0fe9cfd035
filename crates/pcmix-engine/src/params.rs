//! Playback parameters

/// Lowest accepted pitch ratio
pub const MIN_PITCH: f32 = 1e-5;

/// Highest accepted pitch ratio
pub const MAX_PITCH: f32 = 1000.0;

/// Highest accepted voice or master volume
pub const MAX_VOLUME: f32 = 100_000.0;

/// Parameters for starting a voice
///
/// Out-of-range values are clamped when the voice starts: volume to
/// `[0, MAX_VOLUME]`, pitch to `[MIN_PITCH, MAX_PITCH]` and pan to `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayParams {
    pub volume: f32,
    /// Playback speed ratio, 1.0 plays at the sound's own rate
    pub pitch: f32,
    /// -1.0 fully right, 0.0 centered, 1.0 fully left
    pub pan: f32,
    /// Play range start in seconds
    pub start: f32,
    /// Play range end in seconds, `None` plays to the end of the clip
    pub end: Option<f32>,
    /// Restart at `start` after reaching `end` instead of fading out
    pub looped: bool,
    /// Positive: seconds to wait before starting.
    /// Negative: start immediately, seeking to `-defer` seconds into the clip.
    pub defer: f32,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            pitch: 1.0,
            pan: 0.0,
            start: 0.0,
            end: None,
            looped: false,
            defer: 0.0,
        }
    }
}

impl PlayParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    /// Restrict playback to `[start, end)` seconds
    pub fn range(mut self, start: f32, end: f32) -> Self {
        self.start = start;
        self.end = Some(end);
        self
    }

    pub fn start_at(mut self, start: f32) -> Self {
        self.start = start;
        self
    }

    pub fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Delay the start by `seconds`
    pub fn defer(mut self, seconds: f32) -> Self {
        self.defer = seconds;
        self
    }

    /// Start immediately at `seconds` into the clip
    pub fn seek(mut self, seconds: f32) -> Self {
        self.defer = -seconds;
        self
    }

    pub(crate) fn clamped(self) -> Self {
        Self {
            volume: clamp_volume(self.volume),
            pitch: clamp_pitch(self.pitch),
            pan: clamp_pan(self.pan),
            start: if self.start.is_nan() { 0.0 } else { self.start },
            end: self.end.filter(|e| !e.is_nan()),
            looped: self.looped,
            defer: if self.defer.is_nan() { 0.0 } else { self.defer },
        }
    }
}

#[inline]
fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    clamp_or(volume, 0.0, MAX_VOLUME, 0.0)
}

pub(crate) fn clamp_pitch(pitch: f32) -> f32 {
    clamp_or(pitch, MIN_PITCH, MAX_PITCH, 1.0)
}

pub(crate) fn clamp_pan(pan: f32) -> f32 {
    clamp_or(pan, -1.0, 1.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = PlayParams::new();
        assert_eq!(params.volume, 1.0);
        assert_eq!(params.pitch, 1.0);
        assert_eq!(params.pan, 0.0);
        assert_eq!(params.start, 0.0);
        assert_eq!(params.end, None);
        assert!(!params.looped);
        assert_eq!(params.defer, 0.0);
    }

    #[test]
    fn test_builder_and_seek() {
        let params = PlayParams::new().volume(0.5).range(1.0, 2.0).looped(true).seek(1.5);
        assert_eq!(params.volume, 0.5);
        assert_eq!((params.start, params.end), (1.0, Some(2.0)));
        assert!(params.looped);
        assert_eq!(params.defer, -1.5);
    }

    #[test]
    fn test_clamping() {
        let params = PlayParams::new().volume(1e9).pitch(0.0).pan(-3.0).clamped();
        assert_eq!(params.volume, MAX_VOLUME);
        assert_eq!(params.pitch, MIN_PITCH);
        assert_eq!(params.pan, -1.0);

        let params = PlayParams::new().volume(-1.0).pitch(5000.0).pan(f32::NAN).clamped();
        assert_eq!(params.volume, 0.0);
        assert_eq!(params.pitch, MAX_PITCH);
        assert_eq!(params.pan, 0.0);
    }
}
