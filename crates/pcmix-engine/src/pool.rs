//! Fixed-capacity voice pool and handles
//!
//! A handle packs the slot index into its low bits and the slot's version
//! into the rest. Versions advance by [`MAX_VOICES`] whenever a slot is
//! allocated or stopped, so a handle to a finished voice never resolves to
//! whatever plays in that slot later. Slot 0 is never handed out, which keeps
//! the all-zero handle permanently invalid.

use crate::sound::{SoundKey, SoundRegistry};
use crate::voice::Voice;

/// Maximum number of simultaneous voices (slot 0 is reserved)
pub const MAX_VOICES: usize = 128;

const INDEX_MASK: u32 = MAX_VOICES as u32 - 1;

/// Opaque reference to a playing voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VoiceHandle(u32);

impl VoiceHandle {
    /// Handle that never refers to a voice
    pub const INVALID: Self = Self(0);

    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// True only for [`VoiceHandle::INVALID`]; a non-null handle may still be stale
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    #[inline]
    fn version(self) -> u32 {
        self.0 & !INDEX_MASK
    }
}

pub(crate) struct VoicePool {
    voices: Box<[Voice]>,
}

impl Default for VoicePool {
    fn default() -> Self {
        Self {
            voices: (0..MAX_VOICES).map(|_| Voice::default()).collect(),
        }
    }
}

impl VoicePool {
    /// Claim the lowest free slot and advance its version
    pub(crate) fn allocate(&mut self) -> Option<usize> {
        let index = self.voices.iter().skip(1).position(Voice::is_empty)? + 1;
        let voice = &mut self.voices[index];
        voice.version = voice.version.wrapping_add(MAX_VOICES as u32);
        Some(index)
    }

    pub(crate) fn handle(&self, index: usize) -> VoiceHandle {
        VoiceHandle(index as u32 | self.voices[index].version)
    }

    /// Slot for a live handle; stale, null and slot-0 handles resolve to `None`
    #[inline]
    pub(crate) fn resolve(&self, handle: VoiceHandle) -> Option<usize> {
        let index = handle.index();
        (index != 0 && self.voices[index].version == handle.version()).then_some(index)
    }

    #[inline]
    pub(crate) fn get(&self, handle: VoiceHandle) -> Option<&Voice> {
        self.resolve(handle).map(|i| &self.voices[i])
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: VoiceHandle) -> Option<&mut Voice> {
        self.resolve(handle).map(|i| &mut self.voices[i])
    }

    #[inline]
    pub(crate) fn voice_mut(&mut self, index: usize) -> &mut Voice {
        &mut self.voices[index]
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_empty()).count()
    }

    /// Fade out every voice that still reads sample data
    pub(crate) fn stop_all(&mut self, registry: &SoundRegistry) {
        for voice in self.voices.iter_mut() {
            let sound = voice.sound.and_then(|k| registry.get(k));
            voice.set_stop_mode(sound);
        }
    }

    /// Fade out every voice reading `key`
    pub(crate) fn stop_using(&mut self, key: SoundKey, registry: &SoundRegistry) {
        let sound = registry.get(key);
        for voice in self.voices.iter_mut().filter(|v| v.sound == Some(key)) {
            voice.set_stop_mode(sound);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PlayParams;
    use crate::sound::{Channels, SoundBuffer};

    fn registry_with_sound() -> (SoundRegistry, SoundKey) {
        let mut registry = SoundRegistry::default();
        let key = registry.insert(SoundBuffer::from_interleaved(
            &[0.5; 32],
            Channels::Mono,
            48_000,
            "pool".to_string(),
        ));
        (registry, key)
    }

    fn occupy(pool: &mut VoicePool, registry: &SoundRegistry, key: SoundKey) -> Option<VoiceHandle> {
        let index = pool.allocate()?;
        let buffer = registry.get(key).unwrap();
        pool.voice_mut(index).start(key, buffer, &PlayParams::default(), 1.0);
        Some(pool.handle(index))
    }

    #[test]
    fn test_null_handle_never_resolves() {
        let pool = VoicePool::default();
        assert!(VoiceHandle::INVALID.is_null());
        assert!(pool.resolve(VoiceHandle::INVALID).is_none());
        assert!(pool.resolve(VoiceHandle::from_raw(MAX_VOICES as u32)).is_none());
    }

    #[test]
    fn test_allocation_skips_slot_zero() {
        let (registry, key) = registry_with_sound();
        let mut pool = VoicePool::default();

        let handle = occupy(&mut pool, &registry, key).unwrap();
        assert_eq!(handle.index(), 1);
        assert_eq!(handle.raw(), 1 | MAX_VOICES as u32);
        assert_eq!(pool.resolve(handle), Some(1));
    }

    #[test]
    fn test_pool_exhaustion() {
        let (registry, key) = registry_with_sound();
        let mut pool = VoicePool::default();

        let handles: Vec<VoiceHandle> = (1..MAX_VOICES)
            .map(|_| occupy(&mut pool, &registry, key).unwrap())
            .collect();
        assert_eq!(handles.len(), 127);
        assert_eq!(pool.active_count(), 127);
        assert!(pool.allocate().is_none());

        // Every handle is distinct and live
        for h in &handles {
            assert!(pool.get(*h).is_some());
        }
    }

    #[test]
    fn test_stopped_handle_goes_stale() {
        let (registry, key) = registry_with_sound();
        let mut pool = VoicePool::default();
        let first = occupy(&mut pool, &registry, key).unwrap();

        let sound = registry.get(key);
        pool.get_mut(first).unwrap().set_stop_mode(sound);
        assert!(pool.get(first).is_none());

        // Slot is still fading, so the next play lands elsewhere
        let second = occupy(&mut pool, &registry, key).unwrap();
        assert_ne!(first.index(), second.index());
    }

    #[test]
    fn test_reused_slot_gets_new_version() {
        let mut registry = SoundRegistry::default();
        let silent = registry.insert(SoundBuffer::from_interleaved(
            &[0.0; 32],
            Channels::Mono,
            48_000,
            "silent".to_string(),
        ));
        let mut pool = VoicePool::default();
        let first = occupy(&mut pool, &registry, silent).unwrap();

        // Stopping on a zero sample leaves nothing to fade; one mix pass frees it
        pool.get_mut(first).unwrap().set_stop_mode(registry.get(silent));
        let mut out = [0.0f32; 4];
        let params = crate::voice::MixParams::new(1.0, 48_000, 2);
        pool.voice_mut(1).mix_to(None, &mut out, &params);
        assert!(pool.voice_mut(1).is_empty());

        let second = occupy(&mut pool, &registry, silent).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn test_stop_using_only_touches_matching_voices() {
        let (mut registry, a) = registry_with_sound();
        let b = registry.insert(SoundBuffer::from_interleaved(
            &[0.25; 32],
            Channels::Mono,
            48_000,
            "other".to_string(),
        ));
        let mut pool = VoicePool::default();
        let ha = occupy(&mut pool, &registry, a).unwrap();
        let hb = occupy(&mut pool, &registry, b).unwrap();

        pool.stop_using(a, &registry);
        assert!(pool.get(ha).is_none());
        assert!(pool.get(hb).is_some());

        pool.stop_all(&registry);
        assert!(pool.get(hb).is_none());
        assert_eq!(pool.active_count(), 2, "both voices are still fading");
    }
}
