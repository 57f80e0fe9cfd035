//! Resident PCM sounds
//!
//! Sample data lives in the mixer's [`SoundRegistry`], keyed by a
//! generation-checked [`SoundKey`]. Voices only ever hold the key, so a sound
//! that has been released simply stops resolving. [`PcmSound`] is the
//! caller-side owner: dropping it stops every voice still reading the data
//! before the buffer is freed.

use std::sync::{Arc, Weak};

use crate::mixer::MixerShared;

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Channel layout of a sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Channels {
    #[default]
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
        }
    }

    pub fn from_count(count: u16) -> Option<Self> {
        match count {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOUND BUFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// Interleaved samples plus one trailing wrap frame that mirrors frame 0,
/// so interpolation at the last frame never reads out of bounds.
#[derive(Debug, Clone)]
pub(crate) struct SoundBuffer {
    data: Box<[f32]>,
    channels: Channels,
    sample_rate: u32,
    frames: usize,
    debug_name: String,
}

impl SoundBuffer {
    /// Copy `samples` (interleaved, trailing partial frame ignored)
    pub(crate) fn from_interleaved(
        samples: &[f32],
        channels: Channels,
        sample_rate: u32,
        debug_name: String,
    ) -> Self {
        let ch = channels.count();
        let frames = samples.len() / ch;

        let mut data = vec![0.0f32; ch * (frames + 1)].into_boxed_slice();
        data[..frames * ch].copy_from_slice(&samples[..frames * ch]);

        let mut buffer = Self {
            data,
            channels,
            sample_rate,
            frames,
            debug_name,
        };
        buffer.sync_wrap_frame();
        buffer
    }

    fn sync_wrap_frame(&mut self) {
        let ch = self.channels.count();
        if self.frames == 0 {
            return;
        }
        let (head, wrap) = self.data.split_at_mut(self.frames * ch);
        wrap.copy_from_slice(&head[..ch]);
    }

    #[inline]
    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub(crate) fn channels(&self) -> Channels {
        self.channels
    }

    #[inline]
    pub(crate) fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub(crate) fn frames(&self) -> usize {
        self.frames
    }

    pub(crate) fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub(crate) fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Left/right value of one frame (mono is duplicated)
    pub(crate) fn frame(&self, index: usize) -> (f32, f32) {
        let index = index.min(self.frames);
        match self.channels {
            Channels::Mono => {
                let v = self.data[index];
                (v, v)
            }
            Channels::Stereo => (self.data[index * 2], self.data[index * 2 + 1]),
        }
    }

    /// Copy up to `out.len()` frames as mono. Stereo frames are averaged.
    pub(crate) fn read_mono(&self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.frames);
        match self.channels {
            Channels::Mono => out[..n].copy_from_slice(&self.data[..n]),
            Channels::Stereo => {
                for (dst, src) in out[..n].iter_mut().zip(self.data.chunks_exact(2)) {
                    *dst = (src[0] + src[1]) * 0.5;
                }
            }
        }
        n
    }

    /// Copy up to `out.len()` frames as stereo. Mono frames are duplicated.
    pub(crate) fn read_stereo(&self, out: &mut [[f32; 2]]) -> usize {
        let n = out.len().min(self.frames);
        match self.channels {
            Channels::Mono => {
                for (dst, &v) in out[..n].iter_mut().zip(self.data.iter()) {
                    *dst = [v, v];
                }
            }
            Channels::Stereo => {
                for (dst, src) in out[..n].iter_mut().zip(self.data.chunks_exact(2)) {
                    *dst = [src[0], src[1]];
                }
            }
        }
        n
    }

    /// Overwrite up to `input.len()` frames from mono data
    pub(crate) fn write_mono(&mut self, input: &[f32]) -> usize {
        let n = input.len().min(self.frames);
        match self.channels {
            Channels::Mono => self.data[..n].copy_from_slice(&input[..n]),
            Channels::Stereo => {
                for (dst, &v) in self.data.chunks_exact_mut(2).zip(&input[..n]) {
                    dst[0] = v;
                    dst[1] = v;
                }
            }
        }
        self.sync_wrap_frame();
        n
    }

    /// Overwrite up to `input.len()` frames from stereo data
    pub(crate) fn write_stereo(&mut self, input: &[[f32; 2]]) -> usize {
        let n = input.len().min(self.frames);
        match self.channels {
            Channels::Mono => {
                for (dst, src) in self.data[..n].iter_mut().zip(input) {
                    *dst = (src[0] + src[1]) * 0.5;
                }
            }
            Channels::Stereo => self.data[..n * 2].copy_from_slice(input[..n].as_flattened()),
        }
        self.sync_wrap_frame();
        n
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOUND REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-owning reference to a registered sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SoundKey {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct SoundSlot {
    generation: u32,
    buffer: Option<SoundBuffer>,
}

/// Slab of live sound buffers with generation-checked keys
#[derive(Debug, Default)]
pub(crate) struct SoundRegistry {
    slots: Vec<SoundSlot>,
    free: Vec<u32>,
    live: usize,
    memory_used: usize,
}

impl SoundRegistry {
    pub(crate) fn insert(&mut self, buffer: SoundBuffer) -> SoundKey {
        self.live += 1;
        self.memory_used += buffer.memory_size();

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(SoundSlot::default());
                (self.slots.len() - 1) as u32
            }
        };

        let slot = &mut self.slots[index as usize];
        slot.buffer = Some(buffer);
        SoundKey {
            index,
            generation: slot.generation,
        }
    }

    #[inline]
    pub(crate) fn get(&self, key: SoundKey) -> Option<&SoundBuffer> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.buffer.as_ref())
    }

    pub(crate) fn get_mut(&mut self, key: SoundKey) -> Option<&mut SoundBuffer> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.buffer.as_mut())
    }

    pub(crate) fn contains(&self, key: SoundKey) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn remove(&mut self, key: SoundKey) -> Option<SoundBuffer> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let buffer = slot.buffer.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        self.memory_used -= buffer.memory_size();
        Some(buffer)
    }

    /// Free every buffer; all outstanding keys go stale
    pub(crate) fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.buffer.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.live = 0;
        self.memory_used = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn memory_used(&self) -> usize {
        self.memory_used
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SoundBuffer> {
        self.slots.iter().filter_map(|slot| slot.buffer.as_ref())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PCM SOUND
// ═══════════════════════════════════════════════════════════════════════════════

/// A playable sound owned by the caller
///
/// Created through the `create_sound_*` methods on [`Mixer`](crate::Mixer).
/// Creation failures produce an invalid sound rather than an error: it plays
/// nothing and every accessor returns a neutral value.
///
/// Dropping (or [`release`](Self::release)-ing) a sound pushes every voice that
/// still plays it into its stop fade before the samples are freed. Cloning
/// registers an independent copy of the data.
pub struct PcmSound {
    owner: Weak<MixerShared>,
    key: Option<SoundKey>,
}

impl PcmSound {
    pub(crate) fn invalid(owner: Weak<MixerShared>) -> Self {
        Self {
            owner,
            key: None,
        }
    }

    pub(crate) fn register(shared: &Arc<MixerShared>, buffer: SoundBuffer) -> Self {
        let key = shared.with_state(|state| state.registry.insert(buffer));

        Self {
            owner: Arc::downgrade(shared),
            key: Some(key),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> Option<SoundKey> {
        self.key
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<MixerShared>) -> bool {
        std::ptr::eq(self.owner.as_ptr(), Arc::as_ptr(shared))
    }

    /// Run `f` against this sound's buffer under the mixer lock
    fn with_buffer<R>(&self, f: impl FnOnce(&SoundBuffer) -> R) -> Option<R> {
        let key = self.key?;
        let shared = self.owner.upgrade()?;
        shared.with_state(|state| state.registry.get(key).map(f))
    }

    fn with_buffer_mut<R>(&mut self, f: impl FnOnce(&mut SoundBuffer) -> R) -> Option<R> {
        let key = self.key?;
        let shared = self.owner.upgrade()?;
        shared.with_state(|state| state.registry.get_mut(key).map(f))
    }

    /// Whether the sound still has sample data
    pub fn is_valid(&self) -> bool {
        let (Some(key), Some(shared)) = (self.key, self.owner.upgrade()) else {
            return false;
        };
        shared.with_state(|state| state.registry.contains(key))
    }

    /// Sample rate, 0 once the data is gone
    pub fn sample_rate(&self) -> u32 {
        self.with_buffer(SoundBuffer::sample_rate).unwrap_or(0)
    }

    /// Number of sample frames, 0 once the data is gone
    pub fn frames(&self) -> usize {
        self.with_buffer(SoundBuffer::frames).unwrap_or(0)
    }

    pub fn channels(&self) -> Channels {
        self.with_buffer(SoundBuffer::channels).unwrap_or(Channels::Mono)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.with_buffer(|b| match b.sample_rate() {
            0 => 0.0,
            rate => b.frames() as f64 / rate as f64,
        })
        .unwrap_or(0.0)
    }

    /// Bytes held by the sample buffer (including the wrap frame)
    pub fn memory_size(&self) -> usize {
        self.with_buffer(SoundBuffer::memory_size).unwrap_or(0)
    }

    pub fn debug_name(&self) -> Option<String> {
        self.with_buffer(|b| b.debug_name().to_string())
    }

    /// Copy frames out as mono, returns the number of frames written
    pub fn get_data(&self, out: &mut [f32]) -> usize {
        self.with_buffer(|b| b.read_mono(out)).unwrap_or(0)
    }

    /// Copy frames out as stereo, returns the number of frames written
    pub fn get_data_stereo(&self, out: &mut [[f32; 2]]) -> usize {
        self.with_buffer(|b| b.read_stereo(out)).unwrap_or(0)
    }

    /// Overwrite leading frames from mono data; voices keep playing and pick
    /// up the new samples on the next mix pass
    pub fn set_data(&mut self, data: &[f32]) -> usize {
        self.with_buffer_mut(|b| b.write_mono(data)).unwrap_or(0)
    }

    /// Overwrite leading frames from stereo data
    pub fn set_data_stereo(&mut self, data: &[[f32; 2]]) -> usize {
        self.with_buffer_mut(|b| b.write_stereo(data)).unwrap_or(0)
    }

    /// Stop every voice playing this sound and free its samples
    ///
    /// The sound is invalid afterwards. Releasing twice is a no-op.
    pub fn release(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };

        if let Some(shared) = self.owner.upgrade() {
            shared.with_state(|state| state.release_sound(key));
        }
    }
}

impl Clone for PcmSound {
    fn clone(&self) -> Self {
        let copy = self.with_buffer(SoundBuffer::clone);
        match (copy, self.owner.upgrade()) {
            (Some(buffer), Some(shared)) => Self::register(&shared, buffer),
            _ => Self::invalid(self.owner.clone()),
        }
    }
}

impl Drop for PcmSound {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PcmSound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcmSound")
            .field("key", &self.key)
            .field("owned", &(self.owner.strong_count() > 0))
            .finish()
    }
}
