//! Mixer context
//!
//! [`Mixer`] owns the voice pool, the sound registry and (lazily) the output
//! device. All pool and sound mutation happens under one reentrant lock that
//! the render callback also takes for the length of a mix pass.

use std::cell::RefCell;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex};

use pcmix_audio::{OutputDevice, StreamInfo};

use crate::config::MixerConfig;
use crate::error::{EngineError, EngineResult};
use crate::params::{PlayParams, clamp_pan, clamp_pitch, clamp_volume};
use crate::pool::{VoiceHandle, VoicePool};
use crate::render::{MixRenderer, MixStats};
use crate::sound::{Channels, PcmSound, SoundBuffer, SoundKey, SoundRegistry};
use crate::voice::{MixParams, Voice};

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the lock protects
pub(crate) struct MixerState {
    pub pool: VoicePool,
    pub registry: SoundRegistry,
    pub master_volume: f32,
}

impl Default for MixerState {
    fn default() -> Self {
        Self {
            pool: VoicePool::default(),
            registry: SoundRegistry::default(),
            master_volume: 1.0,
        }
    }
}

impl MixerState {
    /// Mix every live voice into `out` in steps of `step` frames.
    /// Returns the number of voices that were active in the last step.
    pub(crate) fn mix(&mut self, out: &mut [f32], step: usize, sample_rate: u32) -> usize {
        let mut active = 0;

        for window in out.chunks_mut(step * 2) {
            let params = MixParams::new(self.master_volume, sample_rate, window.len() / 2);
            active = 0;

            for voice in self.pool.iter_mut().filter(|v| !v.is_empty()) {
                active += 1;
                let sound = voice.sound.and_then(|key| self.registry.get(key));
                voice.mix_to(sound, window, &params);
            }
        }

        active
    }

    fn start_voice(&mut self, key: SoundKey, params: &PlayParams) -> VoiceHandle {
        let Some(sound) = self.registry.get(key) else {
            return VoiceHandle::INVALID;
        };
        if sound.frames() <= 2 {
            return VoiceHandle::INVALID;
        }
        let Some(index) = self.pool.allocate() else {
            return VoiceHandle::INVALID;
        };

        self.pool
            .voice_mut(index)
            .start(key, sound, params, self.master_volume);
        self.pool.handle(index)
    }

    fn stop_voice(&mut self, handle: VoiceHandle) {
        if let Some(voice) = self.pool.get_mut(handle) {
            let sound = voice.sound.and_then(|key| self.registry.get(key));
            voice.set_stop_mode(sound);
        }
    }

    /// Voice and its buffer, for a live handle whose voice still reads data
    fn playing_voice(&mut self, handle: VoiceHandle) -> Option<(&mut Voice, &SoundBuffer)> {
        let voice = self.pool.get_mut(handle)?;
        let sound = self.registry.get(voice.sound?)?;
        Some((voice, sound))
    }

    /// Fade out every voice reading `key`, then free its buffer
    pub(crate) fn release_sound(&mut self, key: SoundKey) {
        self.pool.stop_using(key, &self.registry);
        self.registry.remove(key);
    }

    fn release_all_sounds(&mut self) {
        self.pool.stop_all(&self.registry);
        self.registry.clear();
    }
}

pub(crate) struct MixerShared {
    state: ReentrantMutex<RefCell<MixerState>>,
    /// Thread holding the manual critical section, if any
    manual_owner: Mutex<Option<ThreadId>>,
    pub stats: MixStats,
}

impl MixerShared {
    fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(MixerState::default())),
            manual_owner: Mutex::new(None),
            stats: MixStats::default(),
        }
    }

    /// Run `f` with the state locked. `f` must not re-enter the mixer.
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut MixerState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    pub(crate) fn mix(&self, out: &mut [f32], step: usize, sample_rate: u32) -> usize {
        self.with_state(|state| state.mix(out, step, sample_rate))
    }

    fn enter_critical_section(&self) {
        let me = thread::current().id();
        if *self.manual_owner.lock() == Some(me) {
            return;
        }

        // Held until leave_critical_section on this thread
        std::mem::forget(self.state.lock());
        *self.manual_owner.lock() = Some(me);
    }

    fn leave_critical_section(&self) {
        let me = thread::current().id();
        {
            let mut owner = self.manual_owner.lock();
            if *owner != Some(me) {
                return;
            }
            *owner = None;
        }

        // SAFETY: this thread acquired the lock in enter_critical_section and
        // forgot the guard, so it still holds exactly that one level.
        unsafe { self.state.force_unlock() };
    }

    fn holds_critical_section(&self) -> bool {
        *self.manual_owner.lock() == Some(thread::current().id())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIXER
// ═══════════════════════════════════════════════════════════════════════════════

/// Multi-voice mixer bound to one output device
///
/// All methods take `&self` and may be called from any thread. Operations on
/// stale or invalid handles are silent no-ops; a full pool makes `play`
/// return [`VoiceHandle::INVALID`].
pub struct Mixer {
    shared: Arc<MixerShared>,
    config: MixerConfig,
    output: Mutex<Option<OutputDevice>>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new(MixerConfig::default())
    }
}

impl Mixer {
    pub fn new(config: MixerConfig) -> Self {
        Self {
            shared: Arc::new(MixerShared::new()),
            config,
            output: Mutex::new(None),
        }
    }

    /// Mixer without a playback device
    pub fn headless() -> Self {
        Self::new(MixerConfig::headless())
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    /// New render callback over this mixer's voices
    pub fn renderer(&self) -> MixRenderer {
        MixRenderer::new(
            Arc::clone(&self.shared),
            self.config.sample_rate(),
            self.config.step(),
        )
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Device lifecycle
    // ───────────────────────────────────────────────────────────────────────────

    /// Open the output device now; a no-op when it is already running
    pub fn start_output(&self) -> EngineResult<()> {
        let mut output = self.output.lock();
        if output.is_some() {
            return Ok(());
        }

        let mut renderer = self.renderer();
        let device = OutputDevice::open(
            &self.config.output,
            Box::new(move |data: &mut [f32], channels: usize| renderer.render(data, channels)),
        )?;
        *output = Some(device);
        Ok(())
    }

    fn ensure_output(&self) {
        if !self.config.auto_start_device {
            return;
        }
        if let Err(e) = self.start_output() {
            log::error!("SOUND: Failed to initialize playback device: {}", e);
        }
    }

    pub fn is_output_running(&self) -> bool {
        self.output.lock().is_some()
    }

    pub fn output_info(&self) -> Option<StreamInfo> {
        self.output.lock().as_ref().map(|d| d.info().clone())
    }

    /// Close the output device, blocking until the callback can no longer run
    ///
    /// Voices and sounds are kept. A later play or sound creation reopens the
    /// device when `auto_start_device` is set.
    pub fn shutdown(&self) {
        if self.shared.holds_critical_section() {
            log::warn!("Mixer shut down inside a critical section, leaving it");
            self.shared.leave_critical_section();
        }

        let device = self.output.lock().take();
        if let Some(device) = device {
            device.shutdown();
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Sound creation
    // ───────────────────────────────────────────────────────────────────────────

    fn register(&self, buffer: SoundBuffer) -> PcmSound {
        PcmSound::register(&self.shared, buffer)
    }

    fn invalid_sound(&self) -> PcmSound {
        PcmSound::invalid(Arc::downgrade(&self.shared))
    }

    /// Create a mono sound from samples in `[-1, 1]`
    ///
    /// A zero sample rate or empty data yields an invalid sound.
    pub fn create_sound_mono(&self, sample_rate: u32, data: &[f32]) -> PcmSound {
        self.ensure_output();
        if sample_rate < 1 || data.is_empty() {
            return self.invalid_sound();
        }

        let name = format!("mono {} smpl @{}", data.len(), sample_rate);
        self.register(SoundBuffer::from_interleaved(data, Channels::Mono, sample_rate, name))
    }

    pub fn create_sound_stereo(&self, sample_rate: u32, data: &[[f32; 2]]) -> PcmSound {
        self.ensure_output();
        if sample_rate < 1 || data.is_empty() {
            return self.invalid_sound();
        }

        let name = format!("stereo {} smpl @{}", data.len(), sample_rate);
        self.register(SoundBuffer::from_interleaved(
            data.as_flattened(),
            Channels::Stereo,
            sample_rate,
            name,
        ))
    }

    /// Decode a `.wav`, `.mp3` or `.flac` file
    pub fn try_create_sound_from_file<P: AsRef<Path>>(&self, path: P) -> EngineResult<PcmSound> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(EngineError::EmptyFileName);
        }

        let decoded = pcmix_file::decode(path)?;
        let channels = Channels::from_count(decoded.channels)
            .ok_or(EngineError::InvalidChannels(decoded.channels))?;
        if decoded.sample_rate < 1 {
            return Err(EngineError::InvalidSampleRate(decoded.sample_rate));
        }
        if decoded.frames == 0 {
            return Err(EngineError::EmptyData);
        }

        Ok(self.register(SoundBuffer::from_interleaved(
            &decoded.samples,
            channels,
            decoded.sample_rate,
            path.display().to_string(),
        )))
    }

    /// Decode a file, logging failures and returning an invalid sound
    pub fn create_sound_from_file<P: AsRef<Path>>(&self, path: P) -> PcmSound {
        self.ensure_output();
        let path = path.as_ref();
        match self.try_create_sound_from_file(path) {
            Ok(sound) => sound,
            Err(e) => {
                log::error!("Cannot create sound from file '{}': {}", path.display(), e);
                self.invalid_sound()
            }
        }
    }

    /// Stop every voice and free every sound created by this mixer.
    /// Outstanding [`PcmSound`]s become invalid.
    pub fn release_all_sounds(&self) {
        self.shared.with_state(MixerState::release_all_sounds);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Voice control
    // ───────────────────────────────────────────────────────────────────────────

    /// Start a voice
    pub fn play(&self, sound: &PcmSound, params: PlayParams) -> VoiceHandle {
        self.ensure_output();
        let Some(key) = sound.key() else {
            return VoiceHandle::INVALID;
        };
        if !sound.belongs_to(&self.shared) {
            return VoiceHandle::INVALID;
        }

        let params = params.clamped();
        self.shared.with_state(|state| state.start_voice(key, &params))
    }

    /// Start a looping voice
    pub fn play_loop(&self, sound: &PcmSound, params: PlayParams) -> VoiceHandle {
        self.play(sound, params.looped(true))
    }

    /// Start a voice after `defer` seconds; a negative value seeks instead
    pub fn play_deferred(&self, sound: &PcmSound, defer: f32, params: PlayParams) -> VoiceHandle {
        self.play(sound, params.defer(defer))
    }

    /// Begin the voice's stop fade; the handle is invalid afterwards
    pub fn stop(&self, handle: VoiceHandle) {
        self.shared.with_state(|state| state.stop_voice(handle));
    }

    /// Fade out every voice
    pub fn stop_all(&self) {
        self.shared
            .with_state(|state| state.pool.stop_all(&state.registry));
    }

    /// Whether `handle` refers to a voice that has not been stopped
    pub fn is_playing(&self, handle: VoiceHandle) -> bool {
        self.shared.with_state(|state| {
            state
                .pool
                .get(handle)
                .is_some_and(|voice| !voice.is_stopping())
        })
    }

    pub fn set_volume(&self, handle: VoiceHandle, volume: f32) {
        let volume = clamp_volume(volume);
        self.shared.with_state(|state| {
            if let Some(voice) = state.pool.get_mut(handle) {
                voice.set_volume(volume);
            }
        });
    }

    pub fn set_pitch(&self, handle: VoiceHandle, pitch: f32) {
        let pitch = clamp_pitch(pitch);
        self.shared.with_state(|state| {
            if let Some(voice) = state.pool.get_mut(handle) {
                voice.set_pitch(pitch);
            }
        });
    }

    pub fn set_pan(&self, handle: VoiceHandle, pan: f32) {
        let pan = clamp_pan(pan);
        self.shared.with_state(|state| {
            if let Some(voice) = state.pool.get_mut(handle) {
                voice.set_pan(pan);
            }
        });
    }

    /// Playback position in seconds; 0 for stale handles and voices that
    /// are still waiting to start
    pub fn play_pos(&self, handle: VoiceHandle) -> f64 {
        self.shared.with_state(|state| match state.playing_voice(handle) {
            Some((voice, sound)) if !voice.is_waiting() => voice.pos / sound.sample_rate() as f64,
            _ => 0.0,
        })
    }

    /// Seek, clamped to the voice's play range
    pub fn set_play_pos(&self, handle: VoiceHandle, seconds: f64) {
        if seconds.is_nan() {
            return;
        }
        self.shared.with_state(|state| {
            if let Some((voice, sound)) = state.playing_voice(handle) {
                let pos = (sound.sample_rate() as f64 * seconds).floor();
                voice.pos = pos.clamp(voice.start_pos, voice.stop_pos);
            }
        });
    }

    pub fn set_master_volume(&self, volume: f32) {
        let volume = clamp_volume(volume);
        self.shared.with_state(|state| state.master_volume = volume);
    }

    pub fn master_volume(&self) -> f32 {
        self.shared.with_state(|state| state.master_volume)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Batching
    // ───────────────────────────────────────────────────────────────────────────

    /// Hold the mixer lock across several calls from this thread
    ///
    /// The render callback blocks until [`leave_critical_section`](Self::leave_critical_section),
    /// so keep the section short. Entering twice is a no-op.
    pub fn enter_critical_section(&self) {
        self.shared.enter_critical_section();
    }

    /// Release a section entered on this thread; a no-op otherwise
    pub fn leave_critical_section(&self) {
        self.shared.leave_critical_section();
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ───────────────────────────────────────────────────────────────────────────

    /// Live sounds
    pub fn total_sound_count(&self) -> usize {
        self.shared.with_state(|state| state.registry.len())
    }

    /// Voices active during the last mix step
    pub fn playing_sound_count(&self) -> usize {
        self.shared.stats.playing()
    }

    /// Voices currently occupying a slot, including ones fading out
    pub fn active_voice_count(&self) -> usize {
        self.shared.with_state(|state| state.pool.active_count())
    }

    /// Bytes held by live sample buffers
    pub fn memory_used(&self) -> usize {
        self.shared.with_state(|state| state.registry.memory_used())
    }

    /// Output frames rendered so far
    pub fn total_samples_played(&self) -> u64 {
        self.shared.stats.frames_played()
    }

    /// Seconds of output rendered so far
    pub fn total_time_played(&self) -> f64 {
        self.shared.stats.time_played()
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.config.sample_rate()
    }

    pub fn sound_debug_names(&self) -> Vec<String> {
        self.shared.with_state(|state| {
            state
                .registry
                .iter()
                .map(|sound| sound.debug_name().to_string())
                .collect()
        })
    }

    pub fn log_sound_debug_infos(&self) {
        let names = self.sound_debug_names();
        log::info!("{} sounds allocated", names.len());
        for name in names {
            log::info!("  {}", name);
        }
    }
}

impl Drop for Mixer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
