//! Output stream management
//!
//! The cpal stream lives on a dedicated thread for its whole life. Opening
//! blocks until that thread reports whether the stream started; shutting down
//! blocks until the stream has been dropped, after which the render callback
//! is never entered again.

use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, Stream, StreamConfig, SupportedStreamConfig};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::{AudioConfig, AudioError, AudioResult, get_output_stream_config, resolve_output_device};

/// Render callback type
///
/// Receives the device's interleaved f32 buffer and its channel count. The
/// buffer content is undefined on entry; the callback must write every sample.
pub type RenderCallback = Box<dyn FnMut(&mut [f32], usize) + Send + 'static>;

/// Format the device actually opened with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub device_name: String,
    pub channels: u16,
    pub sample_rate: u32,
}

/// A running output stream
pub struct OutputDevice {
    info: StreamInfo,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl OutputDevice {
    /// Open the configured device and start streaming through `callback`
    pub fn open(config: &AudioConfig, callback: RenderCallback) -> AudioResult<Self> {
        let (ready_tx, ready_rx) = bounded::<AudioResult<StreamInfo>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let config = config.clone();

        let thread = thread::Builder::new()
            .name("pcmix-output".to_string())
            .spawn(move || run_output_stream(config, callback, ready_tx, stop_rx))
            .map_err(|e| AudioError::ThreadError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(info)) => {
                log::info!(
                    "Sound device name: {} ({} ch @ {} Hz)",
                    info.device_name,
                    info.channels,
                    info.sample_rate
                );
                Ok(Self {
                    info,
                    stop_tx,
                    thread: Some(thread),
                })
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(AudioError::ThreadError(
                    "output thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Stop the stream and wait until the callback can no longer run
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.stop_tx.send(());
        if thread.join().is_err() {
            log::error!("Output thread panicked during shutdown");
        }
        log::info!("Output stream stopped");
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_output_stream(
    config: AudioConfig,
    callback: RenderCallback,
    ready_tx: Sender<AudioResult<StreamInfo>>,
    stop_rx: Receiver<()>,
) {
    let stream = match start_stream(&config, callback) {
        Ok((stream, info)) => {
            let _ = ready_tx.send(Ok(info));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Parked until shutdown (or until the owner is gone)
    let _ = stop_rx.recv();
    drop(stream);
}

fn start_stream(config: &AudioConfig, callback: RenderCallback) -> AudioResult<(Stream, StreamInfo)> {
    let device = resolve_output_device(config)?;
    let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
    let supported = get_output_stream_config(&device, config)?;

    let stream = build_output_stream(&device, &supported, config.buffer_frames, callback)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamError(e.to_string()))?;

    let info = StreamInfo {
        device_name,
        channels: supported.channels(),
        sample_rate: supported.sample_rate().0,
    };
    Ok((stream, info))
}

fn build_output_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    buffer_frames: Option<u32>,
    mut callback: RenderCallback,
) -> AudioResult<Stream> {
    let channels = supported_config.channels() as usize;

    let config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: buffer_frames
            .map(CpalBufferSize::Fixed)
            .unwrap_or(CpalBufferSize::Default),
    };

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback(data, channels);
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_device_fails_cleanly() {
        let config = AudioConfig {
            device_name: Some("pcmix-test-device-that-does-not-exist".to_string()),
            ..AudioConfig::default()
        };

        let result = OutputDevice::open(&config, Box::new(|data: &mut [f32], _: usize| data.fill(0.0)));
        assert!(result.is_err());
    }
}
