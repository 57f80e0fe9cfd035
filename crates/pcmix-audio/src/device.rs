//! Output device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleFormat, SupportedStreamConfig, SupportedStreamConfigRange};

use crate::{AudioConfig, AudioError, AudioResult};

/// Output device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub output_channels: u16,
    pub sample_rates: Vec<u32>,
    /// Whether the device can run the mixer's fixed format (f32 at the configured rate)
    pub supports_mixer_format: bool,
}

/// Get the audio host (platform-specific backend)
pub fn get_host() -> Host {
    cpal::default_host()
}

/// List available output devices
pub fn list_output_devices() -> AudioResult<Vec<DeviceInfo>> {
    let host = get_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());
    let mixer_config = AudioConfig::default();

    let mut devices = Vec::new();

    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if let Ok(name) = device.name() {
            let is_default = default_name.as_deref() == Some(name.as_str());
            let configs: Vec<SupportedStreamConfigRange> = device
                .supported_output_configs()
                .map(|c| c.collect())
                .unwrap_or_default();
            let (output_channels, sample_rates) = extract_device_info(&configs);

            devices.push(DeviceInfo {
                name,
                is_default,
                output_channels,
                sample_rates,
                supports_mixer_format: find_matching_config(&configs, &mixer_config).is_some(),
            });
        }
    }

    Ok(devices)
}

/// Get default output device
pub fn get_default_output_device() -> AudioResult<Device> {
    get_host().default_output_device().ok_or(AudioError::NoDevice)
}

/// Get output device by name
pub fn get_output_device_by_name(name: &str) -> AudioResult<Device> {
    let host = get_host();

    for device in host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?
    {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}

/// Resolve the device named in the config, or the host default
pub fn resolve_output_device(config: &AudioConfig) -> AudioResult<Device> {
    match config.device_name.as_deref() {
        Some(name) => get_output_device_by_name(name),
        None => get_default_output_device(),
    }
}

/// Pick a supported f32 output config at the requested rate
///
/// An exact channel-count match wins; otherwise the first config with more
/// channels is used and the extra channels are left to the render callback.
pub fn get_output_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let configs: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    find_matching_config(&configs, config).ok_or_else(|| {
        AudioError::ConfigError(format!(
            "No f32 output config for {} channels @ {}Hz",
            config.channels, config.sample_rate
        ))
    })
}

fn find_matching_config(
    configs: &[SupportedStreamConfigRange],
    config: &AudioConfig,
) -> Option<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate);
    let usable = |c: &&SupportedStreamConfigRange| {
        c.sample_format() == SampleFormat::F32
            && c.min_sample_rate() <= sample_rate
            && c.max_sample_rate() >= sample_rate
    };

    configs
        .iter()
        .filter(usable)
        .find(|c| c.channels() == config.channels)
        .or_else(|| {
            configs
                .iter()
                .filter(usable)
                .find(|c| c.channels() > config.channels)
        })
        .map(|c| c.clone().with_sample_rate(sample_rate))
}

fn extract_device_info(configs: &[SupportedStreamConfigRange]) -> (u16, Vec<u32>) {
    let max_channels = configs.iter().map(|c| c.channels()).max().unwrap_or(0);

    let mut sample_rates: Vec<u32> = configs
        .iter()
        .flat_map(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;

            // Common sample rates
            [22050, 44100, 48000, 88200, 96000, 192000]
                .into_iter()
                .filter(move |&rate| rate >= min && rate <= max)
        })
        .collect();

    sample_rates.sort_unstable();
    sample_rates.dedup();

    (max_channels, sample_rates)
}
