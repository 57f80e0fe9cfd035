//! pcmix-play: play one audio file through the mixer
//!
//! Usage:
//!   pcmix-play tone.wav                     - play once, wait for the end
//!   pcmix-play loop.flac --loop-for 5       - loop for five seconds, then stop
//!   pcmix-play voice.mp3 --pitch 1.5 --pan -0.5
//!   pcmix-play --list-devices               - show output devices
//!
//! Set RUST_LOG=info (or debug) for engine logging.

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::Parser;

use pcmix_engine::{AudioConfig, Mixer, MixerConfig, PlayParams};

/// Longest a stop fade can take, with headroom
const FADE_TIMEOUT: Duration = Duration::from_secs(1);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "pcmix-play", about = "Play an audio file through the pcmix mixer")]
struct Cli {
    /// Audio file (.wav, .mp3 or .flac)
    #[arg(required_unless_present = "list_devices")]
    file: Option<PathBuf>,

    /// Voice volume
    #[arg(long, default_value_t = 1.0)]
    volume: f32,

    /// Playback speed ratio
    #[arg(long, default_value_t = 1.0)]
    pitch: f32,

    /// Stereo balance, -1.0 to 1.0
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pan: f32,

    /// Play range start in seconds
    #[arg(long, default_value_t = 0.0)]
    start: f32,

    /// Play range end in seconds
    #[arg(long)]
    end: Option<f32>,

    /// Loop the range for this many seconds
    #[arg(long, value_name = "SECS")]
    loop_for: Option<f64>,

    /// Master volume
    #[arg(long, default_value_t = 1.0)]
    master: f32,

    /// Output device name (default device if omitted)
    #[arg(short, long)]
    device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }
    let Some(file) = cli.file.clone() else {
        bail!("no input file given");
    };

    let config = MixerConfig {
        output: AudioConfig {
            device_name: cli.device.clone(),
            ..AudioConfig::default()
        },
        ..MixerConfig::default()
    };
    let mixer = Mixer::new(config);
    mixer
        .start_output()
        .context("Failed to open playback device")?;
    if let Some(info) = mixer.output_info() {
        println!(
            "Output: {} ({} ch @ {} Hz)",
            info.device_name, info.channels, info.sample_rate
        );
    }

    let sound = mixer
        .try_create_sound_from_file(&file)
        .with_context(|| format!("Cannot load '{}'", file.display()))?;
    println!(
        "Loaded {}: {:?}, {} frames @ {} Hz ({:.2}s)",
        file.display(),
        sound.channels(),
        sound.frames(),
        sound.sample_rate(),
        sound.duration()
    );

    mixer.set_master_volume(cli.master);

    let mut params = PlayParams::new()
        .volume(cli.volume)
        .pitch(cli.pitch)
        .pan(cli.pan)
        .start_at(cli.start);
    params.end = cli.end;

    let handle = match cli.loop_for {
        Some(_) => mixer.play_loop(&sound, params),
        None => mixer.play(&sound, params),
    };
    if handle.is_null() {
        bail!("Sound is too short to play");
    }

    match cli.loop_for {
        Some(seconds) => {
            let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
            thread::sleep(Duration::from_secs_f64(seconds));
            mixer.stop(handle);
        }
        None => {
            while mixer.is_playing(handle) {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    let fade_started = Instant::now();
    while mixer.active_voice_count() > 0 && fade_started.elapsed() < FADE_TIMEOUT {
        thread::sleep(POLL_INTERVAL);
    }

    print_stats(&mixer);
    drop(sound);
    mixer.shutdown();
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = pcmix_audio::list_output_devices().context("Failed to enumerate devices")?;
    if devices.is_empty() {
        println!("No output devices found");
        return Ok(());
    }

    for device in devices {
        println!(
            "{}{} - {} ch, rates {:?}{}",
            if device.is_default { "* " } else { "  " },
            device.name,
            device.output_channels,
            device.sample_rates,
            if device.supports_mixer_format {
                ""
            } else {
                " (no f32 @ 48 kHz)"
            }
        );
    }
    Ok(())
}

fn print_stats(mixer: &Mixer) {
    println!("Sounds loaded:   {}", mixer.total_sound_count());
    println!("Memory used:     {} bytes", mixer.memory_used());
    println!("Samples played:  {}", mixer.total_samples_played());
    println!("Time played:     {:.3}s", mixer.total_time_played());
    println!("Output rate:     {} Hz", mixer.output_sample_rate());
    log::debug!("Playing voices at exit: {}", mixer.playing_sound_count());
}
