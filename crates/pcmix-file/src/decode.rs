//! Audio file decoding
//!
//! Every decoder produces the same shape: interleaved f32 samples plus channel
//! count, sample rate and frame count. Channel-count policy (mono/stereo only)
//! belongs to the caller; this module reports whatever the file contains.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{FileError, FileResult};

// ═══════════════════════════════════════════════════════════════════════════════
// FORMAT DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Container formats accepted by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
}

impl AudioFormat {
    /// Case-insensitive extension lookup (`"WAV"`, `"wav"` and `"Wav"` all match)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "wav" => Some(Self::Wav),
            "mp3" => Some(Self::Mp3),
            "flac" => Some(Self::Flac),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Flac => "flac",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODED AUDIO
// ═══════════════════════════════════════════════════════════════════════════════

/// Fully decoded audio, resident in memory
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples (f32, normalized -1.0 to 1.0)
    pub samples: Vec<f32>,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of sample frames (samples per channel)
    pub frames: usize,
    /// Source container
    pub format: AudioFormat,
}

impl DecodedAudio {
    fn new(samples: Vec<f32>, channels: u16, sample_rate: u32, format: AudioFormat) -> Self {
        let frames = if channels == 0 {
            0
        } else {
            samples.len() / channels as usize
        };
        Self {
            samples,
            channels,
            sample_rate,
            frames,
            format,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

/// Decode a `.wav`, `.mp3` or `.flac` file into interleaved f32 PCM
pub fn decode<P: AsRef<Path>>(path: P) -> FileResult<DecodedAudio> {
    let path = path.as_ref();

    let format = AudioFormat::from_path(path).ok_or_else(|| {
        FileError::UnsupportedFormat(format!(
            "'{}', expected .wav, .flac or .mp3",
            path.display()
        ))
    })?;

    if !path.exists() {
        return Err(FileError::NotFound(path.display().to_string()));
    }

    let decoded = match format {
        AudioFormat::Wav => read_wav(path)?,
        AudioFormat::Mp3 | AudioFormat::Flac => read_compressed(path, format)?,
    };

    log::debug!(
        "Decoded '{}': {} ch, {} Hz, {} frames",
        path.display(),
        decoded.channels,
        decoded.sample_rate,
        decoded.frames
    );
    Ok(decoded)
}

// ═══════════════════════════════════════════════════════════════════════════════
// WAV READING (hound)
// ═══════════════════════════════════════════════════════════════════════════════

fn read_wav(path: &Path) -> FileResult<DecodedAudio> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(DecodedAudio::new(
        samples,
        spec.channels,
        spec.sample_rate,
        AudioFormat::Wav,
    ))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYMPHONIA READING (MP3, FLAC)
// ═══════════════════════════════════════════════════════════════════════════════

fn read_compressed(path: &Path, format: AudioFormat) -> FileResult<DecodedAudio> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(format.extension());

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| FileError::DecodeError(e.to_string()))?;

    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FileError::InvalidFile("No audio track found".to_string()))?;

    let track_id = track.id;
    let mut channels = track.codec_params.channels.map(|c| c.count() as u16);
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FileError::DecodeError(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(FileError::DecodeError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels.get_or_insert(spec.channels.count() as u16);
                sample_rate.get_or_insert(spec.rate);

                let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping undecodable packet in '{}': {}", path.display(), msg);
            }
            Err(e) => return Err(FileError::DecodeError(e.to_string())),
        }
    }

    let channels = channels
        .ok_or_else(|| FileError::InvalidFile("Unknown channel layout".to_string()))?;
    let sample_rate =
        sample_rate.ok_or_else(|| FileError::InvalidFile("Unknown sample rate".to_string()))?;

    Ok(DecodedAudio::new(samples, channels, sample_rate, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_wav(path: &Path, spec: hound::WavSpec, frames: &[Vec<f32>]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for frame in frames {
            for &s in frame {
                match spec.sample_format {
                    hound::SampleFormat::Float => writer.write_sample(s).unwrap(),
                    hound::SampleFormat::Int => {
                        writer.write_sample((s * 32767.0) as i16).unwrap()
                    }
                }
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_format_from_extension_is_case_insensitive() {
        assert_eq!(AudioFormat::from_extension("WAV"), Some(AudioFormat::Wav));
        assert_eq!(AudioFormat::from_extension("Mp3"), Some(AudioFormat::Mp3));
        assert_eq!(AudioFormat::from_extension("flac"), Some(AudioFormat::Flac));
        assert_eq!(AudioFormat::from_extension("ogg"), None);
        assert_eq!(AudioFormat::from_path(Path::new("a/b/c.wav.bak")), None);
        assert_eq!(AudioFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_decode_float_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.WAV");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        write_wav(
            &path,
            spec,
            &[vec![0.5, -0.5], vec![0.25, -0.25], vec![0.0, 1.0]],
        );

        let audio = decode(&path).unwrap();
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.frames, 3);
        assert_eq!(audio.format, AudioFormat::Wav);
        assert_eq!(audio.samples, vec![0.5, -0.5, 0.25, -0.25, 0.0, 1.0]);
    }

    #[test]
    fn test_decode_int_mono_wav_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        write_wav(&path, spec, &[vec![0.0], vec![0.5], vec![-1.0]]);

        let audio = decode(&path).unwrap();
        assert_eq!(audio.channels, 1);
        assert_eq!(audio.frames, 3);
        assert!((audio.samples[0]).abs() < 1e-4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-3);
        assert!((audio.samples[2] + 1.0).abs() < 1e-3);
        assert!((audio.duration() - 3.0 / 8000.0).abs() < 1e-9);
    }

    /// 64 frames of 16-bit stereo at 8 kHz in two blocks of 32.
    /// Left ramps from -16384 in steps of 512, right is its negation.
    fn ramp_flac() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data/ramp_stereo_8k.flac")
    }

    #[test]
    fn test_decode_flac() {
        let audio = decode(ramp_flac()).unwrap();
        assert_eq!(audio.format, AudioFormat::Flac);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.frames, 64);
        assert_eq!(audio.samples.len(), 128);
        assert!((audio.duration() - 64.0 / 8000.0).abs() < 1e-9);

        assert_eq!(&audio.samples[..4], &[-0.5, 0.5, -0.484375, 0.484375]);
        // First sample of the second block
        assert_eq!(audio.samples[64], 0.0);
        assert_eq!(audio.samples[65], 0.0);
        assert_eq!(audio.samples[126], 0.484375);
        assert_eq!(audio.samples[127], -0.484375);
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let err = decode("music.ogg").unwrap_err();
        assert!(matches!(err, FileError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let path = PathBuf::from("definitely/not/here.flac");
        let err = decode(&path).unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }
}
