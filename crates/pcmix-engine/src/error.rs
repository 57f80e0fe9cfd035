//! Engine error types

use thiserror::Error;

use pcmix_audio::AudioError;
use pcmix_file::FileError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("File name is empty")]
    EmptyFileName,

    #[error(transparent)]
    Decode(#[from] FileError),

    #[error("Invalid channels count = {0}")]
    InvalidChannels(u16),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Sound contains no samples")]
    EmptyData,

    #[error("Playback device error: {0}")]
    Device(#[from] AudioError),
}

pub type EngineResult<T> = Result<T, EngineError>;
