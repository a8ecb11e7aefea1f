//! Error type shared by every decoder in the crate.

use std::path::PathBuf;

/// Error type for decoding operations
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to open audio file {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("Failed to find stream information in file {path:?} ({code})")]
    StreamProbe { path: PathBuf, code: i32 },
    #[error("Failed to find an audio stream in file {path:?}")]
    NoAudioStream { path: PathBuf },
    #[error("Audio stream has unsupported codec {codec} in file {path:?}")]
    UnsupportedCodec { path: PathBuf, codec: String },
    #[error("Error opening audio codec: {codec} ({code})")]
    CodecOpen { codec: String, code: i32 },
    #[error("{bad_packets} bad packets, may be DRM or corruption in file {path:?}")]
    ExcessiveCorruption { path: PathBuf, bad_packets: u32 },
    #[error("Failed to read all audio data: expected {expected} samples, read {read}")]
    IncompleteRead { expected: usize, read: usize },
    #[error("Failed to grow audio buffer by {requested} samples")]
    Allocation { requested: usize },
    #[error("Invalid audio format: {sample_rate} Hz, {channels} channels")]
    InvalidFormat { sample_rate: u32, channels: u16 },
    #[error("Decoded {samples} samples, not a whole number of {channels}-channel frames")]
    MisalignedSamples { samples: usize, channels: u16 },
    #[error("FFmpeg init failed: {0}")]
    LibraryInit(#[from] ffmpeg_next::Error),
    #[error("Lock manager could not create its mutex")]
    LockManager,
    #[error("No decoder available for {path:?}")]
    NoDecoder { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
