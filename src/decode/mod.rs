//! Decoder selection.
//!
//! Each backend implements `AudioFileDecoder`; a `DecoderChain` picks the
//! backends that claim a file and falls back through them in order.

pub mod stream_info;

pub use stream_info::AudioStreamInfo;

use std::path::Path;

use tracing::{debug, error, warn};

use crate::audio::{AudioBuffer, SoundFileDecoder};
use crate::config::{Backend, DecoderConfig};
use crate::error::{DecodeError, Result};
use crate::media::FfmpegDecoder;

/// A backend that turns a file into an `AudioBuffer`.
pub trait AudioFileDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this backend should be tried for `path`
    fn supports(&self, path: &Path) -> bool;

    fn decode_file(&self, path: &Path) -> Result<AudioBuffer>;
}

/// Ordered list of backends tried one after another.
pub struct DecoderChain {
    decoders: Vec<Box<dyn AudioFileDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn AudioFileDecoder>>) -> Self {
        Self { decoders }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        let decoders = config
            .backends
            .iter()
            .map(|backend| -> Box<dyn AudioFileDecoder> {
                match backend {
                    Backend::SoundFile => Box::new(SoundFileDecoder::new()),
                    Backend::Ffmpeg => Box::new(FfmpegDecoder::with_config(config)),
                }
            })
            .collect();
        Self::new(decoders)
    }

    /// Decode `path` with the first backend that succeeds.
    ///
    /// # Errors
    ///
    /// Returns the last backend's error if all of them fail, or
    /// `DecodeError::NoDecoder` if none supports the file.
    pub fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        let mut last_error = None;
        for decoder in self.decoders.iter().filter(|d| d.supports(path)) {
            match decoder.decode_file(path) {
                Ok(buffer) => {
                    debug!("Decoded {:?} with {}", path, decoder.name());
                    return Ok(buffer);
                }
                Err(err) => {
                    warn!("{} could not decode {:?}: {}", decoder.name(), path, err);
                    last_error = Some(err);
                }
            }
        }
        let err = last_error.unwrap_or_else(|| DecodeError::NoDecoder {
            path: path.to_path_buf(),
        });
        error!("Could not decode {:?}: {}", path, err);
        Err(err)
    }
}

impl Default for DecoderChain {
    fn default() -> Self {
        Self::from_config(&DecoderConfig::default())
    }
}
