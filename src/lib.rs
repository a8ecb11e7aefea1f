//! Audio file decoding for key analysis.
//!
//! Files are decoded into an in-memory [`AudioBuffer`] of interleaved f32
//! samples with a fixed sample rate and channel count. Two backends are
//! available:
//!
//! - [`FfmpegDecoder`] demuxes and decodes anything FFmpeg understands,
//!   packet by packet, tolerating a bounded number of undecodable packets.
//! - [`SoundFileDecoder`] reads uncompressed WAV files in one bulk read.
//!
//! [`DecoderChain`] picks between them by file type and falls back from one
//! to the next.
//!
//! ```no_run
//! use keydecode::DecoderChain;
//! use std::path::Path;
//!
//! let buffer = DecoderChain::default().decode_file(Path::new("track.flac"))?;
//! println!("{} Hz, {} channels, {:?}", buffer.sample_rate(), buffer.channels(), buffer.duration());
//! # Ok::<(), keydecode::DecodeError>(())
//! ```

pub mod audio;
pub mod config;
pub mod decode;
pub mod error;
pub mod media;

#[cfg(test)]
mod test_support;

pub use audio::{AudioBuffer, SoundFileDecoder};
pub use config::{Backend, DecoderConfig};
pub use decode::{AudioFileDecoder, DecoderChain};
pub use error::{DecodeError, Result};
pub use media::FfmpegDecoder;
