//! Decoder configuration.

use crate::media::packet::DEFAULT_BAD_PACKET_LIMIT;

/// A decoding backend that can be placed in a `DecoderChain`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Uncompressed sound files read in one pass
    SoundFile,
    /// Anything FFmpeg can demux and decode
    Ffmpeg,
}

/// Settings shared by the decoders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Undecodable packets tolerated in one file before giving up.
    ///
    /// Default: 100. Zero is treated as one.
    pub bad_packet_limit: u32,

    /// Order in which backends are tried.
    ///
    /// Default: sound file first, then FFmpeg.
    pub backends: Vec<Backend>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            bad_packet_limit: DEFAULT_BAD_PACKET_LIMIT,
            backends: vec![Backend::SoundFile, Backend::Ffmpeg],
        }
    }
}

impl DecoderConfig {
    pub fn with_bad_packet_limit(mut self, limit: u32) -> Self {
        self.bad_packet_limit = limit;
        self
    }

    pub fn with_backends(mut self, backends: Vec<Backend>) -> Self {
        self.backends = backends;
        self
    }
}
