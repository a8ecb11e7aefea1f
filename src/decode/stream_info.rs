//! Stream metadata extracted from media files.

/// The audio stream a decoder selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec_name: String,
    pub sample_rate: u32,
    pub channels: u16,
}
