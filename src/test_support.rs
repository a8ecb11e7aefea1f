//! Fixture writers shared by the test modules.

use std::fs;
use std::path::Path;

/// Bytes per IMA ADPCM block in the fixtures
pub const IMA_BLOCK_ALIGN: usize = 256;
/// Frames each stereo 4-bit block decodes to: the header sample plus eight
/// per 4-byte word.
pub const IMA_BLOCK_FRAMES: usize = 1 + (IMA_BLOCK_ALIGN - 8) * 2 / 2;

/// Write a stereo 4-bit IMA ADPCM WAV of `blocks` blocks.
///
/// Each block starts every channel at `start` with step index 0 and codes
/// only zero nibbles, so every decoded frame equals `start`.
pub fn write_ima_adpcm_wav(path: &Path, sample_rate: u32, blocks: usize, start: [i16; 2]) {
    let channels: u16 = 2;
    let frames_per_block = IMA_BLOCK_FRAMES as u32;

    let mut data = Vec::with_capacity(blocks * IMA_BLOCK_ALIGN);
    for _ in 0..blocks {
        let block_start = data.len();
        for predictor in start {
            data.extend_from_slice(&predictor.to_le_bytes());
            data.extend_from_slice(&[0, 0]);
        }
        data.resize(block_start + IMA_BLOCK_ALIGN, 0);
    }

    let mut fmt = Vec::with_capacity(20);
    fmt.extend_from_slice(&0x0011u16.to_le_bytes());
    fmt.extend_from_slice(&channels.to_le_bytes());
    fmt.extend_from_slice(&sample_rate.to_le_bytes());
    let byte_rate = sample_rate * IMA_BLOCK_ALIGN as u32 / frames_per_block;
    fmt.extend_from_slice(&byte_rate.to_le_bytes());
    fmt.extend_from_slice(&(IMA_BLOCK_ALIGN as u16).to_le_bytes());
    fmt.extend_from_slice(&4u16.to_le_bytes());
    fmt.extend_from_slice(&2u16.to_le_bytes());
    fmt.extend_from_slice(&(frames_per_block as u16).to_le_bytes());

    let mut file = Vec::with_capacity(44 + data.len());
    file.extend_from_slice(b"RIFF");
    file.extend_from_slice(&((4 + 8 + fmt.len() + 8 + data.len()) as u32).to_le_bytes());
    file.extend_from_slice(b"WAVE");
    file.extend_from_slice(b"fmt ");
    file.extend_from_slice(&(fmt.len() as u32).to_le_bytes());
    file.extend_from_slice(&fmt);
    file.extend_from_slice(b"data");
    file.extend_from_slice(&(data.len() as u32).to_le_bytes());
    file.extend_from_slice(&data);

    fs::write(path, file).unwrap();
}
