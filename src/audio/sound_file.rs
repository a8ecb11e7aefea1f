//! Uncompressed sound files read in a single pass.
//!
//! The whole file is read with one bulk call straight into the buffer's
//! storage. Unlike the FFmpeg path, samples arrive normalised to [-1, 1).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::audio::AudioBuffer;
use crate::decode::AudioFileDecoder;
use crate::error::{DecodeError, Result};

/// Format of an opened sound file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundFileInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per channel
    pub frames: u64,
}

/// An open sound file that can hand over its samples as f32.
pub trait SoundFileReader {
    fn info(&self) -> SoundFileInfo;

    /// Fill `dst` with interleaved samples, returning how many were read.
    fn read_f32(&mut self, dst: &mut [f32]) -> usize;
}

/// RIFF/WAVE file opened through hound.
pub struct WavSoundFile {
    reader: hound::WavReader<BufReader<File>>,
}

impl WavSoundFile {
    pub fn open(path: &Path) -> Result<Self> {
        hound::WavReader::open(path)
            .map(|reader| Self { reader })
            .map_err(|err| {
                debug!("Failed to open audio file: {:?}", path);
                DecodeError::Open {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                }
            })
    }
}

impl SoundFileReader for WavSoundFile {
    fn info(&self) -> SoundFileInfo {
        let spec = self.reader.spec();
        SoundFileInfo {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frames: u64::from(self.reader.duration()),
        }
    }

    fn read_f32(&mut self, dst: &mut [f32]) -> usize {
        let spec = self.reader.spec();
        match spec.sample_format {
            hound::SampleFormat::Float => fill(dst, self.reader.samples::<f32>()),
            hound::SampleFormat::Int => {
                let bits = u32::from(spec.bits_per_sample.clamp(1, 32));
                let scale = 1.0 / (1u64 << (bits - 1)) as f32;
                let samples = self.reader.samples::<i32>().map(|s| s.map(|v| v as f32 * scale));
                fill(dst, samples)
            }
        }
    }
}

fn fill<I>(dst: &mut [f32], samples: I) -> usize
where
    I: Iterator<Item = hound::Result<f32>>,
{
    let mut read = 0;
    for (slot, sample) in dst.iter_mut().zip(samples) {
        match sample {
            Ok(value) => {
                *slot = value;
                read += 1;
            }
            Err(err) => {
                debug!("Sample read stopped after {} samples: {}", read, err);
                break;
            }
        }
    }
    read
}

/// Read every sample of an open sound file into a new buffer.
///
/// # Errors
///
/// Returns `DecodeError::IncompleteRead` if fewer samples arrive than the
/// file declares.
pub fn read_sound_file<R>(file: &mut R) -> Result<AudioBuffer>
where
    R: SoundFileReader + ?Sized,
{
    let info = file.info();
    let mut buffer = AudioBuffer::new(info.sample_rate, info.channels)?;

    let expected = usize::try_from(info.frames)
        .ok()
        .and_then(|frames| frames.checked_mul(usize::from(info.channels)))
        .ok_or(DecodeError::Allocation { requested: usize::MAX })?;

    let read = buffer.try_fill_with(expected, |dst| file.read_f32(dst))?;
    if read < expected {
        debug!("Failed to read all audio data: {} of {} samples", read, expected);
        return Err(DecodeError::IncompleteRead { expected, read });
    }
    buffer.finish()
}

/// Decoder for WAV files, read whole without a codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoundFileDecoder;

impl SoundFileDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        let mut file = WavSoundFile::open(path)?;
        let buffer = read_sound_file(&mut file)?;
        debug!("Read {} samples from {:?}", buffer.len(), path);
        Ok(buffer)
    }
}

impl AudioFileDecoder for SoundFileDecoder {
    fn name(&self) -> &'static str {
        "sound-file"
    }

    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("wav") || ext.eq_ignore_ascii_case("wave"))
            .unwrap_or(false)
    }

    fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        SoundFileDecoder::decode_file(self, path)
    }
}
