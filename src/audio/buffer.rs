//! Decoded audio held in memory for analysis.
//! Samples are interleaved PCM f32 (L, R, L, R, ...).

use std::time::Duration;

use crate::error::{DecodeError, Result};

/// Audio buffer containing every decoded sample of one file.
///
/// Sample rate and channel count are fixed when the buffer is created and
/// samples can only be appended, so a buffer never disagrees with its own
/// format.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Create an empty buffer for the given format.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::InvalidFormat` if either value is zero.
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        if sample_rate == 0 || channels == 0 {
            return Err(DecodeError::InvalidFormat { sample_rate, channels });
        }
        Ok(Self {
            samples: Vec::new(),
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Total number of samples across all channels
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of complete frames (one sample per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Append 16-bit PCM, widening each value to f32 without rescaling.
    pub fn try_extend_pcm16(&mut self, pcm: &[i16]) -> Result<()> {
        self.reserve(pcm.len())?;
        self.samples.extend(pcm.iter().map(|&s| f32::from(s)));
        Ok(())
    }

    /// Append float samples as they are.
    pub fn try_extend(&mut self, samples: &[f32]) -> Result<()> {
        self.reserve(samples.len())?;
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    /// Grow the buffer by exactly `count` samples and let `fill` write them
    /// in place. `fill` returns how many samples it wrote; anything past
    /// that is discarded again, so the returned count is what was kept.
    pub fn try_fill_with<F>(&mut self, count: usize, fill: F) -> Result<usize>
    where
        F: FnOnce(&mut [f32]) -> usize,
    {
        self.samples
            .try_reserve_exact(count)
            .map_err(|_| DecodeError::Allocation { requested: count })?;
        let start = self.samples.len();
        self.samples.resize(start + count, 0.0);
        let written = fill(&mut self.samples[start..]).min(count);
        self.samples.truncate(start + written);
        Ok(written)
    }

    /// Check the buffer holds whole frames and hand it over.
    pub fn finish(self) -> Result<Self> {
        if self.samples.len() % self.channels as usize != 0 {
            return Err(DecodeError::MisalignedSamples {
                samples: self.samples.len(),
                channels: self.channels,
            });
        }
        Ok(self)
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.samples
            .try_reserve(additional)
            .map_err(|_| DecodeError::Allocation { requested: additional })
    }
}
