//! Packet-level decode loop shared by every packet-oriented backend.
//!
//! A packet may decode into zero, one or several frames and need more than
//! one decode call. Samples from a packet are committed to the buffer only
//! once the whole packet has decoded, so an undecodable packet leaves no
//! trace in the output.

use std::path::Path;

use tracing::{debug, trace};

use crate::audio::AudioBuffer;
use crate::error::{DecodeError, Result};

/// Packets that may fail before a file is given up as corrupt or protected.
pub const DEFAULT_BAD_PACKET_LIMIT: u32 = 100;

/// One decode step against the front of a packet's remaining bytes.
pub trait PacketDecode {
    /// Decode from the start of `input`, leaving produced 16-bit PCM in
    /// `pcm` (which arrives empty). Returns the number of input bytes
    /// consumed; zero or negative means nothing usable came out.
    fn decode(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> i64;
}

/// Result of decoding one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    Decoded,
    Bad,
}

/// Counters for one decoded stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketStats {
    pub packets: u64,
    pub bad_packets: u32,
}

/// Decode a single packet into `buffer`.
///
/// The remaining bytes are re-decoded until they are used up or a decode
/// call consumes nothing, in which case the packet is reported as bad and
/// its samples are discarded.
pub fn decode_packet<D>(decoder: &mut D, data: &[u8], buffer: &mut AudioBuffer) -> Result<PacketOutcome>
where
    D: PacketDecode + ?Sized,
{
    let mut pending = data.to_vec();
    let mut staged: Vec<i16> = Vec::new();
    let mut pcm: Vec<i16> = Vec::new();

    while !pending.is_empty() {
        pcm.clear();
        let consumed = decoder.decode(&pending, &mut pcm);
        if consumed <= 0 {
            return Ok(PacketOutcome::Bad);
        }

        staged
            .try_reserve(pcm.len())
            .map_err(|_| DecodeError::Allocation { requested: pcm.len() })?;
        staged.extend_from_slice(&pcm);

        let consumed = usize::try_from(consumed).unwrap_or(usize::MAX);
        if consumed < pending.len() {
            // keep the unconsumed tail at the front for the next call
            pending.drain(..consumed);
        } else {
            pending.clear();
        }
    }

    buffer.try_extend_pcm16(&staged)?;
    Ok(PacketOutcome::Decoded)
}

/// Decode every packet belonging to `stream_index`, in order.
///
/// Packets of other streams are skipped. Each bad packet is counted; when
/// the count reaches `bad_packet_limit` the whole decode fails with
/// `DecodeError::ExcessiveCorruption`. A limit of zero behaves like one.
pub fn decode_packets<D, I, P>(
    decoder: &mut D,
    packets: I,
    stream_index: usize,
    bad_packet_limit: u32,
    buffer: &mut AudioBuffer,
    path: &Path,
) -> Result<PacketStats>
where
    D: PacketDecode + ?Sized,
    I: IntoIterator<Item = (usize, P)>,
    P: AsRef<[u8]>,
{
    let limit = bad_packet_limit.max(1);
    let mut stats = PacketStats::default();

    for (index, packet) in packets {
        if index != stream_index {
            continue;
        }
        stats.packets += 1;

        if decode_packet(decoder, packet.as_ref(), buffer)? == PacketOutcome::Bad {
            stats.bad_packets += 1;
            trace!("bad packet #{} in {:?}", stats.bad_packets, path);
            if stats.bad_packets >= limit {
                debug!(
                    "{} bad packets, may be DRM or corruption in file: {:?}",
                    stats.bad_packets, path
                );
                return Err(DecodeError::ExcessiveCorruption {
                    path: path.to_path_buf(),
                    bad_packets: stats.bad_packets,
                });
            }
        }
    }

    if stats.bad_packets > 0 {
        debug!("Skipped {} of {} packets in {:?}", stats.bad_packets, stats.packets, path);
    }
    Ok(stats)
}
