pub mod decoder;
pub mod lock_manager;
pub mod packet;

pub use decoder::FfmpegDecoder;
pub use lock_manager::{register, LockOp, LockRegistration};
pub use packet::{decode_packet, decode_packets, PacketDecode, PacketOutcome, PacketStats, DEFAULT_BAD_PACKET_LIMIT};
