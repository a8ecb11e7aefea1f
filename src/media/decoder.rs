//! Container/codec decoding using FFmpeg.
//! Output is interleaved PCM: swresample brings every decoded frame to
//! packed 16-bit samples, which are widened into the f32 `AudioBuffer`.
//! All unsafe FFmpeg code is isolated in this module.

use std::ffi::CString;
use std::path::Path;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg::codec;
use ffmpeg::format;
use ffmpeg::frame;
use ffmpeg::media;
use ffmpeg::software::resampling;
use ffmpeg::util::channel_layout::ChannelLayout;
use ffmpeg::util::error::{EAGAIN, ENOMEM};
use ffmpeg::util::format::sample::{self, Sample, Type as SampleType};
use ffmpeg::Packet;
use tracing::{debug, trace, warn};

use crate::audio::AudioBuffer;
use crate::config::DecoderConfig;
use crate::decode::{AudioFileDecoder, AudioStreamInfo};
use crate::error::{DecodeError, Result};
use crate::media::lock_manager;
use crate::media::packet::{decode_packets, PacketDecode, DEFAULT_BAD_PACKET_LIMIT};

/// Decoder for anything FFmpeg can demux: compressed audio, video
/// containers with an audio track, and so on.
#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    bad_packet_limit: u32,
}

impl Default for FfmpegDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self {
            bad_packet_limit: DEFAULT_BAD_PACKET_LIMIT,
        }
    }

    pub fn with_config(config: &DecoderConfig) -> Self {
        Self {
            bad_packet_limit: config.bad_packet_limit,
        }
    }

    pub fn bad_packet_limit(&self) -> u32 {
        self.bad_packet_limit
    }

    /// Decode the first audio stream of `path` into memory.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be opened or its streams cannot be read, has no audio stream or
    /// no usable decoder, or if too many packets cannot be decoded. A
    /// failure while closing the codec is only logged.
    pub fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        let registration = lock_manager::register()?;
        let mut input = open_input(path)?;

        let stream_index = first_audio_stream(input.streams().map(|s| s.parameters().medium()))
            .ok_or_else(|| {
                debug!("Failed to find an audio stream in file: {:?}", path);
                DecodeError::NoAudioStream { path: path.to_path_buf() }
            })?;
        let parameters = input
            .stream(stream_index)
            .map(|stream| stream.parameters())
            .ok_or_else(|| DecodeError::NoAudioStream { path: path.to_path_buf() })?;

        let codec_id = parameters.id();
        let codec = codec::decoder::find(codec_id).ok_or_else(|| {
            debug!("Audio stream has unsupported codec in file: {:?}", path);
            DecodeError::UnsupportedCodec {
                path: path.to_path_buf(),
                codec: codec_id.name().to_owned(),
            }
        })?;
        let codec_name = codec.description().to_owned();

        // Codec initialisation is serialised process-wide.
        let decoder = {
            let _guard = registration.lock();
            codec::context::Context::from_parameters(parameters)
                .and_then(|context| context.decoder().open_as(codec))
                .and_then(|opened| opened.audio())
                .map_err(|err| {
                    let code = i32::from(err);
                    debug!("Error opening audio codec: {} ({})", codec_name, code);
                    DecodeError::CodecOpen {
                        codec: codec_name.clone(),
                        code,
                    }
                })?
        };

        let info = AudioStreamInfo {
            index: stream_index,
            codec_name,
            sample_rate: decoder.rate(),
            channels: decoder.channels(),
        };
        debug!(
            "Decoding stream #{} of {:?}: {} at {} Hz, {} channels",
            info.index, path, info.codec_name, info.sample_rate, info.channels
        );
        let mut buffer = AudioBuffer::new(info.sample_rate, info.channels)?;

        let mut packet_decoder = FfmpegPacketDecoder::new(decoder, info.channels);
        let packets = input
            .packets()
            .map(|(stream, packet)| (stream.index(), EncodedPacket(packet)));
        let stats = decode_packets(
            &mut packet_decoder,
            packets,
            stream_index,
            self.bad_packet_limit,
            &mut buffer,
            path,
        )?;

        let mut tail = Vec::new();
        if let Err(err) = packet_decoder.close(&mut tail) {
            warn!("Error closing audio codec: {} ({})", info.codec_name, i32::from(err));
        }
        buffer.try_extend_pcm16(&tail)?;
        drop(input);

        debug!(
            "Decoded {} samples from {} packets ({} bad) in {:?}",
            buffer.len(),
            stats.packets,
            stats.bad_packets,
            path
        );
        buffer.finish()
    }
}

impl AudioFileDecoder for FfmpegDecoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn decode_file(&self, path: &Path) -> Result<AudioBuffer> {
        FfmpegDecoder::decode_file(self, path)
    }
}

/// Open a container and read its stream info (unsafe block).
/// The returned `Input` closes the container when dropped.
fn open_input(path: &Path) -> Result<format::context::Input> {
    let c_path = path_to_cstring(path).ok_or_else(|| {
        debug!("Failed to open audio file: {:?}", path);
        DecodeError::Open {
            path: path.to_path_buf(),
            reason: "path cannot be represented for FFmpeg".to_owned(),
        }
    })?;

    unsafe {
        let mut format_ctx: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();
        let ret = ffmpeg::ffi::avformat_open_input(
            &mut format_ctx,
            c_path.as_ptr(),
            ptr::null(),
            ptr::null_mut(),
        );
        if ret != 0 {
            debug!("Failed to open audio file: {:?}", path);
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                reason: ffmpeg::Error::from(ret).to_string(),
            });
        }

        let ret = ffmpeg::ffi::avformat_find_stream_info(format_ctx, ptr::null_mut());
        if ret < 0 {
            ffmpeg::ffi::avformat_close_input(&mut format_ctx);
            debug!("Failed to find stream information in file: {:?}", path);
            return Err(DecodeError::StreamProbe {
                path: path.to_path_buf(),
                code: ret,
            });
        }

        Ok(format::context::Input::wrap(format_ctx))
    }
}

/// FFmpeg takes the raw path bytes on Unix and UTF-8 everywhere else.
#[cfg(unix)]
fn path_to_cstring(path: &Path) -> Option<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).ok()
}

#[cfg(not(unix))]
fn path_to_cstring(path: &Path) -> Option<CString> {
    path.to_str().and_then(|s| CString::new(s).ok())
}

/// Index of the first audio stream, in stream order.
fn first_audio_stream<I>(media_types: I) -> Option<usize>
where
    I: IntoIterator<Item = media::Type>,
{
    media_types
        .into_iter()
        .position(|medium| medium == media::Type::Audio)
}

/// Demuxed packet viewed as its payload bytes.
struct EncodedPacket(Packet);

impl AsRef<[u8]> for EncodedPacket {
    fn as_ref(&self) -> &[u8] {
        self.0.data().unwrap_or(&[])
    }
}

/// Send/receive decoder driven one packet remainder at a time.
struct FfmpegPacketDecoder {
    decoder: codec::decoder::Audio,
    frame: frame::Audio,
    converter: Pcm16Converter,
}

impl FfmpegPacketDecoder {
    fn new(decoder: codec::decoder::Audio, channels: u16) -> Self {
        Self {
            decoder,
            frame: frame::Audio::empty(),
            converter: Pcm16Converter::new(channels),
        }
    }

    /// Pull every ready frame into `pcm`.
    /// Fails if the codec reports a decode error or a frame cannot be
    /// converted; the drain still runs to the end so no frame is left queued.
    fn receive_frames(&mut self, pcm: &mut Vec<i16>) -> std::result::Result<(), ffmpeg::Error> {
        let mut failure = None;
        loop {
            match self.decoder.receive_frame(&mut self.frame) {
                Ok(()) => {
                    if let Err(err) = self.converter.convert(&mut self.frame, pcm) {
                        failure.get_or_insert(err);
                    }
                }
                Err(err) if drained(&err) => break,
                Err(err) => {
                    failure.get_or_insert(err);
                    break;
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }

    /// Flush delayed frames into `pcm`; the codec context is freed on drop.
    fn close(mut self, pcm: &mut Vec<i16>) -> std::result::Result<(), ffmpeg::Error> {
        self.decoder.send_eof()?;
        self.receive_frames(pcm)
    }
}

impl PacketDecode for FfmpegPacketDecoder {
    fn decode(&mut self, input: &[u8], pcm: &mut Vec<i16>) -> i64 {
        let packet = Packet::copy(input);
        if let Err(err) = self.decoder.send_packet(&packet) {
            trace!("decoder rejected packet: {}", err);
            return 0;
        }
        if let Err(err) = self.receive_frames(pcm) {
            trace!("packet did not decode: {}", err);
            return 0;
        }
        i64::try_from(input.len()).unwrap_or(i64::MAX)
    }
}

/// `receive_frame` errors that only mean the codec has nothing more to give.
fn drained(err: &ffmpeg::Error) -> bool {
    matches!(err, ffmpeg::Error::Eof | ffmpeg::Error::Other { errno: EAGAIN })
}

const PCM16: Sample = Sample::I16(SampleType::Packed);

/// Turns decoded frames of any sample format into interleaved 16-bit PCM
/// through swresample. The resampler is keyed on the frames' own format,
/// rate and layout, and is rebuilt when that key changes mid-stream.
struct Pcm16Converter {
    channels: u16,
    resampler: Option<((Sample, u32, ChannelLayout), resampling::Context)>,
}

impl Pcm16Converter {
    fn new(channels: u16) -> Self {
        Self {
            channels,
            resampler: None,
        }
    }

    fn convert(&mut self, frame: &mut frame::Audio, pcm: &mut Vec<i16>) -> std::result::Result<(), ffmpeg::Error> {
        if frame.channels() != self.channels {
            return Err(ffmpeg::Error::InvalidData);
        }
        // swresample refuses frames whose layout differs from its own
        if frame.channel_layout().is_empty() {
            frame.set_channel_layout(ChannelLayout::default(i32::from(self.channels)));
        }

        let source = (frame.format(), frame.rate(), frame.channel_layout());
        let stale = self
            .resampler
            .as_ref()
            .map_or(true, |(current, _)| *current != source);
        if stale {
            let (format, rate, layout) = source;
            let context = resampling::Context::get(format, layout, rate, PCM16, layout, rate)?;
            self.resampler = Some((source, context));
        }
        let Some((_, resampler)) = self.resampler.as_mut() else {
            return Err(ffmpeg::Error::Bug);
        };

        let mut out = frame::Audio::empty();
        resampler.run(frame, &mut out)?;
        if out.samples() == 0 {
            return Ok(());
        }

        let needed = sample::Buffer::size(PCM16, self.channels, out.samples(), false);
        let bytes = out.data(0).get(..needed).ok_or(ffmpeg::Error::Bug)?;
        pcm.try_reserve(needed / 2)
            .map_err(|_| ffmpeg::Error::Other { errno: ENOMEM })?;
        pcm.extend(bytes.chunks_exact(2).map(|b| i16::from_ne_bytes([b[0], b[1]])));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_ima_adpcm_wav, IMA_BLOCK_FRAMES};

    #[test]
    fn test_first_audio_stream_wins() {
        use media::Type::{Audio, Data, Subtitle, Video};
        assert_eq!(first_audio_stream([Video, Subtitle, Audio, Audio]), Some(2));
        assert_eq!(first_audio_stream([Audio, Video]), Some(0));
        assert_eq!(first_audio_stream([Video, Data]), None);
        assert_eq!(first_audio_stream(Vec::new()), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_path_bytes_pass_through() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = b"/music/caf\xe9.flac";
        let path = Path::new(OsStr::from_bytes(raw));
        assert_eq!(path_to_cstring(path).unwrap().as_bytes(), raw);
        assert!(path_to_cstring(Path::new(OsStr::from_bytes(b"a\0b"))).is_none());
    }

    #[test]
    fn test_only_eagain_and_eof_end_a_drain() {
        assert!(drained(&ffmpeg::Error::Eof));
        assert!(drained(&ffmpeg::Error::Other { errno: EAGAIN }));
        assert!(!drained(&ffmpeg::Error::InvalidData));
        assert!(!drained(&ffmpeg::Error::Other { errno: ENOMEM }));
    }

    fn planar_stereo(left: &[f32], right: &[f32]) -> frame::Audio {
        let mut frame = frame::Audio::new(Sample::F32(SampleType::Planar), left.len(), ChannelLayout::STEREO);
        frame.set_rate(44100);
        frame.plane_mut::<f32>(0).copy_from_slice(left);
        frame.plane_mut::<f32>(1).copy_from_slice(right);
        frame
    }

    #[test]
    fn test_planar_frame_is_interleaved() {
        ffmpeg::init().unwrap();
        let mut frame = planar_stereo(&[0.5, -0.5, 0.25, 0.0], &[-1.0, 1.0, 0.0, 0.125]);

        let mut pcm = Vec::new();
        Pcm16Converter::new(2).convert(&mut frame, &mut pcm).unwrap();
        assert_eq!(pcm, vec![16384, -32768, -16384, 32767, 8192, 0, 0, 4096]);
    }

    #[test]
    fn test_every_frame_of_a_stream_is_converted() {
        ffmpeg::init().unwrap();
        let mut converter = Pcm16Converter::new(2);
        let mut pcm = Vec::new();
        for _ in 0..3 {
            let mut frame = planar_stereo(&[0.25; 64], &[-0.25; 64]);
            converter.convert(&mut frame, &mut pcm).unwrap();
        }
        assert_eq!(pcm.len(), 3 * 64 * 2);
        assert!(pcm.chunks_exact(2).all(|f| f == [8192, -8192]));
    }

    #[test]
    fn test_frame_with_wrong_channel_count_is_rejected() {
        ffmpeg::init().unwrap();
        let mut frame = frame::Audio::new(Sample::F32(SampleType::Planar), 8, ChannelLayout::MONO);
        frame.set_rate(44100);
        let mut pcm = Vec::new();
        assert!(Pcm16Converter::new(2).convert(&mut frame, &mut pcm).is_err());
        assert!(pcm.is_empty());
    }

    #[test]
    fn test_missing_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = FfmpegDecoder::new().decode_file(&dir.path().join("missing.mp3"));
        assert!(matches!(result, Err(DecodeError::Open { .. })));
    }

    #[test]
    fn test_decodes_pcm_wav_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..4000i32).map(|i| ((i * 37) % 20000 - 10000) as i16).collect();
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in &samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let buffer = FfmpegDecoder::new().decode_file(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 22050);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len() % 2, 0);
        let expected: Vec<f32> = samples.iter().map(|&s| f32::from(s)).collect();
        assert_eq!(buffer.samples(), expected.as_slice());
    }

    #[test]
    fn test_decodes_planar_adpcm_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adpcm.wav");
        write_ima_adpcm_wav(&path, 8000, 4, [1000, -1000]);

        // adpcm_ima_wav hands out planar s16 frames
        let buffer = FfmpegDecoder::new().decode_file(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.len(), 4 * IMA_BLOCK_FRAMES * 2);
        assert!(buffer.samples().chunks_exact(2).all(|f| f == [1000.0, -1000.0]));
    }

    #[test]
    fn test_config_sets_limit() {
        let config = DecoderConfig::default().with_bad_packet_limit(7);
        assert_eq!(FfmpegDecoder::with_config(&config).bad_packet_limit(), 7);
        assert_eq!(FfmpegDecoder::new().bad_packet_limit(), 100);
    }
}
