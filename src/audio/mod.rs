pub mod buffer;
pub mod sound_file;

pub use buffer::AudioBuffer;
pub use sound_file::{read_sound_file, SoundFileDecoder, SoundFileInfo, SoundFileReader, WavSoundFile};
