pub mod backend;
pub mod codec;
#[cfg(feature = "device-cpal")]
pub mod device;
pub mod file;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioPlayback, AudioSource,
    FrameAssembler,
};
pub use codec::{decode_pcmu, PcmuPacketizer, PCMU_PAYLOAD_TYPE, PCMU_SAMPLE_RATE};
#[cfg(feature = "device-cpal")]
pub use device::{MicrophoneBackend, SpeakerPlayback};
pub use file::{AudioFile, FileBackend};
