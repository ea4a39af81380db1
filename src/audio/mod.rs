//! Audio resources, decoding and playback.
//!
//! Everything that can make noise funnels through the
//! [`PlaybackManager`](playback::PlaybackManager): decoded provider audio
//! and local synthesis utterances alike. No other component ever holds a
//! playback handle.

pub mod decode;
pub mod engine;
pub mod playback;

pub use decode::decode_audio;
pub use playback::{ActiveSource, Completion, PlaybackEngine, PlaybackManager, PlaybackResult};

/// Decoded PCM audio ready for an output device.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    /// Playback duration at the source sample rate.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / u64::from(self.sample_rate)
    }
}

/// Any form of audio the playback manager can start, stop and release
/// uniformly.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayableResource {
    /// Decoded audio buffer, played through the output device.
    Pcm(PcmAudio),
    /// One chunk of text for the local synthesis engine.
    Utterance { text: String, voice: String },
}
