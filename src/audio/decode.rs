//! Format sniffing and decoding of provider audio bytes.
//!
//! Providers return WAV, MP3 or bare PCM depending on tier and mood; the
//! orchestrator never knows in advance. Bytes are sniffed by magic numbers
//! and decoded to mono f32, the one format the playback engine accepts.

use std::io::Cursor;

use crate::audio::PcmAudio;
use crate::error::{AgentError, Result};

/// Sample rate assumed for bare PCM bodies (s16le mono).
const RAW_PCM_RATE: u32 = 16_000;

/// Sniff `bytes` and decode them to mono PCM.
pub fn decode_audio(bytes: &[u8]) -> Result<PcmAudio> {
    if bytes.is_empty() {
        return Err(AgentError::Decode("empty audio body".to_string()));
    }

    if looks_like_wav(bytes) {
        return decode_wav(bytes);
    }
    if looks_like_mp3(bytes) {
        return decode_mp3(bytes);
    }

    log::debug!(
        "no WAV/MP3 signature in {} bytes, treating as raw s16le PCM",
        bytes.len()
    );
    decode_raw_pcm(bytes)
}

fn looks_like_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

fn looks_like_mp3(bytes: &[u8]) -> bool {
    if bytes.len() < 3 {
        return false;
    }
    if &bytes[0..3] == b"ID3" {
        return true;
    }
    // MPEG frame sync: 11 set bits.
    bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0
}

fn decode_wav(bytes: &[u8]) -> Result<PcmAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| AgentError::Decode(format!("WAV header: {}", e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AgentError::Decode(format!("WAV samples: {}", e)))?,
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| f32::from(v) / 32768.0))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| AgentError::Decode(format!("WAV samples: {}", e)))?,
        (hound::SampleFormat::Int, bits) => {
            let shift = 32 - u32::from(bits);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| (v << shift) as f32 / i32::MAX as f32))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| AgentError::Decode(format!("WAV samples: {}", e)))?
        }
        (format, bits) => {
            return Err(AgentError::Decode(format!(
                "unsupported WAV format: {:?} {} bit",
                format, bits
            )))
        }
    };

    Ok(PcmAudio {
        samples: downmix(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

fn decode_mp3(bytes: &[u8]) -> Result<PcmAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = 0u32;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = frame.sample_rate as u32;
                let channels = frame.channels.max(1);
                let frame_f32: Vec<f32> = frame
                    .data
                    .iter()
                    .map(|&s| f32::from(s) / 32768.0)
                    .collect();
                samples.extend(downmix(&frame_f32, channels));
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(AgentError::Decode(format!("MP3 decode: {}", e))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(AgentError::Decode("MP3 body contained no frames".to_string()));
    }

    Ok(PcmAudio {
        samples,
        sample_rate,
    })
}

fn decode_raw_pcm(bytes: &[u8]) -> Result<PcmAudio> {
    if bytes.len() < 2 {
        return Err(AgentError::Decode("PCM body too short".to_string()));
    }
    if bytes.len() % 2 != 0 {
        log::warn!("odd PCM body length {}, dropping trailing byte", bytes.len());
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample_i16 = i16::from_le_bytes([pair[0], pair[1]]);
            f32::from(sample_i16) / 32768.0
        })
        .collect();

    Ok(PcmAudio {
        samples,
        sample_rate: RAW_PCM_RATE,
    })
}

/// Average interleaved channels down to mono.
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn sniffs_and_decodes_wav() {
        let bytes = wav_bytes(&[0, 16384, -16384, 0], 22050, 1);
        let pcm = decode_audio(&bytes).unwrap();
        assert_eq!(pcm.sample_rate, 22050);
        assert_eq!(pcm.samples.len(), 4);
        assert!((pcm.samples[1] - 0.5).abs() < 0.001);
    }

    #[test]
    fn stereo_wav_is_downmixed() {
        let bytes = wav_bytes(&[16384, -16384, 8192, 8192], 44100, 2);
        let pcm = decode_audio(&bytes).unwrap();
        assert_eq!(pcm.samples.len(), 2);
        assert!(pcm.samples[0].abs() < 0.001);
        assert!((pcm.samples[1] - 0.25).abs() < 0.001);
    }

    #[test]
    fn unknown_bytes_fall_back_to_raw_pcm() {
        let bytes: Vec<u8> = vec![0x00, 0x40, 0x00, 0xC0]; // 16384, -16384
        let pcm = decode_audio(&bytes).unwrap();
        assert_eq!(pcm.sample_rate, RAW_PCM_RATE);
        assert_eq!(pcm.samples.len(), 2);
    }

    #[test]
    fn empty_body_is_a_decode_error() {
        assert!(matches!(decode_audio(&[]), Err(AgentError::Decode(_))));
    }

    #[test]
    fn garbage_mp3_is_a_decode_error() {
        // Valid sync word, nothing behind it.
        let bytes = vec![0xFF, 0xFB, 0x00];
        assert!(decode_audio(&bytes).is_err());
    }
}
