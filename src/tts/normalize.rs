//! Normalization of remote speech-provider responses.
//!
//! Providers answer in three shapes: raw binary audio, a JSON envelope
//! pointing at audio (URL or inline base64), or a JSON envelope with no
//! audio at all. Every remote tier funnels its HTTP response through
//! [`from_http`] so the precedence rules live in exactly one place.

use std::io::Read;

use base64::prelude::{Engine, BASE64_STANDARD};
use flate2::read::ZlibDecoder;
use log::{debug, warn};

use crate::audio::{decode_audio, PlayableResource};

/// Responses larger than this are treated as malformed.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

/// Header some backends attach so the client can show the reply text even
/// when synthesis happened (or failed) server-side.
pub const RESPONSE_TEXT_HEADER: &str = "x-response-text";

/// What one provider attempt produced.
pub enum TierOutcome {
    /// Decoded PCM, ready for the playback manager.
    Audio(PlayableResource),
    /// The provider settled the reply text but produced no audio. The
    /// chain skips straight to local synthesis with this text.
    TextOnly(String),
    /// Audio absent without any provider error. Advance to the next tier.
    SoftFailure(String),
    /// The provider reported an error or answered with something
    /// unusable. Advance to the next tier.
    HardFailure(String),
}

impl TierOutcome {
    pub fn describe(&self) -> String {
        match self {
            TierOutcome::Audio(_) => "audio".into(),
            TierOutcome::TextOnly(_) => "text only".into(),
            TierOutcome::SoftFailure(reason) => format!("soft failure: {reason}"),
            TierOutcome::HardFailure(reason) => format!("hard failure: {reason}"),
        }
    }
}

/// Issue a JSON POST and normalize whatever comes back.
///
/// HTTP 401 and 405 mean the tier is misconfigured for this deployment
/// (bad credential, endpoint not provisioned) and are never retried.
pub fn send_for_audio(
    provider: &'static str,
    agent: &ureq::Agent,
    request: ureq::Request,
    body: serde_json::Value,
) -> TierOutcome {
    match request.send_json(body) {
        Ok(response) => from_http(provider, agent, response),
        Err(ureq::Error::Status(401, _)) => {
            TierOutcome::HardFailure("credential rejected (401)".into())
        }
        Err(ureq::Error::Status(405, _)) => {
            TierOutcome::HardFailure("endpoint does not accept synthesis requests (405)".into())
        }
        Err(ureq::Error::Status(code, response)) => {
            let detail = response.into_string().unwrap_or_default();
            TierOutcome::HardFailure(format!("status {}: {}", code, truncate(&detail)))
        }
        Err(transport) => TierOutcome::SoftFailure(format!("transport: {transport}")),
    }
}

/// Read out an HTTP response and apply the normalization precedence.
pub fn from_http(
    provider: &'static str,
    agent: &ureq::Agent,
    response: ureq::Response,
) -> TierOutcome {
    let content_type = response.content_type().to_ascii_lowercase();
    let header_text = response
        .header(RESPONSE_TEXT_HEADER)
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty());
    let mut body = Vec::new();
    if let Err(err) = response
        .into_reader()
        .take(MAX_BODY_BYTES)
        .read_to_end(&mut body)
    {
        return TierOutcome::SoftFailure(format!("reading body: {err}"));
    }
    normalize(
        provider,
        agent,
        &RawResponse {
            content_type,
            header_text,
            body,
        },
    )
}

/// A response reduced to the parts normalization cares about. Split out
/// from the HTTP layer so the precedence rules are testable without a
/// provider on the wire.
pub struct RawResponse {
    pub content_type: String,
    pub header_text: Option<String>,
    pub body: Vec<u8>,
}

pub fn normalize(provider: &'static str, agent: &ureq::Agent, raw: &RawResponse) -> TierOutcome {
    if raw.content_type.starts_with("audio/") {
        debug!("{provider}: binary audio body ({} bytes)", raw.body.len());
        return decoded(provider, &raw.body);
    }
    if !raw.content_type.contains("json") {
        return TierOutcome::HardFailure(format!(
            "unsupported content type {:?}",
            raw.content_type
        ));
    }
    let value: serde_json::Value = match serde_json::from_slice(&raw.body) {
        Ok(v) => v,
        Err(err) => return TierOutcome::HardFailure(format!("malformed JSON body: {err}")),
    };
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return TierOutcome::HardFailure(format!("provider error: {}", truncate(error)));
    }
    if let Some(url) = value
        .get("audio_url")
        .or_else(|| value.get("url"))
        .and_then(|v| v.as_str())
    {
        debug!("{provider}: fetching audio from returned url");
        return fetch_audio(provider, agent, url);
    }
    if let Some(encoded) = value.get("audio").and_then(|v| v.as_str()) {
        let bytes = match BASE64_STANDARD.decode(encoded) {
            Ok(b) => b,
            Err(err) => {
                return TierOutcome::HardFailure(format!("inline audio is not base64: {err}"))
            }
        };
        let compressed = value
            .get("compressed")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let bytes = if compressed {
            match inflate(&bytes) {
                Ok(b) => b,
                Err(err) => {
                    return TierOutcome::HardFailure(format!("inflating inline audio: {err}"))
                }
            }
        } else {
            bytes
        };
        return decoded(provider, &bytes);
    }
    // No audio-bearing field. Only a success when the reply text is
    // explicitly confirmed; otherwise the next tier gets its turn.
    let body_text = value
        .get("response")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .filter(|t| !t.trim().is_empty());
    match raw.header_text.clone().or(body_text) {
        Some(text) => {
            warn!("{provider}: text delivered, audio unavailable");
            TierOutcome::TextOnly(text)
        }
        None => TierOutcome::SoftFailure("JSON response carried no audio".into()),
    }
}

fn fetch_audio(provider: &'static str, agent: &ureq::Agent, url: &str) -> TierOutcome {
    match agent.get(url).call() {
        Ok(response) => {
            let mut bytes = Vec::new();
            match response
                .into_reader()
                .take(MAX_BODY_BYTES)
                .read_to_end(&mut bytes)
            {
                Ok(_) => decoded(provider, &bytes),
                Err(err) => TierOutcome::HardFailure(format!("reading audio url body: {err}")),
            }
        }
        Err(err) => TierOutcome::HardFailure(format!("fetching audio url: {err}")),
    }
}

fn decoded(provider: &'static str, bytes: &[u8]) -> TierOutcome {
    if bytes.is_empty() {
        return TierOutcome::SoftFailure("empty audio body".into());
    }
    match decode_audio(bytes) {
        Ok(pcm) => TierOutcome::Audio(PlayableResource::Pcm(pcm)),
        Err(err) => TierOutcome::HardFailure(format!("{provider} audio did not decode: {err}")),
    }
}

fn inflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    ZlibDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 200;
    if s.len() <= LIMIT {
        s.to_string()
    } else {
        let mut end = LIMIT;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn agent() -> ureq::Agent {
        ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(2))
            .build()
    }

    fn wav_bytes() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..160 {
                writer.write_sample((i * 50) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn json_raw(value: serde_json::Value) -> RawResponse {
        RawResponse {
            content_type: "application/json".into(),
            header_text: None,
            body: serde_json::to_vec(&value).unwrap(),
        }
    }

    #[test]
    fn binary_audio_body_decodes() {
        let raw = RawResponse {
            content_type: "audio/wav".into(),
            header_text: None,
            body: wav_bytes(),
        };
        match normalize("test", &agent(), &raw) {
            TierOutcome::Audio(PlayableResource::Pcm(pcm)) => {
                assert_eq!(pcm.sample_rate, 16_000);
                assert_eq!(pcm.samples.len(), 160);
            }
            other => panic!("expected audio, got {}", other.describe()),
        }
    }

    #[test]
    fn error_field_wins_over_audio() {
        let raw = json_raw(serde_json::json!({
            "error": "synthesis backend down",
            "audio": BASE64_STANDARD.encode(wav_bytes()),
        }));
        match normalize("test", &agent(), &raw) {
            TierOutcome::HardFailure(reason) => assert!(reason.contains("backend down")),
            other => panic!("expected hard failure, got {}", other.describe()),
        }
    }

    #[test]
    fn inline_base64_audio_decodes() {
        let raw = json_raw(serde_json::json!({
            "audio": BASE64_STANDARD.encode(wav_bytes()),
        }));
        assert!(matches!(
            normalize("test", &agent(), &raw),
            TierOutcome::Audio(_)
        ));
    }

    #[test]
    fn compressed_inline_audio_is_inflated_first() {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&wav_bytes()).unwrap();
        let deflated = encoder.finish().unwrap();
        let raw = json_raw(serde_json::json!({
            "audio": BASE64_STANDARD.encode(deflated),
            "compressed": true,
        }));
        assert!(matches!(
            normalize("test", &agent(), &raw),
            TierOutcome::Audio(_)
        ));
    }

    #[test]
    fn missing_audio_with_confirmed_text_is_text_only() {
        let raw = json_raw(serde_json::json!({ "response": "the reply text" }));
        match normalize("test", &agent(), &raw) {
            TierOutcome::TextOnly(text) => assert_eq!(text, "the reply text"),
            other => panic!("expected text only, got {}", other.describe()),
        }
    }

    #[test]
    fn header_text_confirms_even_without_body_field() {
        let raw = RawResponse {
            content_type: "application/json".into(),
            header_text: Some("from the header".into()),
            body: b"{}".to_vec(),
        };
        match normalize("test", &agent(), &raw) {
            TierOutcome::TextOnly(text) => assert_eq!(text, "from the header"),
            other => panic!("expected text only, got {}", other.describe()),
        }
    }

    #[test]
    fn missing_audio_without_text_is_soft_failure() {
        let raw = json_raw(serde_json::json!({ "status": "queued" }));
        assert!(matches!(
            normalize("test", &agent(), &raw),
            TierOutcome::SoftFailure(_)
        ));
    }

    #[test]
    fn unexpected_content_type_is_hard_failure() {
        let raw = RawResponse {
            content_type: "text/html".into(),
            header_text: None,
            body: b"<html>gateway error</html>".to_vec(),
        };
        assert!(matches!(
            normalize("test", &agent(), &raw),
            TierOutcome::HardFailure(_)
        ));
    }

    #[test]
    fn audio_url_is_fetched() {
        use std::io::{Read as _, Write as _};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let body = wav_bytes();
        let served = body.clone();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf);
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: audio/wav\r\nContent-Length: {}\r\n\r\n",
                served.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&served).unwrap();
        });

        let raw = json_raw(serde_json::json!({
            "audio_url": format!("http://{addr}/clip.wav"),
        }));
        let outcome = normalize("test", &agent(), &raw);
        server.join().unwrap();
        assert!(matches!(outcome, TierOutcome::Audio(_)));
    }
}
