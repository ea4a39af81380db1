//! Blocking WebSocket client for the streaming transcription endpoint.

use std::net::TcpStream;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};
use url::Url;

use crate::error::{AgentError, Result};

/// What the server had to say on one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsUpdate {
    /// The running transcript changed; this is the newest complete text.
    Transcript(String),
    /// The server marked the session complete.
    Done,
    /// Nothing available right now.
    Idle,
    /// The server closed the connection.
    Closed,
}

pub struct TranscriptionStream {
    ws: WebSocket<MaybeTlsStream<TcpStream>>,
}

impl TranscriptionStream {
    pub fn connect(endpoint: &str, api_key: &str) -> Result<Self> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| AgentError::Network(format!("invalid STT URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_format", "verbose_json")
            .append_pair("Authorization", api_key)
            .append_pair("temperature", "0.0");

        log::debug!("connecting to transcription stream");
        let (mut ws, response) = connect(url.as_str())
            .map_err(|e| AgentError::Network(format!("STT connection failed: {}", e)))?;
        log::info!("transcription stream connected, status {}", response.status());

        // Reads must not block the send loop; poll with WouldBlock instead.
        match ws.get_mut() {
            MaybeTlsStream::Plain(stream) => {
                stream.set_nonblocking(true)?;
            }
            MaybeTlsStream::NativeTls(stream) => {
                stream.get_mut().set_nonblocking(true)?;
            }
            _ => {}
        }

        Ok(Self { ws })
    }

    /// Send a block of s16le audio.
    pub fn send_audio(&mut self, audio_data: Vec<u8>) -> Result<()> {
        if audio_data.is_empty() {
            return Ok(());
        }
        self.ws
            .send(Message::Binary(audio_data))
            .map_err(|e| AgentError::Network(format!("STT send failed: {}", e)))
    }

    /// Mark end-of-stream so the server finalizes the transcript.
    pub fn finish(&mut self) -> Result<()> {
        let checkpoint = serde_json::json!({ "checkpoint_id": "final" });
        log::debug!("sending end-of-stream checkpoint");
        self.ws
            .send(Message::Text(checkpoint.to_string()))
            .map_err(|e| AgentError::Network(format!("STT end checkpoint failed: {}", e)))
    }

    /// Poll for one server update without blocking.
    pub fn poll(&mut self) -> Result<WsUpdate> {
        match self.ws.read() {
            Ok(Message::Text(text)) => Ok(parse_update(&text)),
            Ok(Message::Close(_)) => {
                log::debug!("server closed transcription stream");
                Ok(WsUpdate::Closed)
            }
            Ok(Message::Ping(data)) => {
                self.ws
                    .send(Message::Pong(data))
                    .map_err(|e| AgentError::Network(format!("pong failed: {}", e)))?;
                Ok(WsUpdate::Idle)
            }
            Ok(_) => Ok(WsUpdate::Idle),
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(WsUpdate::Idle)
            }
            Err(e) => Err(AgentError::Network(format!("STT read failed: {}", e))),
        }
    }

    pub fn close(&mut self) {
        if let Err(e) = self.ws.close(None) {
            log::debug!("transcription stream close: {}", e);
        }
    }
}

/// Extract the newest transcript (or completion marker) from one server
/// message. Segmented payloads are joined in order; a bare `text` field is
/// the fallback shape.
fn parse_update(raw: &str) -> WsUpdate {
    let json: serde_json::Value = match serde_json::from_str(raw) {
        Ok(json) => json,
        Err(_) => return WsUpdate::Idle,
    };

    if json.get("trace_id").and_then(|t| t.as_str()) == Some("final") {
        return WsUpdate::Done;
    }

    if let Some(segments) = json.get("segments").and_then(|s| s.as_array()) {
        let mut combined = String::new();
        for segment in segments {
            if let Some(text) = segment.get("text").and_then(|t| t.as_str()) {
                if !combined.is_empty() {
                    combined.push(' ');
                }
                combined.push_str(text.trim());
            }
        }
        if !combined.is_empty() {
            return WsUpdate::Transcript(combined);
        }
    }

    if let Some(text) = json.get("text").and_then(|t| t.as_str()) {
        if !text.trim().is_empty() {
            return WsUpdate::Transcript(text.trim().to_string());
        }
    }

    WsUpdate::Idle
}
