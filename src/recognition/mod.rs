//! Continuous speech capture: microphone in, finalized transcript out.
//!
//! The controller drives one capture session at a time. Only finalized
//! recognition results are kept, each overwriting the previous one; when
//! the session ends the buffered transcript is handed off exactly once.

pub mod capture;
pub mod ws;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capability::Capabilities;
use crate::error::{AgentError, RecognitionErrorKind, Result};
use crate::recognition::ws::{TranscriptionStream, WsUpdate};

/// Events raised by a capture session.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A finalized result. Overwrites any previously buffered transcript.
    Final(String),
    /// The session failed.
    Error(RecognitionErrorKind),
    /// The session ended; the buffered transcript (if any) is ready.
    Ended,
}

/// Seam over the capture machinery so the controller and coordinator can be
/// exercised without a microphone.
pub trait SpeechRecognizer: Send {
    /// Begin a capture session. Events arrive on the returned channel until
    /// `Ended` or `Error`.
    fn start(&mut self) -> Result<Receiver<CaptureEvent>>;

    /// Request the session to end. The session finalizes and emits `Ended`.
    fn stop(&mut self);
}

/// How long to wait for the final transcript after end-of-stream.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Production recognizer: cpal microphone capture streamed over a blocking
/// WebSocket to the transcription endpoint.
pub struct StreamingRecognizer {
    endpoint: String,
    api_key: String,
    stop: Option<Arc<AtomicBool>>,
}

impl StreamingRecognizer {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            endpoint,
            api_key,
            stop: None,
        }
    }
}

impl SpeechRecognizer for StreamingRecognizer {
    fn start(&mut self) -> Result<Receiver<CaptureEvent>> {
        let stop = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = unbounded();
        let (audio_tx, audio_rx) = bounded::<Vec<u8>>(64);

        let capture_stop = Arc::clone(&stop);
        let capture_events = event_tx.clone();
        thread::spawn(move || {
            if let Err(e) = capture::run_capture(capture_stop, audio_tx) {
                let kind = match e {
                    AgentError::Recognition(kind) => kind,
                    other => RecognitionErrorKind::Other(other.to_string()),
                };
                let _ = capture_events.send(CaptureEvent::Error(kind));
            }
        });

        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        let worker_stop = Arc::clone(&stop);
        thread::spawn(move || {
            stream_worker(&endpoint, &api_key, &worker_stop, &audio_rx, &event_tx);
        });

        self.stop = Some(stop);
        Ok(event_rx)
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.store(true, Ordering::Release);
        }
    }
}

/// Raises the shared stop flag when dropped. The capture thread only exits
/// once the flag is set, so every way out of the stream worker must raise
/// it or the input stream stays open for the process lifetime.
struct RaiseOnExit(Arc<AtomicBool>);

impl Drop for RaiseOnExit {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Forward captured audio to the transcription stream and relay transcript
/// updates as finalized results.
fn stream_worker(
    endpoint: &str,
    api_key: &str,
    stop: &Arc<AtomicBool>,
    audio_rx: &Receiver<Vec<u8>>,
    events: &Sender<CaptureEvent>,
) {
    let _wind_down = RaiseOnExit(Arc::clone(stop));

    let mut ws = match TranscriptionStream::connect(endpoint, api_key) {
        Ok(ws) => ws,
        Err(e) => {
            log::error!("transcription connect failed: {}", e);
            let _ = events.send(CaptureEvent::Error(RecognitionErrorKind::Network));
            return;
        }
    };

    let mut transcript = String::new();

    while !stop.load(Ordering::Acquire) {
        match audio_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(bytes) => {
                if let Err(e) = ws.send_audio(bytes) {
                    log::error!("audio send failed: {}", e);
                    let _ = events.send(CaptureEvent::Error(RecognitionErrorKind::Network));
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }

        loop {
            match ws.poll() {
                Ok(WsUpdate::Transcript(text)) => {
                    transcript = text.clone();
                    let _ = events.send(CaptureEvent::Final(text));
                }
                Ok(WsUpdate::Idle) => break,
                Ok(WsUpdate::Done) => {}
                Ok(WsUpdate::Closed) => {
                    // Server gave up on us. With nothing transcribed this is
                    // the no-speech case; otherwise the session just ended.
                    if transcript.is_empty() {
                        let _ = events.send(CaptureEvent::Error(RecognitionErrorKind::NoSpeech));
                    } else {
                        let _ = events.send(CaptureEvent::Ended);
                    }
                    return;
                }
                Err(e) => {
                    log::error!("transcription stream failed: {}", e);
                    let _ = events.send(CaptureEvent::Error(RecognitionErrorKind::Network));
                    return;
                }
            }
        }
    }

    // Intentional stop: finalize and collect the last transcript.
    if let Err(e) = ws.finish() {
        log::warn!("end-of-stream checkpoint failed: {}", e);
    }

    let deadline = Instant::now() + FINALIZE_TIMEOUT;
    while Instant::now() < deadline {
        match ws.poll() {
            Ok(WsUpdate::Transcript(text)) => {
                let _ = events.send(CaptureEvent::Final(text));
            }
            Ok(WsUpdate::Done) | Ok(WsUpdate::Closed) => break,
            Ok(WsUpdate::Idle) => thread::sleep(Duration::from_millis(100)),
            Err(e) => {
                log::warn!("error while finalizing transcript: {}", e);
                break;
            }
        }
    }

    ws.close();
    let _ = events.send(CaptureEvent::Ended);
}

/// Drives a continuous capture session and buffers its last finalized
/// transcript for a single hand-off.
pub struct RecognitionController {
    recognizer: Box<dyn SpeechRecognizer>,
    buffer: String,
    active: bool,
    stop_requested: bool,
}

impl RecognitionController {
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            buffer: String::new(),
            active: false,
            stop_requested: false,
        }
    }

    /// Begin a capture session. Fails when capture is unsupported; the
    /// coordinator guards against re-entry but the controller checks too.
    pub fn start(&mut self, caps: &Capabilities) -> Result<Receiver<CaptureEvent>> {
        if !caps.capture {
            return Err(AgentError::CapabilityUnavailable(
                "speech capture is not available in this environment".to_string(),
            ));
        }
        if self.active {
            return Err(AgentError::Recognition(RecognitionErrorKind::Other(
                "capture session already active".to_string(),
            )));
        }

        self.buffer.clear();
        self.stop_requested = false;
        let rx = self.recognizer.start()?;
        self.active = true;
        log::info!("capture session started");
        Ok(rx)
    }

    /// Request the session to end. The hand-off happens when `Ended`
    /// arrives and the coordinator takes the transcript.
    pub fn stop(&mut self) {
        if self.active {
            self.stop_requested = true;
            self.recognizer.stop();
            log::info!("capture session stop requested");
        }
    }

    /// Fold one capture event into the buffered state.
    pub fn observe(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::Final(text) => {
                // Continuous mode: each finalized result replaces the last.
                self.buffer = text.clone();
            }
            CaptureEvent::Error(_) | CaptureEvent::Ended => {
                self.active = false;
            }
        }
    }

    /// Whether the most recent stop was requested by the user, making an
    /// `aborted` recognition error expected rather than user-visible.
    pub fn stop_was_intentional(&self) -> bool {
        self.stop_requested
    }

    /// Take the buffered transcript for hand-off. Clears the buffer so the
    /// hand-off can only happen once; empty or whitespace-only buffers
    /// yield nothing.
    pub fn take_transcript(&mut self) -> Option<String> {
        let text = std::mem::take(&mut self.buffer);
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;

    struct ScriptedRecognizer {
        events: Vec<CaptureEvent>,
    }

    impl SpeechRecognizer for ScriptedRecognizer {
        fn start(&mut self) -> Result<Receiver<CaptureEvent>> {
            let (tx, rx) = unbounded();
            for event in self.events.drain(..) {
                tx.send(event).unwrap();
            }
            Ok(rx)
        }

        fn stop(&mut self) {}
    }

    fn controller(events: Vec<CaptureEvent>) -> RecognitionController {
        RecognitionController::new(Box::new(ScriptedRecognizer { events }))
    }

    #[test]
    fn capture_requires_capability() {
        let mut ctrl = controller(vec![]);
        let caps = Capabilities {
            capture: false,
            playback: true,
            synthesis: true,
            warnings: vec![],
        };
        assert!(matches!(
            ctrl.start(&caps),
            Err(AgentError::CapabilityUnavailable(_))
        ));
    }

    #[test]
    fn final_results_overwrite_the_buffer() {
        let mut ctrl = controller(vec![
            CaptureEvent::Final("what is".to_string()),
            CaptureEvent::Final("what is your greatest strength".to_string()),
            CaptureEvent::Ended,
        ]);
        let rx = ctrl.start(&Capabilities::all()).unwrap();
        for event in rx.iter() {
            ctrl.observe(&event);
        }
        assert_eq!(
            ctrl.take_transcript(),
            Some("what is your greatest strength".to_string())
        );
    }

    #[test]
    fn empty_buffer_produces_no_hand_off() {
        let mut ctrl = controller(vec![CaptureEvent::Ended]);
        let rx = ctrl.start(&Capabilities::all()).unwrap();
        ctrl.stop();
        for event in rx.iter() {
            ctrl.observe(&event);
        }
        assert!(!ctrl.is_active());
        assert_eq!(ctrl.take_transcript(), None);
    }

    #[test]
    fn transcript_is_taken_only_once() {
        let mut ctrl = controller(vec![
            CaptureEvent::Final("hello".to_string()),
            CaptureEvent::Ended,
        ]);
        let rx = ctrl.start(&Capabilities::all()).unwrap();
        for event in rx.iter() {
            ctrl.observe(&event);
        }
        assert_eq!(ctrl.take_transcript(), Some("hello".to_string()));
        assert_eq!(ctrl.take_transcript(), None);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut ctrl = controller(vec![]);
        let _rx = ctrl.start(&Capabilities::all()).unwrap();
        assert!(ctrl.start(&Capabilities::all()).is_err());
    }

    #[test]
    fn failed_stream_worker_winds_down_the_capture_thread() {
        // A port with nothing listening on it: bind, read the port, drop.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let stop = Arc::new(AtomicBool::new(false));
        let (_audio_tx, audio_rx) = bounded::<Vec<u8>>(4);
        let (event_tx, event_rx) = unbounded();

        stream_worker(
            &format!("ws://127.0.0.1:{port}"),
            "key",
            &stop,
            &audio_rx,
            &event_tx,
        );

        // The capture loop only exits once the flag is raised; a worker that
        // bails without raising it would leave the input stream open.
        assert!(stop.load(Ordering::Acquire));
        assert_eq!(
            event_rx.try_recv().unwrap(),
            CaptureEvent::Error(RecognitionErrorKind::Network)
        );
    }

    #[test]
    fn intentional_stop_is_tracked() {
        let mut ctrl = controller(vec![CaptureEvent::Ended]);
        let _rx = ctrl.start(&Capabilities::all()).unwrap();
        assert!(!ctrl.stop_was_intentional());
        ctrl.stop();
        assert!(ctrl.stop_was_intentional());
    }
}
