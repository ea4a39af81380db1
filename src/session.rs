//! The session coordinator: one state machine over the whole turn cycle.
//!
//! All state lives on the coordinator's thread. Capture, the text service
//! and the delivery chain run on worker threads and report back through
//! one event channel; every event that belongs to a turn carries that
//! turn's id, and events from a superseded turn are discarded on arrival.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::audio::PlaybackManager;
use crate::backend::TextService;
use crate::capability::Capabilities;
use crate::error::{AgentError, RecognitionErrorKind, Result};
use crate::recognition::{CaptureEvent, RecognitionController, SpeechRecognizer};
use crate::tts::{Delivery, DeliveryStatus, TtsOrchestrator};
use crate::types::{ConversationTurn, SessionState, TurnId};

/// Everything the coordinator reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// The user pressed the capture toggle.
    Toggle,
    /// Raised by the active capture session.
    Capture(CaptureEvent),
    /// The text service answered for `turn`.
    TextArrived {
        turn: TurnId,
        result: Result<String>,
    },
    /// The delivery chain finished for `turn`.
    DeliveryFinished { turn: TurnId, delivery: Delivery },
    /// The user acknowledged an error.
    Acknowledge,
    /// End the session loop.
    Shutdown,
}

pub struct SessionCoordinator {
    caps: Capabilities,
    recognition: RecognitionController,
    text_service: Arc<dyn TextService>,
    orchestrator: Arc<TtsOrchestrator>,
    playback: Arc<Mutex<PlaybackManager>>,
    voice: String,
    state: SessionState,
    turn: TurnId,
    history: Vec<ConversationTurn>,
    last_error: Option<String>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    on_transition: Option<Box<dyn FnMut(SessionState) + Send>>,
}

impl SessionCoordinator {
    pub fn new(
        caps: Capabilities,
        recognizer: Box<dyn SpeechRecognizer>,
        text_service: Arc<dyn TextService>,
        orchestrator: TtsOrchestrator,
        playback: Arc<Mutex<PlaybackManager>>,
        voice: String,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            caps,
            recognition: RecognitionController::new(recognizer),
            text_service,
            orchestrator: Arc::new(orchestrator),
            playback,
            voice,
            state: SessionState::Idle,
            turn: 0,
            history: Vec::new(),
            last_error: None,
            events_tx,
            events_rx,
            on_transition: None,
        }
    }

    /// Handle for other threads (input readers, signal handlers) to post
    /// events into the session.
    pub fn sender(&self) -> Sender<SessionEvent> {
        self.events_tx.clone()
    }

    /// Called on every state transition, on the coordinator's thread.
    pub fn on_transition(&mut self, f: impl FnMut(SessionState) + Send + 'static) {
        self.on_transition = Some(Box::new(f));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Run the event loop until shutdown.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Receive and handle one event. Returns false on shutdown.
    pub fn step(&mut self) -> bool {
        match self.events_rx.recv() {
            Ok(event) => self.handle(event),
            Err(_) => false,
        }
    }

    fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Toggle => self.on_toggle(),
            SessionEvent::Capture(capture) => self.on_capture(capture),
            SessionEvent::TextArrived { turn, result } => self.on_text(turn, result),
            SessionEvent::DeliveryFinished { turn, delivery } => self.on_delivery(turn, delivery),
            SessionEvent::Acknowledge => {
                if self.state == SessionState::Error {
                    self.last_error = None;
                    self.set_state(SessionState::Idle);
                }
            }
            SessionEvent::Shutdown => {
                self.recognition.stop();
                self.stop_playback();
                info!("session shut down");
                return false;
            }
        }
        true
    }

    fn on_toggle(&mut self) {
        match self.state {
            SessionState::Idle => self.start_listening(),
            SessionState::Listening => self.recognition.stop(),
            SessionState::Speaking => {
                // Cut the audio; the delivery worker reports Interrupted
                // and the turn settles from there.
                info!("playback interrupted by user");
                self.stop_playback();
            }
            SessionState::AwaitingResponse => {
                debug!("toggle ignored while awaiting response");
            }
            SessionState::Error => {
                self.last_error = None;
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn start_listening(&mut self) {
        match self.recognition.start(&self.caps) {
            Ok(rx) => {
                let tx = self.events_tx.clone();
                thread::spawn(move || {
                    for event in rx.iter() {
                        if tx.send(SessionEvent::Capture(event)).is_err() {
                            break;
                        }
                    }
                });
                self.set_state(SessionState::Listening);
            }
            Err(AgentError::CapabilityUnavailable(reason)) => {
                self.fail(reason);
            }
            Err(err) => {
                self.fail(format!("could not start capture: {err}"));
            }
        }
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        if self.state != SessionState::Listening {
            debug!("capture event outside Listening discarded: {event:?}");
            return;
        }
        self.recognition.observe(&event);
        match event {
            CaptureEvent::Final(_) => {}
            CaptureEvent::Error(kind) => {
                let intentional = matches!(kind, RecognitionErrorKind::Aborted)
                    && self.recognition.stop_was_intentional();
                if intentional {
                    self.finish_capture();
                } else {
                    self.fail(format!("recognition failed: {kind}"));
                }
            }
            CaptureEvent::Ended => self.finish_capture(),
        }
    }

    /// Capture is over: hand the transcript off exactly once, or fall back
    /// to Idle when nothing was said.
    fn finish_capture(&mut self) {
        match self.recognition.take_transcript() {
            Some(transcript) => {
                info!("transcript finalized: {transcript:?}");
                self.history.push(ConversationTurn::user(transcript.clone()));
                self.turn += 1;
                self.set_state(SessionState::AwaitingResponse);

                let turn = self.turn;
                let service = Arc::clone(&self.text_service);
                let tx = self.events_tx.clone();
                thread::spawn(move || {
                    let result = service.respond(&transcript);
                    let _ = tx.send(SessionEvent::TextArrived { turn, result });
                });
            }
            None => {
                debug!("capture ended with empty transcript");
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn on_text(&mut self, turn: TurnId, result: Result<String>) {
        if turn != self.turn {
            debug!("stale text response for turn {turn} discarded");
            return;
        }
        match result {
            Ok(response) => {
                self.set_state(SessionState::Speaking);
                let orchestrator = Arc::clone(&self.orchestrator);
                let voice = self.voice.clone();
                let tx = self.events_tx.clone();
                thread::spawn(move || {
                    let delivery = orchestrator.deliver(&response, &voice);
                    let _ = tx.send(SessionEvent::DeliveryFinished { turn, delivery });
                });
            }
            Err(err) => {
                self.fail(format!("text service failed: {err}"));
            }
        }
    }

    fn on_delivery(&mut self, turn: TurnId, delivery: Delivery) {
        if turn != self.turn {
            debug!("stale delivery for turn {turn} discarded");
            return;
        }
        match delivery.status {
            DeliveryStatus::Spoken { provider } => {
                info!("reply delivered via {provider}");
                self.history.push(ConversationTurn::assistant(delivery.text));
                self.set_state(SessionState::Idle);
            }
            DeliveryStatus::Interrupted => {
                // The text still counts as delivered; its audio was cut.
                self.history.push(ConversationTurn::assistant(delivery.text));
                self.set_state(SessionState::Idle);
            }
            DeliveryStatus::Exhausted => {
                self.history.push(ConversationTurn::assistant(delivery.text));
                self.fail("audio delivery failed across every provider".to_string());
            }
        }
    }

    fn fail(&mut self, reason: String) {
        warn!("session error: {reason}");
        self.last_error = Some(reason);
        self.set_state(SessionState::Error);
    }

    fn stop_playback(&mut self) {
        let mut manager = match self.playback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        manager.stop();
    }

    fn set_state(&mut self, next: SessionState) {
        if self.state != next {
            info!("session: {} -> {}", self.state, next);
            self.state = next;
            if let Some(observer) = self.on_transition.as_mut() {
                observer(next);
            }
        }
    }
}
