//! Full-turn session behavior with scripted capture and providers.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

use interview_agent::audio::{
    ActiveSource, PcmAudio, PlaybackEngine, PlaybackManager, PlaybackResult, PlayableResource,
};
use interview_agent::backend::TextService;
use interview_agent::capability::Capabilities;
use interview_agent::error::Result;
use interview_agent::recognition::{CaptureEvent, SpeechRecognizer};
use interview_agent::session::{SessionCoordinator, SessionEvent};
use interview_agent::tts::{NativeSynth, ProviderTier, TierOutcome, TtsOrchestrator};
use interview_agent::types::{Role, SessionState};

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

struct CannedService(&'static str);

impl TextService for CannedService {
    fn respond(&self, _transcript: &str) -> Result<String> {
        Ok(self.0.to_string())
    }
}

struct InstantEngine {
    utterances: Arc<Mutex<Vec<String>>>,
}

struct DoneSource;

impl ActiveSource for DoneSource {
    fn stop(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }
}

impl PlaybackEngine for InstantEngine {
    fn start(
        &mut self,
        resource: PlayableResource,
        done: Sender<PlaybackResult>,
    ) -> Result<Box<dyn ActiveSource>> {
        if let PlayableResource::Utterance { text, .. } = resource {
            self.utterances.lock().unwrap().push(text);
        }
        let _ = done.send(PlaybackResult::Completed);
        Ok(Box::new(DoneSource))
    }
}

struct AudioTier;

impl ProviderTier for AudioTier {
    fn name(&self) -> &'static str {
        "scripted-audio"
    }

    fn attempt(&self, _text: &str, _voice: &str) -> TierOutcome {
        TierOutcome::Audio(PlayableResource::Pcm(PcmAudio {
            samples: vec![0.0; 320],
            sample_rate: 16_000,
        }))
    }
}

struct RejectedTier(&'static str);

impl ProviderTier for RejectedTier {
    fn name(&self) -> &'static str {
        self.0
    }

    fn attempt(&self, _text: &str, _voice: &str) -> TierOutcome {
        TierOutcome::HardFailure("credential rejected (401)".into())
    }
}

fn build_session(
    tiers: Vec<Box<dyn ProviderTier>>,
    with_native: bool,
    reply: &'static str,
) -> (SessionCoordinator, Arc<Mutex<Vec<String>>>) {
    let utterances = Arc::new(Mutex::new(Vec::new()));
    let playback = Arc::new(Mutex::new(PlaybackManager::new(Box::new(InstantEngine {
        utterances: Arc::clone(&utterances),
    }))));
    let native = with_native.then(|| NativeSynth::new(Arc::clone(&playback)));
    let orchestrator = TtsOrchestrator::with_tiers(tiers, native, Arc::clone(&playback));
    let session = SessionCoordinator::new(
        Capabilities::all(),
        Box::new(ScriptedRecognizer {
            events: vec![
                CaptureEvent::Final("What is your greatest strength?".to_string()),
                CaptureEvent::Ended,
            ],
        }),
        Arc::new(CannedService(reply)),
        orchestrator,
        playback,
        "rachel".to_string(),
    );
    (session, utterances)
}

/// One full turn is exactly five events: the toggle, two capture events,
/// the text answer and the delivery report.
const EVENTS_PER_TURN: usize = 5;

#[test]
fn successful_turn_plays_audio_and_returns_to_idle() {
    let (mut session, utterances) = build_session(
        vec![Box::new(AudioTier)],
        false,
        "Tell me about a time you led a team under pressure.",
    );

    session.sender().send(SessionEvent::Toggle).unwrap();
    for _ in 0..EVENTS_PER_TURN {
        assert!(session.step());
    }

    assert_eq!(session.state(), SessionState::Idle);
    let history = session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "What is your greatest strength?");
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(
        history[1].text,
        "Tell me about a time you led a team under pressure."
    );
    // The remote tier supplied audio; local synthesis never ran.
    assert!(utterances.lock().unwrap().is_empty());
}

#[test]
fn rejected_tiers_fall_through_to_chunked_local_synthesis() {
    let long_reply: &'static str = Box::leak(
        "A strong answer names the situation, the action you took, and the measurable result. "
            .repeat(5)
            .into_boxed_str(),
    );
    let (mut session, utterances) = build_session(
        vec![
            Box::new(RejectedTier("voice-endpoint")),
            Box::new(RejectedTier("proxy-endpoint")),
        ],
        true,
        long_reply,
    );

    session.sender().send(SessionEvent::Toggle).unwrap();
    for _ in 0..EVENTS_PER_TURN {
        assert!(session.step());
    }

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.history().len(), 2);

    let spoken = utterances.lock().unwrap();
    let expected: Vec<String> = interview_agent::chunker::chunks(long_reply).collect();
    assert!(expected.len() > 1, "reply long enough to need chunking");
    assert_eq!(*spoken, expected);
}

#[test]
fn exhausted_chain_without_local_synthesis_is_an_error() {
    let (mut session, _) = build_session(
        vec![Box::new(RejectedTier("voice-endpoint"))],
        false,
        "Unspeakable reply.",
    );

    session.sender().send(SessionEvent::Toggle).unwrap();
    for _ in 0..EVENTS_PER_TURN {
        assert!(session.step());
    }

    assert_eq!(session.state(), SessionState::Error);
    assert!(session.last_error().is_some());
}
