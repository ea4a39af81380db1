//! The playback manager: single owner of the one live audio handle.
//!
//! Every start and stop goes through [`PlaybackManager`]; starting new
//! playback always stops and releases whatever was playing first.

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::PlayableResource;
use crate::error::{AgentError, Result};

/// How one playback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackResult {
    /// Ran to the end of the resource.
    Completed,
    /// Stopped before the end, either replaced or explicitly stopped.
    Stopped,
    /// The resource could not play.
    Failed(String),
}

/// Completion signal for one playback. The caller blocks on [`wait`] while
/// the engine produces sound on its own thread.
///
/// [`wait`]: Completion::wait
pub struct Completion {
    rx: Receiver<PlaybackResult>,
}

impl Completion {
    pub fn wait(self) -> PlaybackResult {
        match self.rx.recv() {
            Ok(result) => result,
            // Engine dropped the sender without reporting: treat as failure.
            Err(_) => PlaybackResult::Failed("playback engine went away".to_string()),
        }
    }
}

/// A started source that can be stopped. Stopping an already-finished
/// source must be a no-op.
pub trait ActiveSource: Send {
    fn stop(&mut self);

    /// Whether the source has reported its outcome. A finished source no
    /// longer counts as live playback.
    fn is_finished(&self) -> bool;
}

/// Seam between the manager and the actual audio machinery, so tests can
/// observe start/stop ordering without touching a device.
pub trait PlaybackEngine: Send {
    /// Begin playing `resource`, reporting the outcome exactly once on
    /// `done`.
    fn start(
        &mut self,
        resource: PlayableResource,
        done: Sender<PlaybackResult>,
    ) -> Result<Box<dyn ActiveSource>>;
}

struct ActiveHandle {
    label: String,
    source: Box<dyn ActiveSource>,
}

/// Owns at most one live audio-producing handle, system-wide.
pub struct PlaybackManager {
    engine: Box<dyn PlaybackEngine>,
    active: Option<ActiveHandle>,
}

impl PlaybackManager {
    pub fn new(engine: Box<dyn PlaybackEngine>) -> Self {
        Self {
            engine,
            active: None,
        }
    }

    /// Start playing `resource`. Any previous handle is stopped and
    /// released first, unconditionally.
    pub fn play(&mut self, resource: PlayableResource) -> Result<Completion> {
        self.stop();

        let label = format!("play_{}", uuid::Uuid::new_v4());
        let (done_tx, done_rx) = bounded(1);

        let source = match self.engine.start(resource, done_tx) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("playback start failed: {}", e);
                return Err(AgentError::Playback(e.to_string()));
            }
        };

        log::debug!("playback started: {}", label);
        self.active = Some(ActiveHandle { label, source });

        Ok(Completion { rx: done_rx })
    }

    /// Stop and release the current handle. Safe to call at any time,
    /// including when nothing is playing or playback already finished.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.active.take() {
            handle.source.stop();
            log::debug!("playback handle released: {}", handle.label);
        }
    }

    /// Whether audio is currently playing. A source that already ran to
    /// completion does not count as active.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|handle| !handle.source.is_finished())
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmAudio;
    use std::sync::{Arc, Mutex};

    /// Records the order of start/stop events instead of making noise.
    struct RecordingEngine {
        events: Arc<Mutex<Vec<String>>>,
        counter: usize,
    }

    struct RecordedSource {
        id: usize,
        events: Arc<Mutex<Vec<String>>>,
        done: Option<Sender<PlaybackResult>>,
    }

    impl ActiveSource for RecordedSource {
        fn stop(&mut self) {
            self.events.lock().unwrap().push(format!("stop {}", self.id));
            if let Some(done) = self.done.take() {
                let _ = done.send(PlaybackResult::Stopped);
            }
        }

        fn is_finished(&self) -> bool {
            self.done.is_none()
        }
    }

    impl PlaybackEngine for RecordingEngine {
        fn start(
            &mut self,
            _resource: PlayableResource,
            done: Sender<PlaybackResult>,
        ) -> Result<Box<dyn ActiveSource>> {
            self.counter += 1;
            self.events
                .lock()
                .unwrap()
                .push(format!("start {}", self.counter));
            Ok(Box::new(RecordedSource {
                id: self.counter,
                events: Arc::clone(&self.events),
                done: Some(done),
            }))
        }
    }

    fn manager_with_log() -> (PlaybackManager, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine {
            events: Arc::clone(&events),
            counter: 0,
        };
        (PlaybackManager::new(Box::new(engine)), events)
    }

    fn silence() -> PlayableResource {
        PlayableResource::Pcm(PcmAudio {
            samples: vec![0.0; 160],
            sample_rate: 16_000,
        })
    }

    #[test]
    fn second_play_stops_the_first() {
        let (mut manager, events) = manager_with_log();

        let first = manager.play(silence()).unwrap();
        let _second = manager.play(silence()).unwrap();

        assert_eq!(first.wait(), PlaybackResult::Stopped);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["start 1", "stop 1", "start 2"]
        );
        assert!(manager.is_active());
    }

    #[test]
    fn every_start_after_the_first_is_preceded_by_one_stop() {
        let (mut manager, events) = manager_with_log();
        for _ in 0..4 {
            let _ = manager.play(silence()).unwrap();
        }

        let events = events.lock().unwrap();
        let mut stops_between = 0;
        for event in events.iter().skip(1) {
            if event.starts_with("stop") {
                stops_between += 1;
            } else {
                assert_eq!(stops_between, 1, "expected one stop before {}", event);
                stops_between = 0;
            }
        }
    }

    #[test]
    fn stop_without_playback_is_a_noop() {
        let (mut manager, events) = manager_with_log();
        manager.stop();
        manager.stop();
        assert!(events.lock().unwrap().is_empty());
        assert!(!manager.is_active());
    }

    #[test]
    fn stop_releases_the_handle() {
        let (mut manager, _) = manager_with_log();
        let completion = manager.play(silence()).unwrap();
        manager.stop();
        assert!(!manager.is_active());
        assert_eq!(completion.wait(), PlaybackResult::Stopped);
    }

    /// Completes every source before returning it.
    struct FinishingEngine;

    struct FinishedSource;

    impl ActiveSource for FinishedSource {
        fn stop(&mut self) {}

        fn is_finished(&self) -> bool {
            true
        }
    }

    impl PlaybackEngine for FinishingEngine {
        fn start(
            &mut self,
            _resource: PlayableResource,
            done: Sender<PlaybackResult>,
        ) -> Result<Box<dyn ActiveSource>> {
            let _ = done.send(PlaybackResult::Completed);
            Ok(Box::new(FinishedSource))
        }
    }

    #[test]
    fn completed_playback_no_longer_counts_as_active() {
        let mut manager = PlaybackManager::new(Box::new(FinishingEngine));
        let completion = manager.play(silence()).unwrap();
        assert_eq!(completion.wait(), PlaybackResult::Completed);
        assert!(!manager.is_active());
    }
}
