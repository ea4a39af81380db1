use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use clap::Parser;

use interview_agent::audio::{engine::CpalEngine, PlaybackManager};
use interview_agent::backend::BackendClient;
use interview_agent::capability::Capabilities;
use interview_agent::config::load_config;
use interview_agent::recognition::StreamingRecognizer;
use interview_agent::session::{SessionCoordinator, SessionEvent};
use interview_agent::tts::{voices, TtsOrchestrator};
use interview_agent::types::SessionState;

/// Voice interview practice client: speak a question, hear the answer.
#[derive(Parser)]
#[command(name = "interview-agent", version, about)]
struct Args {
    /// Backend base URL (overrides INTERVIEW_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Voice to speak replies with (overrides INTERVIEW_VOICE)
    #[arg(long)]
    voice: Option<String>,

    /// Print the voice catalog and exit
    #[arg(long)]
    list_voices: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.list_voices {
        for profile in voices::CATALOG {
            println!("{:10} {}", profile.id, profile.label);
        }
        return Ok(());
    }

    let mut config = load_config().context("loading configuration")?;
    if let Some(api_url) = args.api_url {
        config.base_url = api_url.trim_end_matches('/').to_string();
    }
    if let Some(voice) = args.voice {
        config.default_voice = voice;
    }

    let caps = Capabilities::probe(&config);
    for warning in &caps.warnings {
        eprintln!("⚠️  {}", warning);
    }

    let backend = BackendClient::new(config.base_url.clone());
    backend.debug_ping();

    let playback = Arc::new(Mutex::new(PlaybackManager::new(Box::new(CpalEngine::new()))));
    let orchestrator = TtsOrchestrator::from_config(&config, &caps, Arc::clone(&playback));
    let recognizer = StreamingRecognizer::new(
        config.stt_url.clone(),
        config.stt_key().unwrap_or_default().to_string(),
    );

    let voice = config.default_voice.clone();
    println!("🎙️  interview-agent ready (voice: {})", voice);
    println!("   Press Enter to start/stop speaking, type q to quit");

    let mut session = SessionCoordinator::new(
        caps,
        Box::new(recognizer),
        Arc::new(backend),
        orchestrator,
        playback,
        voice,
    );
    session.on_transition(|state| match state {
        SessionState::Idle => println!("…  idle — press Enter to speak"),
        SessionState::Listening => println!("🎤 listening — press Enter when done"),
        SessionState::AwaitingResponse => println!("💭 thinking…"),
        SessionState::Speaking => println!("🔊 speaking"),
        SessionState::Error => println!("❌ something went wrong — press Enter to reset"),
    });

    let input_tx = session.sender();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            let event = match line.trim() {
                "q" | "quit" | "exit" => SessionEvent::Shutdown,
                _ => SessionEvent::Toggle,
            };
            let shutdown = matches!(event, SessionEvent::Shutdown);
            if input_tx.send(event).is_err() || shutdown {
                break;
            }
        }
        let _ = input_tx.send(SessionEvent::Shutdown);
    });

    session.run();
    println!("👋 bye");
    Ok(())
}
