//! Podium CLI - Spoken AI Debates
//!
//! Streams a multi-agent debate from a Podium backend, renders the
//! transcript live, and plays each turn aloud with per-speaker voices.

mod playback;

use std::env;
use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use podium_core::{
    AgentDescriptor, Config, DebateRequest, DebateStreamClient, Phase, SessionController, Stance,
    SynthesisClient, TurnEvent, VoiceId,
};
use rodio::OutputStream;
use tracing_subscriber::EnvFilter;

use crate::playback::{NullDecoder, RodioDecoder};

#[derive(Parser)]
#[command(
    name = "podium",
    version,
    about = "Spoken AI Debates - listen to AIs argue a position",
    long_about = "Streams a multi-agent debate from a Podium backend, prints the transcript as it arrives, and plays each turn aloud with a distinct voice per speaker."
)]
struct Cli {
    /// The position to debate
    #[arg(value_name = "POSITION")]
    position: String,

    /// Additional context given to the debaters
    #[arg(short, long, value_name = "TEXT")]
    context: Option<String>,

    /// Number of debating agents
    #[arg(short, long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(2..=4))]
    agents: u8,

    /// Number of debate rounds
    #[arg(short, long, default_value_t = 2, value_name = "ROUNDS")]
    rounds: usize,

    /// Run the debate without a moderator
    #[arg(long)]
    no_moderator: bool,

    /// Print the transcript without playing audio
    #[arg(long)]
    mute: bool,

    /// Path to a TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<String>,

    /// Backend base URL (overrides config and PODIUM_API_BASE)
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let api_base = cli
        .api_base
        .clone()
        .or_else(|| env::var("PODIUM_API_BASE").ok());
    if let Some(base) = api_base {
        let base = base.trim_end_matches('/');
        config.endpoints.debate_url = format!("{base}/api/debate");
        config.endpoints.synthesis_url = format!("{base}/api/voicesynth");
    }

    let mut agents = build_roster(cli.agents as usize);

    let mut voices = config.speaker_voices();
    for (i, agent) in agents.iter_mut().enumerate() {
        if let Some(assigned) = config.audio.speakers.get(&agent.name) {
            agent.voice = *assigned;
        } else {
            agent.voice = VoiceId::ALL[i % VoiceId::ALL.len()];
        }
        voices.assign(&agent.name, agent.voice);
    }

    // Print header
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - Spoken AI Debate", "Podium".bold())
            .bright_blue()
            .bold()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{} {}", "Position:".bold(), cli.position.bright_white());
    if let Some(context) = &cli.context {
        println!("{} {}", "Context:".bold(), context.dimmed());
    }
    println!();
    println!("{}", "Debaters:".bold());
    for (i, agent) in agents.iter().enumerate() {
        println!(
            "  {}. {} ({}) - voice {}",
            i + 1,
            agent.name.bright_cyan(),
            stance_label(agent.stance).yellow(),
            voices.voice_for(&agent.name).to_string().dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());

    // The output stream is not Send and must outlive every sink, so it lives
    // here on the main task.
    let _stream;
    let decoder: Arc<dyn podium_core::AudioDecoder> = if cli.mute {
        Arc::new(NullDecoder)
    } else {
        let (stream, handle) = OutputStream::try_default()?;
        _stream = stream;
        Arc::new(RodioDecoder::new(handle))
    };
    let synthesis = Arc::new(SynthesisClient::new(
        config.endpoints.synthesis_url.clone(),
        decoder,
    ));

    let mut controller =
        SessionController::new(synthesis, voices, config.audio.look_ahead)
            .with_callback(create_console_callback());

    let request = DebateRequest {
        position: cli.position.clone(),
        context: cli.context.clone(),
        num_agents: agents.len(),
        num_debate_rounds: cli.rounds,
        agent_details: agents,
        enable_moderator: !cli.no_moderator,
    };
    let client =
        DebateStreamClient::new(config.endpoints.debate_url.clone()).with_retry(config.retry_policy());

    let stream = client.open(&request).await?;
    if let Err(e) = controller.consume(stream).await {
        eprintln!(
            "{} {}",
            "Warning:".yellow().bold(),
            format!("{e}. Playing the turns received so far.").yellow()
        );
    }
    if controller.parse_errors() > 0 {
        eprintln!(
            "{}",
            format!(
                "Warning: {} malformed stream line(s) were dropped.",
                controller.parse_errors()
            )
            .yellow()
        );
    }

    if controller.turns().is_empty() {
        println!();
        println!("{}", "No debate turns were received.".red());
        return Ok(());
    }

    println!();
    println!("{}", "─".repeat(70).dimmed());
    println!("{}", "  Playing debate audio... (Ctrl+C to stop)".dimmed());

    controller.play();
    let mut state = controller.state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            let _ = controller
                .state()
                .wait_for(|s| s.phase == Phase::Cancelled)
                .await;
            println!();
            println!("{}", "  Playback cancelled.".yellow());
        }
        result = state.wait_for(|s| matches!(s.phase, Phase::Finished | Phase::Cancelled)) => {
            result?;
            println!();
            println!("{}", "═".repeat(70).bright_blue());
            println!("{}", "  Debate concluded.".bright_green().bold());
            println!("{}", "═".repeat(70).bright_blue());
        }
    }
    println!();

    Ok(())
}

/// Fixed roster of debaters, truncated to the requested count.
fn build_roster(count: usize) -> Vec<AgentDescriptor> {
    let roster = [
        ("Ada", "analytical and precise", Stance::For),
        ("Bram", "passionate and combative", Stance::Against),
        ("Clio", "curious and open-minded", Stance::Undecided),
        ("Dorian", "dry and skeptical", Stance::Against),
    ];
    roster
        .iter()
        .take(count)
        .map(|(name, personality, stance)| AgentDescriptor {
            name: (*name).to_string(),
            personality: (*personality).to_string(),
            stance: *stance,
            voice: VoiceId::default(),
        })
        .collect()
}

fn stance_label(stance: Stance) -> &'static str {
    match stance {
        Stance::For => "for",
        Stance::Against => "against",
        Stance::Undecided => "undecided",
    }
}

/// Create a callback that renders assembler events to the console as the
/// stream arrives.
fn create_console_callback() -> Box<dyn Fn(&TurnEvent) + Send + Sync> {
    Box::new(move |event| match event {
        TurnEvent::TurnOpened { speaker_id, .. } => {
            let header = if speaker_id == "Moderator" {
                speaker_id.bright_magenta().bold()
            } else {
                speaker_id.bright_cyan().bold()
            };
            println!();
            println!("{} {}", "▶".bright_cyan(), header);
            print!("  ");
            let _ = std::io::stdout().flush();
        }
        TurnEvent::TurnAppended { delta, .. } => {
            print!("{}", delta.replace('\n', "\n  "));
            let _ = std::io::stdout().flush();
        }
        TurnEvent::TurnClosed { .. } => {
            println!();
        }
        TurnEvent::StreamFinished => {}
    })
}
