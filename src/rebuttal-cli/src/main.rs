//! Rebuttal CLI - Debate Prep Tool
//!
//! Generates cross-examination questions and counter speeches for a debate
//! speech, and reads them aloud.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rebuttal_core::evidence::load_all;
use rebuttal_core::{
    Config, GeneratorConfig, KokoroSpeech, NarrationCallback, NarrationEvent, OpenAiSpeech,
    ResponseGenerator, ResponseKind, RodioOutput, SessionController, SpeechBackend,
    SpeechSynthesizer, default_config,
};
use std::env;
use std::io::{BufRead, Read};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(
    name = "rebuttal",
    version,
    about = "Debate prep tool - generate and hear responses to a speech",
    long_about = "A CLI tool that writes cross-examination questions and counter speeches for a debate speech using OpenAI-compatible APIs, and narrates them with text-to-speech."
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate responses to a speech
    Generate {
        /// Speech text file, or "-" to read from stdin
        #[arg(value_name = "SPEECH")]
        speech: String,

        /// Evidence files, plain text or PDF (specify once per file)
        #[arg(short, long, action = ArgAction::Append, value_name = "FILE")]
        evidence: Vec<PathBuf>,

        /// Which responses to generate
        #[arg(long, value_enum, default_value = "both")]
        mode: Mode,

        /// Override the generation model
        #[arg(short, long, value_name = "MODEL")]
        model: Option<String>,

        /// Read the responses aloud
        #[arg(long)]
        speak: bool,

        /// Narration speed (1.0 is normal)
        #[arg(long, value_name = "RATE")]
        speed: Option<f32>,
    },
    /// Read a text file aloud
    Speak {
        /// Text file, or "-" to read from stdin
        #[arg(value_name = "FILE")]
        file: String,

        /// Narration speed (1.0 is normal)
        #[arg(long, value_name = "RATE")]
        speed: Option<f32>,
    },
    /// List voices available to the local kokoro backend
    Voices,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    CrossEx,
    Counter,
    Both,
}

impl Mode {
    fn kinds(self) -> Vec<ResponseKind> {
        match self {
            Mode::CrossEx => vec![ResponseKind::CrossExamination],
            Mode::Counter => vec![ResponseKind::CounterSpeech],
            Mode::Both => vec![ResponseKind::CrossExamination, ResponseKind::CounterSpeech],
        }
    }
}

/// API endpoint settings read from the environment.
struct ApiEnv {
    base: String,
    key: String,
}

impl ApiEnv {
    fn from_env() -> Self {
        let base = env::var("OPENAI_API_BASE")
            .or_else(|_| env::var("OPENAI_BASE_URL"))
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let key = env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
            eprintln!(
                "{}",
                "Warning: OPENAI_API_KEY not set. API calls may fail.".yellow()
            );
            String::new()
        });

        Self { base, key }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => default_config(),
    };

    match cli.command {
        Command::Generate {
            speech,
            evidence,
            mode,
            model,
            speak,
            speed,
        } => {
            let speed = resolve_speed(speed, &config)?;
            let speech_text = read_input(&speech)?;
            let documents = load_all(&evidence)?;
            let api = ApiEnv::from_env();

            print_banner("Rebuttal - Debate Prep");
            println!(
                "{} {} words, {} evidence file(s)",
                "Speech:".bold(),
                speech_text.split_whitespace().count(),
                documents.len()
            );
            for doc in &documents {
                println!("  - {}", doc.name.bright_cyan());
            }

            let settings = GeneratorConfig::new(
                &api.base,
                &api.key,
                model.unwrap_or_else(|| config.generation.model.clone()),
                config.generation.max_tokens,
            );
            let generator = ResponseGenerator::new(settings, config.clone())?;

            let mut responses = Vec::new();
            for kind in mode.kinds() {
                println!();
                println!(
                    "{} {}",
                    "▶".bright_cyan(),
                    format!("Generating {}...", kind.display_name()).dimmed()
                );
                let text = generator.generate(kind, &speech_text, &documents).await?;
                print_response(kind.display_name(), &text);
                responses.push((kind.display_name().to_string(), text));
            }

            if speak {
                narrate_all(&config, &api, responses, speed).await?;
            }
        }
        Command::Speak { file, speed } => {
            let speed = resolve_speed(speed, &config)?;
            let text = read_input(&file)?;
            let api = ApiEnv::from_env();
            narrate_all(&config, &api, vec![(file, text)], speed).await?;
        }
        Command::Voices => {
            let kokoro = KokoroSpeech::new(&config.speech.kokoro_voice).await?;
            println!("{}", "Available voices:".bold());
            println!("{}", kokoro.format_available_voices());
        }
    }

    Ok(())
}

fn resolve_speed(speed: Option<f32>, config: &Config) -> Result<f32, String> {
    let speed = speed.unwrap_or(config.speech.speed);
    if speed > 0.0 {
        Ok(speed)
    } else {
        Err(format!("Speed must be positive, got {}", speed))
    }
}

/// Read a whole file, or stdin when `source` is "-".
fn read_input(source: &str) -> Result<String, std::io::Error> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(source)
    }
}

/// Narrate each response in turn, taking keyboard controls from stdin.
async fn narrate_all(
    config: &Config,
    api: &ApiEnv,
    responses: Vec<(String, String)>,
    speed: f32,
) -> Result<(), Box<dyn std::error::Error>> {
    let synthesizer: Arc<dyn SpeechSynthesizer> = match config.speech.backend {
        SpeechBackend::OpenAi => Arc::new(OpenAiSpeech::new(&api.base, &api.key, &config.speech)?),
        SpeechBackend::Kokoro => Arc::new(KokoroSpeech::new(&config.speech.kokoro_voice).await?),
    };

    // The stream must outlive every clip played through its handle.
    let (_stream, output) = RodioOutput::open_default()?;
    let mut controller = SessionController::new(synthesizer, Arc::new(output), &config.speech)
        .with_callback(create_console_callback());

    let mut commands = spawn_stdin_reader();
    let mut stdin_open = true;

    println!();
    println!(
        "{}",
        "Controls: [p] pause/resume  [s] skip  [q] quit (then Enter)".dimmed()
    );
    println!(
        "{}",
        "Pause takes effect while a segment is playing, not while the next one loads.".dimmed()
    );

    for (title, text) in responses {
        println!();
        println!("{} {}", "🔊".bright_magenta(), format!("Narrating {}", title).bold());
        controller.narrate(&text, speed)?;

        loop {
            tokio::select! {
                _ = controller.wait() => break,
                command = commands.recv(), if stdin_open => match command.as_deref().map(str::trim) {
                    Some("p") => {
                        let paused = controller.toggle_pause();
                        tracing::debug!(paused, "Toggled pause");
                    }
                    Some("s") => {
                        controller.stop();
                        break;
                    }
                    Some("q") => {
                        controller.stop();
                        return Ok(());
                    }
                    Some(_) => println!("{}", "Use p, s or q.".dimmed()),
                    None => stdin_open = false,
                },
            }
        }
    }

    Ok(())
}

/// Forward stdin lines from a plain thread so a pending read never holds up exit.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Create a callback that prints narration events to the console.
fn create_console_callback() -> NarrationCallback {
    Arc::new(move |event| match event {
        NarrationEvent::SegmentStarted { index, total } => {
            println!("  {}", format!("♪ segment {}/{}", index + 1, total).bright_cyan());
        }
        NarrationEvent::SegmentSkipped {
            index,
            total,
            reason,
        } => {
            println!(
                "  {} {}",
                format!("⚠ skipped segment {}/{}:", index + 1, total).yellow(),
                reason.dimmed()
            );
        }
        NarrationEvent::Paused => println!("  {}", "⏸ paused".yellow()),
        NarrationEvent::Resumed => println!("  {}", "▶ resumed".bright_green()),
        NarrationEvent::Finished => println!("  {}", "✔ done".bright_green()),
        NarrationEvent::Stopped => println!("  {}", "■ stopped".dimmed()),
    })
}

fn print_banner(title: &str) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", format!("  {}", title).bright_blue().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();
}

fn print_response(title: &str, text: &str) {
    println!();
    println!("{}", "─".repeat(70).bright_magenta());
    println!("{}", format!("  {}", title.to_uppercase()).bright_magenta().bold());
    println!("{}", "─".repeat(70).bright_magenta());
    for line in text.lines() {
        if line.trim().is_empty() {
            println!();
            continue;
        }
        for wrapped in textwrap(line, 66).lines() {
            println!("  {}", wrapped);
        }
    }
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textwrap_breaks_at_width() {
        let wrapped = textwrap("one two three four", 9);
        assert_eq!(wrapped, "one two\nthree\nfour");
    }

    #[test]
    fn test_mode_kinds() {
        assert_eq!(Mode::Both.kinds().len(), 2);
        assert_eq!(Mode::Counter.kinds(), vec![ResponseKind::CounterSpeech]);
    }

    #[test]
    fn test_resolve_speed_rejects_non_positive() {
        let config = default_config();
        assert_eq!(resolve_speed(None, &config).unwrap(), 1.0);
        assert_eq!(resolve_speed(Some(1.5), &config).unwrap(), 1.5);
        assert!(resolve_speed(Some(0.0), &config).is_err());
    }

    #[test]
    fn test_cli_parses_generate() {
        let cli = Cli::try_parse_from([
            "rebuttal", "generate", "speech.txt", "-e", "a.txt", "-e", "b.txt", "--mode",
            "cross-ex", "--speak",
        ])
        .unwrap();
        match cli.command {
            Command::Generate { evidence, speak, mode, .. } => {
                assert_eq!(evidence.len(), 2);
                assert!(speak);
                assert!(matches!(mode, Mode::CrossEx));
            }
            _ => panic!("expected generate"),
        }
    }
}
