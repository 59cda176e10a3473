//! Command-line interface for plainvoice
//!
//! Provides argument parsing using clap derive macros.

use clap::Parser;
use std::path::PathBuf;

/// Turn long documents into plain-language spoken audio
#[derive(Parser, Debug)]
#[command(
    name = "plainvoice",
    version,
    about = "Simplify a PDF or Markdown document and optionally read it aloud"
)]
pub struct Cli {
    /// Input PDF or Markdown file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (warnings and errors only)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Where to write the simplified Markdown (default: outputs/<name>/simplified.md)
    #[arg(long, value_name = "PATH")]
    pub output_md: Option<PathBuf>,

    /// Where to write the audio; .mp3 or .wav (default: outputs/<name>/simplified.mp3)
    #[arg(long, value_name = "PATH")]
    pub output_audio: Option<PathBuf>,

    /// Root directory for per-document outputs
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Maximum characters per rewrite request
    #[arg(long, value_name = "CHARS")]
    pub max_unit_size: Option<usize>,

    /// Number of rewrite requests in flight at once
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Chat model used for simplification (e.g. gpt-4, gpt-4o-mini)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// OpenAI API key (or set OPENAI_API_KEY)
    #[arg(long, value_name = "KEY")]
    pub openai_api_key: Option<String>,

    /// Synthesize speech after simplification
    #[arg(long)]
    pub tts: bool,

    /// Skip simplification; read the input Markdown aloud as-is
    #[arg(long, conflicts_with = "tts")]
    pub speech_only: bool,

    /// Voice id (Scarlett, Liv, Dan, Will, Amy)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Maximum characters per synthesis request
    #[arg(long, value_name = "CHARS")]
    pub speech_unit_size: Option<usize>,

    /// UnrealSpeech API key (or set UNREAL_SPEECH_API_KEY)
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Keep every unit's audio in the debug directory
    #[arg(long)]
    pub debug_audio: bool,

    /// Directory for retained unit audio
    #[arg(long, value_name = "DIR")]
    pub debug_audio_dir: Option<PathBuf>,

    /// Per-request timeout. Examples: 30s, 2m, 1m30s
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout_secs)]
    pub timeout: Option<u64>,

    /// Attempts per unit before it is dropped (1 = no retry)
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

/// Parse a timeout string into seconds.
///
/// Supports any duration format accepted by `humantime`, plus bare numbers
/// (seconds).
fn parse_timeout_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let secs = match s.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => humantime::parse_duration(s)
            .map(|d| d.as_secs())
            .map_err(|e| e.to_string())?,
    };
    if secs == 0 {
        return Err("timeout must be at least one second".to_string());
    }
    Ok(secs)
}
