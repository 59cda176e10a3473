//! Default configuration constants for plainvoice.
//!
//! Shared by the config layer, the CLI and the stages so the same value is
//! never spelled twice.

/// Maximum characters per unit sent to the rewrite model.
pub const TEXT_UNIT_SIZE: usize = 7000;

/// Maximum number of rewrite requests in flight at once.
pub const CONCURRENT_REQUESTS: usize = 5;

/// Default chat model used for simplification.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Token ceiling for one rewritten unit.
pub const MAX_TOKENS: u32 = 2000;

/// Sampling temperature for the rewrite model.
pub const TEMPERATURE: f32 = 0.5;

/// Maximum characters per unit sent to the voice service.
///
/// The streaming endpoint rejects long bodies, so this stays well under 1000.
pub const SPEECH_UNIT_SIZE: usize = 950;

/// Default voice id.
pub const DEFAULT_VOICE: &str = "Scarlett";

/// Voices accepted by the synthesis service.
pub const KNOWN_VOICES: &[&str] = &["Scarlett", "Liv", "Dan", "Will", "Amy"];

pub const SPEECH_BITRATE: &str = "192k";
pub const SPEECH_SPEED: &str = "0";
pub const SPEECH_PITCH: &str = "1";
pub const SPEECH_CODEC: &str = "libmp3lame";

/// Number of attempts per unit before it resolves to absent.
///
/// One attempt means no retry: a failed unit is dropped immediately.
pub const MAX_ATTEMPTS: u32 = 1;
pub const INITIAL_BACKOFF_MS: u64 = 500;
pub const MAX_BACKOFF_MS: u64 = 8000;

/// Timeout for a single remote request in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Root directory for per-document outputs.
pub const OUTPUT_DIR: &str = "outputs";

/// Directory holding per-unit audio when debug retention is enabled.
pub const DEBUG_AUDIO_DIR: &str = "tts_audio";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const UNREAL_SPEECH_URL: &str = "https://api.v7.unrealspeech.com/stream";

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const UNREAL_SPEECH_API_KEY_ENV: &str = "UNREAL_SPEECH_API_KEY";

/// Sample rate used when writing a track that never received audio.
pub const FALLBACK_SAMPLE_RATE: u32 = 24000;

/// External tools, overridable through the environment.
pub const FFMPEG: &str = "ffmpeg";
pub const FFMPEG_ENV: &str = "PLAINVOICE_FFMPEG";
pub const PDFTOTEXT: &str = "pdftotext";
pub const PDFTOTEXT_ENV: &str = "PLAINVOICE_PDFTOTEXT";
