use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use crate::pipeline::{PipelineConfig, RetryPolicy};
use crate::simplify::RewriterConfig;
use crate::speech::SynthesizerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub simplify: SimplifyConfig,
    pub speech: SpeechConfig,
    pub requests: RequestConfig,
    pub output: OutputConfig,
}

/// Text simplification configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimplifyConfig {
    pub model: String,
    pub base_url: String,
    pub max_unit_size: usize,
    pub max_concurrent: usize,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    pub voice: String,
    pub url: String,
    pub max_unit_size: usize,
    pub bitrate: String,
    pub speed: String,
    pub pitch: String,
    /// Keep every unit's audio under `debug_audio_dir`.
    pub debug_audio: bool,
    pub debug_audio_dir: PathBuf,
}

/// Settings shared by both remote services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RequestConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Output location configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            model: defaults::DEFAULT_MODEL.to_string(),
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            max_unit_size: defaults::TEXT_UNIT_SIZE,
            max_concurrent: defaults::CONCURRENT_REQUESTS,
            max_tokens: defaults::MAX_TOKENS,
            temperature: defaults::TEMPERATURE,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: defaults::DEFAULT_VOICE.to_string(),
            url: defaults::UNREAL_SPEECH_URL.to_string(),
            max_unit_size: defaults::SPEECH_UNIT_SIZE,
            bitrate: defaults::SPEECH_BITRATE.to_string(),
            speed: defaults::SPEECH_SPEED.to_string(),
            pitch: defaults::SPEECH_PITCH.to_string(),
            debug_audio: false,
            debug_audio_dir: PathBuf::from(defaults::DEBUG_AUDIO_DIR),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff_ms: defaults::INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(defaults::OUTPUT_DIR),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlainvoiceError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                PlainvoiceError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(PlainvoiceError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - PLAINVOICE_MODEL → simplify.model
    /// - PLAINVOICE_VOICE → speech.voice
    /// - PLAINVOICE_OUTPUT_DIR → output.dir
    /// - OPENAI_BASE_URL → simplify.base_url
    /// - UNREAL_SPEECH_URL → speech.url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("PLAINVOICE_MODEL")
            && !model.is_empty()
        {
            self.simplify.model = model;
        }

        if let Ok(voice) = std::env::var("PLAINVOICE_VOICE")
            && !voice.is_empty()
        {
            self.speech.voice = voice;
        }

        if let Ok(dir) = std::env::var("PLAINVOICE_OUTPUT_DIR")
            && !dir.is_empty()
        {
            self.output.dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("OPENAI_BASE_URL")
            && !url.is_empty()
        {
            self.simplify.base_url = url;
        }

        if let Ok(url) = std::env::var("UNREAL_SPEECH_URL")
            && !url.is_empty()
        {
            self.speech.url = url;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/plainvoice/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("plainvoice")
            .join("config.toml")
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        if self.simplify.max_unit_size == 0 {
            return Err(PlainvoiceError::invalid_value(
                "simplify.max_unit_size",
                "must be at least 1",
            ));
        }
        if self.simplify.max_concurrent == 0 {
            return Err(PlainvoiceError::invalid_value(
                "simplify.max_concurrent",
                "must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.simplify.temperature) {
            return Err(PlainvoiceError::invalid_value(
                "simplify.temperature",
                format!("{} is outside 0.0..=2.0", self.simplify.temperature),
            ));
        }
        if self.speech.max_unit_size == 0 {
            return Err(PlainvoiceError::invalid_value(
                "speech.max_unit_size",
                "must be at least 1",
            ));
        }
        if !defaults::KNOWN_VOICES.contains(&self.speech.voice.as_str()) {
            return Err(PlainvoiceError::invalid_value(
                "speech.voice",
                format!(
                    "unknown voice {:?}; choose one of {}",
                    self.speech.voice,
                    defaults::KNOWN_VOICES.join(", ")
                ),
            ));
        }
        if self.requests.timeout_secs == 0 {
            return Err(PlainvoiceError::invalid_value(
                "requests.timeout_secs",
                "must be at least 1",
            ));
        }
        if self.requests.max_attempts == 0 {
            return Err(PlainvoiceError::invalid_value(
                "requests.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.requests.max_attempts,
            initial_backoff_ms: self.requests.initial_backoff_ms,
            max_backoff_ms: self.requests.max_backoff_ms,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.requests.timeout_secs)
    }

    /// Pipeline settings for the text stage.
    pub fn text_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            max_unit_size: self.simplify.max_unit_size,
            max_concurrent: self.simplify.max_concurrent,
            retry: self.retry_policy(),
        }
    }

    /// Pipeline settings for the audio stage. Always sequential.
    pub fn speech_pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            max_unit_size: self.speech.max_unit_size,
            max_concurrent: 1,
            retry: self.retry_policy(),
        }
    }

    pub fn rewriter_config(&self, api_key: String) -> RewriterConfig {
        RewriterConfig {
            base_url: self.simplify.base_url.clone(),
            api_key,
            model: self.simplify.model.clone(),
            max_tokens: self.simplify.max_tokens,
            temperature: self.simplify.temperature,
            timeout: self.request_timeout(),
        }
    }

    pub fn synthesizer_config(&self, api_key: String) -> SynthesizerConfig {
        SynthesizerConfig {
            url: self.speech.url.clone(),
            api_key,
            voice: self.speech.voice.clone(),
            bitrate: self.speech.bitrate.clone(),
            speed: self.speech.speed.clone(),
            pitch: self.speech.pitch.clone(),
            timeout: self.request_timeout(),
        }
    }
}
