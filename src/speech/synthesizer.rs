//! Remote speech synthesis.

use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use crate::speech::codec::{AudioTrack, to_wav_bytes};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Turns text into encoded audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the encoded audio for `text`.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// File extension of the returned audio, used as a decode hint.
    fn file_extension(&self) -> &str;

    fn voice(&self) -> &str;
}

/// Settings for the UnrealSpeech client.
#[derive(Debug, Clone)]
pub struct SynthesizerConfig {
    pub url: String,
    pub api_key: String,
    pub voice: String,
    pub bitrate: String,
    pub speed: String,
    pub pitch: String,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SpeechRequest<'a> {
    text: &'a str,
    voice_id: &'a str,
    bitrate: &'a str,
    speed: &'a str,
    pitch: &'a str,
    codec: &'a str,
}

/// Client for the UnrealSpeech `/stream` endpoint, which answers with MP3.
pub struct UnrealSpeechSynthesizer {
    client: reqwest::Client,
    config: SynthesizerConfig,
}

impl UnrealSpeechSynthesizer {
    /// # Errors
    /// Returns `MissingCredential` for an empty API key and `ClientSetup` if
    /// the HTTP client cannot be built.
    pub fn new(config: SynthesizerConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PlainvoiceError::MissingCredential {
                name: "UnrealSpeech API key".to_string(),
                env_var: defaults::UNREAL_SPEECH_API_KEY_ENV.to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlainvoiceError::ClientSetup {
                message: e.to_string(),
            })?;
        tracing::info!(voice = %config.voice, "speech client initialized");
        Ok(Self { client, config })
    }

    fn request_body(&self, text: &str) -> Result<Vec<u8>> {
        let request = SpeechRequest {
            text,
            voice_id: &self.config.voice,
            bitrate: &self.config.bitrate,
            speed: &self.config.speed,
            pitch: &self.config.pitch,
            codec: defaults::SPEECH_CODEC,
        };
        serde_json::to_vec(&request).map_err(|e| PlainvoiceError::Synthesis {
            status: 0,
            message: format!("Failed to encode request: {e}"),
        })
    }
}

#[async_trait]
impl Synthesizer for UnrealSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let body = self.request_body(text)?;
        let response = self
            .client
            .post(&self.config.url)
            .bearer_auth(&self.config.api_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| PlainvoiceError::Synthesis {
                status: 0,
                message: format!("Request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PlainvoiceError::Synthesis {
                status: status.as_u16(),
                message: detail.chars().take(200).collect(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| PlainvoiceError::Synthesis {
            status: status.as_u16(),
            message: format!("Failed to read audio: {e}"),
        })?;
        if bytes.is_empty() {
            return Err(PlainvoiceError::InvalidResponse {
                message: "speech service returned no audio".to_string(),
            });
        }
        Ok(bytes.to_vec())
    }

    fn file_extension(&self) -> &str {
        "mp3"
    }

    fn voice(&self) -> &str {
        &self.config.voice
    }
}

/// Mock synthesizer for testing.
///
/// Answers with a mono 8 kHz WAV holding one sample per character of the
/// input, each sample set to the input's character count. Tracks how many
/// calls overlap.
#[derive(Debug, Default)]
pub struct MockSynthesizer {
    fail_containing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockSynthesizer {
    pub const SAMPLE_RATE: u32 = 8000;

    pub fn new() -> Self {
        Self::default()
    }

    /// Fail any text containing `marker` with a 500 status.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_containing.insert(marker.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Highest number of overlapping `synthesize` calls seen.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Texts received, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// The track a successful call for `text` decodes to.
    pub fn track_for(text: &str) -> AudioTrack {
        let len = text.chars().count();
        let value = i16::try_from(len).unwrap_or(i16::MAX);
        AudioTrack::from_samples(vec![value; len], Self::SAMPLE_RATE, 1)
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(text.to_string());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_containing.iter().any(|m| text.contains(m.as_str())) {
            return Err(PlainvoiceError::Synthesis {
                status: 500,
                message: "mock synthesis failure".to_string(),
            });
        }
        to_wav_bytes(&Self::track_for(text))
    }

    fn file_extension(&self) -> &str {
        "wav"
    }

    fn voice(&self) -> &str {
        "mock-voice"
    }
}
