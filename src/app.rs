//! Composition root: wires config, document loading and both stages together.

use crate::cli::Cli;
use crate::config::Config;
use crate::defaults;
use crate::document::{OutputPaths, PdfExtractor, load_document};
use crate::error::{PlainvoiceError, Result};
use crate::pipeline::StageReport;
use crate::simplify::{self, OpenAiRewriter, Rewriter};
use crate::speech::{self, ArtifactStore, AudioFormat, Synthesizer, UnrealSpeechSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Which stages a run includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Simplify only.
    Text,
    /// Simplify, then read the simplified text aloud.
    TextAndSpeech,
    /// Read the input aloud without simplifying it.
    SpeechOnly,
}

impl Mode {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.speech_only {
            Mode::SpeechOnly
        } else if cli.tts {
            Mode::TextAndSpeech
        } else {
            Mode::Text
        }
    }

    pub fn simplifies(self) -> bool {
        !matches!(self, Mode::SpeechOnly)
    }

    pub fn speaks(self) -> bool {
        !matches!(self, Mode::Text)
    }
}

/// One document to process.
#[derive(Debug, Clone)]
pub struct Job {
    pub input: PathBuf,
    pub mode: Mode,
    pub paths: OutputPaths,
}

/// What a run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub paths: OutputPaths,
    pub text: Option<StageReport>,
    pub speech: Option<StageReport>,
    pub audio_duration: Option<Duration>,
    /// Directory holding retained unit audio, if any.
    pub retained_dir: Option<PathBuf>,
}

/// Builds the effective configuration: file, then environment, then flags.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = if cli.config.is_some() {
        Config::load(&path)?
    } else {
        Config::load_or_default(&path)?
    };
    config = config.with_env_overrides();
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(size) = cli.max_unit_size {
        config.simplify.max_unit_size = size;
    }
    if let Some(n) = cli.concurrency {
        config.simplify.max_concurrent = n;
    }
    if let Some(model) = &cli.model {
        config.simplify.model = model.clone();
    }
    if let Some(voice) = &cli.voice {
        config.speech.voice = voice.clone();
    }
    if let Some(size) = cli.speech_unit_size {
        config.speech.max_unit_size = size;
    }
    if cli.debug_audio {
        config.speech.debug_audio = true;
    }
    if let Some(dir) = &cli.debug_audio_dir {
        config.speech.debug_audio_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(secs) = cli.timeout {
        config.requests.timeout_secs = secs;
    }
    if let Some(attempts) = cli.retries {
        config.requests.max_attempts = attempts;
    }
}

/// Picks the flag value, falling back to the environment.
fn resolve_credential(flag: Option<&str>, env_var: &str, name: &str) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| std::env::var(env_var).ok())
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| PlainvoiceError::MissingCredential {
            name: name.to_string(),
            env_var: env_var.to_string(),
        })
}

/// Entry point for the binary.
pub async fn run_cli(cli: Cli) -> Result<RunSummary> {
    let config = resolve_config(&cli)?;
    let mode = Mode::from_cli(&cli);

    // Clients are built up front so a missing key fails before any work.
    let rewriter: Option<Arc<dyn Rewriter>> = if mode.simplifies() {
        let key = resolve_credential(
            cli.openai_api_key.as_deref(),
            defaults::OPENAI_API_KEY_ENV,
            "OpenAI API key",
        )?;
        Some(Arc::new(OpenAiRewriter::new(config.rewriter_config(key))?))
    } else {
        None
    };
    let synthesizer: Option<Arc<dyn Synthesizer>> = if mode.speaks() {
        let key = resolve_credential(
            cli.api_key.as_deref(),
            defaults::UNREAL_SPEECH_API_KEY_ENV,
            "UnrealSpeech API key",
        )?;
        Some(Arc::new(UnrealSpeechSynthesizer::new(
            config.synthesizer_config(key),
        )?))
    } else {
        None
    };

    let job = Job {
        paths: OutputPaths::for_input(
            &cli.input,
            &config.output.dir,
            cli.output_md.clone(),
            cli.output_audio.clone(),
        ),
        input: cli.input,
        mode,
    };
    run_job(&job, &config, rewriter, synthesizer).await
}

/// Runs one job with the given collaborators.
///
/// # Errors
/// Terminal errors only: bad configuration, missing collaborators, unreadable
/// or empty input, and output write failures. Per-unit failures show up in the
/// stage reports instead.
pub async fn run_job(
    job: &Job,
    config: &Config,
    rewriter: Option<Arc<dyn Rewriter>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
) -> Result<RunSummary> {
    let synthesizer = match (job.mode.speaks(), synthesizer) {
        (true, Some(s)) => {
            AudioFormat::from_path(&job.paths.audio)?;
            Some(s)
        }
        (true, None) => {
            return Err(PlainvoiceError::Other(
                "speech requested without a synthesizer".to_string(),
            ));
        }
        (false, _) => None,
    };

    job.paths.create_dirs().await?;
    let text = load_document(&job.input, &job.paths, &PdfExtractor::from_env()).await?;

    let mut summary = RunSummary {
        paths: job.paths.clone(),
        text: None,
        speech: None,
        audio_duration: None,
        retained_dir: None,
    };

    let speech_text = match (job.mode.simplifies(), rewriter) {
        (true, Some(rewriter)) => {
            let out = simplify::simplify(&text, rewriter, config.text_pipeline()).await?;
            if out.output.is_empty() {
                tracing::warn!("simplification produced no text");
            }
            tokio::fs::write(&job.paths.simplified_md, &out.output).await?;
            tracing::info!(path = %job.paths.simplified_md.display(), "simplified text saved");
            summary.text = Some(out.report);
            out.output
        }
        (true, None) => {
            return Err(PlainvoiceError::Other(
                "simplification requested without a rewriter".to_string(),
            ));
        }
        (false, _) => text,
    };

    if let Some(synthesizer) = synthesizer {
        let artifacts = if config.speech.debug_audio {
            ArtifactStore::retaining(&config.speech.debug_audio_dir)
        } else {
            ArtifactStore::scratch()
        };
        summary.retained_dir = artifacts.run_dir().map(Path::to_path_buf);

        let out =
            speech::synthesize(&speech_text, synthesizer, config.speech_pipeline(), artifacts)
                .await?;
        if out.output.is_empty() {
            tracing::warn!("no unit produced audio; writing an empty track");
        }

        let track = out.output;
        let audio_path = job.paths.audio.clone();
        let duration = track.duration();
        tokio::task::spawn_blocking(move || speech::encode(&track, &audio_path))
            .await
            .map_err(|e| PlainvoiceError::AudioEncode {
                message: format!("encoder task failed: {e}"),
            })??;
        tracing::info!(path = %job.paths.audio.display(), "audio saved");

        summary.speech = Some(out.report);
        summary.audio_duration = Some(duration);
    }

    Ok(summary)
}
