//! Audio synthesis stage.
//!
//! Splits text at word boundaries, synthesizes one unit at a time and
//! concatenates the decoded audio in document order. Failed units are skipped
//! without inserting silence.

pub mod artifacts;
pub mod codec;
pub mod synthesizer;

pub use artifacts::{Artifact, ArtifactStore};
pub use codec::{AudioFormat, AudioTrack, decode, encode};
pub use synthesizer::{MockSynthesizer, Synthesizer, SynthesizerConfig, UnrealSpeechSynthesizer};

use crate::error::Result;
use crate::pipeline::{
    Boundary, Joiner, OrderedResultBatch, PipelineConfig, Stage, StageOutput, Unit, UnitTransform,
};
use async_trait::async_trait;
use std::sync::Arc;

pub const STAGE_NAME: &str = "speech";

/// Synthesizes one unit, parks the audio in an artifact and decodes it.
pub struct SynthesizeTransform {
    synthesizer: Arc<dyn Synthesizer>,
    artifacts: ArtifactStore,
}

impl SynthesizeTransform {
    pub fn new(synthesizer: Arc<dyn Synthesizer>, artifacts: ArtifactStore) -> Self {
        Self {
            synthesizer,
            artifacts,
        }
    }
}

#[async_trait]
impl UnitTransform for SynthesizeTransform {
    type Output = AudioTrack;

    async fn transform(&self, unit: &Unit) -> Result<AudioTrack> {
        let bytes = self.synthesizer.synthesize(unit.payload()).await?;
        let extension = self.synthesizer.file_extension();

        // Scratch artifacts are removed when `artifact` drops, so a unit that
        // fails to decode leaves nothing behind.
        let artifact = self.artifacts.store(unit.index(), bytes, extension).await?;
        let data = tokio::fs::read(artifact.path()).await?;
        let track = decode(data, Some(extension))?;
        self.artifacts.keep(unit.index(), artifact, extension)?;

        tracing::debug!(
            unit = unit.index(),
            seconds = track.duration().as_secs_f32(),
            "decoded unit audio"
        );
        Ok(track)
    }

    fn name(&self) -> &str {
        self.synthesizer.voice()
    }
}

/// Concatenates present unit tracks onto an empty track.
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioJoiner;

impl Joiner for AudioJoiner {
    type Input = AudioTrack;
    type Output = AudioTrack;

    fn join(&self, results: OrderedResultBatch<AudioTrack>) -> Result<AudioTrack> {
        Ok(results
            .into_present_values()
            .fold(AudioTrack::empty(), |mut track, unit| {
                track.append(unit);
                track
            }))
    }
}

/// Runs the audio stage over `text`.
///
/// Units are synthesized strictly one at a time regardless of
/// `config.max_concurrent`. Empty text yields an empty track.
///
/// # Errors
/// Returns a configuration error for a zero unit size or zero attempts.
pub async fn synthesize(
    text: &str,
    synthesizer: Arc<dyn Synthesizer>,
    config: PipelineConfig,
    artifacts: ArtifactStore,
) -> Result<StageOutput<AudioTrack>> {
    if config.max_concurrent != 1 {
        tracing::debug!(
            requested = config.max_concurrent,
            "speech units are synthesized sequentially"
        );
    }
    let config = PipelineConfig {
        max_concurrent: 1,
        ..config
    };
    tracing::info!(
        voice = synthesizer.voice(),
        max_unit_size = config.max_unit_size,
        retain = artifacts.run_dir().is_some(),
        "synthesizing speech"
    );

    let transform = Arc::new(SynthesizeTransform::new(synthesizer, artifacts));
    Stage::new(STAGE_NAME, Boundary::Word, config, transform, AudioJoiner)
        .run(text)
        .await
}
