//! Generic stage: split → dispatch → join.
//!
//! A stage combines a chunker boundary, a dispatcher, a unit transform and a
//! joiner. Both the text and the audio stage are instances of [`Stage`]; they
//! differ only in those four parts.
//!
//! ```text
//! Created ──▶ Splitting ──▶ Dispatching ──▶ Joining ──▶ Done
//!                 │
//!                 └── invalid config: terminal error
//! ```
//!
//! Per-unit failures stay inside `Dispatching`. Only configuration errors and
//! joiner errors leave the stage as `Err`.

use crate::error::Result;
use crate::pipeline::chunker::{Boundary, Chunker};
use crate::pipeline::dispatcher::{BoundedDispatcher, RetryPolicy, UnitTransform};
use crate::pipeline::unit::OrderedResultBatch;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Immutable per-run settings shared by the chunker and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maximum unit size in characters.
    pub max_unit_size: usize,
    /// Maximum number of transforms in flight.
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

/// Combines the ordered results of a batch into the stage's artifact.
pub trait Joiner: Send + Sync {
    type Input;
    type Output;

    fn join(&self, results: OrderedResultBatch<Self::Input>) -> Result<Self::Output>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Created,
    Splitting,
    Dispatching,
    Joining,
    Done,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Created => "created",
            StageState::Splitting => "splitting",
            StageState::Dispatching => "dispatching",
            StageState::Joining => "joining",
            StageState::Done => "done",
        };
        f.write_str(name)
    }
}

/// What happened to the units of one stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: &'static str,
    pub units: usize,
    pub succeeded: usize,
    /// Indices of units that resolved to absent.
    pub absent: Vec<usize>,
    pub elapsed_ms: u64,
}

impl StageReport {
    pub fn is_complete(&self) -> bool {
        self.absent.is_empty()
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} units succeeded in {}ms",
            self.stage, self.succeeded, self.units, self.elapsed_ms
        )?;
        if !self.absent.is_empty() {
            write!(f, ", dropped {:?}", self.absent)?;
        }
        Ok(())
    }
}

/// Artifact produced by a stage plus its report.
#[derive(Debug)]
pub struct StageOutput<T> {
    pub output: T,
    pub report: StageReport,
}

/// One pipeline instance.
pub struct Stage<X: ?Sized, J> {
    name: &'static str,
    boundary: Boundary,
    config: PipelineConfig,
    transform: Arc<X>,
    joiner: J,
    state: StageState,
}

impl<X, J> Stage<X, J>
where
    X: UnitTransform + ?Sized,
    J: Joiner<Input = X::Output>,
{
    pub fn new(
        name: &'static str,
        boundary: Boundary,
        config: PipelineConfig,
        transform: Arc<X>,
        joiner: J,
    ) -> Self {
        Self {
            name,
            boundary,
            config,
            transform,
            joiner,
            state: StageState::Created,
        }
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    fn advance(&mut self, next: StageState) {
        tracing::debug!(stage = self.name, from = %self.state, to = %next, "stage transition");
        self.state = next;
    }

    /// Runs the stage to completion. Consumes the stage: nothing follows `Done`.
    ///
    /// # Errors
    /// Configuration errors abort in `Splitting`, before any unit is
    /// dispatched. Joiner errors abort in `Joining`.
    pub async fn run(mut self, text: &str) -> Result<StageOutput<J::Output>> {
        let started = Instant::now();

        self.advance(StageState::Splitting);
        let chunker = Chunker::new(self.boundary, self.config.max_unit_size)?;
        let dispatcher = BoundedDispatcher::new(self.config.max_concurrent, self.config.retry)?;
        let batch = chunker.split(text);
        let units = batch.len();
        tracing::info!(stage = self.name, units, "processing {} units", units);

        self.advance(StageState::Dispatching);
        let results = dispatcher.run(batch, self.transform.clone()).await;
        let absent = results.absent_indices();
        let succeeded = results.present_count();

        self.advance(StageState::Joining);
        let output = self.joiner.join(results)?;

        self.advance(StageState::Done);
        let report = StageReport {
            stage: self.name,
            units,
            succeeded,
            absent,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        if report.is_complete() {
            tracing::info!(stage = self.name, "{}", report);
        } else {
            tracing::warn!(stage = self.name, "{}", report);
        }

        Ok(StageOutput { output, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlainvoiceError;
    use crate::pipeline::unit::Unit;
    use async_trait::async_trait;

    struct WordCount;

    #[async_trait]
    impl UnitTransform for WordCount {
        type Output = usize;

        async fn transform(&self, unit: &Unit) -> Result<usize> {
            if unit.payload().contains("fail") {
                return Err(PlainvoiceError::Rewrite {
                    message: "no".into(),
                });
            }
            Ok(unit.payload().split_whitespace().count())
        }

        fn name(&self) -> &str {
            "word-count"
        }
    }

    struct Sum;

    impl Joiner for Sum {
        type Input = usize;
        type Output = usize;

        fn join(&self, results: OrderedResultBatch<usize>) -> Result<usize> {
            Ok(results.into_present_values().sum())
        }
    }

    fn config(max_unit_size: usize) -> PipelineConfig {
        PipelineConfig {
            max_unit_size,
            max_concurrent: 2,
            retry: RetryPolicy::none(),
        }
    }

    #[test]
    fn test_new_stage_is_created() {
        let stage = Stage::new("count", Boundary::Word, config(10), Arc::new(WordCount), Sum);
        assert_eq!(stage.state(), StageState::Created);
    }

    #[tokio::test]
    async fn test_stage_runs_to_done() {
        let stage = Stage::new("count", Boundary::Word, config(10), Arc::new(WordCount), Sum);
        let out = stage.run("one two three four five six").await.unwrap();

        // "one two" | "three" | "four five" | "six"
        assert_eq!(out.output, 6);
        assert_eq!(out.report.units, 4);
        assert_eq!(out.report.succeeded, 4);
        assert!(out.report.is_complete());
    }

    #[tokio::test]
    async fn test_unit_failure_is_reported_not_raised() {
        let stage = Stage::new("count", Boundary::Word, config(4), Arc::new(WordCount), Sum);
        let out = stage.run("aa fail bb").await.unwrap();

        assert_eq!(out.output, 2);
        assert_eq!(out.report.absent, vec![1]);
        assert!(out.report.to_string().contains("dropped [1]"));
    }

    #[tokio::test]
    async fn test_invalid_unit_size_aborts_before_dispatch() {
        let stage = Stage::new("count", Boundary::Word, config(0), Arc::new(WordCount), Sum);
        let err = stage.run("anything").await.unwrap_err();
        assert!(matches!(err, PlainvoiceError::ConfigInvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_empty_text_is_not_an_error() {
        let stage = Stage::new("count", Boundary::Word, config(10), Arc::new(WordCount), Sum);
        let out = stage.run("").await.unwrap();
        assert_eq!(out.output, 0);
        assert_eq!(out.report.units, 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(StageState::Dispatching.to_string(), "dispatching");
        assert_eq!(StageState::Done.to_string(), "done");
    }
}
