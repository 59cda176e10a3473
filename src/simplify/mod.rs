//! Text simplification stage.
//!
//! Splits a document at sentence boundaries, rewrites units concurrently and
//! joins the rewritten units with a blank line, in document order.

pub mod markdown;
pub mod prompt;
pub mod rewriter;

pub use markdown::{MarkdownIssue, check_markdown, collapse_blank_lines, normalize_extracted};
pub use rewriter::{MockRewriter, OpenAiRewriter, RewriteTransform, Rewriter, RewriterConfig};

use crate::error::Result;
use crate::pipeline::{Boundary, Joiner, OrderedResultBatch, PipelineConfig, Stage, StageOutput};
use std::sync::Arc;

pub const STAGE_NAME: &str = "simplify";

/// Joins rewritten units with a blank line and collapses excess newlines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextJoiner;

impl Joiner for TextJoiner {
    type Input = String;
    type Output = String;

    fn join(&self, results: OrderedResultBatch<String>) -> Result<String> {
        let joined = results.into_present_values().collect::<Vec<_>>().join("\n\n");
        Ok(collapse_blank_lines(&joined))
    }
}

/// Runs the text stage over `text`.
///
/// Units whose rewrite fails are left out of the result. The output is empty
/// only if every unit failed or the input had no content.
///
/// # Errors
/// Returns a configuration error if `config` has a zero unit size, zero
/// concurrency or zero attempts.
pub async fn simplify(
    text: &str,
    rewriter: Arc<dyn Rewriter>,
    config: PipelineConfig,
) -> Result<StageOutput<String>> {
    tracing::info!(
        model = rewriter.model_name(),
        max_unit_size = config.max_unit_size,
        max_concurrent = config.max_concurrent,
        "simplifying text"
    );
    let transform = Arc::new(RewriteTransform::new(rewriter));
    Stage::new(STAGE_NAME, Boundary::Sentence, config, transform, TextJoiner)
        .run(text)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RetryPolicy;

    fn config(max_unit_size: usize, max_concurrent: usize) -> PipelineConfig {
        PipelineConfig {
            max_unit_size,
            max_concurrent,
            retry: RetryPolicy::none(),
        }
    }

    #[tokio::test]
    async fn test_simplify_joins_in_order() {
        let rewriter = Arc::new(MockRewriter::new().with_prefix("> "));
        let out = simplify("First one. Second one. Third one.", rewriter, config(12, 3))
            .await
            .unwrap();
        assert_eq!(out.output, "> First one.\n\n> Second one.\n\n> Third one.");
        assert!(out.report.is_complete());
    }

    #[tokio::test]
    async fn test_failed_unit_is_omitted() {
        let rewriter = Arc::new(MockRewriter::new().failing_on("Second"));
        let out = simplify("First one. Second one. Third one.", rewriter, config(12, 2))
            .await
            .unwrap();
        assert_eq!(out.output, "First one.\n\nThird one.");
        assert_eq!(out.report.absent, vec![1]);
    }

    #[tokio::test]
    async fn test_all_units_failing_gives_empty_text() {
        let rewriter = Arc::new(MockRewriter::new().failing_on("one"));
        let out = simplify("First one. Second one.", rewriter, config(12, 2))
            .await
            .unwrap();
        assert_eq!(out.output, "");
        assert_eq!(out.report.succeeded, 0);
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let rewriter = Arc::new(MockRewriter::new());
        assert!(simplify("Hello.", rewriter, config(100, 0)).await.is_err());
    }

    #[test]
    fn test_joiner_collapses_newlines() {
        let batch = OrderedResultBatch::from_unordered(vec![
            crate::pipeline::UnitResult::Present {
                index: 1,
                value: "b".to_string(),
            },
            crate::pipeline::UnitResult::Present {
                index: 0,
                value: "a\n\n\n".to_string(),
            },
        ]);
        assert_eq!(TextJoiner.join(batch).unwrap(), "a\n\nb");
    }
}
