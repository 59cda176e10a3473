use async_trait::async_trait;
use plainvoice::pipeline::{PipelineConfig, RetryPolicy};
use plainvoice::simplify::{MockRewriter, Rewriter};
use plainvoice::{PlainvoiceError, Result, simplify};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn config(max_unit_size: usize, max_concurrent: usize) -> PipelineConfig {
    PipelineConfig {
        max_unit_size,
        max_concurrent,
        retry: RetryPolicy::none(),
    }
}

/// Five sentences that each become their own unit at `max_unit_size = 12`.
const FIVE_UNITS: &str = "Sentence 0. Sentence 1. Sentence 2. Sentence 3. Sentence 4.";

/// Sleeps longer for earlier sentences so later units finish first.
struct ReverseFinisher {
    units: u64,
}

#[async_trait]
impl Rewriter for ReverseFinisher {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let index: u64 = text
            .trim_end_matches('.')
            .rsplit(' ')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(20 * (self.units - index))).await;
        Ok(format!("[{index}]"))
    }

    fn model_name(&self) -> &str {
        "reverse"
    }
}

/// Records the highest number of overlapping rewrites.
#[derive(Default)]
struct CountingRewriter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Rewriter for CountingRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(15)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(text.to_string())
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

#[tokio::test]
async fn output_follows_document_order_when_completion_is_reversed() {
    let rewriter = Arc::new(ReverseFinisher { units: 5 });
    let out = simplify(FIVE_UNITS, rewriter, config(12, 5)).await.unwrap();

    assert_eq!(out.output, "[0]\n\n[1]\n\n[2]\n\n[3]\n\n[4]");
    assert_eq!(out.report.units, 5);
    assert!(out.report.is_complete());
}

#[tokio::test]
async fn concurrency_never_exceeds_the_limit() {
    let text = (0..20)
        .map(|i| format!("Unit {i:02}."))
        .collect::<Vec<_>>()
        .join(" ");
    let rewriter = Arc::new(CountingRewriter::default());

    let out = simplify(&text, rewriter.clone(), config(9, 3)).await.unwrap();

    assert_eq!(out.report.units, 20);
    let peak = rewriter.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak in-flight was {peak}");
    assert!(peak >= 2, "units should overlap, peak was {peak}");
}

#[tokio::test]
async fn failed_unit_is_dropped_and_the_rest_survive() {
    let rewriter = Arc::new(MockRewriter::new().failing_on("Sentence 2"));
    let out = simplify(FIVE_UNITS, rewriter, config(12, 2)).await.unwrap();

    assert_eq!(
        out.output,
        "Sentence 0.\n\nSentence 1.\n\nSentence 3.\n\nSentence 4."
    );
    assert_eq!(out.report.succeeded, 4);
    assert_eq!(out.report.absent, vec![2]);
}

#[tokio::test]
async fn empty_input_gives_empty_text() {
    let rewriter = Arc::new(MockRewriter::new());
    let out = simplify("", rewriter, config(100, 5)).await.unwrap();
    assert_eq!(out.output, "");
    assert_eq!(out.report.units, 0);
}

#[tokio::test]
async fn zero_unit_size_aborts_the_stage() {
    let rewriter = Arc::new(MockRewriter::new());
    let err = simplify("Some text.", rewriter, config(0, 5))
        .await
        .unwrap_err();
    assert!(matches!(err, PlainvoiceError::ConfigInvalidValue { .. }));
}

#[tokio::test]
async fn joined_text_has_no_runs_of_blank_lines() {
    let rewriter = Arc::new(MockRewriter::new().with_prefix("\n\n\n"));
    let out = simplify("One. Two.", rewriter, config(4, 2)).await.unwrap();
    assert!(!out.output.contains("\n\n\n"));
    assert_eq!(out.output, "\n\nOne.\n\nTwo.");
}
