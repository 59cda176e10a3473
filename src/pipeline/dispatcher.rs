//! Bounded-concurrency dispatcher.
//!
//! Runs a [`UnitTransform`] over every unit of a batch with at most
//! `max_concurrent` transforms in flight. Each unit gets its own task holding a
//! semaphore permit; the permit is released when the task ends, whether the
//! transform succeeded, failed or panicked. Results are written into the slot
//! of their unit index, so completion order never leaks into the output.
//!
//! A failed unit resolves to [`UnitResult::Absent`] and never aborts the batch.
//! Dropping the future returned by [`BoundedDispatcher::run`] aborts all
//! in-flight transforms without waiting for them.

use crate::defaults;
use crate::error::{PlainvoiceError, Result};
use crate::pipeline::unit::{OrderedBatch, OrderedResultBatch, Unit, UnitResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Operation applied independently to one unit.
///
/// Implementations are shared across concurrently running tasks.
#[async_trait]
pub trait UnitTransform: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Transform one unit. Any error marks only this unit as absent.
    async fn transform(&self, unit: &Unit) -> Result<Self::Output>;

    /// Name of this transform for logging.
    fn name(&self) -> &str;
}

/// Per-unit retry with doubling backoff.
///
/// `max_attempts = 1` disables retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            initial_backoff_ms: defaults::INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
        }
    }
}

/// Runs transforms over a batch with a hard ceiling on concurrency.
#[derive(Debug, Clone, Copy)]
pub struct BoundedDispatcher {
    max_concurrent: usize,
    retry: RetryPolicy,
}

impl BoundedDispatcher {
    /// Creates a dispatcher.
    ///
    /// # Errors
    /// Returns `ConfigInvalidValue` when `max_concurrent` is zero or the retry
    /// policy allows no attempt at all.
    pub fn new(max_concurrent: usize, retry: RetryPolicy) -> Result<Self> {
        if max_concurrent == 0 {
            return Err(PlainvoiceError::invalid_value(
                "max_concurrent",
                "must be greater than zero",
            ));
        }
        if retry.max_attempts == 0 {
            return Err(PlainvoiceError::invalid_value(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(Self {
            max_concurrent,
            retry,
        })
    }

    /// Fully sequential dispatcher.
    pub fn sequential(retry: RetryPolicy) -> Self {
        Self {
            max_concurrent: 1,
            retry,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Transforms every unit of `batch`, returning one result per unit in
    /// index order.
    pub async fn run<X>(&self, batch: OrderedBatch, transform: Arc<X>) -> OrderedResultBatch<X::Output>
    where
        X: UnitTransform + ?Sized,
    {
        let total = batch.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        tracing::debug!(
            transform = transform.name(),
            units = total,
            max_concurrent = self.max_concurrent,
            "dispatching batch"
        );

        for unit in batch {
            let index = unit.index();
            // Waits here until a slot frees up.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::warn!(unit = index, error = %e, "no dispatch slot, unit skipped");
                    continue;
                }
            };
            let transform = transform.clone();
            let retry = self.retry;

            tasks.spawn(async move {
                let _permit = permit;
                let started = Instant::now();
                match transform_with_retry(transform.as_ref(), &unit, retry).await {
                    Ok(value) => {
                        tracing::debug!(
                            unit = index,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "unit done"
                        );
                        UnitResult::Present { index, value }
                    }
                    Err(e) => {
                        tracing::warn!(
                            unit = index,
                            transform = transform.name(),
                            error = %e,
                            "unit failed, dropping it"
                        );
                        UnitResult::Absent { index }
                    }
                }
            });
        }

        let mut slots: Vec<Option<UnitResult<X::Output>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    let index = result.index();
                    slots[index] = Some(result);
                }
                Err(e) => tracing::error!(error = %e, "unit task panicked"),
            }
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    tracing::warn!(unit = index, "unit produced no result");
                    UnitResult::Absent { index }
                })
            })
            .collect();

        OrderedResultBatch::from_unordered(results)
    }
}

async fn transform_with_retry<X>(transform: &X, unit: &Unit, retry: RetryPolicy) -> Result<X::Output>
where
    X: UnitTransform + ?Sized,
{
    let mut attempt = 0;
    let mut backoff = retry.initial_backoff_ms;

    loop {
        match transform.transform(unit).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                attempt += 1;
                if attempt >= retry.max_attempts {
                    return Err(e);
                }

                let wait = match &e {
                    PlainvoiceError::RateLimited {
                        retry_after: Some(secs),
                    } => secs.saturating_mul(1000).min(retry.max_backoff_ms),
                    _ => backoff,
                };
                tracing::info!(
                    unit = unit.index(),
                    attempt,
                    error = %e,
                    "retrying in {}ms",
                    wait
                );
                tokio::time::sleep(Duration::from_millis(wait)).await;
                backoff = backoff.saturating_mul(2).min(retry.max_backoff_ms);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Upper-cases payloads; fails or sleeps for configured indices.
    struct ScriptedTransform {
        fail: HashSet<usize>,
        delays_ms: Vec<u64>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        completion_order: Mutex<Vec<usize>>,
    }

    impl ScriptedTransform {
        fn new() -> Self {
            Self {
                fail: HashSet::new(),
                delays_ms: Vec::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                completion_order: Mutex::new(Vec::new()),
            }
        }

        fn failing(mut self, indices: &[usize]) -> Self {
            self.fail = indices.iter().copied().collect();
            self
        }

        fn with_delays(mut self, delays_ms: &[u64]) -> Self {
            self.delays_ms = delays_ms.to_vec();
            self
        }
    }

    #[async_trait]
    impl UnitTransform for ScriptedTransform {
        type Output = String;

        async fn transform(&self, unit: &Unit) -> Result<String> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);

            let delay = self.delays_ms.get(unit.index()).copied().unwrap_or(5);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.completion_order.lock().unwrap().push(unit.index());

            if self.fail.contains(&unit.index()) {
                return Err(PlainvoiceError::Rewrite {
                    message: format!("scripted failure for unit {}", unit.index()),
                });
            }
            Ok(unit.payload().to_uppercase())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn batch(n: usize) -> OrderedBatch {
        OrderedBatch::from_payloads((0..n).map(|i| format!("unit {i}")))
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let err = BoundedDispatcher::new(0, RetryPolicy::none()).unwrap_err();
        assert!(matches!(err, PlainvoiceError::ConfigInvalidValue { .. }));
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let retry = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(BoundedDispatcher::new(2, retry).is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_yields_empty_results() {
        let dispatcher = BoundedDispatcher::new(3, RetryPolicy::none()).unwrap();
        let results = dispatcher
            .run(OrderedBatch::default(), Arc::new(ScriptedTransform::new()))
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_output_order_survives_scrambled_completion() {
        // Unit 3 finishes first, unit 0 last.
        let transform =
            Arc::new(ScriptedTransform::new().with_delays(&[80, 40, 20, 1]));
        let dispatcher = BoundedDispatcher::new(4, RetryPolicy::none()).unwrap();

        let results = dispatcher.run(batch(4), transform.clone()).await;

        let completion = transform.completion_order.lock().unwrap().clone();
        assert_eq!(completion, vec![3, 2, 1, 0]);

        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index(), i);
            assert_eq!(result.value(), Some(&format!("UNIT {i}")));
        }
    }

    #[tokio::test]
    async fn test_concurrency_ceiling_is_respected() {
        let transform = Arc::new(ScriptedTransform::new().with_delays(&[20; 12]));
        let dispatcher = BoundedDispatcher::new(3, RetryPolicy::none()).unwrap();

        let results = dispatcher.run(batch(12), transform.clone()).await;

        assert_eq!(results.len(), 12);
        let peak = transform.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}, limit is 3");
        assert!(peak >= 2, "expected some parallelism, peak was {peak}");
    }

    #[tokio::test]
    async fn test_sequential_mode_runs_one_at_a_time_in_order() {
        let transform = Arc::new(ScriptedTransform::new().with_delays(&[30, 1, 15, 1, 1]));
        let dispatcher = BoundedDispatcher::sequential(RetryPolicy::none());

        dispatcher.run(batch(5), transform.clone()).await;

        assert_eq!(transform.peak.load(Ordering::SeqCst), 1);
        let completion = transform.completion_order.lock().unwrap().clone();
        assert_eq!(completion, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failed_unit_is_absent_and_siblings_complete() {
        let transform = Arc::new(ScriptedTransform::new().failing(&[2]));
        let dispatcher = BoundedDispatcher::new(2, RetryPolicy::none()).unwrap();

        let results = dispatcher.run(batch(5), transform).await;

        assert_eq!(results.len(), 5);
        assert_eq!(results.absent_indices(), vec![2]);
        let values: Vec<String> = results.into_present_values().collect();
        assert_eq!(values, vec!["UNIT 0", "UNIT 1", "UNIT 3", "UNIT 4"]);
    }

    #[tokio::test]
    async fn test_all_units_failing_is_not_an_error() {
        let transform = Arc::new(ScriptedTransform::new().failing(&[0, 1, 2]));
        let dispatcher = BoundedDispatcher::new(2, RetryPolicy::none()).unwrap();

        let results = dispatcher.run(batch(3), transform).await;

        assert_eq!(results.absent_indices(), vec![0, 1, 2]);
        assert_eq!(results.present_count(), 0);
    }

    #[tokio::test]
    async fn test_failing_transform_releases_its_slot() {
        // With one slot, a leaked permit would deadlock the second unit.
        let transform = Arc::new(ScriptedTransform::new().failing(&[0]));
        let dispatcher = BoundedDispatcher::sequential(RetryPolicy::none());

        let results = tokio::time::timeout(
            Duration::from_secs(5),
            dispatcher.run(batch(3), transform),
        )
        .await
        .expect("dispatcher stalled after a failed unit");

        assert_eq!(results.absent_indices(), vec![0]);
    }

    struct PanickingTransform;

    #[async_trait]
    impl UnitTransform for PanickingTransform {
        type Output = usize;

        async fn transform(&self, unit: &Unit) -> Result<usize> {
            if unit.index() == 1 {
                panic!("boom");
            }
            Ok(unit.index())
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    #[tokio::test]
    async fn test_panicking_unit_becomes_absent() {
        let dispatcher = BoundedDispatcher::sequential(RetryPolicy::none());
        let results = dispatcher.run(batch(3), Arc::new(PanickingTransform)).await;

        assert_eq!(results.absent_indices(), vec![1]);
        assert_eq!(results.into_present_values().collect::<Vec<_>>(), vec![0, 2]);
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyTransform {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl UnitTransform for FlakyTransform {
        type Output = u32;

        async fn transform(&self, _unit: &Unit) -> Result<u32> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(PlainvoiceError::RateLimited { retry_after: None })
            } else {
                Ok(call)
            }
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failure() {
        let transform = Arc::new(FlakyTransform {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let retry = RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        };
        let dispatcher = BoundedDispatcher::new(1, retry).unwrap();

        let results = dispatcher.run(batch(1), transform.clone()).await;

        assert_eq!(results.into_present_values().collect::<Vec<_>>(), vec![3]);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_falls_back_to_absent() {
        let transform = Arc::new(FlakyTransform {
            failures: 10,
            calls: AtomicU32::new(0),
        });
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
        let dispatcher = BoundedDispatcher::new(1, retry).unwrap();

        let results = dispatcher.run(batch(1), transform.clone()).await;

        assert_eq!(results.absent_indices(), vec![0]);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let transform = Arc::new(FlakyTransform {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let dispatcher = BoundedDispatcher::new(1, RetryPolicy::default()).unwrap();

        let results = dispatcher.run(batch(1), transform.clone()).await;

        assert_eq!(results.absent_indices(), vec![0]);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 1);
    }
}
