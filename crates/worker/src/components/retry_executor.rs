use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use batch_config::RetryConfig;
use batch_domain::{Disposition, ProcessingOutcome, WorkItem};
use batch_errors::{BatchError, BatchResult, ErrorClass};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// 指数退避重试策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 首次尝试之后的最大重试次数，每个工作项最多尝试 `max_retries + 1` 次
    pub max_retries: u32,
    /// 退避基准时长
    pub base_delay: Duration,
    /// 单次等待上限
    pub max_delay: Option<Duration>,
    /// 未分类错误是否重试
    pub retry_unclassified: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: config.max_delay_ms.map(Duration::from_millis),
            retry_unclassified: config.retry_unclassified,
        }
    }
}

impl RetryPolicy {
    /// 第 `retry` 次重试（从 1 开始）前的等待时间：`2^retry * base_delay`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// 判断该类错误是否允许重试
    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        match class {
            ErrorClass::Transient => true,
            ErrorClass::Unclassified => self.retry_unclassified,
            ErrorClass::Fatal => false,
        }
    }
}

/// 为单个工作项执行处理，失败时按策略退避重试
///
/// 每次调用恰好产生一个结果。操作中的 panic 会转换为 `BatchError::Internal`，
/// 与其他未分类错误适用同样的策略。
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryExecutor {
    /// 创建重试执行器
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// 获取重试策略
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 执行操作直至成功、遇到不可重试的错误、重试耗尽或运行被取消
    pub async fn run_with_retry<F, Fut>(&self, item: &WorkItem, mut operation: F) -> ProcessingOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BatchResult<Disposition>>,
    {
        let sequence = item.sequence();
        let mut attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return ProcessingOutcome::failed_final(
                    item.clone(),
                    attempts,
                    BatchError::Cancelled.to_string(),
                );
            }

            attempts += 1;
            let result = match AssertUnwindSafe(operation()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(BatchError::Internal(format!(
                    "处理过程发生 panic: {}",
                    panic_message(panic.as_ref())
                ))),
            };

            let err = match result {
                Ok(Disposition::SkippedInvalid { reason }) => {
                    return ProcessingOutcome::skipped_invalid(item.clone(), attempts, reason);
                }
                Ok(_) => return ProcessingOutcome::success(item.clone(), attempts),
                Err(err) => err,
            };

            let class = err.classify();
            if !self.policy.is_retryable(class) {
                error!(
                    sequence,
                    attempts,
                    error = %err,
                    class = ?class,
                    "item failed permanently"
                );
                return ProcessingOutcome::failed_final(item.clone(), attempts, err.to_string());
            }

            let retry = attempts;
            if retry > self.policy.max_retries {
                let exhausted = BatchError::RetriesExhausted {
                    attempts,
                    last_error: err.to_string(),
                };
                error!(
                    sequence,
                    attempts,
                    error = %err,
                    "item failed after exhausting retries"
                );
                return ProcessingOutcome::failed_final(item.clone(), attempts, exhausted.to_string());
            }

            let delay = self.policy.delay_for_retry(retry);
            warn!(
                sequence,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                class = ?class,
                "attempt failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    warn!(sequence, attempts, "retry abandoned, run cancelled");
                    return ProcessingOutcome::failed_final(
                        item.clone(),
                        attempts,
                        BatchError::Cancelled.to_string(),
                    );
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use batch_domain::OutcomeKind;
    use tokio::time::Instant;

    use super::*;

    fn executor(policy: RetryPolicy) -> RetryExecutor {
        RetryExecutor::new(policy, CancellationToken::new())
    }

    fn assert_elapsed(started: Instant, expected_ms: u64) {
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(expected_ms), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(expected_ms + 10), "elapsed {elapsed:?}");
    }

    fn item() -> WorkItem {
        WorkItem::new(7, r#"{"orderId": 7}"#)
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_respects_cap_and_saturates() {
        let policy = RetryPolicy {
            max_delay: Some(Duration::from_millis(500)),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(500));

        let uncapped = RetryPolicy::default();
        assert!(uncapped.delay_for_retry(64) >= uncapped.delay_for_retry(30));
    }

    #[test]
    fn test_policy_from_config() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: Some(1000),
            retry_unclassified: false,
        };
        let policy = RetryPolicy::from(&config);

        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Some(Duration::from_millis(1000)));
        assert!(!policy.is_retryable(ErrorClass::Unclassified));
        assert!(policy.is_retryable(ErrorClass::Transient));
        assert!(!policy.is_retryable(ErrorClass::Fatal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let outcome = executor(RetryPolicy::default())
            .run_with_retry(&item(), || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(BatchError::transient("deadlock detected"))
                    } else {
                        Ok(Disposition::Inserted)
                    }
                }
            })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_elapsed(started, 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_after_four_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let outcome = executor(RetryPolicy::default())
            .run_with_retry(&item(), || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Disposition, _>(BatchError::transient("lock timeout"))
                }
            })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::FailedFinal);
        assert_eq!(outcome.attempts, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_elapsed(started, 1400);
        let detail = outcome.error.unwrap();
        assert!(detail.contains("4 次尝试"));
        assert!(detail.contains("lock timeout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let outcome = executor(RetryPolicy::default())
            .run_with_retry(&item(), || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Disposition, _>(BatchError::invalid_payload("bad"))
                }
            })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::FailedFinal);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_invalid_passes_through_without_retry() {
        let outcome = executor(RetryPolicy::default())
            .run_with_retry(&item(), || async {
                Ok::<_, BatchError>(Disposition::SkippedInvalid {
                    reason: "expected value".to_string(),
                })
            })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::SkippedInvalid);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.error.as_deref(), Some("expected value"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unclassified_errors_follow_policy() {
        let retrying = executor(RetryPolicy::default())
            .run_with_retry(&item(), || async { Err::<Disposition, _>(BatchError::storage("disk full")) })
            .await;
        assert_eq!(retrying.attempts, 4);

        let strict = executor(RetryPolicy {
            retry_unclassified: false,
            ..RetryPolicy::default()
        })
        .run_with_retry(&item(), || async { Err::<Disposition, _>(BatchError::storage("disk full")) })
        .await;
        assert_eq!(strict.kind, OutcomeKind::FailedFinal);
        assert_eq!(strict.attempts, 1);
        assert!(strict.error.unwrap().contains("disk full"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_is_contained_and_retried() {
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = executor(RetryPolicy::default())
            .run_with_retry(&item(), || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("boom");
                    }
                    Ok::<_, BatchError>(Disposition::AlreadyPresent)
                }
            })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_stops_retrying() {
        let token = CancellationToken::new();
        let executor = RetryExecutor::new(RetryPolicy::default(), token.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let outcome = executor
            .run_with_retry(&item(), || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<Disposition, _>(BatchError::transient("connection reset"))
                }
            })
            .await;
        canceller.await.unwrap();

        assert_eq!(outcome.kind, OutcomeKind::FailedFinal);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.error.as_deref(), Some("操作已取消"));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();

        let outcome = RetryExecutor::new(RetryPolicy::default(), token)
            .run_with_retry(&item(), || async { Ok::<_, BatchError>(Disposition::Inserted) })
            .await;

        assert_eq!(outcome.kind, OutcomeKind::FailedFinal);
        assert_eq!(outcome.attempts, 0);
    }
}
