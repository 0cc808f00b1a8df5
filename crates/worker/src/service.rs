use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use batch_config::{RetryConfig, WorkerConfig};
use batch_domain::{ItemSource, OutcomeKind, ProcessingOutcome, RunSummary, WorkItem};
use batch_errors::{BatchError, BatchResult};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::components::{ItemProcessor, RetryExecutor, RetryPolicy, WorkerPool};

/// 批处理运行器构建器
pub struct BatchRunnerBuilder {
    processor: Arc<dyn ItemProcessor>,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
    cancel: Option<CancellationToken>,
}

impl BatchRunnerBuilder {
    /// 创建构建器，默认并发上限 20，默认重试策略
    pub fn new(processor: Arc<dyn ItemProcessor>) -> Self {
        Self {
            processor,
            max_concurrency: WorkerConfig::default().max_concurrency,
            retry_policy: RetryPolicy::default(),
            cancel: None,
        }
    }

    /// 设置最大并发数
    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// 设置重试策略
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// 从配置设置并发上限与重试策略
    pub fn with_config(self, worker: &WorkerConfig, retry: &RetryConfig) -> Self {
        self.max_concurrency(worker.max_concurrency)
            .retry_policy(RetryPolicy::from(retry))
    }

    /// 设置取消令牌，未设置时使用新令牌
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 构建运行器，并发上限为 0 时返回配置错误
    pub fn build(self) -> BatchResult<BatchRunner> {
        if self.max_concurrency == 0 {
            return Err(BatchError::config_error(
                "max_concurrency must be greater than 0",
            ));
        }

        Ok(BatchRunner {
            processor: self.processor,
            max_concurrency: self.max_concurrency,
            retry_policy: self.retry_policy,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

/// 批处理运行器：在并发上限内派发全部工作项并汇总结果
pub struct BatchRunner {
    processor: Arc<dyn ItemProcessor>,
    max_concurrency: usize,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

/// 各类结果的原子计数器
#[derive(Debug, Default)]
struct OutcomeCounters {
    succeeded: AtomicU64,
    skipped_invalid: AtomicU64,
    failed: AtomicU64,
}

impl OutcomeCounters {
    fn record(&self, outcome: &ProcessingOutcome) {
        let counter = match outcome.kind {
            OutcomeKind::Success => &self.succeeded,
            OutcomeKind::SkippedInvalid => &self.skipped_invalid,
            OutcomeKind::FailedFinal => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        metrics::counter!("batch_items_total", "outcome" => outcome.kind.as_str()).increment(1);
        metrics::histogram!("batch_item_attempts").record(f64::from(outcome.attempts));
    }
}

/// 已派发的工作项任务，按任务ID记录对应的工作项
///
/// 任务异常终止时据此为该工作项补记一个 `FailedFinal` 结果。
struct DispatchedTasks {
    tasks: JoinSet<ProcessingOutcome>,
    items: HashMap<task::Id, WorkItem>,
}

impl DispatchedTasks {
    fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            items: HashMap::new(),
        }
    }

    fn spawn<F>(&mut self, item: WorkItem, task: F)
    where
        F: Future<Output = ProcessingOutcome> + Send + 'static,
    {
        let handle = self.tasks.spawn(task);
        self.items.insert(handle.id(), item);
    }

    /// 等待全部任务结束，每个已派发的工作项恰好返回一个结果
    async fn join_all(mut self, counters: &OutcomeCounters) -> Vec<ProcessingOutcome> {
        let mut outcomes = Vec::with_capacity(self.items.len());

        while let Some(joined) = self.tasks.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    self.items.remove(&id);
                    outcomes.push(outcome);
                }
                Err(e) => {
                    let Some(item) = self.items.remove(&e.id()) else {
                        error!(error = %e, "unknown item task aborted");
                        continue;
                    };
                    error!(sequence = item.sequence(), error = %e, "item task aborted");
                    let detail = BatchError::Internal(format!("工作项任务异常终止: {e}"));
                    let outcome = ProcessingOutcome::failed_final(item, 0, detail.to_string());
                    counters.record(&outcome);
                    outcomes.push(outcome);
                }
            }
        }

        outcomes.sort_by_key(|outcome| outcome.item.sequence());
        outcomes
    }
}

impl BatchRunner {
    /// 创建运行器构建器
    pub fn builder(processor: Arc<dyn ItemProcessor>) -> BatchRunnerBuilder {
        BatchRunnerBuilder::new(processor)
    }

    /// 取消令牌：触发后停止准入新工作项，处理中的工作项完成当前尝试
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 获取最大并发数
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 获取重试策略
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// 运行整个批次，仅返回汇总结果
    pub async fn run_all(&self, source: &dyn ItemSource) -> BatchResult<RunSummary> {
        let (summary, _) = self.run_collect(source).await?;
        Ok(summary)
    }

    /// 运行整个批次，返回汇总结果及每个已派发工作项的最终结果
    pub async fn run_collect(
        &self,
        source: &dyn ItemSource,
    ) -> BatchResult<(RunSummary, Vec<ProcessingOutcome>)> {
        let started = Instant::now();
        let items = source.items().await?;
        let total = items.len();

        info!(
            total,
            max_concurrency = self.max_concurrency,
            max_retries = self.retry_policy.max_retries,
            "worker started"
        );

        self.processor.prepare().await?;

        let pool = WorkerPool::new(self.max_concurrency, self.cancel.clone())?;
        let executor = Arc::new(RetryExecutor::new(
            self.retry_policy.clone(),
            self.cancel.clone(),
        ));
        let counters = Arc::new(OutcomeCounters::default());
        let mut tasks = DispatchedTasks::new();
        let mut dispatched: usize = 0;

        for item in items {
            let slot = match pool.admit().await {
                Ok(slot) => slot,
                Err(e) => {
                    warn!(
                        dispatched,
                        remaining = total - dispatched,
                        error = %e,
                        "admission stopped"
                    );
                    break;
                }
            };
            dispatched += 1;

            let processor = Arc::clone(&self.processor);
            let executor = Arc::clone(&executor);
            let counters = Arc::clone(&counters);
            tasks.spawn(item.clone(), async move {
                let _slot = slot;
                let outcome = executor
                    .run_with_retry(&item, || processor.process(&item))
                    .await;
                counters.record(&outcome);
                outcome
            });
        }

        let outcomes = tasks.join_all(&counters).await;

        let summary = RunSummary {
            total_items: total as u64,
            dispatched: dispatched as u64,
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            skipped_invalid: counters.skipped_invalid.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            not_dispatched: (total - dispatched) as u64,
            cancelled: self.cancel.is_cancelled(),
            peak_concurrency: pool.peak_in_flight(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            total = summary.total_items,
            succeeded = summary.succeeded,
            skipped_invalid = summary.skipped_invalid,
            failed = summary.failed,
            not_dispatched = summary.not_dispatched,
            peak_concurrency = summary.peak_concurrency,
            elapsed_ms = summary.elapsed_ms,
            "worker finished"
        );

        Ok((summary, outcomes))
    }
}
