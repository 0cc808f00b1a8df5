use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use batch_errors::{BatchError, BatchResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 并发准入控制器：同时处理的工作项不超过 `capacity`
///
/// 按先到先得的顺序准入（tokio 信号量是公平的），等待槽位时可被取消令牌中断。
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// 创建拥有 `capacity` 个槽位的准入池，容量为 0 时返回配置错误
    pub fn new(capacity: usize, cancel: CancellationToken) -> BatchResult<Self> {
        if capacity == 0 {
            return Err(BatchError::config_error(
                "max_concurrency must be greater than 0",
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            cancel,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 等待一个空闲槽位；运行被取消时返回 `BatchError::Cancelled`
    pub async fn admit(&self) -> BatchResult<Slot> {
        if self.cancel.is_cancelled() {
            return Err(BatchError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BatchError::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| BatchError::Cancelled)?
            }
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        debug!(in_flight = current, capacity = self.capacity, "slot acquired");

        Ok(Slot {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// 当前占用的槽位数
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 当前空闲的槽位数
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// 槽位总数
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 自创建以来同时占用槽位数的最高值
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// 获取取消令牌
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// 已占用的准入槽位，drop 时释放（包括任务 panic 的情况）
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        // 许可在此之后才释放，计数不会超过已持有的许可数
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
