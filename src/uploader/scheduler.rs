// 分批并发调度器
//
// 调度策略：
// - 任务按提交顺序切分为大小为 batch_size 的批次
// - 同一批次内的任务并发执行（JoinSet）
// - 必须等整个批次结束后才开始下一批，因此峰值并发不超过 batch_size
// - 批次内任一任务失败：等待该批次其余任务结束，不再启动后续批次，返回第一个观察到的错误
// - 不做重试
//
// 已知限制：批次内的慢任务会推迟下一批次的启动（没有工作窃取）

use crate::uploader::error::UploadError;
use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// "不限并发"时的默认上限，避免耗尽 socket / 文件描述符
pub const DEFAULT_CONCURRENCY_CEILING: usize = 32;

/// 调度任务
pub type Job<T> = BoxFuture<'static, Result<T, UploadError>>;

/// 并发配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Concurrency {
    /// 全部分片作为一个批次（受 ceiling 限制）
    #[default]
    Unbounded,
    /// 每批最多 n 个任务
    Limited(usize),
}

impl Concurrency {
    /// 由可选配置值构造（None 表示不限）
    pub fn from_option(value: Option<usize>) -> Self {
        match value {
            Some(n) => Concurrency::Limited(n),
            None => Concurrency::Unbounded,
        }
    }

    /// 计算实际批次大小
    ///
    /// # 参数
    /// * `job_count` - 任务总数
    /// * `ceiling` - 不限并发时的上限
    pub fn batch_size(&self, job_count: usize, ceiling: usize) -> Result<usize, UploadError> {
        let size = match *self {
            Concurrency::Limited(0) => return Err(UploadError::InvalidConcurrency),
            Concurrency::Limited(n) => n.min(job_count),
            Concurrency::Unbounded => {
                if ceiling == 0 {
                    return Err(UploadError::InvalidConcurrency);
                }
                job_count.min(ceiling)
            }
        };
        Ok(size.max(1))
    }
}

/// 分批调度器
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize) -> Result<Self, UploadError> {
        if batch_size == 0 {
            return Err(UploadError::InvalidConcurrency);
        }
        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// 执行全部任务
    ///
    /// 全部成功时按提交顺序返回结果；取消令牌在每个批次开始前检查，
    /// 已启动的批次总会执行完毕
    pub async fn run_all<T: Send + 'static>(
        &self,
        jobs: Vec<Job<T>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<T>, UploadError> {
        let total = jobs.len();
        let batch_count = total.div_ceil(self.batch_size);
        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut pending = jobs.into_iter().enumerate().peekable();
        let mut batch_no = 0usize;

        info!(
            "[分批调度] 共 {} 个任务，每批 {} 个，共 {} 批",
            total, self.batch_size, batch_count
        );

        while pending.peek().is_some() {
            if cancel.is_cancelled() {
                warn!("[分批调度] 已取消，跳过剩余 {} 批", batch_count - batch_no);
                return Err(UploadError::Cancelled);
            }

            batch_no += 1;
            let mut join_set = JoinSet::new();
            for (index, job) in pending.by_ref().take(self.batch_size) {
                join_set.spawn(async move { (index, job.await) });
            }

            debug!(
                "[分批调度] 第 {}/{} 批启动: {} 个任务",
                batch_no,
                batch_count,
                join_set.len()
            );

            // 等待整个批次结束，即使已有任务失败
            let mut first_error: Option<UploadError> = None;
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((index, Ok(value))) => {
                        results[index] = Some(value);
                    }
                    Ok((index, Err(e))) => {
                        warn!("[分批调度] 任务 #{} 失败: {}", index, e);
                        first_error.get_or_insert(e);
                    }
                    Err(e) => {
                        error!("[分批调度] 任务异常: {}", e);
                        first_error.get_or_insert(UploadError::JobPanicked(e.to_string()));
                    }
                }
            }

            if let Some(e) = first_error {
                error!(
                    "[分批调度] 第 {}/{} 批失败，停止调度: {}",
                    batch_no, batch_count, e
                );
                return Err(e);
            }
        }

        Ok(results.into_iter().flatten().collect())
    }
}
