// 分片上传会话
//
// 上传流程（严格按顺序）：
// 1. Begin     创建上传会话，获取 session id
// 2. Plan      规划分片
// 3. Transfer  分批并发执行：获取授权 -> 读取分片 -> 上传 -> 记录回执
// 4. Finalize  回执排序并校验，提交后端合并
//
// 任何一个分片失败，整个会话失败，不会调用合并接口

use crate::backend::{BackendError, BackendOperation, FinalizeAck, PartTransport, UploadBackend};
use crate::uploader::error::UploadError;
use crate::uploader::part::{self, Part, DEFAULT_PART_SIZE, MAX_PART_COUNT};
use crate::uploader::progress::{ProgressObserver, ProgressReporter};
use crate::uploader::receipt::ReceiptCollector;
use crate::uploader::scheduler::{BatchScheduler, Concurrency, Job, DEFAULT_CONCURRENCY_CEILING};
use crate::uploader::source::PartSource;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Begun,
    Planning,
    Transferring,
    Finalizing,
    Completed,
    /// 失败（附带原因）
    Failed(String),
    /// 调用方取消
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed(_) | SessionState::Cancelled
        )
    }
}

/// 上传选项
#[derive(Clone)]
pub struct UploadOptions {
    /// 目标 bucket
    pub bucket: String,
    /// 分片大小（字节）
    pub part_size: u64,
    /// 最大并发分片数
    pub concurrency: Concurrency,
    /// 不限并发时的上限
    pub concurrency_ceiling: usize,
    /// 覆盖数据源的文件名
    pub file_name: Option<String>,
    /// 进度回调
    pub on_progress: Option<Arc<dyn ProgressObserver>>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            part_size: DEFAULT_PART_SIZE,
            concurrency: Concurrency::Unbounded,
            concurrency_ceiling: DEFAULT_CONCURRENCY_CEILING,
            file_name: None,
            on_progress: None,
        }
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("bucket", &self.bucket)
            .field("part_size", &self.part_size)
            .field("concurrency", &self.concurrency)
            .field("concurrency_ceiling", &self.concurrency_ceiling)
            .field("file_name", &self.file_name)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl UploadOptions {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_concurrency_ceiling(mut self, ceiling: usize) -> Self {
        self.concurrency_ceiling = ceiling;
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.on_progress = Some(Arc::new(observer));
        self
    }

    /// 在联系后端之前检查配置
    fn validate(&self, file_length: u64) -> Result<(), UploadError> {
        if self.part_size == 0 {
            return Err(UploadError::InvalidPartSize(0));
        }
        let count = file_length.div_ceil(self.part_size);
        if count > MAX_PART_COUNT as u64 {
            return Err(UploadError::TooManyParts {
                count,
                limit: MAX_PART_COUNT,
            });
        }
        self.concurrency
            .batch_size(count.max(1) as usize, self.concurrency_ceiling)?;
        Ok(())
    }
}

/// 单个分片任务共享的会话上下文
struct ActiveSession {
    session_id: String,
    bucket: String,
    file_name: String,
    backend: Arc<dyn UploadBackend>,
    transport: Arc<dyn PartTransport>,
    source: Arc<dyn PartSource>,
    receipts: ReceiptCollector,
    progress: ProgressReporter,
}

impl ActiveSession {
    /// 上传单个分片：授权 -> 读取 -> 发送 -> 记录回执
    async fn upload_part(&self, part: Part) -> Result<(), UploadError> {
        let part_number = part.part_number;
        debug!(
            "[分片#{}] 开始上传 (偏移: {}, 大小: {} bytes)",
            part_number, part.offset, part.length
        );

        let destination = self
            .backend
            .authorize_part(&self.bucket, &self.file_name, &self.session_id, part_number)
            .await
            .map_err(|source| UploadError::Authorization {
                part_number,
                source,
            })?;

        if destination.is_expired() {
            return Err(UploadError::Authorization {
                part_number,
                source: BackendError::new(BackendOperation::AuthorizePart, "上传授权已过期"),
            });
        }

        let data = self
            .source
            .read_range(part.offset, part.length)
            .await
            .map_err(|source| UploadError::Source {
                part_number,
                source,
            })?;

        let start_time = Instant::now();
        let response = self
            .transport
            .send_part(&destination, data)
            .await
            .map_err(|source| UploadError::PartTransfer {
                part_number,
                source,
            })?;

        let entity_tag = response.entity_tag.ok_or_else(|| {
            error!("[分片#{}] 上传成功但响应中没有 ETag", part_number);
            UploadError::TransferIntegrity { part_number }
        })?;

        self.receipts.record(part_number, entity_tag);
        let completed = self.progress.part_succeeded();

        info!(
            "[分片#{}] ✓ 上传成功 ({}/{} 完成, 耗时: {}ms)",
            part_number,
            completed,
            self.progress.total_parts(),
            start_time.elapsed().as_millis()
        );

        Ok(())
    }
}

/// 分片上传会话
///
/// 每个会话只能执行一次 `run`
pub struct TransferSession {
    id: String,
    backend: Arc<dyn UploadBackend>,
    transport: Arc<dyn PartTransport>,
    options: UploadOptions,
    state: Mutex<SessionState>,
    cancel_token: CancellationToken,
    started: AtomicBool,
}

impl TransferSession {
    pub fn new(
        backend: Arc<dyn UploadBackend>,
        transport: Arc<dyn PartTransport>,
        options: UploadOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            backend,
            transport,
            options,
            state: Mutex::new(SessionState::Created),
            cancel_token: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// 本地会话 ID（用于日志关联）
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// 取消令牌：取消后不再启动新的批次，也不会合并
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        info!("[会话 {}] 请求取消上传", self.id);
        self.cancel_token.cancel();
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.lock();
        debug!("[会话 {}] 状态变更: {:?} -> {:?}", self.id, *state, next);
        *state = next;
    }

    /// 执行上传
    pub async fn run(&self, source: Arc<dyn PartSource>) -> Result<FinalizeAck, UploadError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(UploadError::AlreadyStarted);
        }

        let result = self.run_phases(source).await;
        match &result {
            Ok(_) => {}
            Err(UploadError::Cancelled) => {
                warn!("[会话 {}] 上传已取消", self.id);
                self.transition(SessionState::Cancelled);
            }
            Err(e) => {
                error!("[会话 {}] 上传失败: {}", self.id, e);
                self.transition(SessionState::Failed(e.to_string()));
            }
        }
        result
    }

    async fn run_phases(&self, source: Arc<dyn PartSource>) -> Result<FinalizeAck, UploadError> {
        let file_name = self
            .options
            .file_name
            .clone()
            .unwrap_or_else(|| source.name().to_string());
        let file_length = source.len();
        let bucket = self.options.bucket.clone();

        self.options.validate(file_length)?;

        // 已取消时不再创建后端会话，避免留下无人合并的上传
        if self.cancel_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        info!(
            "[会话 {}] 开始上传: bucket={}, file={}, size={} bytes",
            self.id, bucket, file_name, file_length
        );

        // 1. 创建上传会话
        let session_id = self
            .backend
            .begin_upload(&bucket, &file_name)
            .await
            .map_err(UploadError::SessionInit)?;
        self.transition(SessionState::Begun);
        info!("[会话 {}] 上传会话已创建: uploadid={}", self.id, session_id);

        // 2. 规划分片
        self.transition(SessionState::Planning);
        let parts = part::plan(file_length, self.options.part_size)?;
        let batch_size = self
            .options
            .concurrency
            .batch_size(parts.len(), self.options.concurrency_ceiling)?;
        let scheduler = BatchScheduler::new(batch_size)?;

        if self.cancel_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        // 3. 分批并发上传
        self.transition(SessionState::Transferring);
        let session = Arc::new(ActiveSession {
            session_id,
            bucket,
            file_name,
            backend: self.backend.clone(),
            transport: self.transport.clone(),
            source,
            receipts: ReceiptCollector::new(),
            progress: ProgressReporter::new(parts.len(), self.options.on_progress.clone()),
        });

        info!(
            "[会话 {}] 开始上传 {} 个分片，并发数: {}",
            self.id,
            parts.len(),
            scheduler.batch_size()
        );

        let jobs: Vec<Job<()>> = parts
            .iter()
            .map(|part| {
                let session = session.clone();
                let part = *part;
                async move { session.upload_part(part).await }.boxed()
            })
            .collect();

        scheduler.run_all(jobs, &self.cancel_token).await?;

        if self.cancel_token.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        // 4. 排序校验回执，合并文件
        self.transition(SessionState::Finalizing);
        let receipts = session.receipts.ordered_for(&parts)?;

        info!(
            "[会话 {}] 所有 {} 个分片上传完成，合并文件: {}",
            self.id,
            receipts.len(),
            session.file_name
        );

        let ack = self
            .backend
            .finalize_upload(
                &session.bucket,
                &session.file_name,
                &session.session_id,
                &receipts,
            )
            .await
            .map_err(UploadError::Backend)?;

        self.transition(SessionState::Completed);
        session.progress.finalized();
        info!("[会话 {}] 上传完成: {}", self.id, session.file_name);

        Ok(ack)
    }
}

impl fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferSession")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish()
    }
}
