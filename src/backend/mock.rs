// 测试用内存后端

use crate::backend::types::{
    BackendError, BackendOperation, FinalizeAck, PartDestination, PartResponse, Receipt,
};
use crate::backend::{PartTransport, UploadBackend};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    pub fail_begin: bool,
    pub fail_authorize: Option<u32>,
    pub fail_finalize: bool,
    pub calls: Mutex<Vec<String>>,
    pub finalized: Mutex<Option<Vec<Receipt>>>,
    /// begin 时触发取消
    pub cancel_on_begin: Mutex<Option<CancellationToken>>,
}

impl MockBackend {
    pub fn finalize_called(&self) -> bool {
        self.calls.lock().iter().any(|c| c.starts_with("finalize"))
    }

    pub fn authorized_parts(&self) -> Vec<u32> {
        let mut parts: Vec<u32> = self
            .calls
            .lock()
            .iter()
            .filter_map(|c| c.strip_prefix("authorize:"))
            .filter_map(|n| n.parse().ok())
            .collect();
        parts.sort_unstable();
        parts
    }
}

#[async_trait]
impl UploadBackend for MockBackend {
    async fn begin_upload(&self, bucket: &str, file_name: &str) -> Result<String, BackendError> {
        self.calls.lock().push(format!("begin:{}/{}", bucket, file_name));
        if let Some(token) = self.cancel_on_begin.lock().as_ref() {
            token.cancel();
        }
        if self.fail_begin {
            return Err(BackendError::with_status(
                BackendOperation::BeginUpload,
                503,
                "unavailable",
            ));
        }
        Ok("session-1".to_string())
    }

    async fn authorize_part(
        &self,
        _bucket: &str,
        file_name: &str,
        session_id: &str,
        part_number: u32,
    ) -> Result<PartDestination, BackendError> {
        self.calls.lock().push(format!("authorize:{}", part_number));
        if self.fail_authorize == Some(part_number) {
            return Err(BackendError::with_status(
                BackendOperation::AuthorizePart,
                403,
                "denied",
            ));
        }
        Ok(PartDestination::put(format!(
            "mock://{}/{}/{}",
            file_name, session_id, part_number
        )))
    }

    async fn finalize_upload(
        &self,
        _bucket: &str,
        _file_name: &str,
        session_id: &str,
        receipts: &[Receipt],
    ) -> Result<FinalizeAck, BackendError> {
        self.calls.lock().push(format!("finalize:{}", session_id));
        *self.finalized.lock() = Some(receipts.to_vec());
        if self.fail_finalize {
            return Err(BackendError::with_status(
                BackendOperation::FinalizeUpload,
                400,
                "InvalidPartOrder",
            ));
        }
        Ok(FinalizeAck {
            success: true,
            location: Some(format!("mock://{}", session_id)),
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    /// 返回 500 的分片
    pub fail_part: Option<u32>,
    /// 成功但不返回 ETag 的分片
    pub missing_etag_part: Option<u32>,
    /// 每个分片的延迟（毫秒）
    pub delays: HashMap<u32, u64>,
    pub active: AtomicUsize,
    pub peak: AtomicUsize,
    /// (分片序号, 字节数)，按完成顺序
    pub settled: Mutex<Vec<(u32, usize)>>,
    /// 发送指定分片时触发取消
    pub cancel_on_part: Mutex<Option<(u32, CancellationToken)>>,
}

impl MockTransport {
    pub fn settled_parts(&self) -> Vec<u32> {
        let mut parts: Vec<u32> = self.settled.lock().iter().map(|(n, _)| *n).collect();
        parts.sort_unstable();
        parts
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

fn part_number_of(destination: &PartDestination) -> u32 {
    destination
        .url
        .rsplit('/')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl PartTransport for MockTransport {
    async fn send_part(
        &self,
        destination: &PartDestination,
        data: Vec<u8>,
    ) -> Result<PartResponse, BackendError> {
        let part_number = part_number_of(destination);
        if let Some((target, token)) = self.cancel_on_part.lock().as_ref() {
            if *target == part_number {
                token.cancel();
            }
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&part_number).copied().unwrap_or(5);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.settled.lock().push((part_number, data.len()));

        if self.fail_part == Some(part_number) {
            return Err(BackendError::with_status(
                BackendOperation::TransferPart,
                500,
                "InternalError",
            ));
        }
        if self.missing_etag_part == Some(part_number) {
            return Ok(PartResponse { entity_tag: None });
        }
        Ok(PartResponse {
            entity_tag: Some(format!("\"etag-{}\"", part_number)),
        })
    }
}
