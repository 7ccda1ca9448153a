// 上传错误类型

use crate::backend::BackendError;
use thiserror::Error;

/// 上传阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Begin,
    Plan,
    Transfer,
    Finalize,
}

/// 上传编排错误
///
/// 任何分片失败都会使整个会话失败，不存在"部分成功"
#[derive(Debug, Error)]
pub enum UploadError {
    /// 创建上传会话失败
    #[error("创建上传会话失败: {0}")]
    SessionInit(#[source] BackendError),

    /// 分片大小为 0
    #[error("无效的分片大小: {0}")]
    InvalidPartSize(u64),

    /// 分片数量超过上限
    #[error("分片数量 {count} 超过上限 {limit}")]
    TooManyParts { count: u64, limit: u32 },

    /// 并发数为 0
    #[error("并发数必须大于 0")]
    InvalidConcurrency,

    /// 分片授权失败
    #[error("[分片#{part_number}] 获取上传授权失败: {source}")]
    Authorization {
        part_number: u32,
        #[source]
        source: BackendError,
    },

    /// 读取分片数据失败
    #[error("[分片#{part_number}] 读取分片数据失败: {source}")]
    Source {
        part_number: u32,
        #[source]
        source: std::io::Error,
    },

    /// 分片传输失败
    #[error("[分片#{part_number}] 上传失败: {source}")]
    PartTransfer {
        part_number: u32,
        #[source]
        source: BackendError,
    },

    /// 传输成功但响应中没有 ETag
    #[error("[分片#{part_number}] 上传响应缺少 ETag")]
    TransferIntegrity { part_number: u32 },

    /// 合并前本地回执校验失败（未调用后端）
    #[error("回执校验失败: {0}")]
    FinalizationIntegrity(String),

    /// 后端拒绝合并
    #[error("合并分片失败: {0}")]
    Backend(#[source] BackendError),

    #[error("上传已取消")]
    Cancelled,

    #[error("分片任务异常: {0}")]
    JobPanicked(String),

    /// 同一个会话只能执行一次
    #[error("上传会话已启动")]
    AlreadyStarted,
}

impl UploadError {
    /// 出错阶段
    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadError::SessionInit(_) | UploadError::AlreadyStarted => UploadPhase::Begin,
            UploadError::InvalidPartSize(_)
            | UploadError::TooManyParts { .. }
            | UploadError::InvalidConcurrency => UploadPhase::Plan,
            UploadError::Authorization { .. }
            | UploadError::Source { .. }
            | UploadError::PartTransfer { .. }
            | UploadError::TransferIntegrity { .. }
            | UploadError::Cancelled
            | UploadError::JobPanicked(_) => UploadPhase::Transfer,
            UploadError::FinalizationIntegrity(_) | UploadError::Backend(_) => {
                UploadPhase::Finalize
            }
        }
    }

    /// 出错分片序号（仅分片级错误）
    pub fn part_number(&self) -> Option<u32> {
        match self {
            UploadError::Authorization { part_number, .. }
            | UploadError::Source { part_number, .. }
            | UploadError::PartTransfer { part_number, .. }
            | UploadError::TransferIntegrity { part_number } => Some(*part_number),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendOperation;

    #[test]
    fn test_phase_and_part_number() {
        let err = UploadError::TransferIntegrity { part_number: 2 };
        assert_eq!(err.phase(), UploadPhase::Transfer);
        assert_eq!(err.part_number(), Some(2));

        let err = UploadError::SessionInit(BackendError::new(
            BackendOperation::BeginUpload,
            "denied",
        ));
        assert_eq!(err.phase(), UploadPhase::Begin);
        assert_eq!(err.part_number(), None);

        let err = UploadError::FinalizationIntegrity("missing part 3".into());
        assert_eq!(err.phase(), UploadPhase::Finalize);
    }

    #[test]
    fn test_error_message_names_part() {
        let err = UploadError::Authorization {
            part_number: 7,
            source: BackendError::with_status(BackendOperation::AuthorizePart, 403, "expired"),
        };
        assert!(err.to_string().contains("分片#7"));
    }
}
