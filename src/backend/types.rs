// 存储后端类型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// 后端操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOperation {
    /// 创建上传会话
    BeginUpload,
    /// 获取分片上传授权
    AuthorizePart,
    /// 上传分片数据
    TransferPart,
    /// 合并分片，完成上传
    FinalizeUpload,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendOperation::BeginUpload => "begin-upload",
            BackendOperation::AuthorizePart => "authorize-part",
            BackendOperation::TransferPart => "transfer-part",
            BackendOperation::FinalizeUpload => "finalize-upload",
        };
        f.write_str(name)
    }
}

/// 后端调用失败
///
/// `status` 为 HTTP 状态码（请求未到达服务器时为 None）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation} 失败 (status={status:?}): {message}")]
pub struct BackendError {
    pub operation: BackendOperation,
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    pub fn new(operation: BackendOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(operation: BackendOperation, status: u16, message: impl Into<String>) -> Self {
        Self {
            operation,
            status: Some(status),
            message: message.into(),
        }
    }
}

/// 分片上传目标（限时、一次性授权）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDestination {
    /// 预签名地址
    pub url: String,
    /// HTTP 方法（默认 PUT）
    pub method: String,
    /// 授权过期时间
    pub expires_at: Option<DateTime<Utc>>,
}

impl PartDestination {
    pub fn put(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "PUT".to_string(),
            expires_at: None,
        }
    }

    /// 授权是否已过期
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires_at| expires_at <= Utc::now())
            .unwrap_or(false)
    }
}

/// 分片上传响应
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartResponse {
    /// 内容确认令牌（ETag），缺失时视为完整性错误
    pub entity_tag: Option<String>,
}

/// 分片回执
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub entity_tag: String,
}

impl Receipt {
    pub fn new(part_number: u32, entity_tag: impl Into<String>) -> Self {
        Self {
            part_number,
            entity_tag: entity_tag.into(),
        }
    }
}

/// 合并完成确认
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeAck {
    pub success: bool,
    /// 最终对象位置（后端可选返回）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

// =====================================================
// HTTP 接口请求/响应体
// =====================================================

/// POST /api/upload/init
#[derive(Debug, Clone, Serialize)]
pub struct InitUploadRequest<'a> {
    pub bucket: &'a str,
    pub filename: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitUploadResponse {
    #[serde(default)]
    pub upload_id: Option<String>,
}

/// POST /api/upload/get-presigned-url
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignPartRequest<'a> {
    pub bucket: &'a str,
    pub filename: &'a str,
    pub upload_id: &'a str,
    pub part_number: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignPartResponse {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<PresignPartResponse> for PartDestination {
    fn from(resp: PresignPartResponse) -> Self {
        Self {
            url: resp.url,
            method: resp.method.unwrap_or_else(|| "PUT".to_string()),
            expires_at: resp.expires_at,
        }
    }
}

/// POST /api/upload/complete
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadRequest<'a> {
    pub bucket: &'a str,
    pub filename: &'a str,
    pub upload_id: &'a str,
    pub parts: &'a [Receipt],
}
