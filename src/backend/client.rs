// 上传后端 HTTP 客户端实现
//
// 应用服务器持有对象存储凭证，客户端只通过三个 JSON 接口交互：
// - POST /api/upload/init               创建分片上传，返回 uploadId
// - POST /api/upload/get-presigned-url  获取单个分片的预签名地址
// - POST /api/upload/complete           提交有序回执，合并文件
//
// 分片字节直接 PUT 到预签名地址，响应头中的 ETag 即为分片回执

use crate::backend::types::{
    BackendError, BackendOperation, CompleteUploadRequest, FinalizeAck, InitUploadRequest,
    InitUploadResponse, PartDestination, PartResponse, PresignPartRequest, PresignPartResponse,
    Receipt,
};
use crate::backend::{PartTransport, UploadBackend};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::ETAG;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

const INIT_PATH: &str = "/api/upload/init";
const PRESIGN_PATH: &str = "/api/upload/get-presigned-url";
const COMPLETE_PATH: &str = "/api/upload/complete";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("创建 HTTP 客户端失败")
}

/// 读取 JSON 响应，非 2xx 状态视为后端拒绝
async fn read_json<T: DeserializeOwned>(
    response: Response,
    operation: BackendOperation,
) -> Result<T, BackendError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BackendError::with_status(operation, status.as_u16(), format!("读取响应失败: {}", e)))?;

    debug!("{} 响应: status={}, body={}", operation, status, body);

    if !status.is_success() {
        return Err(BackendError::with_status(operation, status.as_u16(), body));
    }

    serde_json::from_str(&body).map_err(|e| {
        BackendError::with_status(operation, status.as_u16(), format!("解析响应失败: {}", e))
    })
}

/// 应用服务器上传接口客户端
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// 创建新的后端客户端
    ///
    /// # 参数
    /// * `base_url` - 应用服务器地址（如 `http://127.0.0.1:3000`）
    /// * `timeout` - 单次请求超时
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("初始化上传后端客户端: {}", base_url);
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        operation: BackendOperation,
    ) -> Result<T, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::new(operation, format!("请求发送失败: {}", e)))?;

        read_json(response, operation).await
    }
}

#[async_trait]
impl UploadBackend for HttpBackend {
    async fn begin_upload(&self, bucket: &str, file_name: &str) -> Result<String, BackendError> {
        info!("创建分片上传: bucket={}, file={}", bucket, file_name);

        let resp: InitUploadResponse = self
            .post_json(
                INIT_PATH,
                &InitUploadRequest {
                    bucket,
                    filename: file_name,
                },
                BackendOperation::BeginUpload,
            )
            .await?;

        match resp.upload_id {
            Some(id) if !id.is_empty() => Ok(id),
            _ => {
                error!("创建分片上传失败：响应中没有 uploadId");
                Err(BackendError::new(
                    BackendOperation::BeginUpload,
                    "响应中没有 uploadId",
                ))
            }
        }
    }

    async fn authorize_part(
        &self,
        bucket: &str,
        file_name: &str,
        session_id: &str,
        part_number: u32,
    ) -> Result<PartDestination, BackendError> {
        let resp: PresignPartResponse = self
            .post_json(
                PRESIGN_PATH,
                &PresignPartRequest {
                    bucket,
                    filename: file_name,
                    upload_id: session_id,
                    part_number,
                },
                BackendOperation::AuthorizePart,
            )
            .await?;

        if resp.url.is_empty() {
            return Err(BackendError::new(
                BackendOperation::AuthorizePart,
                "预签名地址为空",
            ));
        }

        Ok(resp.into())
    }

    async fn finalize_upload(
        &self,
        bucket: &str,
        file_name: &str,
        session_id: &str,
        receipts: &[Receipt],
    ) -> Result<FinalizeAck, BackendError> {
        info!(
            "合并分片: file={}, uploadid={}, parts={}",
            file_name,
            session_id,
            receipts.len()
        );

        let ack: FinalizeAck = self
            .post_json(
                COMPLETE_PATH,
                &CompleteUploadRequest {
                    bucket,
                    filename: file_name,
                    upload_id: session_id,
                    parts: receipts,
                },
                BackendOperation::FinalizeUpload,
            )
            .await?;

        if !ack.success {
            return Err(BackendError::new(
                BackendOperation::FinalizeUpload,
                "后端拒绝合并请求",
            ));
        }

        Ok(ack)
    }
}

/// 预签名地址直传
#[derive(Debug, Clone)]
pub struct HttpPartTransport {
    client: Client,
}

impl HttpPartTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl PartTransport for HttpPartTransport {
    async fn send_part(
        &self,
        destination: &PartDestination,
        data: Vec<u8>,
    ) -> Result<PartResponse, BackendError> {
        let op = BackendOperation::TransferPart;
        let method = Method::from_bytes(destination.method.as_bytes())
            .map_err(|_| BackendError::new(op, format!("无效的 HTTP 方法: {}", destination.method)))?;

        let size = data.len();
        let response = self
            .client
            .request(method, &destination.url)
            .body(data)
            .send()
            .await
            .map_err(|e| BackendError::new(op, format!("分片发送失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::with_status(op, status.as_u16(), body));
        }

        let entity_tag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty());

        debug!(
            "分片发送完成: size={}, status={}, etag={:?}",
            size, status, entity_tag
        );

        Ok(PartResponse { entity_tag })
    }
}
