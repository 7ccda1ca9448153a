// 存储后端模块
//
// 上传编排只依赖两个抽象：
// - UploadBackend：创建会话 / 分片授权 / 合并完成
// - PartTransport：把分片字节发送到授权地址

pub mod client;
#[cfg(test)]
pub(crate) mod mock;
pub mod types;

pub use client::{HttpBackend, HttpPartTransport};
pub use types::{
    BackendError, BackendOperation, FinalizeAck, PartDestination, PartResponse, Receipt,
};

use async_trait::async_trait;

/// 分片上传后端
#[async_trait]
pub trait UploadBackend: Send + Sync {
    /// 创建上传会话，返回 session id
    async fn begin_upload(&self, bucket: &str, file_name: &str) -> Result<String, BackendError>;

    /// 获取单个分片的上传授权
    async fn authorize_part(
        &self,
        bucket: &str,
        file_name: &str,
        session_id: &str,
        part_number: u32,
    ) -> Result<PartDestination, BackendError>;

    /// 按分片序号升序提交回执，合并文件
    async fn finalize_upload(
        &self,
        bucket: &str,
        file_name: &str,
        session_id: &str,
        receipts: &[Receipt],
    ) -> Result<FinalizeAck, BackendError>;
}

/// 分片字节传输
#[async_trait]
pub trait PartTransport: Send + Sync {
    async fn send_part(
        &self,
        destination: &PartDestination,
        data: Vec<u8>,
    ) -> Result<PartResponse, BackendError>;
}
