// Chunked Uploader Library
// 分片并行上传核心库

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 上传后端模块（会话 / 分片授权 / 合并）
pub mod backend;

// 分片上传编排模块
pub mod uploader;

// 导出常用类型
pub use backend::{
    BackendError, BackendOperation, FinalizeAck, HttpBackend, HttpPartTransport, PartDestination,
    PartResponse, PartTransport, Receipt, UploadBackend,
};
pub use config::AppConfig;
pub use uploader::{
    plan, BatchScheduler, Concurrency, LocalFileSource, MemorySource, Part, PartSource,
    ProgressObserver, SessionState, TransferSession, UploadError, UploadOptions, UploadPhase,
};
