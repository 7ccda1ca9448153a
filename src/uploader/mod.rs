// 分片上传编排模块
//
// - part：分片规划
// - scheduler：分批并发调度（峰值并发受限，批次失败即停止）
// - receipt：分片回执收集与合并前校验
// - progress：进度汇报（合并前最多 99%）
// - session：单文件上传会话（Begin -> Plan -> Transfer -> Finalize）

pub mod error;
pub mod part;
pub mod progress;
pub mod receipt;
pub mod scheduler;
pub mod session;
pub mod source;

pub use error::{UploadError, UploadPhase};
pub use part::{plan, Part, DEFAULT_PART_SIZE, MAX_PART_COUNT};
pub use progress::{percent_for, ProgressObserver, ProgressReporter, MAX_PENDING_PERCENT};
pub use receipt::{verify_receipts, ReceiptCollector};
pub use scheduler::{BatchScheduler, Concurrency, Job, DEFAULT_CONCURRENCY_CEILING};
pub use session::{SessionState, TransferSession, UploadOptions};
pub use source::{LocalFileSource, MemorySource, PartSource};
