// 上传分片规划
//
// 分片规则：
// - 分片序号从 1 开始，按偏移量升序排列
// - 分片之间连续、不重叠，长度之和等于文件大小
// - 除最后一个分片外，每个分片长度都等于 part_size
// - 空文件规划为一个长度为 0 的分片（仍然走完整的授权/上传/合并流程）

use crate::uploader::error::UploadError;
use std::ops::Range;
use tracing::debug;

/// 默认分片大小: 5MB
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// 单个上传会话的最大分片数
pub const MAX_PART_COUNT: u32 = 10_000;

/// 上传分片
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 分片序号（从 1 开始）
    pub part_number: u32,
    /// 起始偏移
    pub offset: u64,
    /// 分片长度
    pub length: u64,
}

impl Part {
    /// 字节范围
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }

    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// 计算分片
///
/// # 参数
/// * `file_length` - 文件总大小
/// * `part_size` - 分片大小（必须大于 0）
pub fn plan(file_length: u64, part_size: u64) -> Result<Vec<Part>, UploadError> {
    if part_size == 0 {
        return Err(UploadError::InvalidPartSize(part_size));
    }

    if file_length == 0 {
        return Ok(vec![Part {
            part_number: 1,
            offset: 0,
            length: 0,
        }]);
    }

    let count = file_length.div_ceil(part_size);
    if count > MAX_PART_COUNT as u64 {
        return Err(UploadError::TooManyParts {
            count,
            limit: MAX_PART_COUNT,
        });
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut offset = 0u64;
    let mut part_number = 1u32;

    while offset < file_length {
        // 剩余长度不足一个分片时取剩余长度，避免 offset + part_size 溢出
        let length = part_size.min(file_length - offset);
        parts.push(Part {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }

    debug!(
        "分片规划: 文件大小={} bytes, 分片大小={} bytes, 分片数量={}",
        file_length,
        part_size,
        parts.len()
    );

    Ok(parts)
}
