// 上传数据源
//
// 上传编排只按 (偏移, 长度) 读取分片，不会修改数据源

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 可按范围读取的字节源
#[async_trait]
pub trait PartSource: Send + Sync {
    /// 逻辑文件名（作为对象存储的 key）
    fn name(&self) -> &str;

    /// 总字节数
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取 [offset, offset + length) 范围的数据
    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Vec<u8>>;
}

/// 本地文件
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
    name: String,
    len: u64,
}

impl LocalFileSource {
    /// 打开本地文件，文件大小在此时确定
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("无法读取文件信息: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .map(|s| s.to_string())
            .with_context(|| format!("无法获取文件名: {:?}", path))?;

        Ok(Self {
            path,
            name,
            len: metadata.len(),
        })
    }

    /// 使用自定义远程文件名
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PartSource for LocalFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        let path = self.path.clone();

        let buffer = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut file = std::fs::File::open(&path)?;
            file.seek(SeekFrom::Start(offset))?;

            let mut buffer = vec![0u8; length as usize];
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("读取任务异常: {}", e)))??;

        debug!(
            "读取分片数据: file={}, offset={}, size={} bytes",
            self.name,
            offset,
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 内存数据源
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl PartSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        let start = offset as usize;
        let end = start
            .checked_add(length as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("读取范围越界: {}+{} > {}", offset, length, self.data.len()),
                )
            })?;

        Ok(self.data[start..end].to_vec())
    }
}
