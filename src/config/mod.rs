// 配置管理模块

use crate::uploader::{Concurrency, UploadError, UploadOptions, DEFAULT_CONCURRENCY_CEILING};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

const MB: u64 = 1024 * 1024;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传后端配置
    #[serde(default)]
    pub backend: BackendConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 上传后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 应用服务器地址
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 目标 bucket
    #[serde(default)]
    pub bucket: String,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bucket: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 分片大小 (MB)
    #[serde(default = "default_part_size_mb")]
    pub part_size_mb: u64,
    /// 每批最大并发分片数，不配置表示不限（一次提交全部分片）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// 不限并发时的上限
    #[serde(default = "default_concurrency_ceiling")]
    pub concurrency_ceiling: usize,
}

fn default_part_size_mb() -> u64 {
    5
}

fn default_concurrency_ceiling() -> usize {
    DEFAULT_CONCURRENCY_CEILING
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            part_size_mb: default_part_size_mb(),
            max_concurrency: None,
            concurrency_ceiling: default_concurrency_ceiling(),
        }
    }
}

impl UploadConfig {
    /// 分片大小（字节）
    pub fn part_size(&self) -> u64 {
        self.part_size_mb.saturating_mul(MB)
    }

    pub fn concurrency(&self) -> Concurrency {
        Concurrency::from_option(self.max_concurrency)
    }

    /// 验证上传配置
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.part_size_mb == 0 {
            return Err(UploadError::InvalidPartSize(0));
        }
        if self.part_size_mb.checked_mul(MB).is_none() {
            return Err(UploadError::InvalidPartSize(self.part_size_mb));
        }
        if self.max_concurrency == Some(0) || self.concurrency_ceiling == 0 {
            return Err(UploadError::InvalidConcurrency);
        }
        Ok(())
    }

    /// 转换为上传选项
    pub fn to_options(&self, bucket: impl Into<String>) -> UploadOptions {
        UploadOptions::new(bucket)
            .with_part_size(self.part_size())
            .with_concurrency(self.concurrency())
            .with_concurrency_ceiling(self.concurrency_ceiling)
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传配置无效")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.upload
            .validate()
            .context("保存配置失败：上传配置无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 配置文件不存在时写出默认配置，已存在但无效时保留原文件
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}
