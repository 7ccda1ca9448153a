use anyhow::Context;
use chunked_uploader::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    logging, HttpBackend, HttpPartTransport, LocalFileSource, TransferSession,
};
use std::sync::Arc;
use tracing::{error, info, warn};

fn usage() -> String {
    "用法: chunked-uploader <本地文件> [远程文件名]".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let local_path = args.next().with_context(usage)?;
    let remote_name = args.next();

    // 配置路径可以通过环境变量覆盖
    let config_path =
        std::env::var("CHUNKED_UPLOADER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_or_default(&config_path).await;

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("Chunked Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));

    if config.backend.bucket.is_empty() {
        warn!("未配置 backend.bucket，由应用服务器决定默认 bucket");
    }

    let timeout = config.backend.request_timeout();
    let backend = Arc::new(HttpBackend::new(config.backend.base_url.clone(), timeout)?);
    let transport = Arc::new(HttpPartTransport::new(timeout)?);

    let mut source = LocalFileSource::open(&local_path).await?;
    if let Some(name) = remote_name {
        source = source.with_name(name);
    }

    let options = config
        .upload
        .to_options(config.backend.bucket.clone())
        .with_progress(|percent: u8| info!("上传进度: {}%", percent));

    let session = TransferSession::new(backend, transport, options);

    // Ctrl-C：停止调度新批次，等待当前批次结束，不合并
    let cancel_token = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，等待当前批次结束后取消上传");
            cancel_token.cancel();
        }
    });

    match session.run(Arc::new(source)).await {
        Ok(ack) => {
            info!(
                "✓ 上传完成: {} ({})",
                local_path,
                ack.location.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        Err(e) => {
            error!("上传失败 [{:?}]: {}", e.phase(), e);
            Err(e.into())
        }
    }
}
