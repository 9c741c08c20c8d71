use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use recon_core::config::AppConfig;
use recon_dispatcher::{SchedulerDeps, SchedulerService};
use recon_infrastructure::{build_notifier, build_stores};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod shutdown;

use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("recon-scheduler")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式侦察平台任务调度服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时依次尝试默认路径"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认路径>")))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .cloned()
        .unwrap_or_else(|| config.observability.log_format.clone());
    init_logging(&log_level, &log_format)?;

    info!("启动侦察平台任务调度服务");
    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind_address)?;
    }

    let stores = build_stores(&config).await.context("初始化存储失败")?;
    let notifier = build_notifier(&config.notify).context("初始化完成通知失败")?;
    let service = Arc::new(SchedulerService::new(
        config.clone(),
        SchedulerDeps::new(stores.queue, stores.kv, stores.tasks, notifier),
    ));

    let shutdown_manager = ShutdownManager::new();

    let recovery = service.recovery();
    let recovery_handle = tokio::spawn({
        let recovery = Arc::clone(&recovery);
        async move {
            if let Err(e) = recovery.start().await {
                error!("任务恢复服务运行失败: {e}");
            }
        }
    });

    let app = recon_api::create_app(Arc::clone(&service), config.api.cors_enabled);
    let listener = tokio::net::TcpListener::bind(&config.api.bind_address)
        .await
        .with_context(|| format!("绑定API地址失败: {}", config.api.bind_address))?;
    info!("API服务监听于 {}", config.api.bind_address);

    let server_handle = tokio::spawn({
        let mut shutdown_rx = shutdown_manager.subscribe().await;
        async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await;
            if let Err(e) = result {
                error!("API服务运行失败: {e}");
            }
        }
    });

    wait_for_shutdown_signal().await?;
    info!("收到关闭信号，开始优雅关闭...");

    shutdown_manager.shutdown().await;
    recovery.stop().await;

    if tokio::time::timeout(Duration::from_secs(30), server_handle)
        .await
        .is_err()
    {
        warn!("API服务关闭超时，强制退出");
    }
    // 恢复循环在下一次tick才会检查停止标记，正在进行的检查允许跑完
    let abort = recovery_handle.abort_handle();
    if tokio::time::timeout(Duration::from_secs(5), recovery_handle)
        .await
        .is_err()
    {
        abort.abort();
    }

    info!("任务调度服务已退出");
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

fn init_metrics(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("指标监听地址无效: {bind_address}"))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("安装Prometheus导出器失败: {e}"))?;

    info!("Prometheus指标导出于 {addr}");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("监听Ctrl+C信号失败")?;
                info!("收到Ctrl+C信号");
            }
            _ = terminate.recv() => {
                info!("收到SIGTERM信号");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.context("监听Ctrl+C信号失败")?;
        info!("收到Ctrl+C信号");
    }

    Ok(())
}
