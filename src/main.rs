use std::time::Duration;

use anyhow::{bail, Context, Result};
use birthday_core::config::{AppConfig, MessageQueueType};
use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod shutdown;

use app::{AppMode, Application};
use shutdown::ShutdownManager;

/// 正在投递的批次在该时限内收尾
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// 生日提醒通知服务
#[derive(Debug, Parser)]
#[command(name = "birthday-notifier", version, about = "生日提醒通知服务")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, value_name = "FILE", default_value = "config/notifier.toml")]
    config: String,

    /// 运行的组件
    #[arg(short, long, value_enum, default_value_t = AppMode::All)]
    mode: AppMode,

    /// Worker ID，同时作为Redis消费者组内的消费者名称
    #[arg(long, value_name = "ID")]
    worker_id: Option<String>,

    /// 日志级别，设置了RUST_LOG时以环境变量为准
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    install_subscriber(&cli.log_level, cli.log_format)?;

    info!(config = %cli.config, mode = ?cli.mode, "启动生日提醒通知服务");

    let config = load_config(&cli)?;
    check_mode_enabled(cli.mode, &config)?;
    log_schedule(&config);
    for hint in deployment_hints(cli.mode, &config) {
        warn!("{hint}");
    }

    let app = Application::new(config, cli.mode).await?;
    let shutdown = ShutdownManager::new();
    let mut app_task = {
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move { app.run(shutdown_rx).await })
    };

    tokio::select! {
        source = termination_signal() => info!("收到{source}，开始优雅关闭"),
        // API端口绑定失败等情况下组件会先于信号退出
        finished = &mut app_task => {
            shutdown.shutdown();
            return finished.context("应用任务异常终止")?.context("应用运行失败");
        }
    }

    shutdown.shutdown();

    match tokio::time::timeout(SHUTDOWN_GRACE, app_task).await {
        Ok(Ok(Ok(()))) => info!("生日提醒通知服务已退出"),
        Ok(Ok(Err(e))) => error!("应用关闭时出错: {e:#}"),
        Ok(Err(e)) => error!("应用任务异常终止: {e}"),
        Err(_) => warn!("{}秒内未完成关闭，强制退出", SHUTDOWN_GRACE.as_secs()),
    }

    Ok(())
}

fn install_subscriber(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.context("初始化日志订阅器失败")
}

/// 读取配置文件并应用命令行覆盖项
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(Some(&cli.config))
        .with_context(|| format!("加载配置文件失败: {}", cli.config))?;

    if let Some(id) = &cli.worker_id {
        config.worker.worker_id = id.clone();
        config.worker.validate().context("命令行指定的worker-id无效")?;
    }

    Ok(config)
}

fn check_mode_enabled(mode: AppMode, config: &AppConfig) -> Result<()> {
    let (name, enabled) = match mode {
        AppMode::Dispatcher => ("dispatcher", config.dispatcher.enabled),
        AppMode::Worker => ("worker", config.worker.enabled),
        AppMode::Api => ("api", config.api.enabled),
        AppMode::All => (
            "all",
            config.dispatcher.enabled || config.worker.enabled || config.api.enabled,
        ),
    };

    if !enabled {
        bail!("{name} 模式下没有可运行的组件，请检查配置中的 enabled 开关");
    }
    Ok(())
}

fn log_schedule(config: &AppConfig) {
    info!(
        scan_interval_secs = config.dispatcher.scan_interval_seconds,
        scan_buffer_secs = config.dispatcher.scan_buffer_seconds,
        leap_day_policy = ?config.schedule.leap_day_policy,
        "调度参数"
    );
    info!(
        queue = ?config.message_queue.r#type,
        max_retries = config.message_queue.max_retries,
        idempotency = ?config.idempotency.backend,
        marker_ttl_secs = config.idempotency.marker_ttl_seconds,
        "投递参数"
    );
}

/// 配置本身合法但在当前模式下可能导致漏发或重复发送的组合
fn deployment_hints(mode: AppMode, config: &AppConfig) -> Vec<String> {
    let mut hints = Vec::new();

    if config.message_queue.r#type == MessageQueueType::InMemory
        && matches!(mode, AppMode::Dispatcher | AppMode::Worker)
    {
        hints.push(format!(
            "内存队列只在进程内可见，单独以 {mode:?} 模式运行时队列的另一端不会有人处理"
        ));
    }

    let redelivery_window = config
        .message_queue
        .visibility_timeout()
        .saturating_mul(config.message_queue.max_retries);
    if config.idempotency.marker_ttl() < redelivery_window {
        hints.push(format!(
            "幂等标记TTL({}秒)短于重投递窗口({}秒)，标记过期后重投递的消息只能依赖存储中的年份去重",
            config.idempotency.marker_ttl_seconds,
            redelivery_window.as_secs()
        ));
    }

    hints
}

/// 返回触发关闭的信号名称
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!("无法监听SIGTERM，仅响应Ctrl+C: {e}");
                ctrl_c_or_forever().await
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c_or_forever().await
    }
}

async fn ctrl_c_or_forever() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听Ctrl+C: {e}");
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
