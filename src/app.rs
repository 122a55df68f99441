use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use birthday_api::create_app;
use birthday_core::config::{AppConfig, IdempotencyBackend};
use birthday_core::traits::{IdempotencyStore, MessageQueue, PersonRepository};
use birthday_core::{Clock, OccurrenceCalculator, PersonService, SystemClock};
use birthday_dispatcher::{DispatcherService, DueItemScanner};
use birthday_infrastructure::{
    DatabaseManager, InMemoryIdempotencyStore, MessageQueueFactory, MetricsCollector,
    RedisIdempotencyStore, SqlitePersonRepository, WebhookNotificationSink,
};
use birthday_worker::{DeliveryConsumer, IdempotencyGate, WorkerService, WorkerSettings};
use clap::ValueEnum;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppMode {
    /// 仅运行Dispatcher
    Dispatcher,
    /// 仅运行Worker
    Worker,
    /// 仅运行API服务器
    Api,
    /// 运行所有组件
    All,
}

/// 主应用程序
///
/// 所有组件共享同一组协作方实例；`All` 模式下内存队列因此能在扫描器与worker之间传递消息。
#[derive(Clone)]
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: Arc<DatabaseManager>,
    repository: Arc<dyn PersonRepository>,
    message_queue: Arc<dyn MessageQueue>,
    calculator: OccurrenceCalculator,
    clock: Arc<dyn Clock>,
    metrics: Arc<MetricsCollector>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        if config.observability.metrics_enabled {
            install_metrics_exporter(&config.observability.metrics_bind_address)?;
        }

        let database = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        database.migrate().await.context("运行数据库迁移失败")?;
        info!("数据库连接成功");

        let repository: Arc<dyn PersonRepository> =
            Arc::new(SqlitePersonRepository::new(database.pool().clone()));

        let message_queue = MessageQueueFactory::create(&config.message_queue, &config.worker.worker_id)
            .await
            .context("连接消息队列失败")?;
        info!("消息队列已就绪: {}", config.message_queue.queue_name);

        Ok(Self {
            calculator: OccurrenceCalculator::new(config.schedule.leap_day_policy),
            config,
            mode,
            database: Arc::new(database),
            repository,
            message_queue,
            clock: Arc::new(SystemClock),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    /// 运行应用程序
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        let result = match self.mode {
            AppMode::Dispatcher => self.run_dispatcher(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::Api => self.run_api(shutdown_rx).await,
            AppMode::All => self.run_all_components(shutdown_rx).await,
        };

        self.database.close().await;
        result
    }

    /// 运行Dispatcher模式
    async fn run_dispatcher(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动Dispatcher服务，扫描间隔: {}秒",
            self.config.dispatcher.scan_interval_seconds
        );

        let scanner = Arc::new(DueItemScanner::new(
            Arc::clone(&self.repository),
            Arc::clone(&self.message_queue),
            self.config.message_queue.queue_name.clone(),
            self.config.dispatcher.scan_buffer(),
            Arc::clone(&self.metrics),
        ));
        let service = DispatcherService::new(
            scanner,
            Arc::clone(&self.clock),
            self.config.dispatcher.scan_interval(),
        );

        service.run(shutdown_rx).await;

        info!("Dispatcher服务已停止");
        Ok(())
    }

    /// 运行Worker模式
    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动Worker服务: {}", self.config.worker.worker_id);

        let store = create_idempotency_store(&self.config).await?;
        let gate = IdempotencyGate::new(
            store,
            self.config.idempotency.key_prefix.clone(),
            self.config.idempotency.marker_ttl(),
        );
        let sink = Arc::new(
            WebhookNotificationSink::from_config(&self.config.notification)
                .context("创建Webhook通知出口失败")?,
        );
        info!("通知出口: {}", sink.webhook_url());

        let consumer = Arc::new(DeliveryConsumer::new(
            Arc::clone(&self.repository),
            sink,
            gate,
            self.calculator.clone(),
            self.config.dispatcher.scan_buffer(),
            Arc::clone(&self.metrics),
        ));

        let worker = WorkerService::new(
            consumer,
            Arc::clone(&self.message_queue),
            Arc::clone(&self.clock),
            WorkerSettings {
                worker_id: self.config.worker.worker_id.clone(),
                queue_name: self.config.message_queue.queue_name.clone(),
                batch_size: self.config.message_queue.batch_size,
                max_concurrent_deliveries: self.config.worker.max_concurrent_deliveries,
                poll_interval: self.config.worker.poll_interval(),
            },
        );

        worker.run(shutdown_rx).await;

        info!("Worker服务已停止");
        Ok(())
    }

    /// 运行API模式
    async fn run_api(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动API服务器: {}", self.config.api.bind_address);

        let person_service = Arc::new(PersonService::new(
            Arc::clone(&self.repository),
            self.calculator.clone(),
        ));
        let app = create_app(person_service, Arc::clone(&self.clock));

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    /// 运行所有组件
    async fn run_all_components(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        let mut handles = Vec::new();

        if self.config.dispatcher.enabled {
            let app = self.clone_for_mode(AppMode::Dispatcher);
            let shutdown_rx = shutdown_rx.resubscribe();

            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_dispatcher(shutdown_rx).await {
                    error!("Dispatcher运行失败: {}", e);
                }
            }));
        }

        if self.config.worker.enabled {
            let app = self.clone_for_mode(AppMode::Worker);
            let shutdown_rx = shutdown_rx.resubscribe();

            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_worker(shutdown_rx).await {
                    error!("Worker运行失败: {}", e);
                }
            }));
        }

        if self.config.api.enabled {
            let app = self.clone_for_mode(AppMode::Api);
            let shutdown_rx = shutdown_rx.resubscribe();

            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_api(shutdown_rx).await {
                    error!("API服务器运行失败: {}", e);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("所有组件已停止");
        Ok(())
    }

    fn clone_for_mode(&self, mode: AppMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// 按配置创建幂等标记存储
async fn create_idempotency_store(config: &AppConfig) -> Result<Arc<dyn IdempotencyStore>> {
    let store: Arc<dyn IdempotencyStore> = match config.idempotency.backend {
        IdempotencyBackend::InMemory => {
            info!("使用进程内幂等标记存储");
            Arc::new(InMemoryIdempotencyStore::new())
        }
        IdempotencyBackend::Redis => {
            info!("使用Redis幂等标记存储");
            Arc::new(
                RedisIdempotencyStore::new(&config.idempotency.redis_url)
                    .await
                    .context("连接幂等缓存失败")?,
            )
        }
    };
    Ok(store)
}

/// 安装Prometheus指标导出器
fn install_metrics_exporter(bind_address: &str) -> Result<()> {
    let addr: SocketAddr = bind_address
        .parse()
        .with_context(|| format!("指标监听地址无效: {bind_address}"))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("安装Prometheus指标导出器失败")?;

    info!("Prometheus指标导出在 http://{}/metrics", addr);
    Ok(())
}
