use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use sqlx::migrate::Migrator;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clearway::adapters::PostgresTransferRepository;
use clearway::config::Config;
use clearway::customers::CustomersClient;
use clearway::fundflow::{FirstParty, Strategy};
use clearway::handlers::admin::AdminState;
use clearway::health::{
    CustomersChecker, DependencyChecker, PostgresChecker, RedisChecker, UploadAgentChecker,
};
use clearway::inbound::{
    CorrectionProcessor, PeriodicScheduler, PrenoteProcessor, Processors, ReturnProcessor,
};
use clearway::middleware::idempotency::IdempotencyService;
use clearway::notify::EmailNotifier;
use clearway::pipeline::{bus, Aggregator, MergeBuffer};
use clearway::ports::TransferRepository;
use clearway::{create_admin_app, create_app, db, metrics, schedule, startup, upload, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {e}"))?;

    let pool = db::create_pool(&config).await?;
    Migrator::new(Path::new("./migrations")).await?.run(&pool).await?;
    tracing::info!("database migrations completed");

    let repo: Arc<dyn TransferRepository> =
        Arc::new(PostgresTransferRepository::new(pool.clone()));
    let customers = CustomersClient::new(config.customers_base_url.clone());

    let agent = upload::new_agent(&config.upload)
        .map_err(|e| anyhow::anyhow!("failed to build upload agent: {e}"))?;
    tracing::info!(
        kind = config.upload.kind.type_name(),
        host = %agent.hostname(),
        "upload agent configured"
    );

    let report = startup::validate_environment(&config, &pool, &agent, &customers).await?;
    report.log();
    if !report.is_valid() {
        anyhow::bail!("startup validation failed");
    }

    let notifier = match config.email.clone() {
        Some(email_cfg) => Some(Arc::new(
            EmailNotifier::new(email_cfg)
                .map_err(|e| anyhow::anyhow!("email notifier: {e}"))?,
        )),
        None => None,
    };

    let (publisher, subscription) = bus::from_config(&config.pipeline.stream)
        .await
        .map_err(|e| anyhow::anyhow!("transfer bus: {e}"))?;
    let merger = MergeBuffer::new(config.pipeline.merge_dir.clone())?;
    let strategy: Arc<dyn Strategy> = Arc::new(FirstParty::new(config.odfi.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (ticks, trigger) = schedule::start(&config.odfi.cutoffs, shutdown_rx.clone());
    tracing::info!(
        timezone = %config.odfi.cutoffs.timezone,
        windows = ?config.odfi.cutoffs.windows,
        "registered cutoff windows"
    );

    let aggregator = Aggregator::new(
        config.odfi.clone(),
        config.upload.clone(),
        config.pipeline.flatten_batches,
        repo.clone(),
        agent.clone(),
        merger,
        strategy,
        customers.clone(),
        notifier.clone(),
    );
    let aggregator_task = tokio::spawn(aggregator.run(subscription, ticks, shutdown_rx.clone()));

    let inbound = PeriodicScheduler::new(
        agent.clone(),
        config.storage.clone(),
        config.inbound.clone(),
        config.upload.clone(),
        Processors {
            corrections: CorrectionProcessor::new(),
            prenotes: PrenoteProcessor::new(),
            returns: ReturnProcessor::new(repo.clone(), notifier.clone()),
        },
    );
    let inbound_task = tokio::spawn(inbound.run(shutdown_rx.clone()));

    let idempotency = match config.redis_url.as_deref() {
        Some(url) => match IdempotencyService::new(url) {
            Ok(service) => Some(service),
            Err(err) => {
                tracing::warn!(error = %err, "idempotency disabled, invalid Redis URL");
                None
            }
        },
        None => None,
    };

    let app_state = AppState {
        repo: repo.clone(),
        customers: customers.clone(),
        publisher,
        odfi: config.odfi.clone(),
    };
    let app = create_app(app_state, idempotency);

    let mut checkers: Vec<(String, Box<dyn DependencyChecker>)> = vec![
        ("postgres".into(), Box::new(PostgresChecker::new(pool.clone()))),
        ("upload".into(), Box::new(UploadAgentChecker::new(agent.clone()))),
        ("customers".into(), Box::new(CustomersChecker::new(customers.clone()))),
    ];
    if let Some(url) = &config.redis_url {
        checkers.push(("redis".into(), Box::new(RedisChecker::new(url.clone()))));
    }
    let admin_state = AdminState {
        repo: repo.clone(),
        trigger,
        checkers: Arc::new(checkers),
        metrics: metrics_handle,
        started_at: Instant::now(),
    };
    let admin_app = create_admin_app(admin_state);

    let admin_addr = SocketAddr::from(([0, 0, 0, 0], config.admin_port));
    let admin_listener = TcpListener::bind(admin_addr).await?;
    tracing::info!("admin listening on {admin_addr}");
    let mut admin_shutdown = shutdown_rx.clone();
    let admin_task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = admin_shutdown.changed().await;
        };
        if let Err(err) = axum::serve(admin_listener, admin_app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %err, "admin server exited");
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // shutdown sequence: scheduler and bus subscription stop, the aggregator
    // finishes any in-flight flush, then the admin server and pool close
    let _ = shutdown_tx.send(true);
    let _ = aggregator_task.await;
    let _ = inbound_task.await;
    let _ = admin_task.await;
    pool.close().await;

    tracing::info!("server shut down gracefully");
    Ok(())
}

// handle Ctrl+C and SIGTERM for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
