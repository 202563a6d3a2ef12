use anyhow::{bail, Context};
use clap::Parser;
use loghook::adapters::{start_api_server, PostgresStore};
use loghook::cli::{self, Cli, Commands};
use loghook::config::{AppConfig, LoggingConfig};
use loghook::coordination::{install_signal_handlers, GracefulShutdown, ShutdownSignal};
use loghook::services::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    if let Err(problems) = config.validate() {
        for problem in &problems {
            eprintln!("config: {}", problem);
        }
        bail!("{} configuration problem(s)", problems.len());
    }

    match cli.command {
        Commands::Serve { memory } => {
            let _guard = init_logging(&config.logging);
            run_serve(config, memory).await.context("serve failed")?;
        }
        Commands::Migrate => {
            init_logging_simple();
            connect(&config)
                .await?
                .migrate()
                .await
                .context("failed to apply migrations")?;
            println!("migrations applied");
        }
        Commands::Drain => {
            init_logging_simple();
            cli::drain_queue(&postgres_pipeline(&config).await?).await?;
        }
        Commands::Checkpoint => {
            init_logging_simple();
            cli::create_checkpoint(&postgres_pipeline(&config).await?).await?;
        }
        Commands::Replay {
            checkpoint_id,
            after,
            limit,
        } => {
            init_logging_simple();
            let pipeline = postgres_pipeline(&config).await?;
            cli::replay_checkpoint(&pipeline, &checkpoint_id, after, limit).await?;
        }
        Commands::Status => {
            init_logging_simple();
            cli::show_status(&postgres_pipeline(&config).await?).await?;
        }
    }

    Ok(())
}

async fn connect(config: &AppConfig) -> anyhow::Result<PostgresStore> {
    PostgresStore::new(
        &config.database.url,
        config.database.max_connections,
        &config.queue.name,
    )
    .await
    .context("failed to connect to PostgreSQL")
}

async fn postgres_pipeline(config: &AppConfig) -> anyhow::Result<Pipeline> {
    Ok(Pipeline::postgres(connect(config).await?, config))
}

async fn run_serve(config: AppConfig, memory: bool) -> anyhow::Result<()> {
    let pipeline = if memory {
        warn!("Running with the in-memory backend; nothing survives a restart");
        Pipeline::in_memory(&config)
    } else {
        let store = connect(&config).await?;
        store.migrate().await.context("failed to apply migrations")?;
        Pipeline::postgres(store, &config)
    };

    let shutdown = Arc::new(GracefulShutdown::with_defaults());
    install_signal_handlers(shutdown.clone());

    let worker = pipeline.worker.clone().spawn(shutdown.stop_receiver());
    spawn_metrics_logger(pipeline.clone(), shutdown.clone());

    let served = start_api_server(
        pipeline.clone(),
        &config.server,
        config.auth.clone(),
        shutdown.clone(),
    )
    .await;

    if let Err(ref e) = served {
        error!("API server failed: {}", e);
        shutdown.request_shutdown(ShutdownSignal::Graceful);
    }

    shutdown.drain_worker(worker).await;
    info!("Final counters: {}", pipeline.metrics.summary());
    Ok(served?)
}

fn spawn_metrics_logger(pipeline: Pipeline, shutdown: Arc<GracefulShutdown>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_LOG_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => info!("Ingest counters: {}", pipeline.metrics.summary()),
                _ = shutdown.requested() => break,
            }
        }
    });
}

/// Console logging plus a daily-rotated file under `LOGHOOK_LOG_DIR`
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},loghook=debug,sqlx=warn", logging.level))
    });

    let mut guard = None;
    let file_layer = match std::env::var("LOGHOOK_LOG_DIR") {
        Ok(log_dir) => {
            // `rolling::daily` panics if it cannot create the file, so check first
            let test_path = std::path::Path::new(&log_dir).join(".loghook_write_test");
            let writable = std::fs::create_dir_all(&log_dir).is_ok()
                && std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&test_path)
                    .is_ok();

            if writable {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "loghook.log");
                let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
                guard = Some(file_guard);
                eprintln!("Logging to: {}/loghook.log", log_dir);

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
            } else {
                eprintln!(
                    "Warning: Could not write to log directory {}, file logging disabled",
                    log_dir
                );
                None
            }
        }
        Err(_) => None,
    };

    let json_layer = logging
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let console_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    guard
}

fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}
