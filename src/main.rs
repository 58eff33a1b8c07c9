use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use simple_bank::auth::SessionService;
use simple_bank::config::{AppConfig, WorkerConfig};
use simple_bank::db::{Database, PgStore, Store};
use simple_bank::gateway::{self, AppState};
use simple_bank::mail::{EmailSender, HttpMailer, LogMailer};
use simple_bank::shutdown::ShutdownSignal;
use simple_bank::token::{JwtMaker, Maker};
use simple_bank::worker::{Broker, BrokerDistributor, PgBroker, ProcessorConfig, TaskProcessor};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn processor_config(config: &WorkerConfig) -> ProcessorConfig {
    ProcessorConfig {
        concurrency: config.concurrency,
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        lease_timeout: Duration::from_secs(config.lease_timeout_secs),
        recovery_interval: Duration::from_secs(config.recovery_interval_secs),
        verify_url: config.verify_url.clone(),
    }
}

fn build_mailer(config: &AppConfig) -> anyhow::Result<Arc<dyn EmailSender>> {
    let mail = &config.mail;
    match mail.api_url {
        Some(ref api_url) => {
            let mailer = HttpMailer::new(
                api_url.as_str(),
                mail.api_key.as_str(),
                mail.sender_name.as_str(),
                mail.sender_address.as_str(),
            )
            .context("failed to build mail client")?;
            Ok(Arc::new(mailer))
        }
        None => {
            tracing::warn!("mail.api_url not set, verification emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env).context("failed to load configuration")?;
    let _log_guard = simple_bank::logging::init_logging(&app_config)
        .context("failed to install tracing subscriber")?;

    tracing::info!(env = %env, build = env!("SIMPLE_BANK_BUILD"), "starting simple_bank");

    let db = Arc::new(
        Database::connect(&app_config.database.url, app_config.database.max_connections)
            .await
            .context("failed to connect to PostgreSQL")?,
    );
    db.init_schema()
        .await
        .context("failed to initialize schema")?;

    let mut pg_store = PgStore::new(db.pool().clone());
    if let Some(timeout) = app_config.database.tx_timeout() {
        pg_store = pg_store.with_tx_timeout(timeout);
    }
    let store: Arc<dyn Store> = Arc::new(pg_store);
    let broker: Arc<dyn Broker> = Arc::new(PgBroker::new(db.pool().clone()));

    let maker: Arc<dyn Maker> = Arc::new(
        JwtMaker::new(&app_config.token.symmetric_key).context("invalid token symmetric key")?,
    );
    let sessions = Arc::new(SessionService::new(
        store.clone(),
        maker.clone(),
        app_config.token.access_token_duration(),
        app_config.token.refresh_token_duration(),
    ));
    let mailer = build_mailer(&app_config)?;

    let shutdown = Arc::new(ShutdownSignal::new());
    let processor = Arc::new(TaskProcessor::new(
        broker.clone(),
        store.clone(),
        mailer,
        processor_config(&app_config.worker),
        shutdown.clone(),
    ));
    let worker_handles = processor.start();

    let state = AppState::new(
        store,
        maker,
        sessions,
        Arc::new(BrokerDistributor::new(broker)),
    )
    .with_database(db.clone());

    let addr = format!("{}:{}", app_config.gateway.host, app_config.gateway.port);
    let signal = shutdown.clone();
    gateway::run_server(&addr, Arc::new(state), async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        tracing::info!("shutdown requested");
        signal.request_shutdown();
    })
    .await
    .with_context(|| format!("gateway failed on {}", addr))?;

    // in case the server exited on its own
    shutdown.request_shutdown();
    for handle in worker_handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "worker task panicked");
        }
    }

    db.pool().close().await;
    tracing::info!("simple_bank stopped");
    Ok(())
}
