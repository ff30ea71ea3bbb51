use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tower::make::Shared;
use tracing_subscriber::EnvFilter;

use quoteflow::config::AppConfig;
use quoteflow::db;
use quoteflow::documents::ChromiumEngine;
use quoteflow::notifications::SmtpMailer;
use quoteflow::payments::SimulatedGateway;
use quoteflow::routes;
use quoteflow::state::{AppState, Collaborators};
use quoteflow::storage::LocalDiskStorage;
use quoteflow::submissions::PgSubmissionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        uploads_dir = %config.uploads_dir.display(),
        generated_dir = %config.generated_dir.display(),
        upload_auth_enabled = config.upload_admin_token.is_some(),
        smtp_host = %config.smtp.host,
        chromium = %config.chromium_bin,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let submissions = PgSubmissionStore::new(pool);
    submissions
        .prepare()
        .await
        .context("failed to prepare submission tables")?;
    let mailer = SmtpMailer::new(&config.smtp).context("failed to configure SMTP transport")?;

    let collaborators = Collaborators {
        submissions: Arc::new(submissions),
        uploads: Arc::new(LocalDiskStorage::new(config.uploads_dir.clone())),
        mailer: Arc::new(mailer),
        pdf_engine: Arc::new(ChromiumEngine::new(config.chromium_bin.clone())),
        settlement: Arc::new(SimulatedGateway::new(config.payment.settlement_delay)),
    };

    let listen_addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let state = AppState::new(config, collaborators);
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, Shared::new(router))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
