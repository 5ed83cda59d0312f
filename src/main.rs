use std::sync::Arc;

use anyhow::anyhow;
use tokio::signal;

use attendance_server::config::Config;
use attendance_server::seed;
use attendance_server::store::{MemoryStore, PgStore, Store};
use attendance_server::token::TokenSigner;
use attendance_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = Config::load()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.max_connections).await?),
        None => {
            log::warn!("DATABASE_URL not set; records live in memory and vanish on exit");
            Arc::new(MemoryStore::new())
        }
    };
    log::info!("Using {} store", store.backend_tag());

    if let Some(path) = &config.seed_file {
        let file = seed::load_seed_file(path).await?;
        let seeded = seed::seed(store.as_ref(), file, &config.department).await?;
        log::info!(
            "Seeding complete: {} faculty, {} students",
            seeded.faculty,
            seeded.students
        );
    }

    let tokens = TokenSigner::new(&config.token_secret, config.token_ttl)
        .map_err(|_| anyhow!("TOKEN_SECRET is not a usable HMAC key"))?;
    let app = router(AppState::new(store, tokens, config.department.clone()));

    log::info!("Starting attendance HTTP server on http://{}", config.addr);
    axum::Server::bind(&config.addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => log::info!("Received Ctrl+C, shutting down"),
            Err(err) => {
                log::error!("Failed to listen for Ctrl+C: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                log::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
