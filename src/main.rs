use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scorm_bridge::{
    config::Config,
    db,
    routes::{self, AppState},
    runtime::SaveFailure,
    store::{AttemptStore, MemoryAttemptStore, PgAttemptStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "scorm_bridge=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn AttemptStore> = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url).await?;
            db::migrate(&pool).await?;
            tracing::info!("using postgres attempt store");
            Arc::new(PgAttemptStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, attempts are kept in memory only");
            Arc::new(MemoryAttemptStore::new())
        }
    };

    // Saves the content was told succeeded but that never reached the store.
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel::<SaveFailure>();
    tokio::spawn(async move {
        while let Some(f) = failures_rx.recv().await {
            tracing::error!(
                target: "scorm_bridge::ops",
                attempt_id = %f.attempt_id,
                at = %f.at,
                error = %f.error,
                "runtime data not persisted"
            );
        }
    });

    let state = AppState::new(store, config.clone()).with_failures(failures_tx);
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
