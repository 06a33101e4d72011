use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use patient_summary::{
    config::Config,
    db::{self, MemoryRepository, PgRepository, Repository},
    routes::create_router,
    utils::init_logger,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;
    let _log_guard = init_logger(&config.logging)?;
    info!("Configuration loaded: {:?}", config.server);

    let repository: Arc<dyn Repository> = match &config.database.url {
        Some(_) => {
            let pool = db::create_pool(&config.database).await?;

            info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
            info!("Database migrations completed");

            Arc::new(PgRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, job and file records are kept in memory");
            Arc::new(MemoryRepository::new())
        }
    };

    // Create shared state
    let state = AppState::build(config.clone(), repository)?;
    let app = create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
