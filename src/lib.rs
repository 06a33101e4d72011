// Patient Summary - document ingestion, record retrieval and specialist summary PDFs

pub mod config;
pub mod db;
pub mod extraction;
pub mod ingest;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod render;
pub mod retrieval;
pub mod routes;
pub mod storage;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
