// Tabula - conversational data analysis over tabular datasets

pub mod config;
pub mod models;
pub mod types;
pub mod agents;
pub mod llm;
pub mod dataset;   // CSV loading, cleaning and profiling
pub mod query;     // Query agent: plans, execution, charts
pub mod pipeline;  // Intent-routed turn orchestration
pub mod session;
pub mod routes;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;
pub use pipeline::Pipeline;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
