//! Shared handler state and the serving loop.

use std::sync::Arc;

use anyhow::Result;
use opslink_core::Orchestrator;
use tokio::net::TcpListener;
use tracing::info;

use crate::routes;

// Everything the handlers need. The property key rides along because tracker
// webhooks are parsed before any trigger exists to carry it.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub property_key: String,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, property_key: impl Into<String>) -> Self {
        Self {
            orchestrator,
            property_key: property_key.into(),
        }
    }
}

pub async fn run(state: AppState, bind_addr: &str) -> Result<()> {
    let app = routes::router(Arc::new(state));
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
