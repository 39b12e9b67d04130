mod delegations;
mod upgrade;
mod validators;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::client::LcdClient;
use crate::config::ExporterConfig;
use crate::error::Error;

pub use upgrade::{plan_snapshot, PlanSnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Clone)]
pub struct ServerState {
    pub client: Arc<LcdClient>,
    pub config: Arc<ExporterConfig>,
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/metrics/validators", get(validators::get_validators_metrics))
        .route("/metrics/upgrade", get(upgrade::get_upgrade_metrics))
        .route("/metrics/delegations", get(delegations::get_delegations_metrics))
        .with_state(state)
}

/// Wraps a rendered exposition body with the Prometheus text content type.
fn exposition(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body)
}

pub async fn serve(config: ExporterConfig) -> Result<(), Error> {
    let address: SocketAddr = config
        .server
        .address()
        .parse()
        .map_err(|err| Error::Generic(Box::new(err)))?;

    let state = ServerState {
        client: Arc::new(LcdClient::new(&config.node.lcd_addr)),
        config: Arc::new(config),
    };

    info!(%address, "starting metrics server");

    axum::Server::bind(&address)
        .serve(router(state).into_make_service())
        .await
        .map_err(|err| Error::Generic(Box::new(err)))
}
