use std::collections::HashMap;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::client::ChainQuery;
use crate::error::Error;
use crate::metrics::DelegationGauge;
use crate::server::{exposition, ServerState};

/// Reports the number of delegations to a single validator, selected by the
/// `validator_address` query parameter.
pub async fn get_delegations_metrics(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, Error> {
    let request_id = Uuid::new_v4();
    let span = info_span!("delegations_request", %request_id);

    async move {
        info!("calling /metrics/delegations");
        let started = Instant::now();

        let chain = &state.config.chain;
        let address = params
            .get("validator_address")
            .ok_or(Error::InvalidValidatorAddress)?;
        if !address.starts_with(&chain.valoper_prefix()) {
            return Err(Error::InvalidValidatorAddress);
        }

        let gauge = DelegationGauge::new(chain.const_labels())?;
        match state.client.delegation_count(address).await {
            Ok(count) => gauge.record(address, count),
            Err(err) => error!(%err, %address, "could not count delegations"),
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered delegation metrics"
        );

        Ok(exposition(gauge.render()?))
    }
    .instrument(span)
    .await
}
