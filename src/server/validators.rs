use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::aggregate::aggregate_validators;
use crate::error::Error;
use crate::metrics::ValidatorGauges;
use crate::server::{exposition, ServerState};

/// Builds the validator-set snapshot and renders it. Every request queries
/// the node afresh and writes into its own registry.
pub async fn get_validators_metrics(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, Error> {
    let request_id = Uuid::new_v4();
    let span = info_span!("validators_request", %request_id);

    async move {
        info!("calling /metrics/validators");
        let started = Instant::now();

        let chain = &state.config.chain;
        let validators = aggregate_validators(
            state.client.as_ref(),
            &chain.valcons_prefix(),
            chain.denom_coefficient,
            chain.pagination_limit,
        )
        .await;

        let gauges = ValidatorGauges::new(chain.const_labels())?;
        for enriched in &validators {
            gauges.record(enriched, &chain.denom);
        }
        let body = gauges.render()?;

        info!(
            validators = validators.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered validator metrics"
        );

        Ok(exposition(body))
    }
    .instrument(span)
    .await
}
