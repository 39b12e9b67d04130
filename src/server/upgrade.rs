use std::time::Instant;

use axum::extract::State;
use axum::response::IntoResponse;
use time::format_description::well_known::Rfc2822;
use time::Duration;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::client::ChainQuery;
use crate::error::Error;
use crate::metrics::UpgradeGauge;
use crate::server::{exposition, ServerState};

/// A pending upgrade plan together with its arrival estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub name: String,
    pub info: String,
    pub height: i64,
    pub remaining_blocks: i64,
    pub estimated_time: String,
}

/// Fetches the scheduled upgrade plan and estimates when its height will be
/// reached, by extrapolating the mean block interval over the last
/// `block_window` blocks. Returns None when no plan is pending or the plan
/// height is already behind the chain tip.
pub async fn plan_snapshot<C: ChainQuery>(
    client: &C,
    block_window: i64,
) -> Result<Option<PlanSnapshot>, Error> {
    let plan = match client.current_upgrade_plan().await? {
        Some(plan) => plan,
        None => return Ok(None),
    };
    let plan_height: i64 = plan.height.parse()?;

    let latest = client.latest_block().await?;
    let remaining = plan_height - latest.height;
    if remaining <= 0 {
        return Ok(None);
    }

    // a chain this young has no history to extrapolate from
    let window = block_window.min(latest.height - 1);
    if window < 1 {
        return Ok(None);
    }

    let earlier = client.block(latest.height - window).await?;
    let mean_interval = (latest.time - earlier.time).as_seconds_f64() / window as f64;
    let eta = latest.time + Duration::seconds_f64(mean_interval * remaining as f64);

    Ok(Some(PlanSnapshot {
        name: plan.name,
        info: plan.info,
        height: plan_height,
        remaining_blocks: remaining,
        estimated_time: eta.format(&Rfc2822)?,
    }))
}

pub async fn get_upgrade_metrics(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, Error> {
    let request_id = Uuid::new_v4();
    let span = info_span!("upgrade_request", %request_id);

    async move {
        info!("calling /metrics/upgrade");
        let started = Instant::now();

        let chain = &state.config.chain;
        let gauge = UpgradeGauge::new(chain.const_labels())?;

        match plan_snapshot(state.client.as_ref(), chain.block_window).await {
            Ok(Some(snapshot)) => gauge.set_plan(
                &snapshot.info,
                &snapshot.name,
                snapshot.height,
                &snapshot.estimated_time,
                snapshot.remaining_blocks,
            ),
            Ok(None) => gauge.set_none(),
            // a failed estimate degrades to no sample at all
            Err(err) => error!(%err, "could not build upgrade plan snapshot"),
        }

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered upgrade metrics"
        );

        Ok(exposition(gauge.render()?))
    }
    .instrument(span)
    .await
}
