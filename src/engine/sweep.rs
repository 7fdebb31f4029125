use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::engine::dispatch::dispatch_job;
use crate::models::job::JobEvent;
use crate::state::AppState;

/// The system's only scheduling loop. Runs until the shutdown signal flips.
pub async fn run_sweep(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(state.config.sweep_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        interval_secs = state.config.sweep_interval_secs,
        "expiry sweep started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_tick(&state, Utc::now());
            }
            _ = shutdown.changed() => {
                info!("expiry sweep stopped");
                return;
            }
        }
    }
}

/// One reconciliation pass. Idempotent; a failure on one job is logged and
/// must not keep the rest of the tick from running.
pub fn sweep_tick(state: &AppState, now: DateTime<Utc>) {
    let store = &state.store;
    let window = state.config.visibility_window();

    // Watchdog: kill jobs stuck pending past the limit.
    for job_id in store.expire_stale_jobs(state.config.watchdog(), now) {
        warn!(job_id = %job_id, "pending job hit the watchdog limit");
        state
            .metrics
            .jobs_total
            .with_label_values(&["expired"])
            .inc();
        state.publish(JobEvent::Expired { job_id });
    }

    let orphans = store.clear_orphan_exposures();
    if orphans > 0 {
        info!(count = orphans, "cleared exposures of settled jobs");
    }

    for job_id in store.pending_job_ids() {
        let (total, lapsed) = store.exposure_counts(job_id, window, now);

        if total == 0 {
            // The courier pool may have changed since the last attempt.
            dispatch_job(state, job_id, now);
        } else if lapsed == total {
            advance_round(state, job_id, now);
        }
        // Some slots still live: at least one courier is looking; wait.
    }

    state
        .metrics
        .exposures_active
        .set(store.live_exposures() as i64);
    state.metrics.sweep_ticks_total.inc();
}

/// Every slot in the round lapsed: penalize the non-responders, clear the
/// round and offer the job to the next courier.
fn advance_round(state: &AppState, job_id: uuid::Uuid, now: DateTime<Utc>) {
    let store = &state.store;

    let cleared = store.clear_job_exposures(job_id);
    for exposure in &cleared {
        // Rows lapsed by explicit decline already took their penalty on the
        // fast path; only age-outs are penalized here.
        if exposure.lapsed {
            continue;
        }
        if let Err(err) = store.penalize_courier(exposure.courier_id, state.config.penalty(), now) {
            warn!(
                job_id = %job_id,
                courier_id = %exposure.courier_id,
                error = %err,
                "failed to penalize non-responder"
            );
        }
    }

    info!(
        job_id = %job_id,
        cleared = cleared.len(),
        "exposure round fully lapsed; advancing"
    );

    if let Err(err) = store.bump_dispatch_round(job_id) {
        warn!(job_id = %job_id, error = %err, "failed to advance dispatch round");
        return;
    }
    dispatch_job(state, job_id, now);
}
