use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::courier::Courier;
use crate::models::job::{required_category, JobEvent, JobStatus};
use crate::state::AppState;

/// Single-offer dispatch: select one eligible courier at random and grant
/// them the visibility slot. Returns how many couriers were newly exposed
/// (0 or 1). The sweep advances to the next courier when the slot lapses.
pub fn dispatch_job(state: &AppState, job_id: Uuid, now: DateTime<Utc>) -> usize {
    let store = &state.store;

    // Selection and slot insertion are one atomic step relative to other
    // writers, so two racing dispatches cannot double-book a courier.
    let _guard = store.commit_lock();

    let Ok(job) = store.job(job_id) else {
        warn!(job_id = %job_id, "dispatch skipped: job vanished");
        return 0;
    };
    if job.status != JobStatus::Pending {
        return 0;
    }

    let Some(required) = required_category(&job.kind) else {
        warn!(job_id = %job_id, kind = %job.kind, "dispatch skipped: unrecognized kind");
        state
            .metrics
            .dispatches_total
            .with_label_values(&["unknown_kind"])
            .inc();
        return 0;
    };

    // Candidate filters, in order: directory eligibility, then no active job,
    // then no slot anywhere (one offer on screen at a time), then never
    // offered this job in the current round.
    let candidates: Vec<Courier> = store
        .couriers_snapshot()
        .into_iter()
        .filter(|courier| courier.eligible_for(required, now))
        .collect();
    let candidates: Vec<Courier> = candidates
        .into_iter()
        .filter(|courier| !store.has_active_job(courier.id))
        .filter(|courier| !store.courier_has_exposure(courier.id))
        .filter(|courier| !store.pair_exposed(job_id, courier.id))
        .collect();

    let Some(chosen) = candidates.choose(&mut rand::thread_rng()) else {
        info!(job_id = %job_id, category = ?required, "no free courier for dispatch");
        state
            .metrics
            .dispatches_total
            .with_label_values(&["no_courier"])
            .inc();
        return 0;
    };

    store.clear_courier_exposures(chosen.id);
    store.insert_exposure(job_id, chosen.id, job.dispatch_round, now);
    state.metrics.exposures_active.set(store.live_exposures() as i64);
    state
        .metrics
        .dispatches_total
        .with_label_values(&["offered"])
        .inc();
    state.publish(JobEvent::Offered {
        job_id,
        courier_id: chosen.id,
    });

    info!(
        job_id = %job_id,
        courier_id = %chosen.id,
        round = job.dispatch_round,
        "job offered"
    );
    1
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::dispatch_job;
    use crate::config::Config;
    use crate::models::courier::CourierCategory;
    use crate::state::AppState;
    use crate::testing::{seed_online_courier, seed_pending_job};

    fn state() -> AppState {
        AppState::new(Config::default())
    }

    #[test]
    fn one_eligible_courier_gets_exactly_one_slot() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "delivery", 20.0);
        let courier_id = seed_online_courier(&state.store, CourierCategory::Deliveries, now);

        assert_eq!(dispatch_job(&state, job_id, now), 1);
        assert!(state.store.pair_exposed(job_id, courier_id));

        let (total, _) = state
            .store
            .exposure_counts(job_id, Duration::seconds(60), now);
        assert_eq!(total, 1);
    }

    #[test]
    fn unrecognized_kind_dispatches_to_nobody() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "jetpack", 20.0);
        seed_online_courier(&state.store, CourierCategory::General, now);

        assert_eq!(dispatch_job(&state, job_id, now), 0);
        assert_eq!(state.store.live_exposures(), 0);
    }

    #[test]
    fn wildcard_couriers_take_any_kind() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "moto-taxi", 15.0);
        seed_online_courier(&state.store, CourierCategory::General, now);

        assert_eq!(dispatch_job(&state, job_id, now), 1);
    }

    #[test]
    fn category_mismatch_means_nobody_is_selected() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "moto-taxi", 15.0);
        seed_online_courier(&state.store, CourierCategory::Deliveries, now);

        assert_eq!(dispatch_job(&state, job_id, now), 0);
    }

    #[test]
    fn blocked_courier_is_excluded() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "delivery", 20.0);
        let courier_id = seed_online_courier(&state.store, CourierCategory::Deliveries, now);
        state
            .store
            .penalize_courier(courier_id, Duration::minutes(5), now)
            .unwrap();

        assert_eq!(dispatch_job(&state, job_id, now), 0);
    }

    #[test]
    fn busy_courier_is_excluded() {
        let state = state();
        let now = Utc::now();
        let active = seed_pending_job(&state.store, "delivery", 20.0);
        let courier_id = seed_online_courier(&state.store, CourierCategory::Deliveries, now);
        assert!(state.store.assign_job(active, courier_id).unwrap());

        let job_id = seed_pending_job(&state.store, "delivery", 20.0);
        assert_eq!(dispatch_job(&state, job_id, now), 0);
    }

    #[test]
    fn courier_already_holding_a_slot_is_not_double_booked() {
        let state = state();
        let now = Utc::now();
        let first = seed_pending_job(&state.store, "delivery", 20.0);
        let second = seed_pending_job(&state.store, "delivery", 25.0);
        seed_online_courier(&state.store, CourierCategory::Deliveries, now);

        assert_eq!(dispatch_job(&state, first, now), 1);
        assert_eq!(dispatch_job(&state, second, now), 0);
    }

    #[test]
    fn courier_who_saw_the_job_this_round_is_not_reoffered() {
        let state = state();
        let now = Utc::now();
        let job_id = seed_pending_job(&state.store, "delivery", 20.0);
        let courier_id = seed_online_courier(&state.store, CourierCategory::Deliveries, now);

        assert_eq!(dispatch_job(&state, job_id, now), 1);
        state.store.lapse_exposure(job_id, courier_id);

        // Slot lapsed but the row remains; the same courier is not re-picked.
        assert_eq!(dispatch_job(&state, job_id, now), 0);
    }
}
