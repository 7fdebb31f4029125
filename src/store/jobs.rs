use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::{CancelActor, Job, JobStatus, PaymentMethod};
use crate::payments::SettlementOutcome;
use crate::store::Store;

/// Result of a payment-method choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChoice {
    /// Cash was chosen; the job is released right away.
    Released,
    /// A prepaid method was chosen; the job stays put until the provider's
    /// settlement arrives.
    AwaitingSettlement,
    /// The job is not awaiting payment; nothing was changed.
    NotPayable,
}

/// Result of applying a provider settlement. Duplicate deliveries land on
/// `AlreadySettled` and change nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleResult {
    Released,
    Cancelled,
    AlreadySettled,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompletionOutcome {
    Settled { method: PaymentMethod, fee: f64 },
    /// Wrong prior state; an expected outcome, not an error.
    NotCompletable,
}

impl Store {
    pub fn insert_job(&self, job: Job) {
        self.jobs.insert(job.id, job);
    }

    pub fn job(&self, id: Uuid) -> Result<Job, AppError> {
        self.jobs
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("job {id} not found")))
    }

    pub fn jobs_snapshot(&self) -> Vec<Job> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn pending_job_ids(&self) -> Vec<Uuid> {
        self.jobs
            .iter()
            .filter(|entry| entry.value().status == JobStatus::Pending)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn has_active_job(&self, courier_id: Uuid) -> bool {
        self.jobs.iter().any(|entry| {
            let job = entry.value();
            job.courier_id == Some(courier_id) && job.status.is_active()
        })
    }

    /// The courier accepts a job. Single guarded update: the job must still be
    /// pending and the courier must hold no other active job. Losing the race
    /// is an expected outcome reported as `Ok(false)`.
    pub fn assign_job(&self, job_id: Uuid, courier_id: Uuid) -> Result<bool, AppError> {
        let _guard = self.commit_lock();

        if !self.couriers.contains_key(&courier_id) {
            return Err(AppError::NotFound(format!("courier {courier_id} not found")));
        }
        if !self.jobs.contains_key(&job_id) {
            return Err(AppError::NotFound(format!("job {job_id} not found")));
        }

        if self.has_active_job(courier_id) {
            return Ok(false);
        }

        {
            let mut job = match self.jobs.get_mut(&job_id) {
                Some(job) => job,
                None => return Ok(false),
            };
            if job.status != JobStatus::Pending {
                return Ok(false);
            }
            job.status = JobStatus::AwaitingPayment;
            job.courier_id = Some(courier_id);
        }

        self.clear_job_exposures(job_id);
        Ok(true)
    }

    pub fn choose_payment(
        &self,
        job_id: Uuid,
        method: PaymentMethod,
        security_code: Option<String>,
    ) -> Result<PaymentChoice, AppError> {
        let _guard = self.commit_lock();

        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if job.status != JobStatus::AwaitingPayment {
            return Ok(PaymentChoice::NotPayable);
        }

        job.payment_method = Some(method);
        job.security_code = security_code;

        if method == PaymentMethod::Cash {
            job.status = JobStatus::Released;
            Ok(PaymentChoice::Released)
        } else {
            Ok(PaymentChoice::AwaitingSettlement)
        }
    }

    /// Maps a provider settlement onto the state machine, idempotently.
    pub fn settle_payment(
        &self,
        job_id: Uuid,
        outcome: SettlementOutcome,
    ) -> Result<SettleResult, AppError> {
        let _guard = self.commit_lock();

        let status = {
            let job = self
                .jobs
                .get(&job_id)
                .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;
            job.status
        };

        match outcome {
            SettlementOutcome::Approved => match status {
                JobStatus::AwaitingPayment => {
                    if let Some(mut job) = self.jobs.get_mut(&job_id) {
                        if job.payment_method.is_none() {
                            job.payment_method = Some(PaymentMethod::Online);
                        }
                        job.status = JobStatus::Released;
                    }
                    Ok(SettleResult::Released)
                }
                JobStatus::Released | JobStatus::InProgress | JobStatus::Completed => {
                    Ok(SettleResult::AlreadySettled)
                }
                JobStatus::Pending | JobStatus::Cancelled | JobStatus::Expired => {
                    Ok(SettleResult::Ignored)
                }
            },
            SettlementOutcome::Rejected | SettlementOutcome::Cancelled => {
                if status.is_terminal() {
                    return Ok(SettleResult::AlreadySettled);
                }
                if let Some(mut job) = self.jobs.get_mut(&job_id) {
                    job.status = JobStatus::Cancelled;
                    job.cancel_reason = Some(format!("[system] payment {}", outcome.as_str()));
                }
                self.clear_job_exposures(job_id);
                Ok(SettleResult::Cancelled)
            }
        }
    }

    /// Only the assigned courier may start, and only once payment released
    /// the job.
    pub fn start_job(&self, job_id: Uuid, courier_id: Uuid) -> Result<(), AppError> {
        let _guard = self.commit_lock();

        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if job.courier_id != Some(courier_id) {
            return Err(AppError::NotFound(format!(
                "job {job_id} not found for this courier"
            )));
        }
        if job.status != JobStatus::Released {
            return Err(AppError::PaymentPending);
        }

        job.status = JobStatus::InProgress;
        Ok(())
    }

    /// Settles the courier's balance and completes the job in one atomic
    /// step: cash jobs debit the commission, prepaid jobs credit the price
    /// net of commission.
    pub fn complete_job(
        &self,
        job_id: Uuid,
        courier_id: Uuid,
        security_code: Option<&str>,
        commission_rate: f64,
    ) -> Result<CompletionOutcome, AppError> {
        let _guard = self.commit_lock();

        let job = self
            .jobs
            .get(&job_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        if job.courier_id != Some(courier_id) {
            return Err(AppError::Forbidden(
                "this job does not belong to you".to_string(),
            ));
        }

        if let Some(expected) = &job.security_code {
            if security_code != Some(expected.as_str()) {
                return Err(AppError::Forbidden("wrong security code".to_string()));
            }
        }

        if !matches!(job.status, JobStatus::Released | JobStatus::InProgress) {
            return Ok(CompletionOutcome::NotCompletable);
        }

        if !self.couriers.contains_key(&courier_id) {
            return Err(AppError::NotFound(format!("courier {courier_id} not found")));
        }

        let method = job.payment_method.unwrap_or(PaymentMethod::Online);
        let fee = job.price * commission_rate;
        let net = job.price - fee;

        if let Some(mut entry) = self.jobs.get_mut(&job_id) {
            entry.status = JobStatus::Completed;
        }
        if let Some(mut courier) = self.couriers.get_mut(&courier_id) {
            match method {
                PaymentMethod::Cash => courier.balance -= fee,
                PaymentMethod::Pix | PaymentMethod::Online => courier.balance += net,
            }
        }

        Ok(CompletionOutcome::Settled { method, fee })
    }

    /// Cancels from any non-terminal state; an already terminal job is a
    /// benign `Ok(false)` so a cancel racing an accept never errors. When the
    /// assigned courier is the one cancelling, they take the penalty window.
    pub fn cancel_job(
        &self,
        job_id: Uuid,
        reason: String,
        actor: CancelActor,
        penalty: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let _guard = self.commit_lock();

        let assigned = {
            let mut job = self
                .jobs
                .get_mut(&job_id)
                .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

            if job.status.is_terminal() {
                return Ok(false);
            }

            job.status = JobStatus::Cancelled;
            job.cancel_reason = Some(reason);
            job.courier_id
        };

        self.clear_job_exposures(job_id);

        if let CancelActor::Courier(courier_id) = actor {
            if assigned == Some(courier_id) {
                if let Some(mut courier) = self.couriers.get_mut(&courier_id) {
                    courier.blocked_until = Some(now + penalty);
                }
            }
        }

        Ok(true)
    }

    /// Watchdog: force-expires pending jobs older than the cutoff and clears
    /// their exposures. Returns the expired ids.
    pub fn expire_stale_jobs(&self, watchdog: Duration, now: DateTime<Utc>) -> Vec<Uuid> {
        let _guard = self.commit_lock();

        let cutoff = now - watchdog;
        let stale: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.status == JobStatus::Pending && job.created_at < cutoff
            })
            .map(|entry| *entry.key())
            .collect();

        for job_id in &stale {
            if let Some(mut job) = self.jobs.get_mut(job_id) {
                job.status = JobStatus::Expired;
                job.cancel_reason = Some(format!(
                    "[system] expired after {} minutes pending",
                    watchdog.num_minutes()
                ));
            }
            self.clear_job_exposures(*job_id);
        }

        stale
    }

    pub fn bump_dispatch_round(&self, job_id: Uuid) -> Result<u32, AppError> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id} not found")))?;

        job.dispatch_round += 1;
        Ok(job.dispatch_round)
    }

    /// Latest job still on the courier's screen: the active one, or a just
    /// cancelled one so the client sees the outcome before it disappears.
    pub fn courier_current_job(&self, courier_id: Uuid) -> Option<Job> {
        self.jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.courier_id == Some(courier_id)
                    && (job.status.is_active() || job.status == JobStatus::Cancelled)
            })
            .map(|entry| entry.value().clone())
            .max_by_key(|job| job.created_at)
    }

    pub fn requester_jobs(&self, requester_id: Uuid) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().requester_id == requester_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{CompletionOutcome, PaymentChoice, SettleResult};
    use crate::error::AppError;
    use crate::models::courier::CourierCategory;
    use crate::models::job::{CancelActor, JobStatus, PaymentMethod};
    use crate::payments::SettlementOutcome;
    use crate::store::Store;
    use crate::testing::{seed_online_courier, seed_pending_job};

    const RATE: f64 = 0.15;

    fn accepted_job(store: &Store, price: f64) -> (Uuid, Uuid) {
        let now = Utc::now();
        let job_id = seed_pending_job(store, "delivery", price);
        let courier_id = seed_online_courier(store, CourierCategory::Deliveries, now);
        assert!(store.assign_job(job_id, courier_id).unwrap());
        (job_id, courier_id)
    }

    #[test]
    fn concurrent_accepts_yield_exactly_one_winner() {
        let store = Arc::new(Store::open());
        let now = Utc::now();
        let job_id = seed_pending_job(&store, "delivery", 30.0);

        let couriers: Vec<Uuid> = (0..8)
            .map(|_| seed_online_courier(&store, CourierCategory::Deliveries, now))
            .collect();

        let handles: Vec<_> = couriers
            .into_iter()
            .map(|courier_id| {
                let store = store.clone();
                thread::spawn(move || store.assign_job(job_id, courier_id).unwrap())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(wins, 1);
        let job = store.job(job_id).unwrap();
        assert_eq!(job.status, JobStatus::AwaitingPayment);
        assert!(job.courier_id.is_some());
    }

    #[test]
    fn busy_courier_cannot_accept_a_second_job() {
        let store = Store::open();
        let (_, courier_id) = accepted_job(&store, 25.0);

        let other = seed_pending_job(&store, "delivery", 10.0);
        assert!(!store.assign_job(other, courier_id).unwrap());
        assert_eq!(store.job(other).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn accept_clears_every_exposure_for_the_job() {
        let store = Store::open();
        let now = Utc::now();
        let job_id = seed_pending_job(&store, "delivery", 25.0);
        let watcher = seed_online_courier(&store, CourierCategory::Deliveries, now);
        let taker = seed_online_courier(&store, CourierCategory::Deliveries, now);
        store.insert_exposure(job_id, watcher, 1, now);

        assert!(store.assign_job(job_id, taker).unwrap());
        let (total, _) = store.exposure_counts(job_id, Duration::seconds(60), now);
        assert_eq!(total, 0);
    }

    #[test]
    fn cash_completion_debits_the_commission() {
        let store = Store::open();
        let (job_id, courier_id) = accepted_job(&store, 100.0);

        assert_eq!(
            store
                .choose_payment(job_id, PaymentMethod::Cash, None)
                .unwrap(),
            PaymentChoice::Released
        );
        store.start_job(job_id, courier_id).unwrap();

        let outcome = store.complete_job(job_id, courier_id, None, RATE).unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::Settled {
                method: PaymentMethod::Cash,
                fee: 15.0
            }
        );
        assert!((store.courier(courier_id).unwrap().balance - (-15.0)).abs() < 1e-9);
        assert_eq!(store.job(job_id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn prepaid_completion_credits_net_of_commission() {
        let store = Store::open();
        let (job_id, courier_id) = accepted_job(&store, 100.0);

        store
            .choose_payment(job_id, PaymentMethod::Pix, None)
            .unwrap();
        store
            .settle_payment(job_id, SettlementOutcome::Approved)
            .unwrap();

        store.complete_job(job_id, courier_id, None, RATE).unwrap();
        assert!((store.courier(courier_id).unwrap().balance - 85.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_security_code_fails_without_side_effects() {
        let store = Store::open();
        let (job_id, courier_id) = accepted_job(&store, 80.0);
        store
            .choose_payment(job_id, PaymentMethod::Cash, Some("4321".to_string()))
            .unwrap();

        let err = store
            .complete_job(job_id, courier_id, Some("1111"), RATE)
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let missing = store.complete_job(job_id, courier_id, None, RATE).unwrap_err();
        assert!(matches!(missing, AppError::Forbidden(_)));

        assert_eq!(store.job(job_id).unwrap().status, JobStatus::Released);
        assert_eq!(store.courier(courier_id).unwrap().balance, 0.0);

        let ok = store
            .complete_job(job_id, courier_id, Some("4321"), RATE)
            .unwrap();
        assert!(matches!(ok, CompletionOutcome::Settled { .. }));
    }

    #[test]
    fn only_the_assigned_courier_completes() {
        let store = Store::open();
        let (job_id, _) = accepted_job(&store, 40.0);
        let stranger = seed_online_courier(&store, CourierCategory::General, Utc::now());

        let err = store.complete_job(job_id, stranger, None, RATE).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn completing_twice_is_a_guard_failure_not_an_error() {
        let store = Store::open();
        let (job_id, courier_id) = accepted_job(&store, 40.0);
        store
            .choose_payment(job_id, PaymentMethod::Cash, None)
            .unwrap();

        store.complete_job(job_id, courier_id, None, RATE).unwrap();
        let again = store.complete_job(job_id, courier_id, None, RATE).unwrap();
        assert_eq!(again, CompletionOutcome::NotCompletable);
    }

    #[test]
    fn start_requires_release_and_ownership() {
        let store = Store::open();
        let (job_id, courier_id) = accepted_job(&store, 40.0);

        let err = store.start_job(job_id, courier_id).unwrap_err();
        assert!(matches!(err, AppError::PaymentPending));

        let stranger = seed_online_courier(&store, CourierCategory::General, Utc::now());
        let err = store.start_job(job_id, stranger).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        store
            .choose_payment(job_id, PaymentMethod::Cash, None)
            .unwrap();
        store.start_job(job_id, courier_id).unwrap();
        assert_eq!(store.job(job_id).unwrap().status, JobStatus::InProgress);
    }

    #[test]
    fn settlement_is_idempotent() {
        let store = Store::open();
        let (job_id, _) = accepted_job(&store, 50.0);
        store
            .choose_payment(job_id, PaymentMethod::Pix, None)
            .unwrap();

        assert_eq!(
            store
                .settle_payment(job_id, SettlementOutcome::Approved)
                .unwrap(),
            SettleResult::Released
        );
        assert_eq!(
            store
                .settle_payment(job_id, SettlementOutcome::Approved)
                .unwrap(),
            SettleResult::AlreadySettled
        );
        assert_eq!(store.job(job_id).unwrap().status, JobStatus::Released);
    }

    #[test]
    fn rejected_settlement_cancels_once_with_a_system_reason() {
        let store = Store::open();
        let (job_id, _) = accepted_job(&store, 50.0);
        store
            .choose_payment(job_id, PaymentMethod::Pix, None)
            .unwrap();

        assert_eq!(
            store
                .settle_payment(job_id, SettlementOutcome::Rejected)
                .unwrap(),
            SettleResult::Cancelled
        );
        assert_eq!(
            store
                .settle_payment(job_id, SettlementOutcome::Rejected)
                .unwrap(),
            SettleResult::AlreadySettled
        );

        let job = store.job(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.cancel_reason.unwrap().starts_with("[system]"));
    }

    #[test]
    fn courier_cancel_takes_the_penalty() {
        let store = Store::open();
        let now = Utc::now();
        let (job_id, courier_id) = accepted_job(&store, 50.0);

        let cancelled = store
            .cancel_job(
                job_id,
                "broke down".to_string(),
                CancelActor::Courier(courier_id),
                Duration::minutes(5),
                now,
            )
            .unwrap();
        assert!(cancelled);
        assert!(store.courier(courier_id).unwrap().is_blocked(now));

        // Second cancel is benign.
        let again = store
            .cancel_job(
                job_id,
                "again".to_string(),
                CancelActor::Requester,
                Duration::minutes(5),
                now,
            )
            .unwrap();
        assert!(!again);
    }

    #[test]
    fn requester_cancel_leaves_the_courier_unblocked() {
        let store = Store::open();
        let now = Utc::now();
        let (job_id, courier_id) = accepted_job(&store, 50.0);

        store
            .cancel_job(
                job_id,
                "changed my mind".to_string(),
                CancelActor::Requester,
                Duration::minutes(5),
                now,
            )
            .unwrap();
        assert!(!store.courier(courier_id).unwrap().is_blocked(now));
    }

    #[test]
    fn watchdog_expires_only_stale_pending_jobs() {
        let store = Store::open();
        let now = Utc::now();
        let stale = seed_pending_job(&store, "delivery", 20.0);
        let fresh = seed_pending_job(&store, "delivery", 20.0);

        {
            let mut job = store.jobs.get_mut(&stale).unwrap();
            job.created_at = now - Duration::minutes(16);
        }
        let watcher = seed_online_courier(&store, CourierCategory::Deliveries, now);
        store.insert_exposure(stale, watcher, 1, now);

        let expired = store.expire_stale_jobs(Duration::minutes(15), now);
        assert_eq!(expired, vec![stale]);

        let job = store.job(stale).unwrap();
        assert_eq!(job.status, JobStatus::Expired);
        assert!(job.cancel_reason.unwrap().starts_with("[system]"));
        let (total, _) = store.exposure_counts(stale, Duration::seconds(60), now);
        assert_eq!(total, 0);

        assert_eq!(store.job(fresh).unwrap().status, JobStatus::Pending);
    }
}
