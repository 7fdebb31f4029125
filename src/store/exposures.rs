use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::courier::Courier;
use crate::models::exposure::{Exposure, JobOffer};
use crate::models::job::{required_category, JobStatus};
use crate::store::Store;

impl Store {
    /// Creates the visibility slot. The (job, courier) key keeps the
    /// at-most-one-live-row-per-pair invariant; callers check for an existing
    /// row before offering.
    pub fn insert_exposure(&self, job_id: Uuid, courier_id: Uuid, cycle: u32, now: DateTime<Utc>) {
        self.exposures.insert(
            (job_id, courier_id),
            Exposure {
                job_id,
                courier_id,
                cycle,
                exposed_at: now,
                lapsed: false,
            },
        );
    }

    /// Marks the courier's slot lapsed without deleting it, so the same job
    /// is not offered to them again within the round. Returns whether a row
    /// existed.
    pub fn lapse_exposure(&self, job_id: Uuid, courier_id: Uuid) -> bool {
        match self.exposures.get_mut(&(job_id, courier_id)) {
            Some(mut exposure) => {
                exposure.lapsed = true;
                true
            }
            None => false,
        }
    }

    pub fn clear_job_exposures(&self, job_id: Uuid) -> Vec<Exposure> {
        let keys: Vec<(Uuid, Uuid)> = self
            .exposures
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| *entry.key())
            .collect();

        keys.into_iter()
            .filter_map(|key| self.exposures.remove(&key).map(|(_, exposure)| exposure))
            .collect()
    }

    pub fn clear_courier_exposures(&self, courier_id: Uuid) {
        self.exposures.retain(|key, _| key.1 != courier_id);
    }

    /// Drops rows whose owning job is no longer pending. Returns how many
    /// were removed.
    pub fn clear_orphan_exposures(&self) -> usize {
        let keys: Vec<(Uuid, Uuid)> = self
            .exposures
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut removed = 0;
        for key in keys {
            let pending = self
                .jobs
                .get(&key.0)
                .map(|job| job.status == JobStatus::Pending)
                .unwrap_or(false);
            if !pending && self.exposures.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }

    /// (total, lapsed) for one job's current round.
    pub fn exposure_counts(
        &self,
        job_id: Uuid,
        window: Duration,
        now: DateTime<Utc>,
    ) -> (usize, usize) {
        let rows: Vec<Exposure> = self
            .exposures
            .iter()
            .filter(|entry| entry.key().0 == job_id)
            .map(|entry| entry.value().clone())
            .collect();

        let total = rows.len();
        let lapsed = rows
            .iter()
            .filter(|exposure| exposure.is_lapsed(window, now))
            .count();
        (total, lapsed)
    }

    pub fn courier_has_exposure(&self, courier_id: Uuid) -> bool {
        self.exposures.iter().any(|entry| entry.key().1 == courier_id)
    }

    pub fn pair_exposed(&self, job_id: Uuid, courier_id: Uuid) -> bool {
        self.exposures.contains_key(&(job_id, courier_id))
    }

    pub fn live_exposures(&self) -> usize {
        self.exposures.len()
    }

    /// The single oldest live offer for this courier: slot not lapsed, still
    /// inside the visibility window, owning job still pending and of a kind
    /// the courier's category may take. Pure read; never mutates a row.
    pub fn current_offer(
        &self,
        courier: &Courier,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Option<JobOffer> {
        let mut slots: Vec<Exposure> = self
            .exposures
            .iter()
            .filter(|entry| {
                let exposure = entry.value();
                exposure.courier_id == courier.id && !exposure.is_lapsed(window, now)
            })
            .map(|entry| entry.value().clone())
            .collect();
        slots.sort_by_key(|exposure| exposure.exposed_at);

        for slot in slots {
            let Some(job) = self
                .jobs
                .get(&slot.job_id)
                .map(|entry| entry.value().clone())
            else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            let Some(required) = required_category(&job.kind) else {
                continue;
            };
            if !courier.category.accepts(required) {
                continue;
            }

            let requester = self
                .requesters
                .get(&job.requester_id)
                .map(|entry| entry.value().clone());
            let (requester_name, requester_phone) = match requester {
                Some(requester) => (requester.name, requester.phone),
                None => (String::new(), String::new()),
            };

            return Some(JobOffer {
                job_id: job.id,
                origin: job.origin,
                destination: job.destination,
                distance_km: job.distance_km,
                price: job.price,
                kind: job.kind,
                requester_name,
                requester_phone,
                cycle: slot.cycle,
                seconds_elapsed: slot.age(now).num_seconds(),
            });
        }

        None
    }
}
