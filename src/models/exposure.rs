use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One time-boxed visibility grant of a job to a courier. At most one live
/// row exists per (job, courier) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exposure {
    pub job_id: Uuid,
    pub courier_id: Uuid,
    /// Copy of the job's dispatch round at creation time.
    pub cycle: u32,
    pub exposed_at: DateTime<Utc>,
    /// Set on explicit decline; a row also counts as lapsed once its age
    /// reaches the visibility window.
    pub lapsed: bool,
}

impl Exposure {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.exposed_at
    }

    pub fn is_lapsed(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.lapsed || self.age(now) >= window
    }
}

/// What a polling courier sees: the exposure joined with job and requester
/// display data.
#[derive(Debug, Clone, Serialize)]
pub struct JobOffer {
    pub job_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub distance_km: Option<f64>,
    pub price: f64,
    pub kind: String,
    pub requester_name: String,
    pub requester_phone: String,
    pub cycle: u32,
    pub seconds_elapsed: i64,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::Exposure;

    #[test]
    fn lapses_by_age_or_by_flag() {
        let now = Utc::now();
        let window = Duration::seconds(60);

        let mut exposure = Exposure {
            job_id: Uuid::new_v4(),
            courier_id: Uuid::new_v4(),
            cycle: 1,
            exposed_at: now,
            lapsed: false,
        };

        assert!(!exposure.is_lapsed(window, now));
        assert!(!exposure.is_lapsed(window, now + Duration::seconds(59)));
        assert!(exposure.is_lapsed(window, now + Duration::seconds(60)));

        exposure.lapsed = true;
        assert!(exposure.is_lapsed(window, now));
    }
}
