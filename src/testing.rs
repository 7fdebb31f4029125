//! Seed helpers shared by the unit tests.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::courier::{Courier, CourierCategory};
use crate::models::job::{Job, JobStatus};
use crate::models::requester::Requester;
use crate::store::Store;

pub(crate) fn seed_requester(store: &Store) -> Uuid {
    let id = Uuid::new_v4();
    store.insert_requester(Requester {
        id,
        name: "Maria".to_string(),
        phone: "+55 11 98888-0000".to_string(),
        created_at: Utc::now(),
    });
    id
}

/// An approved courier that is online as of `now`.
pub(crate) fn seed_online_courier(
    store: &Store,
    category: CourierCategory,
    now: DateTime<Utc>,
) -> Uuid {
    let courier = Courier {
        id: Uuid::new_v4(),
        name: "João".to_string(),
        phone: "+55 11 97777-0000".to_string(),
        plate: "BRA2E19".to_string(),
        vehicle_model: "Factor 150".to_string(),
        category,
        approved: true,
        online_until: Some(now + Duration::seconds(60)),
        blocked_until: None,
        location: None,
        balance: 0.0,
        created_at: now,
    };
    let id = courier.id;
    store.insert_courier(courier);
    id
}

pub(crate) fn seed_pending_job(store: &Store, kind: &str, price: f64) -> Uuid {
    let job = Job {
        id: Uuid::new_v4(),
        requester_id: seed_requester(store),
        courier_id: None,
        origin: "Rua A, 100".to_string(),
        destination: "Rua B, 200".to_string(),
        origin_coords: None,
        destination_coords: None,
        distance_km: None,
        price,
        kind: kind.to_string(),
        status: JobStatus::Pending,
        cancel_reason: None,
        payment_method: None,
        security_code: None,
        dispatch_round: 1,
        created_at: Utc::now(),
    };
    let id = job.id;
    store.insert_job(job);
    id
}
