use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::courier::{CourierCategory, GeoPoint};

/// Fixed mapping from a job's kind string to the courier category allowed to
/// take it. Unrecognized kinds dispatch to nobody.
pub fn required_category(kind: &str) -> Option<CourierCategory> {
    match kind {
        "moto-taxi" => Some(CourierCategory::Passenger),
        "delivery" => Some(CourierCategory::Deliveries),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    AwaitingPayment,
    Released,
    InProgress,
    Completed,
    Cancelled,
    /// Terminal variant of `Cancelled` reserved for system-initiated timeouts.
    Expired,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Expired
        )
    }

    /// States in which the job keeps its courier busy.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::AwaitingPayment | JobStatus::Released | JobStatus::InProgress
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Pix,
    Online,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub courier_id: Option<Uuid>,
    pub origin: String,
    pub destination: String,
    pub origin_coords: Option<GeoPoint>,
    pub destination_coords: Option<GeoPoint>,
    pub distance_km: Option<f64>,
    pub price: f64,
    pub kind: String,
    pub status: JobStatus,
    pub cancel_reason: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub security_code: Option<String>,
    /// Incremented each time the sweep clears a fully lapsed exposure round.
    pub dispatch_round: u32,
    pub created_at: DateTime<Utc>,
}

/// Who asked for a cancellation. System cancellations carry a reason that is
/// never attributed to a user actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelActor {
    Requester,
    Courier(Uuid),
    System,
}

/// Lifecycle events published on the push channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Offered { job_id: Uuid, courier_id: Uuid },
    Assigned { job_id: Uuid, courier_id: Uuid },
    Released { job_id: Uuid },
    Started { job_id: Uuid },
    Completed { job_id: Uuid, courier_id: Uuid },
    Cancelled { job_id: Uuid, reason: String },
    Expired { job_id: Uuid },
}
