use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourierCategory {
    Passenger,
    Deliveries,
    General,
}

impl CourierCategory {
    /// `general` is the wildcard category: it matches any required category.
    pub fn accepts(self, required: CourierCategory) -> bool {
        self == CourierCategory::General || self == required
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub plate: String,
    pub vehicle_model: String,
    pub category: CourierCategory,
    pub approved: bool,
    pub online_until: Option<DateTime<Utc>>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub location: Option<GeoPoint>,
    pub balance: f64,
    pub created_at: DateTime<Utc>,
}

impl Courier {
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        self.online_until.is_some_and(|until| now < until)
    }

    pub fn is_blocked(&self, now: DateTime<Utc>) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    /// Approved, currently online, not inside a penalty window, and matching
    /// the required category. Does not consider whether the courier already
    /// holds an active job; that is the dispatcher's concern.
    pub fn eligible_for(&self, required: CourierCategory, now: DateTime<Utc>) -> bool {
        self.approved
            && self.is_online(now)
            && !self.is_blocked(now)
            && self.category.accepts(required)
    }
}
