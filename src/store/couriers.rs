use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, GeoPoint};
use crate::store::Store;

impl Store {
    pub fn insert_courier(&self, courier: Courier) {
        self.couriers.insert(courier.id, courier);
    }

    pub fn courier(&self, id: Uuid) -> Result<Courier, AppError> {
        self.couriers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    pub fn couriers_snapshot(&self) -> Vec<Courier> {
        self.couriers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Extends the liveness window by `ttl`. Position is updated only when
    /// valid coordinates are supplied; an elapsed penalty block is cleared
    /// opportunistically.
    pub fn set_online(
        &self,
        id: Uuid,
        coords: Option<GeoPoint>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

        if courier.blocked_until.is_some_and(|until| until <= now) {
            courier.blocked_until = None;
        }

        courier.online_until = Some(now + ttl);

        if let Some(point) = coords {
            if point.is_valid() {
                courier.location = Some(point);
            }
        }

        Ok(())
    }

    pub fn set_offline(&self, id: Uuid) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

        courier.online_until = None;
        Ok(())
    }

    pub fn penalize_courier(
        &self,
        id: Uuid,
        penalty: Duration,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

        courier.blocked_until = Some(now + penalty);
        Ok(())
    }

    /// One-way gate set by the admin; never reverts automatically.
    pub fn approve_courier(&self, id: Uuid) -> Result<(), AppError> {
        let mut courier = self
            .couriers
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))?;

        courier.approved = true;
        Ok(())
    }

    pub fn remove_courier(&self, id: Uuid) -> Result<(), AppError> {
        self.couriers
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("courier {id} not found")))
    }

    pub fn pending_couriers(&self) -> Vec<Courier> {
        self.couriers
            .iter()
            .filter(|entry| !entry.value().approved)
            .map(|entry| entry.value().clone())
            .collect()
    }
}
