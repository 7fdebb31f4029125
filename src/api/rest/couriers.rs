use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierCategory, GeoPoint};
use crate::models::exposure::JobOffer;
use crate::models::job::Job;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(register_courier))
        .route("/couriers/:id/beacon", post(beacon))
        .route("/couriers/:id/offer", get(poll_offer))
        .route("/couriers/:id/current-job", get(current_job))
}

#[derive(Deserialize)]
pub struct RegisterCourierRequest {
    pub name: String,
    pub phone: String,
    pub plate: String,
    pub vehicle_model: String,
    pub category: CourierCategory,
}

#[derive(Deserialize)]
pub struct BeaconRequest {
    pub online: bool,
    pub location: Option<GeoPoint>,
}

#[derive(Serialize)]
pub struct BeaconResponse {
    pub success: bool,
    pub status: &'static str,
}

/// What the courier's poll sees. `blocked` couriers learn the remaining
/// minutes; couriers without an offer get `empty`.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollResponse {
    Blocked { minutes_remaining: i64 },
    Offline,
    Empty,
    Offer { offer: JobOffer },
}

#[derive(Serialize)]
pub struct CurrentJobResponse {
    pub has_job: bool,
    pub job: Option<Job>,
}

async fn register_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if payload.phone.trim().is_empty() {
        return Err(AppError::BadRequest("phone cannot be empty".to_string()));
    }

    // New couriers wait for admin approval before they can be dispatched.
    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        plate: payload.plate,
        vehicle_model: payload.vehicle_model,
        category: payload.category,
        approved: false,
        online_until: None,
        blocked_until: None,
        location: None,
        balance: 0.0,
        created_at: Utc::now(),
    };

    state.store.insert_courier(courier.clone());
    info!(courier_id = %courier.id, "courier registered; awaiting approval");
    Ok(Json(courier))
}

async fn beacon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BeaconRequest>,
) -> Result<Json<BeaconResponse>, AppError> {
    let now = Utc::now();

    if payload.online {
        state
            .store
            .set_online(id, payload.location, state.config.online_ttl(), now)?;
        Ok(Json(BeaconResponse {
            success: true,
            status: "online",
        }))
    } else {
        state.store.set_offline(id)?;
        Ok(Json(BeaconResponse {
            success: true,
            status: "offline",
        }))
    }
}

async fn poll_offer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PollResponse>, AppError> {
    let now = Utc::now();
    let courier = state.store.courier(id)?;

    if let Some(until) = courier.blocked_until {
        if now < until {
            let seconds = (until - now).num_seconds();
            return Ok(Json(PollResponse::Blocked {
                minutes_remaining: (seconds + 59) / 60,
            }));
        }
    }

    if !courier.is_online(now) {
        return Ok(Json(PollResponse::Offline));
    }

    let response = match state
        .store
        .current_offer(&courier, state.config.visibility_window(), now)
    {
        Some(offer) => PollResponse::Offer { offer },
        None => PollResponse::Empty,
    };
    Ok(Json(response))
}

async fn current_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CurrentJobResponse>, AppError> {
    // 404s for unknown couriers, not just an empty answer.
    state.store.courier(id)?;

    let job = state.store.courier_current_job(id);
    Ok(Json(CurrentJobResponse {
        has_job: job.is_some(),
        job,
    }))
}
