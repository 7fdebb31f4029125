use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::dispatch::dispatch_job;
use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::courier::GeoPoint;
use crate::models::job::{CancelActor, Job, JobEvent, JobStatus};
use crate::models::requester::Requester;
use crate::state::AppState;
use crate::store::jobs::CompletionOutcome;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requesters", post(create_requester))
        .route("/requesters/:id/jobs", get(requester_jobs))
        .route("/jobs", post(create_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/accept", post(accept_job))
        .route("/jobs/:id/decline", post(decline_job))
        .route("/jobs/:id/start", post(start_job))
        .route("/jobs/:id/complete", post(complete_job))
        .route("/jobs/:id/cancel", post(cancel_job))
}

#[derive(Deserialize)]
pub struct CreateRequesterRequest {
    pub name: String,
    pub phone: String,
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub requester_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub origin_coords: Option<GeoPoint>,
    pub destination_coords: Option<GeoPoint>,
    pub price: f64,
    pub kind: String,
}

#[derive(Deserialize)]
pub struct CourierActionRequest {
    pub courier_id: Uuid,
}

#[derive(Deserialize)]
pub struct CompleteJobRequest {
    pub courier_id: Uuid,
    pub security_code: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelJobRequest {
    pub reason: Option<String>,
    pub courier_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct AcceptResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct DeclineResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct CompleteResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<crate::models::job::PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct CourierSummary {
    pub name: String,
    pub phone: String,
    pub plate: String,
    pub vehicle_model: String,
}

#[derive(Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub courier: Option<CourierSummary>,
}

async fn create_requester(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRequesterRequest>,
) -> Result<Json<Requester>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let requester = Requester {
        id: Uuid::new_v4(),
        name: payload.name,
        phone: payload.phone,
        created_at: Utc::now(),
    };
    state.store.insert_requester(requester.clone());
    Ok(Json(requester))
}

async fn requester_jobs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Job>>, AppError> {
    state.store.requester(id)?;
    Ok(Json(state.store.requester_jobs(id)))
}

async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<Json<Job>, AppError> {
    if payload.origin.trim().is_empty() || payload.destination.trim().is_empty() {
        return Err(AppError::BadRequest(
            "origin and destination are required".to_string(),
        ));
    }
    if !payload.price.is_finite() || payload.price <= 0.0 {
        return Err(AppError::BadRequest("price must be positive".to_string()));
    }
    state.store.requester(payload.requester_id)?;

    let now = Utc::now();
    let distance_km = match (&payload.origin_coords, &payload.destination_coords) {
        (Some(from), Some(to)) if from.is_valid() && to.is_valid() => {
            Some(haversine_km(from, to))
        }
        _ => None,
    };

    let job = Job {
        id: Uuid::new_v4(),
        requester_id: payload.requester_id,
        courier_id: None,
        origin: payload.origin,
        destination: payload.destination,
        origin_coords: payload.origin_coords,
        destination_coords: payload.destination_coords,
        distance_km,
        price: payload.price,
        kind: payload.kind,
        status: JobStatus::Pending,
        cancel_reason: None,
        payment_method: None,
        security_code: None,
        dispatch_round: 1,
        created_at: now,
    };

    state.store.insert_job(job.clone());
    state
        .metrics
        .jobs_total
        .with_label_values(&["created"])
        .inc();
    info!(job_id = %job.id, kind = %job.kind, "job created");

    dispatch_job(&state, job.id, now);

    Ok(Json(job))
}

async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobView>, AppError> {
    let job = state.store.job(id)?;

    let courier = job
        .courier_id
        .and_then(|courier_id| state.store.courier(courier_id).ok())
        .map(|courier| CourierSummary {
            name: courier.name,
            phone: courier.phone,
            plate: courier.plate,
            vehicle_model: courier.vehicle_model,
        });

    Ok(Json(JobView { job, courier }))
}

async fn accept_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<AcceptResponse>, AppError> {
    let won = state.store.assign_job(id, payload.courier_id)?;

    if !won {
        // Expected under competition; not an error and not logged as one.
        state
            .metrics
            .accepts_total
            .with_label_values(&["lost"])
            .inc();
        return Ok(Json(AcceptResponse {
            accepted: false,
            message: Some("job is no longer available".to_string()),
        }));
    }

    state
        .metrics
        .accepts_total
        .with_label_values(&["won"])
        .inc();
    state
        .metrics
        .jobs_total
        .with_label_values(&["assigned"])
        .inc();
    state.publish(JobEvent::Assigned {
        job_id: id,
        courier_id: payload.courier_id,
    });
    info!(job_id = %id, courier_id = %payload.courier_id, "job accepted");

    Ok(Json(AcceptResponse {
        accepted: true,
        message: None,
    }))
}

/// Courier-initiated fast path of the sweep's round advance: lapse the slot
/// now, penalize, offer the job to someone else.
async fn decline_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<DeclineResponse>, AppError> {
    let now = Utc::now();
    state.store.courier(payload.courier_id)?;

    if state.store.lapse_exposure(id, payload.courier_id) {
        state
            .store
            .penalize_courier(payload.courier_id, state.config.penalty(), now)?;
        info!(job_id = %id, courier_id = %payload.courier_id, "offer declined");
        dispatch_job(&state, id, now);
    }

    Ok(Json(DeclineResponse { success: true }))
}

async fn start_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourierActionRequest>,
) -> Result<Json<StartResponse>, AppError> {
    state.store.start_job(id, payload.courier_id)?;

    state
        .metrics
        .jobs_total
        .with_label_values(&["started"])
        .inc();
    state.publish(JobEvent::Started { job_id: id });
    info!(job_id = %id, courier_id = %payload.courier_id, "job started");

    Ok(Json(StartResponse { success: true }))
}

async fn complete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteJobRequest>,
) -> Result<Json<CompleteResponse>, AppError> {
    let outcome = state.store.complete_job(
        id,
        payload.courier_id,
        payload.security_code.as_deref(),
        state.config.commission_rate,
    )?;

    match outcome {
        CompletionOutcome::Settled { method, fee } => {
            state
                .metrics
                .jobs_total
                .with_label_values(&["completed"])
                .inc();
            state.publish(JobEvent::Completed {
                job_id: id,
                courier_id: payload.courier_id,
            });
            info!(job_id = %id, courier_id = %payload.courier_id, fee, "job completed");

            Ok(Json(CompleteResponse {
                success: true,
                method: Some(method),
                fee: Some(fee),
                message: None,
            }))
        }
        CompletionOutcome::NotCompletable => Ok(Json(CompleteResponse {
            success: false,
            method: None,
            fee: None,
            message: Some("job already completed or not ready".to_string()),
        })),
    }
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelJobRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let now = Utc::now();

    let (actor, default_reason) = match payload.courier_id {
        Some(courier_id) => (
            CancelActor::Courier(courier_id),
            "cancelled by the courier".to_string(),
        ),
        None => (CancelActor::Requester, "cancelled by the requester".to_string()),
    };
    let reason = payload
        .reason
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or(default_reason);

    let cancelled =
        state
            .store
            .cancel_job(id, reason.clone(), actor, state.config.penalty(), now)?;

    if !cancelled {
        // Lost the race against an accept or another cancel; benign.
        return Ok(Json(CancelResponse {
            cancelled: false,
            message: Some("job is no longer active".to_string()),
        }));
    }

    state
        .metrics
        .jobs_total
        .with_label_values(&["cancelled"])
        .inc();
    state.publish(JobEvent::Cancelled {
        job_id: id,
        reason: reason.clone(),
    });
    info!(job_id = %id, reason = %reason, "job cancelled");

    Ok(Json(CancelResponse {
        cancelled: true,
        message: None,
    }))
}
