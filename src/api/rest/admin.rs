use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::Json;
use axum::Router;
use chrono::{Datelike, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierCategory};
use crate::models::job::JobStatus;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/couriers", get(roster))
        .route("/admin/couriers/pending", get(pending_couriers))
        .route("/admin/couriers/:id/approve", post(approve_courier))
        .route("/admin/couriers/:id", delete(remove_courier))
        .route("/admin/dashboard", get(dashboard))
}

#[derive(Serialize)]
pub struct RosterEntry {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub plate: String,
    pub vehicle_model: String,
    pub category: CourierCategory,
    pub balance: f64,
    pub online: bool,
    pub blocked: bool,
}

#[derive(Serialize)]
pub struct ApproveResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct RecentJob {
    pub id: Uuid,
    pub origin: String,
    pub destination: String,
    pub price: f64,
    pub kind: String,
    pub status: JobStatus,
    pub cancel_reason: Option<String>,
    pub courier_name: Option<String>,
}

#[derive(Serialize)]
pub struct DashboardResponse {
    pub total_today: usize,
    pub total_month: usize,
    pub deliveries: usize,
    pub moto_taxis: usize,
    pub recent: Vec<RecentJob>,
}

async fn roster(State(state): State<Arc<AppState>>) -> Json<Vec<RosterEntry>> {
    let now = Utc::now();
    let mut entries: Vec<RosterEntry> = state
        .store
        .couriers_snapshot()
        .into_iter()
        .filter(|courier| courier.approved)
        .map(|courier| RosterEntry {
            online: courier.is_online(now),
            blocked: courier.is_blocked(now),
            id: courier.id,
            name: courier.name,
            phone: courier.phone,
            plate: courier.plate,
            vehicle_model: courier.vehicle_model,
            category: courier.category,
            balance: courier.balance,
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    Json(entries)
}

async fn pending_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let mut pending = state.store.pending_couriers();
    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(pending)
}

async fn approve_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApproveResponse>, AppError> {
    state.store.approve_courier(id)?;
    info!(courier_id = %id, "courier approved");
    Ok(Json(ApproveResponse { success: true }))
}

async fn remove_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApproveResponse>, AppError> {
    state.store.remove_courier(id)?;
    info!(courier_id = %id, "courier removed");
    Ok(Json(ApproveResponse { success: true }))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Json<DashboardResponse> {
    let now = Utc::now();
    let today = now.date_naive();
    let mut jobs = state.store.jobs_snapshot();
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total_today = jobs
        .iter()
        .filter(|job| job.created_at.date_naive() == today)
        .count();
    let total_month = jobs
        .iter()
        .filter(|job| {
            job.created_at.year() == now.year() && job.created_at.month() == now.month()
        })
        .count();
    let deliveries = jobs.iter().filter(|job| job.kind == "delivery").count();
    let moto_taxis = jobs.iter().filter(|job| job.kind == "moto-taxi").count();

    let recent = jobs
        .into_iter()
        .take(10)
        .map(|job| {
            let courier_name = job
                .courier_id
                .and_then(|courier_id| state.store.courier(courier_id).ok())
                .map(|courier| courier.name);
            RecentJob {
                id: job.id,
                origin: job.origin,
                destination: job.destination,
                price: job.price,
                kind: job.kind,
                status: job.status,
                cancel_reason: job.cancel_reason,
                courier_name,
            }
        })
        .collect();

    Json(DashboardResponse {
        total_today,
        total_month,
        deliveries,
        moto_taxis,
        recent,
    })
}
