use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::job::{JobEvent, PaymentMethod};
use crate::payments::{PixCharge, SettlementOutcome};
use crate::state::AppState;
use crate::store::jobs::{PaymentChoice, SettleResult};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs/:id/payment", post(choose_payment))
        .route("/payments/webhook", post(payment_webhook))
}

#[derive(Deserialize)]
pub struct ChoosePaymentRequest {
    pub method: PaymentMethod,
    pub security_code: Option<String>,
}

#[derive(Serialize)]
pub struct ChoosePaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge: Option<PixCharge>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct WebhookRequest {
    /// The job the provider settled, carried as its external reference.
    pub reference: Uuid,
    pub outcome: SettlementOutcome,
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
}

async fn choose_payment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChoosePaymentRequest>,
) -> Result<Json<ChoosePaymentResponse>, AppError> {
    let choice =
        state
            .store
            .choose_payment(id, payload.method, payload.security_code.clone())?;

    match choice {
        PaymentChoice::Released => {
            state
                .metrics
                .jobs_total
                .with_label_values(&["released"])
                .inc();
            state.publish(JobEvent::Released { job_id: id });
            info!(job_id = %id, method = ?payload.method, "job released on payment choice");

            Ok(Json(ChoosePaymentResponse {
                success: true,
                method: Some(payload.method),
                charge: None,
                message: None,
            }))
        }
        PaymentChoice::AwaitingSettlement => {
            let charge = if payload.method == PaymentMethod::Pix {
                let job = state.store.job(id)?;
                Some(state.payments.create_pix_charge(id, job.price).await?)
            } else {
                None
            };

            Ok(Json(ChoosePaymentResponse {
                success: true,
                method: Some(payload.method),
                charge,
                message: None,
            }))
        }
        PaymentChoice::NotPayable => Ok(Json(ChoosePaymentResponse {
            success: false,
            method: None,
            charge: None,
            message: Some("job is not awaiting payment".to_string()),
        })),
    }
}

/// Provider callback. Duplicate deliveries of the same outcome are answered
/// with 200 and change nothing, so the provider can retry freely.
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, AppError> {
    let result = match state.store.settle_payment(payload.reference, payload.outcome) {
        Ok(result) => result,
        Err(AppError::NotFound(_)) => {
            warn!(reference = %payload.reference, "webhook for unknown job");
            return Ok(Json(WebhookResponse { status: "ignored" }));
        }
        Err(err) => return Err(err),
    };

    let status = match result {
        SettleResult::Released => {
            state
                .metrics
                .jobs_total
                .with_label_values(&["released"])
                .inc();
            state.publish(JobEvent::Released {
                job_id: payload.reference,
            });
            info!(job_id = %payload.reference, "payment approved; job released");
            "ok"
        }
        SettleResult::Cancelled => {
            state
                .metrics
                .jobs_total
                .with_label_values(&["cancelled"])
                .inc();
            state.publish(JobEvent::Cancelled {
                job_id: payload.reference,
                reason: format!("[system] payment {}", payload.outcome.as_str()),
            });
            info!(job_id = %payload.reference, outcome = payload.outcome.as_str(), "payment failed; job cancelled");
            "ok"
        }
        SettleResult::AlreadySettled | SettleResult::Ignored => "ignored",
    };

    Ok(Json(WebhookResponse { status }))
}
