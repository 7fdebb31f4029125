use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;

/// Settlement outcome delivered by the provider's webhook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SettlementOutcome {
    Approved,
    Rejected,
    Cancelled,
}

impl SettlementOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            SettlementOutcome::Approved => "approved",
            SettlementOutcome::Rejected => "rejected",
            SettlementOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PixCharge {
    pub copy_paste: String,
    pub qr_code: String,
}

/// Opaque external payment collaborator. The in-process stub issues charge
/// data locally; every call still goes through the configured timeout so a
/// slow provider can never wedge a handler.
pub struct PaymentGateway {
    timeout: Duration,
}

impl PaymentGateway {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub async fn create_pix_charge(
        &self,
        job_id: Uuid,
        amount: f64,
    ) -> Result<PixCharge, AppError> {
        let charge = tokio::time::timeout(self.timeout, issue_pix_charge(job_id, amount))
            .await
            .map_err(|_| AppError::Internal("payment provider timed out".to_string()))??;

        info!(job_id = %job_id, amount, "pix charge created");
        Ok(charge)
    }
}

async fn issue_pix_charge(job_id: Uuid, amount: f64) -> Result<PixCharge, AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Internal(format!(
            "provider refused charge amount {amount}"
        )));
    }

    let reference = Uuid::new_v4().simple().to_string();
    let copy_paste = format!("PIX|{job_id}|{amount:.2}|{reference}");
    let qr_code = format!("https://charge.example/qr/{reference}");

    Ok(PixCharge {
        copy_paste,
        qr_code,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::PaymentGateway;

    #[tokio::test]
    async fn charge_carries_the_job_reference() {
        let gateway = PaymentGateway::new(Duration::from_secs(5));
        let job_id = Uuid::new_v4();

        let charge = gateway.create_pix_charge(job_id, 42.5).await.unwrap();
        assert!(charge.copy_paste.contains(&job_id.to_string()));
        assert!(charge.copy_paste.contains("42.50"));
    }

    #[tokio::test]
    async fn non_positive_amounts_are_refused() {
        let gateway = PaymentGateway::new(Duration::from_secs(5));
        assert!(gateway.create_pix_charge(Uuid::new_v4(), 0.0).await.is_err());
    }
}
