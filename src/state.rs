use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::models::job::JobEvent;
use crate::observability::metrics::Metrics;
use crate::payments::PaymentGateway;
use crate::store::Store;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub payments: PaymentGateway,
    pub job_events_tx: broadcast::Sender<JobEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let (job_events_tx, _unused_rx) = broadcast::channel(config.event_buffer_size);
        let payments = PaymentGateway::new(Duration::from_secs(config.payment_timeout_secs));

        Self {
            store: Store::open(),
            payments,
            job_events_tx,
            metrics: Metrics::new(),
            config,
        }
    }

    /// Best-effort publish; nobody listening is fine.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.job_events_tx.send(event);
    }
}
