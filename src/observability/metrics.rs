use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub dispatches_total: IntCounterVec,
    pub accepts_total: IntCounterVec,
    pub jobs_total: IntCounterVec,
    pub exposures_active: IntGauge,
    pub sweep_ticks_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let dispatches_total = IntCounterVec::new(
            Opts::new("dispatches_total", "Dispatch attempts by outcome"),
            &["outcome"],
        )
        .expect("valid dispatches_total metric");

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let jobs_total = IntCounterVec::new(
            Opts::new("jobs_total", "Job lifecycle transitions by kind"),
            &["transition"],
        )
        .expect("valid jobs_total metric");

        let exposures_active =
            IntGauge::new("exposures_active", "Live exposure rows across all jobs")
                .expect("valid exposures_active metric");

        let sweep_ticks_total =
            IntCounter::new("sweep_ticks_total", "Completed expiry sweep ticks")
                .expect("valid sweep_ticks_total metric");

        registry
            .register(Box::new(dispatches_total.clone()))
            .expect("register dispatches_total");
        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(jobs_total.clone()))
            .expect("register jobs_total");
        registry
            .register(Box::new(exposures_active.clone()))
            .expect("register exposures_active");
        registry
            .register(Box::new(sweep_ticks_total.clone()))
            .expect("register sweep_ticks_total");

        Self {
            registry,
            dispatches_total,
            accepts_total,
            jobs_total,
            exposures_active,
            sweep_ticks_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
