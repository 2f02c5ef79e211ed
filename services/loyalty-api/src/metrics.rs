use lazy_static::lazy_static;
use loyalty_core::metrics::Metrics;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("loyalty_api_http_requests_total", "Total HTTP requests"),
        &["endpoint", "status"]
    ).expect("metric can be created");

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("loyalty_api_http_request_duration_seconds", "HTTP request duration")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["endpoint"]
    ).expect("metric can be created");
}

/// Register the HTTP metrics with the given registry
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    Ok(())
}

/// Count one finished request
pub fn observe(endpoint: &str, status: u16) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[endpoint, &status.to_string()])
        .inc();
}

/// Render the API registry followed by the ledger registry
pub fn render(api: &Registry, ledger: &Metrics) -> prometheus::Result<String> {
    let mut families = api.gather();
    families.extend(ledger.registry().gather());

    let mut buffer = vec![];
    TextEncoder::new().encode(&families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let registry = Registry::new();
        assert!(register_metrics(&registry).is_ok());
        // Same collectors twice in one registry
        assert!(register_metrics(&registry).is_err());
    }

    #[test]
    fn test_render_includes_both_registries() {
        let registry = Registry::new();
        register_metrics(&registry).unwrap();
        observe("health", 200);

        let ledger = Metrics::new().unwrap();
        ledger.record_deposit();

        let output = render(&registry, &ledger).unwrap();
        assert!(output.contains("loyalty_api_http_requests_total"));
        assert!(output.contains("loyalty_deposits_total 1"));
    }
}
