use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("signals_received").absolute(0);
    counter!("signals_duplicate").absolute(0);
    counter!("signals_expired_on_arrival").absolute(0);
    counter!("dispatches_created").absolute(0);
    counter!("dispatches_duplicate").absolute(0);
    counter!("dispatches_skipped").absolute(0);
    counter!("dispatches_failed").absolute(0);
    counter!("dispatches_worker_unavailable").absolute(0);
    counter!("bridge_send_retries").absolute(0);
    counter!("workers_provisioned").absolute(0);
    counter!("workers_recycled").absolute(0);

    // Pre-register gauges at zero.
    gauge!("live_workers").set(0.0);
    gauge!("eligible_users").set(0.0);

    handle
}
