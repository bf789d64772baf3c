use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Body, Method, Request, Response, StatusCode};
use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::convert::Infallible;
use tokio::task::JoinHandle;

// Global registry and metrics are initialized lazily.
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help).namespace("medallion"), labels)
        .unwrap_or_else(|e| panic!("invalid metric definition {name}: {e}"));
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

static ASSET_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new("asset_duration_ms", "Asset execution duration in milliseconds")
        .namespace("medallion")
        .buckets(vec![1.0, 5.0, 25.0, 100.0, 500.0, 2_500.0, 10_000.0, 60_000.0]);
    let hist = HistogramVec::new(opts, &["asset"])
        .unwrap_or_else(|e| panic!("invalid metric definition asset_duration_ms: {e}"));
    REGISTRY.register(Box::new(hist.clone())).ok();
    hist
});

static MATERIALIZATIONS: Lazy<CounterVec> =
    Lazy::new(|| counter("materializations_total", "Successful asset materializations", &["layer"]));

static FAILURES: Lazy<CounterVec> =
    Lazy::new(|| counter("asset_failures_total", "Failed asset executions", &["layer", "kind"]));

static SKIPS: Lazy<CounterVec> = Lazy::new(|| counter("asset_skips_total", "Skipped assets", &["layer"]));

static RUNS: Lazy<CounterVec> = Lazy::new(|| counter("runs_total", "Finished runs by status", &["status"]));

/// Observe an asset execution duration in milliseconds.
pub fn observe_duration(asset: &str, duration_ms: f64) {
    ASSET_DURATION_MS.with_label_values(&[asset]).observe(duration_ms);
}

pub fn inc_materialization(layer: &str) {
    MATERIALIZATIONS.with_label_values(&[layer]).inc();
}

pub fn inc_failure(layer: &str, kind: &str) {
    FAILURES.with_label_values(&[layer, kind]).inc();
}

pub fn inc_skipped(layer: &str) {
    SKIPS.with_label_values(&[layer]).inc();
}

pub fn inc_run(status: &str) {
    RUNS.with_label_values(&[status]).inc();
}

/// Gather metrics as text in Prometheus exposition format.
///
/// ```no_run
/// use medallion_core::metrics;
/// metrics::inc_materialization("bronze");
/// let body = metrics::gather_text();
/// println!("metrics:\n{}", body);
/// ```
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

async fn serve(req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::GET && req.uri().path() == "/metrics" {
        let mut response = Response::new(Body::from(gather_text()));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; version=0.0.4"));
        return Ok(response);
    }
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_FOUND;
    Ok(response)
}

/// Serve `/metrics` on `listener` until `shutdown` resolves.
///
/// Must be called from within a Tokio runtime. The listener is switched to
/// non-blocking mode.
///
/// ```no_run
/// # async fn demo() -> std::io::Result<()> {
/// use std::net::TcpListener;
/// use medallion_core::metrics;
///
/// let listener = TcpListener::bind("127.0.0.1:0")?;
/// let shutdown = async { let _ = tokio::signal::ctrl_c().await; };
/// metrics::start_exporter_with_shutdown(listener, shutdown)?.await.ok();
/// # Ok(())
/// # }
/// ```
pub fn start_exporter_with_shutdown<F>(
    listener: std::net::TcpListener,
    shutdown: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    listener.set_nonblocking(true)?;
    let tcp_listener = tokio::net::TcpListener::from_std(listener)?;

    Ok(tokio::spawn(async move {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("metrics exporter shutdown requested");
                    break;
                }
                accept = tcp_listener.accept() => {
                    match accept {
                        Ok((stream, _peer)) => {
                            tokio::spawn(async move {
                                if let Err(err) = hyper::server::conn::Http::new()
                                    .serve_connection(stream, service_fn(serve))
                                    .await
                                {
                                    tracing::error!(error = ?err, "connection serve error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = ?e, "failed to accept connection on metrics listener");
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!("metrics exporter stopped");
    }))
}

/// Start the exporter with a oneshot sender that requests shutdown.
pub fn start_exporter(
    listener: std::net::TcpListener,
) -> std::io::Result<(JoinHandle<()>, tokio::sync::oneshot::Sender<()>)> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = start_exporter_with_shutdown(listener, async move {
        let _ = rx.await;
    })?;
    Ok((handle, tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        inc_materialization("silver");
        inc_failure("bronze", "ExtractionError");
        observe_duration("silver/ecom/orders", 12.0);

        let text = gather_text();
        assert!(text.contains("medallion_materializations_total"));
        assert!(text.contains("kind=\"ExtractionError\""));
        assert!(text.contains("medallion_asset_duration_ms_bucket"));
    }
}
