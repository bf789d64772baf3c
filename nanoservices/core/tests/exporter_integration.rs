use std::net::TcpListener;
use std::time::Duration;

use medallion_core::metrics;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exporter_serves_metrics() {
    // Port 0 lets the OS pick a free port.
    let std_listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = std_listener.local_addr().unwrap();

    let (handle, shutdown_tx) = metrics::start_exporter(std_listener).expect("failed to start exporter");

    metrics::inc_run("succeeded");
    metrics::inc_failure("bronze", "ExtractionError");

    let client = reqwest::Client::builder().timeout(Duration::from_secs(2)).build().unwrap();
    let url = format!("http://{addr}/metrics");
    let resp = client.get(&url).send().await.expect("failed to query metrics");
    assert!(resp.status().is_success());
    let body_text = resp.text().await.expect("failed to read body");

    assert!(body_text.contains("medallion_runs_total"), "metrics output missing runs metric: {body_text}");
    assert!(body_text.contains("ExtractionError"), "metrics output missing our label: {body_text}");

    let missing = client.get(format!("http://{addr}/other")).send().await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown_tx.send(()).expect("failed to send shutdown");
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("exporter did not stop")
        .unwrap();
}
