//! Load testing for the gateway.

use std::time::{Duration, Instant};

mod common;

#[tokio::test]
async fn test_load_performance() {
    let backend = common::start_mock_backend("Hello from upstream").await;
    let gateway = common::start_gateway(common::config_with_upstream("quotes", backend)).await;

    let concurrency = 20;
    let requests_per_task = 25;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = gateway.url("/upstream/quotes/v1/quote");
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies: Vec<Duration> = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }
    let duration = start.elapsed();

    assert_eq!(all_latencies.len(), total_requests, "every request should succeed");

    let quotes = gateway.registry.get("quotes").unwrap();
    assert_eq!(quotes.active_requests(), 0, "request guards must all be released");
    let report = quotes.report();
    assert_eq!(report.failure_count, 0);
    assert_eq!(report.latency.samples, 64);

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!(
        "Requests/sec:   {:.2}",
        total_requests as f64 / duration.as_secs_f64()
    );
    println!("P50 Latency:    {:?}", p50);
    println!("P99 Latency:    {:?}", p99);
    println!("-------------------------\n");
}
