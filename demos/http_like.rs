//! A pool of worker threads sharing one rate limit in front of simulated
//! HTTP requests: 1 request per second, bursts of up to 5.

use pacer::{Per, RateLimit, RefillScheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WORKERS: usize = 3;
const REQUESTS: usize = 8;

fn fetch(url: &str) -> u16 {
    // Stand-in for a real HTTP client
    thread::sleep(Duration::from_millis(20));
    if url.ends_with("/404") {
        404
    } else {
        200
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Rate Limited Requests ===\n");

    let scheduler = RefillScheduler::new();
    let limit = RateLimit::new(Per::second(1), 5, &scheduler).unwrap();

    let next = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let limit = limit.clone();
            let next = next.clone();
            thread::spawn(move || loop {
                let request = next.fetch_add(1, Ordering::SeqCst);
                if request >= REQUESTS {
                    break;
                }

                limit.wait(1, None);
                let url = if request == 6 {
                    "https://example.com/404".to_string()
                } else {
                    format!("https://example.com/items/{}", request)
                };
                let status = fetch(&url);
                println!(
                    "   [{:>5}ms] worker {} GET {} -> {}",
                    start.elapsed().as_millis(),
                    worker,
                    url,
                    status
                );
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    println!(
        "\n   {} requests in {:.1}s (5 burst + 3 paced)",
        REQUESTS,
        start.elapsed().as_secs_f64()
    );
    scheduler.stop();
}
