//! Tokio tasks sharing an async rate limit.

use pacer::{AsyncRateLimit, AsyncRefillScheduler, Per, SharedAsyncScheduler};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Async Rate Limit Example ===\n");

    let scheduler: SharedAsyncScheduler = Arc::new(AsyncRefillScheduler::new());
    let limit = AsyncRateLimit::new(Per::second(4), 2, &scheduler).unwrap();
    let start = Instant::now();

    let tasks: Vec<_> = (0..8)
        .map(|task| {
            let limit = limit.clone();
            tokio::spawn(async move {
                limit.wait(1).await;
                println!("   [{:>5}ms] task {} running", start.elapsed().as_millis(), task);
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    println!("\n   Impatient task:");
    if limit.wait_timeout(2, Duration::from_millis(100)).await {
        println!("   got 2 tokens");
    } else {
        println!("   gave up after 100ms");
    }

    println!("\n{}", limit.metrics());
    println!("\n{}", scheduler.stats());
    scheduler.stop();
}
