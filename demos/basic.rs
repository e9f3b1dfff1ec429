//! Basic usage example for the pacer crate.

use pacer::{BlockingBucket, Per, RateLimit, RateLimitConfig, RefillScheduler};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== Basic Rate Limit Example ===\n");

    let scheduler = RefillScheduler::new();

    // Example 1: Bursts, then pacing
    burst_example(&scheduler);

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 2: Timeouts
    timeout_example(&scheduler);

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    // Example 3: Driving a bucket directly
    bucket_example(&scheduler);

    println!("{}", "\n".to_owned() + "=".repeat(50).as_str() + "\n");

    println!("{}", scheduler.stats());
    scheduler.stop();
}

fn burst_example(scheduler: &RefillScheduler) {
    println!("1. Burst of 3, then 5 calls per second:");

    let config = RateLimitConfig::new(Per::second(5), 3);
    let limit = RateLimit::from_config(config, scheduler).unwrap();

    let start = Instant::now();
    for i in 1..=7 {
        limit.wait(1, None);
        println!("   Call {} at {:>4}ms", i, start.elapsed().as_millis());
    }
}

fn timeout_example(scheduler: &RefillScheduler) {
    println!("2. Waiting with a timeout:");

    let limit = RateLimit::new(Per::second(1), 2, scheduler).unwrap();

    for i in 1..=4 {
        if limit.wait(1, Some(Duration::from_millis(300))) {
            println!("   Call {} - allowed", i);
        } else {
            println!("   Call {} - gave up after 300ms", i);
        }
    }

    // Asking for more than the burst can never succeed
    println!("   wait(3) on a burst of 2: {}", limit.wait(3, None));
    println!("\n{}", limit.metrics());
}

fn bucket_example(scheduler: &RefillScheduler) {
    println!("3. Raw token bucket:");

    let bucket = Arc::new(BlockingBucket::new(10.0, 10).unwrap());
    scheduler.register(&bucket).unwrap();

    assert!(bucket.consume(10, None));
    println!("   Drained: {} tokens", bucket.available_tokens());

    std::thread::sleep(Duration::from_millis(550));
    println!("   After 550ms: {} tokens", bucket.available_tokens());

    scheduler.deregister(bucket.id());
}
