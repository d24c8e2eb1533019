// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Simulates a dependency outage and shows how the pipeline reacts:
//!
//! 1. Transient failures are retried with exponential backoff
//! 2. Repeated failures open the circuit and calls are rejected without reaching the dependency
//! 3. After the open timeout a probe is let through, and the circuit closes once the dependency
//!    has recovered
//!
//! Run with `cargo run --example pipeline --features logs`.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use breakwater::breaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use breakwater::classify::HttpError;
use breakwater::pipeline::Pipeline;
use breakwater::retry::{RetryPolicy, Retryer};
use breakwater::timeout::{TimeoutConfig, TimeoutManager};
use breakwater::{CallContext, ResilienceContext};
use tick::Clock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let clock = Clock::new_tokio();
    let context = ResilienceContext::new(&clock).name("example_client").enable_logs();

    // Decrease these values to see the circuit trip and recover faster
    let registry = CircuitBreakerRegistry::new(&context)
        .with_defaults(
            CircuitBreakerConfig::default()
                .failure_threshold(3)
                .open_timeout(Duration::from_millis(500)),
        )
        .on_state_change(|args| println!("circuit '{}' moved from {} to {}", args.name(), args.from(), args.to()));

    let pipeline = Pipeline::new(
        registry.get("inventory"),
        Retryer::new(
            RetryPolicy::default()
                .max_attempts(2)
                .base_delay(Duration::from_millis(20)),
            &context,
        )
        .with_service("inventory", "/items"),
        TimeoutManager::new(TimeoutConfig::default(), &context),
    )
    .attempt_timeout(Duration::from_millis(100));

    let requests = Arc::new(AtomicU32::new(0));

    for call in 0..30 {
        clock.delay(Duration::from_millis(50)).await;

        let requests = Arc::clone(&requests);
        let result = pipeline
            .execute(&CallContext::new(&clock), "list_items", move |_ctx| {
                let request = requests.fetch_add(1, Ordering::Relaxed);
                async move { list_items(request) }
            })
            .await;

        match result {
            Ok(items) => println!("{call}: {items}"),
            Err(e) => match e.source() {
                Some(source) => println!("{call}: {e}: {source}"),
                None => println!("{call}: {e}"),
            },
        }
    }

    for stats in registry.stats() {
        println!("{stats:?}");
    }
}

// The dependency is down for its first 12 requests, then flaky, then healthy
fn list_items(request: u32) -> Result<String, HttpError> {
    match request {
        0..12 => Err(HttpError::new(503, "service unavailable")),
        12..20 if fastrand::bool() => Err(HttpError::new(502, "bad gateway")),
        _ => Ok(format!("{} items", fastrand::u32(1..100))),
    }
}
