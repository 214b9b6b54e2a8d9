//! Two replicas of a checkout service sharing one circuit per dependency.
//! Run with: cargo run --example payments_gateway
//! With logs: RUST_LOG=debug cargo run --example payments_gateway

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svc_resilience::{PolicyRegistry, ResilienceError};
use svc_resilience_store::{InMemoryStore, SharedStore};

const POLICIES: &str = r#"
[dependencies.payments]
failure_threshold = 3
recovery_timeout = 1.0
max_retry_attempts = 2
base_delay = 0.05
per_call_timeout = 0.5

[dependencies.fraud]
max_concurrent = 4
per_call_timeout = 0.2
base_delay = 0.02
"#;

async fn charge(gateway_up: Arc<AtomicBool>) -> Result<&'static str, std::io::Error> {
    if gateway_up.load(Ordering::SeqCst) {
        Ok("charged")
    } else {
        Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    // Stands in for the cluster's cache; every replica talks to the same one.
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let replica_a = PolicyRegistry::from_toml(POLICIES, Arc::clone(&store))?;
    let replica_b = PolicyRegistry::from_toml(POLICIES, Arc::clone(&store))?;
    let gateway_up = Arc::new(AtomicBool::new(false));

    println!("payment gateway is down");
    for i in 1..=2 {
        let up = Arc::clone(&gateway_up);
        let (result, outcome) = replica_a
            .policy("payments")?
            .execute_with_outcome(move |_| charge(Arc::clone(&up)))
            .await;
        println!(
            "replica A checkout {i}: {} after {} attempts",
            describe(&result),
            outcome.attempts_made
        );
    }

    let payments_b = replica_b.policy("payments")?;
    let up = Arc::clone(&gateway_up);
    let result = payments_b.execute(move |_| charge(Arc::clone(&up))).await;
    println!("replica B checkout: {}", describe(&result));
    println!("shared record: {:?}", payments_b.circuit_record().await);

    println!("gateway recovers; waiting out the recovery timeout");
    gateway_up.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let up = Arc::clone(&gateway_up);
    let result = payments_b.execute(move |_| charge(Arc::clone(&up))).await;
    println!("replica B trial: {}", describe(&result));
    println!(
        "replica A sees the circuit as {:?}",
        replica_a.policy("payments")?.circuit_record().await.state
    );

    let fraud = replica_a.policy("fraud")?;
    let result = fraud
        .execute(|ctx| async move {
            tokio::select! {
                _ = ctx.cancellation().cancelled() => Err(std::io::Error::from(std::io::ErrorKind::Interrupted)),
                _ = tokio::time::sleep(Duration::from_secs(1)) => Ok("score: 0.02"),
            }
        })
        .await;
    println!("fraud check: {}", describe(&result));

    Ok(())
}

fn describe<T: std::fmt::Debug>(result: &Result<T, ResilienceError<std::io::Error>>) -> String {
    match result {
        Ok(value) => format!("ok {value:?}"),
        Err(ResilienceError::CircuitOpen { name }) => format!("circuit for {name} open, using fallback"),
        Err(err) => format!("failed: {err}"),
    }
}
