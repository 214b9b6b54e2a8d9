//! Resilience policies for inter-service calls.
//!
//! Each downstream dependency gets one [`ResiliencePolicy`], combining:
//!
//! - a bulkhead limiting concurrent calls in this process,
//! - a deadline for the whole execution,
//! - retries with exponential backoff and jitter,
//! - a circuit breaker whose state is shared by every replica through a
//!   [`SharedStateStore`](svc_resilience_store::SharedStateStore).
//!
//! The order is fixed. The circuit breaker sits closest to the operation, so
//! each retry attempt counts toward its threshold. The deadline wraps the
//! retry loop, so `per_call_timeout` must leave room for the backoff sleeps.
//! The bulkhead is outermost and holds its permit for the whole execution.
//!
//! ```rust
//! use svc_resilience::{DependencyPolicyConfig, ResiliencePolicy, ResilienceError};
//! use svc_resilience_store::InMemoryStore;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DependencyPolicyConfig::builder("payments")
//!     .failure_threshold(3)
//!     .recovery_timeout(Duration::from_secs(10))
//!     .per_call_timeout(Duration::from_secs(5))
//!     .base_delay(Duration::from_millis(200))
//!     .build()?;
//! let policy = ResiliencePolicy::build(config, Arc::new(InMemoryStore::new()))?;
//!
//! match policy
//!     .execute(|_ctx| async { Ok::<_, std::io::Error>("charged") })
//!     .await
//! {
//!     Ok(receipt) => println!("{receipt}"),
//!     Err(ResilienceError::CircuitOpen { .. }) => println!("serving cached response"),
//!     Err(e) => return Err(e.into()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Services with many dependencies build a [`PolicyRegistry`] at startup,
//! usually from a TOML document, and hand policies out by name.
//!
//! ## Feature Flags
//! - `metrics`: enables metrics collection in this crate and every layer

pub mod config;
pub mod error;
pub mod outcome;
pub mod policy;
pub mod registry;

pub use config::{DependencyPolicyConfig, DependencyPolicyConfigBuilder};
pub use error::{ConfigError, RegistryError, ResilienceError};
pub use outcome::ExecutionOutcome;
pub use policy::{ResiliencePolicy, ResiliencePolicyBuilder};
pub use registry::{PolicyRegistry, PolicyRegistryBuilder};

pub use svc_resilience_circuitbreaker::{CircuitRecord, CircuitState};
pub use svc_resilience_core::{CallContext, Classify, ErrorKind, RetryableKinds};
