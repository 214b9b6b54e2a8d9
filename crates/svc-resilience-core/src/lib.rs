//! Core infrastructure for the service resilience layer.
//!
//! This crate provides the pieces shared by every primitive:
//! - Event system for observability
//! - Error classification ([`ErrorKind`], [`Classify`], [`RetryableKinds`])
//! - Wall-clock abstraction used for cross-replica timestamps
//! - [`CallContext`], the request value threaded through a policy's layer stack

pub mod clock;
pub mod context;
pub mod events;
pub mod kind;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use context::{deadline_after, CallContext};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use kind::{Classify, ErrorKind, RetryableKinds};
