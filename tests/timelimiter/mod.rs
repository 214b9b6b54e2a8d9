//! Time limiter tests.
//!
//! - boundaries.rs: completion just before and just after the deadline
//! - cancellation.rs: what the operation sees when the deadline passes
//! - retry_budget.rs: the deadline wrapped around a retry loop

mod boundaries;
mod cancellation;
