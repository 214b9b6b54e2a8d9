//! Bulkhead tests.
//!
//! - concurrency.rs: the in-flight limit under load
//! - permits.rs: permits released on every exit path
