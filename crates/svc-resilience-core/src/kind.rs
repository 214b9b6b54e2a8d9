//! Error classification.
//!
//! Primitives never inspect concrete error types. A wrapped operation's
//! error reports an [`ErrorKind`] through [`Classify`], and each policy
//! decides from a [`RetryableKinds`] set whether that kind is worth another
//! attempt and whether it counts against the dependency's circuit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::io;

/// Coarse category of a failure returned by a wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The dependency could not be reached (refused, reset, DNS).
    Connection,
    /// The dependency did not answer in time.
    Timeout,
    /// The dependency answered that it is unavailable (e.g. HTTP 503).
    Unavailable,
    /// The dependency throttled the caller.
    RateLimited,
    /// The dependency failed internally (e.g. HTTP 500).
    Server,
    /// The request was rejected as invalid.
    Validation,
    /// The requested entity does not exist.
    NotFound,
    /// The caller is not allowed to perform the request.
    Unauthorized,
    /// The request conflicts with the current state of the dependency.
    Conflict,
    /// A circuit breaker refused the call without invoking the dependency.
    CircuitOpen,
    /// Anything not covered above.
    Other,
}

impl ErrorKind {
    /// Returns the snake_case label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Server => "server",
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Conflict => "conflict",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implemented by errors that can report their [`ErrorKind`].
pub trait Classify {
    /// Returns the category of this error.
    fn kind(&self) -> ErrorKind;
}

impl Classify for io::Error {
    fn kind(&self) -> ErrorKind {
        match io::Error::kind(self) {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => ErrorKind::Connection,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ErrorKind::Timeout,
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::Unauthorized,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::Validation,
            io::ErrorKind::AlreadyExists => ErrorKind::Conflict,
            _ => ErrorKind::Other,
        }
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn kind(&self) -> ErrorKind {
        (**self).kind()
    }
}

/// The set of error kinds a policy treats as transient.
///
/// Kinds in this set are retried and count toward the circuit breaker's
/// failure threshold. Everything else passes straight through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetryableKinds(BTreeSet<ErrorKind>);

impl RetryableKinds {
    /// Creates a set from the given kinds.
    pub fn new<I: IntoIterator<Item = ErrorKind>>(kinds: I) -> Self {
        Self(kinds.into_iter().collect())
    }

    /// Creates an empty set: nothing is retried, nothing trips the circuit.
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns true if `kind` is in the set.
    pub fn contains(&self, kind: ErrorKind) -> bool {
        self.0.contains(&kind)
    }

    /// Returns true if the error's kind is in the set.
    pub fn matches<E: Classify + ?Sized>(&self, error: &E) -> bool {
        self.contains(error.kind())
    }

    /// Iterates over the kinds in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.0.iter().copied()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RetryableKinds {
    /// `{connection, timeout, unavailable}`.
    fn default() -> Self {
        Self::new([
            ErrorKind::Connection,
            ErrorKind::Timeout,
            ErrorKind::Unavailable,
        ])
    }
}

impl FromIterator<ErrorKind> for RetryableKinds {
    fn from_iter<I: IntoIterator<Item = ErrorKind>>(iter: I) -> Self {
        Self::new(iter)
    }
}
