pub mod appointment;
pub mod auth;
pub mod billing;
pub mod error;
pub mod notification;
pub mod queue;
pub mod schedule;

/// A status string read from storage that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status value: {0}")]
pub struct UnknownStatus(pub String);
