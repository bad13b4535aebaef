//! Error types shared by the alert engine plumbing.

use std::io;

use thiserror::Error;

/// Errors raised by persistence, configuration, sources and the indicator.
///
/// The decision engine never hands these to the notification dispatcher;
/// they surface only from the fallible plumbing around it.
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Alert had no provider id and no stable fields to derive one from.
    #[error("alert has no id and no stable fields to derive one")]
    MissingIdentity,

    #[error("a taskbar indicator is already registered (instance {0})")]
    IndicatorAlreadyRegistered(u64),

    #[error("alert source failed: {0}")]
    Source(String),
}

pub type AlertResult<T> = Result<T, AlertError>;
