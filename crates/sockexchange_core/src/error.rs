//! Error types for the coordination core.

use crate::executor::ExecutorState;

/// Errors produced by the coordination core.
///
/// Only [`ExchangeError::Rejected`] is ever surfaced synchronously to a caller
/// of the executor; the remaining variants describe failures that happen inside
/// scheduled work and are logged at the task boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// The executor refused a submission because intake is stopped
    #[error("Task rejected: executor is {0}")]
    Rejected(ExecutorState),
    /// A consumer read past the end of a payload or found invalid data
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    /// A field was too large to be encoded
    #[error("Payload field too large: {0} bytes")]
    PayloadTooLarge(usize),
    /// A response carried a status code this build does not know
    #[error("Unknown response status code: {0}")]
    UnknownStatus(u8),
    /// A consumer reported a failure while handling a message
    #[error("Consumer execution error: {0}")]
    ConsumerFailed(String),
}

impl ExchangeError {
    /// Whether this error is a rejected submission.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ExchangeError::Rejected(_))
    }
}
