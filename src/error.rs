//! Capture error types.

use thiserror::Error;

use crate::backend::BackendError;

/// Errors returned by the capture pipeline.
///
/// Per-entry failures (readback, unwrap, format or encoding) are not errors;
/// they are reported through each result's status.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("a capture batch is already in flight on this coordinator")]
    BatchInFlight,
    #[error("capture cannot be requested from the {0} context")]
    ForbiddenContext(String),
    #[error("{0} context has shut down")]
    ContextClosed(String),
    #[error("timed out after {slices} wait slices")]
    Timeout { slices: u32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}
