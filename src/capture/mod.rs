//! Synchronous capture of rendered frames.
//!
//! [`CaptureCoordinator`] turns a batch of [`CaptureRequestParams`] into
//! [`CaptureResult`]s, blocking the calling thread while the producer and
//! render contexts do the work.

mod coordinator;
mod request;

pub use coordinator::*;
pub use request::*;
