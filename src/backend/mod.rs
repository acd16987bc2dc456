//! Backend abstraction layer
//!
//! Provides the render target traits plus the in-memory and wgpu implementations.

pub mod memory;
pub mod traits;
pub mod types;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
