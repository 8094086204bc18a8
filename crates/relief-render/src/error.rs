//! Errors raised while setting up or reading back from the wgpu backend.
//!
//! The per-frame command path never fails; these only surface from device
//! acquisition and readback.

use crate::backend::TextureId;

/// Error type for wgpu backend setup and readback failures.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// No compatible GPU adapter found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    /// Mapping the readback buffer failed.
    #[error("failed to map readback buffer: {0}")]
    Map(#[from] wgpu::BufferAsyncError),

    /// The map callback was dropped before it reported.
    #[error("readback channel closed before the buffer was mapped")]
    MapChannelClosed,

    /// No default framebuffer has been set.
    #[error("no default frame target is set")]
    NoFrameTarget,

    /// Handle does not name a live texture.
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),
}
