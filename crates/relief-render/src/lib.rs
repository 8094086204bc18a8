//! Two-pass terrain tile rendering: elevation preparation into pooled
//! offscreen targets, then illuminated shading into the main framebuffer.

pub mod backend;
pub mod error;
pub mod prepare;
pub mod shade;
pub mod shaders;
pub mod target_pool;
pub mod terrain;
pub mod tile;
pub mod uniforms;
pub mod wgpu_backend;

#[cfg(test)]
mod recording;

pub use backend::{DepthFunc, FramebufferId, Program, RenderState, TerrainBackend, TextureId};
pub use error::BackendError;
pub use target_pool::{RenderTarget, RenderTargetPool};
pub use terrain::{
    FrameStats, RenderPass, TERRAIN_TILE_HEIGHT, TERRAIN_TILE_WIDTH, TerrainLayer, TerrainPaint,
    TerrainRenderer, TileTransform,
};
pub use tile::{TerrainBucket, TerrainTile, TerrainTileCache, TileCache};
pub use uniforms::{PrepareUniforms, ShadeUniforms, prepare_matrix, shading_azimuth};
pub use wgpu_backend::{DEPTH_FORMAT, FrameTarget, TARGET_FORMAT, WgpuBackend, create_headless_device};
