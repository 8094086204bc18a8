//! The GPU command vocabulary the terrain passes are written against.
//!
//! Handles are plain integer names in the style of GL objects; the backend owns
//! the resources behind them. [`WgpuBackend`](crate::WgpuBackend) implements
//! this on a real device.

use relief_dem::ElevationLevel;

use crate::uniforms::{PrepareUniforms, ShadeUniforms};

/// Name of a texture owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Name of a framebuffer object owned by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub u32);

/// Shader programs the terrain passes draw with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    TerrainPrepare,
    Terrain,
}

impl Program {
    /// Name the painter's program cache knows the program by.
    pub fn name(self) -> &'static str {
        match self {
            Program::TerrainPrepare => "terrainPrepare",
            Program::Terrain => "terrain",
        }
    }
}

/// Depth comparison applied when depth testing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Global fixed-function state shared by every draw until changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub stencil_test: bool,
    pub depth_test: bool,
    pub depth_func: DepthFunc,
    pub depth_write: bool,
}

impl RenderState {
    /// State the terrain draw runs under. `Less` keeps overlapping tile edges
    /// from being shaded twice.
    pub const TERRAIN: Self = Self {
        stencil_test: false,
        depth_test: true,
        depth_func: DepthFunc::Less,
        depth_write: true,
    };
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            stencil_test: false,
            depth_test: false,
            depth_func: DepthFunc::Less,
            depth_write: true,
        }
    }
}

/// Immediate-mode GPU commands issued from the render thread.
///
/// Every call is recorded in order; nothing blocks. Resource exhaustion is a
/// platform failure and is not reported through this trait.
pub trait TerrainBackend {
    /// Allocate an RGBA8 render-target texture (clamp-to-edge, nearest) with
    /// storage for a mip chain that is left empty until
    /// [`generate_mipmaps`](Self::generate_mipmaps).
    fn create_texture(&mut self, width: u32, height: u32) -> TextureId;

    fn create_framebuffer(&mut self) -> FramebufferId;

    fn bind_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Make `texture` the sole color attachment of `framebuffer`.
    fn attach_color(&mut self, framebuffer: FramebufferId, texture: TextureId);

    /// Rebind the main (visible) framebuffer.
    fn bind_default_framebuffer(&mut self);

    /// Create a texture whose mip level `i` holds `levels[i]`.
    fn upload_elevation(&mut self, levels: &[ElevationLevel]) -> TextureId;

    fn apply_render_state(&mut self, state: RenderState);

    /// Clear the bound framebuffer's color and depth.
    fn clear(&mut self, color: [f32; 4], depth: f32);

    /// Draw the shared tile quad with [`Program::TerrainPrepare`] into the
    /// bound framebuffer, sampling `elevation`.
    fn draw_prepare(&mut self, elevation: TextureId, uniforms: &PrepareUniforms);

    /// Fill mip levels 1.. of `texture` from level 0.
    fn generate_mipmaps(&mut self, texture: TextureId);

    /// Draw the shared tile quad with [`Program::Terrain`] into the bound
    /// framebuffer, sampling `image` on unit 0.
    fn draw_shade(&mut self, image: TextureId, uniforms: &ShadeUniforms);

    fn delete_texture(&mut self, texture: TextureId);

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);
}
