//! Uniform blocks for the terrain programs and the math that fills them.
//!
//! Layouts mirror the WGSL structs in [`crate::shaders`] byte for byte.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::terrain::TerrainPaint;

pub const DEG2RAD: f32 = std::f32::consts::PI / 180.0;

/// Zenith angle of the light source, in degrees. Not a style property.
pub const ZENITH_DEG: f32 = 60.0;

/// Source dimension the prepare shader steps its texel offsets by.
pub const PREPARE_DIMENSION: [f32; 2] = [512.0, 512.0];

/// Dimension the shading pass reports for the prepared image.
pub const SHADE_DIMENSION: [f32; 2] = [256.0, 256.0];

/// `terrainPrepare` uniforms. 80 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PrepareUniforms {
    pub matrix: [[f32; 4]; 4],
    pub dimension: [f32; 2],
    pub zoom: f32,
    pub _pad: f32,
}

impl PrepareUniforms {
    pub fn new(matrix: Mat4, zoom: f32) -> Self {
        Self {
            matrix: matrix.to_cols_array_2d(),
            dimension: PREPARE_DIMENSION,
            zoom,
            _pad: 0.0,
        }
    }
}

/// `terrain` uniforms. 144 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ShadeUniforms {
    pub matrix: [[f32; 4]; 4],
    pub shadow: [f32; 4],
    pub highlight: [f32; 4],
    pub accent: [f32; 4],
    pub dimension: [f32; 2],
    pub zoom: f32,
    pub azimuth: f32,
    pub zenith: f32,
    pub exaggeration: f32,
    pub mipmap: f32,
    pub _pad: f32,
}

impl ShadeUniforms {
    pub fn new(pos_matrix: Mat4, zoom: f32, paint: &TerrainPaint) -> Self {
        Self {
            matrix: pos_matrix.to_cols_array_2d(),
            shadow: paint.shadow_color,
            highlight: paint.highlight_color,
            accent: paint.accent_color,
            dimension: SHADE_DIMENSION,
            zoom,
            azimuth: shading_azimuth(paint.illumination_direction),
            zenith: ZENITH_DEG * DEG2RAD,
            exaggeration: paint.exaggeration,
            mipmap: 0.0,
            _pad: 0.0,
        }
    }
}

/// Convert a style illumination direction (degrees, clockwise from north)
/// into the radians the shading program expects.
pub fn shading_azimuth(illumination_direction_deg: f32) -> f32 {
    (-illumination_direction_deg - 90.0) * DEG2RAD
}

/// Orthographic projection placing the tile's unit square over a
/// `width x height` target, flipped vertically because texture rows run
/// opposite to clip-space Y.
pub fn prepare_matrix(width: f32, height: f32) -> Mat4 {
    Mat4::orthographic_rh(0.0, width, -height, 0.0, 0.0, 1.0)
        * Mat4::from_translation(Vec3::new(0.0, -height, 0.0))
        * Mat4::from_scale(Vec3::new(width, height, 1.0))
}
