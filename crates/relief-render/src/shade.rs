//! Second pass: hillshade one prepared tile into the main framebuffer.

use glam::Mat4;
use relief_dem::TileCoord;

use crate::backend::{TerrainBackend, TextureId};
use crate::terrain::TerrainPaint;
use crate::uniforms::ShadeUniforms;

/// Draw the shaded quad for `coord`, sampling the prepared `image`.
pub fn render_terrain_tile<B: TerrainBackend + ?Sized>(
    backend: &mut B,
    coord: &TileCoord,
    image: TextureId,
    paint: &TerrainPaint,
    pos_matrix: Mat4,
) {
    let uniforms = ShadeUniforms::new(pos_matrix, coord.zoom(), paint);
    backend.draw_shade(image, &uniforms);
}
