//! First pass: turn a tile's elevation texture into a mipmapped derivative
//! image in a pooled render target.

use crate::backend::TerrainBackend;
use crate::target_pool::RenderTarget;
use crate::tile::TerrainTile;
use crate::uniforms::{PrepareUniforms, prepare_matrix};

/// Draw `tile`'s elevation into `target`, build its mip chain and mark the
/// tile prepared.
///
/// `target` must be the currently bound framebuffer. Callers skip this for
/// tiles that are already prepared.
pub fn prepare_terrain<B: TerrainBackend + ?Sized>(
    backend: &mut B,
    tile: &mut TerrainTile,
    target: &RenderTarget,
) {
    let Some(dem) = tile.dem else {
        log::error!("Tile {} has no elevation texture to prepare", tile.coord());
        return;
    };

    let matrix = prepare_matrix(target.width() as f32, target.height() as f32);
    let uniforms = PrepareUniforms::new(matrix, tile.coord().zoom());

    backend.draw_prepare(dem, &uniforms);
    backend.generate_mipmaps(target.texture());
    tile.prepared = true;
}
