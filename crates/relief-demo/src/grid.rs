//! Layout of the rendered tile grid.

use glam::{Mat4, Vec3};
use relief_dem::TileCoord;
use relief_render::TileTransform;

/// A square block of `tiles_per_side` tiles centred in the zoom level's
/// tile range, row by row from the north-west corner.
pub fn tile_grid(zoom: u8, tiles_per_side: u32) -> Option<Vec<TileCoord>> {
    let world = TileCoord::tiles_per_side(zoom)?;
    if tiles_per_side == 0 || tiles_per_side > world {
        return None;
    }
    let origin = (world - tiles_per_side) / 2;

    let coords = (0..tiles_per_side)
        .flat_map(|row| {
            (0..tiles_per_side).map(move |col| TileCoord::new(zoom, origin + col, origin + row))
        })
        .collect();
    Some(coords)
}

/// Places each tile of a grid in its cell of the frame, north up.
#[derive(Debug, Clone, Copy)]
pub struct GridTransform {
    origin_x: u32,
    origin_y: u32,
    tiles_per_side: u32,
}

impl GridTransform {
    /// Transform for a grid whose north-west tile is `origin`.
    pub fn new(origin: TileCoord, tiles_per_side: u32) -> Self {
        Self {
            origin_x: origin.x,
            origin_y: origin.y,
            tiles_per_side: tiles_per_side.max(1),
        }
    }
}

impl TileTransform for GridTransform {
    fn pos_matrix(&self, coord: &TileCoord) -> Mat4 {
        let n = self.tiles_per_side as f32;
        let col = coord.x.saturating_sub(self.origin_x) as f32;
        let row = coord.y.saturating_sub(self.origin_y) as f32;
        let cell = 2.0 / n;

        Mat4::from_translation(Vec3::new(-1.0 + col * cell, 1.0 - row * cell, 0.0))
            * Mat4::from_scale(Vec3::new(cell, -cell, 1.0))
    }
}
