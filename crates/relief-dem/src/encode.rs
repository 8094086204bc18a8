//! Producer side of the packed level format.
//!
//! Builds the buffer a terrain bucket hands to the renderer from a grid of
//! elevations in metres. Coarser levels average 2x2 blocks of elevation (not
//! of encoded bytes) before encoding.

use crate::codec::encode_elevation;
use crate::error::DemError;
use crate::levels::{BYTES_PER_PIXEL, level_byte_len, packed_len, stored_sizes};

/// Encode a `2 * base_size` square elevation grid (row-major, metres) into a
/// packed level buffer that [`decode_levels_with_base`](crate::decode_levels_with_base)
/// accepts for the same `base_size`.
pub fn pack_elevation(heights: &[f32], base_size: u32) -> Result<Vec<u8>, DemError> {
    let total = packed_len(base_size)?;
    let side = base_size as usize * 2;
    if heights.len() != side * side {
        return Err(DemError::GridSizeMismatch {
            actual: heights.len(),
            expected: side * side,
            side,
        });
    }

    let mut packed = Vec::with_capacity(total);
    let mut grid = heights.to_vec();
    let mut grid_side = side;

    for level_size in stored_sizes(base_size) {
        debug_assert_eq!(grid.len() * BYTES_PER_PIXEL, level_byte_len(level_size));
        packed.extend(grid.iter().flat_map(|&h| encode_elevation(h)));

        if level_size > 2 {
            grid = downsample(&grid, grid_side);
            grid_side /= 2;
        }
    }

    debug_assert_eq!(packed.len(), total);
    Ok(packed)
}

/// Halve a square grid by averaging each 2x2 block.
pub fn downsample(grid: &[f32], side: usize) -> Vec<f32> {
    let half = side / 2;
    let mut out = Vec::with_capacity(half * half);
    for y in 0..half {
        for x in 0..half {
            let i = 2 * y * side + 2 * x;
            let sum = grid[i] + grid[i + 1] + grid[i + side] + grid[i + side + 1];
            out.push(sum * 0.25);
        }
    }
    out
}
