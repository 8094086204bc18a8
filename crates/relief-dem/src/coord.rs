//! Quantized tile coordinates.

use std::fmt;

/// A map tile address: zoom level plus column/row within that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub const fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one side of the grid at zoom `z`.
    ///
    /// Returns `None` above zoom 31 where the count no longer fits in a `u32`.
    pub fn tiles_per_side(z: u8) -> Option<u32> {
        1u32.checked_shl(u32::from(z))
    }

    /// Whether `x` and `y` fall inside the grid for this zoom level.
    pub fn is_valid(&self) -> bool {
        Self::tiles_per_side(self.z).is_some_and(|n| self.x < n && self.y < n)
    }

    /// Zoom level as the float the shaders consume.
    pub fn zoom(&self) -> f32 {
        f32::from(self.z)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}
