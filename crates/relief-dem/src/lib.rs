//! Elevation data for terrain tiles: tile coordinates, the terrain-RGB codec,
//! and the packed mip-level buffer shared between the bucket producer and the
//! terrain renderer.

mod codec;
mod coord;
mod encode;
mod error;
mod levels;

pub use codec::{ELEVATION_OFFSET_M, ELEVATION_STEP_M, decode_elevation, encode_elevation};
pub use coord::TileCoord;
pub use encode::{downsample, pack_elevation};
pub use error::DemError;
pub use levels::{
    BYTES_PER_PIXEL, ElevationLevel, PADDING_LEVELS, TERRAIN_TILE_SIZE, decode_levels,
    decode_levels_with_base, level_byte_len, packed_len,
};
