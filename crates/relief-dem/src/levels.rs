//! Slicing a packed elevation buffer into mipmap level images.
//!
//! The bucket producer stores every mip level of a tile back to back in one
//! buffer. A level of nominal size `L` carries a duplicated border and is stored
//! as a `2L x 2L` RGBA image, so it occupies `L * L * 16` bytes. Levels run from
//! the base size down to 2; the 2x2 and 1x1 tail of the mip chain is never
//! stored and is filled with zeros on decode.

use crate::error::DemError;

/// Nominal resolution of a terrain tile's base level.
pub const TERRAIN_TILE_SIZE: u32 = 256;

/// RGBA8.
pub const BYTES_PER_PIXEL: usize = 4;

/// Side lengths of the zero-filled levels appended after the stored ones.
pub const PADDING_LEVELS: [u32; 2] = [2, 1];

/// Area growth from the border duplication (the stored side is doubled).
const BORDER_EXPANSION: usize = 4;

/// One immutable mip level image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElevationLevel {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ElevationLevel {
    fn from_slice(width: u32, height: u32, data: &[u8]) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * BYTES_PER_PIXEL);
        Self {
            width,
            height,
            data: data.to_vec(),
        }
    }

    fn zeroed(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            data: vec![0; size as usize * size as usize * BYTES_PER_PIXEL],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA8 rows, tightly packed.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let p = &self.data[i..i + BYTES_PER_PIXEL];
        Some([p[0], p[1], p[2], p[3]])
    }
}

/// Bytes occupied in the packed buffer by the level of nominal size `level_size`.
pub fn level_byte_len(level_size: u32) -> usize {
    let side = level_size as usize;
    side * side * BYTES_PER_PIXEL * BORDER_EXPANSION
}

/// Total packed buffer length the encoder produces for `base_size`.
pub fn packed_len(base_size: u32) -> Result<usize, DemError> {
    validate_base(base_size)?;
    Ok(stored_sizes(base_size).map(level_byte_len).sum())
}

/// Decode a packed buffer produced for the standard 256 base resolution.
pub fn decode_levels(packed: &[u8]) -> Result<Vec<ElevationLevel>, DemError> {
    decode_levels_with_base(packed, TERRAIN_TILE_SIZE)
}

/// Decode a packed buffer into its mip levels, highest resolution first.
///
/// The buffer must be consumed exactly: a short buffer or leftover bytes both
/// mean it was produced for another base size and are rejected.
pub fn decode_levels_with_base(
    packed: &[u8],
    base_size: u32,
) -> Result<Vec<ElevationLevel>, DemError> {
    validate_base(base_size)?;

    let mut levels =
        Vec::with_capacity(base_size.trailing_zeros() as usize + PADDING_LEVELS.len());
    let mut offset = 0usize;

    for (index, level_size) in stored_sizes(base_size).enumerate() {
        let len = level_byte_len(level_size);
        let bytes = packed
            .get(offset..offset + len)
            .ok_or(DemError::Truncated {
                level: index,
                needed: len,
                available: packed.len().saturating_sub(offset),
            })?;
        levels.push(ElevationLevel::from_slice(level_size * 2, level_size * 2, bytes));
        offset += len;
    }

    if offset != packed.len() {
        return Err(DemError::TrailingBytes {
            consumed: offset,
            len: packed.len(),
        });
    }

    levels.extend(PADDING_LEVELS.iter().map(|&size| ElevationLevel::zeroed(size)));

    log::trace!(
        "Decoded {} elevation levels ({} bytes, base {})",
        levels.len(),
        packed.len(),
        base_size
    );
    Ok(levels)
}

fn validate_base(base_size: u32) -> Result<(), DemError> {
    if base_size < 2 || !base_size.is_power_of_two() {
        return Err(DemError::InvalidBaseSize(base_size));
    }
    Ok(())
}

/// Nominal sizes of the stored levels: `base, base/2, ..., 2`.
pub(crate) fn stored_sizes(base_size: u32) -> impl Iterator<Item = u32> {
    std::iter::successors(Some(base_size), |&size| Some(size / 2)).take_while(|&size| size >= 2)
}
