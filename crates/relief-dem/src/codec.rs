//! Terrain-RGB elevation encoding.
//!
//! Each pixel stores a 24-bit unsigned integer across R, G and B. Elevation in
//! metres is `ELEVATION_OFFSET_M + value * ELEVATION_STEP_M`, which covers
//! roughly -10 km to +1667 km at 10 cm resolution. Alpha is always opaque.

/// Elevation represented by an all-zero RGB triple.
pub const ELEVATION_OFFSET_M: f32 = -10_000.0;

/// Elevation delta between two consecutive encoded values.
pub const ELEVATION_STEP_M: f32 = 0.1;

const MAX_ENCODED: u32 = 0x00FF_FFFF;

/// Encode an elevation in metres into an RGBA pixel.
///
/// Values outside the representable range are clamped.
pub fn encode_elevation(meters: f32) -> [u8; 4] {
    let steps = ((meters - ELEVATION_OFFSET_M) / ELEVATION_STEP_M).round();
    let value = if steps.is_nan() {
        0
    } else {
        steps.clamp(0.0, MAX_ENCODED as f32) as u32
    };
    [(value >> 16) as u8, (value >> 8) as u8, value as u8, 255]
}

/// Decode an RGBA pixel back into metres. Alpha is ignored.
pub fn decode_elevation(pixel: [u8; 4]) -> f32 {
    let value =
        (u32::from(pixel[0]) << 16) | (u32::from(pixel[1]) << 8) | u32::from(pixel[2]);
    ELEVATION_OFFSET_M + value as f32 * ELEVATION_STEP_M
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level_encoding() {
        // 10_000 m / 0.1 = 100_000 = 0x0186A0
        assert_eq!(encode_elevation(0.0), [0x01, 0x86, 0xA0, 255]);
    }

    #[test]
    fn test_decode_matches_known_pixel() {
        assert!((decode_elevation([0x01, 0x86, 0xA0, 255])).abs() < 1e-3);
        assert_eq!(decode_elevation([0, 0, 0, 0]), ELEVATION_OFFSET_M);
    }

    #[test]
    fn test_round_trip_within_step() {
        for meters in [-431.3_f32, 0.0, 12.34, 2_962.0, 8_848.86] {
            let decoded = decode_elevation(encode_elevation(meters));
            assert!(
                (decoded - meters).abs() <= ELEVATION_STEP_M,
                "{meters} decoded as {decoded}"
            );
        }
    }

    #[test]
    fn test_out_of_range_clamps() {
        assert_eq!(encode_elevation(-20_000.0), [0, 0, 0, 255]);
        assert_eq!(encode_elevation(f32::MAX), [255, 255, 255, 255]);
        assert_eq!(encode_elevation(f32::NAN), [0, 0, 0, 255]);
    }
}
