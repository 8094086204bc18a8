//! Synthetic elevation for demo tiles.
//!
//! Multi-octave simplex noise sampled in Web Mercator metres, so neighbouring
//! tiles line up at their shared edges.

use noise::{NoiseFn, Simplex};
use relief_dem::{DemError, TERRAIN_TILE_SIZE, TileCoord, pack_elevation};

/// Equatorial circumference in metres; the width of the zoom 0 tile.
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Ground width of one tile at `zoom`, in metres.
pub fn tile_extent_m(zoom: u8) -> f64 {
    EARTH_CIRCUMFERENCE_M / f64::from(zoom).exp2()
}

/// fBm parameters.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    pub seed: u32,
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Cycles per metre of the first octave.
    pub base_frequency: f64,
    /// Metres contributed by the first octave at most.
    pub amplitude: f64,
    /// Height the noise is centred on, in metres.
    pub base_height: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 7,
            octaves: 6,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.0 / 6000.0,
            amplitude: 900.0,
            base_height: 1200.0,
        }
    }
}

pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    pub fn new(params: HeightmapParams) -> Self {
        Self {
            noise: Simplex::new(params.seed),
            params,
        }
    }

    /// Height in metres at a position in metres.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            total += self.noise.get([x * frequency, y * frequency]) * amplitude;
            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        self.params.base_height + total
    }

    /// Largest deviation from `base_height` the sampler can produce.
    pub fn max_amplitude(&self) -> f64 {
        (0..self.params.octaves)
            .map(|i| self.params.amplitude * self.params.persistence.powi(i as i32))
            .sum()
    }

    /// Row-major `2 * base_size` square grid of heights covering `coord`,
    /// sampled at texel centres.
    pub fn tile_heights(&self, coord: &TileCoord, base_size: u32) -> Vec<f32> {
        let side = base_size as usize * 2;
        let extent = tile_extent_m(coord.z);
        let step = 1.0 / side as f64;

        let mut heights = Vec::with_capacity(side * side);
        for row in 0..side {
            let wy = (f64::from(coord.y) + (row as f64 + 0.5) * step) * extent;
            for col in 0..side {
                let wx = (f64::from(coord.x) + (col as f64 + 0.5) * step) * extent;
                heights.push(self.sample(wx, wy) as f32);
            }
        }
        heights
    }
}

/// Packed elevation levels for `coord`, ready to go in a terrain bucket.
pub fn synthesize_tile(sampler: &HeightmapSampler, coord: &TileCoord) -> Result<Vec<u8>, DemError> {
    let heights = sampler.tile_heights(coord, TERRAIN_TILE_SIZE);
    pack_elevation(&heights, TERRAIN_TILE_SIZE)
}
