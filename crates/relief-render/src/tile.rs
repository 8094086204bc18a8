//! Tiles as the terrain renderer sees them, and the cache it reads them from.

use std::collections::HashMap;
use std::sync::Arc;

use relief_dem::{ElevationLevel, TileCoord};

use crate::backend::{TerrainBackend, TextureId};

/// Per-layer terrain payload: the packed elevation buffer for one tile.
///
/// Cheap to clone; the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainBucket {
    terrain_array: Arc<[u8]>,
}

impl TerrainBucket {
    pub fn new(terrain_array: impl Into<Arc<[u8]>>) -> Self {
        Self {
            terrain_array: terrain_array.into(),
        }
    }

    /// Packed elevation levels, see [`relief_dem::decode_levels`].
    pub fn terrain_array(&self) -> &[u8] {
        &self.terrain_array
    }
}

/// A loaded map tile plus the elevation state the terrain passes attach to it.
#[derive(Debug)]
pub struct TerrainTile {
    coord: TileCoord,
    buckets: HashMap<String, TerrainBucket>,
    pub(crate) dem: Option<TextureId>,
    pub(crate) levels: Option<Vec<ElevationLevel>>,
    pub(crate) prepared: bool,
    pub(crate) uploaded: bool,
}

impl TerrainTile {
    pub fn new(coord: TileCoord) -> Self {
        Self {
            coord,
            buckets: HashMap::new(),
            dem: None,
            levels: None,
            prepared: false,
            uploaded: false,
        }
    }

    /// Builder form of [`set_bucket`](Self::set_bucket).
    pub fn with_bucket(mut self, layer_id: impl Into<String>, bucket: TerrainBucket) -> Self {
        self.set_bucket(layer_id, bucket);
        self
    }

    pub fn set_bucket(&mut self, layer_id: impl Into<String>, bucket: TerrainBucket) {
        self.buckets.insert(layer_id.into(), bucket);
    }

    pub fn bucket(&self, layer_id: &str) -> Option<&TerrainBucket> {
        self.buckets.get(layer_id)
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Elevation texture, once uploaded.
    pub fn dem(&self) -> Option<TextureId> {
        self.dem
    }

    /// Decoded mip levels, cached after the first upload.
    pub fn levels(&self) -> Option<&[ElevationLevel]> {
        self.levels.as_deref()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_uploaded(&self) -> bool {
        self.uploaded
    }

    /// Drop all GPU and decoded elevation state so the next draw starts over.
    ///
    /// Call this when the tile's data changes or before evicting it.
    pub fn invalidate<B: TerrainBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(dem) = self.dem.take() {
            backend.delete_texture(dem);
        }
        self.levels = None;
        self.prepared = false;
        self.uploaded = false;
    }
}

/// Lookup the renderer performs for each coordinate it is asked to draw.
pub trait TileCache {
    fn tile_mut(&mut self, coord: &TileCoord) -> Option<&mut TerrainTile>;
}

/// Plain in-memory tile cache.
#[derive(Debug, Default)]
pub struct TerrainTileCache {
    tiles: HashMap<TileCoord, TerrainTile>,
}

impl TerrainTileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tile, replacing any tile at the same coordinate.
    ///
    /// A replaced tile keeps its elevation texture alive on the backend; use
    /// [`evict`](Self::evict) first to release it.
    pub fn insert(&mut self, tile: TerrainTile) -> Option<TerrainTile> {
        self.tiles.insert(tile.coord(), tile)
    }

    pub fn get(&self, coord: &TileCoord) -> Option<&TerrainTile> {
        self.tiles.get(coord)
    }

    /// Remove a tile and delete its elevation texture.
    pub fn evict<B: TerrainBackend + ?Sized>(
        &mut self,
        coord: &TileCoord,
        backend: &mut B,
    ) -> Option<TerrainTile> {
        let mut tile = self.tiles.remove(coord)?;
        tile.invalidate(backend);
        log::debug!("Evicted terrain tile {coord}");
        Some(tile)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

impl TileCache for TerrainTileCache {
    fn tile_mut(&mut self, coord: &TileCoord) -> Option<&mut TerrainTile> {
        self.tiles.get_mut(coord)
    }
}
