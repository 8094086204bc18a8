//! Per-frame terrain drawing: walks the visible tiles, prepares each one
//! into a pooled offscreen target at most once, then shades it into the main
//! framebuffer.

use glam::Mat4;
use relief_dem::{DemError, TileCoord, decode_levels};

use crate::backend::{RenderState, TerrainBackend};
use crate::prepare::prepare_terrain;
use crate::shade::render_terrain_tile;
use crate::target_pool::RenderTargetPool;
use crate::tile::{TerrainTile, TileCache};

/// Width of the offscreen target a tile is prepared into.
pub const TERRAIN_TILE_WIDTH: u32 = 256;
/// Height of the offscreen target a tile is prepared into.
pub const TERRAIN_TILE_HEIGHT: u32 = 256;

/// Which phase of the frame is being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPass {
    /// Opaque geometry only. Terrain draws nothing here.
    Opaque,
    Translucent,
}

/// Resolved style properties of a terrain layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainPaint {
    /// Degrees clockwise from north.
    pub illumination_direction: f32,
    pub exaggeration: f32,
    pub shadow_color: [f32; 4],
    pub highlight_color: [f32; 4],
    pub accent_color: [f32; 4],
}

impl Default for TerrainPaint {
    fn default() -> Self {
        Self {
            illumination_direction: 335.0,
            exaggeration: 0.5,
            shadow_color: [0.0, 0.0, 0.0, 1.0],
            highlight_color: [1.0, 1.0, 1.0, 1.0],
            accent_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// A terrain style layer: the bucket key plus its paint.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainLayer {
    pub id: String,
    pub paint: TerrainPaint,
}

impl TerrainLayer {
    pub fn new(id: impl Into<String>, paint: TerrainPaint) -> Self {
        Self {
            id: id.into(),
            paint,
        }
    }
}

/// Counts of what one [`TerrainRenderer::draw_terrain`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Tiles shaded into the main framebuffer.
    pub drawn: usize,
    /// Tiles that ran the preparation pass this frame.
    pub prepared: usize,
    /// Elevation textures uploaded this frame.
    pub uploaded: usize,
    /// Coordinates with no tile, no bucket for the layer, or undecodable data.
    pub skipped: usize,
}

/// Supplies the tile-to-clip-space matrix for the shading pass.
pub trait TileTransform {
    fn pos_matrix(&self, coord: &TileCoord) -> Mat4;
}

impl<F> TileTransform for F
where
    F: Fn(&TileCoord) -> Mat4,
{
    fn pos_matrix(&self, coord: &TileCoord) -> Mat4 {
        self(coord)
    }
}

/// Owns the GPU backend and the render-target pool for the terrain passes.
pub struct TerrainRenderer<B: TerrainBackend> {
    backend: B,
    pool: RenderTargetPool,
    clear_color: [f32; 4],
}

impl<B: TerrainBackend> TerrainRenderer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            pool: RenderTargetPool::new(),
            clear_color: [0.0; 4],
        }
    }

    /// Color the main framebuffer is cleared to at the start of each frame.
    /// Defaults to transparent black.
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn pool(&self) -> &RenderTargetPool {
        &self.pool
    }

    /// Delete every pooled target not currently in use.
    pub fn purge_targets(&mut self) -> usize {
        self.pool.purge(&mut self.backend)
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Draw `layer` for every coordinate in `coords`, in order.
    ///
    /// Leaves the terrain render state applied and the main framebuffer bound.
    pub fn draw_terrain<C, T>(
        &mut self,
        tiles: &mut C,
        layer: &TerrainLayer,
        coords: &[TileCoord],
        transform: &T,
        pass: RenderPass,
    ) -> FrameStats
    where
        C: TileCache + ?Sized,
        T: TileTransform + ?Sized,
    {
        let mut stats = FrameStats::default();
        if pass == RenderPass::Opaque {
            return stats;
        }

        self.backend.apply_render_state(RenderState::TERRAIN);
        self.backend.clear(self.clear_color, 1.0);

        for coord in coords {
            let Some(tile) = tiles.tile_mut(coord) else {
                log::warn!("No tile loaded for {coord}, skipping terrain");
                stats.skipped += 1;
                continue;
            };

            let target =
                self.pool
                    .acquire(&mut self.backend, TERRAIN_TILE_WIDTH, TERRAIN_TILE_HEIGHT);

            if tile.bucket(&layer.id).is_none() {
                self.pool.release(&mut self.backend, target);
                stats.skipped += 1;
                continue;
            }

            if tile.dem.is_none() {
                if let Err(err) = upload_elevation(&mut self.backend, tile, &layer.id) {
                    log::error!("Failed to decode terrain for {coord}: {err}");
                    self.pool.release(&mut self.backend, target);
                    stats.skipped += 1;
                    continue;
                }
                stats.uploaded += 1;
            }
            tile.uploaded = true;

            if !tile.prepared {
                prepare_terrain(&mut self.backend, tile, &target);
                stats.prepared += 1;
            }

            // Shading samples the texture the pool saved on release.
            self.pool.release(&mut self.backend, target);
            let Some(image) = self.pool.viewport_texture() else {
                stats.skipped += 1;
                continue;
            };

            let pos_matrix = transform.pos_matrix(coord);
            render_terrain_tile(&mut self.backend, coord, image, &layer.paint, pos_matrix);
            stats.drawn += 1;
        }

        log::trace!(
            "Terrain frame: {} drawn, {} prepared, {} uploaded, {} skipped",
            stats.drawn,
            stats.prepared,
            stats.uploaded,
            stats.skipped
        );
        stats
    }
}

/// Decode (once) and upload the tile's elevation levels as its DEM texture.
fn upload_elevation<B: TerrainBackend + ?Sized>(
    backend: &mut B,
    tile: &mut TerrainTile,
    layer_id: &str,
) -> Result<(), DemError> {
    if tile.levels.is_none() {
        let levels = match tile.bucket(layer_id) {
            Some(bucket) => decode_levels(bucket.terrain_array())?,
            None => return Ok(()),
        };
        tile.levels = Some(levels);
    }

    if let Some(levels) = tile.levels.as_deref() {
        tile.dem = Some(backend.upload_elevation(levels));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Program;
    use crate::recording::{Command, RecordingBackend};
    use crate::tile::{TerrainBucket, TerrainTileCache};
    use relief_dem::{TERRAIN_TILE_SIZE, pack_elevation};

    const LAYER: &str = "hillshade";

    fn flat_bucket() -> TerrainBucket {
        let side = (TERRAIN_TILE_SIZE * 2) as usize;
        let packed = pack_elevation(&vec![120.0; side * side], TERRAIN_TILE_SIZE)
            .expect("valid grid");
        TerrainBucket::new(packed)
    }

    fn layer() -> TerrainLayer {
        TerrainLayer::new(LAYER, TerrainPaint::default())
    }

    fn cache_with(coords: &[TileCoord]) -> TerrainTileCache {
        let bucket = flat_bucket();
        let mut cache = TerrainTileCache::new();
        for &coord in coords {
            cache.insert(TerrainTile::new(coord).with_bucket(LAYER, bucket.clone()));
        }
        cache
    }

    fn identity(_: &TileCoord) -> Mat4 {
        Mat4::IDENTITY
    }

    fn draw(
        renderer: &mut TerrainRenderer<RecordingBackend>,
        cache: &mut TerrainTileCache,
        coords: &[TileCoord],
    ) -> FrameStats {
        renderer.draw_terrain(cache, &layer(), coords, &identity, RenderPass::Translucent)
    }

    #[test]
    fn test_opaque_pass_issues_no_commands() {
        let coord = TileCoord::new(12, 1, 1);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats =
            renderer.draw_terrain(&mut cache, &layer(), &[coord], &identity, RenderPass::Opaque);

        assert_eq!(stats, FrameStats::default());
        assert!(renderer.backend().commands().is_empty());
        assert!(!cache.get(&coord).is_some_and(TerrainTile::is_uploaded));
    }

    #[test]
    fn test_frame_sets_state_and_clears_once() {
        let coords = [TileCoord::new(12, 0, 0), TileCoord::new(12, 1, 0)];
        let mut cache = cache_with(&coords);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        draw(&mut renderer, &mut cache, &coords);

        let backend = renderer.backend();
        assert_eq!(
            &backend.commands()[..2],
            &[
                Command::ApplyRenderState(RenderState::TERRAIN),
                Command::Clear {
                    color: [0.0; 4],
                    depth: 1.0
                },
            ]
        );
        assert_eq!(backend.count(|c| matches!(c, Command::Clear { .. })), 1);
        assert_eq!(backend.count(|c| matches!(c, Command::ApplyRenderState(_))), 1);
    }

    #[test]
    fn test_tile_is_uploaded_prepared_then_shaded() {
        let coord = TileCoord::new(12, 2, 3);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats = draw(&mut renderer, &mut cache, &[coord]);
        assert_eq!(
            stats,
            FrameStats {
                drawn: 1,
                prepared: 1,
                uploaded: 1,
                skipped: 0
            }
        );

        let tile = cache.get(&coord).expect("tile");
        assert!(tile.is_uploaded());
        assert!(tile.is_prepared());
        assert_eq!(tile.levels().map(<[_]>::len), Some(10));
        let dem = tile.dem().expect("dem uploaded");

        let backend = renderer.backend();
        let commands = backend.commands();
        let upload = commands
            .iter()
            .position(|c| matches!(c, Command::UploadElevation { texture, .. } if *texture == dem))
            .expect("upload");
        let prepare = commands
            .iter()
            .position(|c| matches!(c, Command::Draw { program: Program::TerrainPrepare, .. }))
            .expect("prepare draw");
        let release = commands
            .iter()
            .position(|c| *c == Command::BindDefaultFramebuffer)
            .expect("release");
        let shade = commands
            .iter()
            .position(|c| matches!(c, Command::Draw { program: Program::Terrain, .. }))
            .expect("shade draw");
        assert!(upload < prepare && prepare < release && release < shade);

        // The shade pass reads the target the tile was just prepared into,
        // with the main framebuffer bound.
        let target_texture = renderer.pool().viewport_texture().expect("released target");
        assert_eq!(
            commands[shade],
            Command::Draw {
                program: Program::Terrain,
                texture: target_texture,
                target: None,
                zoom: 12.0,
            }
        );
        assert!(matches!(
            &commands[upload],
            Command::UploadElevation { sizes, .. } if sizes[0] == (512, 512) && sizes[9] == (1, 1)
        ));
    }

    #[test]
    fn test_prepared_tile_is_not_prepared_again() {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        draw(&mut renderer, &mut cache, &[coord]);
        renderer.backend_mut().clear_log();
        let stats = draw(&mut renderer, &mut cache, &[coord]);

        assert_eq!(stats.prepared, 0);
        assert_eq!(stats.uploaded, 0);
        assert_eq!(stats.drawn, 1);
        let backend = renderer.backend();
        assert_eq!(backend.draws(Program::TerrainPrepare), 0);
        assert_eq!(backend.draws(Program::Terrain), 1);
        assert_eq!(backend.count(|c| matches!(c, Command::UploadElevation { .. })), 0);
    }

    #[test]
    fn test_tile_without_bucket_only_cycles_target() {
        let coord = TileCoord::new(12, 5, 5);
        let mut cache = TerrainTileCache::new();
        cache.insert(TerrainTile::new(coord));
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats = draw(&mut renderer, &mut cache, &[coord]);

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.drawn, 0);
        let backend = renderer.backend();
        assert_eq!(backend.draws(Program::TerrainPrepare), 0);
        assert_eq!(backend.draws(Program::Terrain), 0);
        assert_eq!(backend.count(|c| matches!(c, Command::BindFramebuffer(_))), 1);
        assert_eq!(backend.count(|c| *c == Command::BindDefaultFramebuffer), 1);
        assert_eq!(renderer.pool().in_use_count(), 0);
        assert_eq!(renderer.pool().free_count(), 1);
    }

    #[test]
    fn test_sequential_tiles_share_one_target() {
        let coords = [
            TileCoord::new(12, 0, 0),
            TileCoord::new(12, 1, 0),
            TileCoord::new(12, 0, 1),
        ];
        let mut cache = cache_with(&coords);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats = draw(&mut renderer, &mut cache, &coords);

        assert_eq!(stats.prepared, 3);
        assert_eq!(renderer.pool().allocated_count(), 1);
        let backend = renderer.backend();
        assert_eq!(backend.count(|c| matches!(c, Command::CreateFramebuffer(_))), 1);
        assert_eq!(
            backend.count(|c| matches!(
                c,
                Command::CreateTexture {
                    width: TERRAIN_TILE_WIDTH,
                    height: TERRAIN_TILE_HEIGHT,
                    ..
                }
            )),
            1
        );
    }

    #[test]
    fn test_invalidate_forces_reupload_and_prepare() {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        draw(&mut renderer, &mut cache, &[coord]);
        let old_dem = cache.get(&coord).and_then(TerrainTile::dem).expect("dem");

        if let Some(tile) = cache.tile_mut(&coord) {
            tile.invalidate(renderer.backend_mut());
        }
        let stats = draw(&mut renderer, &mut cache, &[coord]);

        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.prepared, 1);
        assert!(renderer.backend().commands().contains(&Command::DeleteTexture(old_dem)));
        assert_ne!(cache.get(&coord).and_then(TerrainTile::dem), Some(old_dem));
    }

    #[test]
    fn test_undecodable_bucket_is_skipped_and_target_released() {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = TerrainTileCache::new();
        let truncated = TerrainBucket::new(vec![0u8; 100]);
        cache.insert(TerrainTile::new(coord).with_bucket(LAYER, truncated));
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats = draw(&mut renderer, &mut cache, &[coord]);

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.drawn, 0);
        assert_eq!(renderer.pool().in_use_count(), 0);
        let tile = cache.get(&coord).expect("tile");
        assert!(tile.dem().is_none());
        assert!(!tile.is_uploaded());
        assert!(!tile.is_prepared());
        assert_eq!(renderer.backend().draws(Program::Terrain), 0);
    }

    #[test]
    fn test_failed_decode_is_retried_next_frame() {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = TerrainTileCache::new();
        let truncated = TerrainBucket::new(vec![0u8; 100]);
        cache.insert(TerrainTile::new(coord).with_bucket(LAYER, truncated));
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        for _ in 0..2 {
            let stats = draw(&mut renderer, &mut cache, &[coord]);
            assert_eq!(
                stats,
                FrameStats {
                    skipped: 1,
                    ..FrameStats::default()
                }
            );
            assert!(cache.get(&coord).expect("tile").levels().is_none());
        }
        assert_eq!(renderer.pool().allocated_count(), 1);
        assert_eq!(renderer.pool().in_use_count(), 0);

        // Nothing was cached, so a repaired bucket decodes on the next frame.
        cache
            .tile_mut(&coord)
            .expect("tile")
            .set_bucket(LAYER, flat_bucket());
        let stats = draw(&mut renderer, &mut cache, &[coord]);
        assert_eq!(stats.uploaded, 1);
        assert_eq!(stats.drawn, 1);
        assert!(cache.get(&coord).expect("tile").levels().is_some());
    }

    #[test]
    fn test_missing_tile_skipped_before_acquire() {
        let mut cache = TerrainTileCache::new();
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());

        let stats = draw(&mut renderer, &mut cache, &[TileCoord::new(3, 0, 0)]);

        assert_eq!(stats.skipped, 1);
        assert_eq!(renderer.pool().allocated_count(), 0);
        assert_eq!(renderer.backend().commands().len(), 2);
    }

    #[test]
    fn test_transform_and_paint_reach_shading() {
        let coord = TileCoord::new(12, 4, 2);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());
        let paint = TerrainPaint {
            illumination_direction: 0.0,
            ..TerrainPaint::default()
        };
        let layer = TerrainLayer::new(LAYER, paint);
        let transform =
            |c: &TileCoord| Mat4::from_translation(glam::Vec3::new(c.x as f32, c.y as f32, 0.0));

        renderer.draw_terrain(&mut cache, &layer, &[coord], &transform, RenderPass::Translucent);

        let u = renderer.backend().shade_uniforms[0];
        assert_eq!(u.matrix, transform(&coord).to_cols_array_2d());
        assert!((u.azimuth + std::f32::consts::FRAC_PI_2).abs() < 1e-6);
        assert_eq!(u.zoom, 12.0);
    }

    #[test]
    fn test_purge_targets_frees_pool() {
        let coord = TileCoord::new(12, 0, 0);
        let mut cache = cache_with(&[coord]);
        let mut renderer = TerrainRenderer::new(RecordingBackend::new());
        draw(&mut renderer, &mut cache, &[coord]);

        assert_eq!(renderer.purge_targets(), 1);
        assert_eq!(renderer.pool().allocated_count(), 0);
        assert!(
            renderer
                .backend()
                .commands()
                .iter()
                .any(|c| matches!(c, Command::DeleteFramebuffer(_)))
        );
    }
}
