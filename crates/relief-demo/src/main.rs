//! Renders a block of synthetic terrain tiles through the two-pass hillshade
//! pipeline and writes the frame to a PNG.

mod grid;
mod heightmap;

use std::path::{Path, PathBuf};

use clap::Parser;
use relief_config::{CliArgs, Config, TerrainConfig};
use relief_dem::DemError;
use relief_render::{
    BackendError, FrameStats, FrameTarget, RenderPass, TerrainBucket, TerrainLayer, TerrainPaint,
    TerrainRenderer, TerrainTile, TerrainTileCache, WgpuBackend, create_headless_device,
};
use tracing::info;

use crate::grid::{GridTransform, tile_grid};
use crate::heightmap::{HeightmapParams, HeightmapSampler, synthesize_tile};

const LAYER_ID: &str = "hillshade";
const DEFAULT_OUTPUT: &str = "relief.png";

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to build elevation: {0}")]
    Dem(#[from] DemError),

    #[error("failed to write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("a {tiles}x{tiles} grid does not fit at zoom {zoom}")]
    GridTooLarge { tiles: u32, zoom: u8 },

    #[error("frame readback returned {actual} bytes for {width}x{height}")]
    FrameSize {
        actual: usize,
        width: u32,
        height: u32,
    },
}

fn paint_from(terrain: &TerrainConfig) -> TerrainPaint {
    TerrainPaint {
        illumination_direction: terrain.illumination_direction,
        exaggeration: terrain.exaggeration,
        shadow_color: terrain.shadow_color,
        highlight_color: terrain.highlight_color,
        accent_color: terrain.accent_color,
    }
}

fn log_frame(index: usize, stats: FrameStats) {
    info!(
        frame = index,
        drawn = stats.drawn,
        prepared = stats.prepared,
        uploaded = stats.uploaded,
        skipped = stats.skipped,
        "Drew terrain frame"
    );
}

fn run(config: &Config, output: &Path) -> Result<(), DemoError> {
    let render = &config.render;
    let coords = tile_grid(render.zoom, render.tiles_per_side).ok_or(DemoError::GridTooLarge {
        tiles: render.tiles_per_side,
        zoom: render.zoom,
    })?;

    let sampler = HeightmapSampler::new(HeightmapParams::default());
    let mut cache = TerrainTileCache::new();
    for coord in &coords {
        let bucket = TerrainBucket::new(synthesize_tile(&sampler, coord)?);
        cache.insert(TerrainTile::new(*coord).with_bucket(LAYER_ID, bucket));
    }
    info!("Synthesized {} tiles at zoom {}", coords.len(), render.zoom);

    let (device, queue) = create_headless_device()?;
    let mut backend = WgpuBackend::new(device, queue);
    let frame = FrameTarget::new(backend.device(), render.output_width, render.output_height);
    let (width, height) = (frame.width(), frame.height());
    backend.set_frame_target(frame);

    let mut renderer = TerrainRenderer::new(backend);
    renderer.set_clear_color(render.clear_color);
    let layer = TerrainLayer::new(LAYER_ID, paint_from(&config.terrain));
    let transform = GridTransform::new(coords[0], render.tiles_per_side);

    // The opaque pass is a no-op for terrain.
    renderer.draw_terrain(&mut cache, &layer, &coords, &transform, RenderPass::Opaque);

    let first =
        renderer.draw_terrain(&mut cache, &layer, &coords, &transform, RenderPass::Translucent);
    log_frame(0, first);
    let pixels = renderer.backend_mut().read_frame()?;

    // Prepared tiles are not prepared again; their shading samples whatever
    // the pooled target last held, so only the first frame is written out.
    let second =
        renderer.draw_terrain(&mut cache, &layer, &coords, &transform, RenderPass::Translucent);
    renderer.backend_mut().submit();
    log_frame(1, second);

    info!(
        "Render targets: {} allocated, {} free",
        renderer.pool().allocated_count(),
        renderer.pool().free_count()
    );

    let actual = pixels.len();
    let image = image::RgbaImage::from_raw(width, height, pixels).ok_or(DemoError::FrameSize {
        actual,
        width,
        height,
    })?;
    image.save(output)?;
    info!("Wrote {}x{} hillshade to {}", width, height, output.display());

    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .or_else(|| dirs::config_dir().map(|dir| dir.join("relief")));

    let mut config = match &config_dir {
        Some(dir) => Config::load_or_create(dir).unwrap_or_else(|e| {
            eprintln!("Failed to load config: {e}, using defaults");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.as_ref().map(|dir| dir.join("logs"));
    relief_log::init_logging(log_dir.as_deref(), cfg!(debug_assertions), Some(&config));

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    if let Err(err) = run(&config, &output) {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}
