//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Terrain layer paint.
    pub terrain: TerrainConfig,
    /// Output and tile layout.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Paint properties of the terrain layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Light direction in degrees clockwise from north.
    pub illumination_direction: f32,
    /// Shading intensity (0.0 - 1.0).
    pub exaggeration: f32,
    /// RGBA color of slopes facing away from the light.
    pub shadow_color: [f32; 4],
    /// RGBA color of slopes facing the light.
    pub highlight_color: [f32; 4],
    /// RGBA color that emphasises steep terrain.
    pub accent_color: [f32; 4],
}

/// Output image and tile layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Output image width in pixels.
    pub output_width: u32,
    /// Output image height in pixels.
    pub output_height: u32,
    /// Tiles along each side of the rendered grid.
    pub tiles_per_side: u32,
    /// Zoom level of the rendered tiles.
    pub zoom: u8,
    /// RGBA color the frame is cleared to before drawing terrain.
    pub clear_color: [f32; 4],
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for TerrainConfig {
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

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_width: 512,
            output_height: 512,
            tiles_per_side: 2,
            zoom: 12,
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// File name of the persisted config inside its directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if it does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);

        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::CreateDir {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        let path = config_dir.join(CONFIG_FILE_NAME);
        std::fs::write(&path, serialized).map_err(|source| ConfigError::Write { path, source })
    }
}
