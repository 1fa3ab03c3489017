//! Configuration for the spatial indexes, line of sight and fog of war.
//!
//! Loaded from `map_config.json` with support for an environment variable
//! override.

use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bevy_ecs::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::geometry::BoundingBox;

pub const BUILTIN_MAP_CONFIG: &str = include_str!("data/map_config.json");

/// Environment variable naming a config file that replaces the builtin.
pub const MAP_CONFIG_PATH_ENV: &str = "MAP_CONFIG_PATH";

/// Root configuration for the map engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub spatial: SpatialGridConfig,
    pub quadtree: QuadTreeConfig,
    pub line_of_sight: LineOfSightConfig,
    pub sight_ranges: HashMap<String, f64>,
    pub fog_of_war: FogOfWarConfig,
    pub geometry: GeometryConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            spatial: SpatialGridConfig::default(),
            quadtree: QuadTreeConfig::default(),
            line_of_sight: LineOfSightConfig::default(),
            sight_ranges: default_sight_ranges(),
            fog_of_war: FogOfWarConfig::default(),
            geometry: GeometryConfig::default(),
        }
    }
}

fn default_sight_ranges() -> HashMap<String, f64> {
    [
        ("Infantry", 50.0),
        ("Archer", 60.0),
        ("Pikemen", 45.0),
        ("LightCavalry", 100.0),
        ("HeavyCavalry", 75.0),
        ("MountedArchers", 110.0),
        ("Scout", 150.0),
        ("Siege", 40.0),
        ("Watchtower", 200.0),
        ("Fortress", 250.0),
        ("Naval", 120.0),
    ]
    .into_iter()
    .map(|(kind, range)| (kind.to_string(), range))
    .collect()
}

impl MapConfig {
    /// The compiled-in configuration. Falls back to the code defaults if the
    /// embedded file ever fails to parse.
    pub fn builtin() -> Arc<Self> {
        match Self::from_json_str(BUILTIN_MAP_CONFIG) {
            Ok(config) => Arc::new(config),
            Err(err) => {
                tracing::error!(
                    target: "map_core::config",
                    error = %err,
                    "map_config.builtin_parse_failed"
                );
                Arc::new(Self::default())
            }
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, MapConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| MapConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = MapConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Base sight range for a unit kind, falling back to the default vision
    /// range for unknown kinds.
    pub fn sight_range_for(&self, unit_kind: &str) -> f64 {
        self.sight_ranges
            .get(unit_kind)
            .copied()
            .unwrap_or(self.line_of_sight.default_vision_range)
    }
}

/// Uniform grid settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpatialGridConfig {
    pub cell_size: f64,
    pub world_min_x: f64,
    pub world_min_y: f64,
    pub world_max_x: f64,
    pub world_max_y: f64,
    /// Largest radius the nearest-province search grows to.
    pub nearest_radius_ceiling: f64,
}

impl Default for SpatialGridConfig {
    fn default() -> Self {
        Self {
            cell_size: 100.0,
            world_min_x: 0.0,
            world_min_y: 0.0,
            world_max_x: 10_000.0,
            world_max_y: 10_000.0,
            nearest_radius_ceiling: 10_000.0,
        }
    }
}

/// Quadtree settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuadTreeConfig {
    pub world_bounds: BoundingBox,
    pub max_depth: u32,
    /// Ids a leaf holds before it splits.
    pub node_capacity: usize,
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        Self {
            world_bounds: BoundingBox::new(-500.0, -500.0, 500.0, 500.0),
            max_depth: 8,
            node_capacity: 8,
        }
    }
}

/// Line-of-sight ranges, elevation bonus and blocking rules.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LineOfSightConfig {
    pub use_elevation_bonus: bool,
    pub use_terrain_concealment: bool,
    pub default_vision_range: f64,
    pub minimum_range: f64,
    pub maximum_range: f64,
    /// Viewer elevation above which the vision range bonus applies.
    pub elevation_bonus_threshold: f64,
    pub elevation_bonus_per_100m: f64,
    /// Ray obstruction at or above which a target is hidden.
    pub blocking_threshold: f64,
    /// Mountains higher than the viewer by more than this are opaque.
    pub mountain_block_height: f64,
    /// Hills higher than the viewer by more than this are opaque.
    pub hills_block_height: f64,
    /// Forest further than this from the viewer obstructs the ray.
    pub forest_block_distance: f64,
    pub terrain: TerrainVisibilityConfig,
}

impl Default for LineOfSightConfig {
    fn default() -> Self {
        Self {
            use_elevation_bonus: true,
            use_terrain_concealment: true,
            default_vision_range: 50.0,
            minimum_range: 10.0,
            maximum_range: 500.0,
            elevation_bonus_threshold: 100.0,
            elevation_bonus_per_100m: 15.0,
            blocking_threshold: 0.8,
            mountain_block_height: 50.0,
            hills_block_height: 100.0,
            forest_block_distance: 30.0,
            terrain: TerrainVisibilityConfig::default(),
        }
    }
}

/// Concealment of targets standing in cover and penalties for viewers
/// standing in it.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TerrainVisibilityConfig {
    pub forest_concealment: f64,
    pub marsh_concealment: f64,
    pub hills_concealment: f64,
    pub forest_viewer_penalty: f64,
    pub marsh_viewer_penalty: f64,
}

impl Default for TerrainVisibilityConfig {
    fn default() -> Self {
        Self {
            forest_concealment: 20.0,
            marsh_concealment: 10.0,
            hills_concealment: 5.0,
            forest_viewer_penalty: 15.0,
            marsh_viewer_penalty: 10.0,
        }
    }
}

/// Per-player visibility grid dimensions used when a player is first seen.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FogOfWarConfig {
    pub grid_width: u32,
    pub grid_height: u32,
    pub cell_size: f64,
    pub origin_x: f64,
    pub origin_y: f64,
}

impl Default for FogOfWarConfig {
    fn default() -> Self {
        Self {
            grid_width: 256,
            grid_height: 256,
            cell_size: 10.0,
            origin_x: 0.0,
            origin_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    /// Distance under which province boundaries are considered touching.
    pub adjacency_tolerance: f64,
    /// Tolerance used when dropping near-duplicate boundary vertices.
    pub duplicate_point_tolerance: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            adjacency_tolerance: 0.001,
            duplicate_point_tolerance: 0.001,
        }
    }
}

#[derive(Debug, Error)]
pub enum MapConfigError {
    #[error("failed to parse map config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read map config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Handle for accessing the map configuration.
#[derive(Resource, Debug, Clone)]
pub struct MapConfigHandle(pub Arc<MapConfig>);

impl MapConfigHandle {
    pub fn new(config: Arc<MapConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<MapConfig> {
        Arc::clone(&self.0)
    }

    pub fn replace(&mut self, config: Arc<MapConfig>) {
        self.0 = config;
    }
}

impl Default for MapConfigHandle {
    fn default() -> Self {
        Self(MapConfig::builtin())
    }
}

/// Load the map configuration named by `MAP_CONFIG_PATH`, falling back to the
/// builtin. Returns the path the config came from, if any.
pub fn load_map_config_from_env() -> (Arc<MapConfig>, Option<PathBuf>) {
    if let Some(path) = env::var_os(MAP_CONFIG_PATH_ENV).map(PathBuf::from) {
        match MapConfig::from_file(&path) {
            Ok(config) => {
                tracing::info!(
                    target: "map_core::config",
                    path = %path.display(),
                    "map_config.loaded=file"
                );
                return (Arc::new(config), Some(path));
            }
            Err(err) => {
                tracing::warn!(
                    target: "map_core::config",
                    path = %path.display(),
                    error = %err,
                    "map_config.load_failed"
                );
            }
        }
    }

    let config = MapConfig::builtin();
    tracing::info!(target: "map_core::config", "map_config.loaded=builtin");
    (config, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_matches_defaults() {
        let builtin = MapConfig::builtin();
        let defaults = MapConfig::default();
        assert_eq!(builtin.spatial, defaults.spatial);
        assert_eq!(builtin.quadtree, defaults.quadtree);
        assert_eq!(builtin.line_of_sight, defaults.line_of_sight);
        assert_eq!(builtin.fog_of_war, defaults.fog_of_war);
        assert_eq!(builtin.geometry, defaults.geometry);
        assert_eq!(builtin.sight_ranges, defaults.sight_ranges);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let config = MapConfig::from_json_str(
            r#"{"spatial": {"cell_size": 25.0}, "line_of_sight": {"maximum_range": 800.0}}"#,
        )
        .expect("valid json");
        assert_eq!(config.spatial.cell_size, 25.0);
        assert_eq!(config.spatial.world_max_x, 10_000.0);
        assert_eq!(config.line_of_sight.maximum_range, 800.0);
        assert_eq!(config.line_of_sight.blocking_threshold, 0.8);
        assert_eq!(config.quadtree.max_depth, 8);
    }

    #[test]
    fn sight_range_lookup() {
        let config = MapConfig::default();
        assert_eq!(config.sight_range_for("Scout"), 150.0);
        assert_eq!(config.sight_range_for("Fortress"), 250.0);
        assert_eq!(config.sight_range_for("Balloon"), 50.0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = MapConfig::from_file(Path::new("/nonexistent/map_config.json")).unwrap_err();
        assert!(matches!(err, MapConfigError::Read { .. }));
    }
}
