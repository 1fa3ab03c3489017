//! Spatial and visibility engine for the map layer of the strategy sim.
//!
//! Answers which province contains a point, which provinces border each
//! other, what an observer can currently see and what each player has
//! explored. Province geometry feeds an adjacency graph plus two spatial
//! indexes (a uniform grid and a quadtree); a terrain raster feeds line of
//! sight, which drives per-player fog of war through the systems in
//! [`systems`].

pub mod boundary;
pub mod fog_of_war;
pub mod geometry;
pub mod graph;
pub mod line_of_sight;
pub mod map_config;
pub mod province;
pub mod quadtree;
pub mod spatial_grid;
pub mod systems;
pub mod terrain;

pub use boundary::{
    are_neighbors, check_adjacency, shared_border, AdjacencyCheck, RenderLevel,
};
pub use fog_of_war::{FogOfWar, PlayerId, VisibilityCell, VisibilityGrid, VisibilityState};
pub use geometry::{BoundingBox, Coordinate, GeoProjection};
pub use graph::{BuildReport, GraphIssue, ProvinceGraph, RejectedProvince};
pub use line_of_sight::{
    DetectionModifier, LineOfSightCalculator, LosModifier, LosOutcome, RayCast,
};
pub use map_config::{
    load_map_config_from_env, MapConfig, MapConfigError, MapConfigHandle, BUILTIN_MAP_CONFIG,
};
pub use province::{
    detect_adjacencies, load_provinces, provinces_from_json_str, NeighborBorder, ProvinceId,
    ProvinceLoadError, ProvinceRecord,
};
pub use quadtree::QuadTreeIndex;
pub use spatial_grid::{GridCell, GridStats, ProvinceSpatialIndex};
pub use systems::{build_visibility_schedule, MapClock, Observer, WeatherState};
pub use terrain::{TerrainCell, TerrainCellType, TerrainGrid};
