//! Uniform-grid spatial index over province positions.
//!
//! The world is cut into square cells of `cell_size`; each occupied cell
//! keeps the ids of the provinces whose anchor point falls inside it, and a
//! reverse cache maps every id to its cell and position. The two maps are
//! only ever changed together under the write lock, so the cache stays
//! authoritative: an id is in exactly one cell list iff it has a cache entry.
//!
//! Queries take the read lock and may run concurrently; mutations take the
//! write lock.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bevy_ecs::prelude::Resource;

use crate::geometry::Coordinate;
use crate::map_config::{MapConfig, SpatialGridConfig};
use crate::province::ProvinceId;

/// Integer cell coordinates: `floor(world / cell_size)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProvinceSlot {
    cell: GridCell,
    position: Coordinate,
}

#[derive(Debug, Default)]
struct GridState {
    cells: HashMap<GridCell, Vec<ProvinceId>>,
    province_cells: HashMap<ProvinceId, ProvinceSlot>,
}

impl GridState {
    fn remove(&mut self, id: ProvinceId) -> bool {
        let Some(slot) = self.province_cells.remove(&id) else {
            return false;
        };
        if let Some(ids) = self.cells.get_mut(&slot.cell) {
            ids.retain(|&other| other != id);
            if ids.is_empty() {
                self.cells.remove(&slot.cell);
            }
        }
        true
    }

    fn insert(&mut self, id: ProvinceId, slot: ProvinceSlot) {
        self.cells.entry(slot.cell).or_default().push(id);
        self.province_cells.insert(id, slot);
    }
}

/// Summary of how the index is populated.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridStats {
    pub total_provinces: usize,
    pub total_cells_used: usize,
    pub max_provinces_per_cell: usize,
    pub avg_provinces_per_cell: f64,
    /// Occupied cells over the number of cells covering the configured world.
    pub load_factor: f64,
}

#[derive(Resource, Debug)]
pub struct ProvinceSpatialIndex {
    config: SpatialGridConfig,
    state: RwLock<GridState>,
}

impl Default for ProvinceSpatialIndex {
    fn default() -> Self {
        Self::new(SpatialGridConfig::default())
    }
}

impl ProvinceSpatialIndex {
    pub fn new(config: SpatialGridConfig) -> Self {
        let mut config = config;
        if config.cell_size.is_nan() || config.cell_size <= 0.0 {
            tracing::warn!(
                target: "map_core::spatial",
                cell_size = config.cell_size,
                "spatial_grid.invalid_cell_size"
            );
            config.cell_size = SpatialGridConfig::default().cell_size;
        }
        tracing::debug!(
            target: "map_core::spatial",
            cell_size = config.cell_size,
            "spatial_grid.initialized"
        );
        Self {
            config,
            state: RwLock::new(GridState::default()),
        }
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.spatial)
    }

    pub fn config(&self) -> &SpatialGridConfig {
        &self.config
    }

    pub fn cell_size(&self) -> f64 {
        self.config.cell_size
    }

    fn read(&self) -> RwLockReadGuard<'_, GridState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GridState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cell_of(&self, x: f64, y: f64) -> GridCell {
        GridCell::new(
            (x / self.config.cell_size).floor() as i32,
            (y / self.config.cell_size).floor() as i32,
        )
    }

    /// Index `id` at `(x, y)`. An id that is already present is moved.
    pub fn insert_province(&self, id: ProvinceId, x: f64, y: f64) {
        let slot = ProvinceSlot {
            cell: self.cell_of(x, y),
            position: Coordinate::new(x, y),
        };
        let mut state = self.write();
        state.remove(id);
        state.insert(id, slot);
    }

    /// Returns false when `id` was not indexed.
    pub fn remove_province(&self, id: ProvinceId) -> bool {
        self.write().remove(id)
    }

    /// Remove then re-insert under a single write lock.
    pub fn update_province_position(&self, id: ProvinceId, x: f64, y: f64) {
        let slot = ProvinceSlot {
            cell: self.cell_of(x, y),
            position: Coordinate::new(x, y),
        };
        let mut state = self.write();
        if !state.remove(id) {
            tracing::debug!(
                target: "map_core::spatial",
                province = id,
                "spatial_grid.update_inserted_new"
            );
        }
        state.insert(id, slot);
    }

    /// Cells overlapping the bounding square of the circle.
    pub fn cells_in_radius(&self, x: f64, y: f64, radius: f64) -> Vec<GridCell> {
        let r = radius.max(0.0);
        self.cells_in_region(x - r, y - r, x + r, y + r)
    }

    pub fn cells_in_region(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Vec<GridCell> {
        let (lo, hi) = self.cell_span(min_x, min_y, max_x, max_y);
        (lo.x..=hi.x)
            .flat_map(|cx| (lo.y..=hi.y).map(move |cy| GridCell::new(cx, cy)))
            .collect()
    }

    fn cell_span(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> (GridCell, GridCell) {
        let lo = self.cell_of(min_x.min(max_x), min_y.min(max_y));
        let hi = self.cell_of(min_x.max(max_x), min_y.max(max_y));
        (lo, hi)
    }

    fn collect_in_span(state: &GridState, lo: GridCell, hi: GridCell) -> BTreeSet<ProvinceId> {
        let mut found = BTreeSet::new();
        let columns = i64::from(hi.x) - i64::from(lo.x) + 1;
        let rows = i64::from(hi.y) - i64::from(lo.y) + 1;
        let span = columns * rows;
        if span > state.cells.len() as i64 {
            // Fewer occupied cells than cells in range: scan the occupied ones.
            for (cell, ids) in &state.cells {
                if (lo.x..=hi.x).contains(&cell.x) && (lo.y..=hi.y).contains(&cell.y) {
                    found.extend(ids.iter().copied());
                }
            }
        } else {
            for cx in lo.x..=hi.x {
                for cy in lo.y..=hi.y {
                    if let Some(ids) = state.cells.get(&GridCell::new(cx, cy)) {
                        found.extend(ids.iter().copied());
                    }
                }
            }
        }
        found
    }

    /// Conservative circle query: every province whose cell overlaps the
    /// circle's bounding square, including some outside the circle. Use
    /// [`Self::find_provinces_within_radius_exact`] for strict membership.
    pub fn find_provinces_in_radius(&self, x: f64, y: f64, radius: f64) -> Vec<ProvinceId> {
        let r = radius.max(0.0);
        self.find_provinces_in_region(x - r, y - r, x + r, y + r)
    }

    pub fn find_provinces_in_region(
        &self,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Vec<ProvinceId> {
        let (lo, hi) = self.cell_span(min_x, min_y, max_x, max_y);
        let state = self.read();
        Self::collect_in_span(&state, lo, hi).into_iter().collect()
    }

    /// Provinces whose indexed position lies within `radius` of `(x, y)`.
    pub fn find_provinces_within_radius_exact(
        &self,
        x: f64,
        y: f64,
        radius: f64,
    ) -> Vec<ProvinceId> {
        let r = radius.max(0.0);
        let center = Coordinate::new(x, y);
        let (lo, hi) = self.cell_span(x - r, y - r, x + r, y + r);
        let state = self.read();
        Self::collect_in_span(&state, lo, hi)
            .into_iter()
            .filter(|id| {
                state
                    .province_cells
                    .get(id)
                    .is_some_and(|slot| slot.position.distance_squared(center) <= r * r)
            })
            .collect()
    }

    /// Up to `count` provinces ordered by true distance from `(x, y)`.
    ///
    /// The search radius starts at one cell and doubles until enough
    /// candidates are found or the configured ceiling is reached; the radius
    /// is then widened to the k-th candidate's distance so no closer province
    /// outside the last search square is missed.
    pub fn find_nearest_provinces(&self, x: f64, y: f64, count: usize) -> Vec<ProvinceId> {
        if count == 0 {
            return Vec::new();
        }
        let center = Coordinate::new(x, y);
        let state = self.read();
        if state.province_cells.is_empty() {
            return Vec::new();
        }

        let ceiling = self.config.nearest_radius_ceiling.max(self.config.cell_size);
        let gather = |radius: f64| {
            let (lo, hi) = self.cell_span(x - radius, y - radius, x + radius, y + radius);
            let mut ranked: Vec<(f64, ProvinceId)> = Self::collect_in_span(&state, lo, hi)
                .into_iter()
                .filter_map(|id| {
                    state
                        .province_cells
                        .get(&id)
                        .map(|slot| (slot.position.distance_squared(center), id))
                })
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            ranked
        };

        let mut radius = self.config.cell_size;
        let mut ranked = gather(radius);
        while ranked.len() < count && radius < ceiling {
            radius = (radius * 2.0).min(ceiling);
            ranked = gather(radius);
        }
        if let Some(&(kth_sq, _)) = ranked.get(count - 1) {
            let kth = kth_sq.sqrt();
            if kth > radius {
                ranked = gather(kth);
            }
        }

        ranked.truncate(count);
        ranked.into_iter().map(|(_, id)| id).collect()
    }

    pub fn provinces_in_cell(&self, cell: GridCell) -> Vec<ProvinceId> {
        self.read().cells.get(&cell).cloned().unwrap_or_default()
    }

    pub fn position_of(&self, id: ProvinceId) -> Option<Coordinate> {
        self.read().province_cells.get(&id).map(|slot| slot.position)
    }

    pub fn cell_of_province(&self, id: ProvinceId) -> Option<GridCell> {
        self.read().province_cells.get(&id).map(|slot| slot.cell)
    }

    pub fn contains(&self, id: ProvinceId) -> bool {
        self.read().province_cells.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.read().province_cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().province_cells.is_empty()
    }

    pub fn occupied_cells(&self) -> usize {
        self.read().cells.len()
    }

    pub fn clear(&self) {
        let mut state = self.write();
        state.cells.clear();
        state.province_cells.clear();
    }

    pub fn stats(&self) -> GridStats {
        let state = self.read();
        let total_cells_used = state.cells.len();
        let placed: usize = state.cells.values().map(Vec::len).sum();
        let max_provinces_per_cell = state.cells.values().map(Vec::len).max().unwrap_or(0);

        let cfg = &self.config;
        let columns = ((cfg.world_max_x - cfg.world_min_x) / cfg.cell_size).ceil().max(0.0);
        let rows = ((cfg.world_max_y - cfg.world_min_y) / cfg.cell_size).ceil().max(0.0);
        let world_cells = columns * rows;

        GridStats {
            total_provinces: state.province_cells.len(),
            total_cells_used,
            max_provinces_per_cell,
            avg_provinces_per_cell: if total_cells_used > 0 {
                placed as f64 / total_cells_used as f64
            } else {
                0.0
            },
            load_factor: if world_cells > 0.0 {
                total_cells_used as f64 / world_cells
            } else {
                0.0
            },
        }
    }
}
