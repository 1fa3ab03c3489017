//! Per-player fog of war.
//!
//! Every player owns a raster of cells in one of three states:
//! - Unexplored (0): never seen
//! - Explored (1): seen before, not currently in view
//! - Visible (2): in view this tick
//!
//! Each tick first demotes Visible cells to Explored, then observers reveal
//! the cells they can see. Explored cells never fall back to Unexplored
//! except through [`FogOfWar::reset_player`].

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::geometry::Coordinate;
use crate::line_of_sight::LineOfSightCalculator;
use crate::map_config::FogOfWarConfig;
use crate::terrain::{TerrainCellType, TerrainGrid};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisibilityState {
    #[default]
    Unexplored = 0,
    Explored = 1,
    Visible = 2,
}

impl VisibilityState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Invalid values decode as `Unexplored`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Explored,
            2 => Self::Visible,
            _ => Self::Unexplored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VisibilityCell {
    pub state: VisibilityState,
    pub last_seen_time: f64,
    /// Terrain remembered from the last time the cell was seen.
    pub explored_terrain_type: TerrainCellType,
    pub explored_elevation: f32,
}

impl VisibilityCell {
    pub fn is_visible(&self) -> bool {
        self.state == VisibilityState::Visible
    }

    pub fn is_explored(&self) -> bool {
        self.state != VisibilityState::Unexplored
    }
}

/// One player's row-major visibility raster.
#[derive(Debug, Clone)]
pub struct VisibilityGrid {
    width: u32,
    height: u32,
    cell_size: f64,
    origin: Coordinate,
    cells: Vec<VisibilityCell>,
}

impl VisibilityGrid {
    pub fn new(width: u32, height: u32, cell_size: f64, origin: Coordinate) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        Self {
            width,
            height,
            cell_size,
            origin,
            cells: vec![VisibilityCell::default(); width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn cell(&self, x: u32, y: u32) -> Option<&VisibilityCell> {
        self.index(x, y).and_then(|idx| self.cells.get(idx))
    }

    #[inline]
    pub fn cell_mut(&mut self, x: u32, y: u32) -> Option<&mut VisibilityCell> {
        self.index(x, y).and_then(|idx| self.cells.get_mut(idx))
    }

    pub fn world_to_cell(&self, position: Coordinate) -> Option<(u32, u32)> {
        let fx = ((position.x - self.origin.x) / self.cell_size).floor();
        let fy = ((position.y - self.origin.y) / self.cell_size).floor();
        if fx < 0.0 || fy < 0.0 || fx >= f64::from(self.width) || fy >= f64::from(self.height) {
            return None;
        }
        Some((fx as u32, fy as u32))
    }

    pub fn cell_at_position(&self, position: Coordinate) -> Option<&VisibilityCell> {
        self.world_to_cell(position).and_then(|(x, y)| self.cell(x, y))
    }

    pub fn cell_center(&self, x: u32, y: u32) -> Coordinate {
        Coordinate::new(
            self.origin.x + (f64::from(x) + 0.5) * self.cell_size,
            self.origin.y + (f64::from(y) + 0.5) * self.cell_size,
        )
    }

    /// Cells whose centres fall inside the half-open square
    /// `[corner, corner + size)`.
    pub fn cells_centred_in(&self, corner: Coordinate, size: f64) -> Vec<(u32, u32)> {
        let xs = centred_span(corner.x, size, self.origin.x, self.cell_size, self.width);
        let ys = centred_span(corner.y, size, self.origin.y, self.cell_size, self.height);
        let (Some((lo_x, hi_x)), Some((lo_y, hi_y))) = (xs, ys) else {
            return Vec::new();
        };
        (lo_y..=hi_y)
            .flat_map(|y| (lo_x..=hi_x).map(move |x| (x, y)))
            .collect()
    }

    /// Overwrite a cell's state. Setting `Visible` stamps the time.
    pub fn set_cell_state(&mut self, x: u32, y: u32, state: VisibilityState, time: f64) -> bool {
        let Some(cell) = self.cell_mut(x, y) else {
            return false;
        };
        cell.state = state;
        if state == VisibilityState::Visible {
            cell.last_seen_time = time;
        }
        true
    }

    /// Mark every cell whose centre lies within `radius` of `(x, y)` visible.
    /// Returns the number of cells touched.
    pub fn reveal_circle(&mut self, x: f64, y: f64, radius: f64, time: f64) -> usize {
        if radius.is_nan() || radius < 0.0 || self.width == 0 || self.height == 0 {
            return 0;
        }
        let to_index = |value: f64, base: f64| ((value - base) / self.cell_size).floor();
        let lo_x = to_index(x - radius, self.origin.x).max(0.0);
        let hi_x = to_index(x + radius, self.origin.x).min(f64::from(self.width - 1));
        let lo_y = to_index(y - radius, self.origin.y).max(0.0);
        let hi_y = to_index(y + radius, self.origin.y).min(f64::from(self.height - 1));
        if lo_x > hi_x || lo_y > hi_y {
            return 0;
        }

        let center = Coordinate::new(x, y);
        let radius_sq = radius * radius;
        let mut revealed = 0;
        for cy in lo_y as u32..=hi_y as u32 {
            for cx in lo_x as u32..=hi_x as u32 {
                if self.cell_center(cx, cy).distance_squared(center) <= radius_sq {
                    self.set_cell_state(cx, cy, VisibilityState::Visible, time);
                    revealed += 1;
                }
            }
        }
        revealed
    }

    /// Visible cells become Explored. Returns how many changed.
    pub fn demote_visible(&mut self) -> usize {
        let mut demoted = 0;
        for cell in &mut self.cells {
            if cell.state == VisibilityState::Visible {
                cell.state = VisibilityState::Explored;
                demoted += 1;
            }
        }
        demoted
    }

    pub fn clear_all(&mut self) {
        for cell in &mut self.cells {
            cell.state = VisibilityState::Unexplored;
            cell.last_seen_time = 0.0;
        }
    }

    /// (unexplored, explored, visible)
    pub fn count_by_state(&self) -> (usize, usize, usize) {
        let mut unexplored = 0;
        let mut explored = 0;
        let mut visible = 0;
        for cell in &self.cells {
            match cell.state {
                VisibilityState::Unexplored => unexplored += 1,
                VisibilityState::Explored => explored += 1,
                VisibilityState::Visible => visible += 1,
            }
        }
        (unexplored, explored, visible)
    }

    /// Row-major export of the cell states.
    pub fn to_byte_raster(&self) -> Vec<u8> {
        self.cells.iter().map(|cell| cell.state.as_u8()).collect()
    }

    pub fn iter_cells(&self) -> impl Iterator<Item = ((u32, u32), &VisibilityCell)> {
        let width = self.width.max(1);
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            let idx = idx as u32;
            ((idx % width, idx / width), cell)
        })
    }
}

/// Visibility grids for every player.
#[derive(Resource, Debug, Clone, Default)]
pub struct FogOfWar {
    grids: HashMap<PlayerId, VisibilityGrid>,
}

impl FogOfWar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a player's grid with its origin at (0, 0).
    pub fn initialize_for_player(
        &mut self,
        player: PlayerId,
        width: u32,
        height: u32,
        cell_size: f64,
    ) {
        self.initialize_for_player_at(player, width, height, cell_size, Coordinate::default());
    }

    pub fn initialize_for_player_at(
        &mut self,
        player: PlayerId,
        width: u32,
        height: u32,
        cell_size: f64,
        origin: Coordinate,
    ) {
        self.grids
            .insert(player, VisibilityGrid::new(width, height, cell_size, origin));
        tracing::info!(
            target: "map_core::fog_of_war",
            player = player.0,
            width,
            height,
            cell_size,
            "fog_of_war.player_initialized"
        );
    }

    /// The player's grid, created from `config` if the player is new.
    pub fn ensure_player(
        &mut self,
        player: PlayerId,
        config: &FogOfWarConfig,
    ) -> &mut VisibilityGrid {
        self.grids.entry(player).or_insert_with(|| {
            tracing::info!(
                target: "map_core::fog_of_war",
                player = player.0,
                width = config.grid_width,
                height = config.grid_height,
                "fog_of_war.player_created"
            );
            VisibilityGrid::new(
                config.grid_width,
                config.grid_height,
                config.cell_size,
                Coordinate::new(config.origin_x, config.origin_y),
            )
        })
    }

    /// Start-of-tick transition: everything Visible becomes Explored.
    pub fn update_visibility(&mut self, player: PlayerId, time: f64) -> usize {
        let Some(grid) = self.grids.get_mut(&player) else {
            return 0;
        };
        let demoted = grid.demote_visible();
        tracing::debug!(
            target: "map_core::fog_of_war",
            player = player.0,
            time,
            demoted,
            "fog_of_war.visible_demoted"
        );
        demoted
    }

    pub fn reveal_area(
        &mut self,
        player: PlayerId,
        x: f64,
        y: f64,
        radius: f64,
        time: f64,
    ) -> usize {
        self.grids
            .get_mut(&player)
            .map_or(0, |grid| grid.reveal_circle(x, y, radius, time))
    }

    /// Reveal the terrain cells in line of sight of `position` and remember
    /// their terrain. Each visible terrain cell marks every fog cell centred
    /// inside it, or the fog cell holding its centre when the fog is coarser.
    pub fn reveal_with_line_of_sight(
        &mut self,
        player: PlayerId,
        calculator: &LineOfSightCalculator,
        terrain: &TerrainGrid,
        position: Coordinate,
        vision_range: f64,
        time: f64,
    ) -> usize {
        let Some(grid) = self.grids.get_mut(&player) else {
            return 0;
        };
        let mut revealed = 0;
        for (tx, ty) in calculator.visible_cells(position, vision_range, terrain) {
            let Some(terrain_cell) = terrain.cell(tx, ty) else {
                continue;
            };
            let corner = terrain.cell_world_position(tx, ty);
            let mut targets = grid.cells_centred_in(corner, terrain.cell_size());
            if targets.is_empty() {
                targets.extend(grid.world_to_cell(terrain.cell_center(tx, ty)));
            }
            for (x, y) in targets {
                if let Some(cell) = grid.cell_mut(x, y) {
                    cell.state = VisibilityState::Visible;
                    cell.last_seen_time = time;
                    cell.explored_terrain_type = terrain_cell.cell_type;
                    cell.explored_elevation = terrain_cell.elevation;
                    revealed += 1;
                }
            }
        }
        revealed
    }

    pub fn cache_terrain_data(
        &mut self,
        player: PlayerId,
        x: u32,
        y: u32,
        terrain_type: TerrainCellType,
        elevation: f32,
    ) -> bool {
        let Some(cell) = self.grids.get_mut(&player).and_then(|grid| grid.cell_mut(x, y)) else {
            return false;
        };
        cell.explored_terrain_type = terrain_type;
        cell.explored_elevation = elevation;
        true
    }

    pub fn is_position_visible(&self, player: PlayerId, x: f64, y: f64) -> bool {
        self.visibility_state(player, x, y) == VisibilityState::Visible
    }

    pub fn is_position_explored(&self, player: PlayerId, x: f64, y: f64) -> bool {
        self.visibility_state(player, x, y) != VisibilityState::Unexplored
    }

    /// `Unexplored` for unknown players and positions outside the grid.
    pub fn visibility_state(&self, player: PlayerId, x: f64, y: f64) -> VisibilityState {
        self.grids
            .get(&player)
            .and_then(|grid| grid.cell_at_position(Coordinate::new(x, y)))
            .map_or(VisibilityState::Unexplored, |cell| cell.state)
    }

    pub fn grid(&self, player: PlayerId) -> Option<&VisibilityGrid> {
        self.grids.get(&player)
    }

    pub fn grid_mut(&mut self, player: PlayerId) -> Option<&mut VisibilityGrid> {
        self.grids.get_mut(&player)
    }

    pub fn reveal_all(&mut self, player: PlayerId, time: f64) {
        let Some(grid) = self.grids.get_mut(&player) else {
            return;
        };
        for cell in &mut grid.cells {
            cell.state = VisibilityState::Visible;
            cell.last_seen_time = time;
        }
        tracing::info!(
            target: "map_core::fog_of_war",
            player = player.0,
            "fog_of_war.revealed_all"
        );
    }

    pub fn reset_player(&mut self, player: PlayerId) {
        if let Some(grid) = self.grids.get_mut(&player) {
            grid.clear_all();
            tracing::info!(
                target: "map_core::fog_of_war",
                player = player.0,
                "fog_of_war.player_reset"
            );
        }
    }

    pub fn remove_player(&mut self, player: PlayerId) -> Option<VisibilityGrid> {
        self.grids.remove(&player)
    }

    /// Players with a grid, in ascending id order.
    pub fn players(&self) -> Vec<PlayerId> {
        let mut players: Vec<_> = self.grids.keys().copied().collect();
        players.sort_unstable();
        players
    }
}

/// Inclusive index range of cells centred in `[min, min + size)` on one axis.
fn centred_span(
    min: f64,
    size: f64,
    origin: f64,
    cell_size: f64,
    count: u32,
) -> Option<(u32, u32)> {
    if count == 0 || size.is_nan() || size <= 0.0 {
        return None;
    }
    let first = ((min - origin) / cell_size - 0.5).ceil().max(0.0);
    let last = (((min + size - origin) / cell_size - 0.5).ceil() - 1.0).min(f64::from(count - 1));
    (first <= last).then(|| (first as u32, last as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_config::LineOfSightConfig;
    use crate::terrain::TerrainCell;

    const PLAYER: PlayerId = PlayerId(1);

    #[test]
    fn reveal_then_tick_leaves_area_explored() {
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 10, 10, 1.0);
        assert!(fog.reveal_area(PLAYER, 5.0, 5.0, 2.0, 0.0) > 0);
        assert!(fog.is_position_visible(PLAYER, 5.0, 5.0));

        fog.update_visibility(PLAYER, 1.0);
        assert!(fog.is_position_explored(PLAYER, 5.0, 5.0));
        assert!(!fog.is_position_visible(PLAYER, 5.0, 5.0));
        assert_eq!(fog.visibility_state(PLAYER, 5.0, 5.0), VisibilityState::Explored);
        assert_eq!(fog.visibility_state(PLAYER, 9.5, 9.5), VisibilityState::Unexplored);
    }

    #[test]
    fn reveal_circle_uses_cell_centres() {
        let mut grid = VisibilityGrid::new(10, 10, 1.0, Coordinate::default());
        // Centres within 1.0 of (5, 5): (4.5|5.5, 4.5|5.5).
        assert_eq!(grid.reveal_circle(5.0, 5.0, 1.0, 3.0), 4);
        let cell = grid.cell(4, 4).expect("in bounds");
        assert!(cell.is_visible());
        assert_eq!(cell.last_seen_time, 3.0);
        assert_eq!(grid.count_by_state(), (96, 0, 4));
        // Circles beyond the grid touch nothing.
        assert_eq!(grid.reveal_circle(-50.0, -50.0, 2.0, 3.0), 0);
    }

    #[test]
    fn unknown_player_and_out_of_bounds_read_as_unexplored() {
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 4, 4, 1.0);
        fog.reveal_all(PLAYER, 0.0);
        assert_eq!(fog.visibility_state(PlayerId(9), 1.0, 1.0), VisibilityState::Unexplored);
        assert_eq!(fog.visibility_state(PLAYER, 4.0, 1.0), VisibilityState::Unexplored);
        assert_eq!(fog.visibility_state(PLAYER, -0.1, 1.0), VisibilityState::Unexplored);
        assert_eq!(fog.reveal_area(PlayerId(9), 1.0, 1.0, 5.0, 0.0), 0);
        assert_eq!(fog.update_visibility(PlayerId(9), 0.0), 0);
    }

    #[test]
    fn explored_is_sticky_until_reset() {
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 4, 4, 1.0);
        fog.reveal_area(PLAYER, 0.5, 0.5, 0.1, 0.0);
        for tick in 1..5 {
            fog.update_visibility(PLAYER, f64::from(tick));
            assert!(fog.is_position_explored(PLAYER, 0.5, 0.5));
        }
        fog.reset_player(PLAYER);
        assert!(!fog.is_position_explored(PLAYER, 0.5, 0.5));
    }

    #[test]
    fn grid_with_origin_maps_world_positions() {
        let mut fog = FogOfWar::new();
        fog.initialize_for_player_at(PLAYER, 10, 10, 5.0, Coordinate::new(-25.0, -25.0));
        fog.reveal_area(PLAYER, 0.0, 0.0, 4.0, 0.0);
        assert!(fog.is_position_visible(PLAYER, 0.0, 0.0));
        let grid = fog.grid(PLAYER).expect("initialized");
        assert_eq!(grid.world_to_cell(Coordinate::new(-25.0, -25.0)), Some((0, 0)));
        assert_eq!(grid.world_to_cell(Coordinate::new(25.0, 0.0)), None);
    }

    #[test]
    fn byte_raster_is_row_major() {
        let mut grid = VisibilityGrid::new(3, 2, 1.0, Coordinate::default());
        grid.set_cell_state(2, 0, VisibilityState::Visible, 1.0);
        grid.set_cell_state(0, 1, VisibilityState::Explored, 1.0);
        assert_eq!(grid.to_byte_raster(), vec![0, 0, 2, 1, 0, 0]);
        assert_eq!(VisibilityState::from_u8(7), VisibilityState::Unexplored);
        assert!(!grid.set_cell_state(3, 0, VisibilityState::Visible, 1.0));
    }

    #[test]
    fn line_of_sight_reveal_caches_terrain() {
        let mut terrain = TerrainGrid::new(20, 20, 1.0);
        terrain.fill_region(12, 0, 12, 19, TerrainCell::new(TerrainCellType::Mountain, 500.0));
        let calc = LineOfSightCalculator::new(LineOfSightConfig::default());

        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 20, 20, 1.0);
        let viewer = Coordinate::new(10.0, 10.0);
        let revealed = fog.reveal_with_line_of_sight(PLAYER, &calc, &terrain, viewer, 5.0, 2.0);
        assert!(revealed > 0);
        assert!(fog.is_position_visible(PLAYER, 12.5, 10.5));
        assert!(!fog.is_position_visible(PLAYER, 13.5, 10.5));

        let wall = fog
            .grid(PLAYER)
            .and_then(|grid| grid.cell(12, 10))
            .expect("in bounds");
        assert_eq!(wall.explored_terrain_type, TerrainCellType::Mountain);
        assert_eq!(wall.explored_elevation, 500.0);
        assert_eq!(wall.last_seen_time, 2.0);
    }

    #[test]
    fn cache_and_player_bookkeeping() {
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PlayerId(3), 2, 2, 1.0);
        fog.ensure_player(PlayerId(1), &FogOfWarConfig::default());
        assert_eq!(fog.players(), vec![PlayerId(1), PlayerId(3)]);

        assert!(fog.cache_terrain_data(PlayerId(3), 1, 1, TerrainCellType::Forest, 12.0));
        assert!(!fog.cache_terrain_data(PlayerId(3), 2, 1, TerrainCellType::Forest, 12.0));
        let cell = fog.grid(PlayerId(3)).and_then(|g| g.cell(1, 1)).expect("cell");
        assert_eq!(cell.explored_terrain_type, TerrainCellType::Forest);

        assert!(fog.remove_player(PlayerId(3)).is_some());
        assert_eq!(fog.players(), vec![PlayerId(1)]);
        assert_eq!(fog.grid(PlayerId(1)).map(|g| g.width()), Some(256));
    }

    #[test]
    fn grid_shape_is_read_only() {
        let grid = VisibilityGrid::new(4, 3, 2.5, Coordinate::new(-5.0, 1.0));
        assert_eq!((grid.width(), grid.height()), (4, 3));
        assert_eq!(grid.cell_size(), 2.5);
        assert_eq!(grid.origin(), Coordinate::new(-5.0, 1.0));
        assert_eq!(grid.iter_cells().count(), 12);
        assert_eq!(VisibilityGrid::new(2, 2, 0.0, Coordinate::default()).cell_size(), 1.0);
    }

    #[test]
    fn cells_centred_in_uses_a_half_open_square() {
        let grid = VisibilityGrid::new(10, 10, 10.0, Coordinate::default());
        assert_eq!(
            grid.cells_centred_in(Coordinate::new(20.0, 40.0), 20.0),
            vec![(2, 4), (3, 4), (2, 5), (3, 5)]
        );
        // Lower edge inclusive, upper edge exclusive.
        assert_eq!(grid.cells_centred_in(Coordinate::new(5.0, 5.0), 10.0), vec![(0, 0)]);
        assert!(grid.cells_centred_in(Coordinate::new(1.0, 1.0), 3.0).is_empty());
        assert!(grid.cells_centred_in(Coordinate::new(200.0, 0.0), 20.0).is_empty());
    }

    #[test]
    fn fine_fog_fills_coarse_terrain_cells() {
        let terrain = TerrainGrid::new(50, 50, 20.0);
        let calc = LineOfSightCalculator::new(LineOfSightConfig::default());
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 100, 100, 10.0);

        let viewer = Coordinate::new(500.0, 500.0);
        fog.reveal_with_line_of_sight(PLAYER, &calc, &terrain, viewer, 50.0, 1.0);
        assert!(fog.is_position_visible(PLAYER, 515.0, 505.0));
        assert!(fog.is_position_visible(PLAYER, 495.0, 495.0));
        assert!(fog.is_position_visible(PLAYER, 505.0, 535.0));
        assert!(!fog.is_position_visible(PLAYER, 575.0, 505.0));

        let grid = fog.grid(PLAYER).expect("player grid");
        let (x, y) = grid
            .world_to_cell(Coordinate::new(515.0, 505.0))
            .expect("in bounds");
        assert_eq!(grid.cell(x, y).map(|c| c.last_seen_time), Some(1.0));
    }

    #[test]
    fn coarse_fog_still_marks_the_cell_holding_each_terrain_centre() {
        let terrain = TerrainGrid::new(20, 20, 1.0);
        let calc = LineOfSightCalculator::new(LineOfSightConfig::default());
        let mut fog = FogOfWar::new();
        fog.initialize_for_player(PLAYER, 4, 4, 5.0);

        let viewer = Coordinate::new(10.0, 10.0);
        fog.reveal_with_line_of_sight(PLAYER, &calc, &terrain, viewer, 3.0, 1.0);
        assert!(fog.is_position_visible(PLAYER, 10.0, 10.0));
        assert!(fog.is_position_visible(PLAYER, 8.0, 8.0));
        assert!(!fog.is_position_visible(PLAYER, 2.0, 2.0));
    }
}

