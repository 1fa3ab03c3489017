//! Line of sight over a terrain raster.
//!
//! A target is visible when it lies within the maximum range, within the
//! viewer's effective range after elevation, cover and weather, and the ray
//! between them is not obstructed. Rays walk terrain cells with Bresenham's
//! algorithm; the viewer's and target's own cells are never obstructions.

use crate::geometry::Coordinate;
use crate::map_config::{LineOfSightConfig, MapConfig};
use crate::terrain::{TerrainCell, TerrainCellType, TerrainGrid};

/// Inputs to a viewer's effective range against one target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LosModifier {
    pub base_range: f64,
    pub elevation_bonus: f64,
    pub terrain_penalty: f64,
    /// Cover at the target.
    pub forest_concealment: f64,
    pub weather_modifier: f64,
    pub minimum_range: f64,
}

impl LosModifier {
    pub fn new(base_range: f64, weather_modifier: f64, minimum_range: f64) -> Self {
        Self {
            base_range,
            elevation_bonus: 0.0,
            terrain_penalty: 0.0,
            forest_concealment: 0.0,
            weather_modifier,
            minimum_range,
        }
    }

    pub fn effective_range(&self) -> f64 {
        let range = (self.base_range + self.elevation_bonus - self.terrain_penalty)
            * self.weather_modifier
            - self.forest_concealment;
        range.max(0.0).max(self.minimum_range)
    }
}

/// How far a unit can be spotted from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionModifier {
    pub base_detection_range: f64,
    /// Reduces the range at which enemies spot the unit.
    pub stealth_penalty: f64,
    /// Large formations are easier to spot.
    pub size_modifier: f64,
    /// Moving units are easier to spot.
    pub movement_penalty: f64,
}

impl Default for DetectionModifier {
    fn default() -> Self {
        Self {
            base_detection_range: 50.0,
            stealth_penalty: 0.0,
            size_modifier: 0.0,
            movement_penalty: 0.0,
        }
    }
}

impl DetectionModifier {
    pub const MINIMUM_RANGE: f64 = 10.0;

    pub fn detection_range(&self) -> f64 {
        (self.base_detection_range - self.stealth_penalty
            + self.size_modifier
            + self.movement_penalty)
            .max(Self::MINIMUM_RANGE)
    }
}

/// Result of a ray walk between two positions.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RayCast {
    /// Mean obstruction weight of the sampled cells, 1.0 once an opaque cell
    /// is hit.
    pub obstruction_factor: f64,
    /// Cells inspected, excluding the viewer and target cells.
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LosOutcome {
    pub visible: bool,
    pub distance: f64,
    pub modifier: LosModifier,
    pub obstruction_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Obstruction {
    Clear,
    Partial,
    Opaque,
}

/// Cells on the Bresenham line from `(x0, y0)` to `(x1, y1)`, both ends
/// included.
pub fn line_points(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<(i32, i32)> {
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx - dy;
    let (mut x, mut y) = (x0, y0);

    let mut points = Vec::with_capacity(dx.max(dy) as usize + 1);
    loop {
        points.push((x, y));
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
    points
}

#[derive(Debug, Clone, Default)]
pub struct LineOfSightCalculator {
    config: LineOfSightConfig,
}

impl LineOfSightCalculator {
    pub fn new(config: LineOfSightConfig) -> Self {
        tracing::debug!(
            target: "map_core::line_of_sight",
            maximum_range = config.maximum_range,
            blocking_threshold = config.blocking_threshold,
            "line_of_sight.initialized"
        );
        Self { config }
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.line_of_sight)
    }

    pub fn config(&self) -> &LineOfSightConfig {
        &self.config
    }

    fn elevation_bonus(&self, viewer_elevation: f64, target_elevation: f64) -> f64 {
        if !self.config.use_elevation_bonus {
            return 0.0;
        }
        let advantage = viewer_elevation - target_elevation;
        if advantage <= 0.0 {
            return 0.0;
        }
        advantage / 100.0 * self.config.elevation_bonus_per_100m
    }

    fn terrain_concealment(&self, terrain: TerrainCellType) -> f64 {
        if !self.config.use_terrain_concealment {
            return 0.0;
        }
        let cover = &self.config.terrain;
        match terrain {
            TerrainCellType::Forest => cover.forest_concealment,
            TerrainCellType::Marsh => cover.marsh_concealment,
            TerrainCellType::Hills => cover.hills_concealment,
            _ => 0.0,
        }
    }

    fn viewer_penalty(&self, terrain: TerrainCellType) -> f64 {
        if !self.config.use_terrain_concealment {
            return 0.0;
        }
        let cover = &self.config.terrain;
        match terrain {
            TerrainCellType::Forest => cover.forest_viewer_penalty,
            TerrainCellType::Marsh => cover.marsh_viewer_penalty,
            _ => 0.0,
        }
    }

    /// Vision radius of a viewer standing at `position`.
    pub fn calculate_vision_range(
        &self,
        position: Coordinate,
        terrain: Option<&TerrainGrid>,
        base_range: f64,
        weather_modifier: f64,
    ) -> f64 {
        let Some(viewer) = terrain.and_then(|grid| grid.cell_at_position(position)) else {
            return base_range * weather_modifier;
        };

        let mut range = base_range;
        let elevation = f64::from(viewer.elevation);
        if self.config.use_elevation_bonus && elevation > self.config.elevation_bonus_threshold {
            range += elevation / 100.0 * self.config.elevation_bonus_per_100m;
        }
        range -= self.viewer_penalty(viewer.cell_type);
        range *= weather_modifier;
        range
            .min(self.config.maximum_range)
            .max(self.config.minimum_range)
    }

    pub fn calculate_los_modifier(
        &self,
        viewer: Coordinate,
        target: Coordinate,
        terrain: Option<&TerrainGrid>,
        base_range: f64,
        weather_modifier: f64,
    ) -> LosModifier {
        let mut modifier =
            LosModifier::new(base_range, weather_modifier, self.config.minimum_range);
        let Some(grid) = terrain else {
            return modifier;
        };
        let (Some(viewer_cell), Some(target_cell)) =
            (grid.cell_at_position(viewer), grid.cell_at_position(target))
        else {
            return modifier;
        };

        modifier.elevation_bonus = self.elevation_bonus(
            f64::from(viewer_cell.elevation),
            f64::from(target_cell.elevation),
        );
        modifier.terrain_penalty = self.viewer_penalty(viewer_cell.cell_type);
        modifier.forest_concealment = self.terrain_concealment(target_cell.cell_type);
        modifier
    }

    /// Line of sight using the configured default vision range.
    pub fn has_line_of_sight(
        &self,
        from: Coordinate,
        to: Coordinate,
        terrain: Option<&TerrainGrid>,
    ) -> bool {
        self.has_line_of_sight_with_range(from, to, terrain, self.config.default_vision_range)
    }

    pub fn has_line_of_sight_with_range(
        &self,
        from: Coordinate,
        to: Coordinate,
        terrain: Option<&TerrainGrid>,
        vision_range: f64,
    ) -> bool {
        self.line_of_sight(from, to, terrain, vision_range).visible
    }

    pub fn line_of_sight(
        &self,
        from: Coordinate,
        to: Coordinate,
        terrain: Option<&TerrainGrid>,
        vision_range: f64,
    ) -> LosOutcome {
        let modifier = self.calculate_los_modifier(from, to, terrain, vision_range, 1.0);
        self.resolve(from, to, terrain, modifier)
    }

    /// Line of sight for a viewer whose range already came out of
    /// `calculate_vision_range`. Only the target's concealment applies.
    pub fn line_of_sight_within(
        &self,
        from: Coordinate,
        to: Coordinate,
        terrain: Option<&TerrainGrid>,
        effective_range: f64,
    ) -> LosOutcome {
        let mut modifier = LosModifier::new(effective_range, 1.0, self.config.minimum_range);
        if let Some(target) = terrain.and_then(|grid| grid.cell_at_position(to)) {
            modifier.forest_concealment = self.terrain_concealment(target.cell_type);
        }
        self.resolve(from, to, terrain, modifier)
    }

    fn resolve(
        &self,
        from: Coordinate,
        to: Coordinate,
        terrain: Option<&TerrainGrid>,
        modifier: LosModifier,
    ) -> LosOutcome {
        let distance = from.distance(to);
        let mut outcome = LosOutcome {
            visible: false,
            distance,
            modifier,
            obstruction_factor: 0.0,
        };

        if distance > self.config.maximum_range || distance > modifier.effective_range() {
            return outcome;
        }

        if let Some(grid) = terrain {
            outcome.obstruction_factor = self.ray_cast(from, to, grid).obstruction_factor;
        }
        outcome.visible = outcome.obstruction_factor < self.config.blocking_threshold;
        outcome
    }

    fn signed_cell(grid: &TerrainGrid, position: Coordinate) -> (i32, i32) {
        let origin = grid.origin();
        (
            ((position.x - origin.x) / grid.cell_size()).floor() as i32,
            ((position.y - origin.y) / grid.cell_size()).floor() as i32,
        )
    }

    /// Walk the cells between `from` and `to` and measure obstruction.
    pub fn ray_cast(&self, from: Coordinate, to: Coordinate, terrain: &TerrainGrid) -> RayCast {
        let (x0, y0) = Self::signed_cell(terrain, from);
        let (x1, y1) = Self::signed_cell(terrain, to);
        let points = line_points(x0, y0, x1, y1);
        if points.len() <= 2 {
            return RayCast::default();
        }

        let viewer_elevation = terrain
            .cell_at_position(from)
            .map_or(0.0, |cell| f64::from(cell.elevation));

        let mut total = 0.0;
        let mut samples = 0usize;
        for &(x, y) in &points[1..points.len() - 1] {
            let (Ok(cx), Ok(cy)) = (u32::try_from(x), u32::try_from(y)) else {
                continue;
            };
            let Some(cell) = terrain.cell(cx, cy) else {
                continue;
            };
            samples += 1;
            let distance = from.distance(terrain.cell_center(cx, cy));
            match self.classify(cell, viewer_elevation, distance) {
                Obstruction::Opaque => {
                    return RayCast {
                        obstruction_factor: 1.0,
                        samples,
                    };
                }
                Obstruction::Partial => total += 1.0,
                Obstruction::Clear => {}
            }
        }

        RayCast {
            obstruction_factor: if samples > 0 { total / samples as f64 } else { 0.0 },
            samples,
        }
    }

    fn classify(&self, cell: &TerrainCell, viewer_elevation: f64, distance: f64) -> Obstruction {
        let elevation = f64::from(cell.elevation);
        match cell.cell_type {
            TerrainCellType::Mountain
                if elevation > viewer_elevation + self.config.mountain_block_height =>
            {
                Obstruction::Opaque
            }
            TerrainCellType::Hills
                if elevation > viewer_elevation + self.config.hills_block_height =>
            {
                Obstruction::Opaque
            }
            TerrainCellType::Forest if distance > self.config.forest_block_distance => {
                Obstruction::Partial
            }
            _ => Obstruction::Clear,
        }
    }

    /// Whether `cell` obstructs a viewer at `viewer_elevation` when it lies
    /// `distance_from_viewer` away.
    pub fn is_terrain_blocking(
        &self,
        cell: &TerrainCell,
        viewer_elevation: f64,
        distance_from_viewer: f64,
    ) -> bool {
        self.classify(cell, viewer_elevation, distance_from_viewer) != Obstruction::Clear
    }

    /// Terrain cells whose centres are within `vision_range` of `position`
    /// and in line of sight. `vision_range` is the viewer's effective range
    /// from `calculate_vision_range`.
    pub fn visible_cells(
        &self,
        position: Coordinate,
        vision_range: f64,
        terrain: &TerrainGrid,
    ) -> Vec<(u32, u32)> {
        let empty_grid = terrain.width() == 0 || terrain.height() == 0;
        if vision_range.is_nan() || vision_range <= 0.0 || empty_grid {
            return Vec::new();
        }
        let origin = terrain.origin();
        let cell_size = terrain.cell_size();
        let to_index = |value: f64, base: f64| ((value - base) / cell_size).floor();

        let max_x = f64::from(terrain.width() - 1);
        let max_y = f64::from(terrain.height() - 1);
        let lo_x = to_index(position.x - vision_range, origin.x).max(0.0);
        let hi_x = to_index(position.x + vision_range, origin.x).min(max_x);
        let lo_y = to_index(position.y - vision_range, origin.y).max(0.0);
        let hi_y = to_index(position.y + vision_range, origin.y).min(max_y);
        if lo_x > hi_x || lo_y > hi_y {
            return Vec::new();
        }

        let range_sq = vision_range * vision_range;
        let mut visible = Vec::new();
        for y in lo_y as u32..=hi_y as u32 {
            for x in lo_x as u32..=hi_x as u32 {
                let center = terrain.cell_center(x, y);
                if center.distance_squared(position) > range_sq {
                    continue;
                }
                let outcome =
                    self.line_of_sight_within(position, center, Some(terrain), vision_range);
                if outcome.visible {
                    visible.push((x, y));
                }
            }
        }
        tracing::debug!(
            target: "map_core::line_of_sight",
            x = position.x,
            y = position.y,
            vision_range,
            cells = visible.len(),
            "line_of_sight.visible_cells"
        );
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32) -> TerrainGrid {
        TerrainGrid::new(width, height, 1.0)
    }

    fn calculator() -> LineOfSightCalculator {
        LineOfSightCalculator::new(LineOfSightConfig::default())
    }

    #[test]
    fn line_points_include_both_ends() {
        assert_eq!(line_points(0, 0, 3, 0), vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
        assert_eq!(line_points(2, 2, 2, 2), vec![(2, 2)]);
        let diagonal = line_points(0, 0, -3, 3);
        assert_eq!(diagonal.first(), Some(&(0, 0)));
        assert_eq!(diagonal.last(), Some(&(-3, 3)));
        assert_eq!(diagonal.len(), 4);
    }

    #[test]
    fn flat_terrain_is_visible_within_range() {
        let grid = flat(100, 10);
        let outcome = calculator().line_of_sight(
            Coordinate::new(5.5, 5.5),
            Coordinate::new(55.5, 5.5),
            Some(&grid),
            100.0,
        );
        assert!(outcome.visible);
        assert!((outcome.distance - 50.0).abs() < 1e-9);
        assert!(outcome.obstruction_factor.abs() < 1e-9);
    }

    #[test]
    fn mountain_between_blocks() {
        let mut grid = flat(100, 10);
        grid.fill_region(30, 0, 30, 9, TerrainCell::new(TerrainCellType::Mountain, 200.0));
        let calc = calculator();
        let from = Coordinate::new(5.5, 5.5);
        let to = Coordinate::new(55.5, 5.5);
        assert!(!calc.has_line_of_sight_with_range(from, to, Some(&grid), 100.0));
        assert_eq!(calc.ray_cast(from, to, &grid).obstruction_factor, 1.0);
    }

    #[test]
    fn elevated_viewer_sees_over_lower_mountain() {
        let mut grid = flat(100, 10);
        grid.fill_region(30, 0, 30, 9, TerrainCell::new(TerrainCellType::Mountain, 200.0));
        grid.set_cell(5, 5, TerrainCell::new(TerrainCellType::Mountain, 300.0));
        let calc = calculator();
        assert!(calc.has_line_of_sight_with_range(
            Coordinate::new(5.5, 5.5),
            Coordinate::new(55.5, 5.5),
            Some(&grid),
            100.0,
        ));
    }

    #[test]
    fn hills_block_only_when_much_higher() {
        let calc = calculator();
        let low = TerrainCell::new(TerrainCellType::Hills, 80.0);
        let high = TerrainCell::new(TerrainCellType::Hills, 150.0);
        assert!(!calc.is_terrain_blocking(&low, 0.0, 10.0));
        assert!(calc.is_terrain_blocking(&high, 0.0, 10.0));
        assert!(!calc.is_terrain_blocking(&high, 60.0, 10.0));
    }

    #[test]
    fn distant_forest_thickens_the_ray_without_blocking() {
        let mut grid = flat(100, 10);
        grid.fill_region(40, 0, 44, 9, TerrainCell::new(TerrainCellType::Forest, 0.0));
        let calc = calculator();
        let from = Coordinate::new(5.5, 5.5);
        let to = Coordinate::new(55.5, 5.5);
        let ray = calc.ray_cast(from, to, &grid);
        assert_eq!(ray.samples, 49);
        assert!((ray.obstruction_factor - 5.0 / 49.0).abs() < 1e-9);
        assert!(calc.has_line_of_sight_with_range(from, to, Some(&grid), 100.0));

        let near_forest = TerrainCell::new(TerrainCellType::Forest, 0.0);
        assert!(!calc.is_terrain_blocking(&near_forest, 0.0, 20.0));
    }

    #[test]
    fn out_of_range_targets_are_hidden() {
        let grid = flat(100, 10);
        let calc = calculator();
        let from = Coordinate::new(0.5, 0.5);
        // Default range is 50.
        assert!(calc.has_line_of_sight(from, Coordinate::new(40.5, 0.5), Some(&grid)));
        assert!(!calc.has_line_of_sight(from, Coordinate::new(60.5, 0.5), Some(&grid)));
        // Maximum range applies even with a huge vision range.
        assert!(!calc.has_line_of_sight_with_range(
            from,
            Coordinate::new(600.0, 0.5),
            None,
            10_000.0
        ));
    }

    #[test]
    fn vision_range_accounts_for_elevation_cover_and_weather() {
        let calc = calculator();
        let mut grid = flat(4, 1);
        grid.set_cell(0, 0, TerrainCell::new(TerrainCellType::Plains, 200.0));
        grid.set_cell(1, 0, TerrainCell::new(TerrainCellType::Forest, 0.0));
        grid.set_cell(2, 0, TerrainCell::new(TerrainCellType::Plains, 90.0));

        let at = |x: f64| Coordinate::new(x, 0.5);
        assert_eq!(calc.calculate_vision_range(at(0.5), Some(&grid), 50.0, 1.0), 80.0);
        assert_eq!(calc.calculate_vision_range(at(1.5), Some(&grid), 50.0, 1.0), 35.0);
        assert_eq!(calc.calculate_vision_range(at(1.5), Some(&grid), 50.0, 0.5), 17.5);
        // Below the threshold there is no bonus.
        assert_eq!(calc.calculate_vision_range(at(2.5), Some(&grid), 50.0, 1.0), 50.0);
        assert_eq!(calc.calculate_vision_range(at(3.5), Some(&grid), 5.0, 1.0), 10.0);
        assert_eq!(calc.calculate_vision_range(at(3.5), Some(&grid), 1_000.0, 1.0), 500.0);
        assert_eq!(calc.calculate_vision_range(at(3.5), None, 40.0, 0.5), 20.0);
    }

    #[test]
    fn modifier_combines_elevation_and_concealment() {
        let calc = calculator();
        let mut grid = flat(2, 1);
        grid.set_cell(0, 0, TerrainCell::new(TerrainCellType::Plains, 300.0));
        grid.set_cell(1, 0, TerrainCell::new(TerrainCellType::Forest, 100.0));

        let modifier = calc.calculate_los_modifier(
            Coordinate::new(0.5, 0.5),
            Coordinate::new(1.5, 0.5),
            Some(&grid),
            50.0,
            1.0,
        );
        assert_eq!(modifier.elevation_bonus, 30.0);
        assert_eq!(modifier.terrain_penalty, 0.0);
        assert_eq!(modifier.forest_concealment, 20.0);
        assert_eq!(modifier.effective_range(), 60.0);

        let weak = LosModifier::new(5.0, 1.0, 10.0);
        assert_eq!(weak.effective_range(), 10.0);
    }

    #[test]
    fn detection_range_has_a_floor() {
        let scout = DetectionModifier {
            stealth_penalty: 30.0,
            ..DetectionModifier::default()
        };
        assert_eq!(scout.detection_range(), 20.0);
        let army = DetectionModifier {
            size_modifier: 25.0,
            movement_penalty: 10.0,
            ..DetectionModifier::default()
        };
        assert_eq!(army.detection_range(), 85.0);
        let ghost = DetectionModifier {
            stealth_penalty: 100.0,
            ..DetectionModifier::default()
        };
        assert_eq!(ghost.detection_range(), 10.0);
    }

    #[test]
    fn visible_cells_stop_at_a_mountain_wall() {
        let mut grid = flat(20, 20);
        grid.fill_region(12, 0, 12, 19, TerrainCell::new(TerrainCellType::Mountain, 500.0));
        let calc = calculator();
        let position = Coordinate::new(10.0, 10.0);
        let visible = calc.visible_cells(position, 5.0, &grid);

        assert!(visible.contains(&(9, 10)));
        assert!(visible.contains(&(12, 10)));
        assert!(!visible.contains(&(13, 10)));
        assert!(visible.iter().all(|&(x, _)| x <= 12));
        assert!(visible
            .iter()
            .all(|&(x, y)| grid.cell_center(x, y).distance(position) <= 5.0));
    }

    #[test]
    fn visible_cells_on_open_ground_match_the_circle() {
        let grid = flat(20, 20);
        let position = Coordinate::new(10.0, 10.0);
        let visible = calculator().visible_cells(position, 3.0, &grid);
        let expected = (0..20u32)
            .flat_map(|x| (0..20u32).map(move |y| (x, y)))
            .filter(|&(x, y)| grid.cell_center(x, y).distance(position) <= 3.0)
            .count();
        assert_eq!(visible.len(), expected);
        assert!(calculator().visible_cells(position, 0.0, &grid).is_empty());
    }

    #[test]
    fn visible_cells_use_the_viewer_range_as_given() {
        let mut grid = TerrainGrid::new(200, 200, 1.0);
        grid.set_cell(100, 100, TerrainCell::new(TerrainCellType::Forest, 0.0));
        let calc = calculator();
        let position = Coordinate::new(100.5, 100.5);
        let range = calc.calculate_vision_range(position, Some(&grid), 50.0, 1.0);
        assert_eq!(range, 35.0);

        let visible = calc.visible_cells(position, range, &grid);
        let farthest = visible
            .iter()
            .map(|&(x, y)| grid.cell_center(x, y).distance(position))
            .fold(0.0_f64, f64::max);
        assert!(farthest > range - 1.0, "reveal stopped at {farthest}");
        assert!(farthest <= range);
        assert!(visible.contains(&(134, 100)));
    }

    #[test]
    fn effective_range_still_honours_target_concealment() {
        let mut grid = flat(40, 1);
        grid.set_cell(30, 0, TerrainCell::new(TerrainCellType::Forest, 0.0));
        let calc = calculator();
        let from = Coordinate::new(0.5, 0.5);

        let forest = calc.line_of_sight_within(from, Coordinate::new(30.5, 0.5), Some(&grid), 35.0);
        assert_eq!(forest.modifier.forest_concealment, 20.0);
        assert_eq!(forest.modifier.terrain_penalty, 0.0);
        assert!(!forest.visible);
        let open = calc.line_of_sight_within(from, Coordinate::new(31.5, 0.5), Some(&grid), 35.0);
        assert!(open.visible);
    }
}
