//! Terrain raster consulted by line of sight and cached into explored cells.

use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Coordinate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TerrainCellType {
    Plains = 0,
    Forest = 1,
    Mountain = 2,
    Water = 3,
    Hills = 4,
    Marsh = 5,
    Desert = 6,
    Tundra = 7,
    Beach = 8,
    Snow = 9,
    #[default]
    Unknown = 255,
}

impl TerrainCellType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Plains,
            1 => Self::Forest,
            2 => Self::Mountain,
            3 => Self::Water,
            4 => Self::Hills,
            5 => Self::Marsh,
            6 => Self::Desert,
            7 => Self::Tundra,
            8 => Self::Beach,
            9 => Self::Snow,
            _ => Self::Unknown,
        }
    }

    /// Case-insensitive lookup by name; anything unrecognised is `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "plains" => Self::Plains,
            "forest" => Self::Forest,
            "mountain" | "mountains" => Self::Mountain,
            "water" => Self::Water,
            "hills" => Self::Hills,
            "marsh" => Self::Marsh,
            "desert" => Self::Desert,
            "tundra" => Self::Tundra,
            "beach" => Self::Beach,
            "snow" => Self::Snow,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TerrainCell {
    pub cell_type: TerrainCellType,
    /// Metres.
    pub elevation: f32,
}

impl TerrainCell {
    pub const fn new(cell_type: TerrainCellType, elevation: f32) -> Self {
        Self {
            cell_type,
            elevation,
        }
    }

    pub const fn plains() -> Self {
        Self::new(TerrainCellType::Plains, 0.0)
    }
}

/// Row-major terrain raster anchored at `origin`.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct TerrainGrid {
    width: u32,
    height: u32,
    cell_size: f64,
    origin: Coordinate,
    cells: Vec<TerrainCell>,
}

impl TerrainGrid {
    /// Flat plains at elevation 0 with the origin at (0, 0).
    pub fn new(width: u32, height: u32, cell_size: f64) -> Self {
        Self::filled(width, height, cell_size, TerrainCell::plains())
    }

    pub fn filled(width: u32, height: u32, cell_size: f64, cell: TerrainCell) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 1.0 };
        Self {
            width,
            height,
            cell_size,
            origin: Coordinate::default(),
            cells: vec![cell; width as usize * height as usize],
        }
    }

    pub fn with_origin(mut self, origin: Coordinate) -> Self {
        self.origin = origin;
        self
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

    pub fn cells(&self) -> &[TerrainCell] {
        &self.cells
    }

    pub fn index(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    pub fn cell(&self, x: u32, y: u32) -> Option<&TerrainCell> {
        self.index(x, y).and_then(|idx| self.cells.get(idx))
    }

    pub fn set_cell(&mut self, x: u32, y: u32, cell: TerrainCell) -> bool {
        match self.index(x, y).and_then(|idx| self.cells.get_mut(idx)) {
            Some(slot) => {
                *slot = cell;
                true
            }
            None => false,
        }
    }

    /// Set every cell in the inclusive index rectangle, clipped to the grid.
    pub fn fill_region(&mut self, x0: u32, y0: u32, x1: u32, y1: u32, cell: TerrainCell) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (x0, x1) = (x0.min(x1), x0.max(x1).min(self.width - 1));
        let (y0, y1) = (y0.min(y1), y0.max(y1).min(self.height - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set_cell(x, y, cell);
            }
        }
    }

    /// Cell indices containing a world position, if inside the grid.
    pub fn world_to_cell(&self, position: Coordinate) -> Option<(u32, u32)> {
        let fx = ((position.x - self.origin.x) / self.cell_size).floor();
        let fy = ((position.y - self.origin.y) / self.cell_size).floor();
        if fx < 0.0 || fy < 0.0 || fx >= f64::from(self.width) || fy >= f64::from(self.height) {
            return None;
        }
        Some((fx as u32, fy as u32))
    }

    pub fn cell_at_position(&self, position: Coordinate) -> Option<&TerrainCell> {
        self.world_to_cell(position)
            .and_then(|(x, y)| self.cell(x, y))
    }

    /// World position of a cell's lower-left corner.
    pub fn cell_world_position(&self, x: u32, y: u32) -> Coordinate {
        Coordinate::new(
            self.origin.x + f64::from(x) * self.cell_size,
            self.origin.y + f64::from(y) * self.cell_size,
        )
    }

    pub fn cell_center(&self, x: u32, y: u32) -> Coordinate {
        Coordinate::new(
            self.origin.x + (f64::from(x) + 0.5) * self.cell_size,
            self.origin.y + (f64::from(y) + 0.5) * self.cell_size,
        )
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + f64::from(self.width) * self.cell_size,
            self.origin.y + f64::from(self.height) * self.cell_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terrain_type_round_trips_through_u8_and_name() {
        for terrain in [
            TerrainCellType::Plains,
            TerrainCellType::Forest,
            TerrainCellType::Mountain,
            TerrainCellType::Snow,
            TerrainCellType::Unknown,
        ] {
            assert_eq!(TerrainCellType::from_u8(terrain.as_u8()), terrain);
        }
        assert_eq!(TerrainCellType::from_name(" Marsh "), TerrainCellType::Marsh);
        assert_eq!(TerrainCellType::from_name("lava"), TerrainCellType::Unknown);
    }

    #[test]
    fn world_positions_map_to_cells() {
        let grid = TerrainGrid::new(10, 5, 2.0).with_origin(Coordinate::new(-10.0, 0.0));
        assert_eq!(grid.world_to_cell(Coordinate::new(-10.0, 0.0)), Some((0, 0)));
        assert_eq!(grid.world_to_cell(Coordinate::new(9.9, 9.9)), Some((9, 4)));
        assert_eq!(grid.world_to_cell(Coordinate::new(10.0, 0.0)), None);
        assert_eq!(grid.world_to_cell(Coordinate::new(-10.1, 0.0)), None);
        assert_eq!(grid.cell_center(0, 0), Coordinate::new(-9.0, 1.0));
        assert_eq!(grid.bounds(), BoundingBox::new(-10.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn fill_region_clips_to_grid() {
        let mut grid = TerrainGrid::new(4, 4, 1.0);
        let hill = TerrainCell::new(TerrainCellType::Hills, 120.0);
        grid.fill_region(2, 2, 10, 10, hill);
        assert_eq!(grid.cell(3, 3), Some(&hill));
        assert_eq!(grid.cell(1, 1), Some(&TerrainCell::plains()));
        assert!(!grid.set_cell(4, 0, hill));
        assert_eq!(grid.cell_at_position(Coordinate::new(2.5, 2.5)), Some(&hill));
    }
}
