//! Province records as supplied by the map data layer, plus the map-build
//! step that derives symmetric neighbour lists from their boundaries.

use std::{fs, io, path::Path, path::PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::boundary::{check_adjacency, fix_boundary_winding, is_valid_boundary};
use crate::geometry::{bounding_box_of, polygon_centroid, BoundingBox, Coordinate};

pub type ProvinceId = u32;

/// One entry of a province's neighbour list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeighborBorder {
    pub neighbor_id: ProvinceId,
    pub border_length: f64,
}

impl NeighborBorder {
    pub fn new(neighbor_id: ProvinceId, border_length: f64) -> Self {
        Self {
            neighbor_id,
            border_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceRecord {
    pub id: ProvinceId,
    pub name: String,
    #[serde(default)]
    pub owner_id: u32,
    pub boundary: Vec<Coordinate>,
    #[serde(default)]
    pub center: Coordinate,
    #[serde(default)]
    pub bounds: BoundingBox,
    #[serde(default)]
    pub detailed_neighbors: Vec<NeighborBorder>,
}

impl ProvinceRecord {
    /// Build a record with a counter-clockwise boundary and derived centre and
    /// bounds. Degenerate boundaries are kept but logged.
    pub fn new(
        id: ProvinceId,
        name: impl Into<String>,
        owner_id: u32,
        boundary: Vec<Coordinate>,
    ) -> Self {
        let mut record = Self {
            id,
            name: name.into(),
            owner_id,
            boundary,
            center: Coordinate::default(),
            bounds: BoundingBox::default(),
            detailed_neighbors: Vec::new(),
        };
        record.normalize();
        record
    }

    /// Re-derive winding, centre and bounds from the boundary.
    pub fn normalize(&mut self) {
        if !is_valid_boundary(&self.boundary) {
            tracing::warn!(
                target: "map_core::province",
                province = self.id,
                name = %self.name,
                vertices = self.boundary.len(),
                "province.degenerate_boundary"
            );
        }
        fix_boundary_winding(&mut self.boundary);
        self.center = polygon_centroid(&self.boundary);
        self.bounds = bounding_box_of(&self.boundary);
    }

    pub fn with_neighbors(mut self, neighbors: Vec<NeighborBorder>) -> Self {
        self.detailed_neighbors = neighbors;
        self
    }
}

/// Replace every province's neighbour list with the adjacencies found by
/// comparing boundaries pairwise. Both directions of each adjacency are
/// written with the same border length, so the result validates as a
/// symmetric graph. Returns the number of adjacent pairs.
pub fn detect_adjacencies(provinces: &mut [ProvinceRecord], tolerance: f64) -> usize {
    let pairs: Vec<(usize, usize, f64)> = {
        let snapshot: &[ProvinceRecord] = provinces;
        let count = snapshot.len();
        (0..count)
            .into_par_iter()
            .flat_map_iter(|i| {
                ((i + 1)..count).filter_map(move |j| {
                    let (a, b) = (&snapshot[i], &snapshot[j]);
                    if a.id == b.id
                        || !a.bounds.expanded(tolerance).intersects(&b.bounds)
                    {
                        return None;
                    }
                    let check = check_adjacency(&a.boundary, &b.boundary, tolerance);
                    check.are_neighbors.then_some((i, j, check.border_length))
                })
            })
            .collect()
    };

    for province in provinces.iter_mut() {
        province.detailed_neighbors.clear();
    }
    for &(i, j, border_length) in &pairs {
        let (id_i, id_j) = (provinces[i].id, provinces[j].id);
        provinces[i]
            .detailed_neighbors
            .push(NeighborBorder::new(id_j, border_length));
        provinces[j]
            .detailed_neighbors
            .push(NeighborBorder::new(id_i, border_length));
    }
    for province in provinces.iter_mut() {
        province.detailed_neighbors.sort_by_key(|n| n.neighbor_id);
    }

    tracing::info!(
        target: "map_core::province",
        provinces = provinces.len(),
        adjacencies = pairs.len(),
        tolerance,
        "province.adjacency_detected"
    );
    pairs.len()
}

#[derive(Debug, Error)]
pub enum ProvinceLoadError {
    #[error("failed to parse province list: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read province list from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Parse a JSON array of province records and normalize each one.
pub fn provinces_from_json_str(json: &str) -> Result<Vec<ProvinceRecord>, ProvinceLoadError> {
    let mut provinces: Vec<ProvinceRecord> = serde_json::from_str(json)?;
    provinces.iter_mut().for_each(ProvinceRecord::normalize);
    Ok(provinces)
}

pub fn load_provinces(path: &Path) -> Result<Vec<ProvinceRecord>, ProvinceLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ProvinceLoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    provinces_from_json_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(id: ProvinceId, x: f64, y: f64, size: f64) -> ProvinceRecord {
        ProvinceRecord::new(
            id,
            format!("P{id}"),
            0,
            vec![
                Coordinate::new(x, y),
                Coordinate::new(x + size, y),
                Coordinate::new(x + size, y + size),
                Coordinate::new(x, y + size),
            ],
        )
    }

    #[test]
    fn new_record_derives_center_and_bounds() {
        let record = ProvinceRecord::new(
            7,
            "Clockwise",
            3,
            vec![
                Coordinate::new(0.0, 0.0),
                Coordinate::new(0.0, 10.0),
                Coordinate::new(10.0, 10.0),
                Coordinate::new(10.0, 0.0),
            ],
        );
        assert!(crate::geometry::signed_area(&record.boundary) > 0.0);
        assert_eq!(record.center, Coordinate::new(5.0, 5.0));
        assert_eq!(record.bounds, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn adjacency_detection_is_symmetric() {
        // Two by two block plus one detached province.
        let mut provinces = vec![
            square(1, 0.0, 0.0, 10.0),
            square(2, 10.0, 0.0, 10.0),
            square(3, 0.0, 10.0, 10.0),
            square(4, 10.0, 10.0, 10.0),
            square(5, 100.0, 100.0, 10.0),
        ];
        let pairs = detect_adjacencies(&mut provinces, 0.001);
        // Four edge-sharing pairs and two diagonal corner touches.
        assert_eq!(pairs, 6);

        let p1 = &provinces[0];
        let ids: Vec<_> = p1.detailed_neighbors.iter().map(|n| n.neighbor_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert!((p1.detailed_neighbors[0].border_length - 10.0).abs() < 0.01);
        assert!(p1.detailed_neighbors[2].border_length.abs() < 0.01);

        for province in &provinces {
            for neighbor in &province.detailed_neighbors {
                let other = provinces
                    .iter()
                    .find(|p| p.id == neighbor.neighbor_id)
                    .expect("neighbor exists");
                assert!(other
                    .detailed_neighbors
                    .iter()
                    .any(|n| n.neighbor_id == province.id
                        && (n.border_length - neighbor.border_length).abs() < 1e-9));
            }
        }
        assert!(provinces[4].detailed_neighbors.is_empty());
    }

    #[test]
    fn json_records_are_normalized() {
        let json = r#"[
            {"id": 1, "name": "North", "boundary": [
                {"x": 0.0, "y": 0.0}, {"x": 0.0, "y": 4.0},
                {"x": 4.0, "y": 4.0}, {"x": 4.0, "y": 0.0}
            ]}
        ]"#;
        let provinces = provinces_from_json_str(json).expect("valid json");
        assert_eq!(provinces.len(), 1);
        assert_eq!(provinces[0].center, Coordinate::new(2.0, 2.0));
        assert_eq!(provinces[0].bounds, BoundingBox::new(0.0, 0.0, 4.0, 4.0));
        assert!(provinces[0].detailed_neighbors.is_empty());
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = provinces_from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ProvinceLoadError::Parse(_)));
    }
}
