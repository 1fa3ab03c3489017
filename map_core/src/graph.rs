//! Province adjacency graph.
//!
//! Provinces live in a flat arena indexed through an id map; neighbour
//! references are plain ids resolved through that map, so the cyclic
//! adjacency structure needs no shared ownership.

use std::collections::HashMap;

use bevy_ecs::prelude::Resource;

use crate::province::{NeighborBorder, ProvinceId, ProvinceRecord};

/// Border lengths stored on the two sides of an adjacency must agree within
/// this tolerance.
pub const BORDER_LENGTH_EPSILON: f64 = 0.01;

/// A record dropped during [`ProvinceGraph::build`] because its id was
/// already taken by an earlier record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedProvince {
    pub id: ProvinceId,
    pub name: String,
    /// Position of the rejected record in the input list.
    pub position: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub accepted: usize,
    pub rejected: Vec<RejectedProvince>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A single integrity problem found by [`ProvinceGraph::validation_issues`].
#[derive(Debug, Clone, PartialEq)]
pub enum GraphIssue {
    UnknownNeighbor {
        province: ProvinceId,
        neighbor: ProvinceId,
    },
    MissingReverse {
        province: ProvinceId,
        neighbor: ProvinceId,
    },
    BorderLengthMismatch {
        province: ProvinceId,
        neighbor: ProvinceId,
        forward: f64,
        reverse: f64,
    },
}

#[derive(Resource, Debug, Clone, Default)]
pub struct ProvinceGraph {
    provinces: Vec<ProvinceRecord>,
    index: HashMap<ProvinceId, usize>,
}

impl ProvinceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a borrowed province list. The first record with a given
    /// id wins; later duplicates are logged and listed in the report.
    pub fn build(&mut self, provinces: &[ProvinceRecord]) -> BuildReport {
        self.build_from(provinces.iter().cloned())
    }

    /// Rebuild from an owned province list without cloning. Duplicate
    /// handling is identical to [`Self::build`].
    pub fn build_owned(&mut self, provinces: Vec<ProvinceRecord>) -> BuildReport {
        self.build_from(provinces)
    }

    fn build_from(&mut self, provinces: impl IntoIterator<Item = ProvinceRecord>) -> BuildReport {
        self.clear();
        let mut report = BuildReport::default();

        for (position, province) in provinces.into_iter().enumerate() {
            if self.index.contains_key(&province.id) {
                tracing::error!(
                    target: "map_core::graph",
                    province = province.id,
                    name = %province.name,
                    position,
                    "province_graph.duplicate_rejected"
                );
                report.rejected.push(RejectedProvince {
                    id: province.id,
                    name: province.name,
                    position,
                });
                continue;
            }
            self.index.insert(province.id, self.provinces.len());
            self.provinces.push(province);
        }

        report.accepted = self.provinces.len();
        tracing::info!(
            target: "map_core::graph",
            accepted = report.accepted,
            rejected = report.rejected.len(),
            "province_graph.built"
        );
        report
    }

    pub fn province(&self, id: ProvinceId) -> Option<&ProvinceRecord> {
        self.index.get(&id).map(|&idx| &self.provinces[idx])
    }

    /// Mutable access for the owning store. Changing `id` through this
    /// reference desynchronizes the index; rebuild instead.
    pub fn province_mut(&mut self, id: ProvinceId) -> Option<&mut ProvinceRecord> {
        let idx = *self.index.get(&id)?;
        self.provinces.get_mut(idx)
    }

    pub fn has_province(&self, id: ProvinceId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn provinces(&self) -> &[ProvinceRecord] {
        &self.provinces
    }

    pub fn len(&self) -> usize {
        self.provinces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty()
    }

    /// Neighbours of `id`; an empty slice for unknown ids.
    pub fn neighbors(&self, id: ProvinceId) -> &[NeighborBorder] {
        self.province(id)
            .map(|p| p.detailed_neighbors.as_slice())
            .unwrap_or(&[])
    }

    fn find_edge(&self, a: ProvinceId, b: ProvinceId) -> Option<&NeighborBorder> {
        let (from_a, from_b) = (self.province(a)?, self.province(b)?);
        if from_a.detailed_neighbors.len() <= from_b.detailed_neighbors.len() {
            from_a.detailed_neighbors.iter().find(|n| n.neighbor_id == b)
        } else {
            from_b.detailed_neighbors.iter().find(|n| n.neighbor_id == a)
        }
    }

    /// Scans whichever side has the shorter neighbour list, so the answer
    /// assumes a symmetric graph (see [`Self::validate`]).
    pub fn are_neighbors(&self, a: ProvinceId, b: ProvinceId) -> bool {
        self.find_edge(a, b).is_some()
    }

    /// Shared border length, or 0.0 when the provinces are not adjacent.
    pub fn border_length(&self, a: ProvinceId, b: ProvinceId) -> f64 {
        self.find_edge(a, b).map_or(0.0, |n| n.border_length)
    }

    /// Sum of neighbour list lengths; each adjacency counts once per side.
    pub fn total_adjacencies(&self) -> usize {
        self.provinces
            .iter()
            .map(|p| p.detailed_neighbors.len())
            .sum()
    }

    pub fn average_neighbors(&self) -> f64 {
        if self.provinces.is_empty() {
            return 0.0;
        }
        self.total_adjacencies() as f64 / self.provinces.len() as f64
    }

    /// Province with the longest neighbour list; the earliest wins ties.
    pub fn most_connected_province(&self) -> Option<ProvinceId> {
        self.provinces
            .iter()
            .fold(None::<&ProvinceRecord>, |best, p| match best {
                Some(b) if b.detailed_neighbors.len() >= p.detailed_neighbors.len() => Some(b),
                _ => Some(p),
            })
            .map(|p| p.id)
    }

    pub fn validation_issues(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();
        for province in &self.provinces {
            for edge in &province.detailed_neighbors {
                let Some(neighbor) = self.province(edge.neighbor_id) else {
                    issues.push(GraphIssue::UnknownNeighbor {
                        province: province.id,
                        neighbor: edge.neighbor_id,
                    });
                    continue;
                };
                match neighbor
                    .detailed_neighbors
                    .iter()
                    .find(|n| n.neighbor_id == province.id)
                {
                    None => issues.push(GraphIssue::MissingReverse {
                        province: province.id,
                        neighbor: edge.neighbor_id,
                    }),
                    Some(reverse)
                        if (reverse.border_length - edge.border_length).abs()
                            > BORDER_LENGTH_EPSILON =>
                    {
                        issues.push(GraphIssue::BorderLengthMismatch {
                            province: province.id,
                            neighbor: edge.neighbor_id,
                            forward: edge.border_length,
                            reverse: reverse.border_length,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        issues
    }

    /// Check that every adjacency is known, bidirectional and agrees on its
    /// border length. Problems are logged; nothing is repaired.
    pub fn validate(&self) -> bool {
        let issues = self.validation_issues();
        for issue in &issues {
            match *issue {
                GraphIssue::UnknownNeighbor { province, neighbor } => tracing::error!(
                    target: "map_core::graph",
                    province,
                    neighbor,
                    "province_graph.unknown_neighbor"
                ),
                GraphIssue::MissingReverse { province, neighbor } => tracing::error!(
                    target: "map_core::graph",
                    province,
                    neighbor,
                    "province_graph.missing_reverse_edge"
                ),
                GraphIssue::BorderLengthMismatch {
                    province,
                    neighbor,
                    forward,
                    reverse,
                } => tracing::warn!(
                    target: "map_core::graph",
                    province,
                    neighbor,
                    forward,
                    reverse,
                    "province_graph.border_length_mismatch"
                ),
            }
        }
        issues.is_empty()
    }

    pub fn clear(&mut self) {
        self.provinces.clear();
        self.index.clear();
    }
}
