//! Province boundary validation and polygon-to-polygon adjacency detection.
//!
//! Adjacency works on edge pairs: a bounding-box pre-check, cross-product
//! sign tests for proper crossings, and point-on-segment tests within a
//! caller tolerance for touching and collinear cases. Every comparison is
//! O(|A|·|B|) and intended for map-build time, not per tick.

use serde::{Deserialize, Serialize};

use crate::geometry::{
    bounding_box_of, cross, distance_to_segment, signed_area, simplify_polygon, BoundingBox,
    Coordinate, EPSILON,
};

pub fn is_valid_boundary(boundary: &[Coordinate]) -> bool {
    boundary.len() >= 3
}

/// Reverse clockwise rings so every boundary is counter-clockwise.
/// Returns true when the ring was reversed.
pub fn fix_boundary_winding(boundary: &mut [Coordinate]) -> bool {
    if signed_area(boundary) < 0.0 {
        boundary.reverse();
        true
    } else {
        false
    }
}

/// Drop consecutive vertices closer than `tolerance`, including a closing
/// vertex that repeats the first one.
pub fn remove_duplicate_points(boundary: &mut Vec<Coordinate>, tolerance: f64) {
    boundary.dedup_by(|current, previous| current.distance(*previous) <= tolerance);
    while boundary.len() > 1 {
        let (first, last) = (boundary[0], boundary[boundary.len() - 1]);
        if first.distance(last) > tolerance {
            break;
        }
        boundary.pop();
    }
}

/// Result of a full adjacency check between two rings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AdjacencyCheck {
    pub are_neighbors: bool,
    /// Total length of collinear edge overlap. Crossings and single-point
    /// touches contribute nothing.
    pub border_length: f64,
}

/// How two edges meet.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EdgeContact {
    Point(Coordinate),
    Overlap(Coordinate, Coordinate),
}

fn edges(ring: &[Coordinate]) -> impl Iterator<Item = (Coordinate, Coordinate)> + '_ {
    ring.iter()
        .enumerate()
        .map(move |(i, start)| (*start, ring[(i + 1) % ring.len()]))
}

fn segment_bounds(a: Coordinate, b: Coordinate) -> BoundingBox {
    bounding_box_of(&[a, b])
}

#[inline]
fn opposite_signs(p: f64, q: f64) -> bool {
    (p > EPSILON && q < -EPSILON) || (p < -EPSILON && q > EPSILON)
}

/// True when the segments cross or come within `tolerance` of each other.
fn segments_touch(
    a1: Coordinate,
    a2: Coordinate,
    b1: Coordinate,
    b2: Coordinate,
    tolerance: f64,
) -> bool {
    if !segment_bounds(a1, a2)
        .expanded(tolerance)
        .intersects(&segment_bounds(b1, b2))
    {
        return false;
    }

    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);
    if opposite_signs(d1, d2) && opposite_signs(d3, d4) {
        return true;
    }

    // Touching and collinear overlap produce zero cross products, which the
    // sign test above cannot see.
    distance_to_segment(a1, b1, b2) <= tolerance
        || distance_to_segment(a2, b1, b2) <= tolerance
        || distance_to_segment(b1, a1, a2) <= tolerance
        || distance_to_segment(b2, a1, a2) <= tolerance
}

fn line_intersection(
    a1: Coordinate,
    a2: Coordinate,
    b1: Coordinate,
    b2: Coordinate,
) -> Option<Coordinate> {
    let r = (a2.x - a1.x, a2.y - a1.y);
    let s = (b2.x - b1.x, b2.y - b1.y);
    let denom = r.0 * s.1 - r.1 * s.0;
    if denom.abs() < EPSILON {
        return None;
    }
    let qp = (b1.x - a1.x, b1.y - a1.y);
    let t = (qp.0 * s.1 - qp.1 * s.0) / denom;
    let u = (qp.0 * r.1 - qp.1 * r.0) / denom;
    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(Coordinate::new(a1.x + t * r.0, a1.y + t * r.1))
    } else {
        None
    }
}

fn edge_contact(
    a1: Coordinate,
    a2: Coordinate,
    b1: Coordinate,
    b2: Coordinate,
    tolerance: f64,
) -> Option<EdgeContact> {
    if !segments_touch(a1, a2, b1, b2, tolerance) {
        return None;
    }

    // Collinear overlap: project the shorter segment onto the longer one.
    let (long_a, long_b, short_a, short_b) = if a1.distance_squared(a2) >= b1.distance_squared(b2)
    {
        (a1, a2, b1, b2)
    } else {
        (b1, b2, a1, a2)
    };
    let length = long_a.distance(long_b);
    if length > EPSILON {
        let off_line = |p: Coordinate| cross(long_a, long_b, p).abs() / length;
        if off_line(short_a) <= tolerance && off_line(short_b) <= tolerance {
            let dir = ((long_b.x - long_a.x) / length, (long_b.y - long_a.y) / length);
            let project = |p: Coordinate| (p.x - long_a.x) * dir.0 + (p.y - long_a.y) * dir.1;
            let at = |t: f64| Coordinate::new(long_a.x + dir.0 * t, long_a.y + dir.1 * t);

            let (s0, s1) = (project(short_a), project(short_b));
            let start = s0.min(s1).max(0.0);
            let end = s0.max(s1).min(length);
            if end - start > tolerance {
                return Some(EdgeContact::Overlap(at(start), at(end)));
            }
            if end - start >= -tolerance {
                return Some(EdgeContact::Point(at(((start + end) * 0.5).clamp(0.0, length))));
            }
        }
    }

    if let Some(point) = line_intersection(a1, a2, b1, b2) {
        return Some(EdgeContact::Point(point));
    }

    [(a1, b1, b2), (a2, b1, b2), (b1, a1, a2), (b2, a1, a2)]
        .into_iter()
        .find(|(p, s, e)| distance_to_segment(*p, *s, *e) <= tolerance)
        .map(|(p, _, _)| EdgeContact::Point(p))
}

/// True as soon as any edge of `a` crosses or touches any edge of `b`
/// within `tolerance`.
pub fn are_neighbors(a: &[Coordinate], b: &[Coordinate], tolerance: f64) -> bool {
    if !is_valid_boundary(a) || !is_valid_boundary(b) {
        return false;
    }
    if !bounding_box_of(a)
        .expanded(tolerance)
        .intersects(&bounding_box_of(b))
    {
        return false;
    }
    edges(a).any(|(a1, a2)| edges(b).any(|(b1, b2)| segments_touch(a1, a2, b1, b2, tolerance)))
}

/// Points where the two rings meet: both ends of every collinear overlap
/// plus every single crossing or touching point, de-duplicated within
/// `tolerance`.
pub fn shared_border(a: &[Coordinate], b: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    let mut shared: Vec<Coordinate> = Vec::new();
    if !is_valid_boundary(a) || !is_valid_boundary(b) {
        return shared;
    }
    let mut push_unique = |point: Coordinate| {
        if !shared.iter().any(|p| p.distance(point) <= tolerance) {
            shared.push(point);
        }
    };
    for (a1, a2) in edges(a) {
        for (b1, b2) in edges(b) {
            match edge_contact(a1, a2, b1, b2, tolerance) {
                Some(EdgeContact::Overlap(start, end)) => {
                    push_unique(start);
                    push_unique(end);
                }
                Some(EdgeContact::Point(point)) => push_unique(point),
                None => {}
            }
        }
    }
    shared
}

/// Neighbour test plus the measured shared border length.
pub fn check_adjacency(a: &[Coordinate], b: &[Coordinate], tolerance: f64) -> AdjacencyCheck {
    let mut result = AdjacencyCheck::default();
    if !is_valid_boundary(a) || !is_valid_boundary(b) {
        return result;
    }
    if !bounding_box_of(a)
        .expanded(tolerance)
        .intersects(&bounding_box_of(b))
    {
        return result;
    }
    for (a1, a2) in edges(a) {
        for (b1, b2) in edges(b) {
            match edge_contact(a1, a2, b1, b2, tolerance) {
                Some(EdgeContact::Overlap(start, end)) => {
                    result.are_neighbors = true;
                    result.border_length += start.distance(end);
                }
                Some(EdgeContact::Point(_)) => result.are_neighbors = true,
                None => {}
            }
        }
    }
    result
}

/// Fan triangulation from the first vertex. Exact for convex rings only.
pub fn triangulate(boundary: &[Coordinate]) -> Vec<[usize; 3]> {
    if boundary.len() < 3 {
        return Vec::new();
    }
    (1..boundary.len() - 1).map(|i| [0, i, i + 1]).collect()
}

/// All turns go the same way. Collinear vertices are ignored.
pub fn is_convex(boundary: &[Coordinate]) -> bool {
    if boundary.len() < 3 || signed_area(boundary).abs() < EPSILON {
        return false;
    }
    let n = boundary.len();
    let mut sign = 0.0f64;
    for i in 0..n {
        let turn = cross(boundary[i], boundary[(i + 1) % n], boundary[(i + 2) % n]);
        if turn.abs() < EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = turn.signum();
        } else if turn.signum() != sign {
            return false;
        }
    }
    true
}

/// Best-effort check for proper crossings between non-adjacent edges.
/// Collinear overlaps between non-adjacent edges are not reported.
pub fn is_self_intersecting(boundary: &[Coordinate]) -> bool {
    let n = boundary.len();
    if n < 4 {
        return false;
    }
    for i in 0..n {
        let (a1, a2) = (boundary[i], boundary[(i + 1) % n]);
        for k in (i + 2)..n {
            if (k + 1) % n == i {
                continue;
            }
            let (b1, b2) = (boundary[k], boundary[(k + 1) % n]);
            if opposite_signs(cross(b1, b2, a1), cross(b1, b2, a2))
                && opposite_signs(cross(a1, a2, b1), cross(a1, a2, b2))
            {
                return true;
            }
        }
    }
    false
}

/// Map zoom levels, from strategic (`Lod0`) to maximum detail (`Lod4`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderLevel {
    Lod0,
    Lod1,
    Lod2,
    Lod3,
    Lod4,
}

impl RenderLevel {
    pub fn simplification_tolerance(self) -> f64 {
        match self {
            RenderLevel::Lod0 => 0.1,
            RenderLevel::Lod1 => 0.05,
            RenderLevel::Lod2 => 0.02,
            RenderLevel::Lod3 => 0.01,
            RenderLevel::Lod4 => 0.005,
        }
    }
}

pub fn simplify_for_lod(boundary: &[Coordinate], lod: RenderLevel) -> Vec<Coordinate> {
    simplify_polygon(boundary, lod.simplification_tolerance())
}
