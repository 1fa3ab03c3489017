//! Planar geometry primitives shared by the province, spatial and visibility
//! modules.
//!
//! All routines operate on `f64` world coordinates. Polygon rings are open:
//! the last vertex connects back to the first implicitly, and callers never
//! repeat the first vertex at the end.

use serde::{Deserialize, Serialize};

/// Tolerance for "is this zero" checks on areas, spans and cross products.
pub const EPSILON: f64 = 1e-9;

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

impl Coordinate {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(self, other: Coordinate) -> f64 {
        self.distance_squared(other).sqrt()
    }

    #[inline]
    pub fn distance_squared(self, other: Coordinate) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Axis-aligned rectangle. Containment and intersection are inclusive of the
/// edges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Square box of half-width `half_extent` around `center`.
    pub fn around(center: Coordinate, half_extent: f64) -> Self {
        Self::new(
            center.x - half_extent,
            center.y - half_extent,
            center.x + half_extent,
            center.y + half_extent,
        )
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }

    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    #[inline]
    pub fn contains_point(&self, point: Coordinate) -> bool {
        self.contains(point.x, point.y)
    }

    #[inline]
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn expanded(&self, margin: f64) -> Self {
        Self::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }

    /// Squared distance from `point` to the nearest point of the box; zero
    /// when the point is inside.
    pub fn distance_squared_to(&self, point: Coordinate) -> f64 {
        let dx = (self.min_x - point.x).max(0.0).max(point.x - self.max_x);
        let dy = (self.min_y - point.y).max(0.0).max(point.y - self.max_y);
        dx * dx + dy * dy
    }
}

#[inline]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    a.distance(b)
}

#[inline]
pub fn distance_squared(a: Coordinate, b: Coordinate) -> f64 {
    a.distance_squared(b)
}

/// Z component of `(a - o) x (b - o)`. Positive when `o -> a -> b` turns left.
#[inline]
pub(crate) fn cross(o: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Signed shoelace area. Positive for counter-clockwise rings, negative for
/// clockwise ones, zero for fewer than three points.
pub fn signed_area(polygon: &[Coordinate]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        twice_area += current.x * next.y - next.x * current.y;
    }
    twice_area * 0.5
}

pub fn polygon_area(polygon: &[Coordinate]) -> f64 {
    signed_area(polygon).abs()
}

/// Arithmetic mean of the vertices. The origin for an empty slice.
pub fn centroid(points: &[Coordinate]) -> Coordinate {
    if points.is_empty() {
        return Coordinate::default();
    }
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let count = points.len() as f64;
    Coordinate::new(sum_x / count, sum_y / count)
}

/// Area-weighted centroid. Degenerate rings (fewer than three vertices or a
/// near-zero area) fall back to [`centroid`].
pub fn polygon_centroid(polygon: &[Coordinate]) -> Coordinate {
    if polygon.len() < 3 {
        return centroid(polygon);
    }
    let area = signed_area(polygon);
    if area.abs() < EPSILON {
        return centroid(polygon);
    }

    let mut cx = 0.0;
    let mut cy = 0.0;
    for (i, current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let factor = current.x * next.y - next.x * current.y;
        cx += (current.x + next.x) * factor;
        cy += (current.y + next.y) * factor;
    }
    // Signed area keeps the result correct for either winding.
    let divisor = 6.0 * area;
    Coordinate::new(cx / divisor, cy / divisor)
}

/// Tight bounding box of `points`; an all-zero box for an empty slice.
pub fn bounding_box_of(points: &[Coordinate]) -> BoundingBox {
    let Some(first) = points.first() else {
        return BoundingBox::default();
    };
    points.iter().skip(1).fold(
        BoundingBox::new(first.x, first.y, first.x, first.y),
        |acc, p| {
            BoundingBox::new(
                acc.min_x.min(p.x),
                acc.min_y.min(p.y),
                acc.max_x.max(p.x),
                acc.max_y.max(p.y),
            )
        },
    )
}

/// Even-odd point-in-polygon test using a horizontal ray towards +x.
///
/// Boundary handling follows the half-open crossing rule: for an
/// axis-aligned ring, points on the minimum-x and minimum-y edges count as
/// inside while points on the maximum-x and maximum-y edges count as outside.
/// Rings with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: Coordinate, polygon: &[Coordinate]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y) {
            let x_cross = (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x;
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Shortest distance from `point` to the segment `a-b`.
pub fn distance_to_segment(point: Coordinate, a: Coordinate, b: Coordinate) -> f64 {
    let length_sq = a.distance_squared(b);
    if length_sq < EPSILON * EPSILON {
        return point.distance(a);
    }
    let t = (((point.x - a.x) * (b.x - a.x) + (point.y - a.y) * (b.y - a.y)) / length_sq)
        .clamp(0.0, 1.0);
    point.distance(Coordinate::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)))
}

/// Linear mapping between a latitude/longitude rectangle and game space.
///
/// Game space is centred on the origin: `min_lon`/`min_lat` map to
/// `-width/2`/`-height/2` and the maxima to `+width/2`/`+height/2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoProjection {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    pub game_width: f64,
    pub game_height: f64,
}

impl GeoProjection {
    pub fn lat_lon_to_game(&self, latitude: f64, longitude: f64) -> Coordinate {
        let nx = normalized(longitude, self.min_lon, self.max_lon);
        let ny = normalized(latitude, self.min_lat, self.max_lat);
        Coordinate::new(
            nx * self.game_width - self.game_width * 0.5,
            ny * self.game_height - self.game_height * 0.5,
        )
    }

    /// Inverse of [`Self::lat_lon_to_game`]; returns `(latitude, longitude)`.
    pub fn game_to_lat_lon(&self, game: Coordinate) -> (f64, f64) {
        let nx = normalized(game.x, -self.game_width * 0.5, self.game_width * 0.5);
        let ny = normalized(game.y, -self.game_height * 0.5, self.game_height * 0.5);
        (
            self.min_lat + ny * (self.max_lat - self.min_lat),
            self.min_lon + nx * (self.max_lon - self.min_lon),
        )
    }
}

fn normalized(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span.abs() < EPSILON {
        0.5
    } else {
        (value - min) / span
    }
}

/// Douglas–Peucker simplification.
///
/// Vertices whose perpendicular distance to the current chord stays within
/// `tolerance` are dropped. The first and last input points are always kept
/// and the result never shrinks below three points when the input had more.
/// Inputs of three points or fewer, or a non-positive tolerance, are returned
/// unchanged.
pub fn simplify_polygon(points: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if points.len() <= 3 || tolerance <= 0.0 {
        return points.to_vec();
    }

    let last = points.len() - 1;
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[last] = true;

    let mut stack = vec![(0usize, last)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (index, max_distance) = farthest_from_chord(points, start, end);
        if max_distance > tolerance {
            keep[index] = true;
            stack.push((start, index));
            stack.push((index, end));
        }
    }

    if keep.iter().filter(|k| **k).count() < 3 {
        let (index, _) = farthest_from_chord(points, 0, last);
        keep[index] = true;
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}

fn farthest_from_chord(points: &[Coordinate], start: usize, end: usize) -> (usize, f64) {
    let mut best = (start + 1, -1.0);
    for (offset, point) in points[start + 1..end].iter().enumerate() {
        let d = distance_to_segment(*point, points[start], points[end]);
        if d > best.1 {
            best = (start + 1 + offset, d);
        }
    }
    best
}
