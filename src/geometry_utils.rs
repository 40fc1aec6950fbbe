use geo::{Intersects, Line};
use geo_types::{Coord, Rect};

/// A planar polyline, either in raw map units or in view units.
pub type Polyline = Vec<Coord<f64>>;

// --- Planar Polyline Helpers ---

/// Euclidean length of a polyline.
pub fn polyline_length(coords: &[Coord<f64>]) -> f64 {
    if coords.len() < 2 {
        return 0.0;
    }
    let mut len = 0.0;
    for i in 0..coords.len() - 1 {
        len += distance(coords[i], coords[i + 1]);
    }
    len
}

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Closest approach of a point to a polyline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolylineProjection {
    /// Distance from the point to the polyline
    pub distance: f64,
    /// Arc length from the first vertex to the closest point
    pub along: f64,
    /// Total arc length of the polyline
    pub length: f64,
    /// Closest point on the polyline
    pub point: Coord<f64>,
    /// Index of the segment (its first vertex) holding the closest point
    pub segment: usize,
}

impl PolylineProjection {
    /// Position of the closest point as a fraction of the polyline length, clamped to [0, 1].
    pub fn fraction(&self) -> f64 {
        if self.length <= 0.0 {
            return 0.0;
        }
        (self.along / self.length).clamp(0.0, 1.0)
    }
}

/// Project a point onto a polyline.
///
/// Zero-length segments are skipped. The first segment reaching the minimum
/// distance wins, so ties resolve toward the start of the polyline.
/// Returns `None` when the polyline has no segment of non-zero length.
pub fn project_point_to_polyline(
    point: Coord<f64>,
    coords: &[Coord<f64>],
) -> Option<PolylineProjection> {
    let mut best: Option<PolylineProjection> = None;
    let mut acc = 0.0;

    for i in 1..coords.len() {
        let a = coords[i - 1];
        let b = coords[i];
        let vx = b.x - a.x;
        let vy = b.y - a.y;
        let len2 = vx * vx + vy * vy;
        if len2 == 0.0 {
            continue;
        }
        let t = (((point.x - a.x) * vx + (point.y - a.y) * vy) / len2).clamp(0.0, 1.0);
        let q = Coord {
            x: a.x + t * vx,
            y: a.y + t * vy,
        };
        let d = distance(point, q);
        if best.map_or(true, |b| d < b.distance) {
            best = Some(PolylineProjection {
                distance: d,
                along: acc + (vx * t).hypot(vy * t),
                length: 0.0,
                point: q,
                segment: i - 1,
            });
        }
        acc += len2.sqrt();
    }

    best.map(|mut b| {
        b.length = acc;
        b
    })
}

/// Point at a normalized arc-length position along a polyline.
pub fn interpolate_along_polyline(coords: &[Coord<f64>], fraction: f64) -> Coord<f64> {
    let Some(first) = coords.first() else {
        return Coord { x: 0.0, y: 0.0 };
    };
    let total = polyline_length(coords);
    if total <= 0.0 {
        return *first;
    }
    let target = fraction.clamp(0.0, 1.0) * total;
    let mut acc = 0.0;
    for i in 1..coords.len() {
        let p0 = coords[i - 1];
        let p1 = coords[i];
        let seg = distance(p0, p1);
        if seg > 0.0 && acc + seg >= target {
            let t = (target - acc) / seg;
            return lerp(p0, p1, t);
        }
        acc += seg;
    }
    coords[coords.len() - 1]
}

pub fn lerp(a: Coord<f64>, b: Coord<f64>, t: f64) -> Coord<f64> {
    Coord {
        x: a.x + t * (b.x - a.x),
        y: a.y + t * (b.y - a.y),
    }
}

/// Unit vector pointing from `from` to `to`, `None` for coincident points.
pub fn unit_direction(from: Coord<f64>, to: Coord<f64>) -> Option<Coord<f64>> {
    let len = distance(from, to);
    if len <= 0.0 || !len.is_finite() {
        return None;
    }
    Some(Coord {
        x: (to.x - from.x) / len,
        y: (to.y - from.y) / len,
    })
}

/// Angle between two unit vectors in degrees, in [0, 180].
pub fn angle_between_deg(u: Coord<f64>, v: Coord<f64>) -> f64 {
    let dot = (u.x * v.x + u.y * v.y).clamp(-1.0, 1.0);
    dot.acos().to_degrees()
}

pub fn rotate(v: Coord<f64>, degrees: f64) -> Coord<f64> {
    let (s, c) = degrees.to_radians().sin_cos();
    Coord {
        x: v.x * c - v.y * s,
        y: v.x * s + v.y * c,
    }
}

/// Mean of every vertex of every polyline.
pub fn vertex_centroid<'a>(paths: impl IntoIterator<Item = &'a Polyline>) -> Option<Coord<f64>> {
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut n = 0usize;
    for path in paths {
        for p in path {
            sum_x += p.x;
            sum_y += p.y;
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }
    Some(Coord {
        x: sum_x / n as f64,
        y: sum_y / n as f64,
    })
}

// --- Box Helpers ---

/// Interiors intersect. Boxes that only share an edge do not overlap.
pub fn rects_overlap(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x < b.max().x && b.min().x < a.max().x && a.min().y < b.max().y && b.min().y < a.max().y
}

pub fn point_rect_distance(p: Coord<f64>, rect: &Rect<f64>) -> f64 {
    let dx = (rect.min().x - p.x).max(0.0).max(p.x - rect.max().x);
    let dy = (rect.min().y - p.y).max(0.0).max(p.y - rect.max().y);
    dx.hypot(dy)
}

pub fn point_segment_distance(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let vx = b.x - a.x;
    let vy = b.y - a.y;
    let len2 = vx * vx + vy * vy;
    if len2 == 0.0 {
        return distance(p, a);
    }
    let t = (((p.x - a.x) * vx + (p.y - a.y) * vy) / len2).clamp(0.0, 1.0);
    distance(p, Coord { x: a.x + t * vx, y: a.y + t * vy })
}

/// Shortest distance between a segment and an axis-aligned box, zero when they touch.
pub fn segment_rect_distance(a: Coord<f64>, b: Coord<f64>, rect: &Rect<f64>) -> f64 {
    if Line::new(a, b).intersects(rect) {
        return 0.0;
    }
    let corners = [
        rect.min(),
        Coord { x: rect.max().x, y: rect.min().y },
        rect.max(),
        Coord { x: rect.min().x, y: rect.max().y },
    ];
    let from_ends = point_rect_distance(a, rect).min(point_rect_distance(b, rect));
    corners
        .iter()
        .map(|&c| point_segment_distance(c, a, b))
        .fold(from_ends, f64::min)
}
