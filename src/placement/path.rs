use crate::feature::{Point, distance};
use crate::text_metrics::CharMetrics;

use super::Envelope;

const INTERSECTION_EPS: f64 = 1e-7;

/// Vertex positions and per-segment lengths of a polyline, computed once.
///
/// `distances[i]` is the length of the segment ending at vertex `i`;
/// `distances[0]` is always 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PathCache {
    pub positions: Vec<Point>,
    pub distances: Vec<f64>,
    pub total: f64,
}

impl PathCache {
    pub fn new(points: &[Point]) -> Self {
        let mut distances = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, point) in points.iter().enumerate() {
            let d = if i == 0 {
                0.0
            } else {
                distance(points[i - 1], *point)
            };
            total += d;
            distances.push(d);
        }
        Self {
            positions: points.to_vec(),
            distances,
            total,
        }
    }

    /// Point at arc length `target` from the start of the path.
    pub fn point_at(&self, target: f64) -> Option<Point> {
        if self.positions.len() < 2 || target < 0.0 || target > self.total {
            return None;
        }
        let mut walked = 0.0;
        for i in 1..self.positions.len() {
            let seg = self.distances[i];
            if seg > 0.0 && walked + seg >= target {
                let t = (target - walked) / seg;
                let (x0, y0) = self.positions[i - 1];
                let (x1, y1) = self.positions[i];
                return Some((x0 + (x1 - x0) * t, y0 + (y1 - y0) * t));
            }
            walked += seg;
        }
        self.positions.last().copied()
    }
}

/// Intersection of the segment `p1 -> p2` with the circle around `center`.
///
/// Callers must guarantee `p1` lies inside the circle and `p2` outside, so
/// there is exactly one crossing on the segment; it is the larger root,
/// clamped to the segment.
pub fn find_line_circle_intersection(
    center: Point,
    radius: f64,
    p1: Point,
    p2: Point,
) -> Option<Point> {
    let (cx, cy) = center;
    let (x1, y1) = p1;
    let dx = p2.0 - x1;
    let dy = p2.1 - y1;

    let a = dx * dx + dy * dy;
    let b = 2.0 * (dx * (x1 - cx) + dy * (y1 - cy));
    let c = (x1 - cx) * (x1 - cx) + (y1 - cy) * (y1 - cy) - radius * radius;
    let det = b * b - 4.0 * a * c;

    if a <= INTERSECTION_EPS || det < 0.0 {
        return None;
    }
    let t = if det == 0.0 {
        -b / (2.0 * a)
    } else {
        (-b + det.sqrt()) / (2.0 * a)
    };
    let t = t.clamp(0.0, 1.0);
    Some((x1 + t * dx, y1 + t * dy))
}

/// Wraps an angle difference into [-PI, PI].
pub(crate) fn normalize_angle_delta(mut delta: f64) -> f64 {
    use std::f64::consts::PI;
    while delta > PI {
        delta -= 2.0 * PI;
    }
    while delta < -PI {
        delta += 2.0 * PI;
    }
    delta
}

/// Unit vectors along the baseline and towards the top of a glyph rotated by
/// `angle` (counter-clockwise), expressed in y-down device space.
pub(crate) fn glyph_axes(angle: f64) -> (Point, Point) {
    let (sin, cos) = angle.sin_cos();
    ((cos, -sin), (-sin, -cos))
}

/// Bounds of the rotated box a glyph covers.
pub(crate) fn char_envelope(origin: Point, angle: f64, metrics: &CharMetrics) -> Envelope {
    let (t, u) = glyph_axes(angle);
    let corner = |along: f64, up: f64| {
        (
            origin.0 + t.0 * along + u.0 * up,
            origin.1 + t.1 * along + u.1 * up,
        )
    };
    let corners = [
        corner(0.0, metrics.ymin),
        corner(metrics.width, metrics.ymin),
        corner(0.0, metrics.ymax),
        corner(metrics.width, metrics.ymax),
    ];
    // corners is non-empty
    Envelope::from_points(&corners).unwrap_or(Envelope::new(origin.0, origin.1, origin.0, origin.1))
}
