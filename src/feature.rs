use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type Point = (f64, f64);

/// Attribute value attached to a feature.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn to_f64(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
}

/// A geometry in device coordinates (pixels, y growing downwards).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub kind: GeometryKind,
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Geometry {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            kind: GeometryKind::Point,
            points: vec![(x, y)],
        }
    }

    pub fn line(points: Vec<Point>) -> Self {
        Self {
            kind: GeometryKind::LineString,
            points,
        }
    }

    pub fn polygon(points: Vec<Point>) -> Self {
        Self {
            kind: GeometryKind::Polygon,
            points,
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| distance(pair[0], pair[1]))
            .sum()
    }

    /// Default label anchor: the point itself, the middle of a line by
    /// length, or the centroid of a polygon.
    pub fn label_position(&self) -> Option<Point> {
        let first = *self.points.first()?;
        match self.kind {
            GeometryKind::Point => Some(first),
            GeometryKind::LineString => Some(self.point_at_length(self.length() / 2.0)),
            GeometryKind::Polygon => Some(self.centroid()),
        }
    }

    /// Anchor guaranteed to lie inside a polygon: the middle of the widest
    /// horizontal span through the centroid's row.
    pub fn label_interior_position(&self) -> Option<Point> {
        if self.kind != GeometryKind::Polygon || self.points.len() < 3 {
            return self.label_position();
        }
        let (cx, cy) = self.centroid();
        let mut crossings: Vec<f64> = Vec::new();
        let n = self.points.len();
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            if (y0 <= cy && y1 > cy) || (y1 <= cy && y0 > cy) {
                crossings.push(x0 + (cy - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        let best = crossings
            .chunks_exact(2)
            .max_by(|a, b| (a[1] - a[0]).total_cmp(&(b[1] - b[0])));
        match best {
            Some(span) => Some(((span[0] + span[1]) / 2.0, cy)),
            None => Some((cx, cy)),
        }
    }

    fn point_at_length(&self, target: f64) -> Point {
        let mut walked = 0.0;
        for pair in self.points.windows(2) {
            let seg = distance(pair[0], pair[1]);
            if seg > 0.0 && walked + seg >= target {
                let t = (target - walked) / seg;
                return (
                    pair[0].0 + (pair[1].0 - pair[0].0) * t,
                    pair[0].1 + (pair[1].1 - pair[0].1) * t,
                );
            }
            walked += seg;
        }
        self.points.last().copied().unwrap_or((0.0, 0.0))
    }

    fn centroid(&self) -> Point {
        let n = self.points.len();
        let mut area = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            let cross = x0 * y1 - x1 * y0;
            area += cross;
            cx += (x0 + x1) * cross;
            cy += (y0 + y1) * cross;
        }
        if area.abs() < 1e-12 {
            // Degenerate ring: fall back to the vertex average.
            let sx: f64 = self.points.iter().map(|p| p.0).sum();
            let sy: f64 = self.points.iter().map(|p| p.1).sum();
            return (sx / n as f64, sy / n as f64);
        }
        (cx / (3.0 * area), cy / (3.0 * area))
    }
}

pub(crate) fn distance(a: Point, b: Point) -> f64 {
    ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt()
}

/// A map feature: attributes plus one or more geometries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub geometries: Vec<Geometry>,
}

impl Feature {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometries.push(geometry);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
