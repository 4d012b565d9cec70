// Label placement: variant search, text formatting, geometric layout and
// collision testing. Everything here works on device coordinates.

pub mod collision;
pub mod finder;
pub mod formatting;
pub mod orchestrator;
pub mod path;
pub mod variants;

pub use collision::{LabelCollisionDetector, OccupancyIndex};
pub use finder::{PlacementFinder, get_placement_offset};
pub use formatting::{FormatNode, FormattingPipeline, Token};
pub use orchestrator::{GlyphRenderer, LabelPlacer, PlacedLabel, RenderContext};
pub use path::{PathCache, find_line_circle_intersection};
pub use variants::{
    Direction, Placements, PlacementVariants, PositionList, VariantIterator, parse_positions,
};

use crate::feature::Point;
use crate::style::StyleProperties;
use serde::Serialize;

/// Axis-aligned bounding box, y growing downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn centered(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(
            cx - width / 2.0,
            cy - height / 2.0,
            cx + width / 2.0,
            cy + height / 2.0,
        )
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut env = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            env.expand_to_include(x, y);
        }
        Some(env)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn inflate(&self, pad: f64) -> Self {
        if pad <= 0.0 {
            return *self;
        }
        Self {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }

    /// Closed intersection: touching edges count.
    pub fn intersects(&self, other: &Envelope) -> bool {
        !(other.min_x > self.max_x
            || other.max_x < self.min_x
            || other.min_y > self.max_y
            || other.max_y < self.min_y)
    }

    /// Open intersection: the shared area is positive.
    pub fn overlaps(&self, other: &Envelope) -> bool {
        self.overlap_area(other) > 0.0
    }

    pub fn overlap_area(&self, other: &Envelope) -> f64 {
        let w = (self.max_x.min(other.max_x) - self.min_x.max(other.min_x)).max(0.0);
        let h = (self.max_y.min(other.max_y) - self.min_y.max(other.min_y)).max(0.0);
        w * h
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

/// Text produced by the formatting pipeline with the style it is drawn in.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledRun {
    pub text: String,
    pub style: StyleProperties,
}

impl StyledRun {
    pub fn new(text: impl Into<String>, style: StyleProperties) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One positioned character. `(x, y)` is the baseline origin in device
/// coordinates; `angle` is counter-clockwise in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacedGlyph {
    pub character: char,
    /// Index into the label's `StringInfo`.
    pub index: usize,
    /// Index of the styled run the character belongs to.
    pub run: usize,
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GlyphPlacement {
    pub anchor: Point,
    pub glyphs: Vec<PlacedGlyph>,
    pub envelopes: Vec<Envelope>,
    /// 1 when read along the path direction, -1 when flipped, 0 for point labels.
    pub orientation: i32,
}

impl GlyphPlacement {
    pub fn new(anchor: Point) -> Self {
        Self {
            anchor,
            ..Default::default()
        }
    }
}

/// Outcome of one placement attempt. Empty means nothing was placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementResult {
    pub placements: Vec<GlyphPlacement>,
    #[serde(skip)]
    pub(crate) staged: Vec<Envelope>,
}

impl PlacementResult {
    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    /// Envelopes accepted by the last tests but not yet committed.
    pub fn staged(&self) -> &[Envelope] {
        &self.staged
    }

    pub fn envelopes(&self) -> impl Iterator<Item = &Envelope> {
        self.placements.iter().flat_map(|p| p.envelopes.iter())
    }
}
