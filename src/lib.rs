#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod expression;
pub mod feature;
pub mod placement;
pub mod placement_dump;
pub mod render;
pub mod style;
pub mod symbolizer;
pub mod text_metrics;

#[cfg(feature = "cli")]
pub use cli::run;
pub use config::{Config, FontConfig, Layer, MapDocument, RenderConfig, load_config, load_map, parse_map};
pub use error::{Error, Result};
pub use expression::Expression;
pub use feature::{Feature, Geometry, GeometryKind, Value};
pub use placement::{
    Envelope, GlyphPlacement, GlyphRenderer, LabelCollisionDetector, LabelPlacer, OccupancyIndex,
    PlacedLabel, PlacementResult, Placements, RenderContext,
};
pub use render::{SvgLabelRenderer, place_labels};
pub use style::StyleProperties;
pub use symbolizer::{IconSpec, ShieldSymbolizer, Symbolizer, TextSymbolizer};
pub use text_metrics::{ApproximateMetrics, FontMetrics, StringInfo, StringMetrics};
