use serde::Serialize;
use tracing::{debug, trace};

use super::{
    Envelope, GlyphPlacement, OccupancyIndex, PlacementFinder, PlacementResult, StyledRun,
    VariantIterator,
};
use crate::error::Result;
use crate::feature::{Feature, Geometry, GeometryKind, Point};
use crate::style::{LabelPlacement, StyleProperties};
use crate::symbolizer::{ShieldSymbolizer, Symbolizer, TextSymbolizer};
use crate::text_metrics::{StringInfo, StringMetrics};

/// Canvas the labels are placed on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub width: f64,
    pub height: f64,
    pub scale_factor: f64,
    /// Margin around the canvas where labels may still be placed.
    pub buffer_size: f64,
}

impl RenderContext {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scale_factor: 1.0,
            buffer_size: 0.0,
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: f64) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn canvas(&self) -> Envelope {
        Envelope::new(0.0, 0.0, self.width, self.height)
    }

    /// Region handed to a fresh collision detector.
    pub fn extent(&self) -> Envelope {
        self.canvas().inflate(self.buffer_size)
    }
}

/// A committed label, ready for drawing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedLabel {
    pub feature_id: u64,
    pub geometry_index: usize,
    pub text: String,
    /// Style variant that fit.
    #[serde(skip)]
    pub style: StyleProperties,
    #[serde(skip)]
    pub runs: Vec<StyledRun>,
    pub placements: Vec<GlyphPlacement>,
    pub icons: Vec<Envelope>,
}

/// Receives each committed label.
pub trait GlyphRenderer {
    fn render_label(&mut self, label: &PlacedLabel);
}

/// Runs the variant search for one symbolizer and feature at a time.
pub struct LabelPlacer<'a> {
    detector: &'a mut dyn OccupancyIndex,
    metrics: &'a mut dyn StringMetrics,
    context: RenderContext,
    variant_cap: Option<usize>,
}

impl<'a> LabelPlacer<'a> {
    pub fn new(
        detector: &'a mut dyn OccupancyIndex,
        metrics: &'a mut dyn StringMetrics,
        context: RenderContext,
    ) -> Self {
        Self {
            detector,
            metrics,
            context,
            variant_cap: None,
        }
    }

    /// Bounds the number of position attempts per geometry.
    pub fn with_variant_cap(mut self, cap: usize) -> Self {
        self.variant_cap = Some(cap);
        self
    }

    /// Places the symbolizer's label and hands it to `renderer`.
    pub fn process_feature(
        &mut self,
        symbolizer: &Symbolizer,
        feature: &Feature,
        renderer: &mut dyn GlyphRenderer,
    ) -> Result<Option<PlacedLabel>> {
        let label = match symbolizer {
            Symbolizer::Text(sym) => self.place_text(sym, feature)?,
            Symbolizer::Shield(sym) => self.place_shield(sym, feature)?,
        };
        if let Some(label) = &label {
            renderer.render_label(label);
        }
        Ok(label)
    }

    pub fn place_text(
        &mut self,
        sym: &TextSymbolizer,
        feature: &Feature,
    ) -> Result<Option<PlacedLabel>> {
        for (geometry_index, geometry) in feature.geometries.iter().enumerate() {
            if geometry.is_empty() {
                trace!(feature = feature.id, geometry_index, "skipping empty geometry");
                continue;
            }
            let mut variants = sym.placements.variants(&sym.style);
            let mut attempts = 0;
            'variants: while variants.next() {
                let runs = sym.pipeline(variants.current_style()).process(feature);
                if runs.is_empty() {
                    continue;
                }
                let info = StringInfo::measure(&runs, self.metrics, self.context.scale_factor)?;
                while variants.next_position_only() {
                    if self.cap_reached(attempts) {
                        break 'variants;
                    }
                    attempts += 1;
                    let style = variants.current_style();
                    let result = self.try_text(style, &info, geometry, feature);
                    if !result.is_empty() {
                        return Ok(Some(PlacedLabel {
                            feature_id: feature.id,
                            geometry_index,
                            text: info.text().to_string(),
                            style: style.clone(),
                            runs,
                            placements: result.placements,
                            icons: Vec::new(),
                        }));
                    }
                }
            }
        }
        debug!(feature = feature.id, "no text placement found");
        Ok(None)
    }

    pub fn place_shield(
        &mut self,
        sym: &ShieldSymbolizer,
        feature: &Feature,
    ) -> Result<Option<PlacedLabel>> {
        let text = &sym.text;
        for (geometry_index, geometry) in feature.geometries.iter().enumerate() {
            if geometry.is_empty() {
                trace!(feature = feature.id, geometry_index, "skipping empty geometry");
                continue;
            }
            let mut variants = text.placements.variants(&text.style);
            let mut attempts = 0;
            'variants: while variants.next() {
                let runs = if sym.no_text {
                    Vec::new()
                } else {
                    text.pipeline(variants.current_style()).process(feature)
                };
                if runs.is_empty() && !sym.no_text {
                    continue;
                }
                let info = StringInfo::measure(&runs, self.metrics, self.context.scale_factor)?;
                while variants.next_position_only() {
                    if self.cap_reached(attempts) {
                        break 'variants;
                    }
                    attempts += 1;
                    let style = variants.current_style();
                    let (result, icons) = self.try_shield(sym, style, &info, geometry, feature);
                    if !result.is_empty() {
                        return Ok(Some(PlacedLabel {
                            feature_id: feature.id,
                            geometry_index,
                            text: info.text().to_string(),
                            style: style.clone(),
                            runs,
                            placements: result.placements,
                            icons,
                        }));
                    }
                }
            }
        }
        debug!(feature = feature.id, "no shield placement found");
        Ok(None)
    }

    fn cap_reached(&self, attempts: usize) -> bool {
        self.variant_cap.is_some_and(|cap| attempts >= cap)
    }

    fn finder(&mut self) -> PlacementFinder<'_, dyn OccupancyIndex + 'a> {
        PlacementFinder::new(&mut *self.detector, self.context.canvas())
            .with_scale_factor(self.context.scale_factor)
    }

    fn try_text(
        &mut self,
        style: &StyleProperties,
        info: &StringInfo,
        geometry: &Geometry,
        feature: &Feature,
    ) -> PlacementResult {
        let angle = orientation_angle(style, feature);
        let mut finder = self.finder();
        let mut result = PlacementResult::default();
        match style.placement {
            LabelPlacement::Point | LabelPlacement::Interior => {
                let anchor = if style.placement == LabelPlacement::Interior {
                    geometry.label_interior_position()
                } else {
                    geometry.label_position()
                };
                if let Some((x, y)) = anchor
                    && finder.find_point_placement(style, info, x, y, angle, &mut result)
                {
                    finder.update_detector(&mut result);
                }
            }
            LabelPlacement::Line => {
                if geometry.num_points() < 2 {
                    trace!(feature = feature.id, "line placement needs two points");
                    return result;
                }
                finder.find_line_placements(style, info, &label_path(geometry), &mut result);
            }
            LabelPlacement::Vertex => {
                for &(x, y) in &geometry.points {
                    if finder.find_point_placement(style, info, x, y, angle, &mut result) {
                        finder.update_detector(&mut result);
                        break;
                    }
                }
            }
        }
        result
    }

    fn try_shield(
        &mut self,
        sym: &ShieldSymbolizer,
        style: &StyleProperties,
        info: &StringInfo,
        geometry: &Geometry,
        feature: &Feature,
    ) -> (PlacementResult, Vec<Envelope>) {
        let scale = self.context.scale_factor;
        let icon_w = sym.icon.width * scale;
        let icon_h = sym.icon.height * scale;
        let shield_dx = sym.icon.displacement.0 * scale;
        let shield_dy = sym.icon.displacement.1 * scale;
        let angle = orientation_angle(style, feature);
        let mut finder = self.finder();
        let mut result = PlacementResult::default();

        if style.placement == LabelPlacement::Line {
            if geometry.num_points() < 2 {
                trace!(feature = feature.id, "line placement needs two points");
                return (result, Vec::new());
            }
            finder.set_dimensions(Some((icon_w, icon_h)));
            finder.find_point_placements(style, info, &label_path(geometry), &mut result);
            let icons = result.envelopes().copied().collect();
            finder.update_detector(&mut result);
            return (result, icons);
        }

        let anchors: Vec<Point> = match style.placement {
            LabelPlacement::Vertex => geometry.points.clone(),
            LabelPlacement::Interior => geometry.label_interior_position().into_iter().collect(),
            _ => geometry.label_position().into_iter().collect(),
        };
        for (x, y) in anchors {
            let (lx, ly) = (x + shield_dx, y + shield_dy);
            if !finder.find_point_placement(style, info, lx, ly, angle, &mut result) {
                continue;
            }
            let icon = match result.placements.last() {
                Some(placement) if !sym.unlock_image => Envelope::centered(
                    placement.anchor.0 - style.displacement.0 * scale,
                    placement.anchor.1 - style.displacement.1 * scale,
                    icon_w,
                    icon_h,
                ),
                _ => Envelope::centered(lx, ly, icon_w, icon_h),
            };
            if style.allow_overlap || finder.detector().has_placement(&icon) {
                result.staged.push(icon);
                finder.update_detector(&mut result);
                return (result, vec![icon]);
            }
            trace!(feature = feature.id, "shield icon collides");
            finder.clear(&mut result);
        }
        (result, Vec::new())
    }
}

fn orientation_angle(style: &StyleProperties, feature: &Feature) -> f64 {
    style
        .orientation
        .as_ref()
        .map(|expr| expr.evaluate_number(feature))
        .unwrap_or(0.0)
}

/// Polygon outlines are followed all the way round.
fn label_path(geometry: &Geometry) -> Vec<Point> {
    let mut path = geometry.points.clone();
    if geometry.kind == GeometryKind::Polygon
        && let (Some(first), Some(last)) = (path.first().copied(), path.last().copied())
        && first != last
    {
        path.push(first);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::placement::{FormatNode, LabelCollisionDetector, Placements, parse_positions};
    use crate::symbolizer::IconSpec;
    use crate::text_metrics::{ApproximateMetrics, CharMetrics};

    /// Fixed-width metrics that count calls.
    #[derive(Default)]
    struct CountingMetrics {
        calls: usize,
    }

    impl StringMetrics for CountingMetrics {
        fn measure(&mut self, text: &str, _style: &StyleProperties) -> Result<Vec<CharMetrics>> {
            self.calls += 1;
            Ok(text.chars().map(|c| CharMetrics::new(c, 6.0, -2.0, 8.0)).collect())
        }
    }

    #[derive(Default)]
    struct Collect(Vec<PlacedLabel>);

    impl GlyphRenderer for Collect {
        fn render_label(&mut self, label: &PlacedLabel) {
            self.0.push(label.clone());
        }
    }

    fn context() -> RenderContext {
        RenderContext::new(400.0, 400.0)
    }

    fn detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(context().extent())
    }

    fn symbolizer() -> TextSymbolizer {
        TextSymbolizer::new(
            vec![FormatNode::text(Expression::parse("[name]").unwrap())],
            StyleProperties {
                face_name: Some("DejaVu Sans".to_string()),
                ..Default::default()
            },
        )
    }

    fn point_feature(id: u64, x: f64, y: f64) -> Feature {
        Feature::new(id)
            .with_attribute("name", "Town")
            .with_geometry(Geometry::point(x, y))
    }

    #[test]
    fn empty_geometries_never_reach_metrics() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let feature = Feature::new(1)
            .with_attribute("name", "Nowhere")
            .with_geometry(Geometry::line(Vec::new()));
        assert!(placer.place_text(&symbolizer(), &feature).unwrap().is_none());
        assert_eq!(m.calls, 0);
        assert!(d.is_empty());
    }

    #[test]
    fn metrics_are_computed_once_per_style_variant() {
        let mut d = detector();
        d.insert(Envelope::new(0.0, 0.0, 400.0, 400.0));
        let mut m = CountingMetrics::default();
        let sym = symbolizer().with_placements(Placements::Simple {
            positions: parse_positions("N,E,S,W"),
        });
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        assert!(placer.place_text(&sym, &point_feature(1, 200.0, 200.0)).unwrap().is_none());
        assert_eq!(m.calls, 1);
    }

    #[test]
    fn falls_back_to_next_position() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let first = placer.place_text(&symbolizer(), &point_feature(1, 100.0, 100.0)).unwrap();
        assert!(first.is_some());

        let mut sym = symbolizer().with_placements(Placements::Simple {
            positions: parse_positions("X,N,S"),
        });
        sym.style.displacement = (0.0, 20.0);
        // X keeps (0, 20): clear of the first label too, so block it first.
        let blocker = point_feature(2, 100.0, 125.0);
        assert!(placer.place_text(&symbolizer(), &blocker).unwrap().is_some());

        let label = placer
            .place_text(&sym, &point_feature(3, 100.0, 100.0))
            .unwrap()
            .expect("north position fits");
        assert_eq!(label.style.displacement, (0.0, -20.0));
        assert_eq!(label.text, "Town");
    }

    #[test]
    fn variant_cap_bounds_the_search() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context()).with_variant_cap(1);
        placer.place_text(&symbolizer(), &point_feature(1, 100.0, 100.0)).unwrap();
        let mut sym = symbolizer().with_placements(Placements::Simple {
            positions: parse_positions("X,N"),
        });
        sym.style.displacement = (0.0, 30.0);
        // X is centred on y = 135 and fits; cap 1 allows just that attempt.
        assert!(placer.place_text(&sym, &point_feature(2, 100.0, 100.0)).unwrap().is_some());
        // Same again: X now collides and N is beyond the cap.
        assert!(placer.place_text(&sym, &point_feature(3, 100.0, 100.0)).unwrap().is_none());
    }

    #[test]
    fn vertex_placement_takes_first_free_vertex() {
        let mut d = detector();
        d.insert(Envelope::new(40.0, 40.0, 60.0, 60.0));
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let mut sym = symbolizer();
        sym.style.placement = LabelPlacement::Vertex;
        let feature = Feature::new(1)
            .with_attribute("name", "v")
            .with_geometry(Geometry::line(vec![(50.0, 50.0), (150.0, 50.0), (250.0, 50.0)]));
        let label = placer.place_text(&sym, &feature).unwrap().unwrap();
        assert_eq!(label.placements.len(), 1);
        assert!((label.placements[0].anchor.0 - 150.0).abs() < 1e-9);
    }

    #[test]
    fn line_placement_follows_the_line() {
        let mut d = detector();
        let mut m = ApproximateMetrics;
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let mut sym = symbolizer();
        sym.style.placement = LabelPlacement::Line;
        let feature = Feature::new(1)
            .with_attribute("name", "High Street")
            .with_geometry(Geometry::line(vec![(20.0, 200.0), (380.0, 200.0)]));
        let label = placer.place_text(&sym, &feature).unwrap().unwrap();
        assert!(!label.placements.is_empty());
        for glyph in label.placements.iter().flat_map(|p| p.glyphs.iter()) {
            assert!(glyph.angle.abs() < 1e-9);
        }
        assert!(!d.is_empty());
    }

    #[test]
    fn orientation_expression_rotates_point_labels() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let mut sym = symbolizer();
        sym.style.orientation = Some(Expression::parse("[angle]").unwrap());
        let feature = point_feature(1, 200.0, 200.0).with_attribute("angle", 45.0);
        let label = placer.place_text(&sym, &feature).unwrap().unwrap();
        let angle = label.placements[0].glyphs[0].angle;
        assert!((angle - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    fn shield() -> ShieldSymbolizer {
        let mut text = symbolizer();
        text.style.displacement = (0.0, -40.0);
        ShieldSymbolizer {
            icon: IconSpec {
                width: 20.0,
                height: 20.0,
                ..Default::default()
            },
            unlock_image: true,
            no_text: false,
            text,
        }
    }

    #[test]
    fn shield_icon_collision_discards_the_text() {
        let mut d = detector();
        d.insert(Envelope::new(95.0, 95.0, 105.0, 105.0));
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        assert!(placer.place_shield(&shield(), &point_feature(1, 100.0, 100.0)).unwrap().is_none());
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn shield_commits_text_and_icon() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let label = placer
            .place_shield(&shield(), &point_feature(1, 100.0, 100.0))
            .unwrap()
            .unwrap();
        assert_eq!(label.icons, vec![Envelope::new(90.0, 90.0, 110.0, 110.0)]);
        // Four glyphs of "Town" plus the icon.
        assert_eq!(d.len(), 5);
    }

    #[test]
    fn shields_repeat_along_lines() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let mut sym = shield();
        sym.text.style.placement = LabelPlacement::Line;
        sym.text.style.label_spacing = 100.0;
        let feature = Feature::new(9)
            .with_attribute("name", "A1")
            .with_geometry(Geometry::line(vec![(0.0, 300.0), (300.0, 300.0)]));
        let label = placer.place_shield(&sym, &feature).unwrap().unwrap();
        assert_eq!(label.placements.len(), 3);
        assert_eq!(label.icons.len(), 3);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn process_feature_hands_labels_to_renderer() {
        let mut d = detector();
        let mut m = CountingMetrics::default();
        let mut renderer = Collect::default();
        let mut placer = LabelPlacer::new(&mut d, &mut m, context());
        let sym = Symbolizer::Text(symbolizer());
        placer
            .process_feature(&sym, &point_feature(1, 50.0, 50.0), &mut renderer)
            .unwrap();
        placer
            .process_feature(&sym, &point_feature(2, 50.0, 50.0), &mut renderer)
            .unwrap();
        assert_eq!(renderer.0.len(), 1);
        assert_eq!(renderer.0[0].feature_id, 1);
    }

    #[test]
    fn polygon_outline_is_closed_for_line_labels() {
        let poly = Geometry::polygon(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert_eq!(label_path(&poly).len(), 4);
        let line = Geometry::line(vec![(0.0, 0.0), (10.0, 0.0)]);
        assert_eq!(label_path(&line).len(), 2);
    }
}
