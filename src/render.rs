use crate::config::{Config, MapDocument, RenderConfig};
use crate::error::Error;
use crate::feature::{Geometry, GeometryKind, Point};
use crate::placement::{GlyphRenderer, LabelCollisionDetector, LabelPlacer, PlacedLabel, RenderContext};
use crate::text_metrics::StringMetrics;
use anyhow::Result;
use std::path::Path;

/// Builds SVG fragments for each committed label.
#[derive(Debug, Clone)]
pub struct SvgLabelRenderer {
    scale_factor: f64,
    body: String,
}

impl SvgLabelRenderer {
    pub fn new(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            body: String::new(),
        }
    }

    /// Wraps the collected labels in a document with the map's geometries
    /// drawn underneath.
    pub fn into_svg(self, map: &MapDocument, config: &RenderConfig) -> String {
        let width = config.width;
        let height = config.height;
        let mut svg = String::new();
        svg.push_str(&format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" viewBox=\"0 0 {width} {height}\">",
        ));
        svg.push_str(&format!(
            "<rect width=\"100%\" height=\"100%\" fill=\"{}\"/>",
            escape_xml(&config.background)
        ));
        for layer in &map.layers {
            for feature in &layer.features {
                for geometry in &feature.geometries {
                    svg.push_str(&geometry_svg(geometry));
                }
            }
        }
        svg.push_str(&self.body);
        svg.push_str("</svg>");
        svg
    }
}

impl GlyphRenderer for SvgLabelRenderer {
    fn render_label(&mut self, label: &PlacedLabel) {
        for icon in &label.icons {
            self.body.push_str(&format!(
                "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" rx=\"3\" ry=\"3\" fill=\"#F4F4F4\" stroke=\"#555555\" stroke-width=\"1\"/>",
                icon.min_x,
                icon.min_y,
                icon.width(),
                icon.height()
            ));
        }
        for placement in &label.placements {
            for glyph in &placement.glyphs {
                if glyph.character.is_whitespace() {
                    continue;
                }
                let Some(run) = label.runs.get(glyph.run) else {
                    continue;
                };
                let style = &run.style;
                let family = style
                    .face_name
                    .as_deref()
                    .or(style.fontset_name.as_deref())
                    .unwrap_or("sans-serif");
                let halo = if style.halo_radius > 0.0 {
                    format!(
                        " stroke=\"{}\" stroke-width=\"{:.2}\" paint-order=\"stroke\"",
                        escape_xml(&style.halo_fill),
                        2.0 * style.halo_radius * self.scale_factor
                    )
                } else {
                    String::new()
                };
                // SVG rotates clockwise.
                let degrees = -glyph.angle.to_degrees();
                self.body.push_str(&format!(
                    "<text x=\"{x:.2}\" y=\"{y:.2}\" transform=\"rotate({degrees:.3} {x:.2} {y:.2})\" font-family=\"{}\" font-size=\"{:.2}\" fill=\"{}\" fill-opacity=\"{}\"{halo}>{}</text>",
                    escape_xml(family),
                    style.size * self.scale_factor,
                    escape_xml(&style.fill),
                    style.opacity,
                    escape_xml(&glyph.character.to_string()),
                    x = glyph.x,
                    y = glyph.y,
                ));
            }
        }
    }
}

fn geometry_svg(geometry: &Geometry) -> String {
    match geometry.kind {
        GeometryKind::Point => geometry
            .points
            .iter()
            .map(|(x, y)| format!("<circle cx=\"{x:.2}\" cy=\"{y:.2}\" r=\"2\" fill=\"#888888\"/>"))
            .collect(),
        GeometryKind::LineString => format!(
            "<path d=\"{}\" fill=\"none\" stroke=\"#BBBBBB\" stroke-width=\"2\"/>",
            points_to_path(&geometry.points, false)
        ),
        GeometryKind::Polygon => format!(
            "<path d=\"{}\" fill=\"#EEF2E6\" stroke=\"#BBBBBB\" stroke-width=\"1\"/>",
            points_to_path(&geometry.points, true)
        ),
    }
}

fn points_to_path(points: &[Point], close: bool) -> String {
    let Some((first, rest)) = points.split_first() else {
        return String::new();
    };
    let mut d = format!("M {:.2} {:.2}", first.0, first.1);
    for point in rest {
        d.push_str(&format!(" L {:.2} {:.2}", point.0, point.1));
    }
    if close {
        d.push_str(" Z");
    }
    d
}

/// Runs one labelling pass over the map: every layer in order, every feature,
/// every symbolizer, against one fresh collision detector.
pub fn place_labels(
    map: &MapDocument,
    config: &Config,
    metrics: &mut dyn StringMetrics,
    renderer: &mut dyn GlyphRenderer,
) -> Result<Vec<PlacedLabel>> {
    let scale = config.render.scale_factor;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidScaleFactor(scale).into());
    }
    let context = RenderContext::new(config.render.width, config.render.height)
        .with_scale_factor(config.render.scale_factor)
        .with_buffer_size(config.render.buffer_size);
    let mut detector = LabelCollisionDetector::new(context.extent());
    let mut placer = LabelPlacer::new(&mut detector, metrics, context);
    let mut labels = Vec::new();
    for layer in &map.layers {
        tracing::debug!(layer = %layer.name, features = layer.features.len(), "placing layer");
        for feature in &layer.features {
            for symbolizer in &layer.symbolizers {
                if let Some(label) = placer.process_feature(symbolizer, feature, renderer)? {
                    labels.push(label);
                }
            }
        }
    }
    Ok(labels)
}

pub fn write_output_svg(svg: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, svg)?;
        }
        None => {
            print!("{}", svg);
        }
    }
    Ok(())
}

#[cfg(feature = "png")]
pub fn write_output_png(svg: &str, output: &Path, render_cfg: &RenderConfig) -> Result<()> {
    let mut opt = usvg::Options::default();
    opt.fontdb_mut().load_system_fonts();
    opt.default_size = usvg::Size::from_wh(render_cfg.width as f32, render_cfg.height as f32)
        .unwrap_or(usvg::Size::from_wh(800.0, 600.0).unwrap());

    let tree = usvg::Tree::from_str(svg, &opt)?;
    let size = tree.size().to_int_size();
    let mut pixmap = resvg::tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| anyhow::anyhow!("Failed to allocate pixmap"))?;

    let mut pixmap_mut = pixmap.as_mut();
    resvg::render(&tree, resvg::tiny_skia::Transform::default(), &mut pixmap_mut);
    pixmap.save_png(output)?;
    Ok(())
}

fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
