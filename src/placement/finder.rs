use std::f64::consts::PI;

use tracing::{trace, warn};

use super::path::{
    PathCache, char_envelope, find_line_circle_intersection, glyph_axes, normalize_angle_delta,
};
use super::{Envelope, GlyphPlacement, OccupancyIndex, PlacedGlyph, PlacementResult};
use crate::feature::{Point, distance};
use crate::style::{HorizontalAlignment, JustifyAlignment, StyleProperties, VerticalAlignment};
use crate::text_metrics::StringInfo;

// Initial orientation guess for curved labels: paths heading into the left
// half-plane are read backwards.
const FLIP_ABOVE: f64 = 0.55 * PI;
const FLIP_BELOW: f64 = -0.45 * PI;

/// Offset step, in pixels, of the search around an ideal line label position.
const LINE_SEARCH_STEP: f64 = 1.0;

/// A row of characters, `start..end` into the label's `StringInfo`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TextLine {
    start: usize,
    end: usize,
    width: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct TextBlock {
    lines: Vec<TextLine>,
    width: f64,
    height: f64,
    line_height: f64,
    ascent: f64,
}

fn char_step(info: &StringInfo, idx: usize, style: &StyleProperties) -> f64 {
    info.at(idx).metrics.advance + style.character_spacing
}

fn range_width(info: &StringInfo, start: usize, end: usize, style: &StyleProperties) -> f64 {
    if start >= end {
        return 0.0;
    }
    (start..end).map(|i| char_step(info, i, style)).sum::<f64>() - style.character_spacing
}

/// Splits the label into lines on explicit breaks and, when the text is wider
/// than the wrap width, on the wrap character.
fn break_lines(style: &StyleProperties, info: &StringInfo) -> TextBlock {
    let n = info.len();
    let ascent = info
        .chars()
        .iter()
        .filter(|c| c.metrics.character != '\n')
        .map(|c| c.metrics.ymax)
        .fold(0.0, f64::max);
    let descent = info
        .chars()
        .iter()
        .filter(|c| c.metrics.character != '\n')
        .map(|c| c.metrics.ymin)
        .fold(0.0, f64::min);
    let line_height = ascent - descent;

    let string_width = range_width(info, 0, n, style);
    let mut wrap_at = f64::INFINITY;
    if style.wrap_width > 0.0 && string_width > style.wrap_width {
        if style.text_ratio > 0.0 && line_height > 0.0 {
            let mut rows = 1.0;
            while (string_width / rows) / (line_height * rows) > style.text_ratio
                && string_width / rows > style.wrap_width
            {
                rows += 1.0;
            }
            wrap_at = string_width / rows;
        } else {
            wrap_at = style.wrap_width;
        }
    }

    let mut lines = Vec::new();
    let mut paragraph_start = 0;
    for idx in 0..=n {
        if idx < n && info.at(idx).metrics.character != '\n' {
            continue;
        }
        wrap_paragraph(style, info, paragraph_start, idx, wrap_at, &mut lines);
        paragraph_start = idx + 1;
    }

    let width = lines.iter().map(|l| l.width).fold(0.0, f64::max);
    let rows = lines.len() as f64;
    let height = if lines.is_empty() {
        0.0
    } else {
        rows * line_height + (rows - 1.0) * style.line_spacing
    };
    TextBlock {
        lines,
        width,
        height,
        line_height,
        ascent,
    }
}

fn wrap_paragraph(
    style: &StyleProperties,
    info: &StringInfo,
    start: usize,
    end: usize,
    wrap_at: f64,
    lines: &mut Vec<TextLine>,
) {
    if start >= end {
        lines.push(TextLine {
            start,
            end: start,
            width: 0.0,
        });
        return;
    }
    if !wrap_at.is_finite() {
        lines.push(TextLine {
            start,
            end,
            width: range_width(info, start, end, style),
        });
        return;
    }

    let mut words = Vec::new();
    let mut word_start = start;
    for idx in start..=end {
        if idx == end || info.at(idx).metrics.character == style.wrap_character {
            words.push((word_start, idx));
            word_start = idx + 1;
        }
    }

    let mut current: Option<TextLine> = None;
    for (ws, we) in words {
        let word_width = range_width(info, ws, we, style);
        current = match current {
            None => Some(TextLine {
                start: ws,
                end: we,
                width: word_width,
            }),
            Some(line) => {
                // The wrap character sits between line.end and ws.
                let joined = line.width
                    + style.character_spacing
                    + char_step(info, line.end, style)
                    + if we > ws { word_width } else { 0.0 };
                if style.wrap_before && joined > wrap_at {
                    lines.push(line);
                    Some(TextLine {
                        start: ws,
                        end: we,
                        width: word_width,
                    })
                } else {
                    Some(TextLine {
                        start: line.start,
                        end: we,
                        width: joined,
                    })
                }
            }
        };
        if !style.wrap_before
            && let Some(line) = current
            && line.width > wrap_at
        {
            lines.push(line);
            current = None;
        }
    }
    if let Some(line) = current {
        lines.push(line);
    }
}

/// Lays out labels against an occupancy index and stages accepted envelopes.
pub struct PlacementFinder<'d, D: OccupancyIndex + ?Sized> {
    detector: &'d mut D,
    dimensions: Envelope,
    scale_factor: f64,
    shield_size: Option<(f64, f64)>,
}

impl<'d, D: OccupancyIndex + ?Sized> PlacementFinder<'d, D> {
    /// `dimensions` is the visible canvas, used by `avoid_edges` and padding.
    pub fn new(detector: &'d mut D, dimensions: Envelope) -> Self {
        Self {
            detector,
            dimensions,
            scale_factor: 1.0,
            shield_size: None,
        }
    }

    /// Non-positive or non-finite factors are ignored.
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        if scale_factor.is_finite() && scale_factor > 0.0 {
            self.scale_factor = scale_factor;
        } else {
            warn!(scale_factor, "ignoring invalid scale factor");
        }
        self
    }

    /// Replaces per-character envelopes with one box of this size per label.
    pub fn set_dimensions(&mut self, size: Option<(f64, f64)>) {
        self.shield_size = size;
    }

    pub fn detector(&self) -> &D {
        &*self.detector
    }

    /// Lays the whole string out around `(label_x, label_y)`, rotated by
    /// `angle` degrees counter-clockwise.
    pub fn find_point_placement(
        &mut self,
        style: &StyleProperties,
        info: &StringInfo,
        label_x: f64,
        label_y: f64,
        angle: f64,
        result: &mut PlacementResult,
    ) -> bool {
        let block = break_lines(style, info);
        let dx = style.displacement.0 * self.scale_factor;
        let dy = style.displacement.1 * self.scale_factor;

        let valign = match style.vertical_alignment {
            VerticalAlignment::Auto if dy > 0.0 => VerticalAlignment::Bottom,
            VerticalAlignment::Auto if dy < 0.0 => VerticalAlignment::Top,
            VerticalAlignment::Auto => VerticalAlignment::Middle,
            other => other,
        };
        let halign = match style.horizontal_alignment {
            HorizontalAlignment::Auto if dx > 0.0 => HorizontalAlignment::Right,
            HorizontalAlignment::Auto if dx < 0.0 => HorizontalAlignment::Left,
            HorizontalAlignment::Auto => HorizontalAlignment::Middle,
            other => other,
        };

        let mut cx = label_x + dx;
        let mut cy = label_y + dy;
        match valign {
            VerticalAlignment::Top => cy -= block.height / 2.0,
            VerticalAlignment::Bottom => cy += block.height / 2.0,
            _ => {}
        }
        match halign {
            HorizontalAlignment::Left => cx -= block.width / 2.0,
            HorizontalAlignment::Right => cx += block.width / 2.0,
            _ => {}
        }

        let rad = angle.to_radians();
        let (sin, cos) = rad.sin_cos();
        let mut placement = GlyphPlacement::new((cx, cy));
        let mut envelopes = Vec::new();

        // Local frame: origin at the block centre, y up.
        for (row, line) in block.lines.iter().enumerate() {
            let top = block.height / 2.0 - row as f64 * (block.line_height + style.line_spacing);
            let baseline = top - block.ascent;
            let mut x = match style.justify_alignment {
                JustifyAlignment::Left => -block.width / 2.0,
                JustifyAlignment::Right => block.width / 2.0 - line.width,
                JustifyAlignment::Middle => -line.width / 2.0,
            };
            for idx in line.start..line.end {
                let ci = info.at(idx);
                let origin = (cx + x * cos - baseline * sin, cy - (x * sin + baseline * cos));
                placement.glyphs.push(PlacedGlyph {
                    character: ci.metrics.character,
                    index: idx,
                    run: ci.run,
                    x: origin.0,
                    y: origin.1,
                    angle: rad,
                });
                if self.shield_size.is_none() {
                    envelopes.push(char_envelope(origin, rad, &ci.metrics));
                }
                x += char_step(info, idx, style);
            }
        }
        if let Some((w, h)) = self.shield_size {
            envelopes.push(Envelope::centered(label_x, label_y, w, h));
        }

        if !self.test_placement(style, &envelopes, result) {
            trace!(x = label_x, y = label_y, text = info.text(), "point placement collides");
            return false;
        }
        placement.envelopes = envelopes;
        result.placements.push(placement);
        true
    }

    /// Evenly spaced point labels along a path, `label_spacing` apart.
    pub fn find_point_placements(
        &mut self,
        style: &StyleProperties,
        info: &StringInfo,
        path: &[Point],
        result: &mut PlacementResult,
    ) {
        let cache = PathCache::new(path);
        if cache.total <= 0.0 {
            trace!(points = path.len(), "zero length path");
            return;
        }
        let spacing = style.label_spacing * self.scale_factor;
        let num_labels = label_count(cache.total, spacing, style.force_odd_labels);
        let step = cache.total / num_labels as f64;
        let mut target = step / 2.0;
        for _ in 0..num_labels {
            if let Some((x, y)) = cache.point_at(target) {
                self.find_point_placement(style, info, x, y, 0.0, result);
            }
            target += step;
        }
    }

    /// Curved text following the path, repeated every `label_spacing`.
    pub fn find_line_placements(
        &mut self,
        style: &StyleProperties,
        info: &StringInfo,
        path: &[Point],
        result: &mut PlacementResult,
    ) {
        let cache = PathCache::new(path);
        if info.is_empty() || cache.positions.len() < 2 || cache.total <= 0.0 {
            trace!(points = path.len(), "nothing to lay out along path");
            return;
        }
        let string_width: f64 = (0..info.len()).map(|i| char_step(info, i, style)).sum();
        if string_width > cache.total {
            trace!(total = cache.total, string_width, "path shorter than label");
            return;
        }

        let num_labels = label_count(
            cache.total,
            style.label_spacing * self.scale_factor + string_width,
            style.force_odd_labels,
        );
        let spacing = cache.total / num_labels as f64;
        let mut middle = cache.total / 2.0 - string_width / 2.0;
        if num_labels % 2 == 0 {
            middle -= spacing / 2.0;
        }
        let mut targets = vec![middle];
        for k in 1..=num_labels {
            for sign in [-1.0, 1.0] {
                let d = middle + sign * k as f64 * spacing;
                if d >= 0.0 && d + string_width <= cache.total {
                    targets.push(d);
                }
            }
        }

        let tolerance = if style.label_position_tolerance > 0.0 {
            style.label_position_tolerance * self.scale_factor
        } else {
            spacing / 2.0
        };
        let step = LINE_SEARCH_STEP * self.scale_factor;
        let displacement = style.displacement.1 * self.scale_factor;

        for target in targets {
            let mut diff = 0.0;
            'search: while diff <= tolerance {
                for sign in [-1.0, 1.0] {
                    let offset = target + sign * diff;
                    if let Some((mut placement, _)) = get_placement_offset(
                        style,
                        info,
                        &cache.positions,
                        &cache.distances,
                        0,
                        1,
                        offset,
                    ) {
                        if displacement != 0.0 {
                            displace_perpendicular(&mut placement, displacement);
                        }
                        let envelopes: Vec<Envelope> = placement
                            .glyphs
                            .iter()
                            .map(|g| char_envelope((g.x, g.y), g.angle, &info.at(g.index).metrics))
                            .collect();
                        if self.test_placement(style, &envelopes, result) {
                            placement.envelopes = envelopes;
                            result.placements.push(placement);
                            self.update_detector(result);
                            break 'search;
                        }
                    }
                    if diff == 0.0 {
                        break;
                    }
                }
                diff += step;
            }
        }
    }

    /// Checks every candidate envelope; stages them all on success.
    pub fn test_placement(
        &self,
        style: &StyleProperties,
        candidates: &[Envelope],
        result: &mut PlacementResult,
    ) -> bool {
        if !candidates
            .iter()
            .all(|env| self.envelope_fits(style, env, &result.staged))
        {
            return false;
        }
        result.staged.extend_from_slice(candidates);
        true
    }

    fn envelope_fits(&self, style: &StyleProperties, env: &Envelope, staged: &[Envelope]) -> bool {
        if !self.detector.extent().intersects(env) {
            return false;
        }
        if !style.allow_overlap {
            let query = env.inflate(style.minimum_distance * self.scale_factor);
            if !self.detector.has_placement(&query) || staged.iter().any(|s| s.overlaps(&query)) {
                return false;
            }
        }
        if style.avoid_edges && !self.dimensions.contains(env) {
            return false;
        }
        if style.minimum_padding > 0.0
            && !self
                .dimensions
                .contains(&env.inflate(style.minimum_padding * self.scale_factor))
        {
            return false;
        }
        true
    }

    /// Commits staged envelopes to the detector.
    pub fn update_detector(&mut self, result: &mut PlacementResult) {
        for env in result.staged.drain(..) {
            self.detector.insert(env);
        }
    }

    /// Drops placements and staged envelopes without committing anything.
    pub fn clear(&self, result: &mut PlacementResult) {
        result.placements.clear();
        result.staged.clear();
    }
}

fn label_count(total: f64, spacing: f64, force_odd: bool) -> usize {
    let mut count = if spacing > 0.0 {
        (total / spacing).floor() as usize
    } else {
        1
    };
    if force_odd && count % 2 == 0 {
        count = count.saturating_sub(1);
    }
    count.max(1)
}

/// Shifts a curved label along its average normal; positive moves it below
/// the text as read.
fn displace_perpendicular(placement: &mut GlyphPlacement, amount: f64) {
    let (sum_sin, sum_cos) = placement
        .glyphs
        .iter()
        .fold((0.0, 0.0), |(s, c), g| (s + g.angle.sin(), c + g.angle.cos()));
    let avg = sum_sin.atan2(sum_cos);
    let shift = (avg.sin() * amount, avg.cos() * amount);
    for glyph in &mut placement.glyphs {
        glyph.x += shift.0;
        glyph.y += shift.1;
    }
    placement.anchor = (placement.anchor.0 + shift.0, placement.anchor.1 + shift.1);
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t)
}

fn segment_angle(from: Point, to: Point) -> f64 {
    (from.1 - to.1).atan2(to.0 - from.0)
}

/// Lays the label's characters along the path starting `start_distance` past
/// vertex `start_index - 1`.
///
/// `orientation` 0 picks a reading direction from the path and retries once
/// flipped when most glyphs would end up upside down; 1 or -1 forces it.
/// Returns the placement and the orientation used.
pub fn get_placement_offset(
    style: &StyleProperties,
    info: &StringInfo,
    path_positions: &[Point],
    path_distances: &[f64],
    orientation: i32,
    start_index: usize,
    start_distance: f64,
) -> Option<(GlyphPlacement, i32)> {
    let n = info.len();
    let count = path_positions.len();
    if n == 0 || count < 2 || path_distances.len() != count {
        return None;
    }

    let mut index = start_index.clamp(1, count - 1);
    let mut dist = start_distance;
    while dist < 0.0 && index > 1 {
        index -= 1;
        dist += path_distances[index];
    }
    if dist < 0.0 {
        trace!(start_distance, "label starts before the path");
        return None;
    }
    while index < count && (dist > path_distances[index] || path_distances[index] <= 0.0) {
        dist -= path_distances[index];
        index += 1;
    }
    if index >= count {
        trace!(start_distance, "label starts past the path end");
        return None;
    }
    let (initial_index, initial_distance) = (index, dist);

    let mut old = path_positions[index - 1];
    let mut new = path_positions[index];
    let mut seg = path_distances[index];
    if seg <= 0.0 {
        return None;
    }

    let first_angle = segment_angle(old, new);
    let forced = orientation != 0;
    let orientation = if forced {
        orientation.signum()
    } else if first_angle > FLIP_ABOVE || first_angle < FLIP_BELOW {
        -1
    } else {
        1
    };

    let mut placement = GlyphPlacement::new(lerp(old, new, dist / seg));
    placement.orientation = orientation;
    let mut angle = first_angle;
    let mut upside_down = 0usize;

    for i in 0..n {
        let idx = if orientation > 0 { i } else { n - 1 - i };
        let ci = info.at(idx);
        let step = ci.metrics.advance + style.character_spacing;
        let last_angle = angle;

        if seg <= 0.0 {
            return None;
        }
        let start = lerp(old, new, dist / seg);
        let end = if seg - dist >= step {
            dist += step;
            lerp(old, new, dist / seg)
        } else {
            loop {
                old = new;
                index += 1;
                if index >= count {
                    trace!(text = info.text(), "path ends before the label");
                    return None;
                }
                new = path_positions[index];
                seg = path_distances[index];
                if distance(start, new) >= step {
                    break;
                }
            }
            let end = find_line_circle_intersection(start, step, old, new)?;
            dist = distance(old, end);
            end
        };

        angle = if distance(start, end) > f64::EPSILON {
            segment_angle(start, end)
        } else {
            segment_angle(old, new)
        };
        if style.max_char_angle_delta > 0.0
            && normalize_angle_delta(last_angle - angle).abs() > style.max_char_angle_delta
        {
            trace!(text = info.text(), "curve too sharp");
            return None;
        }

        let (t, u) = glyph_axes(angle);
        let center = (ci.metrics.ymin + ci.metrics.ymax) / 2.0;
        let (x, y, render_angle) = if orientation > 0 {
            (start.0 - u.0 * center, start.1 - u.1 * center, angle)
        } else {
            (
                start.0 + t.0 * ci.metrics.advance + u.0 * center,
                start.1 + t.1 * ci.metrics.advance + u.1 * center,
                angle + PI,
            )
        };
        let render_angle = render_angle.rem_euclid(2.0 * PI);
        if render_angle > PI / 2.0 && render_angle < 1.5 * PI {
            upside_down += 1;
        }
        placement.glyphs.push(PlacedGlyph {
            character: ci.metrics.character,
            index: idx,
            run: ci.run,
            x,
            y,
            angle: render_angle,
        });
    }

    if upside_down as f64 >= n as f64 / 2.0 {
        if forced {
            return None;
        }
        return get_placement_offset(
            style,
            info,
            path_positions,
            path_distances,
            -orientation,
            initial_index,
            initial_distance,
        );
    }
    Some((placement, orientation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::LabelCollisionDetector;
    use crate::text_metrics::CharMetrics;

    fn info(text: &str) -> StringInfo {
        StringInfo::from_metrics(
            text.chars()
                .map(|c| {
                    if c == '\n' {
                        CharMetrics::new(c, 0.0, 0.0, 0.0)
                    } else {
                        CharMetrics::new(c, 6.0, -2.0, 8.0)
                    }
                })
                .collect(),
        )
    }

    fn style() -> StyleProperties {
        StyleProperties {
            face_name: Some("DejaVu Sans".to_string()),
            ..Default::default()
        }
    }

    fn detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(Envelope::new(0.0, 0.0, 400.0, 400.0))
    }

    fn canvas() -> Envelope {
        Envelope::new(0.0, 0.0, 400.0, 400.0)
    }

    #[test]
    fn point_label_is_centred_on_anchor() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        assert!(finder.find_point_placement(&style(), &info("ab"), 100.0, 100.0, 0.0, &mut result));
        let p = &result.placements[0];
        assert_eq!(p.glyphs.len(), 2);
        assert!((p.glyphs[0].x - 94.0).abs() < 1e-9);
        assert!((p.glyphs[1].x - 100.0).abs() < 1e-9);
        // Box of height 10 centred on y = 100, ascent 8.
        assert!((p.glyphs[0].y - 103.0).abs() < 1e-9);
        assert_eq!(result.staged().len(), 2);
        finder.update_detector(&mut result);
        assert!(result.staged().is_empty());
        assert_eq!(finder.detector().len(), 2);
    }

    #[test]
    fn second_label_at_same_spot_collides_unless_overlap_allowed() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut first = PlacementResult::default();
        finder.find_point_placement(&style(), &info("abc"), 100.0, 100.0, 0.0, &mut first);
        finder.update_detector(&mut first);

        let mut second = PlacementResult::default();
        assert!(!finder.find_point_placement(&style(), &info("abc"), 104.0, 102.0, 0.0, &mut second));
        assert!(second.is_empty());

        let overlap = StyleProperties {
            allow_overlap: true,
            ..style()
        };
        assert!(finder.find_point_placement(&overlap, &info("abc"), 104.0, 102.0, 0.0, &mut second));
    }

    #[test]
    fn minimum_distance_keeps_labels_apart() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut first = PlacementResult::default();
        finder.find_point_placement(&style(), &info("ab"), 100.0, 100.0, 0.0, &mut first);
        finder.update_detector(&mut first);

        let spaced = StyleProperties {
            minimum_distance: 10.0,
            ..style()
        };
        let mut second = PlacementResult::default();
        // 4px gap to the right of the first label.
        assert!(!finder.find_point_placement(&spaced, &info("ab"), 116.0, 100.0, 0.0, &mut second));
        assert!(finder.find_point_placement(&style(), &info("ab"), 116.0, 100.0, 0.0, &mut second));
    }

    #[test]
    fn avoid_edges_and_padding_use_canvas() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        let edges = StyleProperties {
            avoid_edges: true,
            ..style()
        };
        assert!(!finder.find_point_placement(&edges, &info("abc"), 2.0, 100.0, 0.0, &mut result));
        let padded = StyleProperties {
            minimum_padding: 20.0,
            ..style()
        };
        assert!(!finder.find_point_placement(&padded, &info("abc"), 25.0, 100.0, 0.0, &mut result));
        assert!(finder.find_point_placement(&padded, &info("abc"), 60.0, 100.0, 0.0, &mut result));
    }

    #[test]
    fn overlap_allowed_labels_still_respect_edges() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut first = PlacementResult::default();
        assert!(finder.find_point_placement(&style(), &info("abc"), 100.0, 100.0, 0.0, &mut first));
        finder.update_detector(&mut first);

        let loose = StyleProperties {
            allow_overlap: true,
            avoid_edges: true,
            ..style()
        };
        let mut result = PlacementResult::default();
        assert!(finder.find_point_placement(&loose, &info("abc"), 102.0, 100.0, 0.0, &mut result));
        assert!(!finder.find_point_placement(&loose, &info("abc"), 2.0, 100.0, 0.0, &mut result));

        let padded = StyleProperties {
            allow_overlap: true,
            minimum_padding: 20.0,
            ..style()
        };
        assert!(!finder.find_point_placement(&padded, &info("abc"), 25.0, 100.0, 0.0, &mut result));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn label_outside_extent_is_rejected() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        assert!(!finder.find_point_placement(&style(), &info("ab"), -100.0, 100.0, 0.0, &mut result));
    }

    #[test]
    fn auto_alignment_follows_displacement() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        let below = StyleProperties {
            displacement: (0.0, 4.0),
            ..style()
        };
        assert!(finder.find_point_placement(&below, &info("ab"), 100.0, 100.0, 0.0, &mut result));
        let (ax, ay) = result.placements[0].anchor;
        assert!((ax - 100.0).abs() < 1e-9);
        assert!((ay - 109.0).abs() < 1e-9);
    }

    #[test]
    fn wrapping_breaks_at_wrap_character() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        let wrapped = StyleProperties {
            wrap_width: 10.0,
            ..style()
        };
        assert!(finder.find_point_placement(&wrapped, &info("aa bb cc"), 200.0, 200.0, 0.0, &mut result));
        let glyphs = &result.placements[0].glyphs;
        assert_eq!(glyphs.len(), 6);
        let mut rows: Vec<f64> = glyphs.iter().map(|g| g.y).collect();
        rows.dedup();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn explicit_newline_starts_a_line() {
        let block = break_lines(&style(), &info("ab\ncd"));
        assert_eq!(block.lines.len(), 2);
        assert_eq!((block.lines[1].start, block.lines[1].end), (3, 5));
        assert!((block.height - 20.0).abs() < 1e-9);
    }

    #[test]
    fn wrap_before_keeps_lines_under_width() {
        let s = StyleProperties {
            wrap_width: 20.0,
            wrap_before: true,
            ..style()
        };
        let block = break_lines(&s, &info("aa bb cc"));
        assert!(block.lines.iter().all(|l| l.width <= 20.0));
        assert_eq!(block.lines.len(), 3);
    }

    #[test]
    fn rotation_applies_to_glyphs() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        assert!(finder.find_point_placement(&style(), &info("ab"), 200.0, 200.0, 90.0, &mut result));
        let g = &result.placements[0].glyphs;
        assert!((g[0].angle - PI / 2.0).abs() < 1e-12);
        // Reading upwards: the second glyph sits above the first.
        assert!(g[1].y < g[0].y);
    }

    #[test]
    fn placement_offset_is_idempotent() {
        let path = PathCache::new(&[(10.0, 100.0), (80.0, 90.0), (160.0, 110.0), (300.0, 100.0)]);
        let s = style();
        let text = info("Main Street");
        let a = get_placement_offset(&s, &text, &path.positions, &path.distances, 0, 1, 35.0);
        let b = get_placement_offset(&s, &text, &path.positions, &path.distances, 0, 1, 35.0);
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn right_to_left_path_is_read_flipped() {
        let path = PathCache::new(&[(200.0, 100.0), (20.0, 100.0)]);
        let (placement, orientation) =
            get_placement_offset(&style(), &info("abc"), &path.positions, &path.distances, 0, 1, 10.0)
                .unwrap();
        assert_eq!(orientation, -1);
        for g in &placement.glyphs {
            assert!(!(g.angle > PI / 2.0 && g.angle < 1.5 * PI), "glyph upside down: {}", g.angle);
        }
        // Characters read left to right on screen.
        let a = placement.glyphs.iter().find(|g| g.character == 'a').unwrap();
        let c = placement.glyphs.iter().find(|g| g.character == 'c').unwrap();
        assert!(a.x < c.x);
    }

    #[test]
    fn forced_orientation_fails_when_upside_down() {
        let path = PathCache::new(&[(200.0, 100.0), (20.0, 100.0)]);
        let forced = get_placement_offset(&style(), &info("abc"), &path.positions, &path.distances, 1, 1, 10.0);
        assert!(forced.is_none());
    }

    #[test]
    fn sharp_corner_exceeds_max_angle_delta() {
        let path = PathCache::new(&[(10.0, 100.0), (50.0, 100.0), (50.0, 10.0)]);
        let text = info("abcdefgh");
        let strict = style();
        assert!(get_placement_offset(&strict, &text, &path.positions, &path.distances, 0, 1, 20.0).is_none());
        let lax = StyleProperties {
            max_char_angle_delta: 0.0,
            ..style()
        };
        assert!(get_placement_offset(&lax, &text, &path.positions, &path.distances, 0, 1, 20.0).is_some());
    }

    #[test]
    fn running_off_the_path_fails() {
        let path = PathCache::new(&[(0.0, 0.0), (30.0, 0.0)]);
        let text = info("abcdef");
        assert!(get_placement_offset(&style(), &text, &path.positions, &path.distances, 0, 1, 5.0).is_none());
        assert!(get_placement_offset(&style(), &text, &path.positions, &path.distances, 0, 1, -1.0).is_none());
    }

    #[test]
    fn repeated_vertex_at_start_is_skipped() {
        let text = info("abc");
        let doubled = PathCache::new(&[(0.0, 100.0), (0.0, 100.0), (200.0, 100.0)]);
        let clean = PathCache::new(&[(0.0, 100.0), (200.0, 100.0)]);
        let a = get_placement_offset(&style(), &text, &doubled.positions, &doubled.distances, 0, 1, 0.0);
        let b = get_placement_offset(&style(), &text, &clean.positions, &clean.distances, 0, 1, 0.0);
        let (a, b) = (a.unwrap().0, b.unwrap().0);
        assert_eq!(a.glyphs, b.glyphs);
    }

    #[test]
    fn invalid_scale_factor_keeps_line_search_finite() {
        let mut d = detector();
        d.insert(Envelope::new(0.0, 0.0, 400.0, 400.0));
        let mut finder = PlacementFinder::new(&mut d, canvas()).with_scale_factor(0.0);
        let mut result = PlacementResult::default();
        let path = [(20.0, 200.0), (380.0, 200.0)];
        finder.find_line_placements(&style(), &info("blocked"), &path, &mut result);
        assert!(result.is_empty());
    }

    #[test]
    fn line_labels_repeat_along_long_paths() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        let s = StyleProperties {
            label_spacing: 60.0,
            ..style()
        };
        finder.find_line_placements(&s, &info("road"), &[(0.0, 200.0), (400.0, 200.0)], &mut result);
        // floor(400 / (60 + 24)) = 4 labels.
        assert_eq!(result.len(), 4);
        assert!(result.staged().is_empty());
        assert_eq!(finder.detector().len(), 16);
        for p in &result.placements {
            assert_eq!(p.orientation, 1);
            assert_eq!(p.glyphs.len(), 4);
        }
    }

    #[test]
    fn line_label_longer_than_path_is_skipped() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        finder.find_line_placements(&style(), &info("a long name"), &[(0.0, 0.0), (20.0, 0.0)], &mut result);
        assert!(result.is_empty());
    }

    #[test]
    fn point_placements_are_spaced_along_path() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        finder.set_dimensions(Some((20.0, 20.0)));
        let s = StyleProperties {
            label_spacing: 100.0,
            ..style()
        };
        let mut result = PlacementResult::default();
        finder.find_point_placements(&s, &info("A1"), &[(0.0, 50.0), (300.0, 50.0)], &mut result);
        assert_eq!(result.len(), 3);
        for (p, expected) in result.placements.iter().zip([50.0, 150.0, 250.0]) {
            assert!((p.anchor.0 - expected).abs() < 1e-9);
        }
        assert!(result.placements.iter().all(|p| p.envelopes.len() == 1));
    }

    #[test]
    fn clear_drops_staged_envelopes() {
        let mut d = detector();
        let mut finder = PlacementFinder::new(&mut d, canvas());
        let mut result = PlacementResult::default();
        finder.find_point_placement(&style(), &info("ab"), 100.0, 100.0, 0.0, &mut result);
        finder.clear(&mut result);
        finder.update_detector(&mut result);
        assert!(result.is_empty());
        assert!(finder.detector().is_empty());
    }
}
