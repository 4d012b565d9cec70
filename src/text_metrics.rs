use crate::error::{Error, Result};
use crate::placement::StyledRun;
use crate::style::StyleProperties;
use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use std::collections::{BTreeMap, HashMap};
use ttf_parser::Face;

/// Metrics of one code point at a given style.
///
/// `ymin`/`ymax` are relative to the baseline, y up (`ymin` is usually negative).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharMetrics {
    pub character: char,
    pub width: f64,
    pub advance: f64,
    pub height: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl CharMetrics {
    pub fn new(character: char, advance: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            character,
            width: advance,
            advance,
            height: ymax - ymin,
            ymin,
            ymax,
        }
    }
}

/// Font engine seam: per-character metrics for a run of text.
pub trait StringMetrics {
    /// Must return exactly one entry per code point of `text`.
    fn measure(&mut self, text: &str, style: &StyleProperties) -> Result<Vec<CharMetrics>>;
}

/// One measured character of a label, tagged with the run it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharInfo {
    pub metrics: CharMetrics,
    pub run: usize,
}

/// All characters of one label across its styled runs, measured up front.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringInfo {
    chars: Vec<CharInfo>,
    text: String,
}

impl StringInfo {
    /// Measures every run once; placement attempts reuse the result.
    pub fn measure(
        runs: &[StyledRun],
        metrics: &mut dyn StringMetrics,
        scale_factor: f64,
    ) -> Result<Self> {
        let mut info = StringInfo::default();
        for (run_idx, run) in runs.iter().enumerate() {
            let scaled;
            let style = if scale_factor != 1.0 {
                let mut style = run.style.clone();
                style.size *= scale_factor;
                scaled = style;
                &scaled
            } else {
                &run.style
            };
            let measured = metrics.measure(&run.text, style)?;
            let expected = run.text.chars().count();
            if measured.len() != expected {
                return Err(Error::MetricsMismatch {
                    expected,
                    actual: measured.len(),
                });
            }
            info.text.push_str(&run.text);
            info.chars.extend(measured.into_iter().map(|metrics| CharInfo {
                metrics,
                run: run_idx,
            }));
        }
        Ok(info)
    }

    pub fn from_metrics(metrics: Vec<CharMetrics>) -> Self {
        let text = metrics.iter().map(|m| m.character).collect();
        let chars = metrics
            .into_iter()
            .map(|metrics| CharInfo { metrics, run: 0 })
            .collect();
        Self { chars, text }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn at(&self, index: usize) -> &CharInfo {
        &self.chars[index]
    }

    pub fn chars(&self) -> &[CharInfo] {
        &self.chars
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Sum of advances and the tallest character height.
    pub fn dimensions(&self) -> (f64, f64) {
        let width = self.chars.iter().map(|c| c.metrics.advance).sum();
        let height = self
            .chars
            .iter()
            .map(|c| c.metrics.height)
            .fold(0.0, f64::max);
        (width, height)
    }
}

/// Calibrated per-character widths; no font files are touched.
#[derive(Debug, Clone, Default)]
pub struct ApproximateMetrics;

impl StringMetrics for ApproximateMetrics {
    fn measure(&mut self, text: &str, style: &StyleProperties) -> Result<Vec<CharMetrics>> {
        let size = style.size;
        Ok(text
            .chars()
            .map(|ch| {
                let advance = if ch == '\n' {
                    0.0
                } else {
                    char_width_factor(ch) * size
                };
                CharMetrics::new(ch, advance, -0.24 * size, 0.76 * size)
            })
            .collect())
    }
}

pub(crate) fn char_width_factor(ch: char) -> f64 {
    // Advance widths at 1px, borrowed calibration data for a common
    // sans-serif face. Unlisted characters get an average width.
    match ch {
        ' ' => 0.306,
        '\\' | '.' | ',' | ':' | ';' | '|' | '!' | '(' | ')' | '[' | ']' | '{' | '}' => 0.321,
        'A' => 0.652,
        'B' => 0.648,
        'C' => 0.734,
        'D' => 0.723,
        'E' => 0.594,
        'F' => 0.575,
        'G' | 'H' => 0.742,
        'I' => 0.272,
        'J' => 0.557,
        'K' => 0.648,
        'L' => 0.559,
        'M' => 0.903,
        'N' => 0.763,
        'O' => 0.754,
        'P' => 0.623,
        'Q' => 0.755,
        'R' => 0.637,
        'S' => 0.633,
        'T' => 0.599,
        'U' => 0.746,
        'V' => 0.661,
        'W' => 0.958,
        'X' => 0.655,
        'Y' => 0.646,
        'Z' => 0.621,
        'a' => 0.550,
        'b' => 0.603,
        'c' => 0.547,
        'd' => 0.609,
        'e' => 0.570,
        'f' => 0.340,
        'g' | 'h' => 0.600,
        'i' => 0.235,
        'j' => 0.227,
        'k' => 0.522,
        'l' => 0.239,
        'm' => 0.867,
        'n' => 0.585,
        'o' => 0.574,
        'p' => 0.595,
        'q' => 0.585,
        'r' => 0.364,
        's' => 0.523,
        't' => 0.305,
        'u' => 0.585,
        'v' => 0.545,
        'w' => 0.811,
        'x' => 0.538,
        'y' => 0.556,
        'z' => 0.550,
        '0' => 0.613,
        '1' => 0.396,
        '2' => 0.609,
        '3' => 0.597,
        '4' => 0.614,
        '5' => 0.586,
        '6' => 0.608,
        '7' => 0.559,
        '8' => 0.611,
        '9' => 0.595,
        '@' | '#' | '%' | '&' => 0.946,
        _ => 0.568,
    }
}

/// Metrics read from real font files through fontdb.
pub struct FontMetrics {
    db: Database,
    fontsets: BTreeMap<String, Vec<String>>,
    cache: HashMap<String, Option<FontFace>>,
}

impl FontMetrics {
    /// Uses the fonts installed on the system.
    pub fn system(fontsets: BTreeMap<String, Vec<String>>) -> Self {
        let mut db = Database::new();
        db.load_system_fonts();
        Self::with_database(db, fontsets)
    }

    pub fn with_database(db: Database, fontsets: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            db,
            fontsets,
            cache: HashMap::new(),
        }
    }

    fn face_for(&mut self, style: &StyleProperties) -> Result<&mut FontFace> {
        let families: Vec<String> = style
            .font_families(&self.fontsets)
            .into_iter()
            .map(str::to_string)
            .collect();
        if families.is_empty() {
            return Err(Error::NoFontSpec);
        }
        let key = families.join(",");
        if !self.cache.contains_key(&key) {
            let face = load_face(&self.db, &families);
            if face.is_none() {
                tracing::warn!(fonts = %key, "no matching font face");
            }
            self.cache.insert(key.clone(), face);
        }
        self.cache
            .get_mut(&key)
            .and_then(|face| face.as_mut())
            .ok_or_else(|| Error::MissingFontFace(style.font_label()))
    }
}

impl StringMetrics for FontMetrics {
    fn measure(&mut self, text: &str, style: &StyleProperties) -> Result<Vec<CharMetrics>> {
        let size = style.size;
        let face = self.face_for(style)?;
        Ok(face.measure(text, size))
    }
}

fn load_face(db: &Database, names: &[String]) -> Option<FontFace> {
    let families: Vec<Family<'_>> = names
        .iter()
        .map(|name| match name.to_ascii_lowercase().as_str() {
            "serif" => Family::Serif,
            "sans-serif" => Family::SansSerif,
            "monospace" => Family::Monospace,
            "cursive" => Family::Cursive,
            "fantasy" => Family::Fantasy,
            _ => Family::Name(name.as_str()),
        })
        .collect();
    let query = Query {
        families: &families,
        weight: Weight::NORMAL,
        stretch: Stretch::Normal,
        style: Style::Normal,
    };
    let id = db.query(&query)?;
    db.with_face_data(id, |data, index| FontFace::new(data.to_vec(), index))
        .flatten()
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    advances: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = face.units_per_em().max(1);
        let ascender = face.ascender();
        let descender = face.descender();
        Some(Self {
            data,
            index,
            units_per_em,
            ascender,
            descender,
            advances: HashMap::new(),
        })
    }

    fn measure(&mut self, text: &str, font_size: f64) -> Vec<CharMetrics> {
        let scale = font_size / self.units_per_em as f64;
        let ymax = self.ascender as f64 * scale;
        let ymin = self.descender as f64 * scale;
        let fallback = font_size * 0.56;
        let face = Face::parse(&self.data, self.index).ok();
        text.chars()
            .map(|ch| {
                if ch == '\n' {
                    return CharMetrics::new(ch, 0.0, ymin, ymax);
                }
                let advance = *self.advances.entry(ch).or_insert_with(|| {
                    let face = face.as_ref()?;
                    let glyph = face.glyph_index(ch)?;
                    face.glyph_hor_advance(glyph)
                });
                let width = match advance {
                    Some(units) => units as f64 * scale,
                    None => fallback,
                };
                CharMetrics::new(ch, width, ymin, ymax)
            })
            .collect()
    }
}
