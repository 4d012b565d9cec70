use crate::error::{Error, Result};
use crate::expression::Expression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Displacement = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelPlacement {
    #[default]
    Point,
    Line,
    Vertex,
    Interior,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HorizontalAlignment {
    Left,
    Middle,
    Right,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlignment {
    Top,
    Middle,
    Bottom,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JustifyAlignment {
    Left,
    #[default]
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextTransform {
    #[default]
    None,
    Uppercase,
    Lowercase,
    Capitalize,
}

impl TextTransform {
    pub fn apply(self, text: &str) -> String {
        match self {
            TextTransform::None => text.to_string(),
            TextTransform::Uppercase => text.to_uppercase(),
            TextTransform::Lowercase => text.to_lowercase(),
            TextTransform::Capitalize => capitalize(text),
        }
    }
}

// Title case: first letter of every word upper, the rest lower.
fn capitalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

/// Resolved text style for one label attempt.
///
/// Variant iterators copy and specialize it; the placement finder only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleProperties {
    pub size: f64,
    pub face_name: Option<String>,
    pub fontset_name: Option<String>,
    pub fill: String,
    pub halo_fill: String,
    pub halo_radius: f64,
    pub opacity: f64,
    pub placement: LabelPlacement,
    pub horizontal_alignment: HorizontalAlignment,
    pub vertical_alignment: VerticalAlignment,
    pub justify_alignment: JustifyAlignment,
    pub displacement: Displacement,
    pub line_spacing: f64,
    pub character_spacing: f64,
    pub label_spacing: f64,
    pub label_position_tolerance: f64,
    pub minimum_distance: f64,
    pub minimum_padding: f64,
    /// Radians. Configuration files give it in degrees.
    #[serde(with = "degrees")]
    pub max_char_angle_delta: f64,
    pub force_odd_labels: bool,
    pub allow_overlap: bool,
    pub avoid_edges: bool,
    pub text_transform: TextTransform,
    pub wrap_width: f64,
    pub wrap_character: char,
    pub wrap_before: bool,
    pub text_ratio: f64,
    pub orientation: Option<Expression>,
}

impl Default for StyleProperties {
    fn default() -> Self {
        Self {
            size: 10.0,
            face_name: None,
            fontset_name: None,
            fill: "#000000".to_string(),
            halo_fill: "#FFFFFF".to_string(),
            halo_radius: 0.0,
            opacity: 1.0,
            placement: LabelPlacement::Point,
            horizontal_alignment: HorizontalAlignment::Auto,
            vertical_alignment: VerticalAlignment::Auto,
            justify_alignment: JustifyAlignment::Middle,
            displacement: (0.0, 0.0),
            line_spacing: 0.0,
            character_spacing: 0.0,
            label_spacing: 0.0,
            label_position_tolerance: 0.0,
            minimum_distance: 0.0,
            minimum_padding: 0.0,
            max_char_angle_delta: 22.5_f64.to_radians(),
            force_odd_labels: false,
            allow_overlap: false,
            avoid_edges: false,
            text_transform: TextTransform::None,
            wrap_width: 0.0,
            wrap_character: ' ',
            wrap_before: false,
            text_ratio: 0.0,
            orientation: None,
        }
    }
}

impl StyleProperties {
    /// Checks the font reference against the known fontsets.
    ///
    /// Exactly one of `face_name` and `fontset_name` must be set, and a named
    /// fontset must exist.
    pub fn validate_font(&self, fontsets: &BTreeMap<String, Vec<String>>) -> Result<()> {
        if let Some(name) = &self.fontset_name
            && !fontsets.contains_key(name)
        {
            return Err(Error::UnknownFontset(name.clone()));
        }
        match (&self.face_name, &self.fontset_name) {
            (Some(_), Some(_)) => Err(Error::ConflictingFontSpec),
            (None, None) => Err(Error::NoFontSpec),
            _ => Ok(()),
        }
    }

    /// Font family names to try, in order.
    pub fn font_families<'a>(&'a self, fontsets: &'a BTreeMap<String, Vec<String>>) -> Vec<&'a str> {
        if let Some(set) = self.fontset_name.as_ref().and_then(|name| fontsets.get(name)) {
            return set.iter().map(String::as_str).collect();
        }
        self.face_name.as_deref().into_iter().collect()
    }

    /// Human readable name of the font reference, used in error messages.
    pub fn font_label(&self) -> String {
        self.face_name
            .clone()
            .or_else(|| self.fontset_name.clone())
            .unwrap_or_default()
    }
}

/// Partial style used by format tokens and list placement entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleOverrides {
    pub size: Option<f64>,
    pub face_name: Option<String>,
    pub fontset_name: Option<String>,
    pub fill: Option<String>,
    pub halo_fill: Option<String>,
    pub halo_radius: Option<f64>,
    pub opacity: Option<f64>,
    pub placement: Option<LabelPlacement>,
    pub horizontal_alignment: Option<HorizontalAlignment>,
    pub vertical_alignment: Option<VerticalAlignment>,
    pub justify_alignment: Option<JustifyAlignment>,
    pub displacement: Option<Displacement>,
    pub character_spacing: Option<f64>,
    pub line_spacing: Option<f64>,
    pub text_transform: Option<TextTransform>,
    pub wrap_width: Option<f64>,
}

impl StyleOverrides {
    pub fn apply(&self, style: &mut StyleProperties) {
        if let Some(v) = self.size {
            style.size = v;
        }
        if let Some(v) = &self.face_name {
            style.face_name = Some(v.clone());
            style.fontset_name = None;
        }
        if let Some(v) = &self.fontset_name {
            style.fontset_name = Some(v.clone());
            style.face_name = None;
        }
        if let Some(v) = &self.fill {
            style.fill = v.clone();
        }
        if let Some(v) = &self.halo_fill {
            style.halo_fill = v.clone();
        }
        if let Some(v) = self.halo_radius {
            style.halo_radius = v;
        }
        if let Some(v) = self.opacity {
            style.opacity = v;
        }
        if let Some(v) = self.placement {
            style.placement = v;
        }
        if let Some(v) = self.horizontal_alignment {
            style.horizontal_alignment = v;
        }
        if let Some(v) = self.vertical_alignment {
            style.vertical_alignment = v;
        }
        if let Some(v) = self.justify_alignment {
            style.justify_alignment = v;
        }
        if let Some(v) = self.displacement {
            style.displacement = v;
        }
        if let Some(v) = self.character_spacing {
            style.character_spacing = v;
        }
        if let Some(v) = self.line_spacing {
            style.line_spacing = v;
        }
        if let Some(v) = self.text_transform {
            style.text_transform = v;
        }
        if let Some(v) = self.wrap_width {
            style.wrap_width = v;
        }
    }

    pub fn applied_to(&self, base: &StyleProperties) -> StyleProperties {
        let mut style = base.clone();
        self.apply(&mut style);
        style
    }
}

mod degrees {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(radians: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(radians.to_degrees())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let degrees = f64::deserialize(deserializer)?;
        Ok(degrees.to_radians())
    }
}
