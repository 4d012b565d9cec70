use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::placement::{FormatNode, FormattingPipeline, Placements};
use crate::style::{Displacement, StyleProperties};

/// Text label attached to features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextSymbolizer {
    #[serde(default)]
    pub text: Vec<FormatNode>,
    #[serde(default)]
    pub placements: Placements,
    #[serde(flatten)]
    pub style: StyleProperties,
}

impl TextSymbolizer {
    pub fn new(text: Vec<FormatNode>, style: StyleProperties) -> Self {
        Self {
            text,
            placements: Placements::Dummy,
            style,
        }
    }

    pub fn with_placements(mut self, placements: Placements) -> Self {
        self.placements = placements;
        self
    }

    /// Formatting pipeline seeded with one style variant.
    pub fn pipeline(&self, defaults: &StyleProperties) -> FormattingPipeline {
        FormattingPipeline::from_nodes(&self.text, defaults.clone())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IconSpec {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub displacement: Displacement,
    #[serde(default)]
    pub file: Option<String>,
}

/// Text drawn over an icon; both must fit or neither is placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShieldSymbolizer {
    pub icon: IconSpec,
    /// Centre the icon on the reference point instead of following the text
    /// displacement.
    #[serde(default)]
    pub unlock_image: bool,
    #[serde(default)]
    pub no_text: bool,
    #[serde(flatten)]
    pub text: TextSymbolizer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Symbolizer {
    Text(TextSymbolizer),
    Shield(ShieldSymbolizer),
}

impl Symbolizer {
    pub fn text_symbolizer(&self) -> &TextSymbolizer {
        match self {
            Symbolizer::Text(sym) => sym,
            Symbolizer::Shield(sym) => &sym.text,
        }
    }

    /// Fills in `default_face` where no font is named, then checks fonts.
    pub fn resolve_fonts(
        &mut self,
        fontsets: &BTreeMap<String, Vec<String>>,
        default_face: Option<&str>,
    ) -> Result<()> {
        let style = match self {
            Symbolizer::Text(sym) => &mut sym.style,
            Symbolizer::Shield(sym) => &mut sym.text.style,
        };
        if style.face_name.is_none()
            && style.fontset_name.is_none()
            && let Some(face) = default_face
        {
            style.face_name = Some(face.to_string());
        }
        style.validate_font(fontsets)
    }
}
