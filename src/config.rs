use crate::error::Result as PlacementResult;
use crate::feature::Feature;
use crate::symbolizer::Symbolizer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: f64,
    pub height: f64,
    pub background: String,
    pub scale_factor: f64,
    /// Labels may extend this far past the canvas edge.
    pub buffer_size: f64,
    /// Use approximate character widths instead of loading fonts.
    pub fast_text_metrics: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200.0,
            height: 800.0,
            background: "#FFFFFF".to_string(),
            scale_factor: 1.0,
            buffer_size: 0.0,
            fast_text_metrics: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConfig {
    /// Named lists of font families, tried in order.
    pub fontsets: BTreeMap<String, Vec<String>>,
    /// Face used by symbolizers that name neither a face nor a fontset.
    pub default_face: Option<String>,
    /// Extra directories scanned for font files.
    pub font_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub render: RenderConfig,
    pub fonts: FontConfig,
}

impl Config {
    /// Canvas settings and fontsets from a map file take precedence.
    pub fn merge_map(&mut self, map: &MapDocument) {
        if let Some(width) = map.width {
            self.render.width = width;
        }
        if let Some(height) = map.height {
            self.render.height = height;
        }
        if let Some(background) = &map.background {
            self.render.background = background.clone();
        }
        for (name, families) in &map.fontsets {
            self.fonts.fontsets.insert(name.clone(), families.clone());
        }
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&contents)?;
    Ok(config)
}

/// A map to label: layers of features in device coordinates, each layer with
/// the symbolizers applied to its features.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MapDocument {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub fontsets: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub layers: Vec<Layer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbolizers: Vec<Symbolizer>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl MapDocument {
    /// Fills default faces and checks every symbolizer's font reference.
    pub fn resolve_fonts(&mut self, fonts: &FontConfig) -> PlacementResult<()> {
        for layer in &mut self.layers {
            for symbolizer in &mut layer.symbolizers {
                symbolizer.resolve_fonts(&fonts.fontsets, fonts.default_face.as_deref())?;
            }
        }
        Ok(())
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.features.len()).sum()
    }
}

/// Parses a map file. JSON5 is accepted, so comments and trailing commas are fine.
pub fn parse_map(input: &str) -> anyhow::Result<MapDocument> {
    let map: MapDocument = json5::from_str(input)?;
    Ok(map)
}

pub fn load_map(path: &Path) -> anyhow::Result<MapDocument> {
    let contents = std::fs::read_to_string(path)?;
    parse_map(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const MAP: &str = r#"{
        // two cities and a road
        width: 640,
        height: 480,
        fontsets: { roads: ["DejaVu Sans", "Noto Sans"] },
        layers: [
            {
                name: "places",
                symbolizers: [
                    { type: "text", text: ["[name]"], size: 12,
                      placements: { type: "simple", positions: "N,S,E,W" } },
                ],
                features: [
                    { id: 1, attributes: { name: "Springfield" },
                      geometries: [{ kind: "point", points: [[120, 80]] }] },
                ],
            },
            {
                name: "roads",
                symbolizers: [
                    { type: "text", text: ["[ref]"], fontset_name: "roads", placement: "line" },
                ],
                features: [
                    { id: 2, attributes: { ref: 66 },
                      geometries: [{ kind: "linestring", points: [[10, 300], [600, 320]] }] },
                ],
            },
        ],
    }"#;

    #[test]
    fn parses_json5_map() {
        let map = parse_map(MAP).unwrap();
        assert_eq!(map.width, Some(640.0));
        assert_eq!(map.layers.len(), 2);
        assert_eq!(map.feature_count(), 2);
        assert_eq!(map.layers[1].features[0].geometries[0].points.len(), 2);
    }

    #[test]
    fn map_overrides_canvas_and_fontsets() {
        let map = parse_map(MAP).unwrap();
        let mut config = Config::default();
        config.merge_map(&map);
        assert_eq!((config.render.width, config.render.height), (640.0, 480.0));
        assert!(config.fonts.fontsets.contains_key("roads"));
    }

    #[test]
    fn font_resolution_uses_default_face() {
        let mut map = parse_map(MAP).unwrap();
        let mut config = Config::default();
        config.merge_map(&map);
        assert!(matches!(map.clone().resolve_fonts(&config.fonts), Err(Error::NoFontSpec)));

        config.fonts.default_face = Some("DejaVu Sans".to_string());
        map.resolve_fonts(&config.fonts).unwrap();
    }

    #[test]
    fn unknown_fontset_is_reported() {
        let mut map = parse_map(MAP).unwrap();
        let fonts = FontConfig {
            default_face: Some("DejaVu Sans".to_string()),
            ..Default::default()
        };
        let err = map.resolve_fonts(&fonts).unwrap_err();
        assert!(matches!(err, Error::UnknownFontset(ref name) if name == "roads"));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: Config = serde_json::from_str(r#"{"render": {"scale_factor": 2}}"#).unwrap();
        assert_eq!(config.render.scale_factor, 2.0);
        assert_eq!(config.render.width, 1200.0);
    }
}
