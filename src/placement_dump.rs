use crate::placement::PlacedLabel;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct PlacementDump {
    pub width: f64,
    pub height: f64,
    pub labels: Vec<LabelDump>,
}

#[derive(Debug, Serialize)]
pub struct LabelDump {
    pub feature_id: u64,
    pub geometry_index: usize,
    pub text: String,
    pub size: f64,
    pub displacement: [f64; 2],
    pub placements: Vec<PlacementEntry>,
    pub icons: Vec<[f64; 4]>,
}

#[derive(Debug, Serialize)]
pub struct PlacementEntry {
    pub anchor: [f64; 2],
    pub orientation: i32,
    pub glyphs: Vec<GlyphDump>,
    pub envelopes: Vec<[f64; 4]>,
}

#[derive(Debug, Serialize)]
pub struct GlyphDump {
    pub ch: char,
    pub x: f64,
    pub y: f64,
    pub angle_degrees: f64,
}

impl PlacementDump {
    pub fn from_labels(labels: &[PlacedLabel], width: f64, height: f64) -> Self {
        let labels = labels
            .iter()
            .map(|label| LabelDump {
                feature_id: label.feature_id,
                geometry_index: label.geometry_index,
                text: label.text.clone(),
                size: label.style.size,
                displacement: [label.style.displacement.0, label.style.displacement.1],
                placements: label
                    .placements
                    .iter()
                    .map(|p| PlacementEntry {
                        anchor: [p.anchor.0, p.anchor.1],
                        orientation: p.orientation,
                        glyphs: p
                            .glyphs
                            .iter()
                            .map(|g| GlyphDump {
                                ch: g.character,
                                x: g.x,
                                y: g.y,
                                angle_degrees: g.angle.to_degrees(),
                            })
                            .collect(),
                        envelopes: p
                            .envelopes
                            .iter()
                            .map(|e| [e.min_x, e.min_y, e.max_x, e.max_y])
                            .collect(),
                    })
                    .collect(),
                icons: label
                    .icons
                    .iter()
                    .map(|e| [e.min_x, e.min_y, e.max_x, e.max_y])
                    .collect(),
            })
            .collect();
        PlacementDump {
            width,
            height,
            labels,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn write_placement_dump(
    path: &Path,
    labels: &[PlacedLabel],
    width: f64,
    height: f64,
) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let dump = PlacementDump::from_labels(labels, width, height);
    serde_json::to_writer_pretty(writer, &dump)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{Envelope, GlyphPlacement, PlacedGlyph};
    use crate::style::StyleProperties;

    #[test]
    fn writes_dump_to_file() {
        let path = std::env::temp_dir().join(format!("mlp-dump-{}.json", std::process::id()));
        write_placement_dump(&path, &[], 320.0, 240.0).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let json: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json["width"], 320.0);
        assert!(json["labels"].as_array().unwrap().is_empty());
    }

    #[test]
    fn dump_reports_degrees_and_boxes() {
        let label = PlacedLabel {
            feature_id: 4,
            geometry_index: 0,
            text: "A".to_string(),
            style: StyleProperties::default(),
            runs: Vec::new(),
            placements: vec![GlyphPlacement {
                anchor: (10.0, 20.0),
                glyphs: vec![PlacedGlyph {
                    character: 'A',
                    index: 0,
                    run: 0,
                    x: 8.0,
                    y: 22.0,
                    angle: std::f64::consts::FRAC_PI_2,
                }],
                envelopes: vec![Envelope::new(8.0, 14.0, 14.0, 24.0)],
                orientation: 0,
            }],
            icons: Vec::new(),
        };
        let dump = PlacementDump::from_labels(&[label], 100.0, 50.0);
        let json: serde_json::Value = serde_json::from_str(&dump.to_json().unwrap()).unwrap();
        let glyph = &json["labels"][0]["placements"][0]["glyphs"][0];
        assert_eq!(glyph["ch"], "A");
        assert!((glyph["angle_degrees"].as_f64().unwrap() - 90.0).abs() < 1e-9);
        assert_eq!(json["labels"][0]["placements"][0]["envelopes"][0][3], 24.0);
    }
}
