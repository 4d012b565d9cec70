use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::style::{Displacement, StyleOverrides, StyleProperties};

/// Alternative style variants tried, in order, until a label fits.
///
/// `next` advances to the next style variant and resets the position state;
/// `next_position_only` advances the displacement within the current one.
pub trait VariantIterator {
    fn next(&mut self) -> bool;
    fn next_position_only(&mut self) -> bool;
    fn current_style(&self) -> &StyleProperties;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Exact,
    North,
    East,
    South,
    West,
    NorthEast,
    SouthEast,
    NorthWest,
    SouthWest,
}

impl Direction {
    fn from_token(token: &str) -> Option<Self> {
        Some(match token {
            "X" => Direction::Exact,
            "N" => Direction::North,
            "E" => Direction::East,
            "S" => Direction::South,
            "W" => Direction::West,
            "NE" => Direction::NorthEast,
            "SE" => Direction::SouthEast,
            "NW" => Direction::NorthWest,
            "SW" => Direction::SouthWest,
            _ => return None,
        })
    }

    /// Displacement for this direction built from the magnitudes of `base`.
    pub fn displacement(self, base: Displacement) -> Displacement {
        let dx = base.0.abs();
        let dy = base.1.abs();
        match self {
            Direction::Exact => base,
            Direction::North => (0.0, -dy),
            Direction::East => (dx, 0.0),
            Direction::South => (0.0, dy),
            Direction::West => (-dx, 0.0),
            Direction::NorthEast => (dx, -dy),
            Direction::SouthEast => (dx, dy),
            Direction::NorthWest => (-dx, -dy),
            Direction::SouthWest => (-dx, dy),
        }
    }
}

/// Parsed `"N,S,E,12,10"` position string: directions, then sizes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionList {
    pub directions: Vec<Direction>,
    pub sizes: Vec<f64>,
    source: String,
}

impl PositionList {
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl From<String> for PositionList {
    fn from(value: String) -> Self {
        parse_positions(&value)
    }
}

impl From<PositionList> for String {
    fn from(value: PositionList) -> Self {
        value.source
    }
}

/// Parses a position string. Malformed trailing input is dropped with a warning.
pub fn parse_positions(input: &str) -> PositionList {
    let mut list = PositionList {
        source: input.to_string(),
        ..Default::default()
    };
    let tokens: Vec<&str> = input.split(',').map(str::trim).collect();
    let mut idx = 0;
    while idx < tokens.len() {
        let Some(dir) = Direction::from_token(tokens[idx]) else {
            break;
        };
        if !list.directions.contains(&dir) {
            list.directions.push(dir);
        }
        idx += 1;
    }
    if !list.directions.is_empty() {
        while idx < tokens.len() {
            let Ok(size) = tokens[idx].parse::<i64>() else {
                break;
            };
            let size = size as f64;
            if !list.sizes.contains(&size) {
                list.sizes.push(size);
            }
            idx += 1;
        }
    }
    if idx < tokens.len() {
        let rest = tokens[idx..].join(",");
        warn!(positions = input, "could not parse text placement list, ignoring '{rest}'");
    }
    if list.directions.is_empty() {
        warn!(positions = input, "text placement list contains no positions");
    }
    list
}

/// Placement strategy configuration attached to a symbolizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Placements {
    #[default]
    Dummy,
    Simple {
        #[serde(with = "position_string")]
        positions: PositionList,
    },
    List {
        #[serde(default)]
        variants: Vec<StyleOverrides>,
    },
}

impl Placements {
    /// Fresh iterator over the variants of `base`.
    pub fn variants(&self, base: &StyleProperties) -> PlacementVariants {
        match self {
            Placements::Dummy => PlacementVariants::Dummy(DummyVariants::new(base)),
            Placements::Simple { positions } => {
                PlacementVariants::Simple(SimpleVariants::new(base, positions))
            }
            Placements::List { variants } => {
                PlacementVariants::List(ListVariants::new(base, variants))
            }
        }
    }
}

mod position_string {
    use super::PositionList;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(list: &PositionList, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(list.source())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PositionList, D::Error> {
        String::deserialize(deserializer).map(PositionList::from)
    }
}

#[derive(Debug, Clone)]
pub enum PlacementVariants {
    Dummy(DummyVariants),
    Simple(SimpleVariants),
    List(ListVariants),
}

impl VariantIterator for PlacementVariants {
    fn next(&mut self) -> bool {
        match self {
            PlacementVariants::Dummy(v) => v.next(),
            PlacementVariants::Simple(v) => v.next(),
            PlacementVariants::List(v) => v.next(),
        }
    }

    fn next_position_only(&mut self) -> bool {
        match self {
            PlacementVariants::Dummy(v) => v.next_position_only(),
            PlacementVariants::Simple(v) => v.next_position_only(),
            PlacementVariants::List(v) => v.next_position_only(),
        }
    }

    fn current_style(&self) -> &StyleProperties {
        match self {
            PlacementVariants::Dummy(v) => v.current_style(),
            PlacementVariants::Simple(v) => v.current_style(),
            PlacementVariants::List(v) => v.current_style(),
        }
    }
}

/// The base style, once.
#[derive(Debug, Clone)]
pub struct DummyVariants {
    style: StyleProperties,
    style_done: bool,
    position_done: bool,
}

impl DummyVariants {
    fn new(base: &StyleProperties) -> Self {
        Self {
            style: base.clone(),
            style_done: false,
            position_done: false,
        }
    }
}

impl VariantIterator for DummyVariants {
    fn next(&mut self) -> bool {
        if self.style_done {
            return false;
        }
        self.style_done = true;
        self.position_done = false;
        true
    }

    fn next_position_only(&mut self) -> bool {
        if self.position_done {
            return false;
        }
        self.position_done = true;
        true
    }

    fn current_style(&self) -> &StyleProperties {
        &self.style
    }
}

/// Sizes `[default, s1, s2, ...]` crossed with compass directions.
#[derive(Debug, Clone)]
pub struct SimpleVariants {
    base: StyleProperties,
    style: StyleProperties,
    directions: Vec<Direction>,
    sizes: Vec<f64>,
    state: usize,
    position_state: usize,
}

impl SimpleVariants {
    fn new(base: &StyleProperties, positions: &PositionList) -> Self {
        let sizes = positions
            .sizes
            .iter()
            .copied()
            .filter(|size| *size != base.size)
            .collect();
        Self {
            base: base.clone(),
            style: base.clone(),
            directions: positions.directions.clone(),
            sizes,
            state: 0,
            position_state: 0,
        }
    }
}

impl VariantIterator for SimpleVariants {
    fn next(&mut self) -> bool {
        self.position_state = 0;
        if self.state == 0 {
            self.style.size = self.base.size;
        } else {
            let Some(size) = self.sizes.get(self.state - 1) else {
                return false;
            };
            self.style.size = *size;
        }
        self.state += 1;
        true
    }

    fn next_position_only(&mut self) -> bool {
        let Some(dir) = self.directions.get(self.position_state) else {
            return false;
        };
        self.style.displacement = dir.displacement(self.base.displacement);
        self.position_state += 1;
        true
    }

    fn current_style(&self) -> &StyleProperties {
        &self.style
    }
}

/// The base style followed by each list entry; one position per style.
#[derive(Debug, Clone)]
pub struct ListVariants {
    styles: Vec<StyleProperties>,
    state: usize,
    position_done: bool,
}

impl ListVariants {
    fn new(base: &StyleProperties, entries: &[StyleOverrides]) -> Self {
        let mut styles = vec![base.clone()];
        for entry in entries {
            // Each entry starts from the one before it.
            let style = styles.last().map(|prev| entry.applied_to(prev));
            if let Some(style) = style
                && !styles.contains(&style)
            {
                styles.push(style);
            }
        }
        Self {
            styles,
            state: 0,
            position_done: false,
        }
    }
}

impl VariantIterator for ListVariants {
    fn next(&mut self) -> bool {
        if self.state >= self.styles.len() {
            return false;
        }
        self.state += 1;
        self.position_done = false;
        true
    }

    fn next_position_only(&mut self) -> bool {
        if self.position_done || self.state == 0 {
            return false;
        }
        self.position_done = true;
        true
    }

    fn current_style(&self) -> &StyleProperties {
        let idx = self.state.saturating_sub(1).min(self.styles.len() - 1);
        &self.styles[idx]
    }
}
