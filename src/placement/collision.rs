use std::collections::{HashMap, HashSet};

use super::Envelope;

const DEFAULT_CELL_SIZE: f64 = 48.0;
const MIN_CELL_SIZE: f64 = 16.0;

/// Record of the envelopes already claimed by committed labels.
///
/// Entries are never removed during a rendering pass.
pub trait OccupancyIndex {
    /// True when `envelope` overlaps no committed envelope.
    fn has_placement(&self, envelope: &Envelope) -> bool;

    fn insert(&mut self, envelope: Envelope);

    /// The region labels may occupy: the canvas grown by the buffer size.
    fn extent(&self) -> Envelope;
}

/// Uniform-grid spatial hash over committed label envelopes.
#[derive(Debug, Clone)]
pub struct LabelCollisionDetector {
    extent: Envelope,
    cell: f64,
    /// Maps grid cell (ix, iy) to indices into `items`.
    cells: HashMap<(i32, i32), Vec<usize>>,
    items: Vec<Envelope>,
}

impl LabelCollisionDetector {
    pub fn new(extent: Envelope) -> Self {
        Self::with_cell_size(extent, DEFAULT_CELL_SIZE)
    }

    pub fn with_cell_size(extent: Envelope, cell: f64) -> Self {
        Self {
            extent,
            cell: cell.max(MIN_CELL_SIZE),
            cells: HashMap::new(),
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn envelopes(&self) -> &[Envelope] {
        &self.items
    }

    fn cell_range(&self, env: &Envelope) -> (i32, i32, i32, i32) {
        (
            (env.min_x / self.cell).floor() as i32,
            (env.min_y / self.cell).floor() as i32,
            (env.max_x / self.cell).floor() as i32,
            (env.max_y / self.cell).floor() as i32,
        )
    }

    /// Indices of committed envelopes sharing a cell with `env`.
    fn query(&self, env: &Envelope) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0, x1, y1) = self.cell_range(env);
        let mut seen = HashSet::new();
        (x0..=x1)
            .flat_map(move |ix| (y0..=y1).map(move |iy| (ix, iy)))
            .flat_map(move |key| {
                self.cells
                    .get(&key)
                    .map(|v| v.as_slice())
                    .unwrap_or(&[])
                    .iter()
                    .copied()
            })
            .filter(move |idx| seen.insert(*idx))
    }
}

impl OccupancyIndex for LabelCollisionDetector {
    fn has_placement(&self, envelope: &Envelope) -> bool {
        !self
            .query(envelope)
            .any(|idx| self.items[idx].overlaps(envelope))
    }

    fn insert(&mut self, envelope: Envelope) {
        let idx = self.items.len();
        let (x0, y0, x1, y1) = self.cell_range(&envelope);
        for ix in x0..=x1 {
            for iy in y0..=y1 {
                self.cells.entry((ix, iy)).or_default().push(idx);
            }
        }
        self.items.push(envelope);
    }

    fn extent(&self) -> Envelope {
        self.extent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> LabelCollisionDetector {
        LabelCollisionDetector::new(Envelope::new(0.0, 0.0, 500.0, 500.0))
    }

    #[test]
    fn empty_detector_accepts_everything() {
        let d = detector();
        assert!(d.has_placement(&Envelope::new(10.0, 10.0, 20.0, 20.0)));
        assert!(d.is_empty());
    }

    #[test]
    fn inserted_envelope_blocks_overlaps_only() {
        let mut d = detector();
        d.insert(Envelope::new(100.0, 100.0, 150.0, 120.0));
        assert!(!d.has_placement(&Envelope::new(140.0, 110.0, 200.0, 130.0)));
        assert!(d.has_placement(&Envelope::new(150.0, 100.0, 200.0, 120.0)));
        assert!(d.has_placement(&Envelope::new(300.0, 300.0, 320.0, 320.0)));
    }

    #[test]
    fn envelopes_spanning_many_cells_are_found() {
        let mut d = LabelCollisionDetector::with_cell_size(Envelope::new(0.0, 0.0, 500.0, 500.0), 16.0);
        d.insert(Envelope::new(0.0, 0.0, 400.0, 5.0));
        assert!(!d.has_placement(&Envelope::new(390.0, 0.0, 395.0, 4.0)));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn negative_coordinates_hash_correctly() {
        let mut d = detector();
        d.insert(Envelope::new(-30.0, -30.0, -10.0, -10.0));
        assert!(!d.has_placement(&Envelope::new(-20.0, -20.0, -5.0, -5.0)));
    }
}
