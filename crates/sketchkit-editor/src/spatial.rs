//! Uniform-grid spatial index over screen-space bounding boxes.
//!
//! Used by the pick index to cut down the candidate set before exact
//! distance tests. Rebuilt together with the render cache, so removal is
//! rare; `clear` plus re-insert is the normal lifecycle.

use std::collections::HashMap;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_point(x: f64, y: f64, radius: f64) -> Self {
        Self::new(x - radius, y - radius, x + radius, y + radius)
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn contains(&self, other: &Bounds) -> bool {
        other.min_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.max_y <= self.max_y
    }

    pub fn expanded(&self, margin: f64) -> Bounds {
        Bounds::new(
            self.min_x - margin,
            self.min_y - margin,
            self.max_x + margin,
            self.max_y + margin,
        )
    }
}

/// Index statistics, mostly for tests and trace logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub entries: usize,
    pub occupied_cells: usize,
}

/// Uniform-grid index mapping ids to bounding boxes.
#[derive(Debug, Clone)]
pub struct SpatialIndex<I: Copy + PartialEq> {
    cell_size: f64,
    cells: HashMap<(i64, i64), Vec<usize>>,
    entries: Vec<(I, Bounds)>,
}

impl<I: Copy + PartialEq> SpatialIndex<I> {
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1e-6),
            cells: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn cell_range(&self, bounds: &Bounds) -> (i64, i64, i64, i64) {
        let cx0 = (bounds.min_x / self.cell_size).floor() as i64;
        let cy0 = (bounds.min_y / self.cell_size).floor() as i64;
        let cx1 = (bounds.max_x / self.cell_size).floor() as i64;
        let cy1 = (bounds.max_y / self.cell_size).floor() as i64;
        (cx0, cy0, cx1, cy1)
    }

    pub fn insert(&mut self, id: I, bounds: &Bounds) {
        let entry = self.entries.len();
        self.entries.push((id, *bounds));
        let (cx0, cy0, cx1, cy1) = self.cell_range(bounds);
        for cx in cx0..=cx1 {
            for cy in cy0..=cy1 {
                self.cells.entry((cx, cy)).or_default().push(entry);
            }
        }
    }

    /// All ids whose bounds intersect the query box.
    pub fn query(&self, bounds: &Bounds) -> Vec<I> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        let (cx0, cy0, cx1, cy1) = self.cell_range(bounds);
        for cx in cx0..=cx1 {
            for cy in cy0..=cy1 {
                let Some(entries) = self.cells.get(&(cx, cy)) else {
                    continue;
                };
                for &e in entries {
                    if seen.contains(&e) {
                        continue;
                    }
                    seen.push(e);
                    let (id, b) = self.entries[e];
                    if b.intersects(bounds) {
                        out.push(id);
                    }
                }
            }
        }
        out
    }

    /// All ids whose bounds contain the point.
    pub fn query_point(&self, x: f64, y: f64) -> Vec<I> {
        self.query(&Bounds::new(x, y, x, y))
            .into_iter()
            .filter(|id| {
                self.entries
                    .iter()
                    .any(|(i, b)| i == id && b.contains_point(x, y))
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.entries.clear();
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.entries.len(),
            occupied_cells: self.cells.len(),
        }
    }
}
