//! FILENAME: pivot-dataset/src/cube.rs
//! The aggregation cube: flat row key -> flat column key -> one aggregator
//! per indicator.
//!
//! Cells are created lazily and never replaced; later passes only push into
//! or reset them. Row and column keys synthesized by the totals pass are
//! remembered so the data cells can be told apart from total cells.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::aggregator::{noop, Aggregator};

pub type CubeRow = FxHashMap<String, Vec<Aggregator>>;

#[derive(Debug, Clone, Default)]
pub struct Cube {
    rows: FxHashMap<String, CubeRow>,
    total_row_keys: FxHashSet<String>,
    total_col_keys: FxHashSet<String>,
}

impl Cube {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of populated cells.
    pub fn len(&self) -> usize {
        self.rows.values().map(FxHashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row_key: &str, col_key: &str) -> Option<&[Aggregator]> {
        self.rows
            .get(row_key)
            .and_then(|row| row.get(col_key))
            .map(Vec::as_slice)
    }

    /// Aggregator of one indicator, or the shared no-op one.
    pub fn aggregator(&self, row_key: &str, col_key: &str, indicator: usize) -> &Aggregator {
        self.cell(row_key, col_key)
            .and_then(|cell| cell.get(indicator))
            .unwrap_or_else(|| noop())
    }

    /// The cell at `(row_key, col_key)`, created with `create` on first touch.
    /// An existing cell shorter than `len` is padded with new aggregators.
    pub fn cell_or_insert_with(
        &mut self,
        row_key: &str,
        col_key: &str,
        len: usize,
        mut create: impl FnMut(usize) -> Aggregator,
    ) -> &mut Vec<Aggregator> {
        let cell = self
            .rows
            .entry(row_key.to_string())
            .or_default()
            .entry(col_key.to_string())
            .or_default();
        while cell.len() < len {
            cell.push(create(cell.len()));
        }
        cell
    }

    pub fn row(&self, row_key: &str) -> Option<&CubeRow> {
        self.rows.get(row_key)
    }

    /// Cells fed by records, excluding every cell on a total row or column.
    pub fn data_cells(&self) -> Vec<(String, String)> {
        let mut cells = Vec::new();
        for (row_key, row) in &self.rows {
            if self.total_row_keys.contains(row_key) {
                continue;
            }
            for col_key in row.keys() {
                if !self.total_col_keys.contains(col_key) {
                    cells.push((row_key.clone(), col_key.clone()));
                }
            }
        }
        cells
    }

    /// Marks a row key as synthesized. Returns true if it was not marked yet.
    pub fn mark_total_row(&mut self, row_key: &str) -> bool {
        if self.total_row_keys.contains(row_key) {
            return false;
        }
        self.total_row_keys.insert(row_key.to_string())
    }

    pub fn mark_total_col(&mut self, col_key: &str) -> bool {
        if self.total_col_keys.contains(col_key) {
            return false;
        }
        self.total_col_keys.insert(col_key.to_string())
    }

    pub fn is_total_row(&self, row_key: &str) -> bool {
        self.total_row_keys.contains(row_key)
    }

    pub fn is_total_col(&self, col_key: &str) -> bool {
        self.total_col_keys.contains(col_key)
    }

    /// Resets every aggregator in place. Keys and cells survive.
    pub fn reset_aggregators(&mut self) {
        for row in self.rows.values_mut() {
            for cell in row.values_mut() {
                cell.iter_mut().for_each(Aggregator::reset);
            }
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.total_row_keys.clear();
        self.total_col_keys.clear();
    }
}
