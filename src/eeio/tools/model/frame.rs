use std::collections::HashMap;
use std::hash::Hash;

use nalgebra::DMatrix;

use crate::eeio::tools::error::{Result, ToolError};
use crate::eeio::tools::model::{Label, Level};

/// A labeled matrix: named rows (satellite accounts) against table labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    axis: String,
    rows: Vec<String>,
    columns: Vec<Label>,
    values: DMatrix<f64>,
}

/// One cell of a frame in long form.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub row: String,
    pub region: String,
    pub level: Level,
    pub item: String,
    pub value: f64,
}

impl Frame {
    /// Wraps `values`, whose shape must match the labels. The row axis is named `Item`.
    pub fn new(rows: Vec<String>, columns: Vec<Label>, values: DMatrix<f64>) -> Self {
        debug_assert_eq!(values.shape(), (rows.len(), columns.len()));
        Self {
            axis: "Item".to_string(),
            rows,
            columns,
            values,
        }
    }

    /// Name of the row axis.
    pub fn axis(&self) -> &str {
        &self.axis
    }

    /// Renames the row axis.
    pub fn rename_axis(&mut self, name: impl Into<String>) {
        self.axis = name.into();
    }

    /// Row names.
    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    /// Column labels.
    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Cell addressed by row name and column label.
    pub fn get(&self, row: &str, column: &Label) -> Option<f64> {
        let row = self.rows.iter().position(|candidate| candidate == row)?;
        let col = self.columns.iter().position(|candidate| candidate == column)?;
        Some(self.values[(row, col)])
    }

    /// Keeps the named rows, in the requested order.
    pub fn select_rows<S: AsRef<str>>(&self, rows: &[S]) -> Result<Frame> {
        let mut indices = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.as_ref();
            let idx = self
                .rows
                .iter()
                .position(|candidate| candidate == row)
                .ok_or_else(|| ToolError::UnknownLabel {
                    kind: self.axis.to_lowercase(),
                    label: row.to_string(),
                })?;
            indices.push(idx);
        }
        Ok(Frame {
            axis: self.axis.clone(),
            rows: indices.iter().map(|idx| self.rows[*idx].clone()).collect(),
            columns: self.columns.clone(),
            values: self.values.select_rows(indices.iter()),
        })
    }

    /// Keeps the columns accepted by `keep`.
    pub fn filter_columns(&self, keep: impl Fn(&Label) -> bool) -> Frame {
        let indices: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, label)| keep(label))
            .map(|(idx, _)| idx)
            .collect();
        Frame {
            axis: self.axis.clone(),
            rows: self.rows.clone(),
            columns: indices.iter().map(|idx| self.columns[*idx].clone()).collect(),
            values: self.values.select_columns(indices.iter()),
        }
    }

    /// Multiplies every cell of a row by `factor(row)`.
    pub fn scale_rows(&self, factor: impl Fn(&str) -> Result<f64>) -> Result<Frame> {
        let mut values = self.values.clone();
        for (idx, row) in self.rows.iter().enumerate() {
            let mut cells = values.row_mut(idx);
            cells *= factor(row)?;
        }
        Ok(Frame {
            axis: self.axis.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            values,
        })
    }

    /// Cell-wise `self - base`. Both frames must share rows and columns.
    pub fn difference(&self, base: &Frame) -> Result<Frame> {
        if self.rows != base.rows || self.columns != base.columns {
            return Err(ToolError::InvalidWorkbook(
                "cannot compare frames with different labels".into(),
            ));
        }
        Ok(Frame {
            axis: self.axis.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            values: &self.values - &base.values,
        })
    }

    /// Sum over every cell.
    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Column sums, labeled.
    pub fn column_totals(&self) -> Vec<(Label, f64)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, label)| (label.clone(), self.values.column(idx).sum()))
            .collect()
    }

    /// Totals grouped by the outermost column level (the region).
    pub fn by_region(&self) -> Vec<(String, f64)> {
        group_ordered(
            self.column_totals()
                .into_iter()
                .map(|(label, value)| (label.region, value)),
        )
    }

    /// Totals grouped by region and item, dropping the level.
    pub fn by_region_item(&self) -> Vec<((String, String), f64)> {
        group_ordered(
            self.column_totals()
                .into_iter()
                .map(|(label, value)| ((label.region, label.item), value)),
        )
    }

    /// Long-form view: one observation per cell, row-major.
    pub fn to_observations(&self) -> Vec<Observation> {
        let mut observations = Vec::with_capacity(self.values.len());
        for (row_idx, row) in self.rows.iter().enumerate() {
            for (col_idx, label) in self.columns.iter().enumerate() {
                observations.push(Observation {
                    row: row.clone(),
                    region: label.region.clone(),
                    level: label.level,
                    item: label.item.clone(),
                    value: self.values[(row_idx, col_idx)],
                });
            }
        }
        observations
    }
}

/// Sums values per key, keeping keys in order of first appearance.
pub(crate) fn group_ordered<K: Eq + Hash + Clone>(
    entries: impl IntoIterator<Item = (K, f64)>,
) -> Vec<(K, f64)> {
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut grouped: Vec<(K, f64)> = Vec::new();
    for (key, value) in entries {
        match positions.get(&key).copied() {
            Some(idx) => grouped[idx].1 += value,
            None => {
                positions.insert(key.clone(), grouped.len());
                grouped.push((key, value));
            }
        }
    }
    grouped
}
