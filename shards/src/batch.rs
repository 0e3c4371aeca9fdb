use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1};

use crate::{
    Result, ShardErr,
    schema::FeatureSpec,
    table::{Column, Table},
};

/// A single training unit: the dense feature block, one index array per categorical column
/// and the labels. Every array has the same amount of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub dense: Array2<f32>,
    pub categorical: Vec<Array1<i64>>,
    pub labels: Array1<f32>,
}

impl Batch {
    /// Assembles the batch for a row range of a table.
    ///
    /// # Arguments
    /// * `table` - The shard's table, already shuffled and with its missing values filled.
    /// * `rows` - The rows this batch is made of.
    /// * `features` - Which columns are the label, the dense and the categorical features.
    ///
    /// # Returns
    /// The new batch or an error if a column is missing or not numeric, or if a label is
    /// anything but 0 or 1 (a missing label arrives here already filled with -1).
    pub fn assemble(table: &Table, rows: Range<usize>, features: &FeatureSpec) -> Result<Self> {
        let n = rows.len();

        let label = numeric(table, &features.label)?;
        let labels: Array1<f32> = rows.clone().map(|r| value(label, r)).collect();
        if let Some(i) = labels.iter().position(|&y| y != 0.0 && y != 1.0) {
            return Err(ShardErr::InvalidLabel {
                column: features.label.clone(),
                row: rows.start + i,
                value: labels[i],
            });
        }

        let dense_cols = features
            .dense
            .iter()
            .map(|name| numeric(table, name))
            .collect::<Result<Vec<_>>>()?;

        let dense = Array2::from_shape_fn((n, dense_cols.len()), |(i, j)| {
            value(dense_cols[j], rows.start + i)
        });

        let categorical = features
            .categorical
            .iter()
            .map(|name| {
                let column = numeric(table, name)?;
                Ok(rows
                    .clone()
                    .map(|r| value(column, r) as i64)
                    .collect::<Array1<i64>>())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dense,
            categorical,
            labels,
        })
    }

    /// Returns the amount of rows in this batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Borrowed views of the categorical index arrays.
    pub fn categorical_views(&self) -> Vec<ArrayView1<'_, i64>> {
        self.categorical.iter().map(|c| c.view()).collect()
    }
}

fn numeric<'t>(table: &'t Table, name: &str) -> Result<&'t Column> {
    let column = table.require(name)?;

    if matches!(column, Column::Text(_)) {
        return Err(ShardErr::NonNumericColumn {
            column: name.to_string(),
        });
    }

    Ok(column)
}

/// Numeric value of a column already checked by `numeric`.
#[inline]
fn value(column: &Column, row: usize) -> f32 {
    column.get_f32(row).unwrap_or(-1.0)
}
