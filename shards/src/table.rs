use std::mem;

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{Result, ShardErr};

/// The concrete storage kind of a parsed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    F32,
    U16,
    U8,
    F64,
    Text,
}

/// A single typed column. Missing float values are held as `NaN` until filled.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    F32(Vec<f32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    F64(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    /// Creates an empty column of the given kind.
    pub fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::F32 => Column::F32(Vec::new()),
            ColumnKind::U16 => Column::U16(Vec::new()),
            ColumnKind::U8 => Column::U8(Vec::new()),
            ColumnKind::F64 => Column::F64(Vec::new()),
            ColumnKind::Text => Column::Text(Vec::new()),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::F32(_) => ColumnKind::F32,
            Column::U16(_) => ColumnKind::U16,
            Column::U8(_) => ColumnKind::U8,
            Column::F64(_) => ColumnKind::F64,
            Column::Text(_) => ColumnKind::Text,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Column::F32(v) => v.len(),
            Column::U16(v) => v.len(),
            Column::U8(v) => v.len(),
            Column::F64(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the value at `row` widened or narrowed to `f32`, or `None` for text columns.
    ///
    /// # Panics
    /// If `row` is out of bounds.
    #[inline]
    pub fn get_f32(&self, row: usize) -> Option<f32> {
        match self {
            Column::F32(v) => Some(v[row]),
            Column::U16(v) => Some(v[row] as f32),
            Column::U8(v) => Some(v[row] as f32),
            Column::F64(v) => Some(v[row] as f32),
            Column::Text(_) => None,
        }
    }

    /// Reorders the column so that row `i` becomes the old row `order[i]`.
    ///
    /// `order` must be a permutation of `0..self.len()`.
    fn permute(&mut self, order: &[usize]) {
        fn take<T: Copy>(v: &[T], order: &[usize]) -> Vec<T> {
            order.iter().map(|&i| v[i]).collect()
        }

        match self {
            Column::F32(v) => *v = take(v, order),
            Column::U16(v) => *v = take(v, order),
            Column::U8(v) => *v = take(v, order),
            Column::F64(v) => *v = take(v, order),
            Column::Text(v) => {
                let mut old = mem::take(v);
                *v = order.iter().map(|&i| mem::take(&mut old[i])).collect();
            }
        }
    }

    /// Replaces every `NaN` of a float column with `value`.
    fn fill_nan(&mut self, value: f32) {
        match self {
            Column::F32(v) => v.iter_mut().filter(|x| x.is_nan()).for_each(|x| *x = value),
            Column::F64(v) => v
                .iter_mut()
                .filter(|x| x.is_nan())
                .for_each(|x| *x = value as f64),
            _ => {}
        }
    }
}

/// An in-memory columnar table holding the parsed rows of one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Creates a new `Table`.
    ///
    /// # Arguments
    /// * `columns` - The named columns, in header order.
    ///
    /// # Returns
    /// A new `Table` or an error if the columns differ in length.
    pub fn new<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Column)>,
    {
        let (names, columns): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let rows = columns.first().map(Column::len).unwrap_or_default();

        for (name, column) in names.iter().zip(&columns) {
            if column.len() != rows {
                return Err(ShardErr::LengthMismatch {
                    column: name.clone(),
                    got: column.len(),
                    expected: rows,
                });
            }
        }

        Ok(Self {
            names,
            columns,
            rows,
        })
    }

    /// Returns the amount of rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterates over the named columns in header order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(&self.columns)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(&self.columns[idx])
    }

    /// Same as `column` but fails with `ShardErr::MissingColumn`.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| ShardErr::MissingColumn {
            column: name.to_string(),
        })
    }

    /// Applies a full random row permutation to every column.
    ///
    /// # Arguments
    /// * `rng` - The random number generator the permutation is drawn from.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.rows).collect();
        order.shuffle(rng);

        for column in &mut self.columns {
            column.permute(&order);
        }
    }

    /// Replaces the missing values of every float column with `value`.
    pub fn fill_missing(&mut self, value: f32) {
        for column in &mut self.columns {
            column.fill_nan(value);
        }
    }
}
