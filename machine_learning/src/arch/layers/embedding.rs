use ndarray::prelude::*;

use crate::{MlErr, Result};

/// A lookup table mapping categorical codes to dense vectors.
///
/// Codes are bucketed with `code.rem_euclid(vocab)`, so negative sentinels and codes larger
/// than the vocabulary still map to a valid row.
#[derive(Clone, Debug)]
pub struct Embedding {
    vocab: usize,
    dim: usize,

    // Forward metadata
    rows: Vec<usize>,
}

impl Embedding {
    /// Creates a new `Embedding`.
    ///
    /// # Arguments
    /// * `vocab` - The amount of rows of the table.
    /// * `dim` - The length of every embedded vector.
    ///
    /// # Returns
    /// A new `Embedding` instance.
    pub fn new(vocab: usize, dim: usize) -> Self {
        Self {
            vocab,
            dim,
            rows: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.vocab * self.dim
    }

    pub fn vocab(&self) -> usize {
        self.vocab
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the table row a code is looked up in.
    pub fn bucket(&self, code: i64) -> usize {
        code.rem_euclid(self.vocab as i64) as usize
    }

    /// Looks every code up, writing the vectors into `out`.
    ///
    /// # Arguments
    /// * `params` - This layer's `(vocab, dim)` table.
    /// * `codes` - One code per sample.
    /// * `out` - A `(codes.len(), dim)` destination.
    pub fn forward(
        &mut self,
        params: &[f32],
        codes: ArrayView1<i64>,
        mut out: ArrayViewMut2<f32>,
    ) -> Result<()> {
        let table = self.view_table(params)?;

        let vocab = self.vocab as i64;
        self.rows.clear();
        self.rows
            .extend(codes.iter().map(|&c| c.rem_euclid(vocab) as usize));

        for (mut dst, &row) in out.rows_mut().into_iter().zip(&self.rows) {
            dst.assign(&table.row(row));
        }

        Ok(())
    }

    /// Accumulates the deltas of the looked up vectors into this layer's gradient.
    ///
    /// # Arguments
    /// * `grad` - This layer's slice of the gradient buffer, zeroed by the caller.
    /// * `d` - The derivative of the loss with respect to every looked up vector.
    pub fn backward(&self, grad: &mut [f32], d: ArrayView2<f32>) -> Result<()> {
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                a: "gradient",
                b: "embedding",
                got: grad.len(),
                expected: self.size(),
            });
        }

        let dim = self.dim;
        for (delta, &row) in d.rows().into_iter().zip(&self.rows) {
            let dst = &mut grad[row * dim..(row + 1) * dim];
            for (g, &x) in dst.iter_mut().zip(delta) {
                *g += x;
            }
        }

        Ok(())
    }

    fn view_table<'a>(&self, params: &'a [f32]) -> Result<ArrayView2<'a, f32>> {
        ArrayView2::from_shape((self.vocab, self.dim), params).map_err(|_| MlErr::SizeMismatch {
            a: "parameters",
            b: "embedding",
            got: params.len(),
            expected: self.size(),
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn codes_wrap_into_the_table() {
        let layer = Embedding::new(4, 2);
        assert_eq!(layer.bucket(0), 0);
        assert_eq!(layer.bucket(5), 1);
        assert_eq!(layer.bucket(-1), 3);
    }

    #[test]
    fn lookup_and_accumulate() {
        let params = [0., 1., 10., 11., 20., 21.];
        let mut layer = Embedding::new(3, 2);
        let mut out = Array2::zeros((3, 2));

        layer
            .forward(&params, array![2, 0, 2].view(), out.view_mut())
            .unwrap();
        assert_eq!(out, array![[20., 21.], [0., 1.], [20., 21.]]);

        let mut grad = [0.; 6];
        let d = array![[1., 1.], [2., 2.], [3., 3.]];
        layer.backward(&mut grad, d.view()).unwrap();
        assert_eq!(grad, [2., 2., 0., 0., 4., 4.]);
    }
}
