use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer. Its parameters are not owned, every pass receives the slice of the
/// model's flat parameter buffer that belongs to it: the `(in, out)` weights in row major order
/// followed by the `out` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Array2<f32>,
    z: Array2<f32>,
    a: Array2<f32>,

    // Backward metadata
    d: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense`.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs.
    /// * `act_fn` - The activation applied to the outputs, `None` for a linear layer.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        let zeros = Array2::zeros((0, 0));

        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: zeros.clone(),
            z: zeros.clone(),
            a: zeros.clone(),
            d: zeros,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes the outputs of the layer and keeps what the backward pass needs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The inputs, one row per sample.
    ///
    /// # Returns
    /// The activated outputs or an error if `x` doesn't have `dim.0` columns.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<ArrayView2<'_, f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                a: "dense inputs",
                b: "dense layer",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let shape = (x.nrows(), self.dim.1);

        resize(&mut self.z, shape);
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut self.z);
        self.z += &b;

        self.x = x.to_owned();

        let Some(ref act_fn) = self.act_fn else {
            return Ok(self.z.view());
        };

        resize(&mut self.a, shape);
        act_fn.activate(self.z.view(), self.a.view_mut());
        Ok(self.a.view())
    }

    /// Writes this layer's gradient and computes the deltas of its inputs.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `grad` - This layer's slice of the gradient buffer, overwritten.
    /// * `d` - The derivative of the loss with respect to this layer's activated outputs.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's inputs.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: ArrayViewMut2<f32>,
    ) -> Result<ArrayViewMut2<'_, f32>> {
        if let Some(act_fn) = &self.act_fn {
            act_fn.chain(self.z.view(), d.view_mut());
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &self.x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        resize(&mut self.d, (d.nrows(), w.nrows()));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut self.d);

        Ok(self.d.view_mut())
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| self.mismatch(w_size))?;
        let db = ArrayViewMut1::from(db_raw);
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let (w_raw, b_raw) = params.split_at(w_size);
        let weights = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| self.mismatch(w_size))?;
        let biases = ArrayView1::from(b_raw);
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, len: usize) -> Result<()> {
        if len != self.size {
            return Err(MlErr::SizeMismatch {
                a: what,
                b: "dense layer",
                got: len,
                expected: self.size,
            });
        }

        Ok(())
    }

    fn mismatch(&self, got: usize) -> MlErr {
        MlErr::SizeMismatch {
            a: "weights",
            b: "dense layer",
            got,
            expected: self.dim.0 * self.dim.1,
        }
    }
}

/// Makes `buf` have `shape`, reallocating only when the shape changes.
fn resize(buf: &mut Array2<f32>, shape: (usize, usize)) {
    if buf.dim() != shape {
        *buf = Array2::zeros(shape);
    }
}
