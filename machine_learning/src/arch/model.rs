use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::{arch::loss::LossFn, error::Result, optimization::Optimizer};

/// The inputs of a batch as seen by a model: the dense block and one code array per
/// categorical column, all with the same amount of rows.
#[derive(Debug, Clone)]
pub struct Features<'a> {
    pub dense: ArrayView2<'a, f32>,
    pub categorical: Vec<ArrayView1<'a, i64>>,
}

impl<'a> Features<'a> {
    pub fn new(dense: ArrayView2<'a, f32>, categorical: Vec<ArrayView1<'a, i64>>) -> Self {
        Self { dense, categorical }
    }

    /// Returns the amount of rows.
    pub fn rows(&self) -> usize {
        self.dense.nrows()
    }
}

/// A named view over a contiguous group of parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor<'a> {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: &'a [f32],
}

/// What callers outside the training step may do with a model.
pub trait Predictor {
    /// Computes the single output score of every row.
    ///
    /// # Arguments
    /// * `features` - The rows to score.
    ///
    /// # Returns
    /// One score per row or an error if the features don't fit the model.
    fn predict(&mut self, features: Features<'_>) -> Result<Array1<f32>>;

    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Returns every parameter of the model in its flat layout.
    fn params(&self) -> &[f32];

    /// Overwrites every parameter of the model.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if `params` doesn't have exactly `size()` values.
    fn set_params(&mut self, params: &[f32]) -> Result<()>;

    /// Returns the parameters grouped by the layer and role they belong to, in flat layout
    /// order.
    fn tensors(&self) -> Vec<NamedTensor<'_>>;
}

pub trait Model: Predictor {
    /// Makes a single optimization step over one batch: forward pass, loss, backward pass and
    /// parameter update.
    ///
    /// # Arguments
    /// * `features` - The batch inputs.
    /// * `labels` - The expected output of every row.
    /// * `loss` - The loss function.
    /// * `optimizer` - The optimizer that dictates how to update the weights.
    ///
    /// # Returns
    /// The batch loss.
    fn train_batch<L, O>(
        &mut self,
        features: Features<'_>,
        labels: ArrayView1<'_, f32>,
        loss: &L,
        optimizer: &mut O,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer;

    /// Computes the loss over one batch without updating the parameters.
    fn evaluate<L: LossFn>(
        &mut self,
        features: Features<'_>,
        labels: ArrayView1<'_, f32>,
        loss: &L,
    ) -> Result<f32> {
        let y_pred = self.predict(features)?;
        Ok(loss.loss(y_pred.view(), labels))
    }
}
