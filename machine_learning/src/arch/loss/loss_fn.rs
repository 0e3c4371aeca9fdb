use ndarray::{Array1, ArrayView1};

pub trait LossFn {
    /// The mean loss of the predictions.
    fn loss(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> f32;

    /// The derivative of `loss` with respect to every prediction.
    fn loss_prime(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> Array1<f32>;
}
