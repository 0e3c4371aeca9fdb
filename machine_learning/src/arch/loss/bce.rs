use ndarray::{Array1, ArrayView1, Zip};

use super::LossFn;

/// Binary cross entropy over probabilities in `[0, 1]`.
///
/// Predictions are clamped to `[eps, 1 - eps]` so saturated outputs yield a finite loss and
/// gradient.
#[derive(Clone, Copy, Debug)]
pub struct BinaryCrossEntropy {
    eps: f32,
}

impl Default for BinaryCrossEntropy {
    fn default() -> Self {
        Self::new(1e-7)
    }
}

impl BinaryCrossEntropy {
    /// Returns a new `BinaryCrossEntropy`.
    ///
    /// # Arguments
    /// * `eps` - How close to `0` or `1` a prediction may get.
    pub fn new(eps: f32) -> Self {
        Self { eps }
    }

    fn clamp(&self, p: f32) -> f32 {
        p.clamp(self.eps, 1. - self.eps)
    }
}

impl LossFn for BinaryCrossEntropy {
    fn loss(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> f32 {
        if y_pred.is_empty() {
            return 0.;
        }

        let total = Zip::from(&y_pred).and(&y).fold(0., |acc, &p, &t| {
            let p = self.clamp(p);
            acc - (t * p.ln() + (1. - t) * (1. - p).ln())
        });

        total / y_pred.len() as f32
    }

    fn loss_prime(&self, y_pred: ArrayView1<f32>, y: ArrayView1<f32>) -> Array1<f32> {
        let n = y_pred.len().max(1) as f32;

        Zip::from(&y_pred).and(&y).map_collect(|&p, &t| {
            let p = self.clamp(p);
            (p - t) / (p * (1. - p)) / n
        })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn perfect_predictions_have_near_zero_loss() {
        let bce = BinaryCrossEntropy::default();
        let y = array![0., 1., 1.];
        assert!(bce.loss(y.view(), y.view()) < 1e-5);
    }

    #[test]
    fn coin_flip_loss_is_ln_2() {
        let bce = BinaryCrossEntropy::default();
        let loss = bce.loss(array![0.5, 0.5].view(), array![0., 1.].view());
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn gradient_is_finite_when_saturated() {
        let bce = BinaryCrossEntropy::default();
        let d = bce.loss_prime(array![0., 1.].view(), array![1., 0.].view());
        assert!(d.iter().all(|x| x.is_finite()));
        assert!(d[0] < 0. && d[1] > 0.);
    }
}
