use std::ops::Range;

use ndarray::{prelude::*, s};

use super::{
    Features, Model, NamedTensor, Predictor,
    layers::{Dense, Embedding},
    loss::LossFn,
};
use crate::{MlErr, Result, optimization::Optimizer};

/// A feed forward network over mixed inputs: every categorical column goes through its own
/// embedding, the embedded vectors are concatenated after the dense features and the result
/// flows through the dense layers. The last layer has a single sigmoid output.
///
/// Every parameter lives in one flat buffer, embeddings first and then the dense layers, and
/// each layer borrows its slice of it on every pass.
#[derive(Clone, Debug)]
pub struct DenseNet {
    dense_inputs: usize,
    embeddings: Vec<Embedding>,
    layers: Vec<Dense>,

    embedding_ranges: Vec<Range<usize>>,
    layer_ranges: Vec<Range<usize>>,

    params: Vec<f32>,
    grad: Vec<f32>,
}

impl DenseNet {
    /// Creates a new `DenseNet`, see `NetBuilder` for the usual way of building one.
    ///
    /// # Arguments
    /// * `dense_inputs` - The amount of dense feature columns.
    /// * `embeddings` - One embedding per categorical column.
    /// * `layers` - The dense layers, the first one taking the concatenated inputs.
    /// * `params` - The initial parameters in flat layout.
    ///
    /// # Returns
    /// A new `DenseNet` or an error if the layers don't chain or `params` has the wrong size.
    pub fn new(
        dense_inputs: usize,
        embeddings: Vec<Embedding>,
        layers: Vec<Dense>,
        params: Vec<f32>,
    ) -> Result<Self> {
        let mut width = dense_inputs + embeddings.iter().map(Embedding::dim).sum::<usize>();

        for layer in &layers {
            let (inputs, outputs) = layer.dim();
            if inputs != width {
                return Err(MlErr::InvalidArchitecture {
                    reason: format!("a layer takes {inputs} inputs but receives {width}"),
                });
            }
            width = outputs;
        }

        if layers.is_empty() || width != 1 {
            return Err(MlErr::InvalidArchitecture {
                reason: format!("the network must end in a single output, it has {width}"),
            });
        }

        let mut offset = 0;
        let mut next = |size: usize| {
            let range = offset..offset + size;
            offset += size;
            range
        };
        let embedding_ranges: Vec<_> = embeddings.iter().map(|e| next(e.size())).collect();
        let layer_ranges: Vec<_> = layers.iter().map(|l| next(l.size())).collect();

        if params.len() != offset {
            return Err(MlErr::SizeMismatch {
                a: "parameters",
                b: "network",
                got: params.len(),
                expected: offset,
            });
        }

        Ok(Self {
            dense_inputs,
            embeddings,
            layers,
            embedding_ranges,
            layer_ranges,
            grad: vec![0.; params.len()],
            params,
        })
    }

    /// Returns the width of the first dense layer's input.
    pub fn input_width(&self) -> usize {
        self.dense_inputs + self.embeddings.iter().map(Embedding::dim).sum::<usize>()
    }

    fn check_features(&self, features: &Features<'_>) -> Result<()> {
        let rows = features.rows();

        if features.dense.ncols() != self.dense_inputs {
            return Err(MlErr::SizeMismatch {
                a: "dense features",
                b: "network inputs",
                got: features.dense.ncols(),
                expected: self.dense_inputs,
            });
        }
        if features.categorical.len() != self.embeddings.len() {
            return Err(MlErr::SizeMismatch {
                a: "categorical features",
                b: "embeddings",
                got: features.categorical.len(),
                expected: self.embeddings.len(),
            });
        }
        if let Some(codes) = features.categorical.iter().find(|c| c.len() != rows) {
            return Err(MlErr::SizeMismatch {
                a: "categorical rows",
                b: "dense rows",
                got: codes.len(),
                expected: rows,
            });
        }

        Ok(())
    }

    /// Builds the network input: the dense block followed by every embedded column.
    fn embed(&mut self, features: &Features<'_>) -> Result<Array2<f32>> {
        let mut x = Array2::zeros((features.rows(), self.input_width()));
        x.slice_mut(s![.., ..self.dense_inputs])
            .assign(&features.dense);

        let mut col = self.dense_inputs;
        for ((embedding, range), codes) in self
            .embeddings
            .iter_mut()
            .zip(&self.embedding_ranges)
            .zip(&features.categorical)
        {
            let dim = embedding.dim();
            let out = x.slice_mut(s![.., col..col + dim]);
            embedding.forward(&self.params[range.clone()], codes.view(), out)?;
            col += dim;
        }

        Ok(x)
    }

    /// Runs the full forward pass.
    ///
    /// # Returns
    /// The score of every row.
    fn forward(&mut self, features: &Features<'_>) -> Result<Array1<f32>> {
        self.check_features(features)?;
        let input = self.embed(features)?;

        let Self {
            layers,
            layer_ranges,
            params,
            ..
        } = self;

        let mut x = input.view();
        for (layer, range) in layers.iter_mut().zip(layer_ranges.iter()) {
            x = layer.forward(&params[range.clone()], x)?;
        }

        Ok(x.column(0).to_owned())
    }

    /// Runs the full backward pass, leaving the gradient of every parameter in `self.grad`.
    fn backward(&mut self, d_out: Array1<f32>) -> Result<()> {
        let Self {
            dense_inputs,
            embeddings,
            layers,
            embedding_ranges,
            layer_ranges,
            params,
            grad,
        } = self;

        grad.fill(0.);

        let mut d_last = d_out.insert_axis(Axis(1));
        let mut d = d_last.view_mut();

        for (layer, range) in layers.iter_mut().zip(layer_ranges.iter()).rev() {
            d = layer.backward(&params[range.clone()], &mut grad[range.clone()], d)?;
        }

        let mut col = *dense_inputs;
        for (embedding, range) in embeddings.iter().zip(embedding_ranges.iter()) {
            let dim = embedding.dim();
            embedding.backward(&mut grad[range.clone()], d.slice(s![.., col..col + dim]))?;
            col += dim;
        }

        Ok(())
    }
}

impl Predictor for DenseNet {
    fn predict(&mut self, features: Features<'_>) -> Result<Array1<f32>> {
        self.forward(&features)
    }

    fn size(&self) -> usize {
        self.params.len()
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn set_params(&mut self, params: &[f32]) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(MlErr::SizeMismatch {
                a: "parameters",
                b: "network",
                got: params.len(),
                expected: self.params.len(),
            });
        }

        self.params.copy_from_slice(params);
        Ok(())
    }

    fn tensors(&self) -> Vec<NamedTensor<'_>> {
        let mut tensors = Vec::with_capacity(self.embeddings.len() + 2 * self.layers.len());

        for (i, (embedding, range)) in self.embeddings.iter().zip(&self.embedding_ranges).enumerate()
        {
            tensors.push(NamedTensor {
                name: format!("embedding.{i}.weight"),
                shape: vec![embedding.vocab(), embedding.dim()],
                data: &self.params[range.clone()],
            });
        }

        for (i, (layer, range)) in self.layers.iter().zip(&self.layer_ranges).enumerate() {
            let (inputs, outputs) = layer.dim();
            let (w, b) = self.params[range.clone()].split_at(inputs * outputs);

            tensors.push(NamedTensor {
                name: format!("dense.{i}.weight"),
                shape: vec![inputs, outputs],
                data: w,
            });
            tensors.push(NamedTensor {
                name: format!("dense.{i}.bias"),
                shape: vec![outputs],
                data: b,
            });
        }

        tensors
    }
}

impl Model for DenseNet {
    fn train_batch<L, O>(
        &mut self,
        features: Features<'_>,
        labels: ArrayView1<'_, f32>,
        loss: &L,
        optimizer: &mut O,
    ) -> Result<f32>
    where
        L: LossFn,
        O: Optimizer,
    {
        if labels.len() != features.rows() {
            return Err(MlErr::SizeMismatch {
                a: "labels",
                b: "dense rows",
                got: labels.len(),
                expected: features.rows(),
            });
        }

        let y_pred = self.forward(&features)?;
        let batch_loss = loss.loss(y_pred.view(), labels);
        let d = loss.loss_prime(y_pred.view(), labels);

        self.backward(d)?;
        optimizer.update_params(&mut self.params, &self.grad)?;

        Ok(batch_loss)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::{
        arch::{activations::ActFn, loss::BinaryCrossEntropy},
        optimization::GradientDescent,
    };

    fn net() -> DenseNet {
        let embeddings = vec![Embedding::new(3, 2)];
        let layers = vec![
            Dense::new((3, 2), Some(ActFn::relu())),
            Dense::new((2, 1), Some(ActFn::sigmoid(1.))),
        ];
        let size = 6 + 8 + 3;
        let params = (0..size).map(|i| ((i % 5) as f32 - 2.) * 0.1).collect();
        DenseNet::new(1, embeddings, layers, params).unwrap()
    }

    #[test]
    fn layers_must_chain_into_one_output() {
        let wide = DenseNet::new(2, vec![], vec![Dense::new((2, 2), None)], vec![0.; 6]);
        assert!(matches!(wide, Err(MlErr::InvalidArchitecture { .. })));

        let broken = DenseNet::new(
            2,
            vec![Embedding::new(4, 3)],
            vec![Dense::new((2, 1), None)],
            vec![0.; 15],
        );
        assert!(matches!(broken, Err(MlErr::InvalidArchitecture { .. })));

        let short = DenseNet::new(2, vec![], vec![Dense::new((2, 1), None)], vec![0.; 2]);
        assert!(matches!(short, Err(MlErr::SizeMismatch { .. })));
    }

    #[test]
    fn tensors_cover_the_flat_layout() {
        let net = net();
        let tensors = net.tensors();
        let names: Vec<&str> = tensors.iter().map(|t| t.name.as_str()).collect();

        assert_eq!(
            names,
            ["embedding.0.weight", "dense.0.weight", "dense.0.bias", "dense.1.weight", "dense.1.bias"]
        );
        let flat: Vec<f32> = tensors.iter().flat_map(|t| t.data.iter().copied()).collect();
        assert_eq!(flat, net.params());
        assert!(tensors.iter().all(|t| t.shape.iter().product::<usize>() == t.data.len()));
    }

    #[test]
    fn predictions_are_probabilities_one_per_row() {
        let mut net = net();
        let dense = array![[0.5], [-1.], [3.]];
        let codes = array![0, 2, -1];

        let y = net
            .predict(Features::new(dense.view(), vec![codes.view()]))
            .unwrap();
        assert_eq!(y.len(), 3);
        assert!(y.iter().all(|&p| p > 0. && p < 1.));

        // Code -1 shares the last bucket with code 2.
        let again = net
            .predict(Features::new(array![[-1.], [-1.]].view(), vec![array![2, -1].view()]))
            .unwrap();
        assert_eq!(again[0], again[1]);
    }

    #[test]
    fn unused_embedding_rows_are_left_untouched() {
        let mut net = net();
        let before = net.params().to_vec();
        let dense = array![[1.], [2.]];
        let codes = array![0, 0];
        let mut gd = GradientDescent::new(1.);

        net.train_batch(
            Features::new(dense.view(), vec![codes.view()]),
            array![1., 0.].view(),
            &BinaryCrossEntropy::default(),
            &mut gd,
        )
        .unwrap();

        // Rows 1 and 2 of the table were never looked up.
        assert_eq!(&net.params()[2..6], &before[2..6]);
        assert_ne!(net.params(), before.as_slice());
    }

    #[test]
    fn mismatched_features_are_rejected() {
        let mut net = net();
        let dense = array![[1., 2.]];
        let codes = array![0];

        let res = net.predict(Features::new(dense.view(), vec![codes.view()]));
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));

        let res = net.predict(Features::new(array![[1.]].view(), vec![]));
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }
}
