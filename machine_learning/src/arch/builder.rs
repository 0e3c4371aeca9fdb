use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{
    DenseNet,
    activations::ActFn,
    layers::{Dense, Embedding},
};
use crate::{MlErr, Result};

/// Builds a `DenseNet` and its initial parameters.
///
/// Dense weights are drawn with Xavier uniform initialization, biases start at zero and
/// embedding tables are drawn from `Normal(0, embedding_std)`.
#[derive(Debug, Clone)]
pub struct NetBuilder {
    dense_inputs: usize,
    embeddings: Vec<(usize, usize)>,
    hidden: Vec<usize>,
    embedding_std: f32,
}

impl NetBuilder {
    /// Creates a new `NetBuilder`.
    ///
    /// # Arguments
    /// * `dense_inputs` - The amount of dense feature columns.
    pub fn new(dense_inputs: usize) -> Self {
        Self {
            dense_inputs,
            embeddings: Vec::new(),
            hidden: Vec::new(),
            embedding_std: 0.05,
        }
    }

    /// Adds the embedding of the next categorical column.
    pub fn embedding(mut self, vocab: usize, dim: usize) -> Self {
        self.embeddings.push((vocab, dim));
        self
    }

    /// Sets the widths of the hidden layers, in order.
    pub fn hidden<I: IntoIterator<Item = usize>>(mut self, widths: I) -> Self {
        self.hidden = widths.into_iter().collect();
        self
    }

    pub fn embedding_std(mut self, std_dev: f32) -> Self {
        self.embedding_std = std_dev;
        self
    }

    /// Builds the network.
    ///
    /// # Arguments
    /// * `rng` - The generator every initial parameter is drawn from.
    ///
    /// # Returns
    /// The new network or an error if a dimension is zero.
    pub fn build<R: Rng>(&self, rng: &mut R) -> Result<DenseNet> {
        if let Some(&(vocab, dim)) = self.embeddings.iter().find(|(v, d)| *v == 0 || *d == 0) {
            return Err(MlErr::InvalidArchitecture {
                reason: format!("embedding of vocab {vocab} and dim {dim}"),
            });
        }
        if self.hidden.contains(&0) {
            return Err(MlErr::InvalidArchitecture {
                reason: "hidden layers must have at least one unit".into(),
            });
        }

        let input = self.dense_inputs + self.embeddings.iter().map(|(_, d)| d).sum::<usize>();
        if input == 0 {
            return Err(MlErr::InvalidArchitecture {
                reason: "the network has no inputs".into(),
            });
        }

        let mut params = Vec::new();

        let normal = Normal::new(0., self.embedding_std).map_err(|e| MlErr::InvalidDistribution {
            reason: e.to_string(),
        })?;
        let embeddings = self
            .embeddings
            .iter()
            .map(|&(vocab, dim)| {
                params.extend((0..vocab * dim).map(|_| normal.sample(rng)));
                Embedding::new(vocab, dim)
            })
            .collect();

        let mut widths = vec![input];
        widths.extend(&self.hidden);
        widths.push(1);

        let nlayers = widths.len() - 1;
        let mut layers = Vec::with_capacity(nlayers);

        for (i, pair) in widths.windows(2).enumerate() {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let act_fn = match i + 1 == nlayers {
                true => ActFn::sigmoid(1.),
                false => ActFn::relu(),
            };

            let range = (6. / (fan_in + fan_out) as f32).sqrt();
            let xavier = Uniform::new(-range, range).map_err(|e| MlErr::InvalidDistribution {
                reason: e.to_string(),
            })?;
            params.extend((0..fan_in * fan_out).map(|_| xavier.sample(rng)));
            params.extend(std::iter::repeat_n(0., fan_out));

            layers.push(Dense::new((fan_in, fan_out), Some(act_fn)));
        }

        debug!(
            "built a network with {} parameters over widths {widths:?}",
            params.len()
        );

        DenseNet::new(self.dense_inputs, embeddings, layers, params)
    }
}
