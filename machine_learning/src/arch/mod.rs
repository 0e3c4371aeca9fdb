pub mod activations;
mod builder;
mod dense_net;
pub mod layers;
pub mod loss;
mod model;

pub use builder::NetBuilder;
pub use dense_net::DenseNet;
pub use model::{Features, Model, NamedTensor, Predictor};
