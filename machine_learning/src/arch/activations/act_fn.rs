use ndarray::{ArrayView2, ArrayViewMut2};

use super::{Relu, Sigmoid};

/// The activations a dense layer may apply to its outputs.
#[derive(Clone, Debug)]
pub enum ActFn {
    Sigmoid(Sigmoid),
    Relu(Relu),
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid(Sigmoid::new(amp))
    }

    pub fn relu() -> Self {
        Self::Relu(Relu)
    }

    /// Writes the activation of every pre-activation in `z` into `out`.
    pub fn activate(&self, z: ArrayView2<f32>, mut out: ArrayViewMut2<f32>) {
        match self {
            Self::Sigmoid(s) => out.zip_mut_with(&z, |a, &z| *a = s.f(z)),
            Self::Relu(r) => out.zip_mut_with(&z, |a, &z| *a = r.f(z)),
        }
    }

    /// Multiplies every delta in `d` by the activation's derivative at the matching `z`.
    pub fn chain(&self, z: ArrayView2<f32>, mut d: ArrayViewMut2<f32>) {
        match self {
            Self::Sigmoid(s) => d.zip_mut_with(&z, |d, &z| *d *= s.df(z)),
            Self::Relu(r) => d.zip_mut_with(&z, |d, &z| *d *= r.df(z)),
        }
    }
}
