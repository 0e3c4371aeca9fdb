#[derive(Clone, Debug)]
pub struct Sigmoid {
    amp: f32,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new(1.)
    }
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp * logistic(z)
    }

    pub fn df(&self, z: f32) -> f32 {
        let s = logistic(z);
        self.amp * s * (1. - s)
    }
}

/// The standard logistic function, stable for large negative inputs.
fn logistic(z: f32) -> f32 {
    if z >= 0. {
        1. / (1. + (-z).exp())
    } else {
        let e = z.exp();
        e / (1. + e)
    }
}
