use crate::Result;

pub trait Optimizer {
    /// Updates `params` in place following the gradient `grad`.
    ///
    /// # Errors
    /// `MlErr::SizeMismatch` if the slices or the optimizer's state have different lengths.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, learning_rate: f32);
}

pub(super) fn check_len(params: &[f32], grad: &[f32]) -> Result<()> {
    if params.len() != grad.len() {
        return Err(crate::MlErr::SizeMismatch {
            a: "parameters",
            b: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    Ok(())
}
