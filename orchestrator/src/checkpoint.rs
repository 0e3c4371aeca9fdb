use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use machine_learning::{MlErr, arch::Predictor};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::error::{OrchestratorError, Result};

fn checkpoint_err(path: &Path, reason: impl ToString) -> OrchestratorError {
    OrchestratorError::Checkpoint {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Writes the model's parameters as a safetensors file, one tensor per parameter group.
///
/// The file is written next to `path` and renamed over it once complete, so a crash never
/// leaves a truncated checkpoint behind.
///
/// # Arguments
/// * `path` - Where to save the checkpoint, parent directories are created.
/// * `model` - The model whose parameters are saved.
/// * `metadata` - Free form string pairs stored in the file's header.
pub fn save(path: &Path, model: &dyn Predictor, metadata: HashMap<String, String>) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let tensors = model.tensors();
    let views = tensors
        .iter()
        .map(|t| {
            let bytes: &[u8] = bytemuck::cast_slice(t.data);
            TensorView::new(Dtype::F32, t.shape.clone(), bytes)
                .map(|view| (t.name.clone(), view))
                .map_err(|e| checkpoint_err(path, e))
        })
        .collect::<Result<Vec<_>>>()?;

    let partial = partial_path(path);
    let named = views.iter().map(|(name, view)| (name.as_str(), view));
    safetensors::serialize_to_file(named, &Some(metadata), &partial)
        .map_err(|e| checkpoint_err(path, e))?;
    fs::rename(&partial, path)?;

    debug!("saved {} tensors to {}", tensors.len(), path.display());
    Ok(())
}

/// Loads a checkpoint written by `save` into `model`.
///
/// Every parameter group of the model must be present with its exact shape, extra tensors
/// are an error too.
///
/// # Returns
/// The checkpoint's metadata.
pub fn load(path: &Path, model: &mut dyn Predictor) -> Result<HashMap<String, String>> {
    let bytes = fs::read(path)?;
    let file = SafeTensors::deserialize(&bytes).map_err(|e| checkpoint_err(path, e))?;

    let mut params = Vec::with_capacity(model.size());

    for tensor in model.tensors() {
        let view = file.tensor(&tensor.name).map_err(|_| MlErr::MissingTensor {
            name: tensor.name.clone(),
        })?;

        if view.dtype() != Dtype::F32 {
            return Err(checkpoint_err(
                path,
                format!("tensor {} is {:?}, expected F32", tensor.name, view.dtype()),
            ));
        }
        if view.shape() != tensor.shape.as_slice() {
            return Err(MlErr::ShapeMismatch {
                name: tensor.name.clone(),
                got: view.shape().to_vec(),
                expected: tensor.shape.clone(),
            }
            .into());
        }

        // The file's bytes carry no alignment guarantee, copy them into an f32 buffer
        let mut values = vec![0f32; tensor.data.len()];
        bytemuck::cast_slice_mut::<f32, u8>(&mut values).copy_from_slice(view.data());
        params.extend(values);
    }

    if file.len() != model.tensors().len() {
        return Err(checkpoint_err(
            path,
            format!(
                "holds {} tensors, the model has {}",
                file.len(),
                model.tensors().len()
            ),
        ));
    }

    model.set_params(&params)?;

    let (_, header) = SafeTensors::read_metadata(&bytes).map_err(|e| checkpoint_err(path, e))?;
    debug!("loaded {} parameters from {}", params.len(), path.display());

    Ok(header.metadata().clone().unwrap_or_default())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}
