// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loading from manifest + SafeTensors files.
//!
//! The loader reads a model directory containing:
//! - `model.json`: the graph manifest (see [`ModelManifest`]).
//! - `model.safetensors`: constant tensors in HuggingFace SafeTensors
//!   format. Optional when every constant is inlined in the manifest.

use crate::{GraphBuilder, GraphError, ModelManifest, Module, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};

/// Default manifest filename.
const MANIFEST_FILE: &str = "model.json";

/// Default SafeTensors filename.
const WEIGHTS_FILE: &str = "model.safetensors";

/// A manifest with every constant materialized. Implements [`Module`].
#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub manifest: ModelManifest,
    pub constants: BTreeMap<String, Tensor>,
}

impl LoadedModel {
    /// Example inputs: inline manifest values where given, otherwise a
    /// deterministic ramp so exports are reproducible.
    pub fn example_inputs(&self) -> Result<Vec<Tensor>, GraphError> {
        self.manifest
            .inputs
            .iter()
            .enumerate()
            .map(|(i, decl)| match decl.inline_tensor()? {
                Some(t) => Ok(t),
                None => synthetic_input(Shape::new(decl.shape.clone()), decl.dtype()?, i),
            })
            .collect()
    }
}

impl Module for LoadedModel {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn forward(&self, builder: &mut GraphBuilder, inputs: &[Value]) -> Result<Vec<Value>, GraphError> {
        self.manifest.build(builder, inputs, &self.constants)
    }
}

/// Loads model directories.
///
/// # Example
/// ```no_run
/// use graph_ir::{capture, ModelLoader};
/// use std::path::Path;
///
/// let model = ModelLoader::load(Path::new("./models/abs_sqrt")).unwrap();
/// let inputs = model.example_inputs().unwrap();
/// let (graph, golden) = capture(&model, &inputs).unwrap();
/// println!("{}", graph.summary());
/// ```
pub struct ModelLoader;

impl ModelLoader {
    /// Loads and validates a model from the given directory.
    ///
    /// Steps:
    /// 1. Parse `model.json` and validate it.
    /// 2. Materialize inline constants.
    /// 3. Read remaining constants from `model.safetensors`.
    pub fn load(model_dir: &Path) -> Result<LoadedModel, GraphError> {
        let manifest = ModelManifest::from_file(&model_dir.join(MANIFEST_FILE))?;
        let weights_path = model_dir.join(WEIGHTS_FILE);
        let external = if manifest.external_constant_count() > 0 || weights_path.exists() {
            Some(Self::read_constants(&weights_path)?)
        } else {
            None
        };
        Self::assemble(manifest, external)
    }

    /// Builds a model from a manifest whose constants are all inline.
    pub fn from_manifest(manifest: ModelManifest) -> Result<LoadedModel, GraphError> {
        Self::assemble(manifest, None)
    }

    fn assemble(
        manifest: ModelManifest,
        mut external: Option<BTreeMap<String, Tensor>>,
    ) -> Result<LoadedModel, GraphError> {
        manifest.validate()?;

        let mut constants = BTreeMap::new();
        for decl in &manifest.constants {
            let tensor = match decl.inline_tensor()? {
                Some(t) => t,
                None => external
                    .as_mut()
                    .and_then(|m| m.remove(&decl.name))
                    .ok_or_else(|| {
                        GraphError::SafeTensorsError(format!("constant '{}' not found", decl.name))
                    })?,
            };
            let declared = (Shape::new(decl.shape.clone()), decl.dtype()?);
            if (tensor.shape().clone(), tensor.dtype()) != declared {
                return Err(GraphError::InvalidNode {
                    node: decl.name.clone(),
                    detail: format!(
                        "declared {}{} but stored {}{}",
                        declared.1,
                        declared.0,
                        tensor.dtype(),
                        tensor.shape()
                    ),
                });
            }
            constants.insert(decl.name.clone(), tensor);
        }

        if let Some(unused) = external.filter(|m| !m.is_empty()) {
            tracing::debug!("{} SafeTensors entries not referenced by the manifest", unused.len());
        }
        tracing::info!(
            "loaded model '{}': {} nodes, {} constants",
            manifest.name,
            manifest.nodes.len(),
            constants.len()
        );
        Ok(LoadedModel { manifest, constants })
    }

    /// Reads every tensor of a SafeTensors file through a memory map.
    fn read_constants(path: &Path) -> Result<BTreeMap<String, Tensor>, GraphError> {
        let file = std::fs::File::open(path).map_err(|e| {
            GraphError::SafeTensorsError(format!("cannot open '{}': {e}", path.display()))
        })?;

        // SAFETY: the mapping is read-only and dropped before returning.
        let mmap = unsafe { memmap2::Mmap::map(&file) }
            .map_err(|e| GraphError::SafeTensorsError(format!("mmap failed: {e}")))?;

        let tensors = safetensors::SafeTensors::deserialize(&mmap)
            .map_err(|e| GraphError::SafeTensorsError(format!("SafeTensors parse error: {e}")))?;

        let mut out = BTreeMap::new();
        for (name, view) in tensors.tensors() {
            let dtype = convert_safetensor_dtype(view.dtype())?;
            let tensor = Tensor::from_bytes(Shape::new(view.shape().to_vec()), dtype, view.data().to_vec())
                .map_err(|e| GraphError::SafeTensorsError(format!("tensor '{name}': {e}")))?;
            out.insert(name, tensor);
        }
        Ok(out)
    }
}

/// Deterministic pseudo-random values in roughly `[-2, 2]`.
fn synthetic_input(shape: Shape, dtype: DType, seed: usize) -> Result<Tensor, GraphError> {
    let n = shape.num_elements();
    let values: Vec<f32> = (0..n)
        .map(|i| {
            let k = (i * 37 + seed * 11 + 5) % 97;
            (k as f32 / 24.0) - 2.0
        })
        .collect();
    let values = match dtype.integer_range() {
        // Spread integer inputs over a useful part of the range.
        Some((lo, hi)) => values
            .iter()
            .map(|v| (v * 60.0).clamp(lo as f32, hi as f32))
            .collect(),
        None => values,
    };
    Tensor::from_values(shape, dtype, &values).map_err(|source| GraphError::ExecutionError {
        node: "example_input".into(),
        source,
    })
}

/// Converts a SafeTensors `Dtype` to our [`DType`].
fn convert_safetensor_dtype(st_dtype: safetensors::Dtype) -> Result<DType, GraphError> {
    match st_dtype {
        safetensors::Dtype::F32 => Ok(DType::F32),
        safetensors::Dtype::F16 => Ok(DType::F16),
        safetensors::Dtype::BF16 => Ok(DType::BF16),
        safetensors::Dtype::I8 => Ok(DType::I8),
        safetensors::Dtype::U8 => Ok(DType::U8),
        safetensors::Dtype::I32 => Ok(DType::I32),
        other => Err(GraphError::SafeTensorsError(format!(
            "unsupported SafeTensors dtype: {other:?}"
        ))),
    }
}
