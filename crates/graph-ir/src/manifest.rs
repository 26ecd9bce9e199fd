// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! JSON model manifest parsing.
//!
//! The manifest (`model.json`) lists graph inputs, constants and nodes by
//! name. Node operators use textual identifiers resolved through the
//! [`OpRegistry`]. Constants either carry inline values or are read from
//! `model.safetensors` by the loader.
//!
//! # Format
//! ```json
//! {
//!   "name": "abs_sqrt",
//!   "inputs": [{ "name": "x", "dtype": "f32", "shape": [20] }],
//!   "constants": [{ "name": "bias", "dtype": "f32", "shape": [20] }],
//!   "nodes": [
//!     { "name": "a", "op": "aten::abs", "inputs": ["x"] },
//!     { "name": "b", "op": "aten::add", "inputs": ["a", "bias"] },
//!     { "name": "c", "op": "aten::clamp", "inputs": ["b"], "attrs": { "min": 0 } }
//!   ],
//!   "outputs": ["c"]
//! }
//! ```

use crate::{AttrValue, Attrs, GraphBuilder, GraphError, OpRegistry, QuantSpec, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};

/// Top-level model manifest, deserialized from `model.json`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    /// Human-readable model name.
    pub name: String,
    /// Graph inputs; `values` are optional example inputs.
    pub inputs: Vec<ManifestTensor>,
    /// Named constants; tensors without `values` come from SafeTensors.
    #[serde(default)]
    pub constants: Vec<ManifestTensor>,
    /// Nodes in program order.
    pub nodes: Vec<ManifestNode>,
    /// Names of the values returned by the graph.
    pub outputs: Vec<String>,
}

/// A typed tensor declaration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestTensor {
    pub name: String,
    /// Dtype string (e.g. `"f32"`, `"int8"`).
    pub dtype: String,
    pub shape: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f32>>,
}

impl ManifestTensor {
    pub(crate) fn dtype(&self) -> Result<DType, GraphError> {
        DType::parse(&self.dtype).ok_or_else(|| GraphError::InvalidNode {
            node: self.name.clone(),
            detail: format!("unsupported dtype '{}'", self.dtype),
        })
    }

    /// Materializes inline values, if present.
    pub(crate) fn inline_tensor(&self) -> Result<Option<Tensor>, GraphError> {
        let Some(values) = &self.values else {
            return Ok(None);
        };
        let tensor = Tensor::from_values(Shape::new(self.shape.clone()), self.dtype()?, values)
            .map_err(|source| GraphError::ExecutionError {
                node: self.name.clone(),
                source,
            })?;
        Ok(Some(tensor))
    }
}

/// A single node entry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestNode {
    pub name: String,
    /// Textual operator id, e.g. `"aten::sqrt"` or `"aten.sqrt.default"`.
    pub op: String,
    /// Names of input values (inputs, constants or earlier nodes).
    pub inputs: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, ManifestAttr>,
}

/// Attribute values as written in JSON.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ManifestAttr {
    Int(i64),
    Float(f64),
    Quant(QuantSpec),
    /// Strings that parse as a dtype become dtype attributes.
    Text(String),
}

impl ManifestAttr {
    fn to_attr(&self) -> AttrValue {
        match self {
            Self::Int(v) => AttrValue::Int(*v),
            Self::Float(v) => AttrValue::Float(*v),
            Self::Quant(q) => AttrValue::Quant(*q),
            Self::Text(s) => DType::parse(s).map_or_else(|| AttrValue::Str(s.clone()), AttrValue::DType),
        }
    }
}

impl ModelManifest {
    /// Loads a manifest from a JSON file path.
    pub fn from_file(path: &Path) -> Result<Self, GraphError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parses a manifest from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validates that the manifest is internally consistent.
    ///
    /// Checks:
    /// - At least one node and one output.
    /// - Every dtype string and operator id is recognised.
    /// - Value names are unique.
    /// - Node inputs refer to inputs, constants or earlier nodes; outputs
    ///   refer to known values.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::InvalidGraph("manifest contains no nodes".into()));
        }
        if self.outputs.is_empty() {
            return Err(GraphError::InvalidGraph("manifest declares no outputs".into()));
        }

        let registry = OpRegistry::standard();
        let mut known: HashSet<&str> = HashSet::new();
        for t in self.inputs.iter().chain(&self.constants) {
            t.dtype()?;
            if !known.insert(&t.name) {
                return Err(GraphError::InvalidNode {
                    node: t.name.clone(),
                    detail: "duplicate value name".into(),
                });
            }
        }

        for node in &self.nodes {
            if registry.parse(&node.op).is_none() {
                return Err(GraphError::UnknownOperator(node.op.clone()));
            }
            for input in &node.inputs {
                if !known.contains(input.as_str()) {
                    return Err(GraphError::UnresolvedReference {
                        node: node.name.clone(),
                        reference: input.clone(),
                    });
                }
            }
            if !known.insert(&node.name) {
                return Err(GraphError::InvalidNode {
                    node: node.name.clone(),
                    detail: "duplicate value name".into(),
                });
            }
        }

        for out in &self.outputs {
            if !known.contains(out.as_str()) {
                return Err(GraphError::UnresolvedReference {
                    node: "output".into(),
                    reference: out.clone(),
                });
            }
        }
        Ok(())
    }

    /// Number of constants that must come from a SafeTensors file.
    pub fn external_constant_count(&self) -> usize {
        self.constants.iter().filter(|c| c.values.is_none()).count()
    }

    /// Records the manifest's computation into `builder`.
    pub(crate) fn build(
        &self,
        builder: &mut GraphBuilder,
        inputs: &[Value],
        constants: &BTreeMap<String, Tensor>,
    ) -> Result<Vec<Value>, GraphError> {
        if inputs.len() != self.inputs.len() {
            return Err(GraphError::InputMismatch {
                index: inputs.len().min(self.inputs.len()),
                expected: format!("{} inputs", self.inputs.len()),
                actual: format!("{} inputs", inputs.len()),
            });
        }

        let registry = OpRegistry::standard();
        let mut values: HashMap<&str, Value> = HashMap::new();
        for (decl, value) in self.inputs.iter().zip(inputs) {
            values.insert(&decl.name, value.clone());
        }
        for decl in &self.constants {
            let tensor = constants
                .get(&decl.name)
                .cloned()
                .ok_or_else(|| GraphError::SafeTensorsError(format!("constant '{}' not loaded", decl.name)))?;
            values.insert(&decl.name, builder.constant(&decl.name, tensor)?);
        }

        for node in &self.nodes {
            let op = registry
                .parse(&node.op)
                .ok_or_else(|| GraphError::UnknownOperator(node.op.clone()))?;
            let args = node
                .inputs
                .iter()
                .map(|name| {
                    values.get(name.as_str()).ok_or_else(|| GraphError::UnresolvedReference {
                        node: node.name.clone(),
                        reference: name.clone(),
                    })
                })
                .collect::<Result<Vec<&Value>, _>>()?;
            let attrs: Attrs = node.attrs.iter().map(|(k, v)| (k.clone(), v.to_attr())).collect();
            let out = builder.op_named(node.name.clone(), op, &args, attrs)?;
            values.insert(&node.name, out);
        }

        self.outputs
            .iter()
            .map(|name| {
                values.get(name.as_str()).cloned().ok_or_else(|| GraphError::UnresolvedReference {
                    node: "output".into(),
                    reference: name.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest_json() -> &'static str {
        r#"{
            "name": "abs_sqrt_clamp",
            "inputs": [{ "name": "x", "dtype": "f32", "shape": [4] }],
            "constants": [{ "name": "bias", "dtype": "f32", "shape": [4], "values": [1, 1, 1, 1] }],
            "nodes": [
                { "name": "a", "op": "aten::abs", "inputs": ["x"] },
                { "name": "s", "op": "aten.sqrt.default", "inputs": ["a"] },
                { "name": "b", "op": "add", "inputs": ["s", "bias"] },
                { "name": "c", "op": "aten::clamp", "inputs": ["b"], "attrs": { "min": 0, "max": 2.5 } }
            ],
            "outputs": ["c"]
        }"#
    }

    #[test]
    fn test_parse_manifest() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        assert_eq!(m.name, "abs_sqrt_clamp");
        assert_eq!(m.nodes.len(), 4);
        assert_eq!(m.external_constant_count(), 0);
        m.validate().unwrap();
    }

    #[test]
    fn test_attr_untagged_forms() {
        let json = r#"{ "a": 0, "b": 2.5, "c": "int8", "d": "hello",
                        "q": { "scale": 0.5, "zero_point": 0, "quant_min": -127, "quant_max": 127, "dtype": "i8" } }"#;
        let attrs: BTreeMap<String, ManifestAttr> = serde_json::from_str(json).unwrap();
        assert_eq!(attrs["a"].to_attr(), AttrValue::Int(0));
        assert_eq!(attrs["b"].to_attr(), AttrValue::Float(2.5));
        assert_eq!(attrs["c"].to_attr(), AttrValue::DType(DType::I8));
        assert_eq!(attrs["d"].to_attr(), AttrValue::Str("hello".into()));
        assert_eq!(attrs["q"].to_attr(), AttrValue::Quant(QuantSpec::int8(0.5)));
    }

    #[test]
    fn test_validate_unknown_op() {
        let json = sample_manifest_json().replace("aten::abs", "aten::frobnicate");
        let m = ModelManifest::from_json(&json).unwrap();
        assert!(matches!(m.validate(), Err(GraphError::UnknownOperator(_))));
    }

    #[test]
    fn test_validate_forward_reference() {
        let json = sample_manifest_json().replace(r#""inputs": ["x"] }"#, r#""inputs": ["s"] }"#);
        let m = ModelManifest::from_json(&json).unwrap();
        assert!(matches!(m.validate(), Err(GraphError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = sample_manifest_json().replace(r#""name": "s""#, r#""name": "a""#);
        let m = ModelManifest::from_json(&json).unwrap();
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let m = ModelManifest::from_json(sample_manifest_json()).unwrap();
        let json = serde_json::to_string_pretty(&m).unwrap();
        let back = ModelManifest::from_json(&json).unwrap();
        assert_eq!(back.nodes.len(), m.nodes.len());
        back.validate().unwrap();
    }
}
