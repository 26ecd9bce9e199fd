// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The quantizer: explicit quantize/dequantize boundaries around
//! selected operators.
//!
//! ```text
//!   x ──► op ──► y            x ──► q ──► dq ──► op ──► q ──► dq ──► y
//! ```
//!
//! Float inputs of a matched node get a `q → dq` pair carrying the rule's
//! input spec, and every float output gets one carrying the output spec;
//! later consumers and graph outputs read the output pair. A value shared
//! by several matched nodes is wrapped once per spec, and an input that
//! already comes out of a dequantize with the same spec is not wrapped
//! again.
//!
//! Wrapped nodes are recorded in the graph, so running [`annotate`] twice
//! with the same policy yields the same graph.

use crate::{PassError, PassResultExt};
use graph_ir::{AttrValue, Attrs, Graph, NodeId, NodeKind, OpCategory, OpKind, QuantSpec, ValueRef};
use std::collections::HashMap;
use tensor_core::DType;

const PASS: &str = "quantize";

/// Quantization parameters for one operator kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantRule {
    /// Operator kind to match, in any namespace.
    pub op: OpKind,
    /// Spec applied to every float input.
    #[serde(default)]
    pub input: Option<QuantSpec>,
    /// Spec applied to every float output.
    #[serde(default)]
    pub output: Option<QuantSpec>,
}

impl QuantRule {
    /// Same spec on inputs and outputs.
    pub fn symmetric(op: OpKind, spec: QuantSpec) -> Self {
        Self {
            op,
            input: Some(spec),
            output: Some(spec),
        }
    }

    fn validate(&self) -> Result<(), PassError> {
        let invalid = |detail: String| PassError::InvalidRule {
            op: self.op.to_string(),
            detail,
        };
        match self.op.info().category {
            OpCategory::Quantization | OpCategory::Fused | OpCategory::Control => {
                return Err(invalid("operator cannot be quantized".into()))
            }
            _ => {}
        }
        if self.input.is_none() && self.output.is_none() {
            return Err(invalid("rule has neither an input nor an output spec".into()));
        }
        for spec in self.input.iter().chain(self.output.iter()) {
            spec.validate().map_err(|e| invalid(e.to_string()))?;
        }
        Ok(())
    }
}

/// An ordered list of rules; the first rule for a kind wins.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantizationPolicy {
    pub rules: Vec<QuantRule>,
}

impl QuantizationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule.
    pub fn with_rule(mut self, rule: QuantRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn rule_for(&self, kind: OpKind) -> Option<&QuantRule> {
        self.rules.iter().find(|r| r.op == kind)
    }
}

/// What [`annotate`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantizeReport {
    /// Nodes wrapped by this run.
    pub annotated: Vec<NodeId>,
    /// Matching nodes skipped because an earlier run wrapped them.
    pub already_annotated: usize,
    /// Quantize and dequantize nodes inserted.
    pub inserted_nodes: usize,
    /// Rules whose operator does not occur in the graph.
    pub skipped_patterns: Vec<OpKind>,
}

/// Wraps every node matched by `policy` in quantize/dequantize pairs.
///
/// A rule that matches no node is reported as an unsupported operator,
/// logged and skipped; it does not fail the pass.
pub fn annotate(mut graph: Graph, policy: &QuantizationPolicy) -> Result<(Graph, QuantizeReport), PassError> {
    for rule in &policy.rules {
        rule.validate()?;
    }

    let mut report = QuantizeReport::default();
    for rule in &policy.rules {
        let present = graph
            .nodes()
            .iter()
            .any(|n| !n.is_delegate() && n.op_id().kind == rule.op);
        if !present {
            let err = PassError::UnsupportedOperator {
                pass: PASS,
                node: "<none>".into(),
                op: rule.op.to_string(),
            };
            tracing::warn!("skipping quantization pattern: {err}");
            report.skipped_patterns.push(rule.op);
        }
    }

    // Dequantize outputs and their quantization parameters.
    let mut dequantized: HashMap<ValueRef, QuantSpec> = HashMap::new();
    // (float value, spec) → dequantized replacement.
    let mut wrapped: HashMap<(ValueRef, QuantSpec), ValueRef> = HashMap::new();
    // Original node outputs → their dequantized replacement.
    let mut redirect: HashMap<ValueRef, ValueRef> = HashMap::new();

    for mut node in graph.take_nodes() {
        for input in &mut node.inputs {
            if let Some(r) = redirect.get(input) {
                *input = r.clone();
            }
        }

        let rule = match &node.kind {
            NodeKind::Op { op, attrs } => {
                if op.kind == OpKind::DequantizePerTensor {
                    if let Some(AttrValue::Quant(spec)) = attrs.get("qparams") {
                        dequantized.insert(node.output_ref(0), *spec);
                    }
                }
                policy.rule_for(op.kind)
            }
            NodeKind::Delegate(_) => None,
        };
        let rule = match rule {
            Some(_) if graph.is_annotated(node.id) => {
                report.already_annotated += 1;
                None
            }
            other => other,
        };

        if let Some(spec) = rule.and_then(|r| r.input) {
            for i in 0..node.inputs.len() {
                let value = node.inputs[i].clone();
                let ty = graph.value_type(&value).ok_or_else(|| PassError::Graph {
                    pass: PASS,
                    source: graph_ir::GraphError::UnresolvedReference {
                        node: node.name.clone(),
                        reference: value.to_string(),
                    },
                })?;
                if !ty.dtype.is_float() || dequantized.get(&value) == Some(&spec) {
                    continue;
                }
                let key = (value.clone(), spec);
                let replacement = match wrapped.get(&key) {
                    Some(r) => r.clone(),
                    None => {
                        let base = format!("{}_in{i}", node.name);
                        let r = insert_pair(&mut graph, &base, value, spec, ty.dtype)?;
                        report.inserted_nodes += 2;
                        dequantized.insert(r.clone(), spec);
                        wrapped.insert(key, r.clone());
                        r
                    }
                };
                node.inputs[i] = replacement;
            }
        }

        let id = node.id;
        let name = node.name.clone();
        let output_dtypes: Vec<DType> = node.outputs.iter().map(|t| t.dtype).collect();
        graph.push(node);

        if let Some(rule) = rule {
            if let Some(spec) = rule.output {
                for (k, dtype) in output_dtypes.into_iter().enumerate() {
                    if !dtype.is_float() {
                        continue;
                    }
                    let original = ValueRef::node(id, k);
                    let base = format!("{name}_out{k}");
                    let r = insert_pair(&mut graph, &base, original.clone(), spec, dtype)?;
                    report.inserted_nodes += 2;
                    dequantized.insert(r.clone(), spec);
                    redirect.insert(original, r);
                }
            }
            graph.mark_annotated(id);
            report.annotated.push(id);
            tracing::debug!("annotated '{name}' with {} rule", rule.op);
        }
    }

    let outputs = graph
        .outputs()
        .iter()
        .map(|r| redirect.get(r).cloned().unwrap_or_else(|| r.clone()))
        .collect();
    graph.set_outputs(outputs);
    graph.validate().in_pass(PASS)?;

    tracing::info!(
        "quantizer: {} node(s) annotated, {} inserted, {} already annotated, {} pattern(s) skipped",
        report.annotated.len(),
        report.inserted_nodes,
        report.already_annotated,
        report.skipped_patterns.len(),
    );
    Ok((graph, report))
}

/// Appends `value → quantize → dequantize` and returns the dequantized edge.
fn insert_pair(
    graph: &mut Graph,
    base: &str,
    value: ValueRef,
    spec: QuantSpec,
    float_dtype: DType,
) -> Result<ValueRef, PassError> {
    let mut q_attrs = Attrs::new();
    q_attrs.insert("qparams".into(), AttrValue::Quant(spec));
    let q = graph
        .add_op(format!("{base}_q"), OpKind::QuantizePerTensor.native_id(), q_attrs, vec![value])
        .in_pass(PASS)?;

    let mut dq_attrs = Attrs::new();
    dq_attrs.insert("qparams".into(), AttrValue::Quant(spec));
    dq_attrs.insert("out_dtype".into(), AttrValue::DType(float_dtype));
    let dq = graph
        .add_op(
            format!("{base}_dq"),
            OpKind::DequantizePerTensor.native_id(),
            dq_attrs,
            vec![ValueRef::node(q, 0)],
        )
        .in_pass(PASS)?;
    Ok(ValueRef::node(dq, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphBuilder, TensorType};
    use tensor_core::Shape;

    fn add_relu() -> Graph {
        let mut b = GraphBuilder::new("add_relu");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let y = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let s = b.add(&x, &y).unwrap();
        let r = b.relu(&s).unwrap();
        b.finish(&[r]).unwrap()
    }

    fn policy() -> QuantizationPolicy {
        QuantizationPolicy::new().with_rule(QuantRule::symmetric(OpKind::Add, QuantSpec::int8(0.05)))
    }

    #[test]
    fn test_wraps_inputs_and_outputs() {
        let (g, report) = annotate(add_relu(), &policy()).unwrap();
        assert_eq!(report.annotated.len(), 1);
        assert_eq!(report.inserted_nodes, 6);
        assert_eq!(g.count_kind(OpKind::QuantizePerTensor), 3);
        assert_eq!(g.count_kind(OpKind::DequantizePerTensor), 3);

        // relu now reads the dequantized add output.
        let relu = g.nodes().iter().find(|n| n.op_id().kind == OpKind::Relu).unwrap();
        let producer = g.node(relu.inputs[0].producer().unwrap()).unwrap();
        assert_eq!(producer.op_id().kind, OpKind::DequantizePerTensor);
    }

    #[test]
    fn test_idempotent() {
        let (once, _) = annotate(add_relu(), &policy()).unwrap();
        let (twice, report) = annotate(once.clone(), &policy()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(report.already_annotated, 1);
        assert_eq!(report.inserted_nodes, 0);
    }

    #[test]
    fn test_shared_value_wrapped_once() {
        let mut b = GraphBuilder::new("square");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let sq = b.mul(&x, &x).unwrap();
        let g = b.finish(&[sq]).unwrap();
        let policy = QuantizationPolicy::new().with_rule(QuantRule {
            op: OpKind::Mul,
            input: Some(QuantSpec::int8(0.1)),
            output: None,
        });
        let (g, report) = annotate(g, &policy).unwrap();
        assert_eq!(report.inserted_nodes, 2);
        let mul = g.nodes().iter().find(|n| n.op_id().kind == OpKind::Mul).unwrap();
        assert_eq!(mul.inputs[0], mul.inputs[1]);
    }

    #[test]
    fn test_chained_rules_reuse_dequantized_edge() {
        let policy = policy().with_rule(QuantRule::symmetric(OpKind::Relu, QuantSpec::int8(0.05)));
        let (g, report) = annotate(add_relu(), &policy).unwrap();
        assert_eq!(report.annotated.len(), 2);
        // add: two inputs + output, relu: output only.
        assert_eq!(report.inserted_nodes, 8);
    }

    #[test]
    fn test_unmatched_pattern_is_skipped() {
        let policy = policy().with_rule(QuantRule::symmetric(OpKind::MatMul, QuantSpec::int8(0.1)));
        let (_, report) = annotate(add_relu(), &policy).unwrap();
        assert_eq!(report.skipped_patterns, vec![OpKind::MatMul]);
        assert_eq!(report.annotated.len(), 1);
    }

    #[test]
    fn test_invalid_rules() {
        let bad_op = QuantizationPolicy::new()
            .with_rule(QuantRule::symmetric(OpKind::QuantizePerTensor, QuantSpec::int8(0.1)));
        assert!(matches!(annotate(add_relu(), &bad_op), Err(PassError::InvalidRule { .. })));

        let bad_scale = QuantizationPolicy::new().with_rule(QuantRule::symmetric(OpKind::Add, QuantSpec::int8(-1.0)));
        assert!(matches!(annotate(add_relu(), &bad_scale), Err(PassError::InvalidRule { .. })));
    }

    #[test]
    fn test_graph_output_redirected() {
        let policy = QuantizationPolicy::new().with_rule(QuantRule::symmetric(OpKind::Relu, QuantSpec::int8(0.05)));
        let (g, _) = annotate(add_relu(), &policy).unwrap();
        let out = g.node(g.outputs()[0].producer().unwrap()).unwrap();
        assert_eq!(out.op_id().kind, OpKind::DequantizePerTensor);
    }

    #[test]
    fn test_policy_from_json() {
        let json = r#"{ "rules": [ { "op": "add",
            "input": { "scale": 0.5, "zero_point": 0, "quant_min": -127, "quant_max": 127, "dtype": "i8" } } ] }"#;
        let p: QuantizationPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(p.rules[0].op, OpKind::Add);
        assert!(p.rules[0].output.is_none());
    }
}
