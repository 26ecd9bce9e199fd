// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Fusion of quantized patterns.
//!
//! ```text
//!   dq(a) ─┐
//!          ├─► add ──► q   ⇒   quantized_add(a, b)
//!   dq(b) ─┘
//! ```
//!
//! The fused node takes over the quantize node's id and output, so every
//! consumer of the quantized value is left untouched. Dequantize nodes
//! that lose their last reader are removed.

use crate::{PassError, PassResultExt};
use graph_ir::{AttrValue, Attrs, Graph, Namespace, Node, NodeId, NodeKind, OpKind, ValueRef};
use std::collections::{HashMap, HashSet};

const PASS: &str = "fuse";

/// A matched `dq* → op → q` pattern.
struct Match {
    op_pos: usize,
    quant_pos: usize,
    node: Node,
}

/// Collapses every `dequantize → op → quantize` chain whose op has a
/// fused counterpart. Returns the new graph and the number of fusions.
pub fn fuse(mut graph: Graph) -> Result<(Graph, usize), PassError> {
    let matches = find_matches(&graph);
    if matches.is_empty() {
        return Ok((graph, 0));
    }

    let count = matches.len();
    let mut replace: HashMap<usize, Node> = HashMap::new();
    let mut drop: HashSet<usize> = HashSet::new();
    for m in matches {
        tracing::debug!("fused '{}' into {}", graph.nodes()[m.op_pos].name, m.node.op_id());
        replace.insert(m.op_pos, m.node);
        drop.insert(m.quant_pos);
    }

    let nodes = graph.take_nodes();
    for (pos, node) in nodes.into_iter().enumerate() {
        if drop.contains(&pos) {
            continue;
        }
        graph.push(replace.remove(&pos).unwrap_or(node));
    }

    let removed = graph.eliminate_dead_nodes(|n| n.op_id().kind == OpKind::DequantizePerTensor);
    graph.validate().in_pass(PASS)?;
    tracing::info!("fusion: {count} pattern(s) fused, {removed} dequantize node(s) removed");
    Ok((graph, count))
}

fn find_matches(graph: &Graph) -> Vec<Match> {
    let positions = graph.positions();
    let consumers = graph.consumers();
    let nodes = graph.nodes();
    let mut matches = Vec::new();

    for (op_pos, node) in nodes.iter().enumerate() {
        let (op, attrs) = match &node.kind {
            NodeKind::Op { op, attrs } => (*op, attrs),
            NodeKind::Delegate(_) => continue,
        };
        let Some(fused_kind) = op.kind.info().fused else {
            continue;
        };
        if node.outputs.len() != 1 || graph.is_graph_output(node.id) {
            continue;
        }

        // Every input must be a dequantize output.
        let mut sources = Vec::with_capacity(node.inputs.len());
        for input in &node.inputs {
            let dq = input
                .producer()
                .and_then(|id| positions.get(&id))
                .map(|&p| &nodes[p])
                .filter(|n| n.op_id().kind == OpKind::DequantizePerTensor);
            match dq.and_then(|n| Some((n.inputs.first()?.clone(), n.attrs()?.get("qparams")?.clone()))) {
                Some(source) => sources.push(source),
                None => break,
            }
        }
        if sources.len() != node.inputs.len() {
            continue;
        }

        // ... and the only reader a quantize node.
        let readers = consumers.get(&node.id).map(Vec::as_slice).unwrap_or(&[]);
        let [quant_pos] = readers else {
            continue;
        };
        let quant = &nodes[*quant_pos];
        if quant.op_id().kind != OpKind::QuantizePerTensor {
            continue;
        }
        let Some(out_spec) = quant.attrs().and_then(|a| a.get("qparams")).cloned() else {
            continue;
        };

        let mut fused_attrs: Attrs = attrs.clone();
        let mut inputs = Vec::with_capacity(sources.len());
        for (i, (source, spec)) in sources.into_iter().enumerate() {
            fused_attrs.insert(format!("in{i}"), spec);
            inputs.push(source);
        }
        fused_attrs.insert("out".into(), out_spec);
        fused_attrs.insert("float_dtype".into(), AttrValue::DType(node.outputs[0].dtype));

        let mut fused_op = fused_kind.native_id();
        if op.namespace == Namespace::Edge {
            fused_op = fused_op.to_edge();
        }

        matches.push(Match {
            op_pos,
            quant_pos: *quant_pos,
            node: fused_node(quant.id, &node.name, fused_op, fused_attrs, inputs, quant),
        });
    }
    matches
}

fn fused_node(
    id: NodeId,
    name: &str,
    op: graph_ir::OpId,
    attrs: Attrs,
    inputs: Vec<ValueRef>,
    quant: &Node,
) -> Node {
    Node {
        id,
        name: format!("{name}_fused"),
        kind: NodeKind::Op { op, attrs },
        inputs,
        outputs: quant.outputs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{annotate, QuantRule, QuantizationPolicy};
    use graph_ir::{evaluate, GraphBuilder, NoDelegates, QuantSpec, TensorType};
    use tensor_core::{DType, Shape, Tensor};

    fn quantized_add() -> Graph {
        let mut b = GraphBuilder::new("qadd");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let y = b.input(TensorType::new(DType::F32, Shape::vector(4)));
        let s = b.add(&x, &y).unwrap();
        let g = b.finish(&[s]).unwrap();
        let policy = QuantizationPolicy::new().with_rule(QuantRule::symmetric(OpKind::Add, QuantSpec::int8(0.05)));
        annotate(g, &policy).unwrap().0
    }

    fn inputs() -> Vec<Tensor> {
        vec![
            Tensor::from_f32(Shape::vector(4), &[0.1, -0.5, 1.2, 3.0]).unwrap(),
            Tensor::from_f32(Shape::vector(4), &[0.3, 0.25, -2.0, 7.0]).unwrap(),
        ]
    }

    #[test]
    fn test_fuses_add() {
        let g = quantized_add();
        let (fused, count) = fuse(g.clone()).unwrap();
        assert_eq!(count, 1);
        assert_eq!(fused.count_kind(OpKind::QuantizedAdd), 1);
        assert_eq!(fused.count_kind(OpKind::Add), 0);
        // two input quantizes remain, the output quantize became the fused node.
        assert_eq!(fused.count_kind(OpKind::QuantizePerTensor), 2);
        assert_eq!(fused.count_kind(OpKind::DequantizePerTensor), 1);
    }

    #[test]
    fn test_fused_is_bit_identical() {
        let g = quantized_add();
        let before = evaluate(&g, &inputs(), &NoDelegates).unwrap();
        let (fused, _) = fuse(g).unwrap();
        let after = evaluate(&fused, &inputs(), &NoDelegates).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_no_match_without_quantize_reader() {
        let mut b = GraphBuilder::new("plain");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let r = b.relu(&x).unwrap();
        let g = b.finish(&[r]).unwrap();
        let (same, count) = fuse(g.clone()).unwrap();
        assert_eq!(count, 0);
        assert_eq!(same, g);
    }
}
