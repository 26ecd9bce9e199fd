// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Lowering into a target dialect.

use crate::{PassError, PassResultExt, TargetDialect};
use graph_ir::{infer_outputs, Graph, Node, NodeKind};

const PASS: &str = "lower";

/// Rewrites every native node into `dialect`.
///
/// Nodes the dialect cannot express are kept as they are when
/// `delegatable` accepts them (a later partitioning step is expected to
/// absorb them); otherwise lowering fails with
/// [`PassError::UnsupportedOperator`]. Delegate nodes pass through.
pub fn lower(
    mut graph: Graph,
    dialect: &dyn TargetDialect,
    delegatable: &dyn Fn(&Node) -> bool,
) -> Result<Graph, PassError> {
    let mut rewritten = 0usize;
    let mut deferred = 0usize;

    for mut node in graph.take_nodes() {
        let NodeKind::Op { op, attrs } = &node.kind else {
            graph.push(node);
            continue;
        };
        let op = *op;
        match dialect.legalize(op, attrs) {
            Some((new_op, new_attrs)) => {
                if new_op.kind != op.kind {
                    let input_types = node
                        .inputs
                        .iter()
                        .map(|r| {
                            graph.value_type(r).ok_or_else(|| graph_ir::GraphError::UnresolvedReference {
                                node: node.name.clone(),
                                reference: r.to_string(),
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()
                        .in_pass(PASS)?;
                    node.outputs = infer_outputs(&node.name, new_op, &new_attrs, &input_types).in_pass(PASS)?;
                }
                node.kind = NodeKind::Op {
                    op: new_op,
                    attrs: new_attrs,
                };
                rewritten += 1;
            }
            None if delegatable(&node) => {
                tracing::debug!("'{}' ({op}) left for a delegate", node.name);
                deferred += 1;
            }
            None => {
                return Err(PassError::UnsupportedOperator {
                    pass: PASS,
                    node: node.name.clone(),
                    op: op.to_string(),
                })
            }
        }
        graph.push(node);
    }

    graph.validate().in_pass(PASS)?;
    tracing::info!(
        "lowered to '{}': {rewritten} node(s) rewritten, {deferred} deferred to delegates",
        dialect.name()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EdgeDialect;
    use graph_ir::{evaluate, GraphBuilder, Namespace, NoDelegates, OpKind, TensorType};
    use tensor_core::{DType, Shape, Tensor};

    fn abs_sqrt() -> Graph {
        let mut b = GraphBuilder::new("abs_sqrt");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(3)));
        let a = b.abs(&x).unwrap();
        let s = b.sqrt(&a).unwrap();
        b.finish(&[s]).unwrap()
    }

    #[test]
    fn test_portable_lowering() {
        let g = lower(abs_sqrt(), &EdgeDialect::portable(), &|_| false).unwrap();
        assert!(g.nodes().iter().all(|n| n.op_id().namespace == Namespace::Edge));
    }

    #[test]
    fn test_unsupported_is_fatal() {
        let dialect = EdgeDialect::restricted("abs-only", [OpKind::Abs]);
        let err = lower(abs_sqrt(), &dialect, &|_| false).unwrap_err();
        match err {
            PassError::UnsupportedOperator { pass, op, .. } => {
                assert_eq!(pass, "lower");
                assert_eq!(op, "aten::sqrt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unsupported_deferred_to_delegate() {
        let dialect = EdgeDialect::restricted("abs-only", [OpKind::Abs]);
        let g = lower(abs_sqrt(), &dialect, &|n| n.op_id().kind == OpKind::Sqrt).unwrap();
        assert_eq!(g.nodes()[0].op_id().namespace, Namespace::Edge);
        assert_eq!(g.nodes()[1].op_id().namespace, Namespace::Aten);
    }

    #[test]
    fn test_relu_rewrite_preserves_values() {
        let mut b = GraphBuilder::new("relu");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(3)));
        let r = b.relu(&x).unwrap();
        let g = b.finish(&[r]).unwrap();
        let input = [Tensor::from_f32(Shape::vector(3), &[-1.0, 0.0, 2.5]).unwrap()];
        let expected = evaluate(&g, &input, &NoDelegates).unwrap();

        let dialect = EdgeDialect::restricted("clamp-only", [OpKind::Clamp]);
        let lowered = lower(g, &dialect, &|_| false).unwrap();
        assert_eq!(lowered.count_kind(OpKind::Clamp), 1);
        assert_eq!(evaluate(&lowered, &input, &NoDelegates).unwrap(), expected);
    }
}
