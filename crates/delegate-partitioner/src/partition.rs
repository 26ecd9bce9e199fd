// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Maximal convex partitioning.
//!
//! # Convexity
//!
//! Groups are merged one edge at a time. The quotient graph (every group
//! contracted to one node) starts as the input DAG and must stay acyclic
//! after each merge. Merging group `A` into its successor group `B` closes
//! a cycle iff some path leaves `A` and reaches `B` through a third group.
//!
//! ```text
//!   a ──► b ──► c        {a, c} is not convex: a → b → c leaves and re-enters
//!   └──────────►┘
//! ```

use crate::{DelegateBackend, PartitionError};
use graph_ir::{DelegateCall, Graph, Node, NodeId, NodeKind, ValueRef};
use std::collections::{HashMap, HashSet};

/// Union-find over node positions, with the member list of every root.
struct DisjointSet {
    parent: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            members: (0..n).map(|i| vec![i]).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Links the larger root under the smaller so roots are first members.
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
            let moved = std::mem::take(&mut self.members[hi]);
            self.members[lo].extend(moved);
        }
    }

    /// Roots of the groups fed by group `root`.
    fn successors(&mut self, dag: &Dag, root: usize) -> Vec<usize> {
        let succs: Vec<usize> = self.members[root]
            .iter()
            .flat_map(|&m| dag.succs[m].iter().copied())
            .collect();
        let mut roots: Vec<usize> = succs.into_iter().map(|s| self.find(s)).filter(|&r| r != root).collect();
        roots.sort_unstable();
        roots.dedup();
        roots
    }

    /// Whether a path leaves group `from` and reaches group `into`
    /// through some other group.
    fn has_detour(&mut self, dag: &Dag, from: usize, into: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::from([from]);
        while let Some(root) = stack.pop() {
            for next in self.successors(dag, root) {
                if next == into {
                    if root != from {
                        return true;
                    }
                } else if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }
}

/// Adjacency by position.
struct Dag {
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
}

impl Dag {
    fn of(graph: &Graph) -> Self {
        let positions = graph.positions();
        let n = graph.nodes().len();
        let mut preds = vec![Vec::new(); n];
        let mut succs = vec![Vec::new(); n];
        for (pos, node) in graph.nodes().iter().enumerate() {
            for p in node.inputs.iter().filter_map(ValueRef::producer) {
                if let Some(&pred) = positions.get(&p) {
                    if !preds[pos].contains(&pred) {
                        preds[pos].push(pred);
                        succs[pred].push(pos);
                    }
                }
            }
        }
        Self { preds, succs }
    }
}

/// Assigns each native node to at most one backend.
fn claim(graph: &Graph, backends: &[&dyn DelegateBackend]) -> Result<Vec<Option<usize>>, PartitionError> {
    graph
        .nodes()
        .iter()
        .map(|node| {
            if node.is_delegate() {
                return Ok(None);
            }
            let claims: Vec<usize> = backends
                .iter()
                .enumerate()
                .filter(|(_, b)| b.supports(node))
                .map(|(i, _)| i)
                .collect();
            match claims.as_slice() {
                [] => Ok(None),
                [one] => Ok(Some(*one)),
                many => Err(PartitionError::PartitionConflict {
                    node: node.name.clone(),
                    backends: many.iter().map(|&i| backends[i].owner_id().to_string()).collect(),
                }),
            }
        })
        .collect()
}

/// Groups claimed nodes into maximal convex same-backend components.
/// Returns groups as sorted position lists, ordered by first member.
fn group(dag: &Dag, owner: &[Option<usize>]) -> Vec<Vec<usize>> {
    let n = owner.len();
    let mut sets = DisjointSet::new(n);

    loop {
        let mut merged = false;
        for succ in 0..n {
            let Some(backend) = owner[succ] else { continue };
            for &pred in &dag.preds[succ] {
                if owner[pred] != Some(backend) {
                    continue;
                }
                let (ra, rb) = (sets.find(pred), sets.find(succ));
                if ra != rb && !sets.has_detour(dag, ra, rb) {
                    sets.union(ra, rb);
                    merged = true;
                }
            }
        }
        if !merged {
            break;
        }
    }

    // Roots are first members, so scanning in order keeps groups ordered.
    let mut groups = Vec::new();
    for root in 0..n {
        if owner[root].is_some() && sets.find(root) == root {
            let mut members = std::mem::take(&mut sets.members[root]);
            members.sort_unstable();
            groups.push(members);
        }
    }
    groups
}

/// Replaces maximal groups of supported nodes by delegate calls.
///
/// Delegate nodes already in the graph are never captured. Nodes no
/// backend supports stay native.
pub fn partition(graph: Graph, backends: &[&dyn DelegateBackend]) -> Result<Graph, PartitionError> {
    let owner = claim(&graph, backends)?;
    if owner.iter().all(Option::is_none) {
        tracing::info!("partitioner: no node is supported by {} backend(s)", backends.len());
        return Ok(graph);
    }

    let dag = Dag::of(&graph);
    let groups = group(&dag, &owner);
    let mut graph = graph;

    // Delegate node per group, keyed by the group's first position.
    let mut delegates: HashMap<usize, Node> = HashMap::new();
    let mut members: HashSet<usize> = HashSet::new();
    let mut rewrite: HashMap<ValueRef, ValueRef> = HashMap::new();

    for (index, positions) in groups.iter().enumerate() {
        let Some(backend_index) = owner[positions[0]] else {
            continue;
        };
        let backend = backends[backend_index];
        members.extend(positions.iter().copied());
        let Some((subgraph, boundary_inputs, boundary_outputs)) = extract(&graph, positions, index)? else {
            tracing::debug!("group {index}: {} node(s) with no used output, dropped", positions.len());
            continue;
        };
        let payload = backend.compile(&subgraph)?;
        let output_types = subgraph.output_types()?;

        let id = graph.fresh_id();
        for (k, original) in boundary_outputs.iter().enumerate() {
            rewrite.insert(original.clone(), ValueRef::node(id, k));
        }
        tracing::debug!(
            "group {index}: {} node(s) → '{}' ({} in, {} out, {} byte payload)",
            positions.len(),
            backend.owner_id(),
            boundary_inputs.len(),
            boundary_outputs.len(),
            payload.len()
        );

        delegates.insert(
            positions[0],
            Node {
                id,
                name: format!("call_delegate_{index}"),
                kind: NodeKind::Delegate(DelegateCall {
                    backend: backend.owner_id().to_string(),
                    payload,
                    captured: positions.iter().map(|&p| graph.nodes()[p].id).collect(),
                    replaced_outputs: boundary_outputs,
                }),
                inputs: boundary_inputs,
                outputs: output_types,
            },
        );
    }

    let captured = members.len();
    let calls = delegates.len();
    for (pos, node) in graph.take_nodes().into_iter().enumerate() {
        let mut next = match delegates.remove(&pos) {
            Some(delegate) => delegate,
            None if members.contains(&pos) => continue,
            None => node,
        };
        for input in &mut next.inputs {
            if let Some(r) = rewrite.get(input) {
                *input = r.clone();
            }
        }
        graph.push(next);
    }
    let outputs = graph
        .outputs()
        .iter()
        .map(|r| rewrite.get(r).cloned().unwrap_or_else(|| r.clone()))
        .collect();
    graph.set_outputs(outputs);

    graph.sort_topologically()?;
    graph.validate()?;
    tracing::info!(
        "partitioner: {captured} node(s) captured into {calls} delegate(s), {} native node(s) remain",
        graph.nodes().len() - calls
    );
    Ok(graph)
}

/// Builds the self-contained subgraph for one group.
///
/// Returns the subgraph, the group's boundary inputs (first-use order,
/// deduplicated) and its boundary outputs (member order), or `None` when
/// nothing outside the group reads it.
fn extract(
    graph: &Graph,
    positions: &[usize],
    index: usize,
) -> Result<Option<(Graph, Vec<ValueRef>, Vec<ValueRef>)>, PartitionError> {
    let nodes = graph.nodes();
    let ids: HashSet<NodeId> = positions.iter().map(|&p| nodes[p].id).collect();
    let internal = |r: &ValueRef| r.producer().is_some_and(|p| ids.contains(&p));

    let mut boundary_inputs: Vec<ValueRef> = Vec::new();
    for &p in positions {
        for r in &nodes[p].inputs {
            if !internal(r) && !boundary_inputs.contains(r) {
                boundary_inputs.push(r.clone());
            }
        }
    }

    let used_outside: HashSet<&ValueRef> = nodes
        .iter()
        .filter(|n| !ids.contains(&n.id))
        .flat_map(|n| n.inputs.iter())
        .chain(graph.outputs().iter())
        .collect();
    let mut boundary_outputs = Vec::new();
    for &p in positions {
        for k in 0..nodes[p].outputs.len() {
            let r = nodes[p].output_ref(k);
            if used_outside.contains(&r) {
                boundary_outputs.push(r);
            }
        }
    }
    if boundary_outputs.is_empty() {
        return Ok(None);
    }

    let input_types = boundary_inputs
        .iter()
        .map(|r| {
            graph.value_type(r).ok_or_else(|| graph_ir::GraphError::UnresolvedReference {
                node: format!("call_delegate_{index}"),
                reference: r.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut subgraph = Graph::new(format!("{}_delegate_{index}", graph.name), input_types);
    for &p in positions {
        let mut node = nodes[p].clone();
        for input in &mut node.inputs {
            if let Some(i) = boundary_inputs.iter().position(|b| b == input) {
                *input = ValueRef::Input(i);
            }
        }
        subgraph.push(node);
    }
    subgraph.set_outputs(boundary_outputs.clone());
    subgraph.validate()?;
    Ok(Some((subgraph, boundary_inputs, boundary_outputs)))
}

/// Checks that no native node supported by a backend survived.
pub fn verify_full_capture(graph: &Graph, backends: &[&dyn DelegateBackend]) -> Result<(), PartitionError> {
    for node in graph.nodes().iter().filter(|n| !n.is_delegate()) {
        if let Some(b) = backends.iter().find(|b| b.supports(node)) {
            return Err(PartitionError::Uncaptured {
                node: node.name.clone(),
                op: node.op_id().to_string(),
                backend: b.owner_id().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendRegistry, ReferenceDelegate};
    use graph_ir::{evaluate, GraphBuilder, NoDelegates, OpKind, TensorType, Value};
    use tensor_core::{DType, Shape, Tensor};

    fn f32_vec(n: usize) -> TensorType {
        TensorType::new(DType::F32, Shape::vector(n))
    }

    #[test]
    fn test_single_sqrt() {
        let mut b = GraphBuilder::new("sqrt");
        let x = b.input(f32_vec(4));
        let s = b.sqrt(&x).unwrap();
        let g = b.finish(&[s]).unwrap();

        let backend = ReferenceDelegate::portable();
        let p = partition(g, &[&backend]).unwrap();
        assert_eq!(p.count_delegates(), 1);
        assert_eq!(p.count_kind(OpKind::Sqrt), 0);
        verify_full_capture(&p, &[&backend]).unwrap();
    }

    #[test]
    fn test_non_convex_split() {
        // x → abs → neg → add(abs, neg): with neg unsupported, {abs, add}
        // would need to contract across neg.
        let mut b = GraphBuilder::new("diamond");
        let x = b.input(f32_vec(3));
        let a = b.abs(&x).unwrap();
        let n = b.neg(&a).unwrap();
        let s = b.add(&a, &n).unwrap();
        let g = b.finish(&[s]).unwrap();

        let backend = ReferenceDelegate::new("no-neg", [OpKind::Abs, OpKind::Add]);
        let p = partition(g.clone(), &[&backend]).unwrap();
        assert_eq!(p.count_delegates(), 2);
        assert_eq!(p.count_kind(OpKind::Neg), 1);

        let registry = BackendRegistry::new().with(backend);
        let input = [Tensor::from_f32(Shape::vector(3), &[-1.0, 2.0, -3.0]).unwrap()];
        assert_eq!(
            evaluate(&p, &input, &registry).unwrap(),
            evaluate(&g, &input, &NoDelegates).unwrap()
        );
    }

    #[test]
    fn test_interleaved_groups_stay_acyclic() {
        // Merging {a1, a2} and {b1, b2} together would give
        // A → n1 → B → n2 → A once both are contracted.
        let mut b = GraphBuilder::new("interleaved");
        let x = b.input(f32_vec(3));
        let a1 = b.abs(&x).unwrap();
        let b1 = b.abs(&x).unwrap();
        let n1 = b.neg(&a1).unwrap();
        let n2 = b.neg(&b1).unwrap();
        let a2 = b.add(&a1, &n2).unwrap();
        let b2 = b.add(&b1, &n1).unwrap();
        let g = b.finish(&[a2, b2]).unwrap();

        let backend = ReferenceDelegate::new("no-neg", [OpKind::Abs, OpKind::Add]);
        let p = partition(g.clone(), &[&backend]).unwrap();
        assert_eq!(p.count_kind(OpKind::Neg), 2);
        assert_eq!(p.count_delegates(), 3);
        verify_full_capture(&p, &[&backend]).unwrap();

        let registry = BackendRegistry::new().with(backend);
        let input = [Tensor::from_f32(Shape::vector(3), &[-1.0, 0.5, 4.0]).unwrap()];
        assert_eq!(
            evaluate(&p, &input, &registry).unwrap(),
            evaluate(&g, &input, &NoDelegates).unwrap()
        );
    }

    #[test]
    fn test_dead_group_dropped() {
        let mut b = GraphBuilder::new("dead_abs");
        let x = b.input(f32_vec(2));
        let _unused = b.abs(&x).unwrap();
        let s = b.sqrt(&x).unwrap();
        let g = b.finish(&[s]).unwrap();

        let p = partition(g, &[&ReferenceDelegate::portable()]).unwrap();
        assert_eq!(p.nodes().len(), 1);
        assert_eq!(p.count_delegates(), 1);
        assert_eq!(p.count_kind(OpKind::Abs), 0);
    }

    #[test]
    fn test_shared_input_deduplicated() {
        let mut b = GraphBuilder::new("square");
        let x = b.input(f32_vec(2));
        let m = b.mul(&x, &x).unwrap();
        let g = b.finish(&[m]).unwrap();

        let p = partition(g, &[&ReferenceDelegate::portable()]).unwrap();
        assert_eq!(p.nodes()[0].inputs, vec![ValueRef::Input(0)]);
    }

    #[test]
    fn test_boundary_outputs_in_member_order() {
        let mut b = GraphBuilder::new("two_out");
        let x = b.input(f32_vec(2));
        let a = b.abs(&x).unwrap();
        let e = b.exp(&a).unwrap();
        let g = b.finish(&[e.clone(), a.clone()]).unwrap();

        let p = partition(g, &[&ReferenceDelegate::portable()]).unwrap();
        let NodeKind::Delegate(call) = &p.nodes()[0].kind else {
            panic!("expected a delegate");
        };
        assert_eq!(call.replaced_outputs, vec![a.reference().clone(), e.reference().clone()]);
        assert_eq!(call.captured.len(), 2);
        let id = p.nodes()[0].id;
        assert_eq!(p.outputs(), &[ValueRef::node(id, 1), ValueRef::node(id, 0)]);
    }

    #[test]
    fn test_conflict() {
        let mut b = GraphBuilder::new("sqrt");
        let x = b.input(f32_vec(1));
        let s = b.sqrt(&x).unwrap();
        let g = b.finish(&[s]).unwrap();

        let one = ReferenceDelegate::portable();
        let two = ReferenceDelegate::new("other", [OpKind::Sqrt]);
        let err = partition(g, &[&one, &two]).unwrap_err();
        match err {
            PartitionError::PartitionConflict { backends, .. } => {
                assert_eq!(backends, vec!["reference".to_string(), "other".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_existing_delegates_not_recaptured() {
        let mut b = GraphBuilder::new("abs");
        let x = b.input(f32_vec(2));
        let a = b.abs(&x).unwrap();
        let g = b.finish(&[a]).unwrap();

        let backend = ReferenceDelegate::portable();
        let once = partition(g, &[&backend]).unwrap();
        let twice = partition(once.clone(), &[&backend]).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unsupported_graph_unchanged() {
        let mut b = GraphBuilder::new("abs");
        let x = b.input(f32_vec(2));
        let a = b.abs(&x).unwrap();
        let g = b.finish(&[a]).unwrap();

        let p = partition(g.clone(), &[&ReferenceDelegate::quantized_only()]).unwrap();
        assert_eq!(p, g);
    }

    #[test]
    fn test_constant_becomes_boundary_input() {
        let mut b = GraphBuilder::new("bias");
        let x = b.input(f32_vec(2));
        let c = b
            .constant("bias", Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap())
            .unwrap();
        let s = b.add(&x, &c).unwrap();
        let g = b.finish(&[s]).unwrap();

        let p = partition(g, &[&ReferenceDelegate::portable()]).unwrap();
        assert_eq!(
            p.nodes()[0].inputs,
            vec![ValueRef::Input(0), ValueRef::Const("bias".into())]
        );
    }

    // ── Random DAGs ──────────────────────────────────────────────

    /// Deterministic linear congruential sequence.
    struct Lcg(u64);

    impl Lcg {
        fn below(&mut self, bound: usize) -> usize {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.0 >> 33) as usize % bound
        }
    }

    /// A DAG of `len` abs/neg/tanh/add/sub nodes over one input, each
    /// reading earlier values picked at random. Every value nobody reads
    /// is an output, so no node is dead.
    fn random_dag(seed: u64, len: usize) -> Graph {
        let mut rng = Lcg(seed);
        let mut b = GraphBuilder::new(format!("random_{seed}"));
        let mut values: Vec<Value> = vec![b.input(f32_vec(4))];
        let mut read: HashSet<ValueRef> = HashSet::new();
        for _ in 0..len {
            let a = values[rng.below(values.len())].clone();
            let c = values[rng.below(values.len())].clone();
            read.insert(a.reference().clone());
            let v = match rng.below(5) {
                0 => b.abs(&a),
                1 => b.neg(&a),
                2 => b.tanh(&a),
                kind => {
                    read.insert(c.reference().clone());
                    if kind == 3 {
                        b.add(&a, &c)
                    } else {
                        b.sub(&a, &c)
                    }
                }
            }
            .unwrap();
            values.push(v);
        }
        let outputs: Vec<Value> = values[1..]
            .iter()
            .filter(|v| !read.contains(v.reference()))
            .cloned()
            .collect();
        b.finish(&outputs).unwrap()
    }

    fn random_input() -> [Tensor; 1] {
        [Tensor::from_f32(Shape::vector(4), &[-1.5, 0.25, 2.0, -0.75]).unwrap()]
    }

    /// Partitions `g`, then checks total capture, that every supported
    /// node sits in exactly one delegate, and that results are unchanged.
    fn check_partition(g: &Graph, backends: &[&dyn DelegateBackend], registry: &BackendRegistry) {
        let supported = g
            .nodes()
            .iter()
            .filter(|n| backends.iter().any(|b| b.supports(n)))
            .count();
        let p = partition(g.clone(), backends).unwrap_or_else(|e| panic!("{}: {e}", g.name));
        verify_full_capture(&p, backends).unwrap();

        let captured: usize = p
            .nodes()
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Delegate(call) => Some(call.captured.len()),
                _ => None,
            })
            .sum();
        assert_eq!(captured, supported, "{}", g.name);
        if supported > 0 {
            assert!(p.count_delegates() >= 1, "{}", g.name);
        }
        assert_eq!(p.nodes().len(), g.nodes().len() - supported + p.count_delegates());

        let input = random_input();
        assert_eq!(
            evaluate(&p, &input, registry).unwrap(),
            evaluate(g, &input, &NoDelegates).unwrap(),
            "{}",
            g.name
        );
    }

    #[test]
    fn test_random_dags_one_backend() {
        let backend = ReferenceDelegate::new("no-neg", [OpKind::Abs, OpKind::Add]);
        let registry = BackendRegistry::new().with(ReferenceDelegate::new("no-neg", [OpKind::Abs, OpKind::Add]));
        for seed in 0..48 {
            check_partition(&random_dag(seed, 24), &[&backend], &registry);
        }
    }

    #[test]
    fn test_random_dags_alternating_backends() {
        let even = || ReferenceDelegate::new("even", [OpKind::Abs, OpKind::Add]);
        let odd = || ReferenceDelegate::new("odd", [OpKind::Neg, OpKind::Sub]);
        let (a, b) = (even(), odd());
        let registry = BackendRegistry::new().with(even()).with(odd());
        for seed in 100..148 {
            check_partition(&random_dag(seed, 24), &[&a, &b], &registry);
        }
    }

    #[test]
    fn test_random_dags_everything_supported() {
        let backend = ReferenceDelegate::portable();
        let registry = BackendRegistry::new().with(ReferenceDelegate::portable());
        for seed in 200..216 {
            let g = random_dag(seed, 16);
            check_partition(&g, &[&backend], &registry);
        }
    }
}
