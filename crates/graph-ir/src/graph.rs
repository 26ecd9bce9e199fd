// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The graph: an ordered, acyclic sequence of nodes.
//!
//! Node order is program order. A well-formed graph (see
//! [`Graph::validate`]) has every input edge pointing at an earlier node,
//! a graph input or a named constant. Passes take a graph by value and
//! return a fresh one, typically by draining the nodes with
//! [`Graph::take_nodes`] and pushing rewritten nodes back.

use crate::{infer_outputs, Attrs, GraphError, Node, NodeId, NodeKind, OpId, OpKind, TensorType, ValueRef};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};
use std::fmt;
use tensor_core::Tensor;

/// A captured computation graph.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Graph {
    /// Human-readable graph name (e.g. the module name).
    pub name: String,
    inputs: Vec<TensorType>,
    constants: BTreeMap<String, Tensor>,
    nodes: Vec<Node>,
    outputs: Vec<ValueRef>,
    /// Nodes the quantizer has already wrapped.
    annotated: BTreeSet<NodeId>,
    next_id: u32,
}

impl Graph {
    /// Creates an empty graph with the given input signature.
    pub fn new(name: impl Into<String>, inputs: Vec<TensorType>) -> Self {
        Self {
            name: name.into(),
            inputs,
            constants: BTreeMap::new(),
            nodes: Vec::new(),
            outputs: Vec::new(),
            annotated: BTreeSet::new(),
            next_id: 0,
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn inputs(&self) -> &[TensorType] {
        &self.inputs
    }

    pub fn constants(&self) -> &BTreeMap<String, Tensor> {
        &self.constants
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn outputs(&self) -> &[ValueRef] {
        &self.outputs
    }

    /// Looks up a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Position of a node in program order.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }

    /// Map from node id to position, for passes that resolve many edges.
    pub fn positions(&self) -> HashMap<NodeId, usize> {
        self.nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect()
    }

    /// Type of the value an edge carries, if it resolves.
    pub fn value_type(&self, r: &ValueRef) -> Option<TensorType> {
        match r {
            ValueRef::Input(i) => self.inputs.get(*i).cloned(),
            ValueRef::Const(name) => self.constants.get(name).map(TensorType::of),
            ValueRef::Node { node, output } => self.node(*node)?.outputs.get(*output).cloned(),
        }
    }

    /// Types of the graph outputs.
    pub fn output_types(&self) -> Result<Vec<TensorType>, GraphError> {
        self.outputs
            .iter()
            .map(|r| {
                self.value_type(r).ok_or_else(|| GraphError::UnresolvedReference {
                    node: "output".into(),
                    reference: r.to_string(),
                })
            })
            .collect()
    }

    pub fn is_annotated(&self, id: NodeId) -> bool {
        self.annotated.contains(&id)
    }

    pub fn annotated(&self) -> &BTreeSet<NodeId> {
        &self.annotated
    }

    // ── Mutation ───────────────────────────────────────────────────

    /// Allocates a node id that has never been used in this graph.
    pub fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends a node, keeping id allocation ahead of it.
    pub fn push(&mut self, node: Node) -> NodeId {
        self.next_id = self.next_id.max(node.id.0 + 1);
        let id = node.id;
        self.nodes.push(node);
        id
    }

    /// Appends a native op node, inferring its output types.
    pub fn add_op(
        &mut self,
        name: impl Into<String>,
        op: OpId,
        attrs: Attrs,
        inputs: Vec<ValueRef>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        let input_types = inputs
            .iter()
            .map(|r| {
                self.value_type(r).ok_or_else(|| GraphError::UnresolvedReference {
                    node: name.clone(),
                    reference: r.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = infer_outputs(&name, op, &attrs, &input_types)?;
        let id = self.fresh_id();
        Ok(self.push(Node {
            id,
            name,
            kind: NodeKind::Op { op, attrs },
            inputs,
            outputs,
        }))
    }

    /// Appends a graph input and returns its position.
    pub fn add_input(&mut self, ty: TensorType) -> usize {
        self.inputs.push(ty);
        self.inputs.len() - 1
    }

    /// Registers a named constant. Re-registering the same tensor is a no-op.
    pub fn add_constant(&mut self, name: impl Into<String>, tensor: Tensor) -> Result<(), GraphError> {
        let name = name.into();
        match self.constants.get(&name) {
            Some(existing) if existing != &tensor => Err(GraphError::InvalidGraph(format!(
                "constant '{name}' registered twice with different contents"
            ))),
            Some(_) => Ok(()),
            None => {
                self.constants.insert(name, tensor);
                Ok(())
            }
        }
    }

    pub fn set_outputs(&mut self, outputs: Vec<ValueRef>) {
        self.outputs = outputs;
    }

    /// Removes every node, leaving inputs, constants and id allocation.
    pub fn take_nodes(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.nodes)
    }

    pub fn mark_annotated(&mut self, id: NodeId) {
        self.annotated.insert(id);
    }

    /// Rewrites every use of `from` (node inputs and graph outputs) to `to`.
    pub fn replace_uses(&mut self, from: &ValueRef, to: &ValueRef) {
        for node in &mut self.nodes {
            for input in &mut node.inputs {
                if input == from {
                    *input = to.clone();
                }
            }
        }
        for output in &mut self.outputs {
            if output == from {
                *output = to.clone();
            }
        }
    }

    /// Positions of the nodes reading each node's outputs, in program order
    /// and without duplicates.
    pub fn consumers(&self) -> HashMap<NodeId, Vec<usize>> {
        let mut map: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (pos, node) in self.nodes.iter().enumerate() {
            for producer in node.inputs.iter().filter_map(ValueRef::producer) {
                let users = map.entry(producer).or_default();
                if users.last() != Some(&pos) {
                    users.push(pos);
                }
            }
        }
        map
    }

    /// Whether any output of `id` is a graph output.
    pub fn is_graph_output(&self, id: NodeId) -> bool {
        self.outputs.iter().any(|r| r.producer() == Some(id))
    }

    /// Repeatedly removes nodes selected by `removable` whose outputs are
    /// unused. Returns the number of nodes removed.
    pub fn eliminate_dead_nodes(&mut self, removable: impl Fn(&Node) -> bool) -> usize {
        let mut removed = 0;
        loop {
            let used: HashSet<NodeId> = self
                .nodes
                .iter()
                .flat_map(|n| n.inputs.iter())
                .chain(self.outputs.iter())
                .filter_map(ValueRef::producer)
                .collect();
            let before = self.nodes.len();
            self.nodes
                .retain(|n| used.contains(&n.id) || !removable(n));
            let dropped = before - self.nodes.len();
            if dropped == 0 {
                return removed;
            }
            removed += dropped;
        }
    }

    // ── Queries ────────────────────────────────────────────────────

    /// Number of native nodes with exactly this identifier.
    pub fn count_op(&self, op: OpId) -> usize {
        self.nodes.iter().filter(|n| n.op_id() == op).count()
    }

    /// Number of native nodes of this kind in any namespace.
    pub fn count_kind(&self, kind: OpKind) -> usize {
        self.nodes.iter().filter(|n| n.op_id().kind == kind).count()
    }

    pub fn count_delegates(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_delegate()).count()
    }

    /// Stable topological order of node positions: among ready nodes the
    /// one earliest in the current order goes first.
    pub fn stable_topo_order(&self) -> Result<Vec<usize>, GraphError> {
        let positions = self.positions();
        if positions.len() != self.nodes.len() {
            return Err(GraphError::InvalidGraph("duplicate node ids".into()));
        }

        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (pos, node) in self.nodes.iter().enumerate() {
            let mut preds: Vec<usize> = Vec::new();
            for r in &node.inputs {
                if let Some(p) = r.producer() {
                    let pred = *positions.get(&p).ok_or_else(|| GraphError::UnresolvedReference {
                        node: node.name.clone(),
                        reference: r.to_string(),
                    })?;
                    if !preds.contains(&pred) {
                        preds.push(pred);
                    }
                }
            }
            indegree[pos] = preds.len();
            for pred in preds {
                successors[pred].push(pos);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> =
            (0..n).filter(|&i| indegree[i] == 0).map(Reverse).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(pos)) = ready.pop() {
            order.push(pos);
            for &succ in &successors[pos] {
                indegree[succ] -= 1;
                if indegree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() != n {
            return Err(GraphError::InvalidGraph("graph contains a cycle".into()));
        }
        Ok(order)
    }

    /// Reorders nodes into stable topological order.
    pub fn sort_topologically(&mut self) -> Result<(), GraphError> {
        let order = self.stable_topo_order()?;
        let mut slots: Vec<Option<Node>> = self.take_nodes().into_iter().map(Some).collect();
        self.nodes = order.into_iter().filter_map(|i| slots[i].take()).collect();
        Ok(())
    }

    /// Checks structural well-formedness.
    ///
    /// # Checks
    /// - Node ids are unique and below the id allocator.
    /// - Every input edge resolves to an earlier node output, a graph input
    ///   or a named constant.
    /// - Graph outputs resolve and there is at least one.
    /// - Operator namespaces are legal and declared output types agree
    ///   with inference for native ops.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen: HashMap<NodeId, &Node> = HashMap::new();

        for node in &self.nodes {
            if node.id.0 >= self.next_id {
                return Err(node.invalid(format!("id {} was never allocated", node.id)));
            }
            let resolve = |r: &ValueRef| -> Result<TensorType, GraphError> {
                let unresolved = || GraphError::UnresolvedReference {
                    node: node.name.clone(),
                    reference: r.to_string(),
                };
                match r {
                    ValueRef::Node { node: p, output } => seen
                        .get(p)
                        .and_then(|n| n.outputs.get(*output))
                        .cloned()
                        .ok_or_else(unresolved),
                    other => self.value_type(other).ok_or_else(unresolved),
                }
            };
            let input_types = node
                .inputs
                .iter()
                .map(resolve)
                .collect::<Result<Vec<_>, _>>()?;

            match &node.kind {
                NodeKind::Op { op, attrs } => {
                    if !op.is_valid() || op.kind == OpKind::CallDelegate {
                        return Err(node.invalid(format!("illegal operator identifier {op}")));
                    }
                    let inferred = infer_outputs(&node.name, *op, attrs, &input_types)?;
                    let agrees = inferred.len() == node.outputs.len()
                        && inferred
                            .iter()
                            .zip(&node.outputs)
                            .all(|(a, b)| a.dtype == b.dtype && a.shape == b.shape);
                    if !agrees {
                        return Err(node.invalid("declared output types disagree with inference"));
                    }
                }
                NodeKind::Delegate(call) => {
                    if call.replaced_outputs.len() != node.outputs.len() {
                        return Err(node.invalid("delegate output count mismatch"));
                    }
                }
            }

            if seen.insert(node.id, node).is_some() {
                return Err(node.invalid(format!("duplicate node id {}", node.id)));
            }
        }

        if self.outputs.is_empty() {
            return Err(GraphError::InvalidGraph("graph has no outputs".into()));
        }
        self.output_types()?;
        Ok(())
    }

    /// One-line description.
    pub fn summary(&self) -> String {
        format!(
            "Graph '{}': {} inputs, {} nodes ({} delegates), {} constants, {} outputs",
            self.name,
            self.inputs.len(),
            self.nodes.len(),
            self.count_delegates(),
            self.constants.len(),
            self.outputs.len(),
        )
    }
}

/// Tabular listing: one row per input, node and output.
impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:<22} {:<36} {}", "opcode", "name", "target", "args")?;
        for (i, t) in self.inputs.iter().enumerate() {
            writeln!(f, "{:<14} {:<22} {:<36} {}", "placeholder", format!("input[{i}]"), "", t)?;
        }
        for (name, t) in &self.constants {
            writeln!(
                f,
                "{:<14} {:<22} {:<36} {}",
                "get_attr",
                name,
                "",
                TensorType::of(t)
            )?;
        }
        for node in &self.nodes {
            let args: Vec<String> = node.inputs.iter().map(|r| r.to_string()).collect();
            let target = match &node.kind {
                NodeKind::Op { op, .. } => op.to_string(),
                NodeKind::Delegate(call) => format!("{} [{}]", OpId::CALL_DELEGATE, call.backend),
            };
            writeln!(
                f,
                "{:<14} {:<22} {:<36} ({})",
                "call_function",
                format!("{} {}", node.id, node.name),
                target,
                args.join(", ")
            )?;
        }
        let outs: Vec<String> = self.outputs.iter().map(|r| r.to_string()).collect();
        writeln!(f, "{:<14} {:<22} {:<36} ({})", "output", "output", "", outs.join(", "))
    }
}
