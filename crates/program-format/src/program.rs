// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Executable programs and the builder that linearizes graphs into them.

use crate::ProgramError;
use graph_ir::{Attrs, DelegateCall, Graph, GraphError, NodeKind, OpId, TensorType, ValueRef};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tensor_core::Tensor;

/// Where an instruction reads a value from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Operand {
    /// A value slot; slots `0..inputs.len()` hold the method inputs.
    Slot(usize),
    /// An entry of the program's constant table.
    Const(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot(s) => write!(f, "${s}"),
            Self::Const(name) => write!(f, "@{name}"),
        }
    }
}

/// One step of a method.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Instruction {
    /// A native kernel call.
    Kernel {
        name: String,
        op: OpId,
        attrs: Attrs,
        args: Vec<Operand>,
        results: Vec<usize>,
        result_types: Vec<TensorType>,
    },
    /// A delegate call with its sealed payload.
    Delegate {
        name: String,
        call: DelegateCall,
        args: Vec<Operand>,
        results: Vec<usize>,
        result_types: Vec<TensorType>,
    },
}

impl Instruction {
    pub fn name(&self) -> &str {
        match self {
            Self::Kernel { name, .. } | Self::Delegate { name, .. } => name,
        }
    }

    pub fn args(&self) -> &[Operand] {
        match self {
            Self::Kernel { args, .. } | Self::Delegate { args, .. } => args,
        }
    }

    pub fn results(&self) -> &[usize] {
        match self {
            Self::Kernel { results, .. } | Self::Delegate { results, .. } => results,
        }
    }

    pub fn result_types(&self) -> &[TensorType] {
        match self {
            Self::Kernel { result_types, .. } | Self::Delegate { result_types, .. } => result_types,
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, Self::Delegate { .. })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |ops: &[Operand]| ops.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        let results = self.results().iter().map(|s| format!("${s}")).collect::<Vec<_>>().join(", ");
        match self {
            Self::Kernel { op, args, .. } => write!(f, "{results} = {op}({})", join(args)),
            Self::Delegate { call, args, .. } => write!(
                f,
                "{results} = call_delegate[{}, {} bytes, {} node(s)]({})",
                call.backend,
                call.payload.len(),
                call.captured.len(),
                join(args)
            ),
        }
    }
}

/// A named entry point.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Method {
    pub name: String,
    pub inputs: Vec<TensorType>,
    pub instructions: Vec<Instruction>,
    pub outputs: Vec<Operand>,
    pub output_types: Vec<TensorType>,
    /// Number of value slots, inputs included.
    pub num_slots: usize,
}

impl Method {
    pub fn delegate_count(&self) -> usize {
        self.instructions.iter().filter(|i| i.is_delegate()).count()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "method '{}' ({} input(s), {} instruction(s), {} slot(s))",
            self.name,
            self.inputs.len(),
            self.instructions.len(),
            self.num_slots
        )?;
        for (i, ty) in self.inputs.iter().enumerate() {
            writeln!(f, "  ${i:<4} input    {ty}")?;
        }
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "  {i:>4}: {instr}")?;
        }
        let outputs = self.outputs.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
        write!(f, "  return ({outputs})")
    }
}

/// An immutable, linearized program: method table plus constant table.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutableProgram {
    pub(crate) methods: Vec<Method>,
    pub(crate) constants: BTreeMap<String, Tensor>,
}

impl ExecutableProgram {
    pub(crate) fn from_parts(methods: Vec<Method>, constants: BTreeMap<String, Tensor>) -> Self {
        Self { methods, constants }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn constants(&self) -> &BTreeMap<String, Tensor> {
        &self.constants
    }

    /// Total size of the constant table in bytes.
    pub fn constant_bytes(&self) -> usize {
        self.constants.values().map(Tensor::size_bytes).sum()
    }

    /// Returns a human-readable listing.
    pub fn summary(&self) -> String {
        let mut s = format!(
            "ExecutableProgram: {} method(s), {} constant(s) ({} bytes)\n",
            self.methods.len(),
            self.constants.len(),
            self.constant_bytes()
        );
        for m in &self.methods {
            s.push_str(&format!("{m}\n"));
        }
        for (name, t) in &self.constants {
            s.push_str(&format!("  @{name}: {}{}\n", t.dtype(), t.shape()));
        }
        s
    }
}

/// Builds an [`ExecutableProgram`] from one graph per method.
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    methods: Vec<Method>,
    constants: BTreeMap<String, Tensor>,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a method compiled from `graph`.
    ///
    /// Nodes are emitted in stable topological order. Constants the graph
    /// references are copied into the shared constant table.
    pub fn method(mut self, name: impl Into<String>, graph: &Graph) -> Result<Self, ProgramError> {
        let name = name.into();
        if self.methods.iter().any(|m| m.name == name) {
            return Err(ProgramError::DuplicateMethod(name));
        }
        let method = linearize(&name, graph, &mut self.constants)?;
        tracing::debug!(
            "method '{name}': {} instruction(s), {} delegate(s)",
            method.instructions.len(),
            method.delegate_count()
        );
        self.methods.push(method);
        Ok(self)
    }

    pub fn build(self) -> ExecutableProgram {
        ExecutableProgram::from_parts(self.methods, self.constants)
    }
}

/// Single-method shorthand for [`ProgramBuilder`].
pub fn build(name: &str, graph: &Graph) -> Result<ExecutableProgram, ProgramError> {
    Ok(ProgramBuilder::new().method(name, graph)?.build())
}

fn linearize(
    method: &str,
    graph: &Graph,
    constants: &mut BTreeMap<String, Tensor>,
) -> Result<Method, ProgramError> {
    let dangling = |node: &str, reference: &ValueRef| ProgramError::DanglingReference {
        method: method.to_string(),
        node: node.to_string(),
        reference: reference.to_string(),
    };
    let order = graph.stable_topo_order().map_err(|e| match e {
        GraphError::UnresolvedReference { node, reference } => ProgramError::DanglingReference {
            method: method.to_string(),
            node,
            reference,
        },
        other => other.into(),
    })?;

    let mut slots: HashMap<ValueRef, usize> = (0..graph.inputs().len()).map(|i| (ValueRef::Input(i), i)).collect();
    let mut next_slot = graph.inputs().len();
    let mut used_constants: Vec<String> = Vec::new();

    let mut resolve = |node: &str, r: &ValueRef, slots: &HashMap<ValueRef, usize>| -> Result<Operand, ProgramError> {
        match r {
            ValueRef::Const(name) if graph.constants().contains_key(name) => {
                if !used_constants.contains(name) {
                    used_constants.push(name.clone());
                }
                Ok(Operand::Const(name.clone()))
            }
            other => slots.get(other).map(|&s| Operand::Slot(s)).ok_or_else(|| dangling(node, r)),
        }
    };

    let mut instructions = Vec::with_capacity(order.len());
    for pos in order {
        let node = &graph.nodes()[pos];
        let args = node
            .inputs
            .iter()
            .map(|r| resolve(&node.name, r, &slots))
            .collect::<Result<Vec<_>, _>>()?;
        let results: Vec<usize> = (0..node.outputs.len()).map(|i| next_slot + i).collect();
        next_slot += node.outputs.len();
        for (k, &slot) in results.iter().enumerate() {
            slots.insert(node.output_ref(k), slot);
        }

        instructions.push(match &node.kind {
            NodeKind::Op { op, attrs } => Instruction::Kernel {
                name: node.name.clone(),
                op: *op,
                attrs: attrs.clone(),
                args,
                results,
                result_types: node.outputs.clone(),
            },
            NodeKind::Delegate(call) => Instruction::Delegate {
                name: node.name.clone(),
                call: call.clone(),
                args,
                results,
                result_types: node.outputs.clone(),
            },
        });
    }

    let outputs = graph
        .outputs()
        .iter()
        .map(|r| resolve("output", r, &slots))
        .collect::<Result<Vec<_>, _>>()?;
    let output_types = graph.output_types()?;

    for name in used_constants {
        let tensor = &graph.constants()[&name];
        match constants.get(&name) {
            Some(existing) if existing != tensor => return Err(ProgramError::ConstantConflict(name)),
            Some(_) => {}
            None => {
                constants.insert(name, tensor.clone());
            }
        }
    }

    Ok(Method {
        name: method.to_string(),
        inputs: graph.inputs().to_vec(),
        instructions,
        outputs,
        output_types,
        num_slots: next_slot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::{GraphBuilder, Node, NodeId, OpKind};
    use tensor_core::{DType, Shape};

    fn bias_add() -> Graph {
        let mut b = GraphBuilder::new("bias_add");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let c = b
            .constant("bias", Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap())
            .unwrap();
        let s = b.add(&x, &c).unwrap();
        let r = b.relu(&s).unwrap();
        b.finish(&[r]).unwrap()
    }

    #[test]
    fn test_linearize() {
        let program = build("forward", &bias_add()).unwrap();
        let m = program.method("forward").unwrap();
        assert_eq!(m.instructions.len(), 2);
        assert_eq!(m.instructions[0].args(), &[Operand::Slot(0), Operand::Const("bias".into())]);
        assert_eq!(m.instructions[1].args(), &[Operand::Slot(1)]);
        assert_eq!(m.outputs, vec![Operand::Slot(2)]);
        assert_eq!(m.num_slots, 3);
        assert!(program.constants().contains_key("bias"));
    }

    #[test]
    fn test_stable_order() {
        // Nodes stored out of order are emitted producer-first, ties by position.
        let mut g = bias_add();
        let mut nodes = g.take_nodes();
        nodes.reverse();
        for n in nodes {
            g.push(n);
        }
        let program = build("forward", &g).unwrap();
        let ops: Vec<_> = program.methods()[0]
            .instructions
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert!(ops[0].starts_with("add"));
        assert!(ops[1].starts_with("relu"));
    }

    #[test]
    fn test_dangling_reference() {
        let mut g = bias_add();
        let id = NodeId(99);
        let mut nodes = g.take_nodes();
        nodes[0].inputs[0] = ValueRef::node(id, 0);
        for n in nodes {
            g.push(n);
        }
        assert!(matches!(
            build("forward", &g),
            Err(ProgramError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_missing_constant_is_dangling() {
        let mut g = bias_add();
        let mut nodes: Vec<Node> = g.take_nodes();
        nodes[0].inputs[1] = ValueRef::Const("missing".into());
        for n in nodes {
            g.push(n);
        }
        match build("forward", &g) {
            Err(ProgramError::DanglingReference { reference, .. }) => assert_eq!(reference, "const[missing]"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_multiple_methods_share_constants() {
        let g = bias_add();
        let program = ProgramBuilder::new()
            .method("forward", &g)
            .unwrap()
            .method("forward_again", &g)
            .unwrap()
            .build();
        assert_eq!(program.methods().len(), 2);
        assert_eq!(program.constants().len(), 1);

        let dup = ProgramBuilder::new().method("forward", &g).unwrap().method("forward", &g);
        assert!(matches!(dup, Err(ProgramError::DuplicateMethod(_))));
    }

    #[test]
    fn test_constant_conflict() {
        let g = bias_add();
        let mut b = GraphBuilder::new("other");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let c = b
            .constant("bias", Tensor::from_f32(Shape::vector(2), &[5.0, 5.0]).unwrap())
            .unwrap();
        let s = b.mul(&x, &c).unwrap();
        let other = b.finish(&[s]).unwrap();
        assert_eq!(other.count_kind(OpKind::Mul), 1);

        let result = ProgramBuilder::new().method("a", &g).unwrap().method("b", &other);
        assert!(matches!(result, Err(ProgramError::ConstantConflict(_))));
    }
}
