// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Program execution.

use crate::{ExecutableProgram, Instruction, Operand, ProgramError};
use graph_ir::interpret::check_inputs;
use graph_ir::{execute_op, DelegateExecutor, GraphError};
use tensor_core::Tensor;

/// Runs method `name` on `inputs`, routing delegate instructions to
/// `delegates`. Kernels use the reference implementations.
pub fn execute_method(
    program: &ExecutableProgram,
    name: &str,
    inputs: &[Tensor],
    delegates: &dyn DelegateExecutor,
) -> Result<Vec<Tensor>, ProgramError> {
    let method = program
        .method(name)
        .ok_or_else(|| ProgramError::UnknownMethod(name.to_string()))?;
    check_inputs(&method.inputs, inputs)?;

    let mut slots: Vec<Option<Tensor>> = vec![None; method.num_slots];
    for (slot, t) in slots.iter_mut().zip(inputs) {
        *slot = Some(t.clone());
    }

    for instr in &method.instructions {
        let args = instr
            .args()
            .iter()
            .map(|a| fetch(program, &slots, a, instr.name()))
            .collect::<Result<Vec<&Tensor>, _>>()?;

        let results = match instr {
            Instruction::Kernel {
                name,
                op,
                attrs,
                result_types,
                ..
            } => execute_op(name, *op, attrs, &args, result_types)?,
            Instruction::Delegate {
                call, result_types, ..
            } => {
                let owned: Vec<Tensor> = args.into_iter().cloned().collect();
                let results = delegates.execute_delegate(call, &owned)?;
                let ok = results.len() == result_types.len()
                    && result_types.iter().zip(&results).all(|(ty, t)| ty.matches(t));
                if !ok {
                    return Err(GraphError::DelegateError {
                        backend: call.backend.clone(),
                        detail: "delegate returned outputs that do not match its signature".into(),
                    }
                    .into());
                }
                results
            }
        };

        for (&slot, t) in instr.results().iter().zip(results) {
            let cell = slots
                .get_mut(slot)
                .ok_or_else(|| ProgramError::Malformed(format!("slot {slot} out of range in '{}'", instr.name())))?;
            *cell = Some(t);
        }
    }

    method
        .outputs
        .iter()
        .map(|o| fetch(program, &slots, o, "output").cloned())
        .collect()
}

fn fetch<'a>(
    program: &'a ExecutableProgram,
    slots: &'a [Option<Tensor>],
    operand: &Operand,
    at: &str,
) -> Result<&'a Tensor, ProgramError> {
    let found = match operand {
        Operand::Slot(s) => slots.get(*s).and_then(Option::as_ref),
        Operand::Const(name) => program.constants().get(name),
    };
    found.ok_or_else(|| ProgramError::Malformed(format!("operand {operand} of '{at}' holds no value")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;
    use delegate_partitioner::{partition, BackendRegistry, ReferenceDelegate};
    use graph_ir::{evaluate, GraphBuilder, NoDelegates, TensorType};
    use tensor_core::{DType, Shape};

    fn bias_relu() -> graph_ir::Graph {
        let mut b = GraphBuilder::new("bias_relu");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(3)));
        let c = b
            .constant("bias", Tensor::from_f32(Shape::vector(3), &[1.0, -1.0, 0.5]).unwrap())
            .unwrap();
        let s = b.add(&x, &c).unwrap();
        let r = b.relu(&s).unwrap();
        b.finish(&[r]).unwrap()
    }

    fn input() -> Vec<Tensor> {
        vec![Tensor::from_f32(Shape::vector(3), &[-2.0, 3.0, 0.25]).unwrap()]
    }

    #[test]
    fn test_matches_interpreter() {
        let g = bias_relu();
        let expected = evaluate(&g, &input(), &NoDelegates).unwrap();
        let program = build("forward", &g).unwrap();
        let actual = execute_method(&program, "forward", &input(), &NoDelegates).unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_delegated_program() {
        let g = bias_relu();
        let expected = evaluate(&g, &input(), &NoDelegates).unwrap();
        let backend = ReferenceDelegate::portable();
        let partitioned = partition(g, &[&backend]).unwrap();
        let program = build("forward", &partitioned).unwrap();
        assert_eq!(program.methods()[0].delegate_count(), 1);

        let registry = BackendRegistry::new().with(backend);
        let actual = execute_method(&program, "forward", &input(), &registry).unwrap();
        assert_eq!(actual, expected);

        // Without the backend the delegate call fails.
        assert!(execute_method(&program, "forward", &input(), &NoDelegates).is_err());
    }

    #[test]
    fn test_input_mismatch() {
        let program = build("forward", &bias_relu()).unwrap();
        let bad = [Tensor::from_f32(Shape::vector(2), &[1.0, 2.0]).unwrap()];
        assert!(matches!(
            execute_method(&program, "forward", &bad, &NoDelegates),
            Err(ProgramError::Graph(GraphError::InputMismatch { .. }))
        ));
        assert!(matches!(
            execute_method(&program, "nope", &input(), &NoDelegates),
            Err(ProgramError::UnknownMethod(_))
        ));
    }
}
