// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bundles: a program plus golden test vectors.

use crate::{ExecutableProgram, Method, ProgramError};
use graph_ir::TensorType;
use tensor_core::Tensor;

/// Container format version written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// Inputs and expected outputs for one method call.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TestCase {
    pub method: String,
    pub inputs: Vec<Tensor>,
    pub expected_outputs: Vec<Tensor>,
}

impl TestCase {
    pub fn new(method: impl Into<String>, inputs: Vec<Tensor>, expected_outputs: Vec<Tensor>) -> Self {
        Self {
            method: method.into(),
            inputs,
            expected_outputs,
        }
    }
}

/// An immutable program with its test cases.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub(crate) version: u32,
    pub(crate) program: ExecutableProgram,
    pub(crate) test_cases: Vec<TestCase>,
}

impl Bundle {
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn program(&self) -> &ExecutableProgram {
        &self.program
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    /// Returns a human-readable listing.
    pub fn summary(&self) -> String {
        let mut s = format!("Bundle v{}: {} test case(s)\n", self.version, self.test_cases.len());
        for (i, case) in self.test_cases.iter().enumerate() {
            s.push_str(&format!(
                "  case {i}: method '{}', {} input(s), {} expected output(s)\n",
                case.method,
                case.inputs.len(),
                case.expected_outputs.len()
            ));
        }
        s.push_str(&self.program.summary());
        s
    }
}

/// Packages `program` with `test_cases`, checking every case against its
/// method signature.
pub fn bundle(program: ExecutableProgram, test_cases: Vec<TestCase>) -> Result<Bundle, ProgramError> {
    for case in &test_cases {
        let method = program
            .method(&case.method)
            .ok_or_else(|| ProgramError::UnknownMethod(case.method.clone()))?;
        check_signature(method, "input", &method.inputs, &case.inputs)?;
        check_signature(method, "output", &method.output_types, &case.expected_outputs)?;
    }
    tracing::debug!("bundled {} method(s) with {} test case(s)", program.methods().len(), test_cases.len());
    Ok(Bundle {
        version: FORMAT_VERSION,
        program,
        test_cases,
    })
}

fn check_signature(method: &Method, what: &str, expected: &[TensorType], actual: &[Tensor]) -> Result<(), ProgramError> {
    let mismatch = |detail: String| ProgramError::SchemaMismatch {
        method: method.name.clone(),
        detail,
    };
    if expected.len() != actual.len() {
        return Err(mismatch(format!(
            "expected {} {what}(s), got {}",
            expected.len(),
            actual.len()
        )));
    }
    for (i, (ty, t)) in expected.iter().zip(actual).enumerate() {
        if ty.dtype != t.dtype() {
            return Err(mismatch(format!("{what} {i}: dtype {} vs {}", ty.dtype, t.dtype())));
        }
        if &ty.shape != t.shape() {
            return Err(mismatch(format!("{what} {i}: shape {} vs {}", ty.shape, t.shape())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;
    use graph_ir::GraphBuilder;
    use tensor_core::{DType, Shape};

    fn program() -> ExecutableProgram {
        let mut b = GraphBuilder::new("abs");
        let x = b.input(TensorType::new(DType::F32, Shape::vector(2)));
        let a = b.abs(&x).unwrap();
        build("forward", &b.finish(&[a]).unwrap()).unwrap()
    }

    fn v(values: &[f32]) -> Tensor {
        Tensor::from_f32(Shape::vector(values.len()), values).unwrap()
    }

    #[test]
    fn test_bundle_ok() {
        let case = TestCase::new("forward", vec![v(&[-1.0, 2.0])], vec![v(&[1.0, 2.0])]);
        let b = bundle(program(), vec![case]).unwrap();
        assert_eq!(b.version(), FORMAT_VERSION);
        assert_eq!(b.test_cases().len(), 1);
    }

    #[test]
    fn test_unknown_method() {
        let case = TestCase::new("missing", vec![v(&[1.0, 2.0])], vec![v(&[1.0, 2.0])]);
        assert!(matches!(bundle(program(), vec![case]), Err(ProgramError::UnknownMethod(_))));
    }

    #[test]
    fn test_schema_mismatches() {
        let arity = TestCase::new("forward", vec![], vec![v(&[1.0, 2.0])]);
        let shape = TestCase::new("forward", vec![v(&[1.0, 2.0, 3.0])], vec![v(&[1.0, 2.0])]);
        let dtype = TestCase::new(
            "forward",
            vec![Tensor::from_i8(Shape::vector(2), &[1, 2]).unwrap()],
            vec![v(&[1.0, 2.0])],
        );
        for case in [arity, shape, dtype] {
            assert!(matches!(
                bundle(program(), vec![case]),
                Err(ProgramError::SchemaMismatch { .. })
            ));
        }
    }
}
