// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in demo models with deterministic example inputs, so the
//! pipeline can be tried without a model directory.

use graph_ir::{GraphBuilder, GraphError, Module, QuantSpec, Value};
use tensor_core::{DType, Shape, Tensor};

pub const NAMES: [&str; 4] = ["abs_sqrt", "quantize", "dequantize", "add_relu"];

/// Returns the named demo and its example inputs.
pub fn by_name(name: &str) -> anyhow::Result<(Box<dyn Module>, Vec<Tensor>)> {
    let spec = QuantSpec {
        scale: 0.12345,
        zero_point: 0,
        quant_min: -127,
        quant_max: 127,
        dtype: DType::I8,
    };
    let nchw = Shape::new(vec![1, 1, 4, 4]);
    match name {
        "abs_sqrt" => demo(AbsSqrt, vec![ramp(Shape::vector(20), DType::F32, 1.5)?]),
        "quantize" => demo(Quantize(spec), vec![ramp(nchw, DType::F32, 0.9)?]),
        "dequantize" => demo(Dequantize(spec), vec![ramp(nchw, DType::I8, 15.0)?]),
        "add_relu" => demo(
            AddRelu,
            vec![
                ramp(Shape::matrix(2, 8), DType::F32, 0.25)?,
                Tensor::from_f32(Shape::vector(8), &[0.5; 8])?,
            ],
        ),
        other => anyhow::bail!("unknown demo '{other}'; expected one of: {}", NAMES.join(", ")),
    }
}

fn demo(module: impl Module + 'static, inputs: Vec<Tensor>) -> anyhow::Result<(Box<dyn Module>, Vec<Tensor>)> {
    Ok((Box::new(module), inputs))
}

/// Values centred on zero: `(i − n/2) · step`.
fn ramp(shape: Shape, dtype: DType, step: f32) -> anyhow::Result<Tensor> {
    let n = shape.num_elements();
    let values: Vec<f32> = (0..n).map(|i| (i as f32 - (n / 2) as f32) * step).collect();
    Ok(Tensor::from_values(shape, dtype, &values)?)
}

struct AbsSqrt;

impl Module for AbsSqrt {
    fn name(&self) -> &str {
        "abs_sqrt"
    }

    fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
        let a = b.abs(&x[0])?;
        Ok(vec![b.sqrt(&a)?])
    }
}

struct Quantize(QuantSpec);

impl Module for Quantize {
    fn name(&self) -> &str {
        "quantize"
    }

    fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
        Ok(vec![b.quantize_per_tensor(&x[0], self.0)?])
    }
}

struct Dequantize(QuantSpec);

impl Module for Dequantize {
    fn name(&self) -> &str {
        "dequantize"
    }

    fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
        Ok(vec![b.dequantize_per_tensor(&x[0], self.0, DType::F32)?])
    }
}

/// `relu(x + bias)` with a broadcast bias.
struct AddRelu;

impl Module for AddRelu {
    fn name(&self) -> &str {
        "add_relu"
    }

    fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
        let s = b.add(&x[0], &x[1])?;
        Ok(vec![b.relu(&s)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph_ir::capture;

    #[test]
    fn test_every_demo_captures() {
        for name in NAMES {
            let (module, inputs) = by_name(name).unwrap();
            let (graph, outputs) = capture(module.as_ref(), &inputs).unwrap();
            assert!(!graph.nodes().is_empty(), "{name}");
            assert_eq!(outputs.len(), 1, "{name}");
        }
    }

    #[test]
    fn test_unknown_demo() {
        assert!(by_name("resnet").is_err());
    }
}
