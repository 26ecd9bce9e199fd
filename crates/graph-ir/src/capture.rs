// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Graph capture: freeze a module into a graph plus reference outputs.

use crate::{evaluate, GraphBuilder, Graph, GraphError, NoDelegates, TensorType, Value};
use tensor_core::Tensor;

/// A model that can describe its computation to a [`GraphBuilder`].
pub trait Module {
    /// Name given to the captured graph.
    fn name(&self) -> &str;

    /// Records the forward computation. `inputs` are typed after the
    /// example inputs passed to [`capture`].
    fn forward(&self, builder: &mut GraphBuilder, inputs: &[Value]) -> Result<Vec<Value>, GraphError>;
}

/// Captures `module` with the given example inputs.
///
/// Returns the normalized graph (validated, unused nodes removed) and the
/// outputs of that unmodified graph on `example_inputs`. Those outputs are
/// the golden values every later stage is compared against.
pub fn capture(module: &dyn Module, example_inputs: &[Tensor]) -> Result<(Graph, Vec<Tensor>), GraphError> {
    let mut builder = GraphBuilder::new(module.name());
    let inputs: Vec<Value> = example_inputs
        .iter()
        .map(|t| builder.input(TensorType::of(t)))
        .collect();
    let outputs = module.forward(&mut builder, &inputs)?;
    let mut graph = builder.finish(&outputs)?;

    let dropped = graph.eliminate_dead_nodes(|_| true);
    if dropped > 0 {
        tracing::debug!("capture dropped {dropped} unused node(s) from '{}'", graph.name);
    }

    let reference = evaluate(&graph, example_inputs, &NoDelegates)?;
    tracing::info!("captured {}", graph.summary());
    Ok((graph, reference))
}
