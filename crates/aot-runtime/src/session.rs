// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The export session with a type-state–enforced pipeline.
//!
//! Each transition consumes the session and returns a new one, so a
//! graph cannot be partitioned before it is lowered (legacy) or
//! quantized after it is partitioned.

use crate::{ExportConfig, PassMetrics, PipelineVariant, RuntimeError};
use delegate_partitioner::{partition, verify_full_capture, DelegateBackend};
use graph_ir::{capture, Graph, Module};
use graph_passes::{annotate, fuse, lower, QuantizationPolicy, QuantizeReport, TargetDialect};
use program_format::{bundle, Bundle, ExecutableProgram, ProgramBuilder, TestCase};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tensor_core::Tensor;

// ── Type-state markers ─────────────────────────────────────────

/// Graph captured, reference outputs computed.
#[derive(Debug)]
pub struct Captured;

/// Quantize/dequantize boundaries inserted.
#[derive(Debug)]
pub struct Quantized;

/// Lowered to the target dialect, not yet partitioned.
#[derive(Debug)]
pub struct Lowered;

/// Delegates assigned and the rest lowered.
#[derive(Debug)]
pub struct Partitioned;

/// Sealed trait for session states.
pub trait SessionState: std::fmt::Debug {}
impl SessionState for Captured {}
impl SessionState for Quantized {}
impl SessionState for Lowered {}
impl SessionState for Partitioned {}

/// States from which lowering may start.
pub trait Lowerable: SessionState {}
impl Lowerable for Captured {}
impl Lowerable for Quantized {}

// ── Session ────────────────────────────────────────────────────

/// A graph on its way to an executable program.
///
/// # Example
/// ```no_run
/// use aot_runtime::ExportSession;
/// use delegate_partitioner::{DelegateBackend, ReferenceDelegate};
/// use graph_ir::ModelLoader;
/// use graph_passes::EdgeDialect;
/// use std::path::Path;
///
/// # fn example() -> Result<(), aot_runtime::RuntimeError> {
/// let model = ModelLoader::load(Path::new("./model"))?;
/// let inputs = model.example_inputs()?;
/// let backend = ReferenceDelegate::portable();
/// let exported = ExportSession::capture("forward", &model, &inputs)?
///     .to_edge(&EdgeDialect::portable(), &[&backend as &dyn DelegateBackend])?
///     .partition(&[&backend])?
///     .to_executable()?;
/// println!("{}", exported.metrics.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ExportSession<S: SessionState = Captured> {
    method: String,
    graph: Graph,
    example_inputs: Vec<Tensor>,
    reference_outputs: Vec<Tensor>,
    quantize_report: Option<QuantizeReport>,
    metrics: PassMetrics,
    _state: PhantomData<S>,
}

impl<S: SessionState> ExportSession<S> {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn example_inputs(&self) -> &[Tensor] {
        &self.example_inputs
    }

    /// Outputs of the unmodified captured graph.
    pub fn reference_outputs(&self) -> &[Tensor] {
        &self.reference_outputs
    }

    /// Report of the most recent quantization, if any ran.
    pub fn quantize_report(&self) -> Option<&QuantizeReport> {
        self.quantize_report.as_ref()
    }

    pub fn metrics(&self) -> &PassMetrics {
        &self.metrics
    }

    /// Runs one pass over the graph, recording its metrics.
    fn advance<T: SessionState>(
        self,
        pass: &str,
        f: impl FnOnce(Graph) -> Result<Graph, RuntimeError>,
    ) -> Result<ExportSession<T>, RuntimeError> {
        let Self {
            method,
            graph,
            example_inputs,
            reference_outputs,
            quantize_report,
            mut metrics,
            ..
        } = self;
        let before = graph.nodes().len();
        let start = Instant::now();
        let graph = f(graph)?;
        metrics.record(pass, start.elapsed(), before, graph.nodes().len());
        tracing::debug!("{pass}: {before} → {} node(s)", graph.nodes().len());
        Ok(ExportSession {
            method,
            graph,
            example_inputs,
            reference_outputs,
            quantize_report,
            metrics,
            _state: PhantomData,
        })
    }
}

// ── Captured ───────────────────────────────────────────────────

impl ExportSession<Captured> {
    /// Captures `module` on `example_inputs` and computes the golden
    /// outputs on the unmodified graph.
    pub fn capture(method: impl Into<String>, module: &dyn Module, example_inputs: &[Tensor]) -> Result<Self, RuntimeError> {
        let start = Instant::now();
        let (graph, reference_outputs) = capture(module, example_inputs)?;
        let mut metrics = PassMetrics::new();
        metrics.record("capture", start.elapsed(), 0, graph.nodes().len());
        tracing::info!("{}", graph.summary());
        Ok(Self {
            method: method.into(),
            graph,
            example_inputs: example_inputs.to_vec(),
            reference_outputs,
            quantize_report: None,
            metrics,
            _state: PhantomData,
        })
    }

    /// Inserts quantize/dequantize boundaries.
    pub fn quantize(self, policy: &QuantizationPolicy) -> Result<ExportSession<Quantized>, RuntimeError> {
        quantize_step(self, policy)
    }
}

// ── Quantized ──────────────────────────────────────────────────

impl ExportSession<Quantized> {
    /// Applies the quantizer again; already annotated nodes are kept.
    pub fn quantize(self, policy: &QuantizationPolicy) -> Result<Self, RuntimeError> {
        quantize_step(self, policy)
    }

    /// Collapses dequantize → op → quantize chains into fused kernels.
    pub fn fuse(self) -> Result<Self, RuntimeError> {
        self.advance("fuse", |g| Ok(fuse(g)?.0))
    }
}

fn quantize_step<S: SessionState>(
    session: ExportSession<S>,
    policy: &QuantizationPolicy,
) -> Result<ExportSession<Quantized>, RuntimeError> {
    let mut report = None;
    let mut next: ExportSession<Quantized> = session.advance("quantize", |g| {
        let (g, r) = annotate(g, policy)?;
        report = Some(r);
        Ok(g)
    })?;
    next.quantize_report = report;
    Ok(next)
}

// ── Lowering ───────────────────────────────────────────────────

impl<S: Lowerable> ExportSession<S> {
    /// Legacy variant: lowers every node the dialect supports. Nodes it
    /// cannot express survive only if some backend will capture them.
    pub fn to_edge(
        self,
        dialect: &dyn TargetDialect,
        backends: &[&dyn DelegateBackend],
    ) -> Result<ExportSession<Lowered>, RuntimeError> {
        self.advance("lower", |g| Ok(lower(g, dialect, &|n| backends.iter().any(|b| b.supports(n)))?))
    }

    /// Fused variant: assigns delegates first, then lowers what stays
    /// native.
    pub fn to_edge_transform_and_lower(
        self,
        dialect: &dyn TargetDialect,
        backends: &[&dyn DelegateBackend],
    ) -> Result<ExportSession<Partitioned>, RuntimeError> {
        let partitioned: ExportSession<Partitioned> = self.advance("partition", |g| partition_step(g, backends))?;
        partitioned.advance("lower", |g| Ok(lower(g, dialect, &|n| backends.iter().any(|b| b.supports(n)))?))
    }
}

impl ExportSession<Lowered> {
    pub fn partition(self, backends: &[&dyn DelegateBackend]) -> Result<ExportSession<Partitioned>, RuntimeError> {
        self.advance("partition", |g| partition_step(g, backends))
    }
}

fn partition_step(graph: Graph, backends: &[&dyn DelegateBackend]) -> Result<Graph, RuntimeError> {
    let graph = partition(graph, backends)?;
    verify_full_capture(&graph, backends)?;
    Ok(graph)
}

// ── Partitioned → Exported ─────────────────────────────────────

/// Paths of the two artifacts written by [`Exported::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub program: PathBuf,
    pub bundle: PathBuf,
}

/// The result of an export.
#[derive(Debug, Clone)]
pub struct Exported {
    /// Final graph the program was built from.
    pub graph: Graph,
    pub program: ExecutableProgram,
    pub bundle: Bundle,
    pub quantize_report: Option<QuantizeReport>,
    pub metrics: PassMetrics,
}

impl ExportSession<Partitioned> {
    /// Builds the program and bundles it with the golden test case.
    pub fn to_executable(self) -> Result<Exported, RuntimeError> {
        let start = Instant::now();
        let program = ProgramBuilder::new().method(&self.method, &self.graph)?.build();
        let case = TestCase::new(self.method.as_str(), self.example_inputs, self.reference_outputs);
        let bundle = bundle(program.clone(), vec![case])?;

        let mut metrics = self.metrics;
        let instructions = program.method(&self.method).map_or(0, |m| m.instructions.len());
        metrics.record("build", start.elapsed(), self.graph.nodes().len(), instructions);
        Ok(Exported {
            graph: self.graph,
            program,
            bundle,
            quantize_report: self.quantize_report,
            metrics,
        })
    }
}

impl Exported {
    /// Writes `<stem>.aotp` and `<stem>.aotb` into `dir`, creating it if
    /// needed.
    pub fn save(&self, dir: &Path, stem: &str) -> Result<ArtifactPaths, RuntimeError> {
        std::fs::create_dir_all(dir)?;
        let paths = ArtifactPaths {
            program: dir.join(format!("{stem}.aotp")),
            bundle: dir.join(format!("{stem}.aotb")),
        };
        self.program.save(&paths.program)?;
        self.bundle.save(&paths.bundle)?;
        Ok(paths)
    }
}

// ── Entry points ───────────────────────────────────────────────

/// Runs the whole pipeline described by `config`.
pub fn export_session(
    model: &dyn Module,
    example_inputs: &[Tensor],
    config: &ExportConfig,
) -> Result<Exported, RuntimeError> {
    config.validate()?;
    let registry = config.create_backends()?;
    let backends = registry.backends();
    let dialect = config.create_dialect()?;
    let policy = config.policy()?;
    let variant = config.pipeline_variant()?;
    tracing::info!(
        "exporting '{}' ({} pipeline, backends: [{}], dialect: {})",
        model.name(),
        variant,
        registry.ids().join(", "),
        dialect.name()
    );

    let session = ExportSession::capture(config.method.as_str(), model, example_inputs)?;
    let partitioned = if policy.is_empty() {
        lower_and_partition(session, variant, &dialect, &backends)?
    } else {
        let mut quantized = session.quantize(&policy)?;
        if config.fuse_quantized {
            quantized = quantized.fuse()?;
        }
        lower_and_partition(quantized, variant, &dialect, &backends)?
    };

    let exported = partitioned.to_executable()?;
    tracing::info!("{}", exported.metrics.summary());
    tracing::info!("final graph:\n{}", exported.graph);
    Ok(exported)
}

/// Runs the pipeline and returns the bundle.
pub fn export(model: &dyn Module, example_inputs: &[Tensor], config: &ExportConfig) -> Result<Bundle, RuntimeError> {
    Ok(export_session(model, example_inputs, config)?.bundle)
}

fn lower_and_partition<S: Lowerable>(
    session: ExportSession<S>,
    variant: PipelineVariant,
    dialect: &dyn TargetDialect,
    backends: &[&dyn DelegateBackend],
) -> Result<ExportSession<Partitioned>, RuntimeError> {
    match variant {
        PipelineVariant::Legacy => session.to_edge(dialect, backends)?.partition(backends),
        PipelineVariant::Fused => session.to_edge_transform_and_lower(dialect, backends),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delegate_partitioner::ReferenceDelegate;
    use graph_ir::{GraphBuilder, GraphError, OpKind, Value};
    use graph_passes::EdgeDialect;
    use tensor_core::Shape;

    struct Relu;

    impl Module for Relu {
        fn name(&self) -> &str {
            "relu"
        }

        fn forward(&self, b: &mut GraphBuilder, x: &[Value]) -> Result<Vec<Value>, GraphError> {
            Ok(vec![b.relu(&x[0])?])
        }
    }

    fn input() -> Vec<Tensor> {
        vec![Tensor::from_f32(Shape::vector(3), &[-1.0, 0.5, 2.0]).unwrap()]
    }

    #[test]
    fn test_type_state_legacy() {
        let backend = ReferenceDelegate::portable();
        let backends: [&dyn DelegateBackend; 1] = [&backend];
        let exported = ExportSession::capture("forward", &Relu, &input())
            .unwrap()
            .to_edge(&EdgeDialect::portable(), &backends)
            .unwrap()
            .partition(&backends)
            .unwrap()
            .to_executable()
            .unwrap();
        assert_eq!(exported.graph.count_delegates(), 1);
        let names: Vec<_> = exported.metrics.passes.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["capture", "lower", "partition", "build"]);
        assert_eq!(exported.bundle.test_cases()[0].expected_outputs[0].to_f32_vec(), vec![0.0, 0.5, 2.0]);
    }

    #[test]
    fn test_no_backends_lowers_everything() {
        let exported = ExportSession::capture("forward", &Relu, &input())
            .unwrap()
            .to_edge_transform_and_lower(&EdgeDialect::restricted("clamp", [OpKind::Clamp]), &[])
            .unwrap()
            .to_executable()
            .unwrap();
        assert_eq!(exported.graph.count_delegates(), 0);
        assert_eq!(exported.graph.count_kind(OpKind::Clamp), 1);
    }

    #[test]
    fn test_save_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExportConfig::default();
        let exported = export_session(&Relu, &input(), &config).unwrap();
        let paths = exported.save(&dir.path().join("nested"), "relu").unwrap();
        assert!(paths.program.ends_with("relu.aotp"));
        assert!(paths.bundle.exists());
        assert_eq!(Bundle::load(&paths.bundle).unwrap(), exported.bundle);
        assert_eq!(&ExecutableProgram::load(&paths.program).unwrap(), exported.bundle.program());
    }

    #[test]
    fn test_golden_matches_capture() {
        let session = ExportSession::capture("forward", &Relu, &input()).unwrap();
        let golden = session.reference_outputs().to_vec();
        let bundle = export(&Relu, &input(), &ExportConfig::default()).unwrap();
        assert_eq!(bundle.test_cases()[0].expected_outputs, golden);
    }
}
