// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Export configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! method = "forward"
//! pipeline = "fused"
//! backends = ["reference"]
//! fuse_quantized = true
//! output_dir = "./out"
//! file_stem = "model"
//!
//! [dialect]
//! kind = "restricted"
//! ops = ["abs", "clamp", "add"]
//!
//! [[quantization]]
//! op = "add"
//! input = { scale = 0.05, zero_point = 0, quant_min = -127, quant_max = 127, dtype = "i8" }
//! output = { scale = 0.05, zero_point = 0, quant_min = -127, quant_max = 127, dtype = "i8" }
//!
//! [tolerance]
//! atol = 1e-5
//! rtol = 1e-5
//! per_output = [{ index = 0, atol = 0.1, rtol = 0.0 }]
//! ```

use crate::RuntimeError;
use delegate_partitioner::{BackendRegistry, ReferenceDelegate};
use graph_ir::{OpKind, OpRegistry, QuantSpec};
use graph_passes::{EdgeDialect, QuantRule, QuantizationPolicy};
use std::fmt;
use std::path::{Path, PathBuf};

/// Order in which lowering and partitioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineVariant {
    /// Lower everything the dialect supports, then partition.
    Legacy,
    /// Partition first, then lower what stays native.
    Fused,
}

impl PipelineVariant {
    pub fn parse(name: &str) -> Result<Self, RuntimeError> {
        match name.to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "fused" => Ok(Self::Fused),
            other => Err(RuntimeError::ConfigError(format!(
                "unknown pipeline '{other}'; expected 'legacy' or 'fused'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Fused => "fused",
        }
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target dialect selection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DialectConfig {
    /// `"portable"` or `"restricted"`.
    pub kind: String,
    /// Operator names for a restricted dialect.
    #[serde(default)]
    pub ops: Vec<String>,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            kind: "portable".into(),
            ops: Vec::new(),
        }
    }
}

/// One quantization rule with a textual operator name.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantRuleConfig {
    pub op: String,
    #[serde(default)]
    pub input: Option<QuantSpec>,
    #[serde(default)]
    pub output: Option<QuantSpec>,
}

/// Tolerance override for one output tensor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputTolerance {
    pub index: usize,
    pub atol: f64,
    pub rtol: f64,
}

/// Comparison tolerance: `|actual − expected| ≤ atol + rtol·|expected|`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToleranceConfig {
    #[serde(default = "default_tol")]
    pub atol: f64,
    #[serde(default = "default_tol")]
    pub rtol: f64,
    #[serde(default)]
    pub per_output: Vec<OutputTolerance>,
}

fn default_tol() -> f64 {
    1e-5
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self::new(default_tol(), default_tol())
    }
}

impl ToleranceConfig {
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self {
            atol,
            rtol,
            per_output: Vec::new(),
        }
    }

    /// Adds an override for output `index`.
    pub fn with_output(mut self, index: usize, atol: f64, rtol: f64) -> Self {
        self.per_output.retain(|o| o.index != index);
        self.per_output.push(OutputTolerance { index, atol, rtol });
        self
    }

    /// `(atol, rtol)` for output `index`.
    pub fn for_output(&self, index: usize) -> (f64, f64) {
        self.per_output
            .iter()
            .find(|o| o.index == index)
            .map_or((self.atol, self.rtol), |o| (o.atol, o.rtol))
    }

    /// Both values must be finite and non-negative.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let pairs = std::iter::once((None, self.atol, self.rtol))
            .chain(self.per_output.iter().map(|o| (Some(o.index), o.atol, o.rtol)));
        for (index, atol, rtol) in pairs {
            let ok = |v: f64| v.is_finite() && v >= 0.0;
            if !ok(atol) || !ok(rtol) {
                let at = index.map_or("default".to_string(), |i| format!("output {i}"));
                return Err(RuntimeError::ConfigError(format!(
                    "tolerance for {at} must be finite and non-negative (atol={atol}, rtol={rtol})"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for one export.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportConfig {
    /// Method name in the program's method table.
    #[serde(default = "default_method")]
    pub method: String,
    /// Pipeline variant name: `"legacy"` or `"fused"`.
    #[serde(default = "default_pipeline")]
    pub pipeline: String,
    /// Delegate backend names: `"reference"`, `"reference-int8"`.
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
    /// Collapse quantized patterns after annotation.
    #[serde(default = "default_true")]
    pub fuse_quantized: bool,
    /// Directory artifacts are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Artifact file stem: `<stem>.aotp` and `<stem>.aotb`.
    #[serde(default = "default_stem")]
    pub file_stem: String,
    #[serde(default)]
    pub dialect: DialectConfig,
    #[serde(default)]
    pub quantization: Vec<QuantRuleConfig>,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
}

fn default_method() -> String {
    "forward".into()
}

fn default_pipeline() -> String {
    PipelineVariant::Fused.as_str().into()
}

fn default_backends() -> Vec<String> {
    vec!["reference".into()]
}

fn default_true() -> bool {
    true
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_stem() -> String {
    "model".into()
}

impl ExportConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str).map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    pub fn pipeline_variant(&self) -> Result<PipelineVariant, RuntimeError> {
        PipelineVariant::parse(&self.pipeline)
    }

    /// Creates the delegate backends named by this config.
    pub fn create_backends(&self) -> Result<BackendRegistry, RuntimeError> {
        let mut registry = BackendRegistry::new();
        for name in &self.backends {
            let backend = ReferenceDelegate::by_name(name).ok_or_else(|| {
                RuntimeError::ConfigError(format!(
                    "unknown backend '{name}'; expected 'reference' or 'reference-int8'"
                ))
            })?;
            registry.register(Box::new(backend));
        }
        Ok(registry)
    }

    /// Creates the target dialect.
    pub fn create_dialect(&self) -> Result<EdgeDialect, RuntimeError> {
        match self.dialect.kind.to_lowercase().as_str() {
            "portable" | "edge" => Ok(EdgeDialect::portable()),
            "restricted" => {
                let kinds = self
                    .dialect
                    .ops
                    .iter()
                    .map(|op| parse_kind(op))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(EdgeDialect::restricted("restricted", kinds))
            }
            other => Err(RuntimeError::ConfigError(format!(
                "unknown dialect '{other}'; expected 'portable' or 'restricted'"
            ))),
        }
    }

    /// Builds the quantization policy.
    pub fn policy(&self) -> Result<QuantizationPolicy, RuntimeError> {
        let mut policy = QuantizationPolicy::new();
        for rule in &self.quantization {
            policy = policy.with_rule(QuantRule {
                op: parse_kind(&rule.op)?,
                input: rule.input,
                output: rule.output,
            });
        }
        Ok(policy)
    }

    /// Checks every name and value without building anything heavy.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.method.is_empty() {
            return Err(RuntimeError::ConfigError("method name must not be empty".into()));
        }
        if self.file_stem.is_empty() {
            return Err(RuntimeError::ConfigError("file stem must not be empty".into()));
        }
        self.pipeline_variant()?;
        self.create_backends()?;
        self.create_dialect()?;
        self.policy()?;
        self.tolerance.validate()
    }
}

fn parse_kind(name: &str) -> Result<OpKind, RuntimeError> {
    OpRegistry::standard()
        .parse(name)
        .map(|id| id.kind)
        .ok_or_else(|| RuntimeError::ConfigError(format!("unknown operator '{name}'")))
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            pipeline: default_pipeline(),
            backends: default_backends(),
            fuse_quantized: true,
            output_dir: default_output_dir(),
            file_stem: default_stem(),
            dialect: DialectConfig::default(),
            quantization: Vec::new(),
            tolerance: ToleranceConfig::default(),
        }
    }
}
