// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The reference runner: replays a bundle's test cases and compares the
//! outputs with their golden values.
//!
//! An element passes when `|actual − expected| ≤ atol + rtol·|expected|`.
//! Equal values (infinities included) always pass and a NaN passes only
//! against a NaN. Failures are collected in the report, never raised.

use crate::ToleranceConfig;
use graph_ir::{DelegateExecutor, TensorType};
use program_format::{execute_method, Bundle};
use std::fmt;
use tensor_core::Tensor;

/// Why a case or output failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// The program could not be run.
    Execution(String),
    /// The method returned a different number of outputs.
    OutputCount { expected: usize, actual: usize },
    /// An output has a different dtype or shape than its golden value.
    TypeMismatch { expected: String, actual: String },
    /// Elements outside tolerance; the worst one is described.
    OutOfTolerance {
        mismatched: usize,
        element: usize,
        actual: f64,
        expected: f64,
        allowed: f64,
    },
}

/// One report entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonFailure {
    pub case: usize,
    /// Output index, or `None` for whole-case failures.
    pub output: Option<usize>,
    pub reason: FailureReason,
}

impl fmt::Display for ComparisonFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.output {
            Some(o) => write!(f, "case {} output {o}: ", self.case)?,
            None => write!(f, "case {}: ", self.case)?,
        }
        match &self.reason {
            FailureReason::Execution(e) => write!(f, "execution failed: {e}"),
            FailureReason::OutputCount { expected, actual } => {
                write!(f, "expected {expected} output(s), got {actual}")
            }
            FailureReason::TypeMismatch { expected, actual } => write!(f, "expected {expected}, got {actual}"),
            FailureReason::OutOfTolerance {
                mismatched,
                element,
                actual,
                expected,
                allowed,
            } => write!(
                f,
                "{mismatched} element(s) out of tolerance; worst at [{element}]: {actual} vs {expected} (allowed ±{allowed})"
            ),
        }
    }
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub index: usize,
    pub method: String,
    pub passed: bool,
    /// Largest finite `|actual − expected|` over all outputs.
    pub max_deviation: f64,
}

/// Outcome of [`run_and_compare`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComparisonReport {
    pub cases: Vec<CaseResult>,
    pub failures: Vec<ComparisonFailure>,
}

impl ComparisonReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|c| c.passed)
    }

    pub fn max_deviation(&self) -> f64 {
        self.cases.iter().map(|c| c.max_deviation).fold(0.0, f64::max)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let passed = self.cases.iter().filter(|c| c.passed).count();
        let mut s = format!(
            "Comparison: {passed}/{} case(s) passed, max deviation {:.3e}",
            self.cases.len(),
            self.max_deviation()
        );
        for failure in &self.failures {
            s.push_str(&format!("\n  ✗ {failure}"));
        }
        s
    }
}

/// Executes every test case of `bundle` and compares outputs.
pub fn run_and_compare(
    bundle: &Bundle,
    tolerance: &ToleranceConfig,
    delegates: &dyn DelegateExecutor,
) -> ComparisonReport {
    let mut report = ComparisonReport::default();
    for (index, case) in bundle.test_cases().iter().enumerate() {
        let mut failures = Vec::new();
        let mut max_deviation = 0.0f64;

        match execute_method(bundle.program(), &case.method, &case.inputs, delegates) {
            Err(e) => failures.push(ComparisonFailure {
                case: index,
                output: None,
                reason: FailureReason::Execution(e.to_string()),
            }),
            Ok(actual) if actual.len() != case.expected_outputs.len() => failures.push(ComparisonFailure {
                case: index,
                output: None,
                reason: FailureReason::OutputCount {
                    expected: case.expected_outputs.len(),
                    actual: actual.len(),
                },
            }),
            Ok(actual) => {
                for (o, (a, e)) in actual.iter().zip(&case.expected_outputs).enumerate() {
                    let (atol, rtol) = tolerance.for_output(o);
                    match compare(a, e, atol, rtol) {
                        Ok(dev) => max_deviation = max_deviation.max(dev),
                        Err((dev, reason)) => {
                            max_deviation = max_deviation.max(dev);
                            failures.push(ComparisonFailure {
                                case: index,
                                output: Some(o),
                                reason,
                            });
                        }
                    }
                }
            }
        }

        let passed = failures.is_empty();
        tracing::debug!(
            "case {index} ('{}'): {} (max deviation {max_deviation:.3e})",
            case.method,
            if passed { "pass" } else { "FAIL" }
        );
        report.cases.push(CaseResult {
            index,
            method: case.method.clone(),
            passed,
            max_deviation,
        });
        report.failures.extend(failures);
    }
    report
}

/// Returns the largest finite deviation, or the failure with it.
fn compare(actual: &Tensor, expected: &Tensor, atol: f64, rtol: f64) -> Result<f64, (f64, FailureReason)> {
    if actual.dtype() != expected.dtype() || actual.shape() != expected.shape() {
        let describe = |t: &Tensor| TensorType::of(t).to_string();
        return Err((
            0.0,
            FailureReason::TypeMismatch {
                expected: describe(expected),
                actual: describe(actual),
            },
        ));
    }

    let mut max_dev = 0.0f64;
    let mut mismatched = 0usize;
    let mut worst: Option<(usize, f64, f64, f64, f64)> = None;
    for (i, (a, e)) in actual.to_f64_vec().into_iter().zip(expected.to_f64_vec()).enumerate() {
        if a == e || (a.is_nan() && e.is_nan()) {
            continue;
        }
        let dev = (a - e).abs();
        let allowed = atol + rtol * e.abs();
        if dev.is_finite() {
            max_dev = max_dev.max(dev);
        }
        // NaN deviations fail this test too.
        if !(dev <= allowed) {
            mismatched += 1;
            let excess = if dev.is_nan() { f64::INFINITY } else { dev - allowed };
            if worst.map_or(true, |w| excess > w.4) {
                worst = Some((i, a, e, allowed, excess));
            }
        }
    }

    match worst {
        None => Ok(max_dev),
        Some((element, actual, expected, allowed, _)) => Err((
            max_dev,
            FailureReason::OutOfTolerance {
                mismatched,
                element,
                actual,
                expected,
                allowed,
            },
        )),
    }
}
