// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator identifiers and the operator registry.
//!
//! Operators form a closed set ([`OpKind`]). An [`OpId`] pairs a kind with
//! the [`Namespace`] it currently lives in: captured graphs use the native
//! namespace (`aten`, `quantized_decomposed`), fusion produces `fused` ops,
//! and target lowering moves ops into `edge`. Semantics depend only on the
//! kind, so interpretation is namespace-agnostic.

use std::collections::HashMap;
use std::fmt;

/// The namespace part of an operator identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Operators as captured from the model description.
    Aten,
    /// Explicit quantize / dequantize boundaries.
    QuantizedDecomposed,
    /// Fused low-precision kernels produced by the fusion pass.
    Fused,
    /// The lowered target dialect.
    Edge,
    /// Control operators (delegate calls).
    HigherOrder,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aten => "aten",
            Self::QuantizedDecomposed => "quantized_decomposed",
            Self::Fused => "fused",
            Self::Edge => "edge",
            Self::HigherOrder => "higher_order",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "aten" => Some(Self::Aten),
            "quantized_decomposed" => Some(Self::QuantizedDecomposed),
            "fused" => Some(Self::Fused),
            "edge" => Some(Self::Edge),
            "higher_order" => Some(Self::HigherOrder),
            _ => None,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of operators the pipeline understands.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Abs,
    Neg,
    Sqrt,
    Log1p,
    Exp,
    Relu,
    Tanh,
    Gelu,
    Clamp,
    Add,
    Sub,
    Mul,
    Div,
    MatMul,
    Softmax,
    QuantizePerTensor,
    DequantizePerTensor,
    QuantizedAdd,
    QuantizedMul,
    QuantizedRelu,
    QuantizedMatMul,
    CallDelegate,
}

/// Coarse operator classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum OpCategory {
    /// One input, element-wise.
    Elementwise,
    /// Two inputs with numpy broadcasting.
    Binary,
    /// Matrix multiplication.
    Linear,
    /// Reductions along an axis.
    Reduction,
    /// Quantize / dequantize boundaries.
    Quantization,
    /// Fused low-precision kernels.
    Fused,
    /// Delegate invocation.
    Control,
}

/// Registry metadata for one [`OpKind`].
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub kind: OpKind,
    /// Canonical name, unique across kinds.
    pub name: &'static str,
    /// Namespace the op is captured in.
    pub native: Namespace,
    /// Number of tensor inputs; `None` for variadic.
    pub arity: Option<usize>,
    pub category: OpCategory,
    /// Fused low-precision counterpart, if one exists.
    pub fused: Option<OpKind>,
}

const fn info(
    kind: OpKind,
    name: &'static str,
    native: Namespace,
    arity: Option<usize>,
    category: OpCategory,
    fused: Option<OpKind>,
) -> OpInfo {
    OpInfo {
        kind,
        name,
        native,
        arity,
        category,
        fused,
    }
}

use Namespace as N;
use OpCategory as C;

const OP_TABLE: &[OpInfo] = &[
    info(OpKind::Abs, "abs", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Neg, "neg", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Sqrt, "sqrt", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Log1p, "log1p", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Exp, "exp", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Relu, "relu", N::Aten, Some(1), C::Elementwise, Some(OpKind::QuantizedRelu)),
    info(OpKind::Tanh, "tanh", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Gelu, "gelu", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Clamp, "clamp", N::Aten, Some(1), C::Elementwise, None),
    info(OpKind::Add, "add", N::Aten, Some(2), C::Binary, Some(OpKind::QuantizedAdd)),
    info(OpKind::Sub, "sub", N::Aten, Some(2), C::Binary, None),
    info(OpKind::Mul, "mul", N::Aten, Some(2), C::Binary, Some(OpKind::QuantizedMul)),
    info(OpKind::Div, "div", N::Aten, Some(2), C::Binary, None),
    info(OpKind::MatMul, "mm", N::Aten, Some(2), C::Linear, Some(OpKind::QuantizedMatMul)),
    info(OpKind::Softmax, "softmax", N::Aten, Some(1), C::Reduction, None),
    info(OpKind::QuantizePerTensor, "quantize_per_tensor", N::QuantizedDecomposed, Some(1), C::Quantization, None),
    info(OpKind::DequantizePerTensor, "dequantize_per_tensor", N::QuantizedDecomposed, Some(1), C::Quantization, None),
    info(OpKind::QuantizedAdd, "quantized_add", N::Fused, Some(2), C::Fused, None),
    info(OpKind::QuantizedMul, "quantized_mul", N::Fused, Some(2), C::Fused, None),
    info(OpKind::QuantizedRelu, "quantized_relu", N::Fused, Some(1), C::Fused, None),
    info(OpKind::QuantizedMatMul, "quantized_mm", N::Fused, Some(2), C::Fused, None),
    info(OpKind::CallDelegate, "call_delegate", N::HigherOrder, None, C::Control, None),
];

impl OpKind {
    /// Every operator kind, in registry order.
    pub fn all() -> impl Iterator<Item = OpKind> {
        OP_TABLE.iter().map(|i| i.kind)
    }

    /// Registry metadata for this kind.
    pub fn info(self) -> &'static OpInfo {
        // The table is declared in enum order.
        &OP_TABLE[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// The identifier this kind is captured with.
    pub fn native_id(self) -> OpId {
        OpId::new(self.info().native, self)
    }

    /// The unfused kind a fused kernel computes, if this is a fused kind.
    pub fn unfused(self) -> Option<OpKind> {
        OP_TABLE
            .iter()
            .find(|i| i.fused == Some(self))
            .map(|i| i.kind)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A namespaced operator identifier, e.g. `aten::sqrt`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct OpId {
    pub namespace: Namespace,
    pub kind: OpKind,
}

impl OpId {
    /// The reserved delegate-call identifier.
    pub const CALL_DELEGATE: OpId = OpId {
        namespace: Namespace::HigherOrder,
        kind: OpKind::CallDelegate,
    };

    pub const fn new(namespace: Namespace, kind: OpKind) -> Self {
        Self { namespace, kind }
    }

    /// The same operator moved into the `edge` dialect namespace.
    pub fn to_edge(self) -> Self {
        if self.kind == OpKind::CallDelegate {
            self
        } else {
            Self::new(Namespace::Edge, self.kind)
        }
    }

    /// Whether `namespace` is a legal home for `kind`.
    pub fn is_valid(self) -> bool {
        match self.namespace {
            Namespace::Edge => self.kind != OpKind::CallDelegate,
            ns => ns == self.kind.info().native,
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.namespace, self.kind.name())
    }
}

/// Maps textual operator identifiers to [`OpId`]s.
///
/// Accepted spellings, all case-sensitive:
/// - `aten::sqrt`, `edge::sqrt`
/// - `aten.sqrt.default`, `torch.ops.aten.sqrt.default`
/// - bare `sqrt`, which resolves to the native namespace
///
/// A handful of aliases (`matmul`, `quantize`, `dequantize`) are accepted
/// for bare names.
#[derive(Debug, Clone)]
pub struct OpRegistry {
    by_name: HashMap<&'static str, OpKind>,
}

impl Default for OpRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl OpRegistry {
    /// Builds the registry of every known operator.
    pub fn standard() -> Self {
        let mut by_name: HashMap<&'static str, OpKind> =
            OP_TABLE.iter().map(|i| (i.name, i.kind)).collect();
        by_name.insert("matmul", OpKind::MatMul);
        by_name.insert("quantize", OpKind::QuantizePerTensor);
        by_name.insert("dequantize", OpKind::DequantizePerTensor);
        by_name.insert("executorch_call_delegate", OpKind::CallDelegate);
        Self { by_name }
    }

    /// Looks up a kind by its (unqualified) name.
    pub fn kind(&self, name: &str) -> Option<OpKind> {
        self.by_name.get(name).copied()
    }

    /// Parses a textual identifier.
    pub fn parse(&self, text: &str) -> Option<OpId> {
        let text = text.trim();
        let text = text.strip_prefix("torch.ops.").unwrap_or(text);
        let text = text.strip_suffix(".default").unwrap_or(text);

        let (ns, name) = match text.split_once("::").or_else(|| text.split_once('.')) {
            Some((ns, name)) => (Some(Namespace::parse(ns)?), name),
            None => (None, text),
        };
        let kind = self.kind(name)?;
        let id = OpId::new(ns.unwrap_or(kind.info().native), kind);
        id.is_valid().then_some(id)
    }

    /// Number of registered operator kinds.
    pub fn len(&self) -> usize {
        OP_TABLE.len()
    }

    pub fn is_empty(&self) -> bool {
        OP_TABLE.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_in_enum_order() {
        for (i, info) in OP_TABLE.iter().enumerate() {
            assert_eq!(info.kind as usize, i, "{} out of order", info.name);
        }
    }

    #[test]
    fn test_names_unique() {
        let mut names: Vec<_> = OP_TABLE.iter().map(|i| i.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), OP_TABLE.len());
    }

    #[test]
    fn test_parse_spellings() {
        let r = OpRegistry::standard();
        let sqrt = OpId::new(Namespace::Aten, OpKind::Sqrt);
        assert_eq!(r.parse("aten::sqrt"), Some(sqrt));
        assert_eq!(r.parse("aten.sqrt.default"), Some(sqrt));
        assert_eq!(r.parse("torch.ops.aten.sqrt.default"), Some(sqrt));
        assert_eq!(r.parse("sqrt"), Some(sqrt));
        assert_eq!(r.parse("edge::sqrt"), Some(sqrt.to_edge()));
        assert_eq!(
            r.parse("quantized_decomposed.quantize_per_tensor.default"),
            Some(OpKind::QuantizePerTensor.native_id())
        );
        assert_eq!(r.parse("matmul"), Some(OpKind::MatMul.native_id()));
    }

    #[test]
    fn test_parse_rejects_wrong_namespace() {
        let r = OpRegistry::standard();
        assert_eq!(r.parse("aten::quantize_per_tensor"), None);
        assert_eq!(r.parse("edge::call_delegate"), None);
        assert_eq!(r.parse("nope::sqrt"), None);
        assert_eq!(r.parse("aten::frobnicate"), None);
    }

    #[test]
    fn test_display_round_trips() {
        let r = OpRegistry::standard();
        for kind in OpKind::all() {
            let id = kind.native_id();
            assert_eq!(r.parse(&id.to_string()), Some(id));
        }
    }

    #[test]
    fn test_fused_counterparts() {
        assert_eq!(OpKind::Add.info().fused, Some(OpKind::QuantizedAdd));
        assert_eq!(OpKind::QuantizedMatMul.unfused(), Some(OpKind::MatMul));
        assert_eq!(OpKind::Sqrt.info().fused, None);
        assert_eq!(OpKind::Sqrt.unfused(), None);
    }

    #[test]
    fn test_to_edge_keeps_delegate() {
        assert_eq!(OpId::CALL_DELEGATE.to_edge(), OpId::CALL_DELEGATE);
        assert_eq!(OpKind::Abs.native_id().to_edge().to_string(), "edge::abs");
    }
}
