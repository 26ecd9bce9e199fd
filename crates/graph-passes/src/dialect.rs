// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Target dialects for the lowering pass.

use graph_ir::{AttrValue, Attrs, OpId, OpKind};
use std::collections::BTreeSet;

/// A target operator set.
///
/// `legalize` returns the identifier (and possibly rewritten attributes)
/// an operator takes in this dialect, or `None` when the dialect cannot
/// express it.
pub trait TargetDialect: Send + Sync {
    fn name(&self) -> &str;

    fn legalize(&self, op: OpId, attrs: &Attrs) -> Option<(OpId, Attrs)>;
}

/// The `edge` dialect, optionally restricted to a subset of kinds.
///
/// A restricted dialect without `relu` but with `clamp` expresses relu as
/// `clamp(min = 0)`.
#[derive(Debug, Clone)]
pub struct EdgeDialect {
    name: String,
    supported: Option<BTreeSet<OpKind>>,
}

impl EdgeDialect {
    /// Every operator kind except delegate calls.
    pub fn portable() -> Self {
        Self {
            name: "edge".into(),
            supported: None,
        }
    }

    /// Only the listed kinds.
    pub fn restricted(name: impl Into<String>, kinds: impl IntoIterator<Item = OpKind>) -> Self {
        Self {
            name: name.into(),
            supported: Some(kinds.into_iter().collect()),
        }
    }

    pub fn supports(&self, kind: OpKind) -> bool {
        kind != OpKind::CallDelegate
            && self.supported.as_ref().map_or(true, |s| s.contains(&kind))
    }
}

impl Default for EdgeDialect {
    fn default() -> Self {
        Self::portable()
    }
}

impl TargetDialect for EdgeDialect {
    fn name(&self) -> &str {
        &self.name
    }

    fn legalize(&self, op: OpId, attrs: &Attrs) -> Option<(OpId, Attrs)> {
        if self.supports(op.kind) {
            return Some((op.to_edge(), attrs.clone()));
        }
        if op.kind == OpKind::Relu && self.supports(OpKind::Clamp) {
            let mut attrs = attrs.clone();
            attrs.insert("min".into(), AttrValue::Float(0.0));
            return Some((OpKind::Clamp.native_id().to_edge(), attrs));
        }
        None
    }
}
