// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # program-format
//!
//! Turns partitioned graphs into an immutable [`ExecutableProgram`],
//! packages it with golden [`TestCase`]s into a [`Bundle`] and persists
//! both in a versioned binary container.
//!
//! # Container layout
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │ magic "AOTPROG\0" · version u32 · flags u32│  flags bit 0: test cases present
//! ├────────────────────────────────────────────┤
//! │ (a) method table: name → (offset, length)  │
//! │     method blob area                       │
//! ├────────────────────────────────────────────┤
//! │ (b) constant table: name → typed buffer    │
//! ├────────────────────────────────────────────┤
//! │ (c) test cases (bundles only)              │
//! └────────────────────────────────────────────┘
//! ```
//!
//! A program file holds sections (a) and (b); a bundle file adds (c) and
//! is otherwise byte-identical.

mod bundle;
pub mod container;
mod error;
mod execute;
mod program;

pub use bundle::{bundle, Bundle, TestCase, FORMAT_VERSION};
pub use container::Artifact;
pub use error::ProgramError;
pub use execute::execute_method;
pub use program::{build, ExecutableProgram, Instruction, Method, Operand, ProgramBuilder};
