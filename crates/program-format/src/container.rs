// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Binary container encoding.
//!
//! All integers are little-endian. Strings are a `u32` byte length
//! followed by UTF-8 bytes.
//!
//! ```text
//! header    magic[8] version:u32 flags:u32
//! (a)       method_count:u32
//!           { name offset:u64 length:u64 } * method_count
//!           blob_length:u64 blob[blob_length]         bincode(Method) per entry
//! (b)       constant_count:u32
//!           { name dtype:u32 rank:u32 dims:u64*rank byte_length:u64 bytes }
//! (c)       case_length:u64 bincode(Vec<TestCase>)    only when flags & 1
//! ```
//!
//! Readers reject unknown versions and flags, truncated sections and
//! trailing bytes. Decoded methods are checked before anything sizes a
//! buffer from them: slots are numbered densely in definition order and
//! kernel result types must agree with shape inference.

use crate::{Bundle, ExecutableProgram, Instruction, Method, Operand, ProgramError, TestCase, FORMAT_VERSION};
use graph_ir::{infer_outputs, TensorType};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::Path;
use tensor_core::{DType, Shape, Tensor};

const MAGIC: &[u8; 8] = b"AOTPROG\0";
const FLAG_TEST_CASES: u32 = 1;

/// A decoded container file of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Program(ExecutableProgram),
    Bundle(Bundle),
}

impl Artifact {
    pub fn program(&self) -> &ExecutableProgram {
        match self {
            Self::Program(p) => p,
            Self::Bundle(b) => b.program(),
        }
    }

    /// Returns a human-readable listing.
    pub fn summary(&self) -> String {
        match self {
            Self::Program(p) => p.summary(),
            Self::Bundle(b) => b.summary(),
        }
    }
}

// ── Writing ─────────────────────────────────────────────────────────

/// Encodes sections (a) and (b).
pub fn encode_program(program: &ExecutableProgram) -> Result<Vec<u8>, ProgramError> {
    let mut out = header(0);
    write_program_sections(&mut out, program)?;
    Ok(out)
}

/// Encodes sections (a), (b) and (c).
pub fn encode_bundle(bundle: &Bundle) -> Result<Vec<u8>, ProgramError> {
    let mut out = header(FLAG_TEST_CASES);
    write_program_sections(&mut out, bundle.program())?;
    let cases = bincode::serialize(bundle.test_cases())?;
    write_u64(&mut out, cases.len() as u64);
    out.extend_from_slice(&cases);
    Ok(out)
}

fn header(flags: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u32(&mut out, FORMAT_VERSION);
    write_u32(&mut out, flags);
    out
}

fn write_program_sections(out: &mut Vec<u8>, program: &ExecutableProgram) -> Result<(), ProgramError> {
    // (a) method table + blob area
    let mut blob = Vec::new();
    write_u32(out, len_u32(program.methods().len())?);
    for method in program.methods() {
        let encoded = bincode::serialize(method)?;
        write_str(out, &method.name)?;
        write_u64(out, blob.len() as u64);
        write_u64(out, encoded.len() as u64);
        blob.extend_from_slice(&encoded);
    }
    write_u64(out, blob.len() as u64);
    out.extend_from_slice(&blob);

    // (b) constant table
    write_u32(out, len_u32(program.constants().len())?);
    for (name, tensor) in program.constants() {
        write_str(out, name)?;
        write_u32(out, tensor.dtype().tag());
        let dims = tensor.shape().dims();
        write_u32(out, len_u32(dims.len())?);
        for &d in dims {
            write_u64(out, d as u64);
        }
        write_u64(out, tensor.size_bytes() as u64);
        out.extend_from_slice(tensor.as_bytes());
    }
    Ok(())
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) -> Result<(), ProgramError> {
    write_u32(out, len_u32(s.len())?);
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

fn len_u32(len: usize) -> Result<u32, ProgramError> {
    u32::try_from(len).map_err(|_| ProgramError::Malformed(format!("length {len} exceeds u32")))
}

// ── Reading ─────────────────────────────────────────────────────────

/// Decodes either kind of file.
pub fn decode(bytes: &[u8]) -> Result<Artifact, ProgramError> {
    let mut r = Reader::new(bytes);
    let mut magic = [0u8; 8];
    r.fill(&mut magic, "header")?;
    if &magic != MAGIC {
        return Err(ProgramError::Malformed("invalid magic header".into()));
    }
    let version = r.u32("header")?;
    if version != FORMAT_VERSION {
        return Err(ProgramError::UnsupportedVersion(version));
    }
    let flags = r.u32("header")?;
    if flags & !FLAG_TEST_CASES != 0 {
        return Err(ProgramError::Malformed(format!("unknown flags 0x{flags:08x}")));
    }

    let program = read_program_sections(&mut r)?;
    let artifact = if flags & FLAG_TEST_CASES != 0 {
        let len = r.u64("test cases")?;
        let cases: Vec<TestCase> = bincode::deserialize(r.take(len, "test cases")?)?;
        Artifact::Bundle(Bundle {
            version,
            program,
            test_cases: cases,
        })
    } else {
        Artifact::Program(program)
    };
    r.finish()?;
    Ok(artifact)
}

/// Decodes a program. Bundle files are accepted; their test cases are
/// dropped.
pub fn decode_program(bytes: &[u8]) -> Result<ExecutableProgram, ProgramError> {
    Ok(match decode(bytes)? {
        Artifact::Program(p) => p,
        Artifact::Bundle(b) => b.program,
    })
}

/// Decodes a bundle; program-only files are rejected.
pub fn decode_bundle(bytes: &[u8]) -> Result<Bundle, ProgramError> {
    match decode(bytes)? {
        Artifact::Bundle(b) => Ok(b),
        Artifact::Program(_) => Err(ProgramError::Malformed("file has no test-case section".into())),
    }
}

fn read_program_sections(r: &mut Reader<'_>) -> Result<ExecutableProgram, ProgramError> {
    let count = r.u32("method table")?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let name = r.string("method table")?;
        let offset = r.u64("method table")?;
        let length = r.u64("method table")?;
        entries.push((name, offset, length));
    }
    let blob_len = r.u64("method blobs")?;
    let blob = r.take(blob_len, "method blobs")?;

    let mut methods = Vec::with_capacity(entries.len());
    for (name, offset, length) in entries {
        let slice = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(length).ok())
            .and_then(|(o, l)| blob.get(o..o.checked_add(l)?))
            .ok_or_else(|| ProgramError::Malformed(format!("method '{name}' lies outside the blob area")))?;
        let method: Method = bincode::deserialize(slice)?;
        if method.name != name {
            return Err(ProgramError::Malformed(format!(
                "method table names '{name}' but entry holds '{}'",
                method.name
            )));
        }
        methods.push(method);
    }

    let count = r.u32("constant table")?;
    let mut constants = BTreeMap::new();
    for _ in 0..count {
        let name = r.string("constant table")?;
        let tag = r.u32("constant table")?;
        let dtype = DType::from_tag(tag)
            .ok_or_else(|| ProgramError::Malformed(format!("unknown dtype tag {tag} for constant '{name}'")))?;
        let rank = r.u32("constant table")?;
        let mut dims = Vec::new();
        for _ in 0..rank {
            let d = r.u64("constant table")?;
            dims.push(
                usize::try_from(d).map_err(|_| ProgramError::Malformed(format!("constant '{name}' dim overflow")))?,
            );
        }
        let shape = Shape::new(dims);
        let len = r.u64("constant table")?;
        let expected = shape
            .checked_size_bytes(dtype)
            .ok_or_else(|| ProgramError::Malformed(format!("constant '{name}' shape {shape} is too large")))?;
        if len != expected as u64 {
            return Err(ProgramError::Malformed(format!(
                "constant '{name}' holds {len} byte(s), shape {shape} of {dtype} needs {expected}"
            )));
        }
        let data = r.take(len, "constant table")?.to_vec();
        let tensor = Tensor::from_bytes(shape, dtype, data)
            .map_err(|e| ProgramError::Malformed(format!("constant '{name}': {e}")))?;
        constants.insert(name, tensor);
    }

    for method in &methods {
        check_method(method, &constants)?;
    }
    Ok(ExecutableProgram::from_parts(methods, constants))
}

/// Rejects a method whose slot layout or types could not come from
/// [`crate::ProgramBuilder`].
fn check_method(method: &Method, constants: &BTreeMap<String, Tensor>) -> Result<(), ProgramError> {
    let malformed = |detail: String| ProgramError::Malformed(format!("method '{}': {detail}", method.name));
    let addressable = |ty: &TensorType| ty.shape.checked_size_bytes(ty.dtype).is_some();

    // Type of every slot defined so far.
    let mut slots: Vec<TensorType> = method.inputs.clone();
    if let Some(ty) = slots.iter().find(|ty| !addressable(ty)) {
        return Err(malformed(format!("input type {ty} is too large")));
    }
    let operand_type = |slots: &[TensorType], operand: &Operand| match operand {
        Operand::Slot(s) => slots.get(*s).cloned(),
        Operand::Const(name) => constants.get(name).map(TensorType::of),
    };

    for instr in &method.instructions {
        let args = instr
            .args()
            .iter()
            .map(|a| {
                operand_type(&slots, a)
                    .ok_or_else(|| malformed(format!("operand {a} of '{}' is not defined yet", instr.name())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let result_types = instr.result_types();
        if instr.results().len() != result_types.len() {
            return Err(malformed(format!("'{}' has mismatched result slots and types", instr.name())));
        }
        if let Instruction::Kernel { name, op, attrs, .. } = instr {
            let inferred = infer_outputs(name, *op, attrs, &args).map_err(|e| malformed(e.to_string()))?;
            let agrees = inferred.len() == result_types.len()
                && inferred
                    .iter()
                    .zip(result_types)
                    .all(|(a, b)| a.dtype == b.dtype && a.shape == b.shape);
            if !agrees {
                return Err(malformed(format!("result types of '{name}' disagree with inference")));
            }
        }
        for (&slot, ty) in instr.results().iter().zip(result_types) {
            if slot != slots.len() {
                return Err(malformed(format!("'{}' writes slot {slot}, expected {}", instr.name(), slots.len())));
            }
            if !addressable(ty) {
                return Err(malformed(format!("result type {ty} of '{}' is too large", instr.name())));
            }
            slots.push(ty.clone());
        }
    }

    if method.num_slots != slots.len() {
        return Err(malformed(format!("declares {} slots but defines {}", method.num_slots, slots.len())));
    }
    if method.outputs.len() != method.output_types.len() {
        return Err(malformed("output count disagrees with output types".into()));
    }
    for (operand, ty) in method.outputs.iter().zip(&method.output_types) {
        let actual = operand_type(&slots, operand).ok_or_else(|| malformed(format!("output {operand} is undefined")))?;
        if actual.dtype != ty.dtype || actual.shape != ty.shape {
            return Err(malformed(format!("output {operand} is {actual}, declared {ty}")));
        }
    }
    Ok(())
}

/// Bounds-checked cursor over the file bytes.
struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    fn remaining(&self) -> u64 {
        self.cursor.get_ref().len() as u64 - self.cursor.position()
    }

    fn truncated(section: &str) -> ProgramError {
        ProgramError::Malformed(format!("truncated {section}"))
    }

    fn fill(&mut self, buf: &mut [u8], section: &str) -> Result<(), ProgramError> {
        self.cursor.read_exact(buf).map_err(|_| Self::truncated(section))
    }

    fn u32(&mut self, section: &str) -> Result<u32, ProgramError> {
        let mut b = [0u8; 4];
        self.fill(&mut b, section)?;
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self, section: &str) -> Result<u64, ProgramError> {
        let mut b = [0u8; 8];
        self.fill(&mut b, section)?;
        Ok(u64::from_le_bytes(b))
    }

    /// Borrows the next `len` bytes without copying.
    fn take(&mut self, len: u64, section: &str) -> Result<&'a [u8], ProgramError> {
        if len > self.remaining() {
            return Err(Self::truncated(section));
        }
        let start = self.cursor.position() as usize;
        let end = start + len as usize;
        self.cursor.set_position(end as u64);
        let bytes: &'a [u8] = *self.cursor.get_ref();
        Ok(&bytes[start..end])
    }

    fn string(&mut self, section: &str) -> Result<String, ProgramError> {
        let len = self.u32(section)?;
        let bytes = self.take(len as u64, section)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProgramError::Malformed(format!("invalid UTF-8 in {section}")))
    }

    fn finish(self) -> Result<(), ProgramError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(ProgramError::Malformed(format!("{n} trailing byte(s)"))),
        }
    }
}

// ── Files ───────────────────────────────────────────────────────────

impl ExecutableProgram {
    /// Writes the program file (sections a + b).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        std::fs::write(path.as_ref(), encode_program(self)?)?;
        tracing::info!("wrote program to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        decode_program(&std::fs::read(path)?)
    }
}

impl Bundle {
    /// Writes the bundled file (sections a + b + c).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProgramError> {
        std::fs::write(path.as_ref(), encode_bundle(self)?)?;
        tracing::info!("wrote bundle to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        decode_bundle(&std::fs::read(path)?)
    }
}

impl Artifact {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        decode(&std::fs::read(path)?)
    }
}
