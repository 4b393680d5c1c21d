//! Functions and types associated with converting source code into bytecode.

mod lexer;
mod parser;
mod token;

use crate::CompileError;
use crate::OpCode;
use crate::Value;

use token::Token;
use token::TokenType;

/// A compiled unit of bytecode. Built incrementally by the parser and treated
/// as read-only once handed to the VM.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Opcodes interleaved with their operand bytes.
    pub code: Vec<u8>,
    /// `lines[i]` is the source line of `code[i]`.
    pub lines: Vec<usize>,
    /// The constant pool, indexed by one-byte operands.
    pub constants: Vec<Value>,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Appends a byte and records the line it came from.
    pub fn write(&mut self, byte: impl Into<u8>, line: usize) {
        self.code.push(byte.into());
        self.lines.push(line);
    }

    /// Returns the index of a constant in the pool, adding it if it is not
    /// already there. Returns `None` if the pool is full.
    pub fn add_constant(&mut self, value: Value) -> Option<u8> {
        match self.constants.iter().position(|c| same_constant(c, &value)) {
            Some(i) => Some(i as u8),
            None => {
                let i = self.constants.len();
                if i == crate::CONSTANTS_MAX {
                    None
                } else {
                    self.constants.push(value);
                    Some(i as u8)
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Reads the opcode at `offset`, if that byte is one.
    pub fn op_at(&self, offset: usize) -> Option<OpCode> {
        self.code.get(offset).and_then(|&b| OpCode::try_from(b).ok())
    }

    /// Reads a big-endian 16-bit operand starting at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        u16::from_be_bytes([self.code[offset], self.code[offset + 1]])
    }
}

/// Constants are shared only when they are the same variant with the same
/// payload. Numbers compare bitwise, so `0` and `-0` stay distinct.
fn same_constant(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

/// Compiles source code into a `Chunk`. On failure, returns every diagnostic
/// reported during the pass; the partially emitted chunk is discarded.
pub fn compile(source: &str) -> Result<Chunk, Vec<CompileError>> {
    parser::parse_str(source)
}
