//! Human-readable listings of compiled chunks.

use std::fmt::Write;

use crate::Chunk;
use crate::OpCode;

impl Chunk {
    /// Renders every instruction in the chunk under a `== name ==` header.
    pub fn disassemble(&self, name: &str) -> String {
        let mut out = format!("== {} ==\n", name);
        let mut offset = 0;
        while offset < self.code.len() {
            let (line, next) = self.disassemble_instruction(offset);
            out.push_str(&line);
            out.push('\n');
            offset = next;
        }
        out
    }

    /// Renders the instruction at `offset`. Returns the text and the offset
    /// of the following instruction.
    pub fn disassemble_instruction(&self, offset: usize) -> (String, usize) {
        let mut out = format!("{:04} ", offset);
        match self.lines.get(offset) {
            Some(line) if offset > 0 && self.lines.get(offset - 1) == Some(line) => {
                out.push_str("   | ");
            }
            Some(line) => {
                let _ = write!(out, "{:4} ", line);
            }
            None => out.push_str("   ? "),
        }

        let op = match self.op_at(offset) {
            Some(op) => op,
            None => {
                let _ = write!(out, "Unknown opcode {}", self.code[offset]);
                return (out, offset + 1);
            }
        };
        let next = offset + 1 + op.operand_len();
        if next > self.code.len() {
            let _ = write!(out, "{} <truncated>", op.name());
            return (out, self.code.len());
        }

        match op {
            OpCode::Constant | OpCode::GetGlobal | OpCode::DefineGlobal | OpCode::SetGlobal => {
                let i = self.code[offset + 1];
                let _ = write!(out, "{:<16} {:4} '", op.name(), i);
                match self.constants.get(i as usize) {
                    Some(value) => {
                        let _ = write!(out, "{}'", value);
                    }
                    None => out.push_str("<missing>'"),
                }
            }
            OpCode::GetLocal | OpCode::SetLocal => {
                let slot = self.code[offset + 1];
                let _ = write!(out, "{:<16} {:4}", op.name(), slot);
            }
            OpCode::Jump | OpCode::JumpIfFalse | OpCode::Loop => {
                let jump = self.read_u16(offset + 1) as usize;
                let target = if op == OpCode::Loop {
                    next.wrapping_sub(jump) as isize
                } else {
                    (next + jump) as isize
                };
                let _ = write!(out, "{:<16} {:4} -> {}", op.name(), offset, target);
            }
            _ => out.push_str(op.name()),
        }
        (out, next)
    }
}
