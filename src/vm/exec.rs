use std::io::Write;
use std::ops;
use std::rc::Rc;

use log::debug;
use log::log_enabled;
use log::trace;
use log::Level;

use super::Vm;
use crate::error::RuntimeError;
use crate::error::RuntimeErrorKind;
use crate::Chunk;
use crate::OpCode;
use crate::Result;
use crate::Value;

type Step<T = ()> = std::result::Result<T, RuntimeErrorKind>;

/// The chunk being executed and the position within it. There are no
/// function calls, so this is the only frame.
pub(super) struct Frame<'c> {
    chunk: &'c Chunk,
    /// The index of the next (not current) byte.
    ip: usize,
}

impl<'c> Frame<'c> {
    pub(super) fn new(chunk: &'c Chunk) -> Self {
        Frame { chunk, ip: 0 }
    }

    fn read_byte(&mut self) -> Step<u8> {
        let b = *self
            .chunk
            .code
            .get(self.ip)
            .ok_or(RuntimeErrorKind::TruncatedInstruction)?;
        self.ip += 1;
        Ok(b)
    }

    fn read_u16(&mut self) -> Step<usize> {
        let hi = self.read_byte()?;
        let lo = self.read_byte()?;
        Ok(u16::from_be_bytes([hi, lo]) as usize)
    }

    fn read_constant(&mut self) -> Step<Value> {
        let i = self.read_byte()?;
        self.chunk
            .constants
            .get(i as usize)
            .cloned()
            .ok_or(RuntimeErrorKind::InvalidConstant(i))
    }

    /// Reads a constant which names a global variable.
    fn read_name(&mut self) -> Step<Rc<str>> {
        match self.read_constant()? {
            Value::String(s) => Ok(s),
            other => Ok(Rc::from(other.to_string())),
        }
    }

    /// Attributes an error to the instruction just read.
    fn error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        let line = match self.ip.checked_sub(1) {
            Some(i) => self.chunk.lines.get(i).copied().unwrap_or_default(),
            None => 0,
        };
        debug!("runtime error at line {}: {}", line, kind);
        RuntimeError { kind, line }
    }

    /// Start evaluating instructions from the current position, until a
    /// `Return` or the end of the code.
    pub(super) fn eval<W: Write>(&mut self, vm: &mut Vm<W>) -> Result<()> {
        while self.ip < self.chunk.code.len() {
            if log_enabled!(Level::Trace) {
                trace!("          {}", vm.stack_listing());
                trace!("{}", self.chunk.disassemble_instruction(self.ip).0);
            }

            let byte = self.read_byte().map_err(|kind| self.error(kind))?;
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(b) => return Err(self.error(RuntimeErrorKind::InvalidOpcode(b)).into()),
            };

            match op {
                OpCode::Return => return Ok(()),
                OpCode::Print => {
                    let value = vm.pop().map_err(|kind| self.error(kind))?;
                    writeln!(vm.out, "{}", value)?;
                }
                _ => self.step(vm, op).map_err(|kind| self.error(kind))?,
            }
        }
        Ok(())
    }

    /// Executes one instruction other than `Print` and `Return`.
    fn step<W: Write>(&mut self, vm: &mut Vm<W>, op: OpCode) -> Step {
        match op {
            // Literals
            OpCode::Constant => {
                let value = self.read_constant()?;
                vm.push(value)
            }
            OpCode::Nil => vm.push(Value::Nil),
            OpCode::True => vm.push(Value::Bool(true)),
            OpCode::False => vm.push(Value::Bool(false)),
            OpCode::Pop => vm.pop().map(drop),

            // Variables
            OpCode::GetLocal => {
                let slot = self.read_byte()?;
                vm.instr_get_local(slot)
            }
            OpCode::SetLocal => {
                let slot = self.read_byte()?;
                vm.instr_set_local(slot)
            }
            OpCode::GetGlobal => {
                let name = self.read_name()?;
                vm.instr_get_global(name)
            }
            OpCode::DefineGlobal => {
                let name = self.read_name()?;
                vm.instr_define_global(name)
            }
            OpCode::SetGlobal => {
                let name = self.read_name()?;
                vm.instr_set_global(name)
            }

            // Comparison
            OpCode::Equal => {
                let b = vm.pop()?;
                let a = vm.pop()?;
                vm.push(Value::Bool(a == b))
            }
            OpCode::Greater => vm.eval_float_bool(<f64 as PartialOrd>::gt),
            OpCode::Less => vm.eval_float_bool(<f64 as PartialOrd>::lt),

            // Arithmetic
            OpCode::Add => vm.instr_add(),
            OpCode::Subtract => vm.eval_float_float(<f64 as ops::Sub>::sub),
            OpCode::Multiply => vm.eval_float_float(<f64 as ops::Mul>::mul),
            OpCode::Divide => vm.eval_float_float(<f64 as ops::Div>::div),

            // Unary
            OpCode::Not => {
                let value = vm.pop()?;
                vm.push(Value::Bool(value.is_falsey()))
            }
            OpCode::Negate => vm.instr_negate(),

            // Control flow
            OpCode::Jump => {
                let offset = self.read_u16()?;
                self.ip += offset;
                Ok(())
            }
            OpCode::JumpIfFalse => {
                let offset = self.read_u16()?;
                if vm.peek(0)?.is_falsey() {
                    self.ip += offset;
                }
                Ok(())
            }
            OpCode::Loop => {
                let offset = self.read_u16()?;
                self.ip = self
                    .ip
                    .checked_sub(offset)
                    .ok_or(RuntimeErrorKind::InvalidJump)?;
                Ok(())
            }

            OpCode::Print | OpCode::Return => Ok(()),
        }
    }
}

// Instruction-specific methods
impl<W: Write> Vm<W> {
    fn instr_get_local(&mut self, slot: u8) -> Step {
        let value = self.stack[slot as usize].clone();
        self.push(value)
    }

    /// Assignment is an expression, so the value stays on the stack.
    fn instr_set_local(&mut self, slot: u8) -> Step {
        self.stack[slot as usize] = self.peek(0)?.clone();
        Ok(())
    }

    fn instr_get_global(&mut self, name: Rc<str>) -> Step {
        match self.globals.get(&name) {
            Some(value) => {
                let value = value.clone();
                self.push(value)
            }
            None => Err(RuntimeErrorKind::UndefinedVariable(name.to_string())),
        }
    }

    /// Defining a global always succeeds, replacing any previous definition.
    fn instr_define_global(&mut self, name: Rc<str>) -> Step {
        let value = self.pop()?;
        self.globals.insert(name, value);
        Ok(())
    }

    fn instr_set_global(&mut self, name: Rc<str>) -> Step {
        let value = self.peek(0)?.clone();
        match self.globals.get_mut(&name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeErrorKind::UndefinedVariable(name.to_string())),
        }
    }

    /// Adds two numbers or concatenates two strings.
    fn instr_add(&mut self) -> Step {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            (Value::String(x), Value::String(y)) => {
                let mut s = String::with_capacity(x.len() + y.len());
                s.push_str(x);
                s.push_str(y);
                Value::from(s)
            }
            _ => return Err(RuntimeErrorKind::OperandsMustBeNumbersOrStrings),
        };
        self.push(result)
    }

    fn instr_negate(&mut self) -> Step {
        match self.pop()? {
            Value::Number(n) => self.push(Value::Number(-n)),
            _ => Err(RuntimeErrorKind::OperandMustBeNumber),
        }
    }

    // Helper methods

    /// Pops the right operand, then the left, and pushes `f(left, right)`.
    fn binary_op(&mut self, f: impl Fn(f64, f64) -> Value) -> Step {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::Number(a), Value::Number(b)) => self.push(f(a, b)),
            _ => Err(RuntimeErrorKind::OperandsMustBeNumbers),
        }
    }

    fn eval_float_bool(&mut self, f: impl Fn(&f64, &f64) -> bool) -> Step {
        self.binary_op(|a, b| Value::Bool(f(&a, &b)))
    }

    fn eval_float_float(&mut self, f: impl Fn(f64, f64) -> f64) -> Step {
        self.binary_op(|a, b| Value::Number(f(a, b)))
    }
}
