//! An interpreter for a small dynamically typed scripting language.
//!
//! Source code is compiled in a single pass into a [`Chunk`] of bytecode,
//! which a stack-based [`Vm`] then executes. Values are numbers, booleans,
//! strings, and `nil`; the language has global and block-scoped local
//! variables, `print`, `if`, `while`, and `for`.
//!
//! ```
//! let mut vm = lox::Vm::with_output(Vec::new());
//! vm.interpret("var a = 1; print a + 2;").unwrap();
//! assert_eq!(vm.output(), b"3\n");
//! ```

#![warn(future_incompatible)]
#![warn(non_ascii_idents)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts)]
#![warn(trivial_numeric_casts)]
#![warn(unreachable_pub)]
#![warn(unused)]

mod compiler;
mod debug;
mod error;
mod instr;
mod value;
mod vm;

pub use compiler::compile;
pub use compiler::Chunk;
pub use error::{CompileError, Error, Location, Result, RuntimeError, RuntimeErrorKind, SyntaxError};
pub use instr::OpCode;
pub use value::Value;
pub use vm::Vm;

/// Capacity of the VM's value stack.
pub const STACK_MAX: usize = 256;

/// Maximum number of locals in scope at once. Local slots are one-byte operands.
pub const LOCALS_MAX: usize = 256;

/// Maximum size of a chunk's constant pool. Constant indices are one-byte operands.
pub const CONSTANTS_MAX: usize = 256;

/// Compiles and runs `source` on a fresh VM which prints to stdout.
pub fn interpret(source: &str) -> Result<()> {
    Vm::new().interpret(source)
}
