use std::fmt::{self, Display, Formatter};
use std::io;

/// Custom result type for interpreting source code.
pub type Result<T> = std::result::Result<T, Error>;

/// A type for all errors that might happen while interpreting a program,
/// including during the compilation step.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Compilation failed. Holds every reported diagnostic, in source order.
    #[error("{}", join_lines(.0))]
    Compile(Vec<CompileError>),
    /// Execution stopped at the first runtime error.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Program output could not be written.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Error::Compile(_))
    }

    pub fn is_runtime_error(&self) -> bool {
        matches!(self, Error::Runtime(_))
    }
}

impl From<Vec<CompileError>> for Error {
    fn from(errors: Vec<CompileError>) -> Self {
        Error::Compile(errors)
    }
}

fn join_lines(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A diagnostic reported by the compiler.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("[line {line}] Error{location}: {kind}")]
pub struct CompileError {
    pub kind: SyntaxError,
    pub line: usize,
    pub location: Location,
}

/// Where a compile error was found, relative to the offending token.
#[derive(Clone, Debug, PartialEq)]
pub enum Location {
    /// At a token with this lexeme.
    AtToken(String),
    /// At the end of the input.
    AtEnd,
    /// No token to point at; used for lexical errors.
    Nowhere,
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Location::AtToken(lexeme) => write!(f, " at '{}'", lexeme),
            Location::AtEnd => write!(f, " at end"),
            Location::Nowhere => Ok(()),
        }
    }
}

/// The kinds of compile-time errors: lexical, syntactic and static scoping.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    // Lexical
    #[error("Unterminated string.")]
    UnterminatedString,
    #[error("Unexpected character '{0}'.")]
    UnexpectedCharacter(char),

    // Syntactic
    /// A specific token was required. Holds the message describing it.
    #[error("{0}")]
    Expect(&'static str),
    #[error("Expect expression.")]
    ExpectExpression,
    #[error("Invalid assignment target.")]
    InvalidAssignmentTarget,
    #[error("Can't return from top-level code.")]
    TopLevelReturn,

    // Scoping
    #[error("Already a variable with this name in this scope.")]
    AlreadyDeclared,
    #[error("Can't read local variable in its own initializer.")]
    ReadInOwnInitializer,

    // Limits
    #[error("Too many constants in one chunk.")]
    TooManyConstants,
    #[error("Too many local variables in function.")]
    TooManyLocals,
    #[error("Too much code to jump over.")]
    JumpTooLarge,
    #[error("Loop body too large.")]
    LoopTooLarge,
    #[error("Too deeply nested.")]
    TooDeeplyNested,
}

/// An error raised while executing a chunk.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{kind}\n[line {line}] in script")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RuntimeErrorKind {
    /// A unary operand was applied to a non-number.
    #[error("Operand must be a number.")]
    OperandMustBeNumber,
    /// A binary operand was applied to values which are not both numbers.
    #[error("Operands must be numbers.")]
    OperandsMustBeNumbers,
    /// `+` was applied to values which are neither two numbers nor two strings.
    #[error("Operands must be two numbers or two strings.")]
    OperandsMustBeNumbersOrStrings,
    #[error("Undefined variable '{0}'.")]
    UndefinedVariable(String),
    #[error("Stack overflow.")]
    StackOverflow,
    #[error("Stack underflow.")]
    StackUnderflow,

    // Malformed chunks
    #[error("Unknown opcode {0}.")]
    InvalidOpcode(u8),
    #[error("Instruction is missing its operands.")]
    TruncatedInstruction,
    #[error("Constant index {0} is out of range.")]
    InvalidConstant(u8),
    #[error("Jump target is before the start of the chunk.")]
    InvalidJump,
}
