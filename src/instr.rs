//! The bytecode instruction set.

/// A one-byte instruction tag. Operands follow the opcode in the byte stream.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    // Index into the constant pool
    Constant,
    Nil,
    True,
    False,
    Pop,

    // Stack slot
    GetLocal,
    SetLocal,

    // For global variables, the operand is an index into the constant pool.
    // That constant is the variable's name.
    GetGlobal,
    DefineGlobal,
    SetGlobal,

    Equal,
    Greater,
    Less,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,

    Print,

    // 16-bit big-endian offsets
    Jump,
    JumpIfFalse,
    Loop,

    Return,
}

impl OpCode {
    const ALL: [OpCode; 24] = [
        OpCode::Constant,
        OpCode::Nil,
        OpCode::True,
        OpCode::False,
        OpCode::Pop,
        OpCode::GetLocal,
        OpCode::SetLocal,
        OpCode::GetGlobal,
        OpCode::DefineGlobal,
        OpCode::SetGlobal,
        OpCode::Equal,
        OpCode::Greater,
        OpCode::Less,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::Not,
        OpCode::Negate,
        OpCode::Print,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Loop,
        OpCode::Return,
    ];

    /// The number of operand bytes which follow this opcode.
    pub fn operand_len(self) -> usize {
        use OpCode::*;
        match self {
            Constant | GetLocal | SetLocal | GetGlobal | DefineGlobal | SetGlobal => 1,
            Jump | JumpIfFalse | Loop => 2,
            _ => 0,
        }
    }

    /// The conventional upper-case name, as shown in disassembly.
    pub fn name(self) -> &'static str {
        use OpCode::*;
        match self {
            Constant => "OP_CONSTANT",
            Nil => "OP_NIL",
            True => "OP_TRUE",
            False => "OP_FALSE",
            Pop => "OP_POP",
            GetLocal => "OP_GET_LOCAL",
            SetLocal => "OP_SET_LOCAL",
            GetGlobal => "OP_GET_GLOBAL",
            DefineGlobal => "OP_DEFINE_GLOBAL",
            SetGlobal => "OP_SET_GLOBAL",
            Equal => "OP_EQUAL",
            Greater => "OP_GREATER",
            Less => "OP_LESS",
            Add => "OP_ADD",
            Subtract => "OP_SUBTRACT",
            Multiply => "OP_MULTIPLY",
            Divide => "OP_DIVIDE",
            Not => "OP_NOT",
            Negate => "OP_NEGATE",
            Print => "OP_PRINT",
            Jump => "OP_JUMP",
            JumpIfFalse => "OP_JUMP_IF_FALSE",
            Loop => "OP_LOOP",
            Return => "OP_RETURN",
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    /// Decodes a byte, handing it back if it is not an opcode.
    fn try_from(byte: u8) -> Result<Self, u8> {
        OpCode::ALL.get(byte as usize).copied().ok_or(byte)
    }
}
