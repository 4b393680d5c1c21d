use log::debug;
use log::log_enabled;
use log::Level;

use super::lexer::Lexer;
use super::token::LexError;
use super::Chunk;
use super::OpCode;
use super::Token;
use super::TokenType;
use super::Value;
use crate::error::CompileError;
use crate::error::Location;
use crate::error::SyntaxError;
use crate::LOCALS_MAX;

/// How deeply statements and expressions may nest inside each other.
const NESTING_MAX: usize = 256;

/// Binding power of an operator, lowest to highest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    /// The next-higher level. Binary operators parse their right operand at
    /// this level, which makes them left-associative.
    fn next(self) -> Self {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call | Primary => Primary,
        }
    }
}

type ParseFn<'a> = fn(&mut Parser<'a>, bool);

/// The parsing behaviour of one token type.
struct ParseRule<'a> {
    prefix: Option<ParseFn<'a>>,
    infix: Option<ParseFn<'a>>,
    precedence: Precedence,
}

impl<'a> ParseRule<'a> {
    fn new(
        prefix: Option<ParseFn<'a>>,
        infix: Option<ParseFn<'a>>,
        precedence: Precedence,
    ) -> Self {
        ParseRule {
            prefix,
            infix,
            precedence,
        }
    }
}

/// A local variable, in declaration order. Its index is its stack slot.
#[derive(Debug)]
struct Local<'a> {
    name: &'a str,
    /// The scope depth it was declared at, or `None` while its initializer
    /// is still being compiled.
    depth: Option<usize>,
}

/// Tracks the current state of one compilation.
#[derive(Debug)]
struct Parser<'a> {
    /// The input token stream.
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    had_error: bool,
    /// Set after an error is reported; suppresses further reports until the
    /// parser resynchronizes.
    panic_mode: bool,
    errors: Vec<CompileError>,
    chunk: Chunk,
    locals: Vec<Local<'a>>,
    scope_depth: usize,
    /// Statements and expressions currently being parsed, innermost last.
    nesting: usize,
}

/// Parses source code into a `Chunk`.
pub(super) fn parse_str(source: &str) -> Result<Chunk, Vec<CompileError>> {
    let mut parser = Parser::new(source);
    parser.advance();
    while !parser.try_pop(TokenType::EndOfFile) {
        parser.declaration();
    }
    parser.finish()
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Parser {
            lexer: Lexer::new(source),
            current: Token::default(),
            previous: Token::default(),
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            chunk: Chunk::new(),
            locals: Vec::new(),
            scope_depth: 0,
            nesting: 0,
        }
    }

    fn finish(mut self) -> Result<Chunk, Vec<CompileError>> {
        self.emit_op(OpCode::Return);
        if self.had_error {
            return Err(self.errors);
        }

        if log_enabled!(Level::Debug) {
            debug!("compiled chunk:\n{}", self.chunk.disassemble("script"));
        }
        Ok(self.chunk)
    }

    // Token stream management

    /// Shifts `current` into `previous` and scans a new `current`, reporting
    /// and skipping any error tokens along the way.
    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.lexer.next_token();
            match self.current.typ {
                TokenType::Error(e) => self.error_at_current(lex_error(e)),
                _ => break,
            }
        }
    }

    /// Advances past the current token if it has type `expected`. Otherwise
    /// reports `message` at the current token, without advancing.
    fn consume(&mut self, expected: TokenType, message: &'static str) {
        if self.check(expected) {
            self.advance();
        } else {
            self.error_at_current(SyntaxError::Expect(message));
        }
    }

    fn check(&self, expected: TokenType) -> bool {
        self.current.typ == expected
    }

    /// Checks the current token's type. If it matches, it is consumed.
    fn try_pop(&mut self, expected: TokenType) -> bool {
        if self.check(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Gets the original source code contained by a token.
    fn text(&self, token: Token) -> &'a str {
        &self.lexer.src()[token.range()]
    }

    /// Runs `f` one nesting level deeper. Past `NESTING_MAX`, the current
    /// token is skipped and reported instead, so recovery still advances.
    fn nested(&mut self, f: impl FnOnce(&mut Self)) {
        if self.nesting == NESTING_MAX {
            self.advance();
            self.error(SyntaxError::TooDeeplyNested);
            return;
        }
        self.nesting += 1;
        f(self);
        self.nesting -= 1;
    }

    // Error reporting

    fn error(&mut self, kind: SyntaxError) {
        self.error_at(self.previous, kind);
    }

    fn error_at_current(&mut self, kind: SyntaxError) {
        self.error_at(self.current, kind);
    }

    fn error_at(&mut self, token: Token, kind: SyntaxError) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let location = match token.typ {
            TokenType::EndOfFile => Location::AtEnd,
            _ if token.is_error() => Location::Nowhere,
            _ => Location::AtToken(self.text(token).to_string()),
        };
        let error = CompileError {
            kind,
            line: token.line,
            location,
        };
        debug!("{}", error);
        self.errors.push(error);
    }

    /// Leaves panic mode and skips tokens until a likely statement boundary.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.typ != TokenType::EndOfFile {
            if self.previous.typ == TokenType::Semi {
                return;
            }
            match self.current.typ {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => self.advance(),
            }
        }
    }

    // Emitting bytecode

    /// Adds a byte to the output, attributed to the previous token's line.
    fn emit_byte(&mut self, byte: impl Into<u8>) {
        self.chunk.write(byte, self.previous.line);
    }

    fn emit_op(&mut self, op: OpCode) {
        self.emit_byte(op);
    }

    fn emit_op_arg(&mut self, op: OpCode, arg: u8) {
        self.emit_byte(op);
        self.emit_byte(arg);
    }

    /// Stores a constant and returns its index.
    fn make_constant(&mut self, value: Value) -> u8 {
        match self.chunk.add_constant(value) {
            Some(i) => i,
            None => {
                self.error(SyntaxError::TooManyConstants);
                0
            }
        }
    }

    fn emit_constant(&mut self, value: Value) {
        let i = self.make_constant(value);
        self.emit_op_arg(OpCode::Constant, i);
    }

    /// Emits a jump with a placeholder offset. Returns the placeholder's
    /// position, to be passed to `patch_jump`.
    fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        self.emit_byte(0xff);
        self.emit_byte(0xff);
        self.chunk.len() - 2
    }

    /// Points the jump whose placeholder is at `offset` to the end of the
    /// chunk.
    fn patch_jump(&mut self, offset: usize) {
        let jump = self.chunk.len() - offset - 2;
        match u16::try_from(jump) {
            Ok(jump) => {
                let [hi, lo] = jump.to_be_bytes();
                self.chunk.code[offset] = hi;
                self.chunk.code[offset + 1] = lo;
            }
            Err(_) => self.error(SyntaxError::JumpTooLarge),
        }
    }

    /// Emits a backward jump to `loop_start`.
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit_op(OpCode::Loop);
        let offset = self.chunk.len() - loop_start + 2;
        let offset = u16::try_from(offset).unwrap_or_else(|_| {
            self.error(SyntaxError::LoopTooLarge);
            0
        });
        let [hi, lo] = offset.to_be_bytes();
        self.emit_byte(hi);
        self.emit_byte(lo);
    }

    // Scopes and variables

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Lowers the scope depth by one, popping any locals from that block.
    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth.map_or(true, |d| d > self.scope_depth) {
                self.emit_op(OpCode::Pop);
                self.locals.pop();
            } else {
                break;
            }
        }
    }

    /// Stores a variable's name as a string constant and returns its index.
    fn identifier_constant(&mut self, name: &str) -> u8 {
        self.make_constant(Value::from(name))
    }

    /// Finds the stack slot of the innermost local named `name`.
    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        let slot = self.locals.iter().rposition(|local| local.name == name)?;
        if self.locals[slot].depth.is_none() {
            self.error(SyntaxError::ReadInOwnInitializer);
        }
        Some(slot as u8)
    }

    /// Creates a new, uninitialized local slot.
    fn add_local(&mut self, name: &'a str) {
        if self.locals.len() == LOCALS_MAX {
            self.error(SyntaxError::TooManyLocals);
            return;
        }
        self.locals.push(Local { name, depth: None });
    }

    /// Records the variable named by the previous token as a local. Does
    /// nothing at the top level, where variables are globals.
    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }

        let name = self.text(self.previous);
        let scope_depth = self.scope_depth;
        let duplicate = self
            .locals
            .iter()
            .rev()
            .take_while(|local| local.depth.map_or(true, |d| d >= scope_depth))
            .any(|local| local.name == name);
        if duplicate {
            self.error(SyntaxError::AlreadyDeclared);
        }
        self.add_local(name);
    }

    /// Parses a variable name. Returns the index of its name constant if it
    /// is a global, or 0 for a local.
    fn parse_variable(&mut self, message: &'static str) -> u8 {
        self.consume(TokenType::Identifier, message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        let name = self.text(self.previous);
        self.identifier_constant(name)
    }

    /// Brings the most recent local into scope. It is important this happens
    /// only after its initializer has been compiled.
    fn mark_initialized(&mut self) {
        let depth = self.scope_depth;
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
        } else {
            self.emit_op_arg(OpCode::DefineGlobal, global);
        }
    }

    // Declarations and statements

    fn declaration(&mut self) {
        if self.try_pop(TokenType::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");
        if self.try_pop(TokenType::Assign) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(
            TokenType::Semi,
            "Expect ';' after variable declaration.",
        );

        self.define_variable(global);
    }

    fn statement(&mut self) {
        self.nested(|this| match this.current.typ {
            TokenType::Print => {
                this.advance();
                this.print_statement();
            }
            TokenType::For => {
                this.advance();
                this.for_statement();
            }
            TokenType::If => {
                this.advance();
                this.if_statement();
            }
            TokenType::Return => {
                this.advance();
                this.return_statement();
            }
            TokenType::While => {
                this.advance();
                this.while_statement();
            }
            TokenType::LCurly => {
                this.advance();
                this.begin_scope();
                this.block();
                this.end_scope();
            }
            _ => this.expression_statement(),
        });
    }

    fn block(&mut self) {
        while !self.check(TokenType::RCurly) && !self.check(TokenType::EndOfFile) {
            self.declaration();
        }

        self.consume(TokenType::RCurly, "Expect '}' after block.");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semi, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    /// An expression whose value is discarded.
    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenType::Semi, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn if_statement(&mut self) {
        self.consume(TokenType::LParen, "Expect '(' after 'if'.");
        self.expression();
        self.consume(TokenType::RParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.try_pop(TokenType::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk.len();
        self.consume(TokenType::LParen, "Expect '(' after 'while'.");
        self.expression();
        self.consume(TokenType::RParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    /// Parses `for (init; cond; incr) body` as a `while` loop inside its own
    /// scope. The increment is compiled before the body, so the body jumps
    /// back to it and it jumps back to the condition.
    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenType::LParen, "Expect '(' after 'for'.");
        if self.try_pop(TokenType::Semi) {
            // No initializer
        } else if self.try_pop(TokenType::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk.len();

        // Without a condition, the loop only ends by a jump out of it.
        let mut exit_jump = None;
        if !self.try_pop(TokenType::Semi) {
            self.expression();
            self.consume(TokenType::Semi, "Expect ';' after loop condition.");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.try_pop(TokenType::RParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenType::RParen, "Expect ')' after for clauses.");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump);
            self.emit_op(OpCode::Pop);
        }

        self.end_scope();
    }

    /// There are no functions, so any `return` is at the top level.
    fn return_statement(&mut self) {
        self.error(SyntaxError::TopLevelReturn);
        if !self.try_pop(TokenType::Semi) {
            self.expression();
            self.consume(TokenType::Semi, "Expect ';' after return value.");
        }
    }

    // Expressions

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parses any expression whose operators bind at least as tightly as
    /// `precedence`.
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.nested(|this| {
            this.advance();
            let prefix = match Self::rule(this.previous.typ).prefix {
                Some(prefix) => prefix,
                None => {
                    this.error(SyntaxError::ExpectExpression);
                    return;
                }
            };

            let can_assign = precedence <= Precedence::Assignment;
            prefix(this, can_assign);

            while precedence <= Self::rule(this.current.typ).precedence {
                this.advance();
                if let Some(infix) = Self::rule(this.previous.typ).infix {
                    infix(this, can_assign);
                }
            }

            if can_assign && this.try_pop(TokenType::Assign) {
                this.error(SyntaxError::InvalidAssignmentTarget);
            }
        });
    }

    fn rule(typ: TokenType) -> ParseRule<'a> {
        match typ {
            TokenType::LParen => ParseRule::new(Some(Self::grouping), None, Precedence::None),
            TokenType::Minus => {
                ParseRule::new(Some(Self::unary), Some(Self::binary), Precedence::Term)
            }
            TokenType::Plus => ParseRule::new(None, Some(Self::binary), Precedence::Term),
            TokenType::Slash | TokenType::Star => {
                ParseRule::new(None, Some(Self::binary), Precedence::Factor)
            }
            TokenType::Bang => ParseRule::new(Some(Self::unary), None, Precedence::None),
            TokenType::BangEqual | TokenType::Equal => {
                ParseRule::new(None, Some(Self::binary), Precedence::Equality)
            }
            TokenType::Greater
            | TokenType::GreaterEqual
            | TokenType::Less
            | TokenType::LessEqual => {
                ParseRule::new(None, Some(Self::binary), Precedence::Comparison)
            }
            TokenType::Identifier => ParseRule::new(Some(Self::variable), None, Precedence::None),
            TokenType::LiteralString => {
                ParseRule::new(Some(Self::string), None, Precedence::None)
            }
            TokenType::LiteralNumber => {
                ParseRule::new(Some(Self::number), None, Precedence::None)
            }
            TokenType::And => ParseRule::new(None, Some(Self::and), Precedence::And),
            TokenType::Or => ParseRule::new(None, Some(Self::or), Precedence::Or),
            TokenType::False | TokenType::True | TokenType::Nil => {
                ParseRule::new(Some(Self::literal), None, Precedence::None)
            }
            _ => ParseRule::new(None, None, Precedence::None),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenType::RParen, "Expect ')' after expression.");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.typ;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenType::Bang => self.emit_op(OpCode::Not),
            TokenType::Minus => self.emit_op(OpCode::Negate),
            _ => (),
        }
    }

    /// `!=`, `>=` and `<=` are compiled as the negation of `==`, `<` and `>`.
    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.typ;
        let precedence = Self::rule(operator).precedence;
        self.parse_precedence(precedence.next());

        match operator {
            TokenType::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenType::Equal => self.emit_op(OpCode::Equal),
            TokenType::Greater => self.emit_op(OpCode::Greater),
            TokenType::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenType::Less => self.emit_op(OpCode::Less),
            TokenType::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            TokenType::Plus => self.emit_op(OpCode::Add),
            TokenType::Minus => self.emit_op(OpCode::Subtract),
            TokenType::Star => self.emit_op(OpCode::Multiply),
            TokenType::Slash => self.emit_op(OpCode::Divide),
            _ => (),
        }
    }

    /// If the left operand is falsey, skip the right one and leave the left
    /// on the stack.
    fn and(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    /// If the left operand is truthy, skip the right one and leave the left
    /// on the stack.
    fn or(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);

        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);

        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.typ {
            TokenType::False => self.emit_op(OpCode::False),
            TokenType::Nil => self.emit_op(OpCode::Nil),
            TokenType::True => self.emit_op(OpCode::True),
            _ => (),
        }
    }

    fn number(&mut self, _can_assign: bool) {
        match self.text(self.previous).parse::<f64>() {
            Ok(n) => self.emit_constant(Value::Number(n)),
            Err(_) => self.error(SyntaxError::ExpectExpression),
        }
    }

    /// Emits a string literal, with the quotes chopped off.
    fn string(&mut self, _can_assign: bool) {
        let text = self.text(self.previous);
        let contents = &text[1..text.len() - 1];
        self.emit_constant(Value::from(contents));
    }

    fn variable(&mut self, can_assign: bool) {
        self.named_variable(self.previous, can_assign);
    }

    /// Emits a read of the variable named by `token`, or an assignment to it
    /// if one follows and is allowed here.
    fn named_variable(&mut self, token: Token, can_assign: bool) {
        let name = self.text(token);
        let (get_op, set_op, arg) = match self.resolve_local(name) {
            Some(slot) => (OpCode::GetLocal, OpCode::SetLocal, slot),
            None => {
                let i = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, i)
            }
        };

        if can_assign && self.try_pop(TokenType::Assign) {
            self.expression();
            self.emit_op_arg(set_op, arg);
        } else {
            self.emit_op_arg(get_op, arg);
        }
    }
}

fn lex_error(e: LexError) -> SyntaxError {
    match e {
        LexError::UnterminatedString => SyntaxError::UnterminatedString,
        LexError::UnexpectedCharacter(c) => SyntaxError::UnexpectedCharacter(c),
    }
}
