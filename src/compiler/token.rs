use std::ops::Range;

/// A lexical token. The lexeme is not stored; `start` and `len` locate it in
/// the source buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Token {
    pub(super) typ: TokenType,
    pub(super) start: usize,
    pub(super) len: u32,
    pub(super) line: usize,
}

#[rustfmt::skip]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum TokenType {
    // Single-character punctuation
    LParen, RParen, LCurly, RCurly, Comma, Dot, Minus, Plus, Semi, Slash, Star,
    // One or two character operators
    Bang, BangEqual, Assign, Equal, Greater, GreaterEqual, Less, LessEqual,
    // Literals
    Identifier, LiteralString, LiteralNumber,
    // Keywords
    And, Class, Else, False, For, Fun, If, Nil, Or, Print, Return, Super, This,
    True, Var, While,

    Error(LexError),
    EndOfFile,
}

/// The reason the scanner produced an error token.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum LexError {
    UnterminatedString,
    UnexpectedCharacter(char),
}

impl Token {
    pub(super) fn new(typ: TokenType, start: usize, len: u32, line: usize) -> Self {
        Token {
            typ,
            start,
            len,
            line,
        }
    }

    pub(super) fn range(&self) -> Range<usize> {
        let start = self.start;
        let end = start + self.len as usize;
        start..end
    }

    pub(super) fn is_error(&self) -> bool {
        matches!(self.typ, TokenType::Error(_))
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::new(TokenType::EndOfFile, 0, 0, 1)
    }
}
