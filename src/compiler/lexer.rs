//! This module contains the scanner, which converts source text into tokens
//! on demand.

use super::token::LexError;
use super::Token;
use super::TokenType::{self, *};

/// A `Lexer` handles the raw conversion of characters to tokens. It is
/// single-pass: each call to `next_token` scans exactly one token, and once
/// the input is exhausted every further call returns `EndOfFile`.
#[derive(Debug)]
pub(super) struct Lexer<'a> {
    source: &'a str,
    /// The starting position of the token being scanned.
    start: usize,
    /// The position of the next (unconsumed) character.
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub(super) fn new(source: &'a str) -> Self {
        Lexer {
            source,
            start: 0,
            pos: 0,
            line: 1,
        }
    }

    pub(super) fn src(&self) -> &'a str {
        self.source
    }

    pub(super) fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.pos;

        let first_char = match self.next_char() {
            Some(c) => c,
            None => return self.make_token(EndOfFile),
        };

        let tok_type = match first_char {
            '(' => LParen,
            ')' => RParen,
            '{' => LCurly,
            '}' => RCurly,
            ';' => Semi,
            ',' => Comma,
            '.' => Dot,
            '-' => Minus,
            '+' => Plus,
            '/' => Slash,
            '*' => Star,
            '!' => self.peek_equals(BangEqual, Bang),
            '=' => self.peek_equals(Equal, Assign),
            '<' => self.peek_equals(LessEqual, Less),
            '>' => self.peek_equals(GreaterEqual, Greater),
            '"' => self.lex_string(),
            _ if first_char.is_ascii_digit() => self.lex_number(),
            _ if first_char.is_ascii_alphabetic() || first_char == '_' => self.lex_word(),
            _ => Error(LexError::UnexpectedCharacter(first_char)),
        };
        self.make_token(tok_type)
    }

    fn make_token(&self, typ: TokenType) -> Token {
        let len = self.pos - self.start;
        Token::new(typ, self.start, len as u32, self.line)
    }

    fn peek_char(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next_char(&self) -> Option<char> {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Move a character forward, only if the current character matches
    /// `expected`.
    fn try_next(&mut self, expected: char) -> bool {
        match self.peek_char() {
            Some(c) if c == expected => {
                self.next_char();
                true
            }
            _ => false,
        }
    }

    /// Consume whitespace and `//` line comments.
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            match c {
                ' ' | '\r' | '\t' | '\n' => {
                    self.next_char();
                }
                '/' if self.peek_next_char() == Some('/') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.next_char();
                    }
                }
                _ => break,
            }
        }
    }

    /// The lexer just read the first character of an operator which may be
    /// followed by `=`.
    fn peek_equals(&mut self, with_equals: TokenType, without: TokenType) -> TokenType {
        if self.try_next('=') {
            with_equals
        } else {
            without
        }
    }

    /// Tokenize a string literal. The token includes both quotes. Newlines
    /// are allowed inside and counted.
    fn lex_string(&mut self) -> TokenType {
        while let Some(c) = self.next_char() {
            if c == '"' {
                return LiteralString;
            }
        }
        Error(LexError::UnterminatedString)
    }

    /// Read in a number: digits, optionally followed by `.` and more digits.
    fn lex_number(&mut self) -> TokenType {
        self.lex_digits();
        if self.peek_char() == Some('.')
            && self.peek_next_char().map_or(false, |c| c.is_ascii_digit())
        {
            self.next_char();
            self.lex_digits();
        }
        LiteralNumber
    }

    /// Read in an unbroken sequence of digits.
    fn lex_digits(&mut self) {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn lex_word(&mut self) -> TokenType {
        while let Some(c) = self.peek_char() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.next_char();
            } else {
                break;
            }
        }

        keyword_match(&self.source[self.start..self.pos])
    }
}

fn keyword_match(s: &str) -> TokenType {
    match s {
        "and" => And,
        "class" => Class,
        "else" => Else,
        "false" => False,
        "for" => For,
        "fun" => Fun,
        "if" => If,
        "nil" => Nil,
        "or" => Or,
        "print" => Print,
        "return" => Return,
        "super" => Super,
        "this" => This,
        "true" => True,
        "var" => Var,
        "while" => While,
        _ => Identifier,
    }
}
