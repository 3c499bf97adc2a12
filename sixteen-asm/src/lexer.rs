//! Assembler for the sixteen machine
//!
//! Lexer for the Assembly syntax

use crate::errors::{ParseError, ParseResult};
use crate::isa::Register;

#[derive(Debug, Clone)]
pub struct Lexer {
    chars: Vec<char>,
    pub pos: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Operators
    Plus,    // +
    Minus,   // -
    Star,    // *
    LParen,  // (
    RParen,  // )
    LSquare, // [
    RSquare, // ]
    LBrace,  // {
    RBrace,  // }
    LAngle,  // <
    RAngle,  // >
    Comma,   // ,
    Colon,   // :
    Equals,  // =
    Dot,     // .
    Amp,     // & not followed by hex digits

    HexLiteral(u32),  // $0A50
    Address(u32),     // &0A50
    Variable(String), // !name
    Label(String),    // name:
    Ident(String),
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::HexLiteral(v) => write!(f, "literal ${:X}", v),
            TokenKind::Address(v) => write!(f, "address &{:X}", v),
            TokenKind::Variable(name) => write!(f, "variable !{}", name),
            TokenKind::Label(name) => write!(f, "label {}:", name),
            TokenKind::Ident(name) => write!(f, "'{}'", name),
            other => write!(f, "{:?}", other),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    pub fn new(src: &str) -> Self {
        Lexer {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Peek at the next character without consuming it.
    fn peek(&self) -> char {
        self.peek_ahead(0)
    }

    fn peek_ahead(&self, offset: usize) -> char {
        self.chars.get(self.pos + offset).copied().unwrap_or('\0')
    }

    /// Peek, advance and return the peeked character.
    fn advance(&mut self) -> char {
        let peeked = self.peek();
        self.pos += 1;
        if peeked == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        peeked
    }

    fn eat_whitespace(&mut self) {
        loop {
            match self.peek() {
                c if c.is_whitespace() => {
                    self.advance();
                }
                ';' => self.skip_line(),
                '/' if self.peek_ahead(1) == '/' => self.skip_line(),
                _ => break,
            }
        }
    }

    fn skip_line(&mut self) {
        while self.peek() != '\n' && self.peek() != '\0' {
            self.advance();
        }
    }

    fn token(&self, kind: TokenKind, literal: String, line: usize, column: usize) -> Token {
        Token {
            kind,
            literal,
            line,
            column,
        }
    }

    fn lex_hex_digits(&mut self, line: usize, column: usize) -> ParseResult<(u32, String)> {
        let mut digits = String::new();
        while self.peek().is_ascii_hexdigit() {
            digits.push(self.advance());
        }

        if digits.is_empty() || digits.len() > 8 {
            return Err(ParseError::InvalidLiteral {
                text: digits,
                line,
                column,
            });
        }

        let value = u32::from_str_radix(&digits, 16).map_err(|_| ParseError::InvalidLiteral {
            text: digits.clone(),
            line,
            column,
        })?;

        Ok((value, digits))
    }

    /// Number of identifier characters from the cursor, and whether they are all hex digits.
    fn word_ahead(&self) -> (usize, bool) {
        let mut len = 0;
        let mut all_hex = true;
        while is_ident_char(self.peek_ahead(len)) {
            all_hex &= self.peek_ahead(len).is_ascii_hexdigit();
            len += 1;
        }
        (len, all_hex)
    }

    fn lex_ident(&mut self) -> String {
        let mut ident = String::new();
        while is_ident_char(self.peek()) {
            ident.push(self.advance());
        }
        ident
    }

    fn lex_token(&mut self) -> ParseResult<Token> {
        let (line, column) = (self.line, self.column);
        let c = self.advance();

        let simple = match c {
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Star),
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '[' => Some(TokenKind::LSquare),
            ']' => Some(TokenKind::RSquare),
            '{' => Some(TokenKind::LBrace),
            '}' => Some(TokenKind::RBrace),
            '<' => Some(TokenKind::LAngle),
            '>' => Some(TokenKind::RAngle),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '=' => Some(TokenKind::Equals),
            '.' => Some(TokenKind::Dot),
            _ => None,
        };
        if let Some(kind) = simple {
            return Ok(self.token(kind, c.to_string(), line, column));
        }

        match c {
            '$' => {
                let (value, digits) = self.lex_hex_digits(line, column)?;
                Ok(self.token(TokenKind::HexLiteral(value), format!("${}", digits), line, column))
            }

            // `&0050` is an address, `&r1` or `&[` is an `&` followed by something else.
            // `acc` is all hex digits but still a register.
            '&' => {
                let (len, all_hex) = self.word_ahead();
                let word: String = self.chars[self.pos..self.pos + len].iter().collect();
                if len > 0 && all_hex && Register::from_name(&word).is_none() {
                    let (value, digits) = self.lex_hex_digits(line, column)?;
                    Ok(self.token(TokenKind::Address(value), format!("&{}", digits), line, column))
                } else {
                    Ok(self.token(TokenKind::Amp, "&".to_string(), line, column))
                }
            }

            '!' => {
                if !is_ident_start(self.peek()) {
                    return Err(ParseError::UnexpectedCharacter {
                        ch: self.peek(),
                        line: self.line,
                        column: self.column,
                    });
                }
                let name = self.lex_ident();
                Ok(self.token(TokenKind::Variable(name.clone()), format!("!{}", name), line, column))
            }

            // Identifiers, keywords and labels
            _ if is_ident_start(c) => {
                let mut ident = c.to_string();
                ident.push_str(&self.lex_ident());

                if self.peek() == ':' {
                    self.advance(); // consume ':'
                    return Ok(self.token(TokenKind::Label(ident.clone()), ident, line, column));
                }

                Ok(self.token(TokenKind::Ident(ident.clone()), ident, line, column))
            }

            _ => Err(ParseError::UnexpectedCharacter { ch: c, line, column }),
        }
    }

    pub fn lex(&mut self) -> ParseResult<Vec<Token>> {
        let mut tokens = Vec::new();

        self.eat_whitespace();
        while self.peek() != '\0' {
            tokens.push(self.lex_token()?);
            self.eat_whitespace();
        }

        Ok(tokens)
    }
}
