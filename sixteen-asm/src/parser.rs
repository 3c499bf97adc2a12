//! Assembler for the sixteen machine
//!
//! Parser for the Assembly syntax
//!
//! A program is a list of statements: labels (`name:`), constants
//! (`constant name = $hex`), data blocks (`data8 name = { $01, $02 }`, or `data16`),
//! structures (`structure name { member: $size, ... }`) and instructions. Data blocks
//! and structures may be marked for export with a leading `+`.
//!
//! Instruction operands are hex literals (`$0A`), registers (`r1`), addresses
//! (`&0050`), variables (`!name`), bracketed expressions (`[$02 * !base]`),
//! memory expressions (`&[!loop]`), register pointers (`&r1`) and struct member
//! accesses (`<Point> origin.y`). Which form of a mnemonic is meant is decided
//! by the shape of its operands.

use std::iter::Peekable;

use crate::errors::{ParseError, ParseResult};
use crate::expr::{BinOp, Expr, InterpretAs, Sequence, Term};
use crate::isa::{Instr, Register, Shape};
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct Parser<I>
where
    I: Iterator<Item = Token>,
{
    pub tokens: Peekable<I>,

    // Position of the last consumed token, for end-of-input errors
    pub line: usize,
    pub column: usize,

    pub ast: Ast,
}

// --------------------------------------------
// AST definition

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    HexLiteral(u16),
    Register(Register),
    Address(u16),
    Variable(String),
    Expression(Expr),         // [$02 + !base]
    InterpretAs(InterpretAs), // <Point> origin.y
    MemoryExpression(Expr),   // &[!loop], &<Point> origin.y
    RegisterPointer(Register), // &r1
}

impl Operand {
    pub fn shape(&self) -> Shape {
        match self {
            Operand::HexLiteral(_)
            | Operand::Variable(_)
            | Operand::Expression(_)
            | Operand::InterpretAs(_) => Shape::Literal,
            Operand::Register(_) => Shape::Register,
            Operand::Address(_) | Operand::MemoryExpression(_) => Shape::Memory,
            Operand::RegisterPointer(_) => Shape::RegisterPointer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataWidth {
    Byte,
    Word,
}

impl DataWidth {
    pub const fn bytes(self) -> usize {
        match self {
            DataWidth::Byte => 1,
            DataWidth::Word => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub size: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Label(String),
    Constant {
        name: String,
        value: u16,
    },
    Data {
        name: String,
        width: DataWidth,
        values: Vec<u16>,
        exported: bool,
    },
    Structure {
        name: String,
        members: Vec<Member>,
        exported: bool,
    },
    Instruction(Instr, Vec<Operand>),
}

pub type Ast = Vec<Node>;

fn mask(value: u32) -> u16 {
    (value & 0xFFFF) as u16
}

fn describe_shapes(shapes: &[Shape]) -> String {
    if shapes.is_empty() {
        return "none".to_string();
    }
    shapes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// --------------------------------------------
// Parsing

impl<I> Parser<I>
where
    I: Iterator<Item = Token>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens: tokens.peekable(),
            line: 1,
            column: 1,
            ast: Vec::new(),
        }
    }

    fn next_token(&mut self, expected: &str) -> ParseResult<Token> {
        let token = self.tokens.next().ok_or_else(|| ParseError::UnexpectedEof {
            expected: expected.to_string(),
        })?;
        self.line = token.line;
        self.column = token.column;
        Ok(token)
    }

    fn unexpected(expected: &str, token: &Token) -> ParseError {
        ParseError::UnexpectedToken {
            expected: expected.to_string(),
            found: token.kind.to_string(),
            line: token.line,
            column: token.column,
        }
    }

    /// Expect a specific token kind, erroring if the token is not found
    pub fn expect(&mut self, expected: TokenKind, what: &str) -> ParseResult<Token> {
        let token = self.next_token(what)?;
        if token.kind == expected {
            Ok(token)
        } else {
            Err(Self::unexpected(what, &token))
        }
    }

    fn expect_ident(&mut self, what: &str) -> ParseResult<String> {
        let token = self.next_token(what)?;
        match token.kind {
            TokenKind::Ident(name) => Ok(name),
            _ => Err(Self::unexpected(what, &token)),
        }
    }

    fn expect_hex(&mut self, what: &str) -> ParseResult<u16> {
        let token = self.next_token(what)?;
        match token.kind {
            TokenKind::HexLiteral(value) => Ok(mask(value)),
            _ => Err(Self::unexpected(what, &token)),
        }
    }

    fn peek_is(&mut self, kind: &TokenKind) -> bool {
        matches!(self.tokens.peek(), Some(t) if &t.kind == kind)
    }

    // Definitions
    // --------------------------------------

    fn parse_constant(&mut self) -> ParseResult<Node> {
        // constant name = $hex
        let name = self.expect_ident("constant name")?;
        self.expect(TokenKind::Equals, "'='")?;
        let value = self.expect_hex("hex literal")?;

        Ok(Node::Constant { name, value })
    }

    fn parse_data(&mut self, width: DataWidth, exported: bool) -> ParseResult<Node> {
        // data8 name = { $01, $02, $03 }
        let name = self.expect_ident("data block name")?;
        self.expect(TokenKind::Equals, "'='")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut values = vec![self.expect_hex("hex literal")?];
        loop {
            let token = self.next_token("',' or '}'")?;
            match token.kind {
                TokenKind::Comma => values.push(self.expect_hex("hex literal")?),
                TokenKind::RBrace => break,
                _ => return Err(Self::unexpected("',' or '}'", &token)),
            }
        }

        Ok(Node::Data {
            name,
            width,
            values,
            exported,
        })
    }

    fn parse_member(&mut self) -> ParseResult<Member> {
        // `x: $02` lexes as a label, `x : $02` as an identifier and a colon
        let token = self.next_token("member name")?;
        let name = match token.kind {
            TokenKind::Label(name) => name,
            TokenKind::Ident(name) => {
                self.expect(TokenKind::Colon, "':'")?;
                name
            }
            _ => return Err(Self::unexpected("member name", &token)),
        };
        let size = self.expect_hex("member size")?;

        Ok(Member { name, size })
    }

    fn parse_structure(&mut self, exported: bool) -> ParseResult<Node> {
        // structure name { a: $02, b: $01 }
        let name = self.expect_ident("structure name")?;
        self.expect(TokenKind::LBrace, "'{'")?;

        let mut members = vec![self.parse_member()?];
        loop {
            let token = self.next_token("',' or '}'")?;
            match token.kind {
                TokenKind::Comma => members.push(self.parse_member()?),
                TokenKind::RBrace => break,
                _ => return Err(Self::unexpected("',' or '}'", &token)),
            }
        }

        Ok(Node::Structure {
            name,
            members,
            exported,
        })
    }

    fn parse_exported(&mut self) -> ParseResult<Node> {
        let token = self.next_token("data8, data16 or structure")?;
        match &token.kind {
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("data8") => {
                self.parse_data(DataWidth::Byte, true)
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("data16") => {
                self.parse_data(DataWidth::Word, true)
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("structure") => {
                self.parse_structure(true)
            }
            _ => Err(Self::unexpected("data8, data16 or structure", &token)),
        }
    }

    // Expressions
    // --------------------------------------

    fn parse_interpret_as(&mut self) -> ParseResult<InterpretAs> {
        // '<' already consumed: Structure> symbol.member
        let structure = self.expect_ident("structure name")?;
        self.expect(TokenKind::RAngle, "'>'")?;
        let symbol = self.expect_ident("symbol name")?;
        self.expect(TokenKind::Dot, "'.'")?;
        let member = self.expect_ident("member name")?;

        Ok(InterpretAs {
            structure,
            symbol,
            member,
        })
    }

    fn parse_term(&mut self, open: &Token) -> ParseResult<Term> {
        let token = self.tokens.next().ok_or(ParseError::UnterminatedExpression {
            line: open.line,
            column: open.column,
        })?;
        self.line = token.line;
        self.column = token.column;

        match token.kind {
            TokenKind::HexLiteral(value) => Ok(Term::Expr(Expr::Literal(mask(value)))),
            TokenKind::Variable(name) => Ok(Term::Expr(Expr::Variable(name))),
            TokenKind::LAngle => Ok(Term::Expr(Expr::InterpretAs(self.parse_interpret_as()?))),
            TokenKind::LParen => Ok(Term::Group(Box::new(
                self.parse_sequence(&token, TokenKind::RParen)?,
            ))),
            _ => Err(Self::unexpected("literal, variable or '('", &token)),
        }
    }

    /// Parses operands and operators up to `close`, which is consumed.
    fn parse_sequence(&mut self, open: &Token, close: TokenKind) -> ParseResult<Sequence> {
        let mut seq = Sequence::single(self.parse_term(open)?);

        loop {
            let token = self.tokens.next().ok_or(ParseError::UnterminatedExpression {
                line: open.line,
                column: open.column,
            })?;
            self.line = token.line;
            self.column = token.column;

            let op = match token.kind {
                ref k if *k == close => return Ok(seq),
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Star => BinOp::Mul,
                _ => return Err(Self::unexpected("operator or closing bracket", &token)),
            };
            seq.push(op, self.parse_term(open)?);
        }
    }

    fn parse_bracketed(&mut self, open: &Token) -> ParseResult<Expr> {
        Ok(self.parse_sequence(open, TokenKind::RSquare)?.resolve())
    }

    // Instructions
    // --------------------------------------

    fn starts_operand(kind: &TokenKind) -> bool {
        match kind {
            TokenKind::HexLiteral(_)
            | TokenKind::Address(_)
            | TokenKind::Variable(_)
            | TokenKind::LSquare
            | TokenKind::LAngle
            | TokenKind::Amp => true,
            TokenKind::Ident(name) => Register::from_name(name).is_some(),
            _ => false,
        }
    }

    fn parse_operand(&mut self) -> ParseResult<Operand> {
        let token = self.next_token("operand")?;
        match token.kind {
            TokenKind::HexLiteral(value) => Ok(Operand::HexLiteral(mask(value))),
            TokenKind::Address(value) => Ok(Operand::Address(mask(value))),
            TokenKind::Variable(ref name) => Ok(Operand::Variable(name.clone())),
            TokenKind::LSquare => Ok(Operand::Expression(self.parse_bracketed(&token)?)),
            TokenKind::LAngle => Ok(Operand::InterpretAs(self.parse_interpret_as()?)),
            TokenKind::Ident(ref name) => Register::from_name(name)
                .map(Operand::Register)
                .ok_or_else(|| Self::unexpected("operand", &token)),

            TokenKind::Amp => {
                let next = self.next_token("register, '[' or '<' after '&'")?;
                match next.kind {
                    TokenKind::LSquare => {
                        Ok(Operand::MemoryExpression(self.parse_bracketed(&next)?))
                    }
                    TokenKind::LAngle => Ok(Operand::MemoryExpression(Expr::InterpretAs(
                        self.parse_interpret_as()?,
                    ))),
                    TokenKind::Ident(ref name) => Register::from_name(name)
                        .map(Operand::RegisterPointer)
                        .ok_or_else(|| Self::unexpected("register", &next)),
                    _ => Err(Self::unexpected("register, '[' or '<' after '&'", &next)),
                }
            }

            _ => Err(Self::unexpected("operand", &token)),
        }
    }

    fn parse_instruction(&mut self, mnemonic: Token) -> ParseResult<Node> {
        let name = mnemonic.literal.clone();

        let mut args = Vec::new();
        if matches!(self.tokens.peek(), Some(t) if Self::starts_operand(&t.kind)) {
            args.push(self.parse_operand()?);
            while self.peek_is(&TokenKind::Comma) {
                self.tokens.next(); // consume ','
                args.push(self.parse_operand()?);
            }
        }

        let shapes: Vec<Shape> = args.iter().map(Operand::shape).collect();
        match Instr::select(&name, &shapes) {
            Some(instr) => Ok(Node::Instruction(instr, args)),
            None => Err(ParseError::InvalidOperands {
                mnemonic: name,
                shape: describe_shapes(&shapes),
                line: mnemonic.line,
                column: mnemonic.column,
            }),
        }
    }

    fn parse_statement(&mut self) -> ParseResult<Node> {
        let token = self.next_token("statement")?;
        match &token.kind {
            TokenKind::Label(name) => Ok(Node::Label(name.clone())),
            TokenKind::Plus => self.parse_exported(),

            TokenKind::Ident(word) if word.eq_ignore_ascii_case("constant") => {
                self.parse_constant()
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("data8") => {
                self.parse_data(DataWidth::Byte, false)
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("data16") => {
                self.parse_data(DataWidth::Word, false)
            }
            TokenKind::Ident(word) if word.eq_ignore_ascii_case("structure") => {
                self.parse_structure(false)
            }
            TokenKind::Ident(word) if Instr::is_mnemonic(word) => {
                self.parse_instruction(token.clone())
            }

            TokenKind::Ident(word) => Err(ParseError::UnknownInstruction {
                name: word.clone(),
                line: token.line,
                column: token.column,
            }),
            _ => Err(Self::unexpected(
                "instruction, label, constant, data or structure",
                &token,
            )),
        }
    }

    // --------------------------------------

    pub fn parse(&mut self) -> ParseResult<Ast> {
        while self.tokens.peek().is_some() {
            let node = self.parse_statement()?;
            self.ast.push(node);
        }

        Ok(std::mem::take(&mut self.ast))
    }
}

/// Lexes and parses `src` in one go.
pub fn parse_source(src: &str) -> ParseResult<Ast> {
    let tokens = crate::lexer::Lexer::new(src).lex()?;
    Parser::new(tokens.into_iter()).parse()
}
