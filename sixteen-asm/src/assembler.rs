//! Assembler for the sixteen machine
//!
//! Two-pass assembler.
//!
//! The first pass walks the AST with a running address, binding labels, constants,
//! data blocks and structures. The second pass emits data and instructions, resolving
//! variables and struct member accesses against the tables built by the first pass,
//! so a jump may target a label defined further down.

use std::collections::HashMap;

use crate::debug;
use crate::errors::{AsmError, EncodeError};
use crate::expr::{Expr, InterpretAs, Leaf};
use crate::isa::{self, Arg, ArgKind, Instr};
use crate::parser::{Ast, DataWidth, Member, Node, Operand};

/// Size of the address space programs are assembled for.
pub const ADDRESS_SPACE: usize = 0x1_0000;

/// A structure member with its byte offset from the start of the structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub offset: u16,
    pub size: u16,
}

#[derive(Debug, Clone, Default)]
pub struct Assembler {
    pub ptr: usize, // current address during the first pass

    // Labels, constants and data blocks
    pub symbols: HashMap<String, u16>,
    // Member layouts of every structure
    pub structures: HashMap<String, Vec<Field>>,
    // Names marked with `+`, in source order
    pub exports: Vec<String>,
}

fn layout(members: &[Member]) -> Vec<Field> {
    let mut offset: u16 = 0;
    members
        .iter()
        .map(|m| {
            let field = Field {
                name: m.name.clone(),
                offset,
                size: m.size,
            };
            offset = offset.wrapping_add(m.size);
            field
        })
        .collect()
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.ptr = 0;
        self.symbols.clear();
        self.structures.clear();
        self.exports.clear();
    }

    fn address(&self) -> Result<u16, AsmError> {
        u16::try_from(self.ptr).map_err(|_| AsmError::ProgramTooLarge { size: self.ptr })
    }

    /// Labels, constants, data blocks and structures share one namespace.
    fn check_free(&self, name: &str) -> Result<(), AsmError> {
        if self.symbols.contains_key(name) || self.structures.contains_key(name) {
            return Err(AsmError::DuplicateBinding {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn bind(&mut self, name: &str, value: u16) -> Result<(), AsmError> {
        self.check_free(name)?;
        self.symbols.insert(name.to_string(), value);
        Ok(())
    }

    // First pass
    // --------------------------------------

    fn resolve_pass(&mut self, ast: &Ast) -> Result<(), AsmError> {
        for node in ast {
            match node {
                Node::Label(name) => {
                    let address = self.address()?;
                    self.bind(name, address)?;
                    debug!("assembler: label {} at {:04X}", name, address);
                }

                Node::Constant { name, value } => {
                    self.bind(name, *value)?;
                    debug!("assembler: constant {} = {:04X}", name, value);
                }

                Node::Data {
                    name,
                    width,
                    values,
                    exported,
                } => {
                    let address = self.address()?;
                    self.bind(name, address)?;
                    if *exported {
                        self.exports.push(name.clone());
                    }
                    self.ptr += values.len() * width.bytes();
                    debug!("assembler: data {} at {:04X}", name, address);
                }

                Node::Structure {
                    name,
                    members,
                    exported,
                } => {
                    self.check_free(name)?;
                    self.structures.insert(name.clone(), layout(members));
                    if *exported {
                        self.exports.push(name.clone());
                    }
                    debug!("assembler: structure {} ({} members)", name, members.len());
                }

                Node::Instruction(instr, _) => self.ptr += instr.size(),
            }
        }

        if self.ptr > ADDRESS_SPACE {
            return Err(AsmError::ProgramTooLarge { size: self.ptr });
        }

        Ok(())
    }

    // Second pass
    // --------------------------------------

    fn lookup(&self, name: &str) -> Result<u16, AsmError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| AsmError::UnresolvedSymbol {
                name: name.to_string(),
            })
    }

    fn member_address(&self, access: &InterpretAs) -> Result<u16, AsmError> {
        let fields =
            self.structures
                .get(&access.structure)
                .ok_or_else(|| AsmError::UnresolvedStructure {
                    name: access.structure.clone(),
                })?;
        let field = fields
            .iter()
            .find(|f| f.name == access.member)
            .ok_or_else(|| AsmError::UnresolvedMember {
                structure: access.structure.clone(),
                member: access.member.clone(),
            })?;

        Ok(self.lookup(&access.symbol)?.wrapping_add(field.offset))
    }

    fn eval(&self, expr: &Expr) -> Result<u16, AsmError> {
        expr.fold(&|leaf| match leaf {
            Leaf::Variable(name) => self.lookup(name),
            Leaf::InterpretAs(access) => self.member_address(access),
        })
    }

    fn value(&self, operand: &Operand) -> Result<u16, AsmError> {
        match operand {
            Operand::HexLiteral(value) | Operand::Address(value) => Ok(*value),
            Operand::Variable(name) => self.lookup(name),
            Operand::Expression(expr) | Operand::MemoryExpression(expr) => self.eval(expr),
            Operand::InterpretAs(access) => self.member_address(access),
            Operand::Register(reg) | Operand::RegisterPointer(reg) => Ok(reg.index() as u16),
        }
    }

    fn encode_arg(
        &self,
        instr: Instr,
        index: usize,
        kind: ArgKind,
        operand: &Operand,
    ) -> Result<Arg, AsmError> {
        let arg = match (kind, operand) {
            (ArgKind::Reg, Operand::Register(reg) | Operand::RegisterPointer(reg)) => {
                Arg::Reg(reg.index())
            }
            (ArgKind::Reg, _) => {
                return Err(EncodeError::OperandKind {
                    instr: instr.name(),
                    index,
                    expected: "register",
                }
                .into());
            }
            (ArgKind::Word, _) => Arg::Word(self.value(operand)?),
            (ArgKind::Byte, _) => Arg::Byte((self.value(operand)? & 0xFF) as u8),
        };
        Ok(arg)
    }

    fn emit_instruction(
        &self,
        instr: Instr,
        operands: &[Operand],
        out: &mut Vec<u8>,
    ) -> Result<(), AsmError> {
        let kinds = instr.format().args();
        if kinds.len() != operands.len() {
            return Err(EncodeError::Arity {
                instr: instr.name(),
                expected: kinds.len(),
                found: operands.len(),
            }
            .into());
        }

        let args = kinds
            .iter()
            .zip(operands)
            .enumerate()
            .map(|(i, (kind, operand))| self.encode_arg(instr, i, *kind, operand))
            .collect::<Result<Vec<_>, _>>()?;

        isa::encode(instr, &args, out)?;
        Ok(())
    }

    fn emit_pass(&self, ast: &Ast) -> Result<Vec<u8>, AsmError> {
        let mut out = Vec::with_capacity(self.ptr);

        for node in ast {
            match node {
                Node::Data { width, values, .. } => {
                    for value in values {
                        match width {
                            DataWidth::Byte => out.push((value & 0xFF) as u8),
                            DataWidth::Word => out.extend_from_slice(&value.to_be_bytes()),
                        }
                    }
                }

                Node::Instruction(instr, operands) => {
                    self.emit_instruction(*instr, operands, &mut out)?
                }

                // Metadata only, bound in the first pass
                Node::Label(_) | Node::Constant { .. } | Node::Structure { .. } => {}
            }
        }

        Ok(out)
    }

    // --------------------------------------

    /// Assembles `ast` into machine code. Tables from a previous run are discarded.
    /// On error no bytes are returned.
    pub fn assemble(&mut self, ast: &Ast) -> Result<Vec<u8>, AsmError> {
        self.reset();
        self.resolve_pass(ast)?;
        let code = self.emit_pass(ast)?;

        debug!(
            "assembler: {} bytes, {} symbols, {} structures",
            code.len(),
            self.symbols.len(),
            self.structures.len()
        );
        Ok(code)
    }

    /// Symbol table by address, then structure layouts by name.
    pub fn listing(&self) -> String {
        let mut symbols: Vec<_> = self.symbols.iter().collect();
        symbols.sort_by(|(a, x), (b, y)| x.cmp(y).then_with(|| a.cmp(b)));

        let mut structures: Vec<_> = self.structures.iter().collect();
        structures.sort_by_key(|(name, _)| name.as_str());

        let mut out = String::new();
        for (name, value) in symbols {
            out.push_str(&format!("{:04X}  {}\n", value, name));
        }
        for (name, fields) in structures {
            let members = fields
                .iter()
                .map(|f| format!("{}@{}", f.name, f.offset))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("struct {} {{ {} }}\n", name, members));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParseError;
    use crate::parser::parse_source;

    const COUNTDOWN: &str = "
start:
  mov $0A, &0050
loop:
  mov &0050, accumulator
  dec accumulator
  mov accumulator, &0050
  jne $00, &[!loop]
end:
  hlt
";

    fn assemble(src: &str) -> Result<Vec<u8>, AsmError> {
        let ast = parse_source(src)?;
        Assembler::new().assemble(&ast)
    }

    #[test]
    fn countdown_program() {
        let mut asm = Assembler::new();
        let code = asm.assemble(&parse_source(COUNTDOWN).unwrap()).unwrap();

        #[rustfmt::skip]
        let expected = vec![
            0x1B, 0x00, 0x0A, 0x00, 0x50, // mov $0A, &0050
            0x13, 0x00, 0x50, 0x01,       // mov &0050, acc
            0x36, 0x01,                   // dec acc
            0x12, 0x01, 0x00, 0x50,       // mov acc, &0050
            0x15, 0x00, 0x00, 0x00, 0x05, // jne $00, &[!loop]
            0xFF,                         // hlt
        ];
        assert_eq!(code, expected);

        assert_eq!(asm.symbols["start"], 0);
        assert_eq!(asm.symbols["loop"], 5);
        assert_eq!(asm.symbols["end"], 20);
    }

    #[test]
    fn assembly_is_deterministic() {
        assert_eq!(assemble(COUNTDOWN).unwrap(), assemble(COUNTDOWN).unwrap());
    }

    #[test]
    fn forward_and_backward_references_agree() {
        let forward = assemble("jeq $01, &[!target]\ntarget:\nhlt").unwrap();
        let backward = assemble("jeq $01, &0005\ntarget:\nhlt").unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn names_collide_across_kinds() {
        assert_eq!(
            assemble("foo:\nconstant foo = $01"),
            Err(AsmError::DuplicateBinding { name: "foo".into() })
        );
        assert_eq!(
            assemble("structure foo { a: $01 }\ndata8 foo = { $01 }"),
            Err(AsmError::DuplicateBinding { name: "foo".into() })
        );
        assert_eq!(
            assemble("foo:\nfoo:"),
            Err(AsmError::DuplicateBinding { name: "foo".into() })
        );
        assert!(assemble("foo:\nhlt").is_ok());
    }

    #[test]
    fn unresolved_names() {
        assert_eq!(
            assemble("psh !missing"),
            Err(AsmError::UnresolvedSymbol {
                name: "missing".into()
            })
        );
        assert_eq!(
            assemble("psh [<Nope> a.b]"),
            Err(AsmError::UnresolvedStructure {
                name: "Nope".into()
            })
        );
        assert_eq!(
            assemble("structure P { x: $02 }\np:\npsh [<P> p.z]"),
            Err(AsmError::UnresolvedMember {
                structure: "P".into(),
                member: "z".into()
            })
        );
    }

    #[test]
    fn parse_errors_propagate() {
        assert!(matches!(
            assemble("bogus r1"),
            Err(AsmError::Parse(ParseError::UnknownInstruction { .. }))
        ));
    }

    #[test]
    fn literals_are_big_endian() {
        let code = assemble("mov $0A50, &0102").unwrap();
        assert_eq!(code, vec![0x1B, 0x0A, 0x50, 0x01, 0x02]);
    }

    #[test]
    fn expression_precedence_in_source() {
        let code = assemble("psh [$05 * $02 + $03]").unwrap();
        assert_eq!(code, vec![Instr::PSH_LIT.opcode(), 0x00, 0x0D]);

        let code = assemble("psh [$05 * ($02 + $03)]").unwrap();
        assert_eq!(code, vec![Instr::PSH_LIT.opcode(), 0x00, 0x19]);
    }

    #[test]
    fn data_blocks_and_constants() {
        let src = "
constant base = $1000
data8 bytes = { $01, $1FF }
data16 words = { $ABCD }
mov [!base + !words], r1
";
        let mut asm = Assembler::new();
        let code = asm.assemble(&parse_source(src).unwrap()).unwrap();

        assert_eq!(asm.symbols["bytes"], 0);
        assert_eq!(asm.symbols["words"], 2);
        assert_eq!(
            code,
            vec![0x01, 0xFF, 0xAB, 0xCD, Instr::MOV_LIT_REG.opcode(), 0x10, 0x02, 0x02]
        );
    }

    #[test]
    fn struct_member_offsets() {
        let src = "
+structure Rect { x: $02, y: $02, w: $01, h: $01 }
+data8 shape = { $00, $00, $00, $00, $08, $04 }
mov &<Rect> shape.h, r1
psh <Rect> shape.w
";
        let mut asm = Assembler::new();
        let code = asm.assemble(&parse_source(src).unwrap()).unwrap();

        assert_eq!(asm.structures["Rect"][3].offset, 5);
        assert_eq!(asm.exports, vec!["Rect".to_string(), "shape".to_string()]);
        assert_eq!(
            &code[6..],
            &[
                Instr::MOV_MEM_REG.opcode(),
                0x00,
                0x05,
                0x02,
                Instr::PSH_LIT.opcode(),
                0x00,
                0x04
            ]
        );
    }

    #[test]
    fn member_access_inside_expression() {
        let src = "
structure Pair { a: $02, b: $02 }
data16 pairs = { $0000, $0000, $0000, $0000 }
psh [<Pair> pairs.b + !pairs * $02]
";
        let code = assemble(src).unwrap();
        // pairs is at 0, so the expression is 2 + 0 * 2
        assert_eq!(&code[8..], &[Instr::PSH_LIT.opcode(), 0x00, 0x02]);

        assert!(matches!(
            assemble("psh [<Pair> nowhere.b + $01]"),
            Err(AsmError::UnresolvedStructure { .. })
        ));
    }

    #[test]
    fn listing_is_sorted() {
        let src = "
structure Zed { z: $01 }
structure Alpha { a: $02, b: $01 }
constant two = $0000
one:
  hlt
";
        let mut asm = Assembler::new();
        asm.assemble(&parse_source(src).unwrap()).unwrap();

        let expected = "\
0000  one
0000  two
struct Alpha { a@0, b@2 }
struct Zed { z@0 }
";
        for _ in 0..4 {
            assert_eq!(asm.listing(), expected);
        }
    }

    #[test]
    fn byte_operand_keeps_low_byte() {
        let code = assemble("lsf r2, $0103").unwrap();
        assert_eq!(code, vec![Instr::LSF_REG_LIT.opcode(), 0x03, 0x03]);
    }

    #[test]
    fn register_pointer_forms() {
        let code = assemble("mov &r1, r2\nmov $0100, &r3, acc").unwrap();
        assert_eq!(
            code,
            vec![
                Instr::MOV_REG_PTR_REG.opcode(),
                0x02,
                0x03,
                Instr::MOV_LIT_OFF_REG.opcode(),
                0x01,
                0x00,
                0x04,
                0x01
            ]
        );
    }

    #[test]
    fn program_too_large() {
        // 0x3334 five-byte instructions
        let mut src = String::new();
        for _ in 0..0x3334 {
            src.push_str("mov $01, &02\n");
        }
        assert!(matches!(
            assemble(&src),
            Err(AsmError::ProgramTooLarge { .. })
        ));
    }

    #[test]
    fn tables_reset_between_runs() {
        let mut asm = Assembler::new();
        asm.assemble(&parse_source("foo:\nhlt").unwrap()).unwrap();
        asm.assemble(&parse_source("foo:\nhlt").unwrap()).unwrap();
        assert_eq!(asm.symbols.len(), 1);
    }
}
