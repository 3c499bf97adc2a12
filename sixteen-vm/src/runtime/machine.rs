//! Core of the sixteen machine
//!
//! A register machine executing the instruction set from `sixteen_asm::isa` against
//! a memory-mapped address space. Arithmetic and bitwise results go to the
//! accumulator, except `inc`, `dec` and the shifts which work in place. Every
//! operation wraps at 16 bits.
//!
//! # Stack frames
//!
//! The stack grows down from `0xFFFE`. A call pushes `r1`..`r8`, the return address
//! and the size of the caller's frame, then points `fp` at the new top of stack. The
//! caller is expected to have pushed its arguments followed by their count, which
//! `ret` pops and discards after restoring the registers.

use sixteen_asm::debug;
use sixteen_asm::isa::{Instr, Register};
use sixteen_asm::log::{self, Level};

use crate::runtime::disasm;
use crate::runtime::errors::VmError;
use crate::runtime::memory::MemoryMapper;
use crate::runtime::registers::{BankSelect, Registers};

/// Initial stack and frame pointer: the last word of the address space.
pub const STACK_TOP: u16 = 0xFFFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Halted,
    /// The step budget ran out before `hlt`
    Paused,
}

#[derive(Debug)]
pub struct Machine {
    pub registers: Registers,
    pub memory: MemoryMapper,

    frame_size: u16,
    halted: bool,
    steps: u64,
}

impl Machine {
    pub fn new(memory: MemoryMapper, bank: BankSelect) -> Self {
        let mut registers = Registers::new(bank);
        registers.set(Register::Sp, STACK_TOP);
        registers.set(Register::Fp, STACK_TOP);

        Self {
            registers,
            memory,
            frame_size: 0,
            halted: false,
            steps: 0,
        }
    }

    pub fn get_register(&self, reg: Register) -> u16 {
        self.registers.get(reg)
    }

    pub fn set_register(&mut self, reg: Register, value: u16) {
        self.registers.set(reg, value);
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Copies `code` to `address` and points `ip` at it.
    pub fn load_program(&mut self, address: u16, code: &[u8]) -> Result<(), VmError> {
        self.memory.load(address, code)?;
        self.set_register(Register::Ip, address);
        self.halted = false;
        debug!("machine: loaded {} bytes at {:04X}", code.len(), address);
        Ok(())
    }

    // Fetching
    // --------------------------------------

    fn fetch(&mut self) -> Result<u8, VmError> {
        let ip = self.get_register(Register::Ip);
        let byte = self.memory.get8(ip)?;
        self.set_register(Register::Ip, ip.wrapping_add(1));
        Ok(byte)
    }

    fn fetch16(&mut self) -> Result<u16, VmError> {
        let ip = self.get_register(Register::Ip);
        let word = self.memory.get16(ip)?;
        self.set_register(Register::Ip, ip.wrapping_add(2));
        Ok(word)
    }

    /// Any byte names a register; out of range values wrap around.
    fn fetch_register(&mut self) -> Result<Register, VmError> {
        let byte = self.fetch()?;
        let index = byte % Register::COUNT as u8;
        Register::from_index(index).ok_or(VmError::UnknownRegister(index))
    }

    // Stack
    // --------------------------------------

    fn push(&mut self, value: u16) -> Result<(), VmError> {
        let sp = self.get_register(Register::Sp);
        self.memory.set16(sp, value)?;
        self.set_register(Register::Sp, sp.wrapping_sub(2));
        self.frame_size = self.frame_size.wrapping_add(2);
        Ok(())
    }

    fn pop(&mut self) -> Result<u16, VmError> {
        let sp = self.get_register(Register::Sp);
        let next = sp
            .checked_add(2)
            .filter(|next| *next <= STACK_TOP)
            .ok_or(VmError::StackUnderflow { sp })?;
        self.set_register(Register::Sp, next);
        self.frame_size = self.frame_size.wrapping_sub(2);
        Ok(self.memory.get16(next)?)
    }

    fn push_state(&mut self) -> Result<(), VmError> {
        for reg in Register::GENERAL {
            self.push(self.get_register(reg))?;
        }
        self.push(self.get_register(Register::Ip))?;
        self.push(self.frame_size.wrapping_add(2))?;

        self.set_register(Register::Fp, self.get_register(Register::Sp));
        self.frame_size = 0;
        Ok(())
    }

    fn pop_state(&mut self) -> Result<(), VmError> {
        let frame_address = self.get_register(Register::Fp);
        self.set_register(Register::Sp, frame_address);

        // The saved size counts its own slot, which has just been popped
        let saved_size = self.pop()?;
        self.frame_size = saved_size.wrapping_sub(2);

        let ip = self.pop()?;
        self.set_register(Register::Ip, ip);
        for reg in Register::GENERAL.iter().rev() {
            let value = self.pop()?;
            self.set_register(*reg, value);
        }

        let arg_count = self.pop()?;
        for _ in 0..arg_count {
            self.pop()?;
        }

        self.set_register(Register::Fp, frame_address.wrapping_add(saved_size));
        Ok(())
    }

    // Execution
    // --------------------------------------

    fn acc(&self) -> u16 {
        self.get_register(Register::Acc)
    }

    fn set_acc(&mut self, value: u16) {
        self.set_register(Register::Acc, value);
    }

    fn jump_if(&mut self, value: u16, address: u16, cond: fn(u16, u16) -> bool) {
        if cond(value, self.acc()) {
            self.set_register(Register::Ip, address);
        }
    }

    /// `reg <op> reg` into the accumulator
    fn reg_reg_acc(&mut self, op: fn(u16, u16) -> u16) -> Result<(), VmError> {
        let r1 = self.fetch_register()?;
        let r2 = self.fetch_register()?;
        let value = op(self.get_register(r1), self.get_register(r2));
        self.set_acc(value);
        Ok(())
    }

    /// `reg <op> $lit` into the accumulator
    fn reg_lit_acc(&mut self, op: fn(u16, u16) -> u16) -> Result<(), VmError> {
        let reg = self.fetch_register()?;
        let lit = self.fetch16()?;
        let value = op(self.get_register(reg), lit);
        self.set_acc(value);
        Ok(())
    }

    /// `$lit <op> reg` into the accumulator
    fn lit_reg_acc(&mut self, op: fn(u16, u16) -> u16) -> Result<(), VmError> {
        let lit = self.fetch16()?;
        let reg = self.fetch_register()?;
        let value = op(lit, self.get_register(reg));
        self.set_acc(value);
        Ok(())
    }

    fn shift(&mut self, reg: Register, amount: u16, left: bool) {
        let value = self.get_register(reg) as u32;
        let amount = amount as u32 % 32;
        let shifted = if left { value << amount } else { value >> amount };
        self.set_register(reg, shifted as u16);
    }

    fn execute(&mut self, instr: Instr) -> Result<(), VmError> {
        match instr {
            // Data movement
            Instr::MOV_LIT_REG => {
                let lit = self.fetch16()?;
                let reg = self.fetch_register()?;
                self.set_register(reg, lit);
            }
            Instr::MOV_REG_REG => {
                let from = self.fetch_register()?;
                let to = self.fetch_register()?;
                self.set_register(to, self.get_register(from));
            }
            Instr::MOV_REG_MEM => {
                let from = self.fetch_register()?;
                let address = self.fetch16()?;
                let value = self.get_register(from);
                self.memory.set16(address, value)?;
            }
            Instr::MOV_MEM_REG => {
                let address = self.fetch16()?;
                let to = self.fetch_register()?;
                let value = self.memory.get16(address)?;
                self.set_register(to, value);
            }
            Instr::MOV_LIT_MEM => {
                let value = self.fetch16()?;
                let address = self.fetch16()?;
                self.memory.set16(address, value)?;
            }
            Instr::MOV_REG_PTR_REG => {
                let ptr = self.fetch_register()?;
                let to = self.fetch_register()?;
                let value = self.memory.get16(self.get_register(ptr))?;
                self.set_register(to, value);
            }
            Instr::MOV_LIT_OFF_REG => {
                let base = self.fetch16()?;
                let offset = self.fetch_register()?;
                let to = self.fetch_register()?;
                let address = base.wrapping_add(self.get_register(offset));
                let value = self.memory.get16(address)?;
                self.set_register(to, value);
            }

            // Arithmetic
            Instr::ADD_REG_REG => self.reg_reg_acc(u16::wrapping_add)?,
            Instr::ADD_LIT_REG => self.lit_reg_acc(u16::wrapping_add)?,
            Instr::SUB_LIT_REG => self.lit_reg_acc(|lit, reg| reg.wrapping_sub(lit))?,
            Instr::SUB_REG_LIT => self.reg_lit_acc(|reg, lit| lit.wrapping_sub(reg))?,
            Instr::SUB_REG_REG => self.reg_reg_acc(u16::wrapping_sub)?,
            Instr::MUL_LIT_REG => self.lit_reg_acc(u16::wrapping_mul)?,
            Instr::MUL_REG_REG => self.reg_reg_acc(u16::wrapping_mul)?,
            Instr::INC_REG => {
                let reg = self.fetch_register()?;
                self.set_register(reg, self.get_register(reg).wrapping_add(1));
            }
            Instr::DEC_REG => {
                let reg = self.fetch_register()?;
                self.set_register(reg, self.get_register(reg).wrapping_sub(1));
            }

            // Bitwise
            Instr::LSF_REG_LIT | Instr::RSF_REG_LIT => {
                let reg = self.fetch_register()?;
                let amount = self.fetch()? as u16;
                self.shift(reg, amount, instr == Instr::LSF_REG_LIT);
            }
            Instr::LSF_REG_REG | Instr::RSF_REG_REG => {
                let reg = self.fetch_register()?;
                let by = self.fetch_register()?;
                self.shift(reg, self.get_register(by), instr == Instr::LSF_REG_REG);
            }
            Instr::AND_REG_LIT => self.reg_lit_acc(|a, b| a & b)?,
            Instr::AND_REG_REG => self.reg_reg_acc(|a, b| a & b)?,
            Instr::OR_REG_LIT => self.reg_lit_acc(|a, b| a | b)?,
            Instr::OR_REG_REG => self.reg_reg_acc(|a, b| a | b)?,
            Instr::XOR_REG_LIT => self.reg_lit_acc(|a, b| a ^ b)?,
            Instr::XOR_REG_REG => self.reg_reg_acc(|a, b| a ^ b)?,
            Instr::NOT => {
                let reg = self.fetch_register()?;
                self.set_acc(!self.get_register(reg));
            }

            // Conditional jumps against the accumulator
            Instr::JMP_NOT_EQ
            | Instr::JEQ_LIT
            | Instr::JLT_LIT
            | Instr::JGT_LIT
            | Instr::JLE_LIT
            | Instr::JGE_LIT => {
                let value = self.fetch16()?;
                let address = self.fetch16()?;
                self.jump_if(value, address, condition(instr));
            }
            Instr::JNE_REG
            | Instr::JEQ_REG
            | Instr::JLT_REG
            | Instr::JGT_REG
            | Instr::JLE_REG
            | Instr::JGE_REG => {
                let reg = self.fetch_register()?;
                let address = self.fetch16()?;
                self.jump_if(self.get_register(reg), address, condition(instr));
            }

            // Stack and subroutines
            Instr::PSH_LIT => {
                let value = self.fetch16()?;
                self.push(value)?;
            }
            Instr::PSH_REG => {
                let reg = self.fetch_register()?;
                self.push(self.get_register(reg))?;
            }
            Instr::POP => {
                let reg = self.fetch_register()?;
                let value = self.pop()?;
                self.set_register(reg, value);
            }
            Instr::CAL_LIT => {
                let address = self.fetch16()?;
                self.push_state()?;
                self.set_register(Register::Ip, address);
            }
            Instr::CAL_REG => {
                let reg = self.fetch_register()?;
                let address = self.get_register(reg);
                self.push_state()?;
                self.set_register(Register::Ip, address);
            }
            Instr::RET => self.pop_state()?,

            Instr::HLT => self.halted = true,
        }

        Ok(())
    }

    /// Executes one instruction and reports whether the machine has halted.
    /// Once halted, further steps do nothing.
    pub fn step(&mut self) -> Result<bool, VmError> {
        if self.halted {
            return Ok(true);
        }

        let address = self.get_register(Register::Ip);
        if log::enabled(Level::Debug) {
            let (text, _) = disasm::disasm_instruction(&self.memory, address);
            debug!("{:04X}: {}", address, text);
        }

        let opcode = self.fetch()?;
        let instr =
            Instr::try_from(opcode).map_err(|_| VmError::InvalidInstruction { opcode, address })?;
        self.execute(instr)?;
        self.steps += 1;

        Ok(self.halted)
    }

    /// Runs until `hlt`.
    pub fn run(&mut self) -> Result<(), VmError> {
        while !self.step()? {}
        Ok(())
    }

    /// Runs at most `max_steps` instructions. A paused machine can be resumed by
    /// calling this again.
    pub fn run_for(&mut self, max_steps: u64) -> Result<RunState, VmError> {
        for _ in 0..max_steps {
            if self.step()? {
                return Ok(RunState::Halted);
            }
        }

        Ok(if self.halted {
            RunState::Halted
        } else {
            RunState::Paused
        })
    }

    pub fn dump_ctx(&self) -> String {
        format!(
            "{}\nframe: {:04X}\nsteps: {}",
            self.registers.dump(),
            self.frame_size,
            self.steps
        )
    }
}

/// Jump condition as `value <cmp> acc`.
fn condition(instr: Instr) -> fn(u16, u16) -> bool {
    match instr {
        Instr::JMP_NOT_EQ | Instr::JNE_REG => |value, acc| value != acc,
        Instr::JEQ_LIT | Instr::JEQ_REG => |value, acc| value == acc,
        Instr::JLT_LIT | Instr::JLT_REG => |value, acc| value < acc,
        Instr::JGT_LIT | Instr::JGT_REG => |value, acc| value > acc,
        Instr::JLE_LIT | Instr::JLE_REG => |value, acc| value <= acc,
        _ => |value, acc| value >= acc,
    }
}
