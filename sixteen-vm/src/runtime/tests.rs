use std::io::Write;
use std::sync::atomic::AtomicU16;
use std::sync::{Arc, Mutex};

use sixteen_asm::demos;
use sixteen_asm::isa::{self, Arg, ArgKind, Instr, Register};

use crate::config::{MachineConfig, Range};
use crate::runtime::errors::{MemoryError, VmError};
use crate::runtime::machine::{Machine, RunState, STACK_TOP};
use crate::runtime::memory::{Memory, MemoryMapper};

fn machine(src: &str) -> Machine {
    let code = sixteen_asm::assemble(src).unwrap();
    let mut mach = MachineConfig::default().build(std::io::sink()).unwrap();
    mach.load_program(0, &code).unwrap();
    mach
}

fn demo(name: &str) -> Machine {
    machine(demos::find(name).unwrap())
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn countdown_drives_memory_to_zero() {
    let mut mach = demo("countdown");

    assert_eq!(mach.run_for(1).unwrap(), RunState::Paused);
    assert_eq!(mach.memory.get16(0x0050).unwrap(), 0x000A);

    mach.run().unwrap();
    assert!(mach.is_halted());
    assert_eq!(mach.memory.get16(0x0050).unwrap(), 0x0000);
    assert_eq!(mach.get_register(Register::Acc), 0);
    assert_eq!(mach.steps(), 1 + 10 * 4 + 1);
}

#[test]
fn run_for_pauses_and_resumes() {
    let mut mach = demo("countdown");
    assert_eq!(mach.run_for(10).unwrap(), RunState::Paused);
    assert_eq!(mach.steps(), 10);
    assert_eq!(mach.run_for(1000).unwrap(), RunState::Halted);
    assert_eq!(mach.run_for(5).unwrap(), RunState::Halted);
    assert_eq!(mach.steps(), 42);
}

#[test]
fn step_after_halt_does_nothing() {
    let mut mach = machine("hlt");
    assert!(mach.step().unwrap());
    let ip = mach.get_register(Register::Ip);
    assert!(mach.step().unwrap());
    assert_eq!(mach.get_register(Register::Ip), ip);
    assert_eq!(mach.steps(), 1);
}

#[test]
fn call_and_return_restore_the_caller() {
    let mut mach = demo("subroutine");
    mach.run().unwrap();

    // Arguments and their count are gone, only the final push remains
    assert_eq!(mach.get_register(Register::Sp), STACK_TOP - 2);
    assert_eq!(mach.get_register(Register::Fp), STACK_TOP);
    assert_eq!(mach.memory.get16(STACK_TOP).unwrap(), 0x4444);

    assert_eq!(mach.get_register(Register::R1), 0x1234);
    assert_eq!(mach.get_register(Register::R4), 0x5678);
    assert_eq!(mach.get_register(Register::R8), 0x0000);
}

#[test]
fn return_without_arguments_keeps_caller_pushes() {
    let mut mach = machine(
        "
  psh $3333
  psh $2222
  psh $1111
  psh $0000
  cal !sub
  hlt
sub:
  psh $0102
  mov $0001, r2
  ret
",
    );
    mach.run().unwrap();

    assert_eq!(mach.get_register(Register::Sp), STACK_TOP - 6);
    assert_eq!(mach.get_register(Register::Fp), STACK_TOP);
    assert_eq!(mach.get_register(Register::R2), 0);
}

#[test]
fn consecutive_calls_leave_no_trace() {
    let mut mach = machine(
        "
  psh $0000
  cal !sub
  psh $0000
  cal !sub
  hlt
sub:
  ret
",
    );
    mach.run().unwrap();

    assert_eq!(mach.get_register(Register::Sp), STACK_TOP);
    assert_eq!(mach.get_register(Register::Fp), STACK_TOP);
}

#[test]
fn subroutine_calling_twice_returns_to_its_caller() {
    let mut mach = machine(
        "
  psh $0000
  cal !outer
  hlt
outer:
  psh $00AB
  psh $0000
  cal !inner
  psh $0000
  cal !inner
  pop r1
  mov r1, &0100
  ret
inner:
  inc acc
  ret
",
    );
    assert_eq!(mach.run_for(100).unwrap(), RunState::Halted);

    assert_eq!(mach.get_register(Register::Acc), 2);
    assert_eq!(mach.memory.get16(0x0100).unwrap(), 0x00AB);
    assert_eq!(mach.get_register(Register::Sp), STACK_TOP);
    assert_eq!(mach.get_register(Register::Fp), STACK_TOP);
}

#[test]
fn call_through_register() {
    let mut mach = machine(
        "
  mov [!sub], r5
  psh $0000
  cal r5
  hlt
sub:
  mov $0042, acc
  ret
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::Acc), 0x0042);
    assert_eq!(mach.get_register(Register::Sp), STACK_TOP);
}

#[test]
fn bank_switching_preserves_each_bank() {
    let mut mach = demo("banking");
    mach.run().unwrap();

    assert_eq!(mach.get_register(Register::R1), 0xABCD);
    assert_eq!(mach.get_register(Register::R2), 0x1234);
    assert_eq!(mach.get_register(Register::Mb), 1);
}

#[test]
fn screen_receives_writes() {
    let out = SharedBuf::default();
    let code = sixteen_asm::assemble(demos::find("screen").unwrap()).unwrap();
    let mut mach = MachineConfig::default().build(out.clone()).unwrap();
    mach.load_program(0, &code).unwrap();
    mach.run().unwrap();

    let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
    assert!(text.starts_with("\x1b[2J"));
    assert!(text.contains("\x1b[1m\x1b[1;2HH"));
    assert!(text.ends_with("\x1b[1;16H)"));
}

#[test]
fn struct_members_and_constants() {
    let mut mach = demo("structs");
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R1), 3);
    assert_eq!(mach.get_register(Register::R2), 4);
    assert_eq!(mach.get_register(Register::Acc), 42);
}

#[test]
fn subtraction_operand_order() {
    let mut mach = machine(
        "
  mov $0010, r1
  sub $0003, r1
  mov acc, r2
  sub r1, $0003
  mov acc, r3
  sub r1, r2
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R2), 0x000D);
    assert_eq!(mach.get_register(Register::R3), 0xFFF3);
    assert_eq!(mach.get_register(Register::Acc), 0x0003);
}

#[test]
fn arithmetic_wraps() {
    let mut mach = machine(
        "
  mov $FFFF, r1
  add $0002, r1
  mov acc, r2
  inc r1
  mov $0000, r3
  dec r3
  mul $0100, r3
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R2), 0x0001);
    assert_eq!(mach.get_register(Register::R1), 0x0000);
    assert_eq!(mach.get_register(Register::R3), 0xFFFF);
    assert_eq!(mach.get_register(Register::Acc), 0xFF00);
}

#[test]
fn shifts_and_bitwise() {
    let mut mach = machine(
        "
  mov $00F0, r1
  lsf r1, $04
  mov r1, r7
  mov $0004, r2
  rsf r1, r2
  and r1, $0030
  mov acc, r3
  or r1, $000F
  mov acc, r4
  xor r1, r1
  mov acc, r5
  mov $FFFF, r6
  lsf r6, $10
  not r1
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R7), 0x0F00);
    assert_eq!(mach.get_register(Register::R1), 0x00F0);
    assert_eq!(mach.get_register(Register::R3), 0x0030);
    assert_eq!(mach.get_register(Register::R4), 0x00FF);
    assert_eq!(mach.get_register(Register::R5), 0x0000);
    assert_eq!(mach.get_register(Register::R6), 0x0000);
    assert_eq!(mach.get_register(Register::Acc), 0xFF0F);
}

#[test]
fn jumps_compare_against_accumulator() {
    let mut mach = machine(
        "
  mov $0005, acc
  jlt $0003, &[!less]
  mov $0001, r1
less:
  jgt $0003, &[!never]
  mov $0003, r4
  jge r4, &[!never]
  jle r4, &[!done]
  mov $0002, r2
done:
  hlt
never:
  mov $0003, r3
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R1), 0);
    assert_eq!(mach.get_register(Register::R2), 0);
    assert_eq!(mach.get_register(Register::R3), 0);
}

#[test]
fn register_pointer_loads() {
    let mut mach = machine(
        "
  mov $1234, &0100
  mov $0100, r1
  mov &r1, r2
  mov $0004, r3
  mov $00FC, &r3, r4
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R2), 0x1234);
    assert_eq!(mach.get_register(Register::R4), 0x1234);
}

#[test]
fn push_and_pop() {
    let mut mach = machine(
        "
  psh $00AA
  mov $00BB, r1
  psh r1
  pop r2
  pop r3
  hlt
",
    );
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R2), 0x00BB);
    assert_eq!(mach.get_register(Register::R3), 0x00AA);
    assert_eq!(mach.get_register(Register::Sp), STACK_TOP);
}

#[test]
fn pop_on_empty_stack_is_an_error() {
    let mut mach = machine("pop r1\nhlt");
    assert!(matches!(
        mach.step(),
        Err(VmError::StackUnderflow { sp: STACK_TOP })
    ));
    assert_eq!(mach.get_register(Register::R1), 0);
    assert_eq!(mach.get_register(Register::Sp), STACK_TOP);
}

#[test]
fn return_without_a_frame_is_an_error() {
    let mut mach = machine("ret");
    assert!(matches!(
        mach.step(),
        Err(VmError::StackUnderflow { sp: STACK_TOP })
    ));
}

#[test]
fn program_past_the_end_of_memory_is_rejected() {
    let mut mach = MachineConfig::default().build(std::io::sink()).unwrap();
    assert!(matches!(
        mach.load_program(0xFFF0, &[0xFF; 0x20]),
        Err(VmError::Memory(MemoryError::LoadOverflow { address: 0xFFF0, len: 0x20 }))
    ));
    assert_eq!(mach.memory.get8(0x0000).unwrap(), 0x00);
}

#[test]
fn register_bytes_wrap_around() {
    let mut mach = MachineConfig::default().build(std::io::sink()).unwrap();
    // 15 % 13 names r1
    mach.load_program(0, &[Instr::MOV_LIT_REG.opcode(), 0x00, 0x07, 15, Instr::HLT.opcode()])
        .unwrap();
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R1), 7);
}

#[test]
fn invalid_opcode_is_an_error() {
    let mut mach = MachineConfig::default().build(std::io::sink()).unwrap();
    mach.load_program(0x0010, &[0x00]).unwrap();
    assert!(matches!(
        mach.step(),
        Err(VmError::InvalidInstruction {
            opcode: 0x00,
            address: 0x0010
        })
    ));
}

#[test]
fn unmapped_access_is_an_error() {
    let bank = Arc::new(AtomicU16::new(0));
    let mut mapper = MemoryMapper::new();
    mapper.map(Memory::new(0x100), 0x0000, 0x00FF, true).unwrap();
    let mut mach = Machine::new(mapper, bank);

    let code = sixteen_asm::assemble("mov $01, &9000").unwrap();
    mach.load_program(0, &code).unwrap();
    assert!(matches!(
        mach.step(),
        Err(VmError::Memory(MemoryError::Unmapped(0x9000)))
    ));
}

#[test]
fn custom_layout() {
    let config = MachineConfig {
        ram: vec![Range::new(0x0000, 0x00FF), Range::new(0xFF00, 0xFFFF)],
        screen: None,
        banked: None,
        ..MachineConfig::default()
    };
    let mut mach = config.build(std::io::sink()).unwrap();
    let code = sixteen_asm::assemble("psh $0001\npop r1\nhlt").unwrap();
    mach.load_program(config.load_address, &code).unwrap();
    mach.run().unwrap();
    assert_eq!(mach.get_register(Register::R1), 1);
}

#[test]
fn every_instruction_consumes_its_size() {
    for instr in Instr::ALL.iter().copied().filter(|i| *i != Instr::RET) {
        let size = instr.size() as u16;
        let args: Vec<Arg> = instr
            .format()
            .args()
            .iter()
            .map(|kind| match kind {
                ArgKind::Reg => Arg::Reg(Register::R1.index()),
                ArgKind::Word => Arg::Word(size),
                ArgKind::Byte => Arg::Byte(1),
            })
            .collect();
        let mut code = Vec::new();
        isa::encode(instr, &args, &mut code).unwrap();

        let mut mach = MachineConfig::default().build(std::io::sink()).unwrap();
        mach.load_program(0, &code).unwrap();
        // Register operands hold the same target as word operands
        mach.set_register(Register::R1, size);
        // Something for pop to take
        mach.set_register(Register::Sp, STACK_TOP - 2);
        mach.step().unwrap();

        assert_eq!(mach.get_register(Register::Ip), size, "{}", instr);
    }
}
