//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 without decimal mode. This core executes
//! the full documented instruction set with cycle counts, page-crossing
//! penalties, and the delayed interrupt-disable behavior VBlank-heavy
//! games depend on.

use std::fmt;

/// NMI vector location
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector location
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector location
pub const IRQ_VECTOR: u16 = 0xFFFE;

// Pending interrupt bits
const PENDING_NMI: u8 = 1 << 0;
const PENDING_IRQ: u8 = 1 << 1;
const PENDING_I_CHANGE: u8 = 1 << 2;

/// Memory bus as seen from the CPU.
///
/// The system bus implements this to route reads and writes to RAM, PPU
/// registers, controllers and PRG ROM; tests drive the CPU with a flat
/// 64KB RAM implementation instead.
pub trait Bus {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy)]
pub struct CpuRegisters {
    pub a: u8,   // Accumulator
    pub x: u8,   // X index register
    pub y: u8,   // Y index register
    pub sp: u8,  // Stack pointer (page 1)
    pub pc: u16, // Program counter
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            pc: 0, // Set from the reset vector
        }
    }
}

/// CPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const INTERRUPT: u8 = 0b0000_0100;
    pub const DECIMAL: u8 = 0b0000_1000;
    pub const BREAK: u8 = 0b0001_0000;
    pub const UNUSED: u8 = 0b0010_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;

    pub fn new(flags: u8) -> Self {
        Self(flags)
    }

    /// Raw flag byte
    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn decimal(&self) -> bool {
        (self.0 & Self::DECIMAL) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    fn set(&mut self, flag: u8, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn set_carry(&mut self, value: bool) {
        self.set(Self::CARRY, value);
    }

    pub fn set_zero(&mut self, value: bool) {
        self.set(Self::ZERO, value);
    }

    pub fn set_interrupt(&mut self, value: bool) {
        self.set(Self::INTERRUPT, value);
    }

    pub fn set_decimal(&mut self, value: bool) {
        self.set(Self::DECIMAL, value);
    }

    pub fn set_overflow(&mut self, value: bool) {
        self.set(Self::OVERFLOW, value);
    }

    pub fn set_negative(&mut self, value: bool) {
        self.set(Self::NEGATIVE, value);
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} D:{} V:{} N:{}",
            self.carry() as u8,
            self.zero() as u8,
            self.interrupt() as u8,
            self.decimal() as u8,
            self.overflow() as u8,
            self.negative() as u8
        )
    }
}

/// Interrupt kinds a device can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Non-maskable interrupt (vector $FFFA)
    Nmi,
    /// Maskable interrupt (vector $FFFE); latched even while I is set
    Irq,
}

/// Instruction mnemonics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    LDA, LDX, LDY,
    STA, STX, STY,
    TAX, TAY, TSX, TXA, TXS, TYA,
    PHA, PHP, PLA, PLP,
    AND, ORA, EOR, BIT,
    ADC, SBC,
    CMP, CPX, CPY,
    INC, DEC, INX, INY, DEX, DEY,
    ASL, LSR, ROL, ROR,
    JMP, JSR, RTS,
    BCC, BCS, BEQ, BNE, BMI, BPL, BVC, BVS,
    CLC, CLD, CLI, CLV, SEC, SED, SEI,
    BRK, NOP, RTI,
}

/// Addressing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

/// Decoded instruction info
#[derive(Debug, Clone, Copy)]
pub struct InstructionInfo {
    pub opcode: Opcode,
    pub mode: AddressingMode,
    pub cycles: u8,
    /// Extra cycle when the effective address crosses a page
    pub page_cycle: bool,
}

const fn instr(opcode: Opcode, mode: AddressingMode, cycles: u8, page_cycle: bool) -> InstructionInfo {
    InstructionInfo {
        opcode,
        mode,
        cycles,
        page_cycle,
    }
}

/// Decode an opcode byte into instruction info.
///
/// Returns `None` for the undocumented opcodes; the step routine turns
/// that into a fatal [`CpuError::IllegalOpcode`].
pub fn decode(byte: u8) -> Option<InstructionInfo> {
    use AddressingMode::*;
    use Opcode::*;

    let info = match byte {
        // Load
        0xA9 => instr(LDA, Immediate, 2, false),
        0xA5 => instr(LDA, ZeroPage, 3, false),
        0xB5 => instr(LDA, ZeroPageX, 4, false),
        0xAD => instr(LDA, Absolute, 4, false),
        0xBD => instr(LDA, AbsoluteX, 4, true),
        0xB9 => instr(LDA, AbsoluteY, 4, true),
        0xA1 => instr(LDA, IndirectX, 6, false),
        0xB1 => instr(LDA, IndirectY, 5, true),

        0xA2 => instr(LDX, Immediate, 2, false),
        0xA6 => instr(LDX, ZeroPage, 3, false),
        0xB6 => instr(LDX, ZeroPageY, 4, false),
        0xAE => instr(LDX, Absolute, 4, false),
        0xBE => instr(LDX, AbsoluteY, 4, true),

        0xA0 => instr(LDY, Immediate, 2, false),
        0xA4 => instr(LDY, ZeroPage, 3, false),
        0xB4 => instr(LDY, ZeroPageX, 4, false),
        0xAC => instr(LDY, Absolute, 4, false),
        0xBC => instr(LDY, AbsoluteX, 4, true),

        // Store
        0x85 => instr(STA, ZeroPage, 3, false),
        0x95 => instr(STA, ZeroPageX, 4, false),
        0x8D => instr(STA, Absolute, 4, false),
        0x9D => instr(STA, AbsoluteX, 5, false),
        0x99 => instr(STA, AbsoluteY, 5, false),
        0x81 => instr(STA, IndirectX, 6, false),
        0x91 => instr(STA, IndirectY, 6, false),

        0x86 => instr(STX, ZeroPage, 3, false),
        0x96 => instr(STX, ZeroPageY, 4, false),
        0x8E => instr(STX, Absolute, 4, false),

        0x84 => instr(STY, ZeroPage, 3, false),
        0x94 => instr(STY, ZeroPageX, 4, false),
        0x8C => instr(STY, Absolute, 4, false),

        // Register transfers
        0xAA => instr(TAX, Implied, 2, false),
        0xA8 => instr(TAY, Implied, 2, false),
        0xBA => instr(TSX, Implied, 2, false),
        0x8A => instr(TXA, Implied, 2, false),
        0x9A => instr(TXS, Implied, 2, false),
        0x98 => instr(TYA, Implied, 2, false),

        // Stack
        0x48 => instr(PHA, Implied, 3, false),
        0x08 => instr(PHP, Implied, 3, false),
        0x68 => instr(PLA, Implied, 4, false),
        0x28 => instr(PLP, Implied, 4, false),

        // Logical
        0x29 => instr(AND, Immediate, 2, false),
        0x25 => instr(AND, ZeroPage, 3, false),
        0x35 => instr(AND, ZeroPageX, 4, false),
        0x2D => instr(AND, Absolute, 4, false),
        0x3D => instr(AND, AbsoluteX, 4, true),
        0x39 => instr(AND, AbsoluteY, 4, true),
        0x21 => instr(AND, IndirectX, 6, false),
        0x31 => instr(AND, IndirectY, 5, true),

        0x09 => instr(ORA, Immediate, 2, false),
        0x05 => instr(ORA, ZeroPage, 3, false),
        0x15 => instr(ORA, ZeroPageX, 4, false),
        0x0D => instr(ORA, Absolute, 4, false),
        0x1D => instr(ORA, AbsoluteX, 4, true),
        0x19 => instr(ORA, AbsoluteY, 4, true),
        0x01 => instr(ORA, IndirectX, 6, false),
        0x11 => instr(ORA, IndirectY, 5, true),

        0x49 => instr(EOR, Immediate, 2, false),
        0x45 => instr(EOR, ZeroPage, 3, false),
        0x55 => instr(EOR, ZeroPageX, 4, false),
        0x4D => instr(EOR, Absolute, 4, false),
        0x5D => instr(EOR, AbsoluteX, 4, true),
        0x59 => instr(EOR, AbsoluteY, 4, true),
        0x41 => instr(EOR, IndirectX, 6, false),
        0x51 => instr(EOR, IndirectY, 5, true),

        0x24 => instr(BIT, ZeroPage, 3, false),
        0x2C => instr(BIT, Absolute, 4, false),

        // Arithmetic
        0x69 => instr(ADC, Immediate, 2, false),
        0x65 => instr(ADC, ZeroPage, 3, false),
        0x75 => instr(ADC, ZeroPageX, 4, false),
        0x6D => instr(ADC, Absolute, 4, false),
        0x7D => instr(ADC, AbsoluteX, 4, true),
        0x79 => instr(ADC, AbsoluteY, 4, true),
        0x61 => instr(ADC, IndirectX, 6, false),
        0x71 => instr(ADC, IndirectY, 5, true),

        0xE9 => instr(SBC, Immediate, 2, false),
        0xE5 => instr(SBC, ZeroPage, 3, false),
        0xF5 => instr(SBC, ZeroPageX, 4, false),
        0xED => instr(SBC, Absolute, 4, false),
        0xFD => instr(SBC, AbsoluteX, 4, true),
        0xF9 => instr(SBC, AbsoluteY, 4, true),
        0xE1 => instr(SBC, IndirectX, 6, false),
        0xF1 => instr(SBC, IndirectY, 5, true),

        // Compare
        0xC9 => instr(CMP, Immediate, 2, false),
        0xC5 => instr(CMP, ZeroPage, 3, false),
        0xD5 => instr(CMP, ZeroPageX, 4, false),
        0xCD => instr(CMP, Absolute, 4, false),
        0xDD => instr(CMP, AbsoluteX, 4, true),
        0xD9 => instr(CMP, AbsoluteY, 4, true),
        0xC1 => instr(CMP, IndirectX, 6, false),
        0xD1 => instr(CMP, IndirectY, 5, true),

        0xE0 => instr(CPX, Immediate, 2, false),
        0xE4 => instr(CPX, ZeroPage, 3, false),
        0xEC => instr(CPX, Absolute, 4, false),

        0xC0 => instr(CPY, Immediate, 2, false),
        0xC4 => instr(CPY, ZeroPage, 3, false),
        0xCC => instr(CPY, Absolute, 4, false),

        // Increment / decrement
        0xE6 => instr(INC, ZeroPage, 5, false),
        0xF6 => instr(INC, ZeroPageX, 6, false),
        0xEE => instr(INC, Absolute, 6, false),
        0xFE => instr(INC, AbsoluteX, 7, false),

        0xC6 => instr(DEC, ZeroPage, 5, false),
        0xD6 => instr(DEC, ZeroPageX, 6, false),
        0xCE => instr(DEC, Absolute, 6, false),
        0xDE => instr(DEC, AbsoluteX, 7, false),

        0xE8 => instr(INX, Implied, 2, false),
        0xC8 => instr(INY, Implied, 2, false),
        0xCA => instr(DEX, Implied, 2, false),
        0x88 => instr(DEY, Implied, 2, false),

        // Shifts and rotates
        0x0A => instr(ASL, Accumulator, 2, false),
        0x06 => instr(ASL, ZeroPage, 5, false),
        0x16 => instr(ASL, ZeroPageX, 6, false),
        0x0E => instr(ASL, Absolute, 6, false),
        0x1E => instr(ASL, AbsoluteX, 7, false),

        0x4A => instr(LSR, Accumulator, 2, false),
        0x46 => instr(LSR, ZeroPage, 5, false),
        0x56 => instr(LSR, ZeroPageX, 6, false),
        0x4E => instr(LSR, Absolute, 6, false),
        0x5E => instr(LSR, AbsoluteX, 7, false),

        0x2A => instr(ROL, Accumulator, 2, false),
        0x26 => instr(ROL, ZeroPage, 5, false),
        0x36 => instr(ROL, ZeroPageX, 6, false),
        0x2E => instr(ROL, Absolute, 6, false),
        0x3E => instr(ROL, AbsoluteX, 7, false),

        0x6A => instr(ROR, Accumulator, 2, false),
        0x66 => instr(ROR, ZeroPage, 5, false),
        0x76 => instr(ROR, ZeroPageX, 6, false),
        0x6E => instr(ROR, Absolute, 6, false),
        0x7E => instr(ROR, AbsoluteX, 7, false),

        // Jumps and subroutines
        0x4C => instr(JMP, Absolute, 3, false),
        0x6C => instr(JMP, Indirect, 5, false),
        0x20 => instr(JSR, Absolute, 6, false),
        0x60 => instr(RTS, Implied, 6, false),

        // Branches (cycle count resolved at execution)
        0x90 => instr(BCC, Relative, 2, false),
        0xB0 => instr(BCS, Relative, 2, false),
        0xF0 => instr(BEQ, Relative, 2, false),
        0xD0 => instr(BNE, Relative, 2, false),
        0x30 => instr(BMI, Relative, 2, false),
        0x10 => instr(BPL, Relative, 2, false),
        0x50 => instr(BVC, Relative, 2, false),
        0x70 => instr(BVS, Relative, 2, false),

        // Flag operations
        0x18 => instr(CLC, Implied, 2, false),
        0xD8 => instr(CLD, Implied, 2, false),
        0x58 => instr(CLI, Implied, 2, false),
        0xB8 => instr(CLV, Implied, 2, false),
        0x38 => instr(SEC, Implied, 2, false),
        0xF8 => instr(SED, Implied, 2, false),
        0x78 => instr(SEI, Implied, 2, false),

        // Misc
        0x00 => instr(BRK, Implied, 7, false),
        0xEA => instr(NOP, Implied, 2, false),
        0x40 => instr(RTI, Implied, 6, false),

        _ => return None,
    };
    Some(info)
}

/// CPU execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    /// Undocumented opcode hit; carries the opcode byte and the PC it
    /// was fetched from for the fatal diagnostic.
    IllegalOpcode { opcode: u8, pc: u16 },
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::IllegalOpcode { opcode, pc } => {
                write!(f, "illegal opcode ${:02X} at PC ${:04X}", opcode, pc)
            }
        }
    }
}

impl std::error::Error for CpuError {}

/// The 6502 CPU core.
///
/// Memory accesses go through the [`Bus`] trait, so the same core runs
/// against the full system bus and against flat test memory.
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: CpuRegisters,
    status: StatusFlags,
    /// Pending NMI/IRQ/deferred-I bits
    pending: u8,
    /// Deferred value of the I flag, committed at the top of the next step
    pending_i_value: bool,
    /// Total cycles executed since reset
    total_cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            registers: CpuRegisters::default(),
            status: StatusFlags::new(StatusFlags::UNUSED | StatusFlags::INTERRUPT),
            pending: 0,
            pending_i_value: false,
            total_cycles: 0,
        }
    }

    /// Reset to the power-on state: registers cleared, SP=$FD, P=U|I,
    /// PC loaded from the reset vector.
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.registers = CpuRegisters::default();
        self.status = StatusFlags::new(StatusFlags::UNUSED | StatusFlags::INTERRUPT);
        self.pending = 0;
        self.pending_i_value = false;
        self.total_cycles = 0;
        self.registers.pc = self.read_word(bus, RESET_VECTOR);
    }

    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Request an interrupt. IRQ stays latched while I is set and is
    /// serviced on the first step after I clears; NMI is always serviced.
    pub fn request_interrupt(&mut self, kind: Interrupt) {
        match kind {
            Interrupt::Nmi => self.pending |= PENDING_NMI,
            Interrupt::Irq => self.pending |= PENDING_IRQ,
        }
    }

    /// Execute one instruction (or service a pending interrupt) and
    /// return the cycles consumed.
    ///
    /// Order per step: commit a deferred I-flag change, service NMI/IRQ,
    /// then fetch and dispatch.
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<u8, CpuError> {
        if self.pending & PENDING_I_CHANGE != 0 {
            self.status.set_interrupt(self.pending_i_value);
            self.pending &= !PENDING_I_CHANGE;
        }

        if self.pending & PENDING_NMI != 0 {
            self.pending &= !PENDING_NMI;
            self.service_interrupt(bus, NMI_VECTOR);
            self.total_cycles += 7;
            return Ok(7);
        }
        if self.pending & PENDING_IRQ != 0 && !self.status.interrupt() {
            self.pending &= !PENDING_IRQ;
            self.service_interrupt(bus, IRQ_VECTOR);
            self.total_cycles += 7;
            return Ok(7);
        }

        let pc = self.registers.pc;
        let opcode = self.fetch_byte(bus);
        let info = decode(opcode).ok_or(CpuError::IllegalOpcode { opcode, pc })?;

        let cycles = self.execute(bus, info);
        self.total_cycles += cycles as u64;
        Ok(cycles)
    }

    /// Push PC and status (B clear, U set), set I, jump through the vector
    fn service_interrupt(&mut self, bus: &mut impl Bus, vector: u16) {
        self.push_word(bus, self.registers.pc);
        let pushed = (self.status.bits() & !StatusFlags::BREAK) | StatusFlags::UNUSED;
        self.push_byte(bus, pushed);
        self.status.set_interrupt(true);
        self.registers.pc = self.read_word(bus, vector);
    }

    // ---- memory helpers ----

    fn fetch_byte(&mut self, bus: &mut impl Bus) -> u8 {
        let value = bus.read(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        lo | (hi << 8)
    }

    fn read_word(&self, bus: &mut impl Bus, address: u16) -> u16 {
        let lo = bus.read(address) as u16;
        let hi = bus.read(address.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn push_byte(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | self.registers.sp as u16, value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn pull_byte(&mut self, bus: &mut impl Bus) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(0x0100 | self.registers.sp as u16)
    }

    fn push_word(&mut self, bus: &mut impl Bus, value: u16) {
        self.push_byte(bus, (value >> 8) as u8);
        self.push_byte(bus, value as u8);
    }

    fn pop_word(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.pull_byte(bus) as u16;
        let hi = self.pull_byte(bus) as u16;
        lo | (hi << 8)
    }

    /// Resolve the operand's effective address. The bool is true when an
    /// indexed mode crossed a page boundary.
    fn operand_address(&mut self, bus: &mut impl Bus, mode: AddressingMode) -> (u16, bool) {
        match mode {
            AddressingMode::Immediate => {
                let addr = self.registers.pc;
                self.registers.pc = self.registers.pc.wrapping_add(1);
                (addr, false)
            }
            AddressingMode::ZeroPage => (self.fetch_byte(bus) as u16, false),
            AddressingMode::ZeroPageX => {
                let base = self.fetch_byte(bus);
                (base.wrapping_add(self.registers.x) as u16, false)
            }
            AddressingMode::ZeroPageY => {
                let base = self.fetch_byte(bus);
                (base.wrapping_add(self.registers.y) as u16, false)
            }
            AddressingMode::Absolute => (self.fetch_word(bus), false),
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.registers.x as u16);
                (addr, (base ^ addr) & 0xFF00 != 0)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus);
                let addr = base.wrapping_add(self.registers.y as u16);
                (addr, (base ^ addr) & 0xFF00 != 0)
            }
            AddressingMode::Indirect => {
                // JMP ($xxFF) reads its high byte from $xx00, not the
                // next page: the documented 6502 wrap quirk.
                let pointer = self.fetch_word(bus);
                let lo = bus.read(pointer) as u16;
                let hi = if pointer & 0x00FF == 0x00FF {
                    bus.read(pointer & 0xFF00) as u16
                } else {
                    bus.read(pointer.wrapping_add(1)) as u16
                };
                (lo | (hi << 8), false)
            }
            AddressingMode::IndirectX => {
                let zp = self.fetch_byte(bus).wrapping_add(self.registers.x);
                let lo = bus.read(zp as u16) as u16;
                let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
                (lo | (hi << 8), false)
            }
            AddressingMode::IndirectY => {
                let zp = self.fetch_byte(bus);
                let lo = bus.read(zp as u16) as u16;
                let hi = bus.read(zp.wrapping_add(1) as u16) as u16;
                let base = lo | (hi << 8);
                let addr = base.wrapping_add(self.registers.y as u16);
                (addr, (base ^ addr) & 0xFF00 != 0)
            }
            AddressingMode::Implied | AddressingMode::Accumulator | AddressingMode::Relative => {
                (0, false)
            }
        }
    }

    fn read_operand(&mut self, bus: &mut impl Bus, mode: AddressingMode) -> (u8, bool) {
        let (addr, crossed) = self.operand_address(bus, mode);
        (bus.read(addr), crossed)
    }

    /// Fetch the relative offset and branch when the condition holds.
    /// 2 cycles not taken, 3 taken, 4 taken across a page boundary.
    fn branch(&mut self, bus: &mut impl Bus, condition: bool) -> u8 {
        let offset = self.fetch_byte(bus) as i8;
        if condition {
            let old_pc = self.registers.pc;
            self.registers.pc = old_pc.wrapping_add(offset as i16 as u16);
            let page_crossed = (old_pc ^ self.registers.pc) & 0xFF00 != 0;
            3 + page_crossed as u8
        } else {
            2
        }
    }

    /// Memory read-modify-write: the original value is written back
    /// before the modified value, as the hardware does.
    fn read_modify_write(
        &mut self,
        bus: &mut impl Bus,
        mode: AddressingMode,
        op: fn(&mut Cpu, u8) -> u8,
    ) {
        let (addr, _) = self.operand_address(bus, mode);
        let value = bus.read(addr);
        bus.write(addr, value);
        let result = op(self, value);
        bus.write(addr, result);
    }

    fn execute(&mut self, bus: &mut impl Bus, info: InstructionInfo) -> u8 {
        use Opcode::*;

        let mut cycles = info.cycles;
        let mut page_crossed = false;

        match info.opcode {
            LDA => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.a = v;
                self.set_flags_zn(v);
            }
            LDX => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.x = v;
                self.set_flags_zn(v);
            }
            LDY => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.y = v;
                self.set_flags_zn(v);
            }

            STA => {
                let (addr, _) = self.operand_address(bus, info.mode);
                bus.write(addr, self.registers.a);
            }
            STX => {
                let (addr, _) = self.operand_address(bus, info.mode);
                bus.write(addr, self.registers.x);
            }
            STY => {
                let (addr, _) = self.operand_address(bus, info.mode);
                bus.write(addr, self.registers.y);
            }

            TAX => {
                self.registers.x = self.registers.a;
                self.set_flags_zn(self.registers.x);
            }
            TAY => {
                self.registers.y = self.registers.a;
                self.set_flags_zn(self.registers.y);
            }
            TSX => {
                self.registers.x = self.registers.sp;
                self.set_flags_zn(self.registers.x);
            }
            TXA => {
                self.registers.a = self.registers.x;
                self.set_flags_zn(self.registers.a);
            }
            TXS => {
                self.registers.sp = self.registers.x;
            }
            TYA => {
                self.registers.a = self.registers.y;
                self.set_flags_zn(self.registers.a);
            }

            PHA => {
                self.push_byte(bus, self.registers.a);
            }
            PHP => {
                // B and U are set in the pushed copy only
                let pushed = self.status.bits() | StatusFlags::BREAK | StatusFlags::UNUSED;
                self.push_byte(bus, pushed);
            }
            PLA => {
                self.registers.a = self.pull_byte(bus);
                self.set_flags_zn(self.registers.a);
            }
            PLP => {
                let flags = self.pull_byte(bus);
                self.restore_flags_deferred_i(flags);
            }

            AND => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.a &= v;
                self.set_flags_zn(self.registers.a);
            }
            ORA => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.a |= v;
                self.set_flags_zn(self.registers.a);
            }
            EOR => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.registers.a ^= v;
                self.set_flags_zn(self.registers.a);
            }
            BIT => {
                let (v, _) = self.read_operand(bus, info.mode);
                self.status.set_zero(self.registers.a & v == 0);
                self.status.set_negative(v & 0x80 != 0);
                self.status.set_overflow(v & 0x40 != 0);
            }

            ADC => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.op_adc(v);
            }
            SBC => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.op_sbc(v);
            }

            CMP => {
                let (v, crossed) = self.read_operand(bus, info.mode);
                page_crossed = crossed;
                self.op_compare(self.registers.a, v);
            }
            CPX => {
                let (v, _) = self.read_operand(bus, info.mode);
                self.op_compare(self.registers.x, v);
            }
            CPY => {
                let (v, _) = self.read_operand(bus, info.mode);
                self.op_compare(self.registers.y, v);
            }

            INC => self.read_modify_write(bus, info.mode, Cpu::op_inc),
            DEC => self.read_modify_write(bus, info.mode, Cpu::op_dec),
            INX => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.set_flags_zn(self.registers.x);
            }
            INY => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.set_flags_zn(self.registers.y);
            }
            DEX => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.set_flags_zn(self.registers.x);
            }
            DEY => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.set_flags_zn(self.registers.y);
            }

            ASL => {
                if info.mode == AddressingMode::Accumulator {
                    self.registers.a = self.op_asl(self.registers.a);
                } else {
                    self.read_modify_write(bus, info.mode, Cpu::op_asl);
                }
            }
            LSR => {
                if info.mode == AddressingMode::Accumulator {
                    self.registers.a = self.op_lsr(self.registers.a);
                } else {
                    self.read_modify_write(bus, info.mode, Cpu::op_lsr);
                }
            }
            ROL => {
                if info.mode == AddressingMode::Accumulator {
                    self.registers.a = self.op_rol(self.registers.a);
                } else {
                    self.read_modify_write(bus, info.mode, Cpu::op_rol);
                }
            }
            ROR => {
                if info.mode == AddressingMode::Accumulator {
                    self.registers.a = self.op_ror(self.registers.a);
                } else {
                    self.read_modify_write(bus, info.mode, Cpu::op_ror);
                }
            }

            JMP => {
                let (addr, _) = self.operand_address(bus, info.mode);
                self.registers.pc = addr;
            }
            JSR => {
                let target = self.fetch_word(bus);
                // PC now points past the operand; push PC - 1
                self.push_word(bus, self.registers.pc.wrapping_sub(1));
                self.registers.pc = target;
            }
            RTS => {
                self.registers.pc = self.pop_word(bus).wrapping_add(1);
            }

            BCC => cycles = self.branch(bus, !self.status.carry()),
            BCS => cycles = self.branch(bus, self.status.carry()),
            BEQ => cycles = self.branch(bus, self.status.zero()),
            BNE => cycles = self.branch(bus, !self.status.zero()),
            BMI => cycles = self.branch(bus, self.status.negative()),
            BPL => cycles = self.branch(bus, !self.status.negative()),
            BVC => cycles = self.branch(bus, !self.status.overflow()),
            BVS => cycles = self.branch(bus, self.status.overflow()),

            CLC => self.status.set_carry(false),
            CLD => self.status.set_decimal(false),
            CLI => self.schedule_i_change(false),
            CLV => self.status.set_overflow(false),
            SEC => self.status.set_carry(true),
            SED => self.status.set_decimal(true),
            SEI => self.schedule_i_change(true),

            BRK => {
                // Two-byte instruction: the padding byte is skipped
                self.registers.pc = self.registers.pc.wrapping_add(1);
                self.push_word(bus, self.registers.pc);
                let pushed = self.status.bits() | StatusFlags::BREAK | StatusFlags::UNUSED;
                self.push_byte(bus, pushed);
                self.status.set_interrupt(true);
                self.registers.pc = self.read_word(bus, IRQ_VECTOR);
            }
            NOP => {}
            RTI => {
                let flags = self.pull_byte(bus);
                // Unlike PLP, RTI restores I with no one-instruction delay
                self.restore_flags_immediate(flags);
                self.registers.pc = self.pop_word(bus);
            }
        }

        if info.page_cycle && page_crossed {
            cycles += 1;
        }
        cycles
    }

    // ---- ALU helpers ----

    fn set_flags_zn(&mut self, value: u8) {
        self.status.set_zero(value == 0);
        self.status.set_negative(value & 0x80 != 0);
    }

    fn op_adc(&mut self, value: u8) {
        let carry = self.status.carry() as u16;
        let old_a = self.registers.a;
        let sum = old_a as u16 + value as u16 + carry;
        let result = sum as u8;

        self.status.set_carry(sum > 0xFF);
        self.status
            .set_overflow((old_a ^ result) & (value ^ result) & 0x80 != 0);
        self.registers.a = result;
        self.set_flags_zn(result);
    }

    fn op_sbc(&mut self, value: u8) {
        // A + ~operand + C; carry out means no borrow
        let carry = self.status.carry() as u16;
        let old_a = self.registers.a;
        let sum = old_a as u16 + (!value) as u16 + carry;
        let result = sum as u8;

        self.status.set_carry(sum > 0xFF);
        self.status
            .set_overflow((old_a ^ result) & (!value ^ result) & 0x80 != 0);
        self.registers.a = result;
        self.set_flags_zn(result);
    }

    fn op_compare(&mut self, register: u8, value: u8) {
        self.status.set_carry(register >= value);
        self.set_flags_zn(register.wrapping_sub(value));
    }

    fn op_asl(&mut self, value: u8) -> u8 {
        self.status.set_carry(value & 0x80 != 0);
        let result = value << 1;
        self.set_flags_zn(result);
        result
    }

    fn op_lsr(&mut self, value: u8) -> u8 {
        self.status.set_carry(value & 0x01 != 0);
        let result = value >> 1;
        self.set_flags_zn(result);
        result
    }

    fn op_rol(&mut self, value: u8) -> u8 {
        let carry_in = self.status.carry() as u8;
        self.status.set_carry(value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.set_flags_zn(result);
        result
    }

    fn op_ror(&mut self, value: u8) -> u8 {
        let carry_in = self.status.carry() as u8;
        self.status.set_carry(value & 0x01 != 0);
        let result = (value >> 1) | (carry_in << 7);
        self.set_flags_zn(result);
        result
    }

    fn op_inc(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flags_zn(result);
        result
    }

    fn op_dec(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flags_zn(result);
        result
    }

    // ---- interrupt-disable bookkeeping ----

    /// SEI/CLI (and PLP's I bit) take effect one instruction later
    fn schedule_i_change(&mut self, value: bool) {
        if self.status.interrupt() != value {
            self.pending_i_value = value;
            self.pending |= PENDING_I_CHANGE;
        }
    }

    /// Restore C, Z, D, V, N now; defer the I change (PLP).
    /// Bits 4 and 5 of the popped byte are ignored.
    fn restore_flags_deferred_i(&mut self, flags: u8) {
        let mask = StatusFlags::CARRY
            | StatusFlags::ZERO
            | StatusFlags::DECIMAL
            | StatusFlags::OVERFLOW
            | StatusFlags::NEGATIVE;
        self.status = StatusFlags::new((self.status.bits() & !mask) | (flags & mask));
        self.schedule_i_change(flags & StatusFlags::INTERRUPT != 0);
    }

    /// Restore C, Z, I, D, V, N immediately (RTI)
    fn restore_flags_immediate(&mut self, flags: u8) {
        let mask = StatusFlags::CARRY
            | StatusFlags::ZERO
            | StatusFlags::INTERRUPT
            | StatusFlags::DECIMAL
            | StatusFlags::OVERFLOW
            | StatusFlags::NEGATIVE;
        self.status = StatusFlags::new((self.status.bits() & !mask) | (flags & mask));
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_documented_set() {
        // Spot checks against the documented table
        let lda = decode(0xBD).unwrap();
        assert_eq!(lda.opcode, Opcode::LDA);
        assert_eq!(lda.mode, AddressingMode::AbsoluteX);
        assert_eq!(lda.cycles, 4);
        assert!(lda.page_cycle);

        let sta = decode(0x9D).unwrap();
        assert_eq!(sta.cycles, 5);
        assert!(!sta.page_cycle);

        let inc = decode(0xFE).unwrap();
        assert_eq!(inc.cycles, 7);
        assert!(!inc.page_cycle);

        assert!(decode(0x02).is_none());
    }

    #[test]
    fn test_status_flag_bits() {
        let mut flags = StatusFlags::new(0);
        flags.set_carry(true);
        flags.set_negative(true);
        assert_eq!(flags.bits(), 0x81);
        flags.set_carry(false);
        assert_eq!(flags.bits(), 0x80);
    }
}
