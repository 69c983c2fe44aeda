//! NES system integration
//!
//! Ties the CPU and the bus-side devices into a steppable machine: one
//! CPU instruction per step, three PPU dots per CPU cycle, NMI handoff
//! from the PPU to the CPU between instructions.

use crate::bus::Bus;
use crate::cartridge::{Cartridge, CartridgeError};
use crate::cpu::{Cpu, CpuError, Interrupt};

/// Controller port identifiers
pub const PORT_ONE: usize = 0;
pub const PORT_TWO: usize = 1;

/// System-level execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    Cpu(CpuError),
    /// PC landed on $0000: the conventional crash signal of test ROMs
    CrashedToZeroPage,
}

impl std::fmt::Display for SystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemError::Cpu(e) => write!(f, "{}", e),
            SystemError::CrashedToZeroPage => write!(f, "crashed to zero page"),
        }
    }
}

impl std::error::Error for SystemError {}

impl From<CpuError> for SystemError {
    fn from(e: CpuError) -> Self {
        SystemError::Cpu(e)
    }
}

/// NES system: CPU plus the bus that owns PPU, APU, controllers and
/// the cartridge.
#[derive(Debug, Clone)]
pub struct NesSystem {
    cpu: Cpu,
    bus: Bus,
    frame_count: u64,
}

impl NesSystem {
    pub fn new() -> Self {
        Self {
            cpu: Cpu::new(),
            bus: Bus::new(),
            frame_count: 0,
        }
    }

    /// Parse an iNES image, install the cartridge, and reset
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), CartridgeError> {
        let cartridge = Cartridge::from_rom(rom)?;
        self.bus.set_cartridge(cartridge);
        self.reset();
        Ok(())
    }

    /// Power-on reset: RAM and devices cleared, PC from the reset vector
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
        self.frame_count = 0;
    }

    /// Execute one CPU instruction and advance the PPU three dots per
    /// CPU cycle (plus any OAM DMA stall). Returns the cycles consumed.
    pub fn step(&mut self) -> Result<u32, SystemError> {
        let mut cycles = self.cpu.step(&mut self.bus)? as u32;

        let stall = self.bus.take_dma_stall();
        if stall > 0 {
            // 513 cycles, 514 when the transfer starts on an odd cycle
            cycles += stall as u32 + (self.cpu.total_cycles() & 1) as u32;
        }

        for _ in 0..cycles * 3 {
            self.bus.ppu_mut().clock();
        }
        self.bus.apu_mut().step(cycles);

        // The PPU raises NMI at scanline 241 dot 1; the CPU observes it
        // on its next step
        if self.bus.ppu_mut().take_nmi() {
            self.cpu.request_interrupt(Interrupt::Nmi);
        }

        if self.cpu.registers().pc == 0x0000 {
            return Err(SystemError::CrashedToZeroPage);
        }

        Ok(cycles)
    }

    /// Step until the PPU completes the current frame
    pub fn run_frame(&mut self) -> Result<(), SystemError> {
        loop {
            self.step()?;
            if self.bus.ppu_mut().take_frame() {
                self.frame_count += 1;
                return Ok(());
            }
        }
    }

    /// Latch a button mask into a controller port; called once per
    /// frame by the input collaborator
    pub fn set_buttons(&mut self, port: usize, state: u8) {
        self.bus.set_controller_state(port, state);
    }

    /// The PPU's 256x240 ARGB framebuffer. The screen collaborator
    /// borrows it per frame and must copy before the next frame starts.
    pub fn frame_buffer(&self) -> &[u32] {
        self.bus.ppu().frame_buffer()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }
}

impl Default for NesSystem {
    fn default() -> Self {
        Self::new()
    }
}
