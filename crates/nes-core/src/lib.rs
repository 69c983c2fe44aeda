//! NES Core - Pure Rust NES emulator library
//!
//! Core emulation for the Nintendo Entertainment System: a 6502 CPU, the
//! 2C02 PPU, cartridge (iNES / mapper 0), controllers, and the bus and
//! tick loop tying them together. Frontends live in separate crates.

#![forbid(unsafe_code)]

/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// Memory bus and address decoding
pub mod bus;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// APU (Audio Processing Unit) stub with timing hooks
pub mod apu;
/// Cartridge and iNES ROM parsing
pub mod cartridge;
/// Controller input handling
pub mod controller;
/// Integration module for the complete NES system
pub mod system;

pub use bus::Bus;
pub use cartridge::{Cartridge, CartridgeError, Mirroring};
pub use controller::{
    Controller, BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT,
    BUTTON_START, BUTTON_UP,
};
pub use cpu::{Cpu, CpuError, Interrupt, StatusFlags};
pub use ppu::{Ppu, SCREEN_HEIGHT, SCREEN_WIDTH};
pub use system::{NesSystem, SystemError, PORT_ONE, PORT_TWO};
