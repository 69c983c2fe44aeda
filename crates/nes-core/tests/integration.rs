//! System integration tests: full frames on generated NROM images,
//! NMI delivery, and the crash diagnostics.

use nes_core::cpu::{Bus as CpuBus, CpuError};
use nes_core::system::{NesSystem, SystemError};

/// Build a 16KB NROM image: `program` at $8000, `nmi_handler` at $9000,
/// vectors wired accordingly.
fn nrom_image(program: &[u8], nmi_handler: &[u8]) -> Vec<u8> {
    let mut rom = Vec::new();
    rom.extend_from_slice(&[0x4E, 0x45, 0x53, 0x1A, 1, 1, 0, 0]);
    rom.extend_from_slice(&[0u8; 8]);

    let mut prg = vec![0xEAu8; 16 * 1024];
    prg[..program.len()].copy_from_slice(program);
    prg[0x1000..0x1000 + nmi_handler.len()].copy_from_slice(nmi_handler);
    prg[0x3FFA] = 0x00; // NMI vector -> $9000
    prg[0x3FFB] = 0x90;
    prg[0x3FFC] = 0x00; // reset vector -> $8000
    prg[0x3FFD] = 0x80;

    rom.extend_from_slice(&prg);
    rom.extend_from_slice(&[0u8; 8 * 1024]);
    rom
}

/// Enable NMI in PPUCTRL, then spin; the handler counts into $10
fn nmi_counting_system() -> NesSystem {
    let program = [
        0xA9, 0x80, // LDA #$80
        0x8D, 0x00, 0x20, // STA $2000
        0x4C, 0x05, 0x80, // JMP $8005
    ];
    let handler = [
        0xE6, 0x10, // INC $10
        0x40, // RTI
    ];
    let mut system = NesSystem::new();
    system.load_rom(&nrom_image(&program, &handler)).unwrap();
    system
}

#[test]
fn test_one_nmi_per_frame() {
    let mut system = nmi_counting_system();

    system.run_frame().unwrap();
    let count = system.bus_mut().read(0x10);
    assert_eq!(count, 1, "exactly one NMI taken in the first frame");

    system.run_frame().unwrap();
    assert_eq!(system.bus_mut().read(0x10), 2);
    assert_eq!(system.frame_count(), 2);
}

#[test]
fn test_frame_is_about_29780_cpu_cycles() {
    let mut system = nmi_counting_system();
    system.run_frame().unwrap();
    let cycles = system.cpu().total_cycles();
    // 341 dots x 262 scanlines / 3 dots per cycle, rounded up to
    // instruction granularity
    assert!(
        (29_770..29_800).contains(&cycles),
        "frame took {} cycles",
        cycles
    );
}

#[test]
fn test_no_nmi_when_ctrl_bit_clear() {
    let program = [0x4C, 0x00, 0x80]; // JMP $8000
    let handler = [0xE6, 0x10, 0x40];
    let mut system = NesSystem::new();
    system.load_rom(&nrom_image(&program, &handler)).unwrap();

    system.run_frame().unwrap();
    assert_eq!(system.bus_mut().read(0x10), 0);
}

#[test]
fn test_vblank_flag_readable_during_vblank() {
    // BIT $2002 copies the VBlank bit into N; the game loop idiom
    let program = [
        0x2C, 0x02, 0x20, // BIT $2002
        0x10, 0xFB, // BPL -5 (spin until VBlank)
        0xA9, 0x01, // LDA #$01
        0x85, 0x20, // STA $20
        0x4C, 0x09, 0x80, // JMP $8009
    ];
    let mut system = NesSystem::new();
    system.load_rom(&nrom_image(&program, &[0x40])).unwrap();

    system.run_frame().unwrap();
    assert_eq!(system.bus_mut().read(0x20), 1, "wait-for-vblank loop exits");
}

#[test]
fn test_crash_to_zero_page_detected() {
    let program = [0x4C, 0x00, 0x00]; // JMP $0000
    let mut system = NesSystem::new();
    system.load_rom(&nrom_image(&program, &[0x40])).unwrap();

    assert_eq!(system.run_frame(), Err(SystemError::CrashedToZeroPage));
}

#[test]
fn test_illegal_opcode_is_fatal_with_diagnostics() {
    let program = [0x02];
    let mut system = NesSystem::new();
    system.load_rom(&nrom_image(&program, &[0x40])).unwrap();

    let err = system.run_frame().unwrap_err();
    assert_eq!(
        err,
        SystemError::Cpu(CpuError::IllegalOpcode {
            opcode: 0x02,
            pc: 0x8000
        })
    );
}

#[test]
fn test_reset_restarts_from_vector() {
    let mut system = nmi_counting_system();
    system.run_frame().unwrap();
    system.reset();
    assert_eq!(system.cpu().registers().pc, 0x8000);
    assert_eq!(system.frame_count(), 0);
    assert_eq!(system.bus_mut().read(0x10), 0, "RAM cleared on reset");
}
