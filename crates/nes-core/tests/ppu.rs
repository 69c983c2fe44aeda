//! PPU tests: register behavior, memory aliasing, and VBlank/NMI timing
//! through the CPU-facing register interface.

use nes_core::cartridge::Mirroring;
use nes_core::ppu::{Ppu, PpuCtrl, DOTS_PER_SCANLINE, SCANLINES_PER_FRAME};

/// Point the VRAM address at `addr` via the two PPUADDR writes
fn set_addr(ppu: &mut Ppu, addr: u16) {
    ppu.write_register(6, (addr >> 8) as u8);
    ppu.write_register(6, addr as u8);
}

fn vram_write(ppu: &mut Ppu, addr: u16, value: u8) {
    set_addr(ppu, addr);
    ppu.write_register(7, value);
}

/// Buffered read: the first PPUDATA read after seeking returns the
/// stale buffer, the second returns the addressed byte
fn vram_read(ppu: &mut Ppu, addr: u16) -> u8 {
    set_addr(ppu, addr);
    ppu.read_register(7);
    set_addr(ppu, addr);
    ppu.read_register(7)
}

/// Clock the PPU to the given scanline/dot from its current position
fn clock_to(ppu: &mut Ppu, scanline: u16, dot: u16) {
    while ppu.scanline() != scanline || ppu.dot() != dot {
        ppu.clock();
    }
}

#[test]
fn test_palette_write_aliases() {
    let mut ppu = Ppu::new();
    for (alias, base) in [(0x3F10, 0x3F00), (0x3F14, 0x3F04), (0x3F18, 0x3F08), (0x3F1C, 0x3F0C)]
    {
        vram_write(&mut ppu, alias, 0x2A);
        set_addr(&mut ppu, base);
        // Palette reads bypass the buffer
        assert_eq!(ppu.read_register(7), 0x2A, "alias ${:04X}", alias);

        vram_write(&mut ppu, base, 0x15);
        set_addr(&mut ppu, alias);
        assert_eq!(ppu.read_register(7), 0x15, "base ${:04X}", base);
    }
}

#[test]
fn test_nametable_mirroring_round_trip() {
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(Vec::new(), Mirroring::Vertical);
    vram_write(&mut ppu, 0x2005, 0x55);
    assert_eq!(vram_read(&mut ppu, 0x2805), 0x55);

    let mut ppu = Ppu::new();
    ppu.attach_cartridge(Vec::new(), Mirroring::Horizontal);
    vram_write(&mut ppu, 0x2405, 0x66);
    assert_eq!(vram_read(&mut ppu, 0x2005), 0x66);
    // The other pair is distinct
    vram_write(&mut ppu, 0x2805, 0x77);
    assert_eq!(vram_read(&mut ppu, 0x2005), 0x66);
    assert_eq!(vram_read(&mut ppu, 0x2C05), 0x77);
}

#[test]
fn test_ppudata_buffered_read() {
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(Vec::new(), Mirroring::Vertical);
    vram_write(&mut ppu, 0x2100, 0xAB);
    vram_write(&mut ppu, 0x2101, 0xCD);

    set_addr(&mut ppu, 0x2100);
    let stale = ppu.read_register(7);
    assert_ne!(stale, 0xAB, "first read returns the old buffer");
    assert_eq!(ppu.read_register(7), 0xAB);
    assert_eq!(ppu.read_register(7), 0xCD);
}

#[test]
fn test_ppudata_increment_32() {
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(Vec::new(), Mirroring::Vertical);
    ppu.write_register(0, PpuCtrl::VRAM_INCREMENT);
    set_addr(&mut ppu, 0x2000);
    ppu.write_register(7, 0x11); // $2000
    ppu.write_register(7, 0x22); // $2020
    ppu.write_register(0, 0);
    assert_eq!(vram_read(&mut ppu, 0x2020), 0x22);
}

#[test]
fn test_oamdata_write_increments_read_does_not() {
    let mut ppu = Ppu::new();
    ppu.write_register(3, 0x10);
    ppu.write_register(4, 0xAA);
    ppu.write_register(4, 0xBB);

    ppu.write_register(3, 0x10);
    assert_eq!(ppu.read_register(4), 0xAA);
    assert_eq!(ppu.read_register(4), 0xAA); // no increment on read
    ppu.write_register(3, 0x11);
    assert_eq!(ppu.read_register(4), 0xBB);
}

#[test]
fn test_vblank_set_at_scanline_241_dot_1() {
    let mut ppu = Ppu::new();
    clock_to(&mut ppu, 241, 1);
    assert!(!ppu.status().vblank(), "not yet processed dot 1");
    ppu.clock();
    assert!(ppu.status().vblank());
}

#[test]
fn test_nmi_raised_only_when_enabled() {
    let mut ppu = Ppu::new();
    clock_to(&mut ppu, 242, 0);
    assert!(ppu.status().vblank());
    assert!(!ppu.take_nmi(), "ctrl bit 7 clear suppresses NMI");

    let mut ppu = Ppu::new();
    ppu.write_register(0, PpuCtrl::NMI_ENABLE);
    clock_to(&mut ppu, 242, 0);
    assert!(ppu.take_nmi());
    assert!(!ppu.take_nmi(), "request is consumed");
}

#[test]
fn test_enabling_nmi_mid_vblank_raises_it() {
    let mut ppu = Ppu::new();
    clock_to(&mut ppu, 250, 0);
    assert!(!ppu.take_nmi());
    ppu.write_register(0, PpuCtrl::NMI_ENABLE);
    assert!(ppu.take_nmi());
}

#[test]
fn test_vblank_cleared_on_prerender_scanline() {
    let mut ppu = Ppu::new();
    clock_to(&mut ppu, 261, 1);
    assert!(ppu.status().vblank());
    ppu.clock();
    assert!(!ppu.status().vblank());
}

#[test]
fn test_status_read_clears_vblank() {
    let mut ppu = Ppu::new();
    ppu.write_register(0, PpuCtrl::NMI_ENABLE);
    clock_to(&mut ppu, 242, 0);

    let first = ppu.read_register(2);
    assert_ne!(first & 0x80, 0);
    let second = ppu.read_register(2);
    assert_eq!(second & 0x80, 0);
    // The pending NMI request is dropped too
    assert!(!ppu.take_nmi());
}

#[test]
fn test_vblank_once_per_frame() {
    let mut ppu = Ppu::new();
    ppu.write_register(0, PpuCtrl::NMI_ENABLE);

    let dots_per_frame = DOTS_PER_SCANLINE as u64 * SCANLINES_PER_FRAME as u64;
    let mut nmi_count = 0;
    for _ in 0..dots_per_frame * 2 {
        ppu.clock();
        if ppu.take_nmi() {
            nmi_count += 1;
        }
    }
    assert_eq!(nmi_count, 2, "exactly one NMI per frame");
}

#[test]
fn test_frame_done_after_full_frame() {
    let mut ppu = Ppu::new();
    let dots_per_frame = DOTS_PER_SCANLINE as u64 * SCANLINES_PER_FRAME as u64;
    for _ in 0..dots_per_frame - 1 {
        ppu.clock();
        assert!(!ppu.take_frame());
    }
    ppu.clock();
    assert!(ppu.take_frame());
    assert_eq!(ppu.scanline(), 0);
    assert_eq!(ppu.dot(), 0);
}

#[test]
fn test_background_pixel_rendering() {
    // One solid tile at the top-left of the nametable, palette 0
    let mut chr = vec![0u8; 8192];
    // Tile 1: plane 0 all ones -> color index 1 for every pixel
    for row in 0..8 {
        chr[16 + row] = 0xFF;
    }
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(chr, Mirroring::Vertical);

    vram_write(&mut ppu, 0x2000, 0x01); // tile 1 at (0,0)
    vram_write(&mut ppu, 0x3F00, 0x0F); // backdrop: black
    vram_write(&mut ppu, 0x3F01, 0x21); // color 1: sky blue
    set_addr(&mut ppu, 0x0000); // reset scroll before enabling rendering
    ppu.write_register(1, 0x0A); // show background + left column

    // Scanline 1 is the first line fed by the regular prefetch cadence
    clock_to(&mut ppu, 2, 0);

    let frame = ppu.frame_buffer();
    let expected = 0xFF000000u32 | 0x4C9AEC; // master palette $21
    assert_eq!(frame[256], expected);
    assert_eq!(frame[256 + 7], expected);
    // Tile 1 only covers the first 8 pixels; the rest is backdrop
    assert_eq!(frame[256 + 8], 0xFF000000);
}

#[test]
fn test_sprite_zero_hit_set_on_overlap() {
    // Background tile 1 and sprite tile 2 both solid at the same spot
    let mut chr = vec![0u8; 8192];
    for row in 0..8 {
        chr[16 + row] = 0xFF; // tile 1
        chr[32 + row] = 0xFF; // tile 2
    }
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(chr, Mirroring::Vertical);

    vram_write(&mut ppu, 0x2000, 0x01);
    // Sprite 0: OAM y is the scanline above the sprite top
    ppu.write_register(3, 0);
    for byte in [0x00, 0x02, 0x00, 0x04] {
        ppu.write_register(4, byte);
    }
    set_addr(&mut ppu, 0x0000); // reset scroll before enabling rendering
    ppu.write_register(1, 0x1E); // background + sprites, no left clip

    assert!(!ppu.status().sprite_zero_hit());
    clock_to(&mut ppu, 3, 0);
    assert!(ppu.status().sprite_zero_hit());
}

#[test]
fn test_sprite_overflow_on_ninth_sprite() {
    let mut ppu = Ppu::new();
    ppu.attach_cartridge(vec![0u8; 8192], Mirroring::Vertical);

    // Nine sprites on scanline 10
    ppu.write_register(3, 0);
    for i in 0..9 {
        for byte in [9u8, 0x01, 0x00, (i * 8) as u8] {
            ppu.write_register(4, byte);
        }
    }
    ppu.write_register(1, 0x18);

    clock_to(&mut ppu, 11, 0);
    assert!(ppu.status().sprite_overflow());
}
