//! NES Desktop - windowed NES emulator using minifb
//!
//! Renders the PPU framebuffer into a scaled window and polls the
//! keyboard into controller 1 once per frame:
//! X=A, Z=B, A=Select, S=Start, arrow keys=D-pad, Esc quits.

use anyhow::{bail, Context, Result};
use clap::Parser;
use minifb::{Key, Window, WindowOptions};
use nes_core::controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};
use nes_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use nes_core::system::{NesSystem, PORT_ONE, PORT_TWO};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// NTSC frame period, ~60 Hz
const FRAME_DURATION: Duration = Duration::from_micros(16_667);

/// NES emulator desktop app
#[derive(Parser, Debug)]
#[command(name = "nes-desktop")]
#[command(about = "A windowed NES emulator", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    rom: Option<PathBuf>,

    /// Window scale factor (1-4)
    #[arg(short, long, default_value_t = 2)]
    scale: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let Some(rom_path) = args.rom else {
        bail!("no ROM specified; usage: nes-desktop <path-to-ines-rom>");
    };

    let rom_data = fs::read(&rom_path)
        .with_context(|| format!("failed to read ROM file {}", rom_path.display()))?;

    let mut system = NesSystem::new();
    system
        .load_rom(&rom_data)
        .with_context(|| format!("failed to load cartridge {}", rom_path.display()))?;

    let cartridge = system.bus().cartridge().expect("cartridge just loaded");
    info!(
        prg_bytes = cartridge.prg().len(),
        chr_bytes = cartridge.chr().len(),
        mapper = cartridge.mapper(),
        "loaded cartridge"
    );

    let scale = args.scale.clamp(1, 4);
    let title = format!("NES - {}", rom_path.display());
    let mut window = Window::new(
        &title,
        SCREEN_WIDTH * scale,
        SCREEN_HEIGHT * scale,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    )
    .context("failed to create window")?;

    while window.is_open() && !window.is_key_down(Key::Escape) {
        let frame_start = Instant::now();

        let buttons = poll_buttons(&window);
        system.set_buttons(PORT_ONE, buttons);
        system.set_buttons(PORT_TWO, 0);

        system.run_frame()?;

        window
            .update_with_buffer(system.frame_buffer(), SCREEN_WIDTH, SCREEN_HEIGHT)
            .context("failed to update window")?;

        // Sleep off the remainder of the ~16.67ms frame
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    info!(frames = system.frame_count(), "emulator closed");
    Ok(())
}

/// Current controller-1 button mask from the keyboard
fn poll_buttons(window: &Window) -> u8 {
    let mut state = 0;
    if window.is_key_down(Key::X) {
        state |= BUTTON_A;
    }
    if window.is_key_down(Key::Z) {
        state |= BUTTON_B;
    }
    if window.is_key_down(Key::A) {
        state |= BUTTON_SELECT;
    }
    if window.is_key_down(Key::S) {
        state |= BUTTON_START;
    }
    if window.is_key_down(Key::Up) {
        state |= BUTTON_UP;
    }
    if window.is_key_down(Key::Down) {
        state |= BUTTON_DOWN;
    }
    if window.is_key_down(Key::Left) {
        state |= BUTTON_LEFT;
    }
    if window.is_key_down(Key::Right) {
        state |= BUTTON_RIGHT;
    }
    state
}
