//! NES CLI - headless driver for the NES emulator
//!
//! Loads an iNES ROM, runs a fixed number of frames, and optionally
//! dumps CPU/PPU state. Useful for test ROMs and debugging without a
//! window.

use anyhow::{bail, Context, Result};
use clap::Parser;
use nes_core::system::NesSystem;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// NES emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "A headless NES emulator", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    rom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 60)]
    frames: u64,

    /// Log to logs/nes-cli.log instead of the console
    #[arg(long)]
    log_file: bool,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,
}

fn init_logging(to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if to_file {
        fs::create_dir_all("logs").context("failed to create logs directory")?;
        let file = fs::File::create("logs/nes-cli.log").context("failed to create log file")?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_file)?;

    let Some(rom_path) = args.rom else {
        bail!("no ROM specified; usage: nes-cli <path-to-ines-rom>");
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

    info!(frames = args.frames, "running");
    for _ in 0..args.frames {
        system
            .run_frame()
            .with_context(|| format!("emulation stopped during frame {}", system.frame_count()))?;
    }
    info!(frames = system.frame_count(), "completed");

    if args.dump_cpu {
        dump_cpu_state(&system);
    }
    if args.dump_ppu {
        dump_ppu_state(&system);
    }

    Ok(())
}

fn dump_cpu_state(system: &NesSystem) {
    let cpu = system.cpu();
    let regs = cpu.registers();

    println!("CPU state:");
    println!("  A:  ${:02X}", regs.a);
    println!("  X:  ${:02X}", regs.x);
    println!("  Y:  ${:02X}", regs.y);
    println!("  SP: ${:02X}", regs.sp);
    println!("  PC: ${:04X}", regs.pc);
    println!("  P:  {}", cpu.status());
    println!("  Cycles: {}", cpu.total_cycles());
}

fn dump_ppu_state(system: &NesSystem) {
    let ppu = system.bus().ppu();

    println!("PPU state:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot: {}", ppu.dot());
    println!("  VBLANK: {}", ppu.status().vblank());
}
