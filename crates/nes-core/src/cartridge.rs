//! Cartridge and iNES ROM parsing
//!
//! Parses the 16-byte iNES header and slices the PRG/CHR banks out of the
//! ROM image. Only mapper 0 (NROM) is supported: PRG is 16KB or 32KB with
//! the 16KB case mirrored into the upper bank, and CHR is a flat 8KB page.

use tracing::warn;

/// iNES header size in bytes
pub const HEADER_SIZE: usize = 16;

/// iNES header magic number: "NES\x1A"
pub const NES_MAGIC: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];

/// PRG ROM page size (16KB units in the header)
pub const PRG_PAGE_SIZE: usize = 16 * 1024;

/// CHR ROM page size (8KB units in the header)
pub const CHR_PAGE_SIZE: usize = 8 * 1024;

/// Trainer blob size, skipped when flags 6 bit 2 is set
pub const TRAINER_SIZE: usize = 512;

/// Nametable mirroring modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
}

/// Parsed iNES header
#[derive(Debug, Clone, Copy)]
pub struct InesHeader {
    /// PRG ROM size in 16KB units
    pub prg_pages: u8,
    /// CHR ROM size in 8KB units
    pub chr_pages: u8,
    /// Flags 6: mirroring, battery, trainer, low mapper nibble
    pub flags_6: u8,
    /// Flags 7: high mapper nibble
    pub flags_7: u8,
}

impl InesHeader {
    /// Parse an iNES header from the first 16 bytes of a ROM image
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::InvalidHeader("header too short"));
        }
        if bytes[0..4] != NES_MAGIC {
            return Err(CartridgeError::InvalidHeader("bad magic"));
        }

        Ok(Self {
            prg_pages: bytes[4],
            chr_pages: bytes[5],
            flags_6: bytes[6],
            flags_7: bytes[7],
        })
    }

    /// Mapper ID from the high nibbles of flags 6 and 7
    pub fn mapper(&self) -> u8 {
        (self.flags_6 >> 4) | (self.flags_7 & 0xF0)
    }

    /// Whether a 512-byte trainer precedes the PRG data
    pub fn has_trainer(&self) -> bool {
        (self.flags_6 & 0x04) != 0
    }

    /// Nametable mirroring from flags 6 bit 0
    pub fn mirroring(&self) -> Mirroring {
        if (self.flags_6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }
}

/// Immutable cartridge image: PRG ROM, CHR ROM, mapper and mirroring.
///
/// There is no write path; the bus drops writes into the ROM range.
#[derive(Debug, Clone)]
pub struct Cartridge {
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
    mapper: u8,
    mirroring: Mirroring,
}

impl Cartridge {
    /// Build a cartridge from a raw iNES file image.
    ///
    /// Unsupported mappers produce a warning and fall back to NROM
    /// semantics; truncated images are an error.
    pub fn from_rom(rom: &[u8]) -> Result<Self, CartridgeError> {
        let header = InesHeader::parse(rom)?;

        let mut offset = HEADER_SIZE;
        if header.has_trainer() {
            // Trainer data is skipped, never used
            offset += TRAINER_SIZE;
        }

        let prg_size = header.prg_pages as usize * PRG_PAGE_SIZE;
        let chr_size = header.chr_pages as usize * CHR_PAGE_SIZE;

        if prg_size == 0 {
            return Err(CartridgeError::InvalidData("no PRG ROM pages"));
        }
        if rom.len() < offset + prg_size {
            return Err(CartridgeError::InvalidData("PRG ROM truncated"));
        }
        let prg_rom = rom[offset..offset + prg_size].to_vec();
        offset += prg_size;

        if rom.len() < offset + chr_size {
            return Err(CartridgeError::InvalidData("CHR ROM truncated"));
        }
        let chr_rom = rom[offset..offset + chr_size].to_vec();

        let mapper = header.mapper();
        if mapper != 0 {
            warn!(mapper, "only mapper 0 (NROM) is supported, continuing anyway");
        }

        Ok(Self {
            prg_rom,
            chr_rom,
            mapper,
            mirroring: header.mirroring(),
        })
    }

    /// PRG ROM data (16KB or 32KB for NROM)
    pub fn prg(&self) -> &[u8] {
        &self.prg_rom
    }

    /// CHR ROM data (8KB pattern tables, possibly empty)
    pub fn chr(&self) -> &[u8] {
        &self.chr_rom
    }

    /// Mapper ID from the header
    pub fn mapper(&self) -> u8 {
        self.mapper
    }

    /// Nametable mirroring mode
    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

/// Cartridge loading errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeError {
    InvalidHeader(&'static str),
    InvalidData(&'static str),
}

impl std::fmt::Display for CartridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartridgeError::InvalidHeader(msg) => write!(f, "invalid iNES header: {}", msg),
            CartridgeError::InvalidData(msg) => write!(f, "invalid cartridge data: {}", msg),
        }
    }
}

impl std::error::Error for CartridgeError {}
