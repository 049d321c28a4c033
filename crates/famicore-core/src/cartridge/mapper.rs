//! Cartridge mapper registry and dispatch.
//!
//! Each board is a small struct with its own module; this module wires them
//! into the [`Mapper`] sum type the cartridge dispatches on. Keeping the
//! boards in an enum (instead of trait objects) keeps dispatch static, makes
//! the whole mapper state trivially serializable for savestates, and needs
//! no allocation on the hot paths.
//!
//! Nametable address translation also lives here: real boards own the CIRAM
//! address lines, so the mirroring decision is a mapper concern. Translation
//! resolves a PPU address in `$2000-$3EFF` to either an offset into the
//! console's nametable RAM or into mapper-private VRAM (four-screen MMC3).

use serde::{Deserialize, Serialize};

pub mod axrom;
pub mod cnrom;
pub mod mapper071;
pub mod mmc1;
pub mod mmc3;
pub mod nrom;
pub mod uxrom;

pub use axrom::Axrom;
pub use cnrom::Cnrom;
pub use mapper071::Mapper071;
pub use mmc1::Mmc1;
pub use mmc3::Mmc3;
pub use nrom::Nrom;
pub use uxrom::Uxrom;

use crate::{
    cartridge::{
        chr_storage::ChrStorage,
        header::{Header, Mirroring},
    },
    cpu::CpuState,
    error::Error,
};

/// Backing storage selected for a nametable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NametableTarget {
    /// Offset into the console's nametable RAM.
    Ciram(usize),
    /// Offset into mapper-private VRAM (four-screen boards).
    Mapper(usize),
}

/// Folds a PPU nametable address through a mirroring arrangement into an
/// offset within the 4 KiB nametable space.
pub(crate) fn mirror_nametable(mirroring: Mirroring, addr: u16) -> usize {
    let a = (addr as usize) & 0x0FFF;
    match mirroring {
        Mirroring::Vertical => a & 0x7FF,
        Mirroring::Horizontal => ((a / 2) & 0x400) + (a & 0x3FF),
        Mirroring::SingleLow => a & 0x3FF,
        Mirroring::SingleHigh => 0x800 + (a & 0x3FF),
        Mirroring::FourScreen => a,
    }
}

/// All cartridge boards known to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mapper {
    Nrom(Nrom),
    Mmc1(Mmc1),
    Uxrom(Uxrom),
    Cnrom(Cnrom),
    Mmc3(Mmc3),
    Axrom(Axrom),
    Mapper071(Mapper071),
}

impl Mapper {
    /// Builds the board matching the header's mapper id.
    pub(crate) fn from_header(header: &Header) -> Result<Self, Error> {
        let mapper = match header.mapper {
            0 => Self::Nrom(Nrom::new(header)),
            1 => Self::Mmc1(Mmc1::new(header)),
            2 => Self::Uxrom(Uxrom::new(header)),
            3 => Self::Cnrom(Cnrom::new(header)),
            4 => Self::Mmc3(Mmc3::new(header)),
            7 => Self::Axrom(Axrom::new(header)),
            71 => Self::Mapper071(Mapper071::new(header)),
            other => return Err(Error::UnsupportedMapper(other)),
        };
        Ok(mapper)
    }

    /// iNES mapper id of the selected board.
    pub fn id(&self) -> u16 {
        match self {
            Self::Nrom(_) => 0,
            Self::Mmc1(_) => 1,
            Self::Uxrom(_) => 2,
            Self::Cnrom(_) => 3,
            Self::Mmc3(_) => 4,
            Self::Axrom(_) => 7,
            Self::Mapper071(_) => 71,
        }
    }

    /// Human readable board name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nrom(_) => "NROM",
            Self::Mmc1(_) => "MMC1",
            Self::Uxrom(_) => "UxROM",
            Self::Cnrom(_) => "CNROM",
            Self::Mmc3(_) => "MMC3",
            Self::Axrom(_) => "AxROM",
            Self::Mapper071(_) => "Camerica",
        }
    }

    /// CPU-visible read in `$4020-$FFFF`; `None` leaves the bus floating.
    pub(crate) fn cpu_read(&self, prg: &[u8], addr: u16) -> Option<u8> {
        match self {
            Self::Nrom(m) => m.cpu_read(prg, addr),
            Self::Mmc1(m) => m.cpu_read(prg, addr),
            Self::Uxrom(m) => m.cpu_read(prg, addr),
            Self::Cnrom(m) => m.cpu_read(prg, addr),
            Self::Mmc3(m) => m.cpu_read(prg, addr),
            Self::Axrom(m) => m.cpu_read(prg, addr),
            Self::Mapper071(m) => m.cpu_read(prg, addr),
        }
    }

    pub(crate) fn cpu_write(&mut self, prg: &[u8], addr: u16, data: u8) {
        match self {
            Self::Nrom(_) => {}
            Self::Mmc1(m) => m.cpu_write(addr, data),
            Self::Uxrom(m) => m.cpu_write(prg, addr, data),
            Self::Cnrom(m) => m.cpu_write(addr, data),
            Self::Mmc3(m) => m.cpu_write(addr, data),
            Self::Axrom(m) => m.cpu_write(addr, data),
            Self::Mapper071(m) => m.cpu_write(prg.len(), addr, data),
        }
    }

    /// Pattern-table read (`$0000-$1FFF` of the PPU bus).
    pub(crate) fn chr_read(&self, chr: &ChrStorage, addr: u16) -> u8 {
        match self {
            Self::Nrom(m) => m.chr_read(chr, addr),
            Self::Mmc1(m) => m.chr_read(chr, addr),
            Self::Uxrom(m) => m.chr_read(chr, addr),
            Self::Cnrom(m) => m.chr_read(chr, addr),
            Self::Mmc3(m) => m.chr_read(chr, addr),
            Self::Axrom(m) => m.chr_read(chr, addr),
            Self::Mapper071(m) => m.chr_read(chr, addr),
        }
    }

    /// Pattern-table write; CHR ROM boards drop it.
    pub(crate) fn chr_write(&mut self, chr: &mut ChrStorage, addr: u16, data: u8) {
        match self {
            Self::Nrom(m) => m.chr_write(chr, addr, data),
            Self::Mmc1(m) => m.chr_write(chr, addr, data),
            Self::Uxrom(m) => m.chr_write(chr, addr, data),
            Self::Cnrom(m) => m.chr_write(chr, addr, data),
            Self::Mmc3(m) => m.chr_write(chr, addr, data),
            Self::Axrom(m) => m.chr_write(chr, addr, data),
            Self::Mapper071(m) => m.chr_write(chr, addr, data),
        }
    }

    /// Resolves a nametable access to its backing storage.
    pub(crate) fn map_nametable(&self, addr: u16) -> NametableTarget {
        if let Self::Mmc3(m) = self {
            if m.four_screen() {
                return NametableTarget::Mapper((addr as usize) & 0x0FFF);
            }
        }
        NametableTarget::Ciram(mirror_nametable(self.mirroring(), addr))
    }

    /// Mapper-private nametable read (four-screen boards only).
    pub(crate) fn nt_read(&self, offset: usize) -> u8 {
        match self {
            Self::Mmc3(m) => m.nt_read(offset),
            _ => 0,
        }
    }

    /// Mapper-private nametable write (four-screen boards only).
    pub(crate) fn nt_write(&mut self, offset: usize, data: u8) {
        if let Self::Mmc3(m) = self {
            m.nt_write(offset, data);
        }
    }

    /// Current nametable arrangement.
    pub fn mirroring(&self) -> Mirroring {
        match self {
            Self::Nrom(m) => m.mirroring(),
            Self::Mmc1(m) => m.mirroring(),
            Self::Uxrom(m) => m.mirroring(),
            Self::Cnrom(m) => m.mirroring(),
            Self::Mmc3(m) => m.mirroring(),
            Self::Axrom(m) => m.mirroring(),
            Self::Mapper071(m) => m.mirroring(),
        }
    }

    /// `true` when the board asserts the CPU IRQ line.
    pub(crate) fn irq_pending(&self) -> bool {
        match self {
            Self::Mmc3(m) => m.irq_pending(),
            _ => false,
        }
    }

    /// Per-system-tick hook: MMC3 watches the PPU address bus, MMC1 re-arms
    /// its serial port at instruction boundaries.
    pub(crate) fn tick(&mut self, cpu: &CpuState, ppu_address: u16, frame_dot: u32) {
        match self {
            Self::Mmc1(m) => m.tick(cpu),
            Self::Mmc3(m) => m.tick(ppu_address, frame_dot),
            _ => {}
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            Self::Nrom(_) => {}
            Self::Mmc1(m) => m.reset(),
            Self::Uxrom(m) => m.reset(),
            Self::Cnrom(m) => m.reset(),
            Self::Mmc3(m) => m.reset(),
            Self::Axrom(m) => m.reset(),
            Self::Mapper071(m) => m.reset(),
        }
    }
}
