//! Mapper 0 (NROM).
//!
//! No banking at all: the CPU sees PRG ROM mirrored to fill `$8000-$FFFF`
//! (16 KiB boards repeat at `$C000`), the PPU sees CHR straight from ROM or
//! RAM, and nametable arrangement comes from the solder pads recorded in the
//! iNES header.

use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{chr_storage::ChrStorage, header::{Header, Mirroring}},
    memory::cpu as cpu_mem,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nrom {
    mirroring: Mirroring,
}

impl Nrom {
    pub(crate) fn new(header: &Header) -> Self {
        Self {
            mirroring: header.mirroring,
        }
    }

    pub(crate) fn cpu_read(&self, prg: &[u8], addr: u16) -> Option<u8> {
        if addr < cpu_mem::PRG_ROM_START {
            return None;
        }
        let offset = (addr - cpu_mem::PRG_ROM_START) as usize % prg.len();
        Some(prg[offset])
    }

    pub(crate) fn chr_read(&self, chr: &ChrStorage, addr: u16) -> u8 {
        chr.read(addr)
    }

    pub(crate) fn chr_write(&self, chr: &mut ChrStorage, addr: u16, data: u8) {
        chr.write(addr, data);
    }

    pub(crate) fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prg: usize) -> Header {
        Header {
            prg_rom_size: prg,
            chr_rom_size: 8 * 1024,
            mapper: 0,
            mirroring: Mirroring::Vertical,
            battery: false,
            trainer: false,
            four_screen: false,
        }
    }

    #[test]
    fn mirrors_16k_prg() {
        let nrom = Nrom::new(&header(0x4000));
        let prg: Vec<u8> = (0..0x4000).map(|i| (i & 0xFF) as u8).collect();
        assert_eq!(nrom.cpu_read(&prg, 0x8123), nrom.cpu_read(&prg, 0xC123));
    }

    #[test]
    fn maps_32k_prg_linearly() {
        let nrom = Nrom::new(&header(0x8000));
        let mut prg = vec![0u8; 0x8000];
        prg[0x7FFC] = 0xAB;
        assert_eq!(nrom.cpu_read(&prg, 0xFFFC), Some(0xAB));
    }

    #[test]
    fn wram_window_is_open_bus() {
        let nrom = Nrom::new(&header(0x4000));
        let prg = vec![0u8; 0x4000];
        assert_eq!(nrom.cpu_read(&prg, 0x6000), None);
    }
}
