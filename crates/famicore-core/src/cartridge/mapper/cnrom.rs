//! Mapper 3 (CNROM).
//!
//! PRG behaves like NROM. Writes anywhere in `$8000-$FFFF` select one of up
//! to four 8 KiB CHR ROM banks, masked to the bank count. Some boards also
//! carry 2 KiB of work RAM at `$6000`.

use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{chr_storage::ChrStorage, header::{Header, Mirroring}},
    memory::cpu as cpu_mem,
};

/// CHR bank granularity.
const CHR_BANK_SIZE: usize = 8 * 1024;
/// Optional work RAM window size at `$6000`.
const WRAM_SIZE: usize = 2 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cnrom {
    mirroring: Mirroring,
    chr_bank: usize,
    chr_bank_count: usize,
    /// 2 KiB WRAM, present on battery boards only; absent WRAM reads as
    /// open bus.
    wram: Vec<u8>,
}

impl Cnrom {
    pub(crate) fn new(header: &Header) -> Self {
        let chr_size = header.chr_rom_size.max(header.chr_ram_size());
        Self {
            mirroring: header.mirroring,
            chr_bank: 0,
            chr_bank_count: (chr_size / CHR_BANK_SIZE).max(1),
            wram: if header.battery {
                vec![0; WRAM_SIZE]
            } else {
                Vec::new()
            },
        }
    }

    pub(crate) fn cpu_read(&self, prg: &[u8], addr: u16) -> Option<u8> {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                if self.wram.is_empty() {
                    return None;
                }
                Some(self.wram[(addr - cpu_mem::PRG_RAM_START) as usize % self.wram.len()])
            }
            cpu_mem::PRG_ROM_START..=cpu_mem::CPU_ADDR_END => {
                Some(prg[(addr - cpu_mem::PRG_ROM_START) as usize % prg.len()])
            }
            _ => None,
        }
    }

    pub(crate) fn cpu_write(&mut self, addr: u16, data: u8) {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                if !self.wram.is_empty() {
                    let len = self.wram.len();
                    self.wram[(addr - cpu_mem::PRG_RAM_START) as usize % len] = data;
                }
            }
            cpu_mem::PRG_ROM_START..=cpu_mem::CPU_ADDR_END => {
                self.chr_bank = data as usize % self.chr_bank_count;
            }
            _ => {}
        }
    }

    pub(crate) fn chr_read(&self, chr: &ChrStorage, addr: u16) -> u8 {
        chr.read_indexed(self.chr_bank * CHR_BANK_SIZE, (addr & 0x1FFF) as usize)
    }

    pub(crate) fn chr_write(&mut self, chr: &mut ChrStorage, addr: u16, data: u8) {
        chr.write_indexed(self.chr_bank * CHR_BANK_SIZE, (addr & 0x1FFF) as usize, data);
    }

    pub(crate) fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub(crate) fn reset(&mut self) {
        self.chr_bank = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnrom(chr_banks: usize, battery: bool) -> (Cnrom, ChrStorage) {
        let header = Header {
            prg_rom_size: 0x8000,
            chr_rom_size: chr_banks * CHR_BANK_SIZE,
            mapper: 3,
            mirroring: Mirroring::Horizontal,
            battery,
            trainer: false,
            four_screen: false,
        };
        let mut chr = vec![0u8; chr_banks * CHR_BANK_SIZE];
        for bank in 0..chr_banks {
            chr[bank * CHR_BANK_SIZE] = bank as u8 + 1;
        }
        (Cnrom::new(&header), ChrStorage::Rom(chr))
    }

    #[test]
    fn switches_chr_banks_masked_to_count() {
        let (mut mapper, chr) = cnrom(2, false);
        assert_eq!(mapper.chr_read(&chr, 0x0000), 1);
        mapper.cpu_write(0x8000, 1);
        assert_eq!(mapper.chr_read(&chr, 0x0000), 2);
        // Bank 3 folds back onto bank 1 with only two banks present.
        mapper.cpu_write(0xFFFF, 3);
        assert_eq!(mapper.chr_read(&chr, 0x0000), 2);
    }

    #[test]
    fn wram_only_on_battery_boards() {
        let (mut with, _) = cnrom(1, true);
        with.cpu_write(0x6000, 0x5A);
        assert_eq!(with.cpu_read(&[0u8; 0x8000], 0x6000), Some(0x5A));

        let (mut without, _) = cnrom(1, false);
        without.cpu_write(0x6000, 0x5A);
        assert_eq!(without.cpu_read(&[0u8; 0x8000], 0x6000), None);
    }
}
