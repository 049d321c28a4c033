//! Mapper 2 (UxROM).
//!
//! Two 16 KiB PRG windows: `$8000-$BFFF` is switchable, `$C000-$FFFF` is
//! hardwired to the last bank. Writes to `$8000-$FFFF` select the low bank.
//! UxROM has no write decoder, so register writes conflict with the ROM byte
//! on the bus; the board only sees the write when the value matches what the
//! ROM drives (AND-type bus conflict).

use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{chr_storage::ChrStorage, header::{Header, Mirroring}},
    memory::cpu as cpu_mem,
};

/// PRG bank granularity.
pub(super) const PRG_BANK_SIZE: usize = 16 * 1024;

/// Bank-select mask for the board's PRG size (UNROM uses 3 bits, UOROM 4).
pub(super) fn bank_mask(prg_len: usize) -> u8 {
    if prg_len / PRG_BANK_SIZE < 16 { 0x07 } else { 0x0F }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uxrom {
    mirroring: Mirroring,
    bank: u8,
}

impl Uxrom {
    pub(crate) fn new(header: &Header) -> Self {
        Self {
            mirroring: header.mirroring,
            bank: 0,
        }
    }

    pub(crate) fn cpu_read(&self, prg: &[u8], addr: u16) -> Option<u8> {
        read_banked(prg, self.bank, addr)
    }

    pub(crate) fn cpu_write(&mut self, prg: &[u8], addr: u16, data: u8) {
        if addr < cpu_mem::PRG_ROM_START {
            return;
        }
        // Bus conflict: the written value must match the ROM byte underneath.
        if read_banked(prg, self.bank, addr) == Some(data) {
            self.bank = data & bank_mask(prg.len());
        }
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

    pub(crate) fn reset(&mut self) {
        self.bank = 0;
    }
}

/// Shared UxROM-style PRG decode: switchable low window, fixed last bank.
pub(super) fn read_banked(prg: &[u8], bank: u8, addr: u16) -> Option<u8> {
    if addr < cpu_mem::PRG_ROM_START {
        return None;
    }
    let bank_count = (prg.len() / PRG_BANK_SIZE).max(1);
    let offset = if addr >= 0xC000 {
        (bank_count - 1) * PRG_BANK_SIZE + (addr - 0xC000) as usize
    } else {
        (bank as usize % bank_count) * PRG_BANK_SIZE + (addr - 0x8000) as usize
    };
    Some(prg[offset % prg.len()])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prg(banks: usize) -> Vec<u8> {
        let mut data = vec![0u8; banks * PRG_BANK_SIZE];
        for bank in 0..banks {
            data[bank * PRG_BANK_SIZE] = bank as u8 + 1;
        }
        data
    }

    fn uxrom() -> Uxrom {
        Uxrom {
            mirroring: Mirroring::Vertical,
            bank: 0,
        }
    }

    #[test]
    fn high_window_is_fixed_to_last_bank() {
        let prg = prg(4);
        let mapper = uxrom();
        assert_eq!(mapper.cpu_read(&prg, 0xC000), Some(4));
        assert_eq!(mapper.cpu_read(&prg, 0x8000), Some(1));
    }

    #[test]
    fn write_switches_low_bank_on_matching_byte() {
        let mut data = prg(4);
        let mut mapper = uxrom();
        // Plant the value 2 at the write target so the bus conflict resolves
        // in favour of the write.
        data[0x0123] = 2;
        mapper.cpu_write(&data, 0x8123, 2);
        assert_eq!(mapper.cpu_read(&data, 0x8000), Some(3));
    }

    #[test]
    fn conflicting_write_is_dropped() {
        let data = prg(4);
        let mut mapper = uxrom();
        // ROM drives 1 at $8000; writing 2 loses the conflict.
        mapper.cpu_write(&data, 0x8000, 2);
        assert_eq!(mapper.cpu_read(&data, 0x8000), Some(1));
    }
}
