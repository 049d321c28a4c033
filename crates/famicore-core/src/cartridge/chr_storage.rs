//! CHR backing storage shared by all mappers.
//!
//! A board carries either CHR ROM or CHR RAM in the pattern-table window,
//! never both. Bank decoding stays in the individual mappers; this type only
//! resolves the final `(bank_base, offset)` pair against the right array.

use serde::{Deserialize, Serialize};

use crate::cartridge::header::Header;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ChrStorage {
    Rom(Vec<u8>),
    Ram(Vec<u8>),
}

impl ChrStorage {
    /// Picks ROM or RAM storage according to the header.
    pub(crate) fn select(header: &Header, chr_rom: Vec<u8>) -> Self {
        if header.chr_rom_size == 0 {
            Self::Ram(vec![0; header.chr_ram_size()])
        } else {
            Self::Rom(chr_rom)
        }
    }

    /// Unbanked read (8 KiB boards).
    pub(crate) fn read(&self, addr: u16) -> u8 {
        self.read_indexed(0, (addr & 0x1FFF) as usize)
    }

    /// Unbanked write (8 KiB boards).
    pub(crate) fn write(&mut self, addr: u16, data: u8) {
        self.write_indexed(0, (addr & 0x1FFF) as usize, data);
    }

    /// Read through a bank base resolved by the mapper.
    pub(crate) fn read_indexed(&self, base: usize, offset: usize) -> u8 {
        let data = match self {
            Self::Rom(data) | Self::Ram(data) => data,
        };
        if data.is_empty() {
            return 0;
        }
        data[(base + offset) % data.len()]
    }

    /// Write through a bank base; CHR ROM silently ignores writes.
    pub(crate) fn write_indexed(&mut self, base: usize, offset: usize, value: u8) {
        if let Self::Ram(data) = self {
            if data.is_empty() {
                return;
            }
            let len = data.len();
            data[(base + offset) % len] = value;
        }
    }

    /// CHR RAM contents when present, for savestate capture.
    pub(crate) fn ram(&self) -> Option<&[u8]> {
        match self {
            Self::Ram(data) => Some(data),
            Self::Rom(_) => None,
        }
    }

    pub(crate) fn ram_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Self::Ram(data) => Some(data),
            Self::Rom(_) => None,
        }
    }
}
