//! Cartridge loading and the board-facing access paths.
//!
//! A [`Cartridge`] owns the PRG ROM, the CHR storage (ROM or RAM, never
//! both), and the mapper state. All CPU/PPU traffic into cartridge space is
//! routed through here so the mapper sum type stays the single authority on
//! banking, mirroring, and IRQ generation.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{chr_storage::ChrStorage, header::Header, mapper::Mapper},
    cpu::CpuState,
    error::Error,
};

pub mod a12;
pub(crate) mod chr_storage;
pub mod header;
pub mod mapper;

pub use header::Mirroring;
pub use mapper::NametableTarget;

use header::{NES_HEADER_LEN, TRAINER_SIZE};

#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Header,
    prg_rom: Vec<u8>,
    chr: ChrStorage,
    mapper: Mapper,
}

/// Mapper-local portion of a savestate: banking registers, work RAM, and CHR
/// RAM contents. ROM data never travels with the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartridgeState {
    mapper: Mapper,
    chr_ram: Vec<u8>,
}

impl Cartridge {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mapper.mirroring()
    }

    /// CPU-visible read in `$4020-$FFFF`; `None` leaves the bus floating.
    pub fn cpu_read(&self, addr: u16) -> Option<u8> {
        self.mapper.cpu_read(&self.prg_rom, addr)
    }

    pub fn cpu_write(&mut self, addr: u16, data: u8) {
        self.mapper.cpu_write(&self.prg_rom, addr, data);
    }

    /// Pattern-table read on the PPU bus (`$0000-$1FFF`).
    pub fn chr_read(&self, addr: u16) -> u8 {
        self.mapper.chr_read(&self.chr, addr)
    }

    pub fn chr_write(&mut self, addr: u16, data: u8) {
        self.mapper.chr_write(&mut self.chr, addr, data);
    }

    /// Resolves a nametable access (`$2000-$3EFF`) to its backing storage.
    pub fn map_nametable(&self, addr: u16) -> NametableTarget {
        self.mapper.map_nametable(addr)
    }

    /// Mapper-private nametable read, valid after [`Self::map_nametable`]
    /// selected mapper VRAM.
    pub fn nt_read(&self, offset: usize) -> u8 {
        self.mapper.nt_read(offset)
    }

    pub fn nt_write(&mut self, offset: usize, data: u8) {
        self.mapper.nt_write(offset, data);
    }

    pub fn irq_pending(&self) -> bool {
        self.mapper.irq_pending()
    }

    /// Per-system-tick mapper hook; runs after the PPU dots of the cycle.
    pub fn tick(&mut self, cpu: &CpuState, ppu_address: u16, frame_dot: u32) {
        self.mapper.tick(cpu, ppu_address, frame_dot);
    }

    pub fn reset(&mut self) {
        self.mapper.reset();
    }

    pub(crate) fn save_state(&self) -> CartridgeState {
        CartridgeState {
            mapper: self.mapper.clone(),
            chr_ram: self.chr.ram().map(<[u8]>::to_vec).unwrap_or_default(),
        }
    }

    pub(crate) fn load_state(&mut self, state: &CartridgeState) {
        self.mapper = state.mapper.clone();
        if let Some(ram) = self.chr.ram_mut() {
            if ram.len() == state.chr_ram.len() {
                ram.copy_from_slice(&state.chr_ram);
            }
        }
    }
}

/// Builds a cartridge from an in-memory iNES image.
pub fn load_cartridge(bytes: &[u8]) -> Result<Cartridge, Error> {
    let header = Header::parse(bytes)?;

    let mut cursor = NES_HEADER_LEN;
    if header.trainer {
        // The 512-byte trainer is a relic of copier hardware; skip it.
        cursor = slice_section(bytes, cursor, TRAINER_SIZE, "trainer")?.1;
    }
    let (prg_rom, cursor) = slice_section(bytes, cursor, header.prg_rom_size, "PRG ROM")?;
    let (chr_rom, _) = slice_section(bytes, cursor, header.chr_rom_size, "CHR ROM")?;

    let mapper = Mapper::from_header(&header)?;
    tracing::info!(
        mapper = mapper.name(),
        mapper_id = header.mapper,
        prg_kib = header.prg_rom_size / 1024,
        chr_kib = header.chr_rom_size / 1024,
        chr_ram_kib = header.chr_ram_size() / 1024,
        mirroring = ?header.mirroring,
        "loaded cartridge"
    );

    Ok(Cartridge {
        header,
        prg_rom: prg_rom.to_vec(),
        chr: ChrStorage::select(&header, chr_rom.to_vec()),
        mapper,
    })
}

/// Loads a cartridge straight from disk.
pub fn load_cartridge_from_file<P: AsRef<Path>>(path: P) -> Result<Cartridge, Error> {
    let bytes = fs::read(path)?;
    load_cartridge(&bytes)
}

fn slice_section<'a>(
    bytes: &'a [u8],
    cursor: usize,
    len: usize,
    name: &'static str,
) -> Result<(&'a [u8], usize), Error> {
    let end = cursor.checked_add(len).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(cursor),
    })?;
    let slice = bytes.get(cursor..end).ok_or(Error::SectionTooShort {
        section: name,
        expected: len,
        actual: bytes.len().saturating_sub(cursor),
    })?;
    Ok((slice, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_image(prg_banks: u8, chr_banks: u8, flags6: u8) -> Vec<u8> {
        let mut rom = vec![
            b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        rom.extend(vec![0xAA; prg_banks as usize * 16 * 1024]);
        rom.extend(vec![0x55; chr_banks as usize * 8 * 1024]);
        rom
    }

    #[test]
    fn loads_basic_nrom_cartridge() {
        let cartridge = load_cartridge(&rom_image(1, 1, 0)).expect("parse cartridge");
        assert_eq!(cartridge.header().prg_rom_size, 16 * 1024);
        assert_eq!(cartridge.cpu_read(0x8000), Some(0xAA));
        assert_eq!(cartridge.chr_read(0x0000), 0x55);
    }

    #[test]
    fn skips_trainer_section() {
        let mut rom = vec![
            b'N', b'E', b'S', 0x1A, 1, 0, 0b0000_0100, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        rom.extend(vec![0xFE; TRAINER_SIZE]);
        rom.extend(vec![0xAA; 16 * 1024]);
        let cartridge = load_cartridge(&rom).expect("parse cartridge");
        assert_eq!(cartridge.cpu_read(0x8000), Some(0xAA));
    }

    #[test]
    fn chr_ram_boards_accept_writes() {
        let mut cartridge = load_cartridge(&rom_image(1, 0, 0)).expect("parse cartridge");
        cartridge.chr_write(0x0010, 0x77);
        assert_eq!(cartridge.chr_read(0x0010), 0x77);
    }

    #[test]
    fn errors_when_prg_section_missing() {
        let mut rom = rom_image(2, 0, 0);
        rom.truncate(NES_HEADER_LEN + 1024);
        let err = load_cartridge(&rom).expect_err("should fail");
        assert!(matches!(
            err,
            Error::SectionTooShort {
                section: "PRG ROM",
                ..
            }
        ));
    }

    #[test]
    fn state_round_trip_preserves_chr_ram() {
        let mut cartridge = load_cartridge(&rom_image(1, 0, 0)).expect("parse cartridge");
        cartridge.chr_write(0x0123, 0x5A);
        let state = cartridge.save_state();

        let mut other = load_cartridge(&rom_image(1, 0, 0)).expect("parse cartridge");
        other.load_state(&state);
        assert_eq!(other.chr_read(0x0123), 0x5A);
    }
}
