//! Mapper 4 (MMC3).
//!
//! Eight 8-bit bank registers selected through a 3-bit index at `$8000`,
//! even/odd register pairs across the four PRG windows:
//!
//! | Address | even            | odd              |
//! |---------|-----------------|------------------|
//! | `$8000` | bank select     | bank data        |
//! | `$A000` | mirroring       | PRG-RAM protect  |
//! | `$C000` | IRQ latch       | IRQ reload       |
//! | `$E000` | IRQ disable/ack | IRQ enable       |
//!
//! PRG mode (bank select bit 6) toggles which of `$8000`/`$C000` holds the
//! fixed second-to-last bank; `$E000` always maps the last bank. CHR mode
//! (bit 7) swaps the 2×2 KiB and 4×1 KiB halves of the pattern space.
//! The scanline IRQ counter clocks on debounced PPU A12 rising edges.

use serde::{Deserialize, Serialize};

use crate::{
    cartridge::{
        a12::A12Watcher,
        chr_storage::ChrStorage,
        header::{Header, Mirroring},
    },
    memory::cpu as cpu_mem,
};

/// PRG bank granularity.
const PRG_BANK_SIZE: usize = 8 * 1024;
/// CHR banking granularity.
const CHR_BANK_SIZE: usize = 1024;
/// Work RAM size at `$6000`.
const WRAM_SIZE: usize = 8 * 1024;
/// Mapper-local nametable RAM on four-screen boards.
const FOUR_SCREEN_VRAM_SIZE: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mmc3 {
    mirroring: Mirroring,
    four_screen: bool,

    /// Bank select register: bits 0-2 target register, bit 6 PRG mode,
    /// bit 7 CHR A12 inversion.
    bank_select: u8,
    /// R0-R5 drive CHR, R6-R7 drive the switchable PRG windows.
    bank_regs: [u8; 8],

    prg_ram_enable: bool,
    prg_ram_write_protect: bool,
    wram: Vec<u8>,

    irq_reload_value: u8,
    irq_counter: u8,
    irq_reload_flag: bool,
    irq_enabled: bool,
    has_irq: bool,

    a12: A12Watcher,

    /// Private 4 KiB nametable region on four-screen boards.
    four_screen_vram: Vec<u8>,
}

impl Mmc3 {
    pub(crate) fn new(header: &Header) -> Self {
        Self {
            mirroring: header.mirroring,
            four_screen: header.four_screen,
            bank_select: 0,
            bank_regs: [0; 8],
            prg_ram_enable: true,
            prg_ram_write_protect: false,
            wram: vec![0; WRAM_SIZE],
            irq_reload_value: 0,
            irq_counter: 0,
            irq_reload_flag: false,
            irq_enabled: false,
            has_irq: false,
            a12: A12Watcher::default(),
            four_screen_vram: if header.four_screen {
                vec![0; FOUR_SCREEN_VRAM_SIZE]
            } else {
                Vec::new()
            },
        }
    }

    #[inline]
    fn chr_invert(&self) -> bool {
        self.bank_select & 0x80 != 0
    }

    #[inline]
    fn prg_swap_at_c000(&self) -> bool {
        self.bank_select & 0x40 != 0
    }

    pub(crate) fn cpu_read(&self, prg: &[u8], addr: u16) -> Option<u8> {
        match addr {
            cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END => {
                if !self.prg_ram_enable {
                    return None;
                }
                Some(self.wram[(addr - cpu_mem::PRG_RAM_START) as usize % WRAM_SIZE])
            }
            cpu_mem::PRG_ROM_START..=cpu_mem::CPU_ADDR_END => Some(self.read_prg_rom(prg, addr)),
            _ => None,
        }
    }

    fn read_prg_rom(&self, prg: &[u8], addr: u16) -> u8 {
        let bank_count = (prg.len() / PRG_BANK_SIZE).max(1);
        let last = bank_count - 1;
        let second_last = bank_count.saturating_sub(2);

        let slot = (addr as usize - 0x8000) / PRG_BANK_SIZE;
        let bank = match (self.prg_swap_at_c000(), slot) {
            (false, 0) => self.bank_regs[6] as usize % bank_count,
            (true, 0) => second_last,
            (_, 1) => self.bank_regs[7] as usize % bank_count,
            (false, 2) => second_last,
            (true, 2) => self.bank_regs[6] as usize % bank_count,
            _ => last,
        };

        let offset = (addr as usize - 0x8000) & (PRG_BANK_SIZE - 1);
        prg[(bank * PRG_BANK_SIZE + offset) % prg.len()]
    }

    pub(crate) fn cpu_write(&mut self, addr: u16, data: u8) {
        if (cpu_mem::PRG_RAM_START..=cpu_mem::PRG_RAM_END).contains(&addr) {
            if self.prg_ram_enable && !self.prg_ram_write_protect {
                self.wram[(addr - cpu_mem::PRG_RAM_START) as usize % WRAM_SIZE] = data;
            }
            return;
        }
        if addr < cpu_mem::PRG_ROM_START {
            return;
        }

        match (addr & 0xE000, addr & 1) {
            (0x8000, 0) => self.bank_select = data,
            (0x8000, _) => {
                self.bank_regs[(self.bank_select & 0x07) as usize] = data;
            }
            (0xA000, 0) => {
                // Four-screen boards hardwire their layout and ignore this.
                if !self.four_screen {
                    self.mirroring = if data & 1 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    };
                }
            }
            (0xA000, _) => {
                self.prg_ram_enable = data & 0x80 != 0;
                self.prg_ram_write_protect = data & 0x40 != 0;
            }
            (0xC000, 0) => self.irq_reload_value = data,
            (0xC000, _) => {
                self.irq_counter = 0;
                self.irq_reload_flag = true;
            }
            (0xE000, 0) => {
                self.irq_enabled = false;
                self.has_irq = false;
            }
            _ => self.irq_enabled = true,
        }
    }

    fn chr_base(&self, addr: u16) -> (usize, usize) {
        let a = addr & 0x1FFF;
        let offset = a as usize;

        // With A12 inversion the 2 KiB pair moves to $1000 and the 1 KiB
        // quartet to $0000; flipping bit 12 of the lookup address reuses one
        // table for both layouts.
        let lookup = if self.chr_invert() { a ^ 0x1000 } else { a };

        let (reg, window_base) = match lookup {
            0x0000..=0x07FF => (0, 0x0000),
            0x0800..=0x0FFF => (1, 0x0800),
            0x1000..=0x13FF => (2, 0x1000),
            0x1400..=0x17FF => (3, 0x1400),
            0x1800..=0x1BFF => (4, 0x1800),
            _ => (5, 0x1C00),
        };

        // R0/R1 address 2 KiB banks; hardware forces their low bit to 0.
        let bank = if reg < 2 {
            (self.bank_regs[reg] & !1) as usize
        } else {
            self.bank_regs[reg] as usize
        };
        let window_base = if self.chr_invert() {
            window_base ^ 0x1000
        } else {
            window_base
        };
        (bank * CHR_BANK_SIZE, offset - window_base)
    }

    pub(crate) fn chr_read(&self, chr: &ChrStorage, addr: u16) -> u8 {
        let (base, offset) = self.chr_base(addr);
        chr.read_indexed(base, offset)
    }

    pub(crate) fn chr_write(&mut self, chr: &mut ChrStorage, addr: u16, data: u8) {
        let (base, offset) = self.chr_base(addr);
        chr.write_indexed(base, offset, data);
    }

    /// Observes the PPU address bus once per system tick and clocks the IRQ
    /// counter on qualifying A12 rising edges.
    pub(crate) fn tick(&mut self, ppu_address: u16, frame_dot: u32) {
        if self.a12.observe(ppu_address, frame_dot) {
            self.clock_irq_counter();
        }
    }

    fn clock_irq_counter(&mut self) {
        if self.irq_counter == 0 || self.irq_reload_flag {
            self.irq_counter = self.irq_reload_value;
            self.irq_reload_flag = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.has_irq = true;
        }
    }

    pub(crate) fn irq_pending(&self) -> bool {
        self.has_irq
    }

    pub(crate) fn four_screen(&self) -> bool {
        self.four_screen
    }

    pub(crate) fn nt_read(&self, offset: usize) -> u8 {
        self.four_screen_vram[offset % FOUR_SCREEN_VRAM_SIZE]
    }

    pub(crate) fn nt_write(&mut self, offset: usize, data: u8) {
        self.four_screen_vram[offset % FOUR_SCREEN_VRAM_SIZE] = data;
    }

    pub(crate) fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub(crate) fn reset(&mut self) {
        self.bank_select = 0;
        self.bank_regs = [0; 8];
        self.prg_ram_enable = true;
        self.prg_ram_write_protect = false;
        self.irq_reload_value = 0;
        self.irq_counter = 0;
        self.irq_reload_flag = false;
        self.irq_enabled = false;
        self.has_irq = false;
        self.a12.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mmc3(prg_banks: usize) -> (Mmc3, Vec<u8>) {
        let header = Header {
            prg_rom_size: prg_banks * PRG_BANK_SIZE,
            chr_rom_size: 128 * 1024,
            mapper: 4,
            mirroring: Mirroring::Horizontal,
            battery: false,
            trainer: false,
            four_screen: false,
        };
        let mut prg = vec![0u8; prg_banks * PRG_BANK_SIZE];
        for bank in 0..prg_banks {
            prg[bank * PRG_BANK_SIZE] = bank as u8 + 1;
        }
        (Mmc3::new(&header), prg)
    }

    fn chr_rom() -> ChrStorage {
        let mut data = vec![0u8; 128 * 1024];
        for bank in 0..128 {
            data[bank * CHR_BANK_SIZE] = bank as u8;
        }
        ChrStorage::Rom(data)
    }

    #[test]
    fn last_bank_always_at_e000() {
        let (m, prg) = mmc3(16);
        assert_eq!(m.cpu_read(&prg, 0xE000), Some(16));
    }

    #[test]
    fn prg_mode_swaps_fixed_window() {
        let (mut m, prg) = mmc3(16);
        m.cpu_write(0x8000, 6);
        m.cpu_write(0x8001, 3);
        assert_eq!(m.cpu_read(&prg, 0x8000), Some(4));
        assert_eq!(m.cpu_read(&prg, 0xC000), Some(15));

        m.cpu_write(0x8000, 6 | 0x40);
        assert_eq!(m.cpu_read(&prg, 0x8000), Some(15));
        assert_eq!(m.cpu_read(&prg, 0xC000), Some(4));
    }

    #[test]
    fn chr_inversion_swaps_halves() {
        let (mut m, _) = mmc3(16);
        let chr = chr_rom();
        m.cpu_write(0x8000, 0);
        m.cpu_write(0x8001, 8); // R0 = bank 8 (2 KiB, low bit forced clear)
        m.cpu_write(0x8000, 2);
        m.cpu_write(0x8001, 40); // R2 = bank 40
        assert_eq!(m.chr_read(&chr, 0x0000), 8);
        assert_eq!(m.chr_read(&chr, 0x1000), 40);

        m.cpu_write(0x8000, 0x80);
        assert_eq!(m.chr_read(&chr, 0x1000), 8);
        assert_eq!(m.chr_read(&chr, 0x0000), 40);
    }

    #[test]
    fn irq_counter_reloads_and_fires_on_zero() {
        let (mut m, _) = mmc3(16);
        m.cpu_write(0xC000, 2); // latch
        m.cpu_write(0xC001, 0); // reload strobe
        m.cpu_write(0xE001, 0); // enable

        // Rising edges 8 dots apart pass the filter.
        let mut dot = 0;
        let mut rises = 0;
        while !m.irq_pending() {
            m.tick(0x1000, dot);
            m.tick(0x0000, dot + 4);
            dot += 8;
            rises += 1;
            assert!(rises < 10, "irq should fire after the counter drains");
        }
        // Reload (2), decrement (1), decrement to zero -> IRQ.
        assert_eq!(rises, 3);
    }

    #[test]
    fn e000_write_acks_and_disables() {
        let (mut m, _) = mmc3(16);
        m.cpu_write(0xC000, 0);
        m.cpu_write(0xC001, 0);
        m.cpu_write(0xE001, 0);
        m.tick(0x1000, 0);
        assert!(m.irq_pending());
        m.cpu_write(0xE000, 0);
        assert!(!m.irq_pending());
    }

    #[test]
    fn four_screen_board_uses_private_vram() {
        let header = Header {
            prg_rom_size: 2 * PRG_BANK_SIZE,
            chr_rom_size: 8 * 1024,
            mapper: 4,
            mirroring: Mirroring::FourScreen,
            battery: false,
            trainer: false,
            four_screen: true,
        };
        let mut m = Mmc3::new(&header);
        m.nt_write(0x0C03, 0x99);
        assert_eq!(m.nt_read(0x0C03), 0x99);
        // $A000 mirroring writes are ignored.
        m.cpu_write(0xA000, 1);
        assert_eq!(m.mirroring(), Mirroring::FourScreen);
    }
}
