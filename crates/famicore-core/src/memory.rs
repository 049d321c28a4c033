//! Shared definitions for the NES memory map.
//!
//! Centralizing address-related constants keeps the hardware layout in one
//! location and makes it easier to reference the original console
//! documentation while reading the code base.

/// CPU memory map details.
pub mod cpu {
    /// First byte of CPU internal RAM.
    pub const INTERNAL_RAM_START: u16 = 0x0000;
    /// Last mirrored internal RAM address visible to the CPU (`$1FFF`).
    pub const INTERNAL_RAM_MIRROR_END: u16 = 0x1FFF;
    /// Size of the CPU internal RAM block (2 KiB mirrored through `$1FFF`).
    pub const INTERNAL_RAM_SIZE: usize = 0x0800;
    /// Mask applied to mirror CPU RAM accesses within `$0000-$1FFF`.
    pub const INTERNAL_RAM_MASK: u16 = (INTERNAL_RAM_SIZE as u16) - 1;

    /// First CPU address mapped to the PPU register mirror.
    pub const PPU_REGISTER_BASE: u16 = 0x2000;
    /// Last CPU address mirrored to the PPU register set.
    pub const PPU_REGISTER_END: u16 = 0x3FFF;

    /// First CPU-visible APU register.
    pub const APU_REGISTER_BASE: u16 = 0x4000;
    /// Final APU channel register before the DMA / status region.
    pub const APU_REGISTER_END: u16 = 0x4013;
    /// OAM DMA trigger register (`$4014`).
    pub const OAM_DMA: u16 = 0x4014;
    /// APU status register (`$4015`).
    pub const APU_STATUS: u16 = 0x4015;
    /// Controller port 1 strobe/read address (`$4016`).
    pub const CONTROLLER_PORT_1: u16 = 0x4016;
    /// Controller port 2 read address, shared with the frame counter (`$4017`).
    pub const CONTROLLER_PORT_2: u16 = 0x4017;
    /// APU frame counter configuration register (`$4017`, write side).
    pub const APU_FRAME_COUNTER: u16 = 0x4017;

    /// First address handled by the cartridge expansion space.
    pub const CARTRIDGE_SPACE_BASE: u16 = 0x4020;
    /// PRG RAM window start address (`$6000`).
    pub const PRG_RAM_START: u16 = 0x6000;
    /// PRG RAM window end address (inclusive).
    pub const PRG_RAM_END: u16 = 0x7FFF;
    /// PRG ROM window start address (`$8000`).
    pub const PRG_ROM_START: u16 = 0x8000;
    /// Final CPU-visible address (`$FFFF`).
    pub const CPU_ADDR_END: u16 = 0xFFFF;
}

/// PPU register layout and VRAM mirror rules.
pub mod ppu {
    /// Mask for decoding register mirrors (`addr & 0x0007`).
    pub const REGISTER_SELECT_MASK: u16 = 0x0007;

    /// Address mask applied to every external VRAM access (14-bit bus).
    pub const VRAM_MIRROR_MASK: u16 = 0x3FFF;

    /// Palette RAM base address (`$3F00`).
    pub const PALETTE_BASE: u16 = 0x3F00;
    /// Palette RAM byte count (32 bytes mirrored every 32 bytes).
    pub const PALETTE_RAM_SIZE: usize = 0x20;

    /// Base address of nametable 0.
    pub const NAMETABLE_BASE: u16 = 0x2000;
    /// Four nametable pages of 1 KiB each as seen by the mirroring logic.
    pub const NAMETABLE_SPACE: usize = 0x1000;

    /// Primary Object Attribute Memory (OAM) byte count.
    pub const OAM_RAM_SIZE: usize = 0x100;
    /// Secondary OAM byte count used during sprite evaluation.
    pub const SECONDARY_OAM_RAM_SIZE: usize = 0x20;

    /// Dots per scanline.
    pub const SCANLINE_WIDTH: u32 = 341;
    /// Scanlines per NTSC frame.
    pub const TOTAL_SCANLINES: u32 = 262;

    /// The scanline that precedes the first visible one.
    pub const PRE_RENDER_SCANLINE: u32 = 261;
    /// First visible scanline.
    pub const RENDER_BEGIN_SCANLINE: u32 = 0;
    /// First scanline past the visible region.
    pub const RENDER_END_SCANLINE: u32 = 240;
    /// First vblank scanline; `$2002.7` rises at dot 1.
    pub const VBLANK_BEGIN_SCANLINE: u32 = 241;

    /// CPU-visible PPU register identifiers (`addr & 7`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[repr(u8)]
    pub enum Register {
        /// `$2000` - PPUCTRL
        Control = 0,
        /// `$2001` - PPUMASK
        Mask = 1,
        /// `$2002` - PPUSTATUS
        Status = 2,
        /// `$2003` - OAMADDR
        OamAddr = 3,
        /// `$2004` - OAMDATA
        OamData = 4,
        /// `$2005` - PPUSCROLL
        Scroll = 5,
        /// `$2006` - PPUADDR
        Addr = 6,
        /// `$2007` - PPUDATA
        Data = 7,
    }

    impl Register {
        /// Resolves the canonical register for a CPU address in `$2000-$3FFF`.
        pub const fn from_cpu_addr(addr: u16) -> Self {
            match addr & REGISTER_SELECT_MASK {
                0 => Self::Control,
                1 => Self::Mask,
                2 => Self::Status,
                3 => Self::OamAddr,
                4 => Self::OamData,
                5 => Self::Scroll,
                6 => Self::Addr,
                _ => Self::Data,
            }
        }
    }
}

/// APU register layout.
pub mod apu {
    /// Start of the CPU-mapped APU register range.
    pub const REGISTER_BASE: u16 = 0x4000;
    /// Final channel register before the status and DMA bridges.
    pub const CHANNEL_REGISTER_END: u16 = 0x4013;
    /// Address of the status register (`$4015`).
    pub const STATUS: u16 = 0x4015;
    /// Address of the frame counter configuration register (`$4017`).
    pub const FRAME_COUNTER: u16 = 0x4017;

    /// Capacity of the mixed-sample ring buffer.
    pub const MAX_SAMPLES: usize = 4000;
    /// Samples are produced once per CPU cycle at the NTSC CPU clock.
    pub const SAMPLE_RATE: u32 = 1_789_773;
}

/// Shadow register window sizes kept for debugger-style memory reads.
pub mod shadow {
    /// One byte per PPU register (`$2000-$2007`, mirror-folded).
    pub const PPU_REG_COUNT: usize = 8;
    /// One byte per APU/IO register (`$4000-$401F`).
    pub const APUIO_REG_COUNT: usize = 0x20;
}
