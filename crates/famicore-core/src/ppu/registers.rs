//! CPU-visible PPU register bit layouts.

use bitflags::bitflags;

bitflags! {
    /// PPU control register (`$2000`).
    ///
    /// Bit layout:
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// N M S B s I n n
    /// ```
    /// - `n n`: base nametable select (copied into `t.nametable`)
    /// - `I`: VRAM increment (0=+1, 1=+32)
    /// - `s`: sprite pattern table (8x8 sprites)
    /// - `B`: background pattern table
    /// - `S`: sprite size (0=8x8, 1=8x16)
    /// - `M`: master/slave select
    /// - `N`: generate NMI at VBlank start
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct Control: u8 {
        const NAMETABLE = 0b0000_0011;
        const INCREMENT_32 = 0b0000_0100;
        const SPRITE_TABLE = 0b0000_1000;
        const BACKGROUND_TABLE = 0b0001_0000;
        const SPRITE_SIZE_16 = 0b0010_0000;
        const MASTER_SLAVE = 0b0100_0000;
        const GENERATE_NMI = 0b1000_0000;
    }
}

impl Control {
    /// Nametable select bits (0..3).
    pub(crate) fn nametable_index(self) -> u16 {
        (self.bits() & 0b11) as u16
    }

    /// VRAM increment applied after `$2007` accesses.
    pub(crate) fn vram_increment(self) -> u16 {
        if self.contains(Control::INCREMENT_32) { 32 } else { 1 }
    }

    /// Pattern table bit (0 or 1) for 8x8 sprites.
    pub(crate) fn sprite_table(self) -> u16 {
        self.contains(Control::SPRITE_TABLE) as u16
    }

    /// Pattern table bit (0 or 1) for the background.
    pub(crate) fn background_table(self) -> u16 {
        self.contains(Control::BACKGROUND_TABLE) as u16
    }

    /// Sprite height in scanlines (8 or 16).
    pub(crate) fn sprite_height(self) -> u32 {
        if self.contains(Control::SPRITE_SIZE_16) { 16 } else { 8 }
    }

    pub(crate) fn nmi_enabled(self) -> bool {
        self.contains(Control::GENERATE_NMI)
    }
}

bitflags! {
    /// PPU mask register (`$2001`).
    ///
    /// The register is double-staged: a write lands on the *next* dot, and
    /// the two RENDER bits land one dot after that.
    ///
    /// Bit layout:
    /// ```text
    /// 7 6 5 4 3 2 1 0
    /// B G R S B s b g
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct Mask: u8 {
        const GRAYSCALE = 0b0000_0001;
        const LEFTMOST_BACKGROUND = 0b0000_0010;
        const LEFTMOST_SPRITES = 0b0000_0100;
        const BACKGROUND = 0b0000_1000;
        const SPRITES = 0b0001_0000;
        const EMPHASIZE_RED = 0b0010_0000;
        const EMPHASIZE_GREEN = 0b0100_0000;
        const EMPHASIZE_BLUE = 0b1000_0000;

        const RENDER = Self::BACKGROUND.bits() | Self::SPRITES.bits();
        const EMPHASIS = Self::EMPHASIZE_RED.bits()
            | Self::EMPHASIZE_GREEN.bits()
            | Self::EMPHASIZE_BLUE.bits();
    }
}

impl Mask {
    /// `true` when either background or sprite rendering is enabled.
    pub(crate) fn rendering_enabled(self) -> bool {
        self.intersects(Mask::RENDER)
    }
}

bitflags! {
    /// PPU status register (`$2002`).
    ///
    /// Only the top three bits are driven; the low five float on the open
    /// bus. Reading clears the vblank flag and the shared write toggle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct Status: u8 {
        const SPRITE_OVERFLOW = 0b0010_0000;
        const SPRITE_0_HIT = 0b0100_0000;
        const VBLANK_STARTED = 0b1000_0000;
    }
}
