//! Length counter shared by pulse, triangle, and noise channels.

use serde::{Deserialize, Serialize};

use super::tables::LENGTH_TABLE;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(super) struct LengthCounter {
    value: u8,
    halt: bool,
}

impl LengthCounter {
    pub(super) fn active(&self) -> bool {
        self.value > 0
    }

    /// Loads from the 5-bit length index; disabled channels stay cleared.
    pub(super) fn load(&mut self, index: u8, enabled: bool) {
        if enabled {
            self.value = LENGTH_TABLE[index as usize];
        }
    }

    pub(super) fn set_halt(&mut self, halt: bool) {
        self.halt = halt;
    }

    pub(super) fn clear(&mut self) {
        self.value = 0;
    }

    /// Half-frame clock.
    pub(super) fn clock(&mut self) {
        if self.value > 0 && !self.halt {
            self.value -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_table_only_when_enabled() {
        let mut lc = LengthCounter::default();
        lc.load(1, false);
        assert!(!lc.active());
        lc.load(1, true);
        assert!(lc.active());
    }

    #[test]
    fn halt_freezes_the_count() {
        let mut lc = LengthCounter::default();
        lc.load(3, true); // 2
        lc.set_halt(true);
        lc.clock();
        assert!(lc.active());
        lc.set_halt(false);
        lc.clock();
        lc.clock();
        assert!(!lc.active());
    }
}
