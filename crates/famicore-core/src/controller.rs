//! Standard controller port model.
//!
//! A write of 1 to `$4016` strobes the pad: the eight buttons are latched
//! into a shift register, and successive `$4016` reads shift them out MSB
//! first (A, B, Select, Start, Up, Down, Left, Right). After eight reads the
//! port keeps returning 1.

use serde::{Deserialize, Serialize};

/// Buttons sampled by the input callback once per strobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub right: bool,
    pub left: bool,
    pub down: bool,
    pub up: bool,
    pub start: bool,
    pub select: bool,
    pub b: bool,
    pub a: bool,
}

impl ControllerState {
    /// Packs the buttons with A in bit 7 down to Right in bit 0.
    pub(crate) fn to_bits(self) -> u8 {
        (self.right as u8)
            | (self.left as u8) << 1
            | (self.down as u8) << 2
            | (self.up as u8) << 3
            | (self.start as u8) << 4
            | (self.select as u8) << 5
            | (self.b as u8) << 6
            | (self.a as u8) << 7
    }
}

/// Serial shift register behind `$4016`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct ControllerPort {
    shift: u8,
}

impl ControllerPort {
    /// Latches a fresh button sample.
    pub(crate) fn strobe(&mut self, state: ControllerState) {
        self.shift = state.to_bits();
    }

    /// Shifts out the next button bit, refilling with 1s.
    pub(crate) fn read(&mut self) -> u8 {
        let bit = self.shift >> 7;
        self.shift = (self.shift << 1) | 1;
        bit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifts_buttons_msb_first_then_ones() {
        let mut port = ControllerPort::default();
        port.strobe(ControllerState {
            a: true,
            right: true,
            ..ControllerState::default()
        });
        let bits: Vec<u8> = (0..10).map(|_| port.read()).collect();
        assert_eq!(bits, vec![1, 0, 0, 0, 0, 0, 0, 1, 1, 1]);
    }
}
