//! Triangle channel and its linear counter.

use serde::{Deserialize, Serialize};

use super::{length_counter::LengthCounter, tables::TRIANGLE_SEQUENCE};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(super) struct Triangle {
    control_flag: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    pub(super) length: LengthCounter,
    timer_period: u16,
    timer: u16,
    sequence_pos: u8,
    last_output: u8,
    enabled: bool,
}

impl Triangle {
    /// `$4008`: control flag and linear counter reload value.
    pub(super) fn write_control(&mut self, value: u8) {
        self.control_flag = value & 0b1000_0000 != 0;
        self.linear_reload_value = value & 0b0111_1111;
        self.length.set_halt(self.control_flag);
    }

    /// `$400A`: timer low byte.
    pub(super) fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | value as u16;
    }

    /// `$400B`: timer high bits and length load; arms the linear reload.
    pub(super) fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.length.load(value >> 3, self.enabled);
        self.linear_reload = true;
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// Quarter-frame clock.
    pub(super) fn clock_linear_counter(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }

        if !self.control_flag {
            self.linear_reload = false;
        }
    }

    pub(super) fn clock_length(&mut self) {
        self.length.clock();
    }

    /// Timer tick; unlike the other channels this runs every CPU cycle.
    /// Periods of 0/1 would step the sequencer at ultrasonic rates (and on
    /// hardware produce a pop), so the sequence only advances above that.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 && self.timer_period > 1 {
                self.sequence_pos = (self.sequence_pos + 1) & 0x1F;
                self.last_output = TRIANGLE_SEQUENCE[self.sequence_pos as usize];
            }
        } else {
            self.timer -= 1;
        }
    }

    /// The DAC holds its last level while the channel is gated.
    pub(super) fn output(&self) -> u8 {
        self.last_output
    }

    pub(super) fn length_active(&self) -> bool {
        self.length.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armed_triangle(period: u16) -> Triangle {
        let mut tri = Triangle::default();
        tri.set_enabled(true);
        tri.write_control(0x40); // linear reload 0x40
        tri.write_timer_low((period & 0xFF) as u8);
        tri.write_timer_high(0x08 | (period >> 8) as u8); // length 254
        tri.clock_linear_counter();
        tri
    }

    #[test]
    fn walks_the_32_step_sequence() {
        let mut tri = armed_triangle(4);
        let mut seen = Vec::new();
        for _ in 0..32 {
            for _ in 0..5 {
                tri.clock_timer();
            }
            seen.push(tri.output());
        }
        // The sequencer starts at position 0, so the walk begins at step 1.
        let expected: Vec<u8> = (1..=32).map(|i| TRIANGLE_SEQUENCE[i & 0x1F]).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn linear_counter_reload_and_decay() {
        let mut tri = Triangle::default();
        tri.set_enabled(true);
        tri.write_control(0x02);
        tri.write_timer_high(0x08);
        tri.clock_linear_counter();
        assert_eq!(tri.linear_counter, 2);
        // Reload flag cleared (control flag low), so it now decays.
        tri.clock_linear_counter();
        assert_eq!(tri.linear_counter, 1);
    }

    #[test]
    fn ultrasonic_periods_freeze_the_sequencer() {
        let mut tri = armed_triangle(1);
        let before = tri.sequence_pos;
        for _ in 0..64 {
            tri.clock_timer();
        }
        assert_eq!(tri.sequence_pos, before);
    }

    #[test]
    fn gated_channel_holds_its_level() {
        let mut tri = armed_triangle(4);
        for _ in 0..10 {
            tri.clock_timer();
        }
        let held = tri.output();
        tri.set_enabled(false);
        for _ in 0..20 {
            tri.clock_timer();
        }
        assert_eq!(tri.output(), held);
    }
}
