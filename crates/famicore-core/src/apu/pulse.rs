//! Pulse channel, including its sweep unit.

use serde::{Deserialize, Serialize};

use super::{envelope::Envelope, length_counter::LengthCounter, tables::PULSE_DUTY_TABLE};

/// Sweep negate behaviour differs between the two pulse channels: pulse 1
/// adds the one's complement of the change amount, pulse 2 the two's
/// complement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(super) enum PulseChannel {
    Pulse1,
    Pulse2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(super) struct Sweep {
    enabled: bool,
    negate: bool,
    shift: u8,
    period: u8,
    divider: u8,
    reload: bool,
    target: u16,
    channel: PulseChannel,
}

impl Sweep {
    fn new(channel: PulseChannel) -> Self {
        Self {
            enabled: false,
            negate: false,
            shift: 0,
            period: 0,
            divider: 0,
            reload: false,
            target: 0,
            channel,
        }
    }

    pub(super) fn write(&mut self, value: u8, timer_period: u16) {
        self.enabled = value & 0b1000_0000 != 0;
        self.period = (value >> 4) & 0b0000_0111;
        self.negate = value & 0b0000_1000 != 0;
        self.shift = value & 0b0000_0111;
        self.reload = true;
        self.update_target(timer_period);
    }

    /// Recomputes the target period for the current timer value.
    pub(super) fn update_target(&mut self, timer_period: u16) {
        let change = timer_period >> self.shift;
        let delta = if self.negate {
            match self.channel {
                // One's complement: subtracts change+1.
                PulseChannel::Pulse1 => change ^ 0xFFFF,
                // Two's complement: subtracts change.
                PulseChannel::Pulse2 => (change ^ 0xFFFF).wrapping_add(1),
            }
        } else {
            change
        };
        self.target = timer_period.wrapping_add(delta);
    }

    /// The channel is muted whenever the target overflows the 11-bit timer
    /// or the timer itself is ultrasonic.
    pub(super) fn muted(&self, timer_period: u16) -> bool {
        self.target >= 0x800 || timer_period < 8
    }

    /// Half-frame clock; may rewrite the channel's timer period.
    pub(super) fn clock(&mut self, timer_period: &mut u16) {
        if self.divider == 0 && self.enabled && self.target < 0x800 && *timer_period >= 8 {
            *timer_period = self.target;
            self.update_target(*timer_period);
        }

        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(super) struct Pulse {
    duty: u8,
    sequencer: u8,
    timer_period: u16,
    timer: u16,
    pub(super) envelope: Envelope,
    pub(super) length: LengthCounter,
    pub(super) sweep: Sweep,
    enabled: bool,
}

impl Pulse {
    pub(super) fn new(channel: PulseChannel) -> Self {
        Self {
            duty: 0,
            sequencer: 0,
            timer_period: 0,
            timer: 0,
            envelope: Envelope::default(),
            length: LengthCounter::default(),
            sweep: Sweep::new(channel),
            enabled: false,
        }
    }

    /// `$4000/$4004`: duty, halt/loop, volume.
    pub(super) fn write_control(&mut self, value: u8) {
        self.duty = value >> 6;
        self.envelope.configure(value);
        self.length.set_halt(self.envelope.halt_length());
    }

    /// `$4001/$4005`: sweep setup.
    pub(super) fn write_sweep(&mut self, value: u8) {
        self.sweep.write(value, self.timer_period);
    }

    /// `$4002/$4006`: timer low byte.
    pub(super) fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0xFF00) | value as u16;
        self.sweep.update_target(self.timer_period);
    }

    /// `$4003/$4007`: timer high bits, length load, phase reset.
    pub(super) fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | (((value & 0x07) as u16) << 8);
        self.length.load(value >> 3, self.enabled);
        self.sequencer = 0;
        self.envelope.restart();
        self.sweep.update_target(self.timer_period);
    }

    pub(super) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.length.clear();
        }
    }

    /// Timer tick; runs on odd CPU cycles only.
    pub(super) fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.sequencer = self.sequencer.wrapping_sub(1) & 7;
        } else {
            self.timer -= 1;
        }
    }

    pub(super) fn clock_envelope(&mut self) {
        self.envelope.clock();
    }

    pub(super) fn clock_half_frame(&mut self) {
        self.length.clock();
        self.sweep.clock(&mut self.timer_period);
    }

    fn sequence_bit(&self) -> u8 {
        (PULSE_DUTY_TABLE[self.duty as usize] >> self.sequencer) & 1
    }

    pub(super) fn output(&self) -> u8 {
        if !self.length.active() || self.sweep.muted(self.timer_period) || self.sequence_bit() == 0
        {
            0
        } else {
            self.envelope.output()
        }
    }

    pub(super) fn length_active(&self) -> bool {
        self.length.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negate_offsets_differ_per_channel() {
        let mut s1 = Sweep::new(PulseChannel::Pulse1);
        let mut s2 = Sweep::new(PulseChannel::Pulse2);
        s1.write(0b0000_1010, 0x100); // negate, shift 2
        s2.write(0b0000_1010, 0x100);
        // change = 0x40; pulse 1 subtracts change+1, pulse 2 subtracts change.
        assert_eq!(s1.target, 0x100 - 0x40 - 1);
        assert_eq!(s2.target, 0x100 - 0x40);
    }

    #[test]
    fn sweep_mutes_on_target_overflow_and_low_timer() {
        let mut sweep = Sweep::new(PulseChannel::Pulse1);
        sweep.write(0b1000_0001, 0x500); // shift 1 -> target 0x780
        assert!(!sweep.muted(0x500));
        sweep.update_target(0x600); // target 0x900
        assert!(sweep.muted(0x600));
        sweep.update_target(4);
        assert!(sweep.muted(4));
    }

    #[test]
    fn sweep_applies_target_at_divider_zero() {
        let mut pulse = Pulse::new(PulseChannel::Pulse2);
        pulse.set_enabled(true);
        pulse.write_timer_low(0x00);
        pulse.write_timer_high(0x01); // period 0x100
        pulse.write_sweep(0b1000_0001); // enabled, period 0, shift 1
        pulse.clock_half_frame();
        assert_eq!(pulse.timer_period, 0x180);
    }

    #[test]
    fn output_gated_by_length_and_sequence() {
        let mut pulse = Pulse::new(PulseChannel::Pulse1);
        pulse.set_enabled(true);
        pulse.write_control(0b1011_1111); // duty 2, constant volume 15, halt
        pulse.write_timer_low(0x40);
        pulse.write_timer_high(0x08); // length index 1 -> 254
        assert!(pulse.length_active());

        // Walk the sequencer one full lap and collect the duty bits.
        let mut high = 0;
        for _ in 0..8 {
            for _ in 0..0x41 {
                pulse.clock_timer();
            }
            if pulse.output() > 0 {
                high += 1;
            }
        }
        // Duty 2 is the 50% square.
        assert_eq!(high, 4);
    }
}
