//! Delta Modulation Channel.
//!
//! The DMC plays 1-bit delta-encoded samples through a 7-bit DAC. It never
//! reads memory itself: when the sample buffer runs empty while bytes remain,
//! the channel raises a DMA request that the bus services by stealing CPU
//! cycles and calling [`Dmc::complete_dma`] with the fetched byte.

use serde::{Deserialize, Serialize};

use super::tables::{
    DMC_PERIOD_TABLE, DMC_SAMPLE_ADDR_STRIDE, DMC_SAMPLE_BASE, DMC_SAMPLE_LEN_STRIDE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct Dmc {
    irq_enabled: bool,
    pub(super) loop_flag: bool,
    rate_index: u8,

    /// 7-bit DAC level.
    output: u8,

    sample_address: u16,
    sample_length: u16,
    pub(crate) current_address: u16,
    pub(crate) bytes_remaining: u16,

    pub(crate) sample_buffer: u8,
    pub(crate) sample_buffer_loaded: bool,

    shift_register: u8,
    bits_remaining: u8,
    silence: bool,

    timer_period: u16,
    timer: u16,

    /// Latched DMC IRQ, cleared by `$4015` writes or disabling the IRQ.
    pub(crate) interrupt: bool,
}

impl Default for Dmc {
    fn default() -> Self {
        Self {
            irq_enabled: false,
            loop_flag: false,
            rate_index: 0,
            output: 0,
            sample_address: DMC_SAMPLE_BASE,
            sample_length: 1,
            current_address: DMC_SAMPLE_BASE,
            bytes_remaining: 0,
            sample_buffer: 0,
            sample_buffer_loaded: false,
            shift_register: 0,
            bits_remaining: 8,
            silence: true,
            timer_period: DMC_PERIOD_TABLE[0],
            timer: DMC_PERIOD_TABLE[0],
            interrupt: false,
        }
    }
}

impl Dmc {
    /// `$4010`: IRQ enable, loop flag, rate select.
    pub(super) fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0b1000_0000 != 0;
        if !self.irq_enabled {
            self.interrupt = false;
        }
        self.loop_flag = value & 0b0100_0000 != 0;
        self.rate_index = value & 0x0F;
        self.timer_period = DMC_PERIOD_TABLE[self.rate_index as usize];
    }

    /// `$4011`: direct 7-bit DAC load.
    pub(super) fn write_direct_load(&mut self, value: u8) {
        self.output = value & 0x7F;
    }

    /// `$4012`: sample start address.
    pub(super) fn write_sample_address(&mut self, value: u8) {
        self.sample_address = DMC_SAMPLE_BASE.wrapping_add(value as u16 * DMC_SAMPLE_ADDR_STRIDE);
    }

    /// `$4013`: sample length.
    pub(super) fn write_sample_length(&mut self, value: u8) {
        self.sample_length = value as u16 * DMC_SAMPLE_LEN_STRIDE + 1;
    }

    /// `$4015` channel bit.
    pub(super) fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart_sample();
        }
        self.interrupt = false;
    }

    pub(crate) fn restart_sample(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    pub(super) fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    /// `true` while the sample buffer needs a refill via DMA.
    pub(crate) fn needs_dma(&self) -> bool {
        !self.sample_buffer_loaded && self.bytes_remaining > 0
    }

    /// Deposits a DMA-fetched byte and advances the sample pointer. The
    /// address wraps within `$8000-$FFFF`; exhausting the sample either
    /// loops it or latches the IRQ.
    pub(crate) fn complete_dma(&mut self, byte: u8) {
        self.sample_buffer = byte;
        self.sample_buffer_loaded = true;
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        self.current_address = 0x8000 + (self.current_address.wrapping_add(1) & 0x7FFF);

        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart_sample();
            } else if self.irq_enabled {
                self.interrupt = true;
            }
        }
    }

    /// Timer tick; runs on odd CPU cycles only.
    pub(super) fn clock_timer(&mut self) {
        if self.timer != 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.timer_period;

        // Start of an output cycle: pull the next byte or go silent.
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            if self.sample_buffer_loaded {
                self.shift_register = self.sample_buffer;
                self.sample_buffer_loaded = false;
                self.silence = false;
            } else {
                self.silence = true;
            }
        }

        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.output <= 125 {
                    self.output += 2;
                }
            } else if self.output >= 2 {
                self.output -= 2;
            }
        }

        self.shift_register >>= 1;
        self.bits_remaining -= 1;
    }

    pub(super) fn output(&self) -> u8 {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(dmc: &mut Dmc, ticks: u32) {
        for _ in 0..ticks {
            dmc.clock_timer();
        }
    }

    #[test]
    fn delta_steps_track_sample_bits() {
        let mut dmc = Dmc::default();
        dmc.write_direct_load(64);
        dmc.write_sample_length(0);
        dmc.set_enabled(true);
        assert!(dmc.needs_dma());
        dmc.complete_dma(0b0000_1111); // four ups then four downs

        let period = dmc.timer_period as u32 + 1;
        // Drain the stale bit cycle first (buffer loads when bits run out).
        drained(&mut dmc, period * 8);
        let base = dmc.output();
        drained(&mut dmc, period * 4);
        assert_eq!(dmc.output(), base + 8);
        drained(&mut dmc, period * 4);
        assert_eq!(dmc.output(), base);
    }

    #[test]
    fn output_clamps_at_the_rails() {
        let mut dmc = Dmc::default();
        dmc.write_direct_load(126);
        dmc.write_sample_length(0);
        dmc.set_enabled(true);
        dmc.complete_dma(0xFF);
        let period = dmc.timer_period as u32 + 1;
        drained(&mut dmc, period * 16);
        assert_eq!(dmc.output(), 126);
    }

    #[test]
    fn exhausted_sample_loops_when_asked() {
        let mut dmc = Dmc::default();
        dmc.write_control(0x40); // loop
        dmc.write_sample_address(4);
        dmc.write_sample_length(0); // 1 byte
        dmc.set_enabled(true);
        let start = dmc.current_address;
        dmc.complete_dma(0xAA);
        assert_eq!(dmc.bytes_remaining, 1);
        assert_eq!(dmc.current_address, start);
        assert!(!dmc.interrupt);
    }

    #[test]
    fn exhausted_sample_raises_irq_when_enabled() {
        let mut dmc = Dmc::default();
        dmc.write_control(0x80);
        dmc.write_sample_length(0);
        dmc.set_enabled(true);
        dmc.complete_dma(0xAA);
        assert_eq!(dmc.bytes_remaining, 0);
        assert!(dmc.interrupt);
    }

    #[test]
    fn address_wraps_into_8000() {
        let mut dmc = Dmc::default();
        dmc.write_sample_length(1);
        dmc.set_enabled(true);
        dmc.current_address = 0xFFFF;
        dmc.complete_dma(0x00);
        assert_eq!(dmc.current_address, 0x8000);
    }
}
