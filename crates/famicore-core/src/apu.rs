//! Audio Processing Unit.
//!
//! The APU advances once per CPU cycle. Within a cycle the order is fixed:
//! pending register reads are answered first, then the frame sequencer runs,
//! then the channel timers (pulse/noise/DMC on odd cycles, triangle every
//! cycle), then pending register writes land, and finally one mixed sample
//! is appended to the outgoing ring.
//!
//! Like the PPU, the APU talks to the CPU through a latched port: the bus
//! parks a request in `reg_op`/`reg_addr`/`reg_data` and picks the answer up
//! after the tick. DMC sample memory is fetched by the bus via DMA; the APU
//! only raises the request ([`Apu::dmc_needs_dma`]).

use serde::{Deserialize, Serialize};

use crate::memory::apu as apu_mem;

pub mod dmc;
pub mod envelope;
pub mod frame_counter;
pub mod length_counter;
pub mod noise;
pub mod pulse;
pub mod tables;
pub mod triangle;

pub use frame_counter::FrameCounterMode;

use dmc::Dmc;
use frame_counter::FrameCounter;
use noise::Noise;
use pulse::{Pulse, PulseChannel};
use triangle::Triangle;

/// Pending CPU access to the register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) enum PortOp {
    #[default]
    None,
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apu {
    /// CPU register port: pending operation, address, data byte.
    pub(crate) reg_op: PortOp,
    pub(crate) reg_addr: u16,
    pub(crate) reg_data: u8,

    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    pub(crate) dmc: Dmc,

    frame_counter: FrameCounter,
    pub(crate) frame_interrupt: bool,

    odd_cycle: bool,
    cycle: u64,

    /// Mixed 16-bit samples awaiting pickup by the bus layer.
    samples: Vec<i16>,
}

impl Default for Apu {
    fn default() -> Self {
        Self {
            reg_op: PortOp::None,
            reg_addr: 0,
            reg_data: 0,
            pulse1: Pulse::new(PulseChannel::Pulse1),
            pulse2: Pulse::new(PulseChannel::Pulse2),
            triangle: Triangle::default(),
            noise: Noise::default(),
            dmc: Dmc::default(),
            frame_counter: FrameCounter::default(),
            frame_interrupt: false,
            odd_cycle: false,
            cycle: 0,
            samples: Vec::with_capacity(apu_mem::MAX_SAMPLES),
        }
    }
}

impl Apu {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Latches a CPU read (only `$4015` is readable).
    pub(crate) fn begin_register_read(&mut self, addr: u16) {
        self.reg_op = PortOp::Read;
        self.reg_addr = addr;
    }

    /// Latches a CPU write to `$4000-$4017`.
    pub(crate) fn begin_register_write(&mut self, addr: u16, data: u8) {
        self.reg_op = PortOp::Write;
        self.reg_addr = addr;
        self.reg_data = data;
    }

    /// Advances the APU by one CPU cycle.
    pub(crate) fn step(&mut self) {
        // Register reads come first so `$4015` reflects the state before
        // this cycle's clocks.
        if self.reg_op == PortOp::Read {
            if self.reg_addr == apu_mem::STATUS {
                self.reg_data = self.read_status();
            }
            self.reg_op = PortOp::None;
        }

        let tick = self.frame_counter.step();
        if tick.set_irq && !self.frame_counter.irq_inhibited() {
            self.frame_interrupt = true;
        }
        if tick.quarter {
            self.clock_quarter_frame();
        }
        if tick.half {
            self.clock_half_frame();
        }

        if self.odd_cycle {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
            self.dmc.clock_timer();
        }
        self.triangle.clock_timer();

        if self.reg_op == PortOp::Write {
            let (addr, data) = (self.reg_addr, self.reg_data);
            self.write_register(addr, data);
            self.reg_op = PortOp::None;
        }

        self.mix_sample();

        self.odd_cycle = !self.odd_cycle;
        self.cycle = self.cycle.wrapping_add(1);
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_envelope();
        self.pulse2.clock_envelope();
        self.noise.clock_envelope();
        self.triangle.clock_linear_counter();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_half_frame();
        self.pulse2.clock_half_frame();
        self.noise.clock_length();
        self.triangle.clock_length();
    }

    /// `$4015` read: channel length status and the two interrupt latches.
    /// Reading acknowledges the frame interrupt.
    fn read_status(&mut self) -> u8 {
        let mut value = 0u8;
        value |= self.pulse1.length_active() as u8;
        value |= (self.pulse2.length_active() as u8) << 1;
        value |= (self.triangle.length_active() as u8) << 2;
        value |= (self.noise.length_active() as u8) << 3;
        value |= (self.dmc.active() as u8) << 4;
        value |= (self.frame_interrupt as u8) << 6;
        value |= (self.dmc.interrupt as u8) << 7;
        self.frame_interrupt = false;
        value
    }

    fn write_register(&mut self, addr: u16, data: u8) {
        match addr {
            0x4000 => self.pulse1.write_control(data),
            0x4001 => self.pulse1.write_sweep(data),
            0x4002 => self.pulse1.write_timer_low(data),
            0x4003 => self.pulse1.write_timer_high(data),
            0x4004 => self.pulse2.write_control(data),
            0x4005 => self.pulse2.write_sweep(data),
            0x4006 => self.pulse2.write_timer_low(data),
            0x4007 => self.pulse2.write_timer_high(data),
            0x4008 => self.triangle.write_control(data),
            0x400A => self.triangle.write_timer_low(data),
            0x400B => self.triangle.write_timer_high(data),
            0x400C => self.noise.write_control(data),
            0x400E => self.noise.write_mode_and_period(data),
            0x400F => self.noise.write_length(data),
            0x4010 => self.dmc.write_control(data),
            0x4011 => self.dmc.write_direct_load(data),
            0x4012 => self.dmc.write_sample_address(data),
            0x4013 => self.dmc.write_sample_length(data),
            apu_mem::STATUS => {
                self.pulse1.set_enabled(data & 0x01 != 0);
                self.pulse2.set_enabled(data & 0x02 != 0);
                self.triangle.set_enabled(data & 0x04 != 0);
                self.noise.set_enabled(data & 0x08 != 0);
                self.dmc.set_enabled(data & 0x10 != 0);
            }
            apu_mem::FRAME_COUNTER => {
                let immediate_half = self.frame_counter.configure(data, self.odd_cycle);
                if self.frame_counter.irq_inhibited() {
                    self.frame_interrupt = false;
                }
                if immediate_half {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
            }
            _ => {}
        }
    }

    /// Non-linear two-group DAC mix, scaled to signed 16-bit.
    fn mix_sample(&mut self) {
        let p = (self.pulse1.output() + self.pulse2.output()) as f32;
        let square = if p > 0.0 {
            95.88 / (8128.0 / p + 100.0)
        } else {
            0.0
        };

        let tnd_in = self.triangle.output() as f32 / 8227.0
            + self.noise.output() as f32 / 12241.0
            + self.dmc.output() as f32 / 22638.0;
        let tnd = if tnd_in > 0.0 {
            159.79 / (1.0 / tnd_in + 100.0)
        } else {
            0.0
        };

        let sample = ((square + tnd) * 32767.0) as i32;
        self.samples
            .push(sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }

    /// `true` when the DMC sample buffer needs a refill.
    pub(crate) fn dmc_needs_dma(&self) -> bool {
        self.dmc.needs_dma()
    }

    /// Number of mixed samples currently buffered.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub(crate) fn samples_full(&self) -> bool {
        self.samples.len() >= apu_mem::MAX_SAMPLES
    }

    /// Hands the buffered samples to the caller and clears the ring.
    pub(crate) fn drain_samples(&mut self) -> Vec<i16> {
        core::mem::take(&mut self.samples)
    }
}
