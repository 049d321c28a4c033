//! Frame sequencer: the APU's sub-clock producing quarter- and half-frame
//! pulses for the envelope, length, and sweep units.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrameCounterMode {
    #[default]
    FourStep,
    FiveStep,
}

/// Pulses produced by one sequencer step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct FrameTick {
    pub(super) quarter: bool,
    pub(super) half: bool,
    /// Frame IRQ latch window (4-step mode, last three cycles).
    pub(super) set_irq: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub(super) struct FrameCounter {
    mode: FrameCounterMode,
    irq_inhibit: bool,
    /// Position within the sequence, in CPU cycles.
    cycle: u32,
    /// Countdown armed by `$4017` writes; the sequencer restarts when it
    /// expires.
    pending_reset: Option<u8>,
}

impl FrameCounter {
    pub(super) fn mode(&self) -> FrameCounterMode {
        self.mode
    }

    pub(super) fn irq_inhibited(&self) -> bool {
        self.irq_inhibit
    }

    /// Applies a `$4017` write. Mode and inhibit land immediately; the
    /// sequencer restart lags 3 or 4 CPU cycles behind depending on write
    /// parity. Returns `true` when the caller must emit an immediate
    /// half-frame clock (5-step mode).
    pub(super) fn configure(&mut self, value: u8, odd_cycle: bool) -> bool {
        self.mode = if value & 0x80 == 0 {
            FrameCounterMode::FourStep
        } else {
            FrameCounterMode::FiveStep
        };
        self.irq_inhibit = value & 0x40 != 0;
        self.pending_reset = Some(if odd_cycle { 4 } else { 3 });
        self.mode == FrameCounterMode::FiveStep
    }

    /// Advances by one CPU cycle.
    pub(super) fn step(&mut self) -> FrameTick {
        let mut tick = FrameTick::default();
        self.cycle += 1;

        match self.mode {
            FrameCounterMode::FourStep => {
                match self.cycle {
                    7457 => tick.quarter = true,
                    14913 => {
                        tick.quarter = true;
                        tick.half = true;
                    }
                    22371 => tick.quarter = true,
                    29828 => tick.set_irq = true,
                    29829 => {
                        tick.quarter = true;
                        tick.half = true;
                        tick.set_irq = true;
                    }
                    29830 => {
                        tick.set_irq = true;
                        self.cycle = 0;
                    }
                    _ => {}
                }
            }
            FrameCounterMode::FiveStep => match self.cycle {
                7457 | 22371 => tick.quarter = true,
                14913 | 37281 => {
                    tick.quarter = true;
                    tick.half = true;
                }
                37282 => self.cycle = 0,
                _ => {}
            },
        }

        if let Some(remaining) = self.pending_reset {
            if remaining <= 1 {
                self.pending_reset = None;
                self.cycle = 0;
            } else {
                self.pending_reset = Some(remaining - 1);
            }
        }

        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fc: &mut FrameCounter, cycles: u32) -> (u32, u32, u32) {
        let (mut q, mut h, mut irq) = (0, 0, 0);
        for _ in 0..cycles {
            let tick = fc.step();
            q += tick.quarter as u32;
            h += tick.half as u32;
            irq += tick.set_irq as u32;
        }
        (q, h, irq)
    }

    #[test]
    fn four_step_cadence() {
        let mut fc = FrameCounter::default();
        let (q, h, irq) = run(&mut fc, 29830);
        assert_eq!(q, 4);
        assert_eq!(h, 2);
        assert_eq!(irq, 3);
        // Wrapped: the next pass produces the same cadence.
        let (q, h, irq) = run(&mut fc, 29830);
        assert_eq!((q, h, irq), (4, 2, 3));
    }

    #[test]
    fn five_step_cadence_has_no_irq() {
        let mut fc = FrameCounter::default();
        fc.configure(0x80, false);
        let (q, h, irq) = run(&mut fc, 37282 + 4);
        assert_eq!(q, 4);
        assert_eq!(h, 2);
        assert_eq!(irq, 0);
    }

    #[test]
    fn write_restarts_sequencer_after_delay() {
        let mut fc = FrameCounter::default();
        run(&mut fc, 100);
        fc.configure(0x00, false);
        // Three cycles later the position is back at zero.
        fc.step();
        fc.step();
        fc.step();
        assert_eq!(fc.cycle, 0);
        let (q, _, _) = run(&mut fc, 7457);
        assert_eq!(q, 1);
    }
}
