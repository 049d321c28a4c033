//! CPU envelope: the bus-visible half of the 2A03 core.
//!
//! The instruction decoder itself is pluggable. The system only relies on the
//! cycle contract captured by [`CpuCore`]: every call to `step` advances the
//! machine by exactly one CPU cycle and leaves at most one pending bus
//! request in `address`/`data`/`rw_mode`. Keeping `step` a pure function of
//! [`CpuState`] lets the bus speculatively run a copy of the state to peek at
//! the next cycle kind, which the DMC DMA stall logic depends on.

use serde::{Deserialize, Serialize};

/// Kind of bus activity the CPU wants serviced this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RwMode {
    /// Internal cycle, the address bus is idle.
    #[default]
    None,
    /// The bus must place the byte at `address` into `data` before the next
    /// call to `step`.
    Read,
    /// The bus must commit `data` to `address`.
    Write,
}

/// Architectural and bus-facing CPU state.
///
/// Mutated by the decoder through [`CpuCore::step`] and by DMA, which hijacks
/// `address` while `rdy` is held low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CpuState {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,

    /// Pending bus request address.
    pub address: u16,
    /// Pending bus data byte (read target / write payload).
    pub data: u8,
    pub rw_mode: RwMode,

    /// Micro-cycle counter. `cycle & 0xFF == 0` marks an instruction
    /// boundary (opcode fetch).
    pub cycle: u32,

    /// Edge-triggered NMI input; the decoder clears it once taken.
    pub nmi: bool,
    /// Level-triggered IRQ input.
    pub irq: bool,
    /// When low the CPU halts on its next read cycle, address held stable.
    pub rdy: bool,
    /// Reports that a low `rdy` has actually taken effect.
    pub halted: bool,
}

/// The pluggable 6502 decoder contract.
///
/// Implementations must be pure: `step` may be called on a copy of the state
/// without observable side effects, and calling it twice on equal states must
/// produce equal results.
pub trait CpuCore {
    /// State of the CPU at power-up, before the first cycle.
    fn power_up() -> CpuState;

    /// State after the reset line is pulled, preserving whatever the reset
    /// sequence keeps (RAM is external and untouched by definition).
    fn reset(prev: &CpuState) -> CpuState;

    /// Advances the machine by one CPU cycle.
    fn step(state: CpuState) -> CpuState;
}

#[cfg(test)]
pub(crate) mod scripted {
    //! A decoder stand-in that replays an explicit list of bus operations.
    //!
    //! Bus, DMA, PPU-register and controller behaviour are all observable
    //! through the cycle contract alone, so tests drive the system with a
    //! canned program instead of a real 6502.

    use std::cell::RefCell;

    use super::{CpuCore, CpuState, RwMode};

    /// One scripted CPU cycle.
    #[derive(Debug, Clone, Copy)]
    pub(crate) enum Op {
        Idle,
        Read(u16),
        Write(u16, u8),
    }

    thread_local! {
        static SCRIPT: RefCell<Vec<Op>> = const { RefCell::new(Vec::new()) };
        static CAPTURED: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
    }

    /// Installs the cycle script executed by subsequent `step` calls.
    pub(crate) fn install(ops: Vec<Op>) {
        SCRIPT.with(|s| *s.borrow_mut() = ops);
        CAPTURED.with(|c| c.borrow_mut().clear());
    }

    /// Bytes latched by the script's read cycles, in order.
    pub(crate) fn captured_reads() -> Vec<u8> {
        CAPTURED.with(|c| c.borrow().clone())
    }

    pub(crate) struct ScriptedCpu;

    impl CpuCore for ScriptedCpu {
        fn power_up() -> CpuState {
            CpuState {
                rdy: true,
                ..CpuState::default()
            }
        }

        fn reset(prev: &CpuState) -> CpuState {
            CpuState {
                rdy: true,
                cycle: prev.cycle,
                ..CpuState::default()
            }
        }

        fn step(mut state: CpuState) -> CpuState {
            // Latch the byte produced for the previous read before moving on.
            if state.rw_mode == RwMode::Read && !state.halted {
                CAPTURED.with(|c| c.borrow_mut().push(state.data));
            }

            if !state.rdy {
                state.halted = true;
                return state;
            }
            state.halted = false;

            let index = state.cycle as usize;
            let op = SCRIPT.with(|s| s.borrow().get(index).copied());
            match op {
                Some(Op::Read(addr)) => {
                    state.address = addr;
                    state.rw_mode = RwMode::Read;
                }
                Some(Op::Write(addr, data)) => {
                    state.address = addr;
                    state.data = data;
                    state.rw_mode = RwMode::Write;
                }
                Some(Op::Idle) | None => {
                    state.rw_mode = RwMode::None;
                }
            }
            state.cycle = state.cycle.wrapping_add(1);
            state
        }
    }
}
