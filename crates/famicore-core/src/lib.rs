//! famicore-core: a cycle-accurate NES/Famicom emulation core.
//!
//! The crate models the timing fabric between the console's three
//! processors: every [`System::tick`](system::System::tick) advances the PPU
//! by three dots, the APU by one cycle, and then either an in-flight DMA or
//! the CPU by one cycle, all against a single master clock. The 6502
//! instruction decoder itself is pluggable through the
//! [`CpuCore`](cpu::CpuCore) cycle contract; everything else — the PPU pixel
//! pipeline, the APU channels and frame sequencer, the cartridge mappers,
//! DMA arbitration, and the instrumentation tap chain — lives here.

pub mod apu;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod error;
pub mod mem_block;
pub mod memory;
pub mod ppu;
pub mod reset_kind;
pub mod rng;
pub mod system;
pub mod tap;

pub use cartridge::{Cartridge, Mirroring, load_cartridge, load_cartridge_from_file};
pub use controller::ControllerState;
pub use cpu::{CpuCore, CpuState, RwMode};
pub use error::Error;
pub use reset_kind::ResetKind;
pub use system::{
    AudioOutput, RamInit, System, SystemConfig, VideoOutput, CYCLES_PER_FRAME,
};
pub use tap::{MemoryKind, MemoryOp, Tap};

#[cfg(test)]
mod test_support {
    use ctor::ctor;
    use tracing::Level;
    use tracing_subscriber::FmtSubscriber;

    #[ctor]
    fn init_tracing() {
        let subscriber = FmtSubscriber::builder()
            .with_file(true)
            .with_line_number(true)
            .with_max_level(Level::WARN)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
