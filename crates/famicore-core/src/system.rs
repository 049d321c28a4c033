//! System assembly: the master clock and the buses between the units.
//!
//! One [`System::tick`] is one CPU cycle: three PPU dots, the mapper hook,
//! the IRQ line update, one APU cycle, and then exactly one bus master —
//! an in-flight DMC DMA, an in-flight OAM DMA, or the CPU itself. All
//! cross-unit traffic produced by that master is dispatched onto RAM, the
//! PPU/APU register ports, the controller port, or the cartridge before the
//! tick returns, with every access fanned out to the tap chain.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::{
    apu::Apu,
    cartridge::{Cartridge, CartridgeState, NametableTarget, load_cartridge},
    controller::{ControllerPort, ControllerState},
    cpu::{CpuCore, CpuState, RwMode},
    error::Error,
    mem_block::{MemBlock, cpu as cpu_ram, ppu as ppu_ram},
    memory::{apu as apu_mem, cpu as cpu_mem, ppu as ppu_mem, shadow},
    ppu::{PortOp as PpuPortOp, Ppu},
    reset_kind::ResetKind,
    rng::SplitMix64,
    tap::{MemoryKind, MemoryOp, Tap, TapChain},
};

/// CPU cycles per NTSC frame.
pub const CYCLES_PER_FRAME: u32 = 29_781;

/// Framebuffer geometry: the full 341x262 dot grid, one `u16` per dot.
pub const FRAMEBUFFER_STRIDE: usize = ppu_mem::SCANLINE_WIDTH as usize;
const FRAMEBUFFER_SIZE: usize =
    (ppu_mem::SCANLINE_WIDTH * ppu_mem::TOTAL_SCANLINES) as usize;

/// Visible window handed to the video callback: 256x224 starting 2 dots in
/// and 8 scanlines down.
const VISIBLE_X_OFFSET: usize = 2;
const VISIBLE_Y_OFFSET: usize = 8;

/// Power-up contents of work RAM; hardware leaves it indeterminate, so the
/// policy is the host's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RamInit {
    /// All zeroes (deterministic without configuration).
    #[default]
    Zero,
    /// A repeating fill byte (some boards power up close to `$FF`).
    Fill(u8),
    /// Pseudo-random bytes from a caller-provided seed.
    Seeded(u64),
}

/// Host-side configuration captured at system creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConfig {
    pub ram_init: RamInit,
}

/// One frame of video handed to the host.
pub struct VideoOutput<'a> {
    /// Full dot grid; index `y * stride + x` relative to the visible window
    /// origin.
    pub framebuffer: &'a [u16],
    pub stride: usize,
    pub width: u16,
    pub height: u16,
    pub odd_frame: bool,
    pub emphasize_red: bool,
    pub emphasize_green: bool,
    pub emphasize_blue: bool,
}

/// A batch of mixed audio samples at the CPU clock rate.
pub struct AudioOutput<'a> {
    pub samples: &'a [i16],
    pub sample_rate: u32,
}

pub type InputCallback = Box<dyn FnMut(u8) -> ControllerState>;
pub type VideoCallback = Box<dyn FnMut(&VideoOutput<'_>)>;
pub type AudioCallback = Box<dyn FnMut(&AudioOutput<'_>)>;

/// In-flight OAM DMA transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct OamDma {
    active: bool,
    /// Phase counter: 0/1 are alignment + dummy cycles, 2..=513 transfer.
    cycle: u32,
    data: u8,
    src_address: u16,
    dst_address: u8,
}

/// In-flight DMC DMA fetch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
struct DmcDma {
    active: bool,
    /// Remaining stall cycles before the fetch lands.
    stall: u8,
    src_address: u16,
}

/// The serializable machine state; everything the next tick depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SystemState {
    cpu: CpuState,
    ppu: Ppu,
    apu: Apu,
    cpu_odd_cycle: bool,
    oam_dma: OamDma,
    dmc_dma: DmcDma,
    controller: ControllerPort,
    ram: cpu_ram::Ram,
    vram: ppu_ram::Ciram,
    /// Last byte driven through each PPU register, for debugger reads.
    cached_ppu_reg: MemBlock<{ shadow::PPU_REG_COUNT }>,
    /// Last byte driven through each APU/IO register.
    cached_apuio_reg: MemBlock<{ shadow::APUIO_REG_COUNT }>,
}

/// Savestate blob layout: machine state followed by the mapper-local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SaveBlob {
    state: SystemState,
    cartridge: CartridgeState,
}

pub struct System<C: CpuCore> {
    state: SystemState,
    cartridge: Cartridge,
    config: SystemConfig,
    taps: TapChain,
    input_callback: Option<InputCallback>,
    video_callback: Option<VideoCallback>,
    audio_callback: Option<AudioCallback>,
    framebuffer: Vec<u16>,
    _cpu: PhantomData<fn() -> C>,
}

impl<C: CpuCore> System<C> {
    /// Builds a system around an already-loaded cartridge.
    pub fn new(cartridge: Cartridge, config: SystemConfig) -> Self {
        let mut system = Self {
            state: SystemState {
                cpu: C::power_up(),
                ppu: Ppu::new(),
                apu: Apu::new(),
                cpu_odd_cycle: true,
                oam_dma: OamDma::default(),
                dmc_dma: DmcDma::default(),
                controller: ControllerPort::default(),
                ram: cpu_ram::Ram::new(),
                vram: ppu_ram::Ciram::new(),
                cached_ppu_reg: MemBlock::new(),
                cached_apuio_reg: MemBlock::new(),
            },
            cartridge,
            config,
            taps: TapChain::new(),
            input_callback: None,
            video_callback: None,
            audio_callback: None,
            framebuffer: vec![0; FRAMEBUFFER_SIZE],
            _cpu: PhantomData,
        };
        system.reset(ResetKind::PowerUp);
        system
    }

    /// Builds a system from an in-memory iNES image.
    pub fn from_rom_bytes(bytes: &[u8], config: SystemConfig) -> Result<Self, Error> {
        Ok(Self::new(load_cartridge(bytes)?, config))
    }

    /// Builds a system from an iNES file on disk.
    pub fn from_file(path: impl AsRef<std::path::Path>, config: SystemConfig) -> Result<Self, Error> {
        Ok(Self::new(crate::cartridge::load_cartridge_from_file(path)?, config))
    }

    /// Appends an observer record. Configuration-time only; records cannot
    /// be added from inside a running tick.
    pub fn add_tap(&mut self, tap: Box<dyn Tap>) {
        self.taps.push(tap);
    }

    pub fn set_input_callback(&mut self, callback: InputCallback) {
        self.input_callback = Some(callback);
    }

    pub fn set_video_callback(&mut self, callback: VideoCallback) {
        self.video_callback = Some(callback);
    }

    pub fn set_audio_callback(&mut self, callback: AudioCallback) {
        self.audio_callback = Some(callback);
    }

    pub fn cpu(&self) -> &CpuState {
        &self.state.cpu
    }

    pub fn ppu(&self) -> &Ppu {
        &self.state.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.state.apu
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    /// Full 341x262 dot grid (palette index + emphasis per entry).
    pub fn framebuffer(&self) -> &[u16] {
        &self.framebuffer
    }

    /// Applies a reset. Power-up refills RAM per policy and rebuilds every
    /// unit; a soft reset keeps RAM and reinitializes the processors.
    pub fn reset(&mut self, kind: ResetKind) {
        let state = &mut self.state;
        state.ppu.reset();
        state.apu.reset();
        state.cpu = match kind {
            ResetKind::PowerUp => C::power_up(),
            ResetKind::Soft => C::reset(&state.cpu),
        };
        state.cpu_odd_cycle = true;
        state.oam_dma = OamDma::default();
        state.dmc_dma = DmcDma::default();
        state.controller = ControllerPort::default();
        state.cached_ppu_reg = MemBlock::new();
        state.cached_apuio_reg = MemBlock::new();

        if kind == ResetKind::PowerUp {
            state.vram = ppu_ram::Ciram::new();
            match self.config.ram_init {
                RamInit::Zero => state.ram.as_mut_slice().fill(0),
                RamInit::Fill(value) => state.ram.as_mut_slice().fill(value),
                RamInit::Seeded(seed) => {
                    SplitMix64::new(seed).fill_bytes(state.ram.as_mut_slice());
                }
            }
        }

        self.cartridge.reset();
    }

    /// Runs one NTSC frame worth of master cycles.
    pub fn frame(&mut self) {
        for _ in 0..CYCLES_PER_FRAME {
            self.tick();
        }
    }

    /// Advances the system by one master CPU cycle.
    pub fn tick(&mut self) {
        let had_vbl = self.state.ppu.vbl;

        self.ppu_tick();
        self.ppu_tick();
        self.ppu_tick();

        // The mapper observes the PPU address bus after the dots of this
        // cycle (MMC3 A12) and the CPU state (MMC1 serial re-arm).
        self.cartridge.tick(
            &self.state.cpu,
            self.state.ppu.vram_address,
            self.state.ppu.frame_dot(),
        );

        self.state.cpu.irq = self.state.apu.frame_interrupt
            || self.state.apu.dmc.interrupt
            || self.cartridge.irq_pending();

        self.apu_tick();

        if !had_vbl && self.state.ppu.vbl {
            self.state.cpu.nmi = true;
        }

        if self.state.dmc_dma.active {
            self.dmc_dma_execute();
        } else if self.state.oam_dma.active {
            self.oam_dma_execute();
        } else {
            self.cpu_tick();
        }

        let dma_active = self.state.dmc_dma.active || self.state.oam_dma.active;
        self.state.cpu.rdy = !dma_active;
        self.state.cpu.halted = dma_active;

        self.state.cpu_odd_cycle = !self.state.cpu_odd_cycle;
    }

    // ---------------------------------------------------------------- PPU

    fn ppu_tick(&mut self) {
        let was_reg_read = self.state.ppu.reg_op == PpuPortOp::Read;

        if self.state.ppu.r || self.state.ppu.w {
            self.ppu_mem_rw();
        }

        self.state.ppu.step();

        if was_reg_read {
            self.ppu_cpu_bus();
        }

        let index = (self.state.ppu.scanline * ppu_mem::SCANLINE_WIDTH + self.state.ppu.dot)
            as usize;
        self.framebuffer[index] = self.state.ppu.color_out;

        self.taps.on_ppu(&self.state.ppu);

        if self.state.ppu.scanline == ppu_mem::RENDER_END_SCANLINE + 1 && self.state.ppu.dot == 0 {
            self.emit_frame();
        }
    }

    /// Services the PPU's pending external VRAM access.
    fn ppu_mem_rw(&mut self) {
        let address = self.state.ppu.vram_address & ppu_mem::VRAM_MIRROR_MASK;

        if self.state.ppu.r {
            let value = if address < ppu_mem::NAMETABLE_BASE {
                self.cartridge.chr_read(address)
            } else {
                match self.cartridge.map_nametable(address) {
                    NametableTarget::Ciram(offset) => self.state.vram[offset],
                    NametableTarget::Mapper(offset) => self.cartridge.nt_read(offset),
                }
            };
            self.state.ppu.vram_data = value;
            self.taps.on_memory(
                MemoryKind::Ppu,
                MemoryOp::Read,
                self.state.ppu.vram_address,
                &mut self.state.ppu.vram_data,
            );
        } else {
            self.taps.on_memory(
                MemoryKind::Ppu,
                MemoryOp::Write,
                self.state.ppu.vram_address,
                &mut self.state.ppu.vram_data,
            );
            let data = self.state.ppu.vram_data;
            if address < ppu_mem::NAMETABLE_BASE {
                self.cartridge.chr_write(address, data);
            } else {
                match self.cartridge.map_nametable(address) {
                    NametableTarget::Ciram(offset) => self.state.vram[offset] = data,
                    NametableTarget::Mapper(offset) => self.cartridge.nt_write(offset, data),
                }
            }
        }
    }

    /// Hands a completed register read back to the CPU. The PPU produced
    /// `reg_data` during the tick that serviced the request, so the CPU
    /// observes the value *after* that tick.
    fn ppu_cpu_bus(&mut self) {
        let cpu = &self.state.cpu;
        if cpu.rw_mode != RwMode::Read
            || !(cpu_mem::PPU_REGISTER_BASE..=cpu_mem::PPU_REGISTER_END).contains(&cpu.address)
        {
            return;
        }

        let reg = (self.state.cpu.address & ppu_mem::REGISTER_SELECT_MASK) as usize;
        self.state.cpu.data = self.state.ppu.reg_data;
        self.state.cached_ppu_reg[reg] = self.state.ppu.reg_data;

        self.taps.on_memory(
            MemoryKind::Cpu,
            MemoryOp::Read,
            self.state.cpu.address,
            &mut self.state.cpu.data,
        );
        if reg == 4 {
            let oam_address = self.state.ppu.oam_address as u16;
            self.taps.on_memory(
                MemoryKind::Oam,
                MemoryOp::Read,
                oam_address,
                &mut self.state.ppu.reg_data,
            );
        }
    }

    fn emit_frame(&mut self) {
        if let Some(callback) = self.video_callback.as_mut() {
            let origin = VISIBLE_Y_OFFSET * FRAMEBUFFER_STRIDE + VISIBLE_X_OFFSET;
            let mask = self.state.ppu.render_mask;
            callback(&VideoOutput {
                framebuffer: &self.framebuffer[origin..],
                stride: FRAMEBUFFER_STRIDE,
                width: 256,
                height: 224,
                odd_frame: !self.state.ppu.even_frame,
                emphasize_red: mask.contains(crate::ppu::registers::Mask::EMPHASIZE_RED),
                emphasize_green: mask.contains(crate::ppu::registers::Mask::EMPHASIZE_GREEN),
                emphasize_blue: mask.contains(crate::ppu::registers::Mask::EMPHASIZE_BLUE),
            });
        }
    }

    // ---------------------------------------------------------------- APU

    fn apu_tick(&mut self) {
        self.state.apu.step();
        self.taps.on_apu(&self.state.apu);

        // Hand a completed $4015 read back to the CPU.
        if self.state.cpu.rw_mode == RwMode::Read && self.state.cpu.address == cpu_mem::APU_STATUS
        {
            self.state.cpu.data = self.state.apu.reg_data;
            self.state.cached_apuio_reg[0x15] = self.state.apu.reg_data;
            self.taps.on_memory(
                MemoryKind::Cpu,
                MemoryOp::Read,
                cpu_mem::APU_STATUS,
                &mut self.state.cpu.data,
            );
        }

        if !self.state.dmc_dma.active && self.state.apu.dmc_needs_dma() {
            self.dmc_dma_init();
        }

        if self.state.apu.samples_full() {
            let samples = self.state.apu.drain_samples();
            if let Some(callback) = self.audio_callback.as_mut() {
                callback(&AudioOutput {
                    samples: &samples,
                    sample_rate: apu_mem::SAMPLE_RATE,
                });
            }
        }
    }

    // ---------------------------------------------------------------- CPU

    fn cpu_tick(&mut self) {
        if self.state.cpu.cycle & 0xFF == 0 {
            self.taps.on_cpu(&self.state.cpu);
        }

        self.state.cpu = C::step(self.state.cpu);

        self.cpu_mem_rw();
        self.cpu_ppu_bus();
        self.cpu_apu_bus();
        self.cpu_joy_bus();
        self.cpu_oam_dma_bus();

        self.taps.on_cpu_cycle(&self.state.cpu);
    }

    /// RAM and cartridge space.
    fn cpu_mem_rw(&mut self) {
        let address = self.state.cpu.address;
        let is_ram = address <= cpu_mem::INTERNAL_RAM_MIRROR_END;
        let is_mapper = address >= cpu_mem::CARTRIDGE_SPACE_BASE;
        if !(is_ram || is_mapper) {
            return;
        }

        match self.state.cpu.rw_mode {
            RwMode::Read => {
                if is_ram {
                    self.state.cpu.data =
                        self.state.ram[(address & cpu_mem::INTERNAL_RAM_MASK) as usize];
                } else if let Some(value) = self.cartridge.cpu_read(address) {
                    self.state.cpu.data = value;
                }
                // A floating cartridge read leaves the previous bus byte in
                // `data` (open bus).
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::Read,
                    address,
                    &mut self.state.cpu.data,
                );
            }
            RwMode::Write => {
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::Write,
                    address,
                    &mut self.state.cpu.data,
                );
                let data = self.state.cpu.data;
                if is_ram {
                    self.state.ram[(address & cpu_mem::INTERNAL_RAM_MASK) as usize] = data;
                } else {
                    self.cartridge.cpu_write(address, data);
                }
            }
            RwMode::None => {}
        }
    }

    /// PPU register window ($2000-$3FFF).
    fn cpu_ppu_bus(&mut self) {
        let address = self.state.cpu.address;
        if !(cpu_mem::PPU_REGISTER_BASE..=cpu_mem::PPU_REGISTER_END).contains(&address) {
            return;
        }
        let reg = (address & ppu_mem::REGISTER_SELECT_MASK) as u8;

        match self.state.cpu.rw_mode {
            RwMode::Read => self.state.ppu.begin_register_read(reg),
            RwMode::Write => {
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::Write,
                    address,
                    &mut self.state.cpu.data,
                );
                if reg == 4 {
                    let oam_address = self.state.ppu.oam_address as u16;
                    self.taps.on_memory(
                        MemoryKind::Oam,
                        MemoryOp::Write,
                        oam_address,
                        &mut self.state.cpu.data,
                    );
                }
                let data = self.state.cpu.data;
                self.state.ppu.begin_register_write(reg, data);
                self.state.cached_ppu_reg[reg as usize] = data;
            }
            RwMode::None => {}
        }
    }

    /// APU register window; `$4015` reads, `$4000-$4013`/`$4015`/`$4017`
    /// writes. `$4009`/`$400D` do not exist, `$4014`/`$4016` belong to DMA
    /// and the controller.
    fn cpu_apu_bus(&mut self) {
        let address = self.state.cpu.address;

        if self.state.cpu.rw_mode == RwMode::Read && address == cpu_mem::APU_STATUS {
            self.state.apu.begin_register_read(address);
            return;
        }

        if self.state.cpu.rw_mode != RwMode::Write {
            return;
        }
        let is_apu_reg = (cpu_mem::APU_REGISTER_BASE..=cpu_mem::APU_FRAME_COUNTER)
            .contains(&address)
            && address != 0x4009
            && address != 0x400D
            && address != cpu_mem::OAM_DMA
            && address != cpu_mem::CONTROLLER_PORT_1;
        if !is_apu_reg {
            return;
        }

        self.taps.on_memory(
            MemoryKind::Cpu,
            MemoryOp::Write,
            address,
            &mut self.state.cpu.data,
        );
        let data = self.state.cpu.data;
        self.state.apu.begin_register_write(address, data);
        self.state.cached_apuio_reg[(address & 0x1F) as usize] = data;
    }

    /// Controller port at `$4016`.
    fn cpu_joy_bus(&mut self) {
        let address = self.state.cpu.address;
        if address != cpu_mem::CONTROLLER_PORT_1 {
            return;
        }

        match self.state.cpu.rw_mode {
            RwMode::Read => {
                self.state.cpu.data = self.state.controller.read();
                self.state.cached_apuio_reg[0x16] = self.state.cpu.data;
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::Read,
                    address,
                    &mut self.state.cpu.data,
                );
            }
            RwMode::Write => {
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::Write,
                    address,
                    &mut self.state.cpu.data,
                );
                let data = self.state.cpu.data;
                if data & 1 == 1 {
                    let sample = self
                        .input_callback
                        .as_mut()
                        .map(|callback| callback(0))
                        .unwrap_or_default();
                    self.state.controller.strobe(sample);
                }
                self.state.cached_apuio_reg[0x16] = data;
            }
            RwMode::None => {}
        }
    }

    /// OAM DMA trigger at `$4014`.
    fn cpu_oam_dma_bus(&mut self) {
        if self.state.cpu.rw_mode != RwMode::Write
            || self.state.cpu.address != cpu_mem::OAM_DMA
        {
            return;
        }

        self.taps.on_memory(
            MemoryKind::Cpu,
            MemoryOp::Write,
            cpu_mem::OAM_DMA,
            &mut self.state.cpu.data,
        );
        let page = self.state.cpu.data;
        self.state.cached_apuio_reg[0x14] = page;

        tracing::debug!(page, odd = self.state.cpu_odd_cycle, "oam dma armed");
        self.state.oam_dma = OamDma {
            active: true,
            // An extra alignment cycle is needed when the write lands on an
            // odd CPU cycle.
            cycle: if self.state.cpu_odd_cycle { 0 } else { 1 },
            data: 0,
            src_address: (page as u16) << 8,
            dst_address: self.state.ppu.oam_address,
        };
    }

    // ---------------------------------------------------------------- DMA

    /// One stolen cycle of the 256-byte OAM transfer: alternating reads from
    /// the source page and writes into primary OAM.
    fn oam_dma_execute(&mut self) {
        let cur = self.state.oam_dma.cycle;
        self.state.oam_dma.cycle += 1;

        if (2..=513).contains(&cur) {
            if cur % 2 == 1 {
                self.taps.on_memory(
                    MemoryKind::Oam,
                    MemoryOp::Write,
                    self.state.oam_dma.dst_address as u16,
                    &mut self.state.oam_dma.data,
                );
                let dst = self.state.oam_dma.dst_address;
                self.state.ppu.primary_oam[dst as usize] = self.state.oam_dma.data;
                self.state.oam_dma.dst_address = dst.wrapping_add(1);
            } else {
                self.state.oam_dma.data = self.read_dma_byte(self.state.oam_dma.src_address);
                let src = self.state.oam_dma.src_address;
                self.taps.on_memory(
                    MemoryKind::Cpu,
                    MemoryOp::ReadDma,
                    src,
                    &mut self.state.oam_dma.data,
                );
                self.state.oam_dma.src_address = src.wrapping_add(1);
            }
        }

        if cur >= 513 {
            self.state.oam_dma.active = false;
        }
    }

    fn dmc_dma_init(&mut self) {
        let stall = if self.state.oam_dma.active {
            // Interleaving with an OAM DMA shortens or lengthens the steal
            // depending on where that transfer stands.
            match self.state.oam_dma.cycle {
                514 => 3,
                513 => 1,
                _ => 2,
            }
        } else {
            let mut stall = 4;
            if self.state.cpu.rw_mode == RwMode::Write {
                // Peek one cycle ahead on a copy: the CPU finishing its
                // write sequence absorbs one stall cycle.
                let next = C::step(self.state.cpu);
                if next.rw_mode != RwMode::Write {
                    stall = 3;
                }
            }
            stall
        };

        tracing::debug!(
            stall,
            address = self.state.apu.dmc.current_address,
            "dmc dma armed"
        );
        self.state.dmc_dma = DmcDma {
            active: true,
            stall,
            src_address: self.state.apu.dmc.current_address,
        };
    }

    /// One cycle of a DMC fetch: burn the stall, then read the sample byte.
    fn dmc_dma_execute(&mut self) {
        // The channel can run dry mid-stall ($4015 write): abandon the
        // fetch and release the bus.
        if self.state.apu.dmc.bytes_remaining == 0 {
            self.state.dmc_dma.active = false;
            return;
        }

        // While the CPU is halted on a read of $4015/$4016/$4017, the
        // repeated cycles re-trigger those registers (the double-clock
        // glitch).
        if self.state.cpu.rw_mode == RwMode::Read {
            match self.state.cpu.address {
                cpu_mem::APU_STATUS => self.state.apu.begin_register_read(cpu_mem::APU_STATUS),
                cpu_mem::CONTROLLER_PORT_1 => {
                    self.state.cpu.data = self.state.controller.read();
                }
                _ => {}
            }
        }

        self.state.dmc_dma.stall -= 1;
        if self.state.dmc_dma.stall > 0 {
            return;
        }

        let mut byte = self.read_dma_byte(self.state.dmc_dma.src_address);
        self.taps.on_memory(
            MemoryKind::Cpu,
            MemoryOp::ReadDma,
            self.state.dmc_dma.src_address,
            &mut byte,
        );
        self.state.apu.dmc.complete_dma(byte);
        self.state.dmc_dma.active = false;
    }

    /// DMA-side memory read: cartridge from `$6000` up, internal RAM
    /// mirrors for everything below (the DMA units never address the
    /// register windows).
    fn read_dma_byte(&self, address: u16) -> u8 {
        if address >= cpu_mem::PRG_RAM_START {
            self.cartridge.cpu_read(address).unwrap_or(0)
        } else {
            self.state.ram[(address & cpu_mem::INTERNAL_RAM_MASK) as usize]
        }
    }

    // ------------------------------------------------------------ debugger

    /// Side-effect free memory read for debuggers and tooling. Register
    /// windows report the last byte driven through them rather than live
    /// hardware state.
    pub fn read_memory(&self, kind: MemoryKind, address: u16, buffer: &mut [u8]) {
        for (i, slot) in buffer.iter_mut().enumerate() {
            let addr = address.wrapping_add(i as u16);
            *slot = match kind {
                MemoryKind::Cpu => self.peek_cpu_byte(addr),
                MemoryKind::Ppu => self.peek_ppu_byte(addr),
                MemoryKind::Oam => self.state.ppu.primary_oam[(addr & 0xFF) as usize],
            };
        }
    }

    fn peek_cpu_byte(&self, address: u16) -> u8 {
        if address <= cpu_mem::INTERNAL_RAM_MIRROR_END {
            self.state.ram[(address & cpu_mem::INTERNAL_RAM_MASK) as usize]
        } else if address <= cpu_mem::PPU_REGISTER_END {
            self.state.cached_ppu_reg[(address & ppu_mem::REGISTER_SELECT_MASK) as usize]
        } else if address < cpu_mem::CARTRIDGE_SPACE_BASE {
            self.state.cached_apuio_reg[(address & 0x1F) as usize]
        } else {
            self.cartridge.cpu_read(address).unwrap_or(0)
        }
    }

    fn peek_ppu_byte(&self, address: u16) -> u8 {
        let address = address & ppu_mem::VRAM_MIRROR_MASK;
        if address < ppu_mem::NAMETABLE_BASE {
            self.cartridge.chr_read(address)
        } else if address < ppu_mem::PALETTE_BASE {
            match self.cartridge.map_nametable(address) {
                NametableTarget::Ciram(offset) => self.state.vram[offset],
                NametableTarget::Mapper(offset) => self.cartridge.nt_read(offset),
            }
        } else {
            let mut index = (address & 0x1F) as u8;
            if index & 0x13 == 0x10 {
                index &= !0x10;
            }
            self.state.ppu.palettes[index as usize]
        }
    }

    // ----------------------------------------------------------- snapshot

    /// Size in bytes of the serialized machine state for the current
    /// moment.
    pub fn state_size(&self) -> Result<usize, Error> {
        Ok(self.save_blob()?.len())
    }

    /// Serializes the machine state into `buffer`; returns the encoded
    /// length.
    pub fn save_state(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        let blob = self.save_blob()?;
        if buffer.len() < blob.len() {
            return Err(Error::StateBufferTooSmall {
                expected: blob.len(),
                actual: buffer.len(),
            });
        }
        buffer[..blob.len()].copy_from_slice(&blob);
        Ok(blob.len())
    }

    /// Restores a state previously produced by [`Self::save_state`] against
    /// the same ROM.
    pub fn load_state(&mut self, buffer: &[u8]) -> Result<(), Error> {
        let blob: SaveBlob = postcard::from_bytes(buffer).map_err(Error::state_codec)?;
        self.state = blob.state;
        self.cartridge.load_state(&blob.cartridge);
        Ok(())
    }

    fn save_blob(&self) -> Result<Vec<u8>, Error> {
        postcard::to_allocvec(&SaveBlob {
            state: self.state.clone(),
            cartridge: self.cartridge.save_state(),
        })
        .map_err(Error::state_codec)
    }
}

impl<C: CpuCore> core::fmt::Debug for System<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("System")
            .field("mapper", &self.cartridge.mapper().name())
            .field("scanline", &self.state.ppu.scanline)
            .field("dot", &self.state.ppu.dot)
            .field("taps", &self.taps.len())
            .finish()
    }
}
