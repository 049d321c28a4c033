//! Lookup tables shared by the APU channels (NTSC values).

/// Length counter load values, indexed by the 5-bit field of the length
/// registers.
pub(super) const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14, 12, 16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// Pulse duty sequences as bit patterns; the sequencer walks them MSB-down.
pub(super) const PULSE_DUTY_TABLE: [u8; 4] = [0x80, 0xC0, 0xF0, 0x3F];

/// Triangle 32-step output sequence.
pub(super) const TRIANGLE_SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11,
    12, 13, 14, 15,
];

/// Noise timer periods in half-cycles (the noise timer clocks on odd CPU
/// cycles only).
pub(super) const NOISE_PERIOD_TABLE: [u16; 16] = [
    2, 4, 8, 16, 32, 48, 64, 80, 101, 127, 190, 254, 381, 508, 1017, 2034,
];

/// DMC bit periods in half-cycles (the DMC timer clocks on odd CPU cycles
/// only; doubling these gives the documented CPU-cycle rates).
pub(super) const DMC_PERIOD_TABLE: [u16; 16] = [
    214, 190, 170, 160, 143, 127, 113, 107, 95, 80, 71, 64, 53, 42, 36, 27,
];

/// DMC sample addresses start at `$C000` in 64-byte steps.
pub(super) const DMC_SAMPLE_BASE: u16 = 0xC000;
pub(super) const DMC_SAMPLE_ADDR_STRIDE: u16 = 64;
pub(super) const DMC_SAMPLE_LEN_STRIDE: u16 = 16;
