//! Load-time errors.
//!
//! Runtime emulation is a closed deterministic machine and never fails; the
//! only fallible boundary is cartridge construction.

use thiserror::Error;

use crate::cartridge::header::NES_HEADER_LEN;

#[derive(Debug, Error)]
pub enum Error {
    /// Provided buffer is shorter than the 16-byte header.
    #[error("header expected {NES_HEADER_LEN} bytes, got {actual}")]
    TooShort { actual: usize },
    /// Magic number ("NES<EOF>") is missing.
    #[error("missing NES magic bytes")]
    InvalidMagic,
    /// A ROM section (trainer/PRG/CHR) is shorter than advertised.
    #[error("{section} section expected {expected} bytes, got {actual}")]
    SectionTooShort {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Header advertises a zero-sized PRG ROM.
    #[error("cartridge advertises no PRG ROM")]
    EmptyPrgRom,
    /// Header advertises a mapper number that this core does not implement.
    #[error("mapper {0} is not implemented")]
    UnsupportedMapper(u16),
    /// Wrapper for I/O errors raised while reading ROMs from disk.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Caller-provided savestate buffer cannot hold the encoded state.
    #[error("savestate buffer too small: need {expected} bytes, got {actual}")]
    StateBufferTooSmall { expected: usize, actual: usize },
    /// Savestate blob failed to encode or decode.
    #[error("savestate codec error: {0}")]
    StateCodec(postcard::Error),
}

impl Error {
    pub(crate) fn state_codec(err: postcard::Error) -> Self {
        Self::StateCodec(err)
    }
}
