//! Fixed-size byte blocks with savestate-friendly serialization.
//!
//! Serde only derives array impls up to 32 elements, so the larger hardware
//! blocks (CPU RAM, CIRAM, OAM) go through a manual sequence codec that
//! round-trips any `N`.

use core::ops::{Deref, DerefMut};

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemBlock<const N: usize>([u8; N]);

impl<const N: usize> serde::Serialize for MemBlock<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(self.as_slice())
    }
}

impl<'de, const N: usize> serde::Deserialize<'de> for MemBlock<N> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct Visitor<const N: usize>;

        impl<'de, const N: usize> serde::de::Visitor<'de> for Visitor<N> {
            type Value = MemBlock<N>;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "a byte block of length {N}")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v.len() != N {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut out = MemBlock::<N>::new();
                out.as_mut_slice().copy_from_slice(v);
                Ok(out)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let mut out = MemBlock::<N>::new();
                for idx in 0..N {
                    let Some(value) = seq.next_element::<u8>()? else {
                        return Err(serde::de::Error::invalid_length(idx, &self));
                    };
                    out.as_mut_slice()[idx] = value;
                }
                Ok(out)
            }
        }

        deserializer.deserialize_bytes(Visitor::<N>)
    }
}

impl<const N: usize> MemBlock<N> {
    #[inline]
    pub fn new() -> Self {
        Self([0; N])
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl<const N: usize> Default for MemBlock<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for MemBlock<N> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<const N: usize> DerefMut for MemBlock<N> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub mod cpu {
    use crate::memory::cpu as cpu_mem;

    pub type Ram = super::MemBlock<{ cpu_mem::INTERNAL_RAM_SIZE }>;
}

pub mod ppu {
    use crate::memory::ppu as ppu_mem;

    /// The four mirrored 1 KiB nametable pages addressed by the mappers.
    pub type Ciram = super::MemBlock<{ ppu_mem::NAMETABLE_SPACE }>;
    pub type PaletteRam = super::MemBlock<{ ppu_mem::PALETTE_RAM_SIZE }>;
    pub type OamRam = super::MemBlock<{ ppu_mem::OAM_RAM_SIZE }>;
    pub type SecondaryOamRam = super::MemBlock<{ ppu_mem::SECONDARY_OAM_RAM_SIZE }>;
}

#[cfg(test)]
mod tests {
    use super::MemBlock;

    #[test]
    fn serde_round_trip() {
        let mut block = MemBlock::<64>::new();
        for (i, b) in block.as_mut_slice().iter_mut().enumerate() {
            *b = i as u8;
        }
        let bytes = postcard::to_allocvec(&block).expect("serialize");
        let back: MemBlock<64> = postcard::from_bytes(&bytes).expect("deserialize");
        assert_eq!(block, back);
    }
}
