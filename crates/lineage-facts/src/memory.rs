//! Host memory sources
//!
//! Everything the decoder knows about the host comes through [`HostMemory`]:
//! 64-bit word reads and raw byte reads. Two sources exist:
//!
//! - [`HeapImage`]: an owned, bounds-checked copy of a host heap region
//!   (recorded snapshots and the images built by [`crate::image::ImageBuilder`])
//! - [`RawMemory`]: direct reads of the current process's address space, for
//!   an adapter embedded in the host itself
//!
//! `RawMemory` holds the only `unsafe` code in the workspace.

use crate::error::{MemoryError, MemoryResult};

/// Host address
pub type Address = u64;

/// Size of a host word in bytes
pub const WORD: u64 = 8;

/// Addresses below this are never mapped in a live process
pub const NULL_PAGE: Address = 4096;

/// Read-only access to host memory
pub trait HostMemory {
    /// Read one aligned host word
    fn read_word(&self, addr: Address) -> MemoryResult<u64>;

    /// Read `len` raw bytes starting at `addr`
    fn read_bytes(&self, addr: Address, len: usize) -> MemoryResult<Vec<u8>>;
}

impl<M: HostMemory + ?Sized> HostMemory for &M {
    fn read_word(&self, addr: Address) -> MemoryResult<u64> {
        (**self).read_word(addr)
    }

    fn read_bytes(&self, addr: Address, len: usize) -> MemoryResult<Vec<u8>> {
        (**self).read_bytes(addr, len)
    }
}

/// An owned copy of a contiguous host heap region, words stored little-endian
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapImage {
    base: Address,
    bytes: Vec<u8>,
}

impl HeapImage {
    /// Wrap `bytes` as the memory at `base`
    pub fn new(base: Address, bytes: Vec<u8>) -> Self {
        Self { base, bytes }
    }

    /// First mapped address
    pub fn base(&self) -> Address {
        self.base
    }

    /// One past the last mapped address
    pub fn end(&self) -> Address {
        self.base + self.bytes.len() as u64
    }

    /// Raw image bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Check if `addr..addr+len` is mapped
    pub fn contains(&self, addr: Address, len: usize) -> bool {
        addr >= self.base
            && addr
                .checked_add(len as u64)
                .map_or(false, |end| end <= self.end())
    }

    fn slice(&self, addr: Address, len: usize) -> MemoryResult<&[u8]> {
        if !self.contains(addr, len) {
            return Err(MemoryError::Unmapped { addr, len });
        }
        let start = (addr - self.base) as usize;
        Ok(&self.bytes[start..start + len])
    }
}

impl HostMemory for HeapImage {
    fn read_word(&self, addr: Address) -> MemoryResult<u64> {
        if addr % WORD != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        let raw = self.slice(addr, WORD as usize)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(raw);
        Ok(u64::from_le_bytes(buf))
    }

    fn read_bytes(&self, addr: Address, len: usize) -> MemoryResult<Vec<u8>> {
        Ok(self.slice(addr, len)?.to_vec())
    }
}

/// Direct reads of the current process's memory
///
/// Addresses in the null page, misaligned words and ranges that wrap the
/// address space are rejected; every other address is dereferenced as-is.
#[derive(Debug)]
pub struct RawMemory {
    _private: (),
}

impl RawMemory {
    /// Create a reader over live process memory
    ///
    /// # Safety
    ///
    /// Every non-null, aligned address later passed to [`HostMemory`] reads,
    /// including addresses the decoder derives by following host pointers,
    /// must be valid for reads and must not be mutated for the duration of
    /// the query that reads it. In practice: the handles must come from a
    /// live host whose object model matches the facts used to decode it, and
    /// the host must not run concurrently with the query.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl HostMemory for RawMemory {
    fn read_word(&self, addr: Address) -> MemoryResult<u64> {
        if addr < NULL_PAGE {
            return Err(MemoryError::Unmapped { addr, len: WORD as usize });
        }
        if addr % WORD != 0 {
            return Err(MemoryError::Misaligned(addr));
        }
        // SAFETY: outside the null page and aligned; validity is the contract of `RawMemory::new`.
        let word = unsafe { std::ptr::read(addr as usize as *const u64) };
        Ok(word)
    }

    fn read_bytes(&self, addr: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let wraps = addr
            .checked_add(len as u64)
            .map_or(true, |end| end > usize::MAX as u64);
        if addr < NULL_PAGE || wraps {
            return Err(MemoryError::Unmapped { addr, len });
        }
        // SAFETY: outside the null page and not wrapping; validity of
        // `addr..addr+len` is the contract of `RawMemory::new`.
        let bytes = unsafe { std::slice::from_raw_parts(addr as usize as *const u8, len) };
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_image_word_reads() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        bytes.extend_from_slice(&42u64.to_le_bytes());
        let image = HeapImage::new(0x1000, bytes);

        assert_eq!(image.read_word(0x1000).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(image.read_word(0x1008).unwrap(), 42);
        assert_eq!(image.end(), 0x1010);
    }

    #[test]
    fn test_heap_image_rejects_unmapped_and_misaligned() {
        let image = HeapImage::new(0x1000, vec![0; 16]);

        assert_eq!(
            image.read_word(0x1010),
            Err(MemoryError::Unmapped { addr: 0x1010, len: 8 })
        );
        assert_eq!(
            image.read_word(0x0ff8),
            Err(MemoryError::Unmapped { addr: 0x0ff8, len: 8 })
        );
        assert_eq!(image.read_word(0x1004), Err(MemoryError::Misaligned(0x1004)));
        assert!(image.read_bytes(u64::MAX - 2, 8).is_err());
    }

    #[test]
    fn test_raw_memory_reads_live_words() {
        let words: Box<[u64]> = vec![7, 0xdead_beef, 0].into_boxed_slice();
        let base = words.as_ptr() as usize as u64;
        let memory = unsafe { RawMemory::new() };

        assert_eq!(memory.read_word(base).unwrap(), 7);
        assert_eq!(memory.read_word(base + 8).unwrap(), 0xdead_beef);
        assert_eq!(memory.read_bytes(base, 8).unwrap(), 7u64.to_ne_bytes().to_vec());
        assert!(memory.read_word(0).is_err());
        assert_eq!(
            memory.read_word(0x10),
            Err(MemoryError::Unmapped { addr: 0x10, len: 8 })
        );
        assert!(memory.read_bytes(0x800, 4).is_err());
        assert!(memory.read_bytes(u64::MAX - 8, 16).is_err());
        assert_eq!(memory.read_word(base + 1), Err(MemoryError::Misaligned(base + 1)));
    }
}
