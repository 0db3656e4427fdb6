//! Binary image: the contiguous code buffer a machine executes.

use crate::error::RuntimeError;

/// Required alignment of an image's base address.
pub const IMAGE_ALIGNMENT: u64 = 256;

/// Required alignment of call targets, jump targets and the entry point.
pub const JUMP_ALIGNMENT: u64 = 16;

/// Owns the bytes of one program and the address it is mapped at.
///
/// Addresses seen by the machine are virtual: `base_address + offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryImage {
    bytes: Vec<u8>,
    base_address: u64,
    entry_offset: u64,
}

impl BinaryImage {
    /// A zero-filled image of `size` bytes.
    pub fn allocate(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            base_address: 0,
            entry_offset: 0,
        }
    }

    /// Take ownership of already-encoded bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            base_address: 0,
            entry_offset: 0,
        }
    }

    /// Map the image at `base_address`, which must be 256-byte aligned.
    pub fn with_base_address(mut self, base_address: u64) -> Result<Self, RuntimeError> {
        if base_address % IMAGE_ALIGNMENT != 0 {
            return Err(RuntimeError::InvalidImage {
                at: base_address,
                reason: "base address is not 256-byte aligned",
            });
        }
        if base_address.checked_add(self.bytes.len() as u64).is_none() {
            return Err(RuntimeError::InvalidImage {
                at: base_address,
                reason: "image does not fit the address space",
            });
        }
        self.base_address = base_address;
        Ok(self)
    }

    /// Fix the entry point at `base + offset`. The entry must lie inside
    /// the image and be 16-byte aligned.
    pub fn set_entry_offset(&mut self, offset: u64) -> Result<(), RuntimeError> {
        if offset >= self.bytes.len() as u64 {
            return Err(RuntimeError::InvalidImage {
                at: self.base_address.saturating_add(offset),
                reason: "entry point outside the image",
            });
        }
        // with_base_address guarantees base + len fits.
        let entry = self.base_address + offset;
        if entry % JUMP_ALIGNMENT != 0 {
            return Err(RuntimeError::Misaligned { at: entry, target: entry });
        }
        self.entry_offset = offset;
        Ok(())
    }

    /// Release the buffer. Safe to call more than once.
    pub fn deallocate(&mut self) {
        self.bytes = Vec::new();
        self.entry_offset = 0;
    }

    pub fn is_allocated(&self) -> bool {
        !self.bytes.is_empty()
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn entry_offset(&self) -> u64 {
        self.entry_offset
    }

    /// Absolute entry address.
    pub fn entry_address(&self) -> u64 {
        self.base_address + self.entry_offset
    }

    /// One past the last byte.
    pub fn limit_address(&self) -> u64 {
        self.base_address + self.bytes.len() as u64
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
