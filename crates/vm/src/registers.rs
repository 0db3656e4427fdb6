//! The register file: 32 slots of 8 bytes, viewed at 8 (low/high), 16,
//! 32 and 64 bits.
//!
//! Views overlay the same little-endian storage. Writing a narrow view
//! leaves the other bytes of the slot untouched. Arithmetic wraps at the
//! view's width.

use regvm_common::{RegClass, RegId, MAX_REGS};

/// Initial register contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterFill {
    /// All bytes zero.
    #[default]
    Zero,
    /// Each slot holds the ASCII name of its 64-bit view, right-aligned in
    /// the low four bytes and readable in hex (`rax` is `0x20726178`).
    Sentinel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    slots: [[u8; 8]; MAX_REGS],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new(RegisterFill::Zero)
    }
}

impl RegisterFile {
    pub fn new(fill: RegisterFill) -> Self {
        let mut regs = Self {
            slots: [[0; 8]; MAX_REGS],
        };
        regs.fill(fill);
        regs
    }

    /// Reset every slot to the fill pattern.
    pub fn fill(&mut self, fill: RegisterFill) {
        for index in 0..MAX_REGS {
            let value = match fill {
                RegisterFill::Zero => 0,
                RegisterFill::Sentinel => sentinel(index),
            };
            self.set_slot(index, value);
        }
    }

    /// Read a register at its view width, zero-extended.
    pub fn get(&self, reg: RegId) -> u64 {
        let class = reg.class();
        let (off, size) = (class.offset(), class.size());
        let mut word = [0u8; 8];
        word[..size].copy_from_slice(&self.slots[reg.index()][off..off + size]);
        u64::from_le_bytes(word)
    }

    /// Write the low bytes of `value` that fit the view.
    pub fn set(&mut self, reg: RegId, value: u64) {
        let class = reg.class();
        let (off, size) = (class.offset(), class.size());
        self.slots[reg.index()][off..off + size].copy_from_slice(&value.to_le_bytes()[..size]);
    }

    /// Read by width class and slot index.
    pub fn get_at(&self, class: RegClass, index: u8) -> u64 {
        self.get(RegId::new(class, index))
    }

    pub fn set_at(&mut self, class: RegClass, index: u8, value: u64) {
        self.set(RegId::new(class, index), value)
    }

    /// Whole 64-bit slot.
    pub fn slot(&self, index: usize) -> u64 {
        u64::from_le_bytes(self.slots[index])
    }

    pub fn set_slot(&mut self, index: usize, value: u64) {
        self.slots[index] = value.to_le_bytes();
    }

    /// Copy `src` into `dst`, truncated or zero-extended to `dst`'s width.
    pub fn move_reg(&mut self, dst: RegId, src: RegId) -> u64 {
        let value = self.get(src);
        self.set(dst, value);
        self.get(dst)
    }

    pub fn inc(&mut self, reg: RegId) -> u64 {
        self.apply(reg, 1, u64::wrapping_add)
    }

    pub fn dec(&mut self, reg: RegId) -> u64 {
        self.apply(reg, 1, u64::wrapping_sub)
    }

    pub fn add(&mut self, reg: RegId, rhs: u64) -> u64 {
        self.apply(reg, rhs, u64::wrapping_add)
    }

    pub fn sub(&mut self, reg: RegId, rhs: u64) -> u64 {
        self.apply(reg, rhs, u64::wrapping_sub)
    }

    pub fn mul(&mut self, reg: RegId, rhs: u64) -> u64 {
        self.apply(reg, rhs, u64::wrapping_mul)
    }

    /// `reg = op(reg, rhs)` modulo the view width. Returns the new value.
    pub fn apply(&mut self, reg: RegId, rhs: u64, op: fn(u64, u64) -> u64) -> u64 {
        let result = op(self.get(reg), rhs) & reg.class().mask();
        self.set(reg, result);
        result
    }
}

fn sentinel(index: usize) -> u64 {
    let name = RegId::new(RegClass::R64, index as u8).to_string();
    let mut word = [b' '; 4];
    let bytes = name.as_bytes();
    let n = bytes.len().min(4);
    word[4 - n..].copy_from_slice(&bytes[bytes.len() - n..]);
    u32::from_be_bytes(word) as u64
}
