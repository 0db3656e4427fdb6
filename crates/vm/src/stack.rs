//! Operand and call stack.
//!
//! A fixed-capacity, zero-initialised byte buffer with a stack pointer
//! that grows either forward (up from offset 0) or backward (down from the
//! capacity). Every push and pop checks its bounds first; a failed
//! operation leaves the stack unchanged.

use regvm_common::{RegId, Scalar, TargetProfile};

use crate::error::RuntimeError;
use crate::registers::RegisterFile;

/// Direction the stack pointer moves on push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StackGrowth {
    #[default]
    Forward,
    Backward,
}

/// A stack bound check that failed. Converted to a [`RuntimeError`] with
/// the faulting address by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackFault {
    Overflow { needed: usize, available: usize },
    Underflow { needed: usize, available: usize },
}

impl StackFault {
    pub fn at(self, at: u64) -> RuntimeError {
        match self {
            StackFault::Overflow { needed, available } => RuntimeError::StackOverflow {
                at,
                needed,
                available,
            },
            StackFault::Underflow { needed, available } => RuntimeError::StackUnderflow {
                at,
                needed,
                available,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stack {
    buf: Vec<u8>,
    sp: usize,
    growth: StackGrowth,
    pointer_width: usize,
}

impl Stack {
    pub fn create(capacity: usize, growth: StackGrowth, profile: TargetProfile) -> Self {
        let sp = match growth {
            StackGrowth::Forward => 0,
            StackGrowth::Backward => capacity,
        };
        Self {
            buf: vec![0; capacity],
            sp,
            growth,
            pointer_width: profile.pointer_width(),
        }
    }

    /// Empty the stack and zero its contents.
    pub fn reset(&mut self) {
        self.buf.fill(0);
        self.sp = self.resting_point();
    }

    fn resting_point(&self) -> usize {
        match self.growth {
            StackGrowth::Forward => 0,
            StackGrowth::Backward => self.buf.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn growth(&self) -> StackGrowth {
        self.growth
    }

    /// Stack pointer as an offset into the buffer.
    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Bytes in use: distance from the resting point.
    pub fn size(&self) -> usize {
        match self.growth {
            StackGrowth::Forward => self.sp,
            StackGrowth::Backward => self.buf.len() - self.sp,
        }
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Width of a return-address slot.
    pub fn pointer_width(&self) -> usize {
        self.pointer_width
    }

    /// The pointer has reached the far end of the buffer.
    pub fn is_overflow(&self) -> bool {
        match self.growth {
            StackGrowth::Forward => self.sp >= self.buf.len(),
            StackGrowth::Backward => self.sp == 0,
        }
    }

    /// The pointer has moved behind its resting point.
    pub fn is_underflow(&self) -> bool {
        match self.growth {
            StackGrowth::Forward => false,
            StackGrowth::Backward => self.sp > self.buf.len(),
        }
    }

    /// Push the low `size` bytes of `value`.
    pub fn push_sized(&mut self, value: u64, size: usize) -> Result<(), StackFault> {
        let size = size.min(8);
        if size > self.remaining() {
            return Err(StackFault::Overflow {
                needed: size,
                available: self.remaining(),
            });
        }
        let start = match self.growth {
            StackGrowth::Forward => {
                self.sp += size;
                self.sp - size
            }
            StackGrowth::Backward => {
                self.sp -= size;
                self.sp
            }
        };
        self.buf[start..start + size].copy_from_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    /// Pop `size` bytes as a zero-extended word.
    pub fn pop_sized(&mut self, size: usize) -> Result<u64, StackFault> {
        let size = size.min(8);
        if size > self.size() {
            return Err(StackFault::Underflow {
                needed: size,
                available: self.size(),
            });
        }
        let start = match self.growth {
            StackGrowth::Forward => {
                self.sp -= size;
                self.sp
            }
            StackGrowth::Backward => {
                self.sp += size;
                self.sp - size
            }
        };
        let mut word = [0u8; 8];
        word[..size].copy_from_slice(&self.buf[start..start + size]);
        Ok(u64::from_le_bytes(word))
    }

    /// Claim `size` bytes without writing them.
    pub fn reserve(&mut self, size: usize) -> Result<(), StackFault> {
        if size > self.remaining() {
            return Err(StackFault::Overflow {
                needed: size,
                available: self.remaining(),
            });
        }
        match self.growth {
            StackGrowth::Forward => self.sp += size,
            StackGrowth::Backward => self.sp -= size,
        }
        Ok(())
    }

    /// Drop the top `size` bytes.
    pub fn release(&mut self, size: usize) -> Result<(), StackFault> {
        if size > self.size() {
            return Err(StackFault::Underflow {
                needed: size,
                available: self.size(),
            });
        }
        match self.growth {
            StackGrowth::Forward => self.sp -= size,
            StackGrowth::Backward => self.sp += size,
        }
        Ok(())
    }

    pub fn push<T: Scalar>(&mut self, value: T) -> Result<(), StackFault> {
        self.push_sized(value.to_bits(), T::SIZE)
    }

    pub fn pop<T: Scalar>(&mut self) -> Result<T, StackFault> {
        self.pop_sized(T::SIZE).map(T::from_bits)
    }

    /// Push a register at its own width. Returns the value pushed.
    pub fn push_reg(&mut self, regs: &RegisterFile, reg: RegId) -> Result<u64, StackFault> {
        let value = regs.get(reg);
        self.push_sized(value, reg.size())?;
        Ok(value)
    }

    /// Pop into a register at its own width. Returns the value popped.
    pub fn pop_reg(&mut self, regs: &mut RegisterFile, reg: RegId) -> Result<u64, StackFault> {
        let value = self.pop_sized(reg.size())?;
        regs.set(reg, value);
        Ok(value)
    }

    /// Push a return address as a pointer-width slot.
    pub fn push_callstack(&mut self, return_address: u64) -> Result<(), StackFault> {
        self.push_sized(return_address, self.pointer_width)
    }

    pub fn pop_callstack(&mut self) -> Result<u64, StackFault> {
        self.pop_sized(self.pointer_width)
    }
}
