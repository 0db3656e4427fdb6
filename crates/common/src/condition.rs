//! Condition codes for compare-and-branch.
//!
//! Each condition shares its byte value with the matching conditional-jump
//! opcode, so the byte after a `cmp` operand list is read as an opcode.
//!
//! `jz` and `jnz` compare *both* operands: `jz` holds only when both are
//! zero and `jnz` only when both are nonzero. They are not unary tests and
//! differ from `je 0` / `jne 0` whenever exactly one side is zero.

use std::fmt;

use crate::error::DecodeError;
use crate::operand::{DataType, TargetProfile};

/// One of the eight comparison predicates.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Jz = 0x41,
    Jnz = 0x42,
    Je = 0x43,
    Jne = 0x44,
    Jl = 0x45,
    Jle = 0x46,
    Jg = 0x47,
    Jge = 0x48,
}

/// All condition codes, in encoding order.
pub const ALL_CONDITIONS: [Condition; 8] = [
    Condition::Jz,
    Condition::Jnz,
    Condition::Je,
    Condition::Jne,
    Condition::Jl,
    Condition::Jle,
    Condition::Jg,
    Condition::Jge,
];

impl TryFrom<u8> for Condition {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x41 => Ok(Condition::Jz),
            0x42 => Ok(Condition::Jnz),
            0x43 => Ok(Condition::Je),
            0x44 => Ok(Condition::Jne),
            0x45 => Ok(Condition::Jl),
            0x46 => Ok(Condition::Jle),
            0x47 => Ok(Condition::Jg),
            0x48 => Ok(Condition::Jge),
            _ => Err(DecodeError::UnknownCondition(value)),
        }
    }
}

impl Condition {
    /// Apply the predicate to two native values.
    pub fn holds<T>(self, a: T, b: T) -> bool
    where
        T: Copy + PartialOrd + Default,
    {
        let zero = T::default();
        match self {
            Condition::Jz => a == zero && b == zero,
            Condition::Jnz => a != zero && b != zero,
            Condition::Je => a == b,
            Condition::Jne => a != b,
            Condition::Jl => a < b,
            Condition::Jle => a <= b,
            Condition::Jg => a > b,
            Condition::Jge => a >= b,
        }
    }

    /// Compare two raw 64-bit operand words as values of `data_type`.
    ///
    /// Only the low bytes of each word that fit the data type take part.
    /// Signed types compare in two's complement; `Pointer` compares as an
    /// unsigned word of the profile's pointer width.
    pub fn evaluate(self, data_type: DataType, profile: TargetProfile, a: u64, b: u64) -> bool {
        match data_type {
            DataType::Int8 => self.holds(a as i8, b as i8),
            DataType::UInt8 => self.holds(a as u8, b as u8),
            DataType::Int16 => self.holds(a as i16, b as i16),
            DataType::UInt16 => self.holds(a as u16, b as u16),
            DataType::Int32 => self.holds(a as i32, b as i32),
            DataType::UInt32 => self.holds(a as u32, b as u32),
            DataType::Int64 => self.holds(a as i64, b as i64),
            DataType::UInt64 => self.holds(a, b),
            DataType::Pointer => match profile {
                TargetProfile::Bits32 => self.holds(a as u32, b as u32),
                TargetProfile::Bits64 => self.holds(a, b),
            },
        }
    }

    /// Assembly mnemonic (`jz`, `jle`, ...).
    pub fn mnemonic(self) -> &'static str {
        match self {
            Condition::Jz => "jz",
            Condition::Jnz => "jnz",
            Condition::Je => "je",
            Condition::Jne => "jne",
            Condition::Jl => "jl",
            Condition::Jle => "jle",
            Condition::Jg => "jg",
            Condition::Jge => "jge",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
