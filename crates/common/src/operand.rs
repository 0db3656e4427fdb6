//! Operand tags: data types, jump and call encodings, operand combinations
//! and the target profile that decides which of them are valid.
//!
//! Data types and register classes (see [`crate::register::RegClass`]) are
//! related but distinct tag spaces: register classes add an 8-bit high
//! half and have no signedness or pointer form.

use std::fmt;

use crate::error::DecodeError;

/// Pointer width of the machine an image was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TargetProfile {
    /// 4-byte pointers. 64-bit registers, 64-bit data and `Ptr64` targets
    /// do not decode.
    Bits32,
    /// 8-byte pointers. Every operand form is valid.
    #[default]
    Bits64,
}

impl TargetProfile {
    /// Size in bytes of a pointer, an absolute address operand and a
    /// return-address slot on the stack.
    pub fn pointer_width(self) -> usize {
        match self {
            TargetProfile::Bits32 => 4,
            TargetProfile::Bits64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TargetProfile::Bits32 => "32-bit",
            TargetProfile::Bits64 => "64-bit",
        }
    }

    /// Fail with `UnsupportedOnProfile` unless 64-bit forms are available.
    pub(crate) fn require_64(self, what: &'static str) -> Result<(), DecodeError> {
        match self {
            TargetProfile::Bits64 => Ok(()),
            TargetProfile::Bits32 => Err(DecodeError::UnsupportedOnProfile {
                what,
                profile: self.name(),
            }),
        }
    }

    /// Mask an address or pointer value to the profile's pointer width.
    pub fn truncate_pointer(self, value: u64) -> u64 {
        match self {
            TargetProfile::Bits32 => value & 0xFFFF_FFFF,
            TargetProfile::Bits64 => value,
        }
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Signedness and width of a value loaded from, stored to, or skipped over
/// in the image.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8 = 0x00,
    UInt8 = 0x01,
    Int16 = 0x02,
    UInt16 = 0x03,
    Int32 = 0x04,
    UInt32 = 0x05,
    Int64 = 0x06,
    UInt64 = 0x07,
    Pointer = 0x08,
}

/// All data types, in encoding order.
pub const ALL_DATA_TYPES: [DataType; 9] = [
    DataType::Int8,
    DataType::UInt8,
    DataType::Int16,
    DataType::UInt16,
    DataType::Int32,
    DataType::UInt32,
    DataType::Int64,
    DataType::UInt64,
    DataType::Pointer,
];

impl TryFrom<u8> for DataType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(DataType::Int8),
            0x01 => Ok(DataType::UInt8),
            0x02 => Ok(DataType::Int16),
            0x03 => Ok(DataType::UInt16),
            0x04 => Ok(DataType::Int32),
            0x05 => Ok(DataType::UInt32),
            0x06 => Ok(DataType::Int64),
            0x07 => Ok(DataType::UInt64),
            0x08 => Ok(DataType::Pointer),
            _ => Err(DecodeError::UnknownDataType(value)),
        }
    }
}

impl DataType {
    /// Width in bytes. `Pointer` follows the profile.
    pub fn size(self, profile: TargetProfile) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 => 4,
            DataType::Int64 | DataType::UInt64 => 8,
            DataType::Pointer => profile.pointer_width(),
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Reject 64-bit data on a 32-bit profile.
    pub fn check(self, profile: TargetProfile) -> Result<Self, DecodeError> {
        match self {
            DataType::Int64 | DataType::UInt64 => profile.require_64("64-bit data")?,
            _ => {}
        }
        Ok(self)
    }

    /// Widen the low `size` bytes of `raw` to a 64-bit word: sign-extended
    /// for signed types, zero-extended otherwise.
    pub fn widen(self, raw: u64, profile: TargetProfile) -> u64 {
        match self {
            DataType::Int8 => raw as i8 as i64 as u64,
            DataType::UInt8 => raw as u8 as u64,
            DataType::Int16 => raw as i16 as i64 as u64,
            DataType::UInt16 => raw as u16 as u64,
            DataType::Int32 => raw as i32 as i64 as u64,
            DataType::UInt32 => raw as u32 as u64,
            DataType::Int64 | DataType::UInt64 => raw,
            DataType::Pointer => profile.truncate_pointer(raw),
        }
    }

    /// Short suffix used by the disassembler (`i8`, `u32`, `ptr`).
    pub fn suffix(self) -> &'static str {
        match self {
            DataType::Int8 => "i8",
            DataType::UInt8 => "u8",
            DataType::Int16 => "i16",
            DataType::UInt16 => "u16",
            DataType::Int32 => "i32",
            DataType::UInt32 => "u32",
            DataType::Int64 => "i64",
            DataType::UInt64 => "u64",
            DataType::Pointer => "ptr",
        }
    }
}

/// Tag byte of a `push`/`pop` operand. Extends [`DataType`] with a raw
/// data word and a register operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackTag {
    Typed(DataType),
    /// A 4-byte data word.
    Data,
    /// A register, moved at the register's own width.
    Reg,
}

impl StackTag {
    pub const DATA: u8 = 0x0A;
    pub const REG: u8 = 0x0B;

    pub fn to_byte(self) -> u8 {
        match self {
            StackTag::Typed(dt) => dt as u8,
            StackTag::Data => Self::DATA,
            StackTag::Reg => Self::REG,
        }
    }
}

impl TryFrom<u8> for StackTag {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Self::DATA => Ok(StackTag::Data),
            Self::REG => Ok(StackTag::Reg),
            other => DataType::try_from(other).map(StackTag::Typed),
        }
    }
}

/// Width and addressing mode of a jump target.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JumpType {
    /// 1-byte signed offset.
    Near = 0x00,
    /// 2-byte signed offset.
    Short = 0x01,
    /// 4-byte signed offset.
    Long = 0x02,
    /// 4-byte absolute address.
    Ptr32 = 0x03,
    /// 8-byte absolute address. 64-bit profile only.
    Ptr64 = 0x04,
}

pub const ALL_JUMP_TYPES: [JumpType; 5] = [
    JumpType::Near,
    JumpType::Short,
    JumpType::Long,
    JumpType::Ptr32,
    JumpType::Ptr64,
];

impl TryFrom<u8> for JumpType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(JumpType::Near),
            0x01 => Ok(JumpType::Short),
            0x02 => Ok(JumpType::Long),
            0x03 => Ok(JumpType::Ptr32),
            0x04 => Ok(JumpType::Ptr64),
            _ => Err(DecodeError::UnknownJumpType(value)),
        }
    }
}

impl JumpType {
    /// Bytes consumed by the encoded offset or address.
    pub fn operand_size(self) -> usize {
        match self {
            JumpType::Near => 1,
            JumpType::Short => 2,
            JumpType::Long | JumpType::Ptr32 => 4,
            JumpType::Ptr64 => 8,
        }
    }

    pub fn is_absolute(self) -> bool {
        matches!(self, JumpType::Ptr32 | JumpType::Ptr64)
    }

    pub fn check(self, profile: TargetProfile) -> Result<Self, DecodeError> {
        if self == JumpType::Ptr64 {
            profile.require_64("ptr64 jump")?;
        }
        Ok(self)
    }

    pub fn name(self) -> &'static str {
        match self {
            JumpType::Near => "near",
            JumpType::Short => "short",
            JumpType::Long => "long",
            JumpType::Ptr32 => "ptr32",
            JumpType::Ptr64 => "ptr64",
        }
    }
}

/// Width and addressing mode of a call target.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallType {
    /// 2-byte signed offset.
    Short = 0x00,
    /// 4-byte signed offset.
    Long = 0x01,
    /// 4-byte absolute address.
    Ptr32 = 0x02,
    /// 8-byte absolute address. 64-bit profile only.
    Ptr64 = 0x03,
}

pub const ALL_CALL_TYPES: [CallType; 4] = [
    CallType::Short,
    CallType::Long,
    CallType::Ptr32,
    CallType::Ptr64,
];

impl TryFrom<u8> for CallType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(CallType::Short),
            0x01 => Ok(CallType::Long),
            0x02 => Ok(CallType::Ptr32),
            0x03 => Ok(CallType::Ptr64),
            _ => Err(DecodeError::UnknownCallType(value)),
        }
    }
}

impl CallType {
    pub fn operand_size(self) -> usize {
        match self {
            CallType::Short => 2,
            CallType::Long | CallType::Ptr32 => 4,
            CallType::Ptr64 => 8,
        }
    }

    pub fn is_absolute(self) -> bool {
        matches!(self, CallType::Ptr32 | CallType::Ptr64)
    }

    pub fn check(self, profile: TargetProfile) -> Result<Self, DecodeError> {
        if self == CallType::Ptr64 {
            profile.require_64("ptr64 call")?;
        }
        Ok(self)
    }

    pub fn name(self) -> &'static str {
        match self {
            CallType::Short => "short",
            CallType::Long => "long",
            CallType::Ptr32 => "ptr32",
            CallType::Ptr64 => "ptr64",
        }
    }
}

/// Bit flags naming the kind of one operand. A combination byte packs two
/// of them as `first * 16 | second`.
pub mod combo_mask {
    pub const REG: u8 = 1;
    pub const IMM: u8 = 2;
    pub const ADDR: u8 = 4;
}

/// Operand combination of a two-operand instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combo {
    RegReg = 0x11,
    RegImm = 0x12,
    RegAddr = 0x14,
    AddrImm = 0x42,
    AddrAddr = 0x44,
}

impl TryFrom<u8> for Combo {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x11 => Ok(Combo::RegReg),
            0x12 => Ok(Combo::RegImm),
            0x14 => Ok(Combo::RegAddr),
            0x42 => Ok(Combo::AddrImm),
            0x44 => Ok(Combo::AddrAddr),
            _ => Err(DecodeError::UnknownCombo(value)),
        }
    }
}

impl Combo {
    /// Combination byte for two operand kinds.
    pub const fn make(first: u8, second: u8) -> u8 {
        (first * 16) | second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_sizes() {
        let p64 = TargetProfile::Bits64;
        let sizes: Vec<usize> = ALL_DATA_TYPES.iter().map(|dt| dt.size(p64)).collect();
        assert_eq!(sizes, vec![1, 1, 2, 2, 4, 4, 8, 8, 8]);
        assert_eq!(DataType::Pointer.size(TargetProfile::Bits32), 4);
    }

    #[test]
    fn data_type_roundtrip_and_reserved() {
        for dt in ALL_DATA_TYPES {
            assert_eq!(DataType::try_from(dt as u8), Ok(dt));
        }
        assert_eq!(
            DataType::try_from(0x09),
            Err(DecodeError::UnknownDataType(0x09))
        );
    }

    #[test]
    fn widen_sign_extends_signed_types() {
        let p = TargetProfile::Bits64;
        assert_eq!(DataType::Int8.widen(0xFF, p), u64::MAX);
        assert_eq!(DataType::UInt8.widen(0xFF, p), 0xFF);
        assert_eq!(DataType::Int16.widen(0x8000, p), 0xFFFF_FFFF_FFFF_8000);
        assert_eq!(DataType::Int32.widen(0x7FFF_FFFF, p), 0x7FFF_FFFF);
        assert_eq!(DataType::Pointer.widen(u64::MAX, TargetProfile::Bits32), 0xFFFF_FFFF);
    }

    #[test]
    fn profile_gates_64_bit_forms() {
        let p32 = TargetProfile::Bits32;
        assert!(DataType::Int64.check(p32).is_err());
        assert!(DataType::UInt32.check(p32).is_ok());
        assert!(JumpType::Ptr64.check(p32).is_err());
        assert!(JumpType::Ptr32.check(p32).is_ok());
        assert!(CallType::Ptr64.check(p32).is_err());
        assert!(CallType::Ptr64.check(TargetProfile::Bits64).is_ok());
    }

    #[test]
    fn stack_tags() {
        assert_eq!(StackTag::try_from(0x0B), Ok(StackTag::Reg));
        assert_eq!(StackTag::try_from(0x0A), Ok(StackTag::Data));
        assert_eq!(
            StackTag::try_from(0x05),
            Ok(StackTag::Typed(DataType::UInt32))
        );
        assert_eq!(
            StackTag::try_from(0x09),
            Err(DecodeError::UnknownDataType(0x09))
        );
        assert_eq!(StackTag::Reg.to_byte(), 0x0B);
    }

    #[test]
    fn jump_and_call_operand_sizes() {
        let jumps: Vec<usize> = ALL_JUMP_TYPES.iter().map(|j| j.operand_size()).collect();
        assert_eq!(jumps, vec![1, 2, 4, 4, 8]);
        let calls: Vec<usize> = ALL_CALL_TYPES.iter().map(|c| c.operand_size()).collect();
        assert_eq!(calls, vec![2, 4, 4, 8]);
        assert_eq!(
            JumpType::try_from(0x05),
            Err(DecodeError::UnknownJumpType(0x05))
        );
        assert_eq!(
            CallType::try_from(0x04),
            Err(DecodeError::UnknownCallType(0x04))
        );
    }

    #[test]
    fn combo_bytes_pack_operand_kinds() {
        use combo_mask::*;
        assert_eq!(Combo::make(REG, REG), Combo::RegReg as u8);
        assert_eq!(Combo::make(REG, IMM), Combo::RegImm as u8);
        assert_eq!(Combo::make(REG, ADDR), Combo::RegAddr as u8);
        assert_eq!(Combo::make(ADDR, IMM), Combo::AddrImm as u8);
        assert_eq!(Combo::make(ADDR, ADDR), Combo::AddrAddr as u8);
        assert_eq!(Combo::try_from(0x13), Err(DecodeError::UnknownCombo(0x13)));
    }
}
