//! Return-value descriptor handed back to the host when a run ends.

use crate::error::DecodeError;
use crate::operand::TargetProfile;

/// Shape of a returned value.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// Pointer-width integer.
    Basic = 0,
    Float = 1,
    Double = 2,
    Pointer = 3,
    /// Caller-described aggregate; the length comes from the caller.
    Struct = 4,
}

impl TryFrom<u32> for ReturnKind {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReturnKind::Basic),
            1 => Ok(ReturnKind::Float),
            2 => Ok(ReturnKind::Double),
            3 => Ok(ReturnKind::Pointer),
            4 => Ok(ReturnKind::Struct),
            _ => Err(DecodeError::UnknownReturnKind(value)),
        }
    }
}

/// A returned value: its kind, byte length and raw 64-bit payload.
///
/// Floating-point kinds are tagging only; the payload holds the raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnValue {
    kind: ReturnKind,
    length: u32,
    value: u64,
}

impl ReturnValue {
    /// A value of a fixed-length kind. For `Struct` the length is zero
    /// until [`ReturnValue::with_struct_len`] sets it.
    pub fn new(kind: ReturnKind, value: u64, profile: TargetProfile) -> Self {
        let length = match kind {
            ReturnKind::Basic | ReturnKind::Pointer => profile.pointer_width() as u32,
            ReturnKind::Float => 4,
            ReturnKind::Double => 8,
            ReturnKind::Struct => 0,
        };
        Self {
            kind,
            length,
            value,
        }
    }

    /// Pointer-width integer result.
    pub fn basic(value: u64, profile: TargetProfile) -> Self {
        Self::new(ReturnKind::Basic, profile.truncate_pointer(value), profile)
    }

    /// Aggregate result of `length` bytes. `value` is typically its address.
    pub fn with_struct_len(value: u64, length: u32) -> Self {
        Self {
            kind: ReturnKind::Struct,
            length,
            value,
        }
    }

    /// Decode a raw `(kind, length)` pair, as a host ABI would pass it.
    pub fn from_raw(kind: u32, length: u32, value: u64, profile: TargetProfile) -> Result<Self, DecodeError> {
        match ReturnKind::try_from(kind)? {
            ReturnKind::Struct => Ok(Self::with_struct_len(value, length)),
            other => Ok(Self::new(other, value, profile)),
        }
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    /// Byte length of the value.
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn value(&self) -> u64 {
        self.value
    }
}
