//! Decode and build errors for regvm instruction streams.

use thiserror::Error;

/// Errors that occur while decoding an instruction stream.
///
/// Every variant names the offending byte value so a host can report it
/// next to the faulting address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode falls in a reserved range.
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),

    /// A conditional-jump opcode appeared outside a `cmp` instruction.
    #[error("conditional jump {0:#04x} without a preceding compare")]
    DanglingCondition(u8),

    /// Byte is not a data-type tag.
    #[error("unknown data type: {0:#04x}")]
    UnknownDataType(u8),

    /// Register class is reserved (r128 and wider) or out of range.
    #[error("unsupported register class {class} in register id {id:#04x}")]
    UnsupportedRegister { id: u8, class: u8 },

    /// Byte is not a jump-type tag.
    #[error("unknown jump type: {0:#04x}")]
    UnknownJumpType(u8),

    /// Byte is not a call-type tag.
    #[error("unknown call type: {0:#04x}")]
    UnknownCallType(u8),

    /// Byte is not an operand combination.
    #[error("unknown operand combination: {0:#04x}")]
    UnknownCombo(u8),

    /// Byte is not one of the eight condition codes.
    #[error("unknown condition code: {0:#04x}")]
    UnknownCondition(u8),

    /// Return kind outside Basic..=Struct.
    #[error("unknown return kind: {0}")]
    UnknownReturnKind(u32),

    /// Operand form exists but not on the active target profile
    /// (64-bit registers, 64-bit data or `Ptr64` targets on a 32-bit profile).
    #[error("{what} is not available on the {profile} profile")]
    UnsupportedOnProfile {
        what: &'static str,
        profile: &'static str,
    },

    /// The stream ended inside an instruction.
    #[error("truncated instruction: needed {needed} more byte(s), {available} available")]
    Truncated { needed: usize, available: usize },
}

/// Errors reported by [`crate::builder::ImageBuilder::finish`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("label {0} is referenced but never bound")]
    UnboundLabel(usize),

    #[error("label {0} is bound twice")]
    Rebound(usize),

    /// The distance or address does not fit the chosen encoding.
    #[error("label {label} at {dest:#x} is out of range for a {kind} target from {base:#x}")]
    OutOfRange {
        label: usize,
        kind: &'static str,
        base: u64,
        dest: u64,
    },
}
