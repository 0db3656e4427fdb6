//! regvm common types and instruction encoding.
//!
//! This crate defines the regvm instruction set:
//!
//! - [`Opcode`]: the opcode byte values
//! - [`DataType`], [`RegClass`], [`JumpType`], [`CallType`], [`Combo`]: operand tags
//! - [`RegId`]: register identifiers (`class * 32 + index`)
//! - [`Condition`]: the eight compare-and-branch predicates
//! - [`Instruction`]: variable-length encode/decode and disassembly
//! - [`ImageBuilder`]: label-resolving program construction
//! - [`ReturnValue`]: the descriptor of a run's result
//! - [`DecodeError`] and [`BuildError`]
//!
//! Pointer width is a runtime [`TargetProfile`], not a build setting.

pub mod builder;
pub mod condition;
pub mod error;
pub mod instruction;
pub mod opcode;
pub mod operand;
pub mod register;
pub mod scalar;
pub mod value;

// Re-export commonly used types at the crate root.
pub use builder::{ImageBuilder, Label};
pub use condition::Condition;
pub use error::{BuildError, DecodeError};
pub use instruction::{
    ArithOperands, ByteSource, CallTarget, CmpOperands, Instruction, JumpTarget, PopOperand,
    PushOperand, SliceSource,
};
pub use opcode::Opcode;
pub use operand::{CallType, Combo, DataType, JumpType, StackTag, TargetProfile};
pub use register::{RegClass, RegId, MAX_REGS};
pub use scalar::Scalar;
pub use value::{ReturnKind, ReturnValue};
