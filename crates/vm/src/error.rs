//! Runtime errors for the regvm interpreter.
//!
//! Every fault names the cursor address (`at`) it was raised at. For
//! decode and branch faults that is the address of the instruction's
//! opcode byte; for cursor faults it is where the read was attempted.

use regvm_common::{Combo, DecodeError};
use thiserror::Error;

/// Errors that end a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The instruction at `at` did not decode.
    #[error("decode fault at {at:#x}: {source}")]
    Decode {
        at: u64,
        #[source]
        source: DecodeError,
    },

    /// The cursor reached or passed the end of the image.
    #[error("cursor overflow at {at:#x}")]
    CursorOverflow { at: u64 },

    /// The cursor moved below the start of the image.
    #[error("cursor underflow at {at:#x}")]
    CursorUnderflow { at: u64 },

    /// A push needed more room than the stack has left.
    #[error("stack overflow at {at:#x}: needed {needed} byte(s), {available} free")]
    StackOverflow {
        at: u64,
        needed: usize,
        available: usize,
    },

    /// A pop needed more bytes than the stack holds.
    #[error("stack underflow at {at:#x}: needed {needed} byte(s), {available} held")]
    StackUnderflow {
        at: u64,
        needed: usize,
        available: usize,
    },

    /// A call or jump target is not 16-byte aligned.
    #[error("misaligned target {target:#x} at {at:#x}")]
    Misaligned { at: u64, target: u64 },

    /// `ret` with no recorded call to return to.
    #[error("return with empty call stack at {at:#x}")]
    EmptyCallStack { at: u64 },

    /// Compare forms with memory operands are not executed.
    #[error("unsupported compare operands {combo:?} at {at:#x}")]
    UnsupportedOperands { at: u64, combo: Combo },

    /// A relative target leaves the 64-bit address space.
    #[error("branch target out of range at {at:#x}")]
    TargetOutOfRange { at: u64 },

    /// The configured step limit was reached.
    #[error("step limit {limit} exceeded at {at:#x}")]
    StepLimitExceeded { at: u64, limit: u64 },

    /// The image cannot be executed as given.
    #[error("invalid image at {at:#x}: {reason}")]
    InvalidImage { at: u64, reason: &'static str },

    /// The configuration is inconsistent with its own profile.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}

impl RuntimeError {
    /// The faulting address, if the error has one.
    pub fn at(&self) -> Option<u64> {
        match *self {
            RuntimeError::Decode { at, .. }
            | RuntimeError::CursorOverflow { at }
            | RuntimeError::CursorUnderflow { at }
            | RuntimeError::StackOverflow { at, .. }
            | RuntimeError::StackUnderflow { at, .. }
            | RuntimeError::Misaligned { at, .. }
            | RuntimeError::EmptyCallStack { at }
            | RuntimeError::UnsupportedOperands { at, .. }
            | RuntimeError::TargetOutOfRange { at }
            | RuntimeError::StepLimitExceeded { at, .. }
            | RuntimeError::InvalidImage { at, .. } => Some(at),
            RuntimeError::InvalidConfig { .. } => None,
        }
    }
}
