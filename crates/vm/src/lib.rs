//! regvm virtual machine: executes encoded register-machine images.
//!
//! The machine has:
//! - 32 general registers with 8, 16, 32 and 64-bit views
//! - A fixed-capacity operand stack that grows forward or backward
//! - Return addresses kept on that stack or in a separate call ledger
//! - A pluggable [`DebugSink`] for traces and diagnostics
//!
//! # Usage
//!
//! ```
//! use regvm_common::{Instruction, RegId};
//! use regvm_vm::{run, BinaryImage, Status, VmConfig};
//!
//! let mut bytes = Vec::new();
//! let profile = regvm_common::TargetProfile::Bits64;
//! Instruction::Load { reg: RegId::EAX, imm: 42 }.encode_into(&mut bytes, profile);
//! Instruction::Exit.encode_into(&mut bytes, profile);
//!
//! let mut image = BinaryImage::from_bytes(bytes);
//! let outcome = run(&mut image, VmConfig::default()).unwrap();
//! assert_eq!(outcome.status, Status::Exited);
//! assert_eq!(outcome.value.value(), 42);
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod frame;
pub mod image;
pub mod ledger;
pub mod machine;
pub mod registers;
pub mod sink;
pub mod stack;

pub use config::{CallConvention, VmConfig, DEFAULT_STACK_CAPACITY};
pub use error::RuntimeError;
pub use frame::Frame;
pub use image::{BinaryImage, IMAGE_ALIGNMENT, JUMP_ALIGNMENT};
pub use ledger::{CallLedger, DebugInfo, LedgerEntry};
pub use machine::{Machine, Outcome, Status, Step, ThreadId};
pub use registers::{RegisterFile, RegisterFill};
pub use sink::{DebugEvent, DebugSink, NullSink, RecordingSink, TracingSink};
pub use stack::{Stack, StackFault, StackGrowth};

/// Execute `image` from its entry point and return how the run ended.
///
/// # Errors
///
/// Returns [`RuntimeError`] if the configuration is invalid or execution
/// faults (decode error, stack bounds, misaligned call, ...).
pub fn run(image: &mut BinaryImage, config: VmConfig) -> Result<Outcome, RuntimeError> {
    let mut machine = Machine::new(image, config)?;
    machine.run()
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use regvm_common::{RegClass, RegId, TargetProfile};

    fn arb_growth() -> impl Strategy<Value = StackGrowth> {
        prop_oneof![Just(StackGrowth::Forward), Just(StackGrowth::Backward)]
    }

    fn arb_class() -> impl Strategy<Value = RegClass> {
        prop_oneof![
            Just(RegClass::R8),
            Just(RegClass::R8High),
            Just(RegClass::R16),
            Just(RegClass::R32),
            Just(RegClass::R64),
        ]
    }

    proptest! {
        /// A push followed by a pop of the same type returns the value and
        /// restores the stack pointer.
        #[test]
        fn stack_roundtrip(
            a in any::<i32>(),
            b in any::<u32>(),
            c in any::<i64>(),
            d in any::<u64>(),
            growth in arb_growth(),
        ) {
            let mut stack = Stack::create(64, growth, TargetProfile::Bits64);
            let sp = stack.sp();
            stack.push(a).unwrap();
            stack.push(b).unwrap();
            stack.push(c).unwrap();
            stack.push(d).unwrap();
            prop_assert_eq!(stack.size(), 24);
            prop_assert_eq!(stack.pop::<u64>().unwrap(), d);
            prop_assert_eq!(stack.pop::<i64>().unwrap(), c);
            prop_assert_eq!(stack.pop::<u32>().unwrap(), b);
            prop_assert_eq!(stack.pop::<i32>().unwrap(), a);
            prop_assert_eq!(stack.sp(), sp);
        }

        /// Writing one register view reads back masked and leaves every
        /// other slot alone.
        #[test]
        fn register_view_isolation(
            class in arb_class(),
            index in 0u8..32,
            value in any::<u64>(),
            other in any::<u64>(),
        ) {
            let mut regs = RegisterFile::default();
            for slot in 0..32 {
                regs.set_slot(slot, other);
            }
            let reg = RegId::new(class, index);
            regs.set(reg, value);
            prop_assert_eq!(regs.get(reg), value & class.mask());
            for slot in (0..32).filter(|&s| s != index as usize) {
                prop_assert_eq!(regs.slot(slot), other);
            }
        }
    }
}
