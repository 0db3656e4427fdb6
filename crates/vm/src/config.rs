//! Machine configuration.

use regvm_common::{RegClass, RegId, TargetProfile};

use crate::error::RuntimeError;
use crate::registers::RegisterFill;
use crate::stack::StackGrowth;

/// Default operand stack capacity: 64 KiB.
pub const DEFAULT_STACK_CAPACITY: usize = 64 * 1024;

/// Where `call` keeps return addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallConvention {
    /// Pointer-width slots on the operand stack.
    #[default]
    Stack,
    /// A separate [`crate::ledger::CallLedger`].
    Ledger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmConfig {
    pub profile: TargetProfile,
    pub call_convention: CallConvention,
    pub stack_growth: StackGrowth,
    pub stack_capacity: usize,
    pub register_fill: RegisterFill,
    /// Register read into the run's [`regvm_common::ReturnValue`].
    pub return_register: RegId,
    /// Check jump targets for 16-byte alignment, not only call targets.
    pub strict_jump_alignment: bool,
    /// Report decode faults to the sink and continue after the bytes
    /// consumed so far instead of stopping.
    pub lenient_decode: bool,
    /// Stop with [`RuntimeError::StepLimitExceeded`] after this many steps.
    pub step_limit: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            profile: TargetProfile::default(),
            call_convention: CallConvention::default(),
            stack_growth: StackGrowth::default(),
            stack_capacity: DEFAULT_STACK_CAPACITY,
            register_fill: RegisterFill::default(),
            return_register: RegId::EAX,
            strict_jump_alignment: true,
            lenient_decode: false,
            step_limit: None,
        }
    }
}

impl VmConfig {
    pub fn with_profile(mut self, profile: TargetProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_call_convention(mut self, call_convention: CallConvention) -> Self {
        self.call_convention = call_convention;
        self
    }

    pub fn with_stack_growth(mut self, stack_growth: StackGrowth) -> Self {
        self.stack_growth = stack_growth;
        self
    }

    pub fn with_stack_capacity(mut self, stack_capacity: usize) -> Self {
        self.stack_capacity = stack_capacity;
        self
    }

    pub fn with_register_fill(mut self, register_fill: RegisterFill) -> Self {
        self.register_fill = register_fill;
        self
    }

    pub fn with_return_register(mut self, return_register: RegId) -> Self {
        self.return_register = return_register;
        self
    }

    pub fn with_strict_jump_alignment(mut self, strict: bool) -> Self {
        self.strict_jump_alignment = strict;
        self
    }

    pub fn with_lenient_decode(mut self, lenient: bool) -> Self {
        self.lenient_decode = lenient;
        self
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = Some(step_limit);
        self
    }

    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.return_register.class() == RegClass::R64 && self.profile == TargetProfile::Bits32 {
            return Err(RuntimeError::InvalidConfig {
                reason: "64-bit return register on a 32-bit profile",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VmConfig::default();
        assert_eq!(config.profile, TargetProfile::Bits64);
        assert_eq!(config.call_convention, CallConvention::Stack);
        assert_eq!(config.stack_growth, StackGrowth::Forward);
        assert_eq!(config.stack_capacity, 64 * 1024);
        assert_eq!(config.return_register, RegId::EAX);
        assert!(config.strict_jump_alignment);
        assert!(!config.lenient_decode);
        assert_eq!(config.step_limit, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_methods() {
        let config = VmConfig::default()
            .with_call_convention(CallConvention::Ledger)
            .with_stack_growth(StackGrowth::Backward)
            .with_step_limit(100);
        assert_eq!(config.call_convention, CallConvention::Ledger);
        assert_eq!(config.stack_growth, StackGrowth::Backward);
        assert_eq!(config.step_limit, Some(100));
    }

    #[test]
    fn r64_return_register_needs_64_bit_profile() {
        let config = VmConfig::default()
            .with_profile(TargetProfile::Bits32)
            .with_return_register(RegId::RAX);
        assert!(matches!(
            config.validate(),
            Err(RuntimeError::InvalidConfig { .. })
        ));
    }
}
