//! Execution cursor: a position inside a borrowed image plus the register
//! file and call bookkeeping of one thread of execution.
//!
//! Positions are virtual addresses. The cursor is valid while
//! `start <= position < limit`; `position == limit` is end of stream.

use regvm_common::{
    ByteSource, CallTarget, Combo, Condition, DataType, DecodeError, JumpTarget, RegClass, RegId,
    Scalar, TargetProfile,
};

use crate::config::{CallConvention, VmConfig};
use crate::error::RuntimeError;
use crate::image::JUMP_ALIGNMENT;
use crate::ledger::CallLedger;
use crate::registers::{RegisterFile, RegisterFill};
use crate::stack::Stack;

pub struct Frame<'img> {
    code: &'img mut [u8],
    start: u64,
    limit: u64,
    position: u64,
    /// Address of the instruction being executed.
    current: u64,
    registers: RegisterFile,
    ledger: CallLedger,
    /// Calls not yet returned from.
    depth: usize,
    convention: CallConvention,
    profile: TargetProfile,
    register_fill: RegisterFill,
    strict_jump_alignment: bool,
}

impl<'img> Frame<'img> {
    /// An unbound frame. Call [`Frame::setting`] before executing.
    pub fn new(config: &VmConfig) -> Self {
        Self {
            code: &mut [],
            start: 0,
            limit: 0,
            position: 0,
            current: 0,
            registers: RegisterFile::new(config.register_fill),
            ledger: CallLedger::new(),
            depth: 0,
            convention: config.call_convention,
            profile: config.profile,
            register_fill: config.register_fill,
            strict_jump_alignment: config.strict_jump_alignment,
        }
    }

    /// Bind the frame to `code` mapped at `base`, positioned at `entry`.
    pub fn setting(&mut self, code: &'img mut [u8], base: u64, entry: u64) {
        self.start = base;
        self.limit = base + code.len() as u64;
        self.code = code;
        self.position = entry;
        self.current = entry;
    }

    /// Unbind from the image and reset registers and call bookkeeping.
    pub fn clear(&mut self) {
        self.code = &mut [];
        self.start = 0;
        self.limit = 0;
        self.position = 0;
        self.current = 0;
        self.reset_state();
    }

    /// Refill registers and forget all live calls. The binding is kept.
    pub fn reset_state(&mut self) {
        self.registers.fill(self.register_fill);
        self.ledger.destroy();
        self.depth = 0;
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = position;
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_eof(&self) -> bool {
        self.position == self.limit
    }

    pub fn is_overflow(&self) -> bool {
        self.position >= self.limit
    }

    pub fn is_underflow(&self) -> bool {
        self.position < self.start
    }

    /// Mark the start of the next instruction.
    pub fn begin(&mut self) -> u64 {
        self.current = self.position;
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn profile(&self) -> TargetProfile {
        self.profile
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    pub fn ledger(&self) -> &CallLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut CallLedger {
        &mut self.ledger
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn convention(&self) -> CallConvention {
        self.convention
    }

    /// Buffer offset of `n` bytes at `addr`, bounds-checked.
    fn offset_of(&self, addr: u64, n: usize) -> Result<usize, RuntimeError> {
        if addr < self.start {
            return Err(RuntimeError::CursorUnderflow { at: addr });
        }
        match addr.checked_add(n as u64) {
            Some(end) if end <= self.limit => Ok((addr - self.start) as usize),
            _ => Err(RuntimeError::CursorOverflow { at: addr }),
        }
    }

    // ---- Typed access ----

    pub fn peek<T: Scalar>(&self) -> Result<T, RuntimeError> {
        let off = self.offset_of(self.position, T::SIZE)?;
        T::read_le(&self.code[off..]).ok_or(RuntimeError::CursorOverflow { at: self.position })
    }

    pub fn store<T: Scalar>(&mut self, value: T) -> Result<(), RuntimeError> {
        let off = self.offset_of(self.position, T::SIZE)?;
        value
            .write_le(&mut self.code[off..])
            .ok_or(RuntimeError::CursorOverflow { at: self.position })
    }

    /// Read a `T` and move past it.
    pub fn advance<T: Scalar>(&mut self) -> Result<T, RuntimeError> {
        let value = self.peek::<T>()?;
        self.position += T::SIZE as u64;
        Ok(value)
    }

    fn peek_sized(&self, size: usize) -> Result<u64, RuntimeError> {
        let off = self.offset_of(self.position, size)?;
        let mut word = [0u8; 8];
        word[..size].copy_from_slice(&self.code[off..off + size]);
        Ok(u64::from_le_bytes(word))
    }

    /// Read a value of `data_type`, widened by its signedness.
    pub fn get_value(&self, data_type: DataType) -> Result<u64, RuntimeError> {
        let raw = self.peek_sized(data_type.size(self.profile))?;
        Ok(data_type.widen(raw, self.profile))
    }

    /// Store the low bytes of `value` that fit `data_type`.
    pub fn set_value(&mut self, data_type: DataType, value: u64) -> Result<(), RuntimeError> {
        let size = data_type.size(self.profile);
        let off = self.offset_of(self.position, size)?;
        self.code[off..off + size].copy_from_slice(&value.to_le_bytes()[..size]);
        Ok(())
    }

    pub fn next_value(&mut self, data_type: DataType) -> Result<u64, RuntimeError> {
        let value = self.get_value(data_type)?;
        self.position += data_type.size(self.profile) as u64;
        Ok(value)
    }

    /// Read a zero-extended value of a register class's width and move past it.
    pub fn next_value_by_reg(&mut self, class: RegClass) -> Result<u64, RuntimeError> {
        let value = self.peek_sized(class.size())?;
        self.position += class.size() as u64;
        Ok(value)
    }

    // ---- Calls ----

    fn enter(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        target: Option<u64>,
    ) -> Result<(), RuntimeError> {
        let at = self.current;
        let target = target.ok_or(RuntimeError::TargetOutOfRange { at })?;
        let return_site = call_site
            .checked_add(return_offset)
            .ok_or(RuntimeError::TargetOutOfRange { at })?;
        if target % JUMP_ALIGNMENT != 0 {
            return Err(RuntimeError::Misaligned { at, target });
        }
        match self.convention {
            CallConvention::Stack => stack
                .push_callstack(return_site)
                .map_err(|fault| fault.at(at))?,
            CallConvention::Ledger => self.ledger.push(call_site, return_site),
        }
        self.depth += 1;
        self.position = target;
        Ok(())
    }

    /// Call `call_site + offset`. The return site is `call_site + return_offset`.
    pub fn call_short(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        offset: i16,
    ) -> Result<(), RuntimeError> {
        self.call(stack, call_site, return_offset, CallTarget::Short(offset))
    }

    pub fn call_long(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        offset: i32,
    ) -> Result<(), RuntimeError> {
        self.call(stack, call_site, return_offset, CallTarget::Long(offset))
    }

    pub fn call_ptr32(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        address: u32,
    ) -> Result<(), RuntimeError> {
        self.call(stack, call_site, return_offset, CallTarget::Ptr32(address))
    }

    pub fn call_ptr64(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        address: u64,
    ) -> Result<(), RuntimeError> {
        self.call(stack, call_site, return_offset, CallTarget::Ptr64(address))
    }

    pub fn call(
        &mut self,
        stack: &mut Stack,
        call_site: u64,
        return_offset: u64,
        target: CallTarget,
    ) -> Result<(), RuntimeError> {
        self.enter(stack, call_site, return_offset, target.resolve(call_site))
    }

    /// Resume at the most recent return site.
    pub fn call_return(&mut self, stack: &mut Stack) -> Result<u64, RuntimeError> {
        let at = self.current;
        let return_site = match self.convention {
            CallConvention::Stack => stack
                .pop_callstack()
                .map_err(|_| RuntimeError::EmptyCallStack { at })?,
            CallConvention::Ledger => self
                .ledger
                .pop()
                .ok_or(RuntimeError::EmptyCallStack { at })?,
        };
        self.depth = self.depth.saturating_sub(1);
        self.position = return_site;
        Ok(return_site)
    }

    /// Return and release `size` argument bytes the caller pushed before
    /// the call. Nothing changes if either the return address or the
    /// arguments are missing.
    pub fn call_return_n(&mut self, stack: &mut Stack, size: usize) -> Result<u64, RuntimeError> {
        let at = self.current;
        let slot = match self.convention {
            CallConvention::Stack => stack.pointer_width(),
            CallConvention::Ledger => 0,
        };
        let has_return = match self.convention {
            CallConvention::Stack => stack.size() >= slot,
            CallConvention::Ledger => !self.ledger.is_empty(),
        };
        if !has_return {
            return Err(RuntimeError::EmptyCallStack { at });
        }
        let available = stack.size() - slot;
        if available < size {
            return Err(RuntimeError::StackUnderflow {
                at,
                needed: size,
                available,
            });
        }
        let return_site = self.call_return(stack)?;
        stack.release(size).map_err(|fault| fault.at(at))?;
        Ok(return_site)
    }

    // ---- Jumps ----

    fn jump_to(&mut self, target: Option<u64>) -> Result<(), RuntimeError> {
        let at = self.current;
        let target = target.ok_or(RuntimeError::TargetOutOfRange { at })?;
        if self.strict_jump_alignment && target % JUMP_ALIGNMENT != 0 {
            return Err(RuntimeError::Misaligned { at, target });
        }
        self.position = target;
        Ok(())
    }

    pub fn jump_near(&mut self, base: u64, offset: i8) -> Result<(), RuntimeError> {
        self.branch(base, JumpTarget::Near(offset))
    }

    pub fn jump_short(&mut self, base: u64, offset: i16) -> Result<(), RuntimeError> {
        self.branch(base, JumpTarget::Short(offset))
    }

    pub fn jump_long(&mut self, base: u64, offset: i32) -> Result<(), RuntimeError> {
        self.branch(base, JumpTarget::Long(offset))
    }

    pub fn jump_ptr32(&mut self, address: u32) -> Result<(), RuntimeError> {
        self.branch(self.current, JumpTarget::Ptr32(address))
    }

    pub fn jump_ptr64(&mut self, address: u64) -> Result<(), RuntimeError> {
        self.branch(self.current, JumpTarget::Ptr64(address))
    }

    /// Jump to `target`, relative forms measured from `base`.
    pub fn branch(&mut self, base: u64, target: JumpTarget) -> Result<(), RuntimeError> {
        self.jump_to(target.resolve(base))
    }

    // ---- Conditions ----
    //
    // Register operands are read from the low bytes of the whole slot at
    // the compare's data-type width; the register's own class only names
    // the slot.

    pub fn cond_cmp_rr(&self, data_type: DataType, cond: Condition, a: RegId, b: RegId) -> bool {
        let va = self.registers.slot(a.index());
        let vb = self.registers.slot(b.index());
        cond.evaluate(data_type, self.profile, va, vb)
    }

    pub fn cond_cmp_ri(&self, data_type: DataType, cond: Condition, reg: RegId, imm: u64) -> bool {
        let va = self.registers.slot(reg.index());
        cond.evaluate(data_type, self.profile, va, imm)
    }

    pub fn cond_cmp_ra(
        &self,
        _data_type: DataType,
        _cond: Condition,
        _reg: RegId,
        _addr: u64,
    ) -> Result<bool, RuntimeError> {
        Err(self.unsupported(Combo::RegAddr))
    }

    pub fn cond_cmp_ai(
        &self,
        _data_type: DataType,
        _cond: Condition,
        _addr: u64,
        _imm: u64,
    ) -> Result<bool, RuntimeError> {
        Err(self.unsupported(Combo::AddrImm))
    }

    pub fn cond_cmp_aa(
        &self,
        _data_type: DataType,
        _cond: Condition,
        _a: u64,
        _b: u64,
    ) -> Result<bool, RuntimeError> {
        Err(self.unsupported(Combo::AddrAddr))
    }

    fn unsupported(&self, combo: Combo) -> RuntimeError {
        RuntimeError::UnsupportedOperands {
            at: self.current,
            combo,
        }
    }
}

impl ByteSource for Frame<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], DecodeError> {
        if self.position < self.start {
            return Err(DecodeError::Truncated {
                needed: n,
                available: 0,
            });
        }
        let available = self.limit.saturating_sub(self.position) as usize;
        if n > available {
            return Err(DecodeError::Truncated { needed: n, available });
        }
        let off = (self.position - self.start) as usize;
        self.position += n as u64;
        Ok(&self.code[off..off + n])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::StackGrowth;

    fn frame_over<'a>(code: &'a mut [u8], config: &VmConfig) -> Frame<'a> {
        let mut frame = Frame::new(config);
        frame.setting(code, 0x100, 0x100);
        frame
    }

    fn stack_for(config: &VmConfig) -> Stack {
        Stack::create(256, config.stack_growth, config.profile)
    }

    #[test]
    fn bounds_predicates() {
        let config = VmConfig::default();
        let mut code = [0u8; 4];
        let mut frame = frame_over(&mut code, &config);
        assert!(!frame.is_eof());
        frame.set_position(0x104);
        assert!(frame.is_eof() && frame.is_overflow());
        frame.set_position(0xFF);
        assert!(frame.is_underflow());
    }

    #[test]
    fn typed_fetch_and_store() {
        let config = VmConfig::default();
        let mut code = [0x78, 0x56, 0x34, 0x12, 0xFF, 0x00];
        let mut frame = frame_over(&mut code, &config);
        assert_eq!(frame.peek::<u16>(), Ok(0x5678));
        assert_eq!(frame.advance::<u32>(), Ok(0x1234_5678));
        assert_eq!(frame.position(), 0x104);
        assert_eq!(frame.get_value(DataType::Int8), Ok(u64::MAX));
        assert_eq!(frame.next_value(DataType::UInt8), Ok(0xFF));
        assert_eq!(
            frame.next_value(DataType::UInt16),
            Err(RuntimeError::CursorOverflow { at: 0x105 })
        );
        frame.store(0xABu8).unwrap();
        assert_eq!(frame.peek::<u8>(), Ok(0xAB));
    }

    #[test]
    fn register_class_width_advance() {
        let config = VmConfig::default();
        let mut code = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut frame = frame_over(&mut code, &config);
        assert_eq!(frame.next_value_by_reg(RegClass::R8High), Ok(1));
        assert_eq!(frame.next_value_by_reg(RegClass::R64), Ok(0x0908_0706_0504_0302));
        assert!(frame.is_eof());
    }

    #[test]
    fn set_value_writes_data_width() {
        let config = VmConfig::default();
        let mut code = [0u8; 8];
        {
            let mut frame = frame_over(&mut code, &config);
            frame.set_value(DataType::UInt16, 0xAABB_CCDD).unwrap();
        }
        assert_eq!(code, [0xDD, 0xCC, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn nested_calls_return_in_order_under_both_conventions() {
        for convention in [CallConvention::Stack, CallConvention::Ledger] {
            let config = VmConfig::default().with_call_convention(convention);
            let mut code = [0u8; 0x100];
            let mut frame = frame_over(&mut code, &config);
            let mut stack = stack_for(&config);

            frame.call_short(&mut stack, 0x104, 4, 0x1C).unwrap();
            assert_eq!(frame.position(), 0x120);
            frame.call_long(&mut stack, 0x128, 6, 0x18).unwrap();
            assert_eq!(frame.position(), 0x140);
            frame.call_ptr32(&mut stack, 0x148, 6, 0x160).unwrap();
            frame.call_ptr64(&mut stack, 0x164, 10, 0x180).unwrap();
            assert_eq!(frame.depth(), 4);

            assert_eq!(frame.call_return(&mut stack), Ok(0x16E));
            assert_eq!(frame.call_return(&mut stack), Ok(0x14E));
            assert_eq!(frame.call_return(&mut stack), Ok(0x12E));
            assert_eq!(frame.call_return(&mut stack), Ok(0x108));
            assert_eq!(frame.depth(), 0);
            assert!(stack.is_empty());
            assert!(frame.ledger().is_empty());
            assert_eq!(
                frame.call_return(&mut stack),
                Err(RuntimeError::EmptyCallStack { at: 0x100 })
            );
        }
    }

    #[test]
    fn misaligned_call_leaves_state_unchanged() {
        let config = VmConfig::default();
        let mut code = [0u8; 0x40];
        let mut frame = frame_over(&mut code, &config);
        let mut stack = stack_for(&config);
        assert_eq!(
            frame.call_short(&mut stack, 0x100, 4, 0x11),
            Err(RuntimeError::Misaligned {
                at: 0x100,
                target: 0x111
            })
        );
        assert!(stack.is_empty());
        assert_eq!(frame.depth(), 0);
        assert_eq!(frame.position(), 0x100);
    }

    #[test]
    fn return_n_releases_arguments_under_both_conventions() {
        for convention in [CallConvention::Stack, CallConvention::Ledger] {
            for growth in [StackGrowth::Forward, StackGrowth::Backward] {
                let config = VmConfig::default()
                    .with_call_convention(convention)
                    .with_stack_growth(growth);
                let mut code = [0u8; 0x40];
                let mut frame = frame_over(&mut code, &config);
                let mut stack = stack_for(&config);

                stack.push(0xAAu32).unwrap();
                stack.push(7u32).unwrap();
                stack.push(9u32).unwrap();
                frame.call_short(&mut stack, 0x104, 4, 0x1C).unwrap();
                assert_eq!(frame.call_return_n(&mut stack, 8), Ok(0x108));
                assert_eq!(frame.depth(), 0);
                assert_eq!(frame.position(), 0x108);
                assert_eq!(stack.pop::<u32>(), Ok(0xAA));
                assert!(stack.is_empty());
            }
        }
    }

    #[test]
    fn return_n_without_arguments_leaves_state_unchanged() {
        for convention in [CallConvention::Stack, CallConvention::Ledger] {
            let config = VmConfig::default().with_call_convention(convention);
            let mut code = [0u8; 0x40];
            let mut frame = frame_over(&mut code, &config);
            let mut stack = stack_for(&config);

            assert_eq!(
                frame.call_return_n(&mut stack, 4),
                Err(RuntimeError::EmptyCallStack { at: 0x100 })
            );
            stack.push(1u16).unwrap();
            frame.call_short(&mut stack, 0x100, 4, 0x20).unwrap();
            let size = stack.size();
            assert_eq!(
                frame.call_return_n(&mut stack, 4),
                Err(RuntimeError::StackUnderflow {
                    at: 0x100,
                    needed: 4,
                    available: 2
                })
            );
            assert_eq!(stack.size(), size);
            assert_eq!(frame.depth(), 1);
            assert_eq!(frame.position(), 0x120);
        }
    }

    #[test]
    fn call_overflowing_the_stack_faults() {
        let config = VmConfig::default();
        let mut code = [0u8; 0x40];
        let mut frame = frame_over(&mut code, &config);
        let mut stack = Stack::create(4, StackGrowth::Forward, config.profile);
        assert!(matches!(
            frame.call_short(&mut stack, 0x100, 4, 0x10),
            Err(RuntimeError::StackOverflow { .. })
        ));
    }

    #[test]
    fn jumps_check_alignment_when_strict() {
        let strict = VmConfig::default();
        let mut code = [0u8; 0x40];
        let mut frame = frame_over(&mut code, &strict);
        frame.jump_near(0x100, 0x10).unwrap();
        assert_eq!(frame.position(), 0x110);

        let misaligned: [(fn(&mut Frame<'_>) -> Result<(), RuntimeError>, u64); 5] = [
            (|f| f.jump_near(0x100, 3), 0x103),
            (|f| f.jump_short(0x100, 0x13), 0x113),
            (|f| f.jump_long(0x100, 0x21), 0x121),
            (|f| f.jump_ptr32(0x108), 0x108),
            (|f| f.jump_ptr64(0x131), 0x131),
        ];
        for (jump, target) in misaligned {
            assert_eq!(
                jump(&mut frame),
                Err(RuntimeError::Misaligned { at: 0x100, target })
            );
            assert_eq!(frame.position(), 0x110);
        }

        let lax = VmConfig::default().with_strict_jump_alignment(false);
        let mut code = [0u8; 0x40];
        let mut frame = frame_over(&mut code, &lax);
        frame.jump_long(0x100, 3).unwrap();
        assert_eq!(frame.position(), 0x103);
        frame.jump_ptr32(0x107).unwrap();
        assert_eq!(frame.position(), 0x107);
    }

    #[test]
    fn relative_target_below_zero_is_out_of_range() {
        let config = VmConfig::default();
        let mut code = [0u8; 4];
        let mut frame = Frame::new(&config);
        frame.setting(&mut code, 0, 0);
        assert_eq!(
            frame.jump_near(0, -16),
            Err(RuntimeError::TargetOutOfRange { at: 0 })
        );
    }

    #[test]
    fn compares_read_slot_at_data_width() {
        let config = VmConfig::default();
        let mut code = [0u8; 1];
        let mut frame = frame_over(&mut code, &config);
        frame.registers_mut().set(RegId::EAX, 0xFFFF_FFFF);
        frame.registers_mut().set(RegId::EBX, 1);
        assert!(frame.cond_cmp_rr(DataType::Int32, Condition::Jl, RegId::EAX, RegId::EBX));
        assert!(!frame.cond_cmp_rr(DataType::UInt32, Condition::Jl, RegId::EAX, RegId::EBX));
        assert!(frame.cond_cmp_ri(DataType::UInt8, Condition::Je, RegId::EAX, 0xFF));
        assert!(!frame.cond_cmp_ri(DataType::UInt8, Condition::Jz, RegId::ECX, 0x01));
        assert!(frame.cond_cmp_ri(DataType::UInt8, Condition::Jz, RegId::ECX, 0x00));
    }

    #[test]
    fn memory_compares_are_unsupported() {
        let config = VmConfig::default();
        let mut code = [0u8; 1];
        let frame = frame_over(&mut code, &config);
        assert_eq!(
            frame.cond_cmp_ra(DataType::UInt8, Condition::Je, RegId::EAX, 0x100),
            Err(RuntimeError::UnsupportedOperands {
                at: 0x100,
                combo: Combo::RegAddr
            })
        );
        assert!(frame
            .cond_cmp_ai(DataType::UInt8, Condition::Je, 0x100, 0)
            .is_err());
        assert!(frame
            .cond_cmp_aa(DataType::UInt8, Condition::Je, 0x100, 0x101)
            .is_err());
    }

    #[test]
    fn decode_through_the_frame() {
        let config = VmConfig::default();
        let mut code = [0x10, RegId::EEX.to_byte(), 5, 0, 0, 0, 0xFE];
        let mut frame = frame_over(&mut code, &config);
        let instr = regvm_common::Instruction::decode_from(&mut frame, config.profile).unwrap();
        assert_eq!(
            instr,
            regvm_common::Instruction::Load {
                reg: RegId::EEX,
                imm: 5
            }
        );
        assert_eq!(frame.position(), 0x106);
    }

    #[test]
    fn clear_unbinds_and_refills() {
        let config = VmConfig::default().with_register_fill(RegisterFill::Sentinel);
        let mut code = [0u8; 16];
        let mut frame = frame_over(&mut code, &config);
        frame.registers_mut().set(RegId::RAX, 0);
        frame.ledger_mut().push(0, 4);
        frame.clear();
        assert_eq!(frame.limit(), 0);
        assert!(frame.is_eof());
        assert!(frame.ledger().is_empty());
        assert_eq!(frame.registers().get(RegId::EAX), 0x2072_6178);
    }
}
