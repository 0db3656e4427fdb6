//! Main execution loop and instruction dispatch.

use regvm_common::{
    ArithOperands, CallTarget, CmpOperands, Condition, DataType, Instruction, JumpTarget,
    PopOperand, PushOperand, MAX_REGS,
};

use crate::error::RuntimeError;
use crate::machine::{Machine, Outcome, Status, Step};
use crate::sink::{DebugEvent, DebugSink};
use crate::stack::StackFault;

/// Width of a `push`/`pop` data word.
const DATA_WORD: usize = 4;

impl<'img, S: DebugSink> Machine<'img, S> {
    /// Run until `exit`, a return to the host, end of image or a fault.
    pub fn run(&mut self) -> Result<Outcome, RuntimeError> {
        loop {
            if let Step::Finished(outcome) = self.step()? {
                return Ok(outcome);
            }
        }
    }

    /// Decode and execute one instruction.
    ///
    /// A fault is terminal: every later step reports the same error until
    /// [`Machine::reset`].
    pub fn step(&mut self) -> Result<Step, RuntimeError> {
        if let Some(error) = &self.faulted {
            return Err(error.clone());
        }
        if let Some(outcome) = &self.finished {
            return Ok(Step::Finished(outcome.clone()));
        }
        match self.step_inner() {
            Ok(step) => Ok(step),
            Err(error) => {
                self.sink.event(&DebugEvent::Fault {
                    error: error.clone(),
                });
                self.faulted = Some(error.clone());
                Err(error)
            }
        }
    }

    fn step_inner(&mut self) -> Result<Step, RuntimeError> {
        let at = self.frame.position();
        if let Some(limit) = self.config.step_limit {
            if self.steps >= limit {
                return Err(RuntimeError::StepLimitExceeded { at, limit });
            }
        }
        if self.frame.is_eof() {
            return Ok(self.finish(Status::EndOfStream));
        }
        if self.frame.is_overflow() {
            return Err(RuntimeError::CursorOverflow { at });
        }
        if self.frame.is_underflow() {
            return Err(RuntimeError::CursorUnderflow { at });
        }

        self.frame.begin();
        let instr = match Instruction::decode_from(&mut self.frame, self.config.profile) {
            Ok(instr) => instr,
            Err(error) if self.config.lenient_decode => {
                self.sink.event(&DebugEvent::Recovered { at, error });
                return Ok(Step::Continue);
            }
            Err(source) => return Err(RuntimeError::Decode { at, source }),
        };

        self.steps += 1;
        if self.sink.enabled() {
            self.sink.event(&DebugEvent::Executed {
                at,
                instruction: instr,
            });
        }
        self.execute(at, instr)
    }

    fn execute(&mut self, at: u64, instr: Instruction) -> Result<Step, RuntimeError> {
        match instr {
            Instruction::Push(operand) => self.exec_push(at, operand)?,
            Instruction::Pop(operand) => self.exec_pop(at, operand)?,
            Instruction::PushAll => self.exec_push_all(at)?,
            Instruction::PopAll => self.exec_pop_all(at)?,
            Instruction::AddSp(size) => self
                .stack
                .reserve(size as usize)
                .map_err(|fault| fault.at(at))?,
            Instruction::SubSp(size) => self
                .stack
                .release(size as usize)
                .map_err(|fault| fault.at(at))?,
            Instruction::Load { reg, imm } => self.frame.registers_mut().set(reg, imm),
            Instruction::Move { dst, src } => {
                self.frame.registers_mut().move_reg(dst, src);
            }
            Instruction::Inc(reg) => {
                self.frame.registers_mut().inc(reg);
            }
            Instruction::Dec(reg) => {
                self.frame.registers_mut().dec(reg);
            }
            Instruction::Add(ops) => self.exec_arith(ops, u64::wrapping_add),
            Instruction::Sub(ops) => self.exec_arith(ops, u64::wrapping_sub),
            Instruction::Mul(ops) => self.exec_arith(ops, u64::wrapping_mul),
            Instruction::Cmp {
                data_type,
                operands,
                condition,
                target,
            } => {
                let base = at + instr.branch_base(self.config.profile) as u64;
                self.exec_cmp(data_type, operands, condition, base, target)?
            }
            Instruction::Jmp(target) => self.exec_jmp(at, target)?,
            Instruction::Call(target) => self.exec_call(at, target)?,
            Instruction::Ret => {
                if self.frame.depth() == 0 {
                    return Ok(self.finish(Status::Returned));
                }
                self.frame.call_return(&mut self.stack)?;
            }
            Instruction::RetN(size) => return self.exec_ret_n(at, size as usize),
            Instruction::RetNSm(size) => return self.exec_ret_n(at, size as usize),
            Instruction::Exit => return Ok(self.finish(Status::Exited)),
            // Decode already consumed the padding.
            Instruction::Nop | Instruction::NopN(_) => {}
        }
        Ok(Step::Continue)
    }

    fn finish(&mut self, status: Status) -> Step {
        let outcome = Outcome {
            status,
            value: self.return_value(),
            position: self.frame.position(),
            steps: self.steps,
        };
        self.sink.event(&DebugEvent::Finished {
            outcome: outcome.clone(),
        });
        self.finished = Some(outcome.clone());
        Step::Finished(outcome)
    }

    // ---- Stack ----

    fn exec_push(&mut self, at: u64, operand: PushOperand) -> Result<(), RuntimeError> {
        let pushed = match operand {
            PushOperand::Reg(reg) => self
                .stack
                .push_reg(self.frame.registers(), reg)
                .map(|_| ()),
            PushOperand::Data(word) => self.stack.push(word),
            PushOperand::Typed(data_type, value) => {
                let size = self.data_size(data_type);
                self.stack.push_sized(value, size)
            }
        };
        pushed.map_err(|fault| fault.at(at))
    }

    fn exec_pop(&mut self, at: u64, operand: PopOperand) -> Result<(), RuntimeError> {
        let popped = match operand {
            PopOperand::Reg(reg) => self
                .stack
                .pop_reg(self.frame.registers_mut(), reg)
                .map(|_| ()),
            PopOperand::Data => self.stack.pop_sized(DATA_WORD).map(|_| ()),
            PopOperand::Typed(data_type) => {
                let size = self.data_size(data_type);
                self.stack.pop_sized(size).map(|_| ())
            }
        };
        popped.map_err(|fault| fault.at(at))
    }

    /// Push every slot as a 64-bit word, slot 0 first.
    fn exec_push_all(&mut self, at: u64) -> Result<(), RuntimeError> {
        let needed = MAX_REGS * 8;
        if self.stack.remaining() < needed {
            return Err(StackFault::Overflow {
                needed,
                available: self.stack.remaining(),
            }
            .at(at));
        }
        for index in 0..MAX_REGS {
            let value = self.frame.registers().slot(index);
            self.stack.push(value).map_err(|fault| fault.at(at))?;
        }
        Ok(())
    }

    /// Restore what `push_all` saved, last slot first.
    fn exec_pop_all(&mut self, at: u64) -> Result<(), RuntimeError> {
        let needed = MAX_REGS * 8;
        if self.stack.size() < needed {
            return Err(StackFault::Underflow {
                needed,
                available: self.stack.size(),
            }
            .at(at));
        }
        for index in (0..MAX_REGS).rev() {
            let value = self.stack.pop::<u64>().map_err(|fault| fault.at(at))?;
            self.frame.registers_mut().set_slot(index, value);
        }
        Ok(())
    }

    fn data_size(&self, data_type: DataType) -> usize {
        data_type.size(self.config.profile)
    }

    // ---- Arithmetic ----

    fn exec_arith(&mut self, ops: ArithOperands, op: fn(u64, u64) -> u64) {
        let regs = self.frame.registers_mut();
        match ops {
            ArithOperands::RegReg(dst, src) => {
                let rhs = regs.get(src);
                regs.apply(dst, rhs, op);
            }
            ArithOperands::RegImm(dst, imm) => {
                regs.apply(dst, imm, op);
            }
        }
    }

    // ---- Control flow ----

    fn exec_cmp(
        &mut self,
        data_type: DataType,
        operands: CmpOperands,
        condition: Condition,
        base: u64,
        target: JumpTarget,
    ) -> Result<(), RuntimeError> {
        let taken = match operands {
            CmpOperands::RegReg(a, b) => self.frame.cond_cmp_rr(data_type, condition, a, b),
            CmpOperands::RegImm(reg, imm) => self.frame.cond_cmp_ri(data_type, condition, reg, imm),
            CmpOperands::RegAddr(reg, addr) => {
                self.frame.cond_cmp_ra(data_type, condition, reg, addr)?
            }
            CmpOperands::AddrImm(addr, imm) => {
                self.frame.cond_cmp_ai(data_type, condition, addr, imm)?
            }
            CmpOperands::AddrAddr(a, b) => self.frame.cond_cmp_aa(data_type, condition, a, b)?,
        };
        if taken {
            self.frame.branch(base, target)?;
        }
        Ok(())
    }

    fn exec_jmp(&mut self, at: u64, target: JumpTarget) -> Result<(), RuntimeError> {
        self.frame.branch(at, target)
    }

    /// The return site is the byte after the call's encoded target.
    fn exec_call(&mut self, at: u64, target: CallTarget) -> Result<(), RuntimeError> {
        let return_offset = self.frame.position() - at;
        self.frame.call(&mut self.stack, at, return_offset, target)
    }

    /// Callee-cleanup return. With no live call the arguments the host
    /// pushed are released before control goes back to it.
    fn exec_ret_n(&mut self, at: u64, size: usize) -> Result<Step, RuntimeError> {
        if self.frame.depth() == 0 {
            self.stack.release(size).map_err(|fault| fault.at(at))?;
            return Ok(self.finish(Status::Returned));
        }
        self.frame.call_return_n(&mut self.stack, size)?;
        Ok(Step::Continue)
    }

}
