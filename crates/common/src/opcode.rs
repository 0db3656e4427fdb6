//! Opcode definitions for the regvm instruction set.
//!
//! Opcodes are grouped by category. Gaps between groups are reserved and
//! rejected by the decoder.

use crate::condition::Condition;
use crate::error::DecodeError;

/// Identifies the operation to perform. The first byte of every instruction.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Stack
    /// Push a register, an immediate or a data word onto the operand stack.
    Push = 0x01,
    /// Pop into a register, or discard a value of a given width.
    Pop = 0x02,
    /// Push all 32 register slots as 64-bit values.
    PushAll = 0x03,
    /// Restore all 32 register slots saved by `PushAll`.
    PopAll = 0x04,
    /// Grow the stack by N bytes of locals without writing them.
    AddSp = 0x05,
    /// Shrink the stack by N bytes.
    SubSp = 0x06,

    // Data movement
    /// Load an immediate of the register's width into a register.
    Load = 0x10,
    /// Copy one register into another.
    Move = 0x11,

    // Arithmetic (wrapping)
    /// Increment a register.
    Inc = 0x20,
    /// Decrement a register.
    Dec = 0x21,
    /// Add register or immediate into a register.
    Add = 0x22,
    /// Subtract register or immediate from a register.
    Sub = 0x23,
    /// Multiply a register by a register or immediate.
    Mul = 0x24,

    // Compare-and-branch
    /// Compare two operands and branch on a condition code.
    Cmp = 0x30,

    // Jumps
    /// Unconditional jump.
    Jmp = 0x40,
    /// Branch if both operands are zero.
    Jz = 0x41,
    /// Branch if both operands are nonzero.
    Jnz = 0x42,
    /// Branch if equal.
    Je = 0x43,
    /// Branch if not equal.
    Jne = 0x44,
    /// Branch if less.
    Jl = 0x45,
    /// Branch if less or equal.
    Jle = 0x46,
    /// Branch if greater.
    Jg = 0x47,
    /// Branch if greater or equal.
    Jge = 0x48,

    // Calls
    /// Push a return address and transfer control.
    Call = 0x50,
    /// Pop the most recent return address and resume there.
    Ret = 0x51,
    /// Return, then release a 16-bit count of argument bytes.
    RetN = 0x52,
    /// `RetN` with an 8-bit count.
    RetNSm = 0x53,

    // VM control
    /// Skip the next N bytes.
    NopN = 0xFD,
    /// Stop execution. The return register holds the result.
    Exit = 0xFE,
    /// No operation. Also used as alignment padding.
    Nop = 0xFF,
}

/// All valid opcodes, in definition order.
pub const ALL_OPCODES: [Opcode; 30] = [
    Opcode::Push,
    Opcode::Pop,
    Opcode::PushAll,
    Opcode::PopAll,
    Opcode::AddSp,
    Opcode::SubSp,
    Opcode::Load,
    Opcode::Move,
    Opcode::Inc,
    Opcode::Dec,
    Opcode::Add,
    Opcode::Sub,
    Opcode::Mul,
    Opcode::Cmp,
    Opcode::Jmp,
    Opcode::Jz,
    Opcode::Jnz,
    Opcode::Je,
    Opcode::Jne,
    Opcode::Jl,
    Opcode::Jle,
    Opcode::Jg,
    Opcode::Jge,
    Opcode::Call,
    Opcode::Ret,
    Opcode::RetN,
    Opcode::RetNSm,
    Opcode::NopN,
    Opcode::Exit,
    Opcode::Nop,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Err(DecodeError::IllegalOpcode),

            0x01 => Ok(Opcode::Push),
            0x02 => Ok(Opcode::Pop),
            0x03 => Ok(Opcode::PushAll),
            0x04 => Ok(Opcode::PopAll),
            0x05 => Ok(Opcode::AddSp),
            0x06 => Ok(Opcode::SubSp),

            0x10 => Ok(Opcode::Load),
            0x11 => Ok(Opcode::Move),

            0x20 => Ok(Opcode::Inc),
            0x21 => Ok(Opcode::Dec),
            0x22 => Ok(Opcode::Add),
            0x23 => Ok(Opcode::Sub),
            0x24 => Ok(Opcode::Mul),

            0x30 => Ok(Opcode::Cmp),

            0x40 => Ok(Opcode::Jmp),
            0x41 => Ok(Opcode::Jz),
            0x42 => Ok(Opcode::Jnz),
            0x43 => Ok(Opcode::Je),
            0x44 => Ok(Opcode::Jne),
            0x45 => Ok(Opcode::Jl),
            0x46 => Ok(Opcode::Jle),
            0x47 => Ok(Opcode::Jg),
            0x48 => Ok(Opcode::Jge),

            0x50 => Ok(Opcode::Call),
            0x51 => Ok(Opcode::Ret),
            0x52 => Ok(Opcode::RetN),
            0x53 => Ok(Opcode::RetNSm),

            0xFD => Ok(Opcode::NopN),
            0xFE => Ok(Opcode::Exit),
            0xFF => Ok(Opcode::Nop),

            // 0x07..=0x0F, 0x12..=0x1F, 0x25..=0x2F, 0x31..=0x3F,
            // 0x49..=0x4F, 0x54..=0xFC.
            _ => Err(DecodeError::ReservedOpcode(value)),
        }
    }
}

impl Opcode {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::PushAll => "push_all",
            Opcode::PopAll => "pop_all",
            Opcode::AddSp => "add_sp",
            Opcode::SubSp => "sub_sp",
            Opcode::Load => "load",
            Opcode::Move => "move",
            Opcode::Inc => "inc",
            Opcode::Dec => "dec",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Cmp => "cmp",
            Opcode::Jmp => "jmp",
            Opcode::Jz => "jz",
            Opcode::Jnz => "jnz",
            Opcode::Je => "je",
            Opcode::Jne => "jne",
            Opcode::Jl => "jl",
            Opcode::Jle => "jle",
            Opcode::Jg => "jg",
            Opcode::Jge => "jge",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::RetN => "ret_n",
            Opcode::RetNSm => "ret_n_sm",
            Opcode::NopN => "nop_n",
            Opcode::Exit => "exit",
            Opcode::Nop => "nop",
        }
    }

    /// The condition code carried by a conditional-jump opcode, if any.
    pub fn condition(&self) -> Option<Condition> {
        Condition::try_from(*self as u8).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_all_valid_opcodes() {
        for &opcode in &ALL_OPCODES {
            let byte = opcode as u8;
            let decoded = Opcode::try_from(byte).unwrap();
            assert_eq!(
                opcode, decoded,
                "roundtrip failed for {opcode:?} ({byte:#04x})"
            );
        }
    }

    #[test]
    fn illegal_opcode_zero() {
        assert_eq!(Opcode::try_from(0x00), Err(DecodeError::IllegalOpcode));
    }

    #[test]
    fn reserved_gaps_are_rejected() {
        for byte in (0x07..=0x0Fu8)
            .chain(0x12..=0x1F)
            .chain(0x25..=0x2F)
            .chain(0x31..=0x3F)
            .chain(0x49..=0x4F)
            .chain(0x54..=0xFC)
        {
            assert_eq!(
                Opcode::try_from(byte),
                Err(DecodeError::ReservedOpcode(byte)),
                "byte {byte:#04x} should be reserved"
            );
        }
    }

    #[test]
    fn every_byte_value_resolves() {
        for byte in 0..=255u8 {
            match Opcode::try_from(byte) {
                Ok(_) | Err(DecodeError::IllegalOpcode) | Err(DecodeError::ReservedOpcode(_)) => {}
                other => panic!("unexpected result for byte {byte:#04x}: {other:?}"),
            }
        }
    }

    #[test]
    fn only_conditional_jumps_carry_conditions() {
        let conditional: Vec<Opcode> = ALL_OPCODES
            .iter()
            .copied()
            .filter(|op| op.condition().is_some())
            .collect();
        assert_eq!(
            conditional,
            vec![
                Opcode::Jz,
                Opcode::Jnz,
                Opcode::Je,
                Opcode::Jne,
                Opcode::Jl,
                Opcode::Jle,
                Opcode::Jg,
                Opcode::Jge
            ]
        );
        assert_eq!(Opcode::Jmp.condition(), None);
    }

    #[test]
    fn mnemonics_are_lowercase() {
        for &opcode in &ALL_OPCODES {
            let m = opcode.mnemonic();
            assert!(!m.is_empty(), "empty mnemonic for {opcode:?}");
            assert_eq!(m, m.to_lowercase(), "mnemonic should be lowercase: {m}");
        }
    }
}
