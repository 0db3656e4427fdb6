//! Instruction encoding and decoding.
//!
//! Instructions are variable length: one opcode byte followed by operand
//! bytes whose count depends on the opcode, its tag bytes and the target
//! profile. Multi-byte values are little-endian.
//!
//! ```text
//! push   tag payload              tag: data type | DATA (u32) | REG (reg id)
//! pop    tag [reg]
//! load   reg imm                  imm has the register's width
//! move   dst src
//! inc    reg          dec reg
//! add    combo reg (reg | imm)    also sub, mul
//! cmp    combo dtype op1 op2 cond jtype target
//! jmp    jtype target
//! call   ctype target
//! ```
//!
//! Relative `jmp` and `call` targets are measured from the opcode byte.
//! Relative `cmp` targets are measured from the condition byte.

use std::fmt;

use crate::condition::Condition;
use crate::error::DecodeError;
use crate::opcode::Opcode;
use crate::operand::{CallType, Combo, DataType, JumpType, StackTag, TargetProfile};
use crate::register::RegId;
use crate::scalar::{self, Scalar};

/// A cursor over encoded bytes.
///
/// `take` consumes exactly `n` bytes or fails with
/// [`DecodeError::Truncated`] without consuming anything.
pub trait ByteSource {
    fn take(&mut self, n: usize) -> Result<&[u8], DecodeError>;

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let bytes = self.take(1)?;
        bytes.first().copied().ok_or(DecodeError::Truncated {
            needed: 1,
            available: 0,
        })
    }

    fn read<T: Scalar>(&mut self) -> Result<T, DecodeError> {
        let bytes = self.take(T::SIZE)?;
        T::read_le(bytes).ok_or(DecodeError::Truncated {
            needed: T::SIZE,
            available: bytes.len(),
        })
    }

    /// Read a zero-extended word of `size` bytes.
    fn read_sized(&mut self, size: usize) -> Result<u64, DecodeError> {
        let bytes = self.take(size)?;
        scalar::read_sized(bytes, size).ok_or(DecodeError::Truncated {
            needed: size,
            available: bytes.len(),
        })
    }
}

/// [`ByteSource`] over a plain byte slice.
#[derive(Debug, Clone)]
pub struct SliceSource<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8], DecodeError> {
        let available = self.bytes.len() - self.pos;
        if n > available {
            return Err(DecodeError::Truncated {
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.bytes[start..self.pos])
    }
}

/// Operand of `push`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOperand {
    Reg(RegId),
    Data(u32),
    /// Immediate of the data type's width. Only the low bytes are encoded.
    Typed(DataType, u64),
}

/// Operand of `pop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOperand {
    Reg(RegId),
    /// Discard a 4-byte data word.
    Data,
    /// Discard a value of the data type's width.
    Typed(DataType),
}

/// Operands of `add`, `sub` and `mul`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOperands {
    RegReg(RegId, RegId),
    /// Immediate of the register's width.
    RegImm(RegId, u64),
}

impl ArithOperands {
    pub fn combo(&self) -> Combo {
        match self {
            ArithOperands::RegReg(..) => Combo::RegReg,
            ArithOperands::RegImm(..) => Combo::RegImm,
        }
    }

    pub fn dst(&self) -> RegId {
        match *self {
            ArithOperands::RegReg(dst, _) | ArithOperands::RegImm(dst, _) => dst,
        }
    }
}

/// Operands of `cmp`. Addresses are pointer-width, immediates have the
/// compare's data-type width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOperands {
    RegReg(RegId, RegId),
    RegImm(RegId, u64),
    RegAddr(RegId, u64),
    AddrImm(u64, u64),
    AddrAddr(u64, u64),
}

impl CmpOperands {
    pub fn combo(&self) -> Combo {
        match self {
            CmpOperands::RegReg(..) => Combo::RegReg,
            CmpOperands::RegImm(..) => Combo::RegImm,
            CmpOperands::RegAddr(..) => Combo::RegAddr,
            CmpOperands::AddrImm(..) => Combo::AddrImm,
            CmpOperands::AddrAddr(..) => Combo::AddrAddr,
        }
    }

    fn encoded_len(&self, data_type: DataType, profile: TargetProfile) -> usize {
        let ptr = profile.pointer_width();
        let imm = data_type.size(profile);
        match self {
            CmpOperands::RegReg(..) => 2,
            CmpOperands::RegImm(..) => 1 + imm,
            CmpOperands::RegAddr(..) => 1 + ptr,
            CmpOperands::AddrImm(..) => ptr + imm,
            CmpOperands::AddrAddr(..) => 2 * ptr,
        }
    }
}

/// Encoded target of a jump or conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    Near(i8),
    Short(i16),
    Long(i32),
    Ptr32(u32),
    Ptr64(u64),
}

impl JumpTarget {
    pub fn jump_type(self) -> JumpType {
        match self {
            JumpTarget::Near(_) => JumpType::Near,
            JumpTarget::Short(_) => JumpType::Short,
            JumpTarget::Long(_) => JumpType::Long,
            JumpTarget::Ptr32(_) => JumpType::Ptr32,
            JumpTarget::Ptr64(_) => JumpType::Ptr64,
        }
    }

    /// Destination address. Relative forms add their offset to `base`;
    /// `None` if that leaves the address space.
    pub fn resolve(self, base: u64) -> Option<u64> {
        match self {
            JumpTarget::Near(off) => base.checked_add_signed(off as i64),
            JumpTarget::Short(off) => base.checked_add_signed(off as i64),
            JumpTarget::Long(off) => base.checked_add_signed(off as i64),
            JumpTarget::Ptr32(addr) => Some(addr as u64),
            JumpTarget::Ptr64(addr) => Some(addr),
        }
    }

    /// Encode a branch from `base` to `dest`. `None` if it does not fit.
    pub fn encode_for(jump_type: JumpType, base: u64, dest: u64) -> Option<Self> {
        let offset = dest as i128 - base as i128;
        Some(match jump_type {
            JumpType::Near => JumpTarget::Near(i8::try_from(offset).ok()?),
            JumpType::Short => JumpTarget::Short(i16::try_from(offset).ok()?),
            JumpType::Long => JumpTarget::Long(i32::try_from(offset).ok()?),
            JumpType::Ptr32 => JumpTarget::Ptr32(u32::try_from(dest).ok()?),
            JumpType::Ptr64 => JumpTarget::Ptr64(dest),
        })
    }

    fn decode_from<S: ByteSource>(
        src: &mut S,
        jump_type: JumpType,
    ) -> Result<Self, DecodeError> {
        Ok(match jump_type {
            JumpType::Near => JumpTarget::Near(src.read()?),
            JumpType::Short => JumpTarget::Short(src.read()?),
            JumpType::Long => JumpTarget::Long(src.read()?),
            JumpType::Ptr32 => JumpTarget::Ptr32(src.read()?),
            JumpType::Ptr64 => JumpTarget::Ptr64(src.read()?),
        })
    }

    pub(crate) fn encode_into(self, out: &mut Vec<u8>) {
        match self {
            JumpTarget::Near(v) => out.extend_from_slice(&v.to_le_bytes()),
            JumpTarget::Short(v) => out.extend_from_slice(&v.to_le_bytes()),
            JumpTarget::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
            JumpTarget::Ptr32(v) => out.extend_from_slice(&v.to_le_bytes()),
            JumpTarget::Ptr64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

impl fmt::Display for JumpTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.jump_type().name();
        match *self {
            JumpTarget::Near(off) => write!(f, "{name} {}", Offset(off as i64)),
            JumpTarget::Short(off) => write!(f, "{name} {}", Offset(off as i64)),
            JumpTarget::Long(off) => write!(f, "{name} {}", Offset(off as i64)),
            JumpTarget::Ptr32(addr) => write!(f, "{name} {addr:#x}"),
            JumpTarget::Ptr64(addr) => write!(f, "{name} {addr:#x}"),
        }
    }
}

/// Encoded target of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Short(i16),
    Long(i32),
    Ptr32(u32),
    Ptr64(u64),
}

impl CallTarget {
    pub fn call_type(self) -> CallType {
        match self {
            CallTarget::Short(_) => CallType::Short,
            CallTarget::Long(_) => CallType::Long,
            CallTarget::Ptr32(_) => CallType::Ptr32,
            CallTarget::Ptr64(_) => CallType::Ptr64,
        }
    }

    pub fn resolve(self, base: u64) -> Option<u64> {
        match self {
            CallTarget::Short(off) => base.checked_add_signed(off as i64),
            CallTarget::Long(off) => base.checked_add_signed(off as i64),
            CallTarget::Ptr32(addr) => Some(addr as u64),
            CallTarget::Ptr64(addr) => Some(addr),
        }
    }

    pub fn encode_for(call_type: CallType, base: u64, dest: u64) -> Option<Self> {
        let offset = dest as i128 - base as i128;
        Some(match call_type {
            CallType::Short => CallTarget::Short(i16::try_from(offset).ok()?),
            CallType::Long => CallTarget::Long(i32::try_from(offset).ok()?),
            CallType::Ptr32 => CallTarget::Ptr32(u32::try_from(dest).ok()?),
            CallType::Ptr64 => CallTarget::Ptr64(dest),
        })
    }

    fn decode_from<S: ByteSource>(
        src: &mut S,
        call_type: CallType,
    ) -> Result<Self, DecodeError> {
        Ok(match call_type {
            CallType::Short => CallTarget::Short(src.read()?),
            CallType::Long => CallTarget::Long(src.read()?),
            CallType::Ptr32 => CallTarget::Ptr32(src.read()?),
            CallType::Ptr64 => CallTarget::Ptr64(src.read()?),
        })
    }

    pub(crate) fn encode_into(self, out: &mut Vec<u8>) {
        match self {
            CallTarget::Short(v) => out.extend_from_slice(&v.to_le_bytes()),
            CallTarget::Long(v) => out.extend_from_slice(&v.to_le_bytes()),
            CallTarget::Ptr32(v) => out.extend_from_slice(&v.to_le_bytes()),
            CallTarget::Ptr64(v) => out.extend_from_slice(&v.to_le_bytes()),
        }
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.call_type().name();
        match *self {
            CallTarget::Short(off) => write!(f, "{name} {}", Offset(off as i64)),
            CallTarget::Long(off) => write!(f, "{name} {}", Offset(off as i64)),
            CallTarget::Ptr32(addr) => write!(f, "{name} {addr:#x}"),
            CallTarget::Ptr64(addr) => write!(f, "{name} {addr:#x}"),
        }
    }
}

/// Signed offset printed as `+0x15` / `-0x14`.
struct Offset(i64);

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { '-' } else { '+' };
        write!(f, "{sign}{:#x}", self.0.unsigned_abs())
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Push(PushOperand),
    Pop(PopOperand),
    PushAll,
    PopAll,
    /// Reserve N bytes of locals.
    AddSp(u8),
    /// Release N bytes.
    SubSp(u8),
    Load {
        reg: RegId,
        imm: u64,
    },
    Move {
        dst: RegId,
        src: RegId,
    },
    Inc(RegId),
    Dec(RegId),
    Add(ArithOperands),
    Sub(ArithOperands),
    Mul(ArithOperands),
    /// Compare two operands and branch when `condition` holds.
    Cmp {
        data_type: DataType,
        operands: CmpOperands,
        condition: Condition,
        target: JumpTarget,
    },
    Jmp(JumpTarget),
    Call(CallTarget),
    Ret,
    /// Return and release N bytes of caller-pushed arguments.
    RetN(u16),
    RetNSm(u8),
    Exit,
    Nop,
    /// Skip N bytes of padding that follow the count.
    NopN(u8),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Push(_) => Opcode::Push,
            Instruction::Pop(_) => Opcode::Pop,
            Instruction::PushAll => Opcode::PushAll,
            Instruction::PopAll => Opcode::PopAll,
            Instruction::AddSp(_) => Opcode::AddSp,
            Instruction::SubSp(_) => Opcode::SubSp,
            Instruction::Load { .. } => Opcode::Load,
            Instruction::Move { .. } => Opcode::Move,
            Instruction::Inc(_) => Opcode::Inc,
            Instruction::Dec(_) => Opcode::Dec,
            Instruction::Add(_) => Opcode::Add,
            Instruction::Sub(_) => Opcode::Sub,
            Instruction::Mul(_) => Opcode::Mul,
            Instruction::Cmp { .. } => Opcode::Cmp,
            Instruction::Jmp(_) => Opcode::Jmp,
            Instruction::Call(_) => Opcode::Call,
            Instruction::Ret => Opcode::Ret,
            Instruction::RetN(_) => Opcode::RetN,
            Instruction::RetNSm(_) => Opcode::RetNSm,
            Instruction::Exit => Opcode::Exit,
            Instruction::Nop => Opcode::Nop,
            Instruction::NopN(_) => Opcode::NopN,
        }
    }

    /// Total encoded length in bytes.
    pub fn encoded_len(&self, profile: TargetProfile) -> usize {
        match self {
            Instruction::Push(PushOperand::Reg(_)) => 3,
            Instruction::Push(PushOperand::Data(_)) => 6,
            Instruction::Push(PushOperand::Typed(dt, _)) => 2 + dt.size(profile),
            Instruction::Pop(PopOperand::Reg(_)) => 3,
            Instruction::Pop(_) => 2,
            Instruction::Load { reg, .. } => 2 + reg.size(),
            Instruction::Move { .. } => 3,
            Instruction::Inc(_) | Instruction::Dec(_) => 2,
            Instruction::AddSp(_) | Instruction::SubSp(_) | Instruction::RetNSm(_) => 2,
            Instruction::RetN(_) => 3,
            Instruction::NopN(skip) => 2 + *skip as usize,
            Instruction::Add(ops) | Instruction::Sub(ops) | Instruction::Mul(ops) => match ops {
                ArithOperands::RegReg(..) => 4,
                ArithOperands::RegImm(reg, _) => 3 + reg.size(),
            },
            Instruction::Cmp { target, .. } => {
                self.branch_base(profile) + 2 + target.jump_type().operand_size()
            }
            Instruction::Jmp(target) => 2 + target.jump_type().operand_size(),
            Instruction::Call(target) => 2 + target.call_type().operand_size(),
            Instruction::PushAll
            | Instruction::PopAll
            | Instruction::Ret
            | Instruction::Exit
            | Instruction::Nop => 1,
        }
    }

    /// Offset from the opcode byte to the byte relative targets are
    /// measured from: the condition byte for `cmp`, the opcode otherwise.
    pub fn branch_base(&self, profile: TargetProfile) -> usize {
        match self {
            Instruction::Cmp {
                data_type,
                operands,
                ..
            } => 3 + operands.encoded_len(*data_type, profile),
            _ => 0,
        }
    }

    /// Append the encoded form.
    pub fn encode_into(&self, out: &mut Vec<u8>, profile: TargetProfile) {
        out.push(self.opcode() as u8);
        match *self {
            Instruction::Push(operand) => match operand {
                PushOperand::Reg(reg) => {
                    out.push(StackTag::REG);
                    out.push(reg.to_byte());
                }
                PushOperand::Data(word) => {
                    out.push(StackTag::DATA);
                    out.extend_from_slice(&word.to_le_bytes());
                }
                PushOperand::Typed(dt, imm) => {
                    out.push(dt as u8);
                    scalar::write_sized(out, imm, dt.size(profile));
                }
            },
            Instruction::Pop(operand) => match operand {
                PopOperand::Reg(reg) => {
                    out.push(StackTag::REG);
                    out.push(reg.to_byte());
                }
                PopOperand::Data => out.push(StackTag::DATA),
                PopOperand::Typed(dt) => out.push(dt as u8),
            },
            Instruction::Load { reg, imm } => {
                out.push(reg.to_byte());
                scalar::write_sized(out, imm, reg.size());
            }
            Instruction::Move { dst, src } => {
                out.push(dst.to_byte());
                out.push(src.to_byte());
            }
            Instruction::Inc(reg) | Instruction::Dec(reg) => out.push(reg.to_byte()),
            Instruction::AddSp(size) | Instruction::SubSp(size) | Instruction::RetNSm(size) => {
                out.push(size)
            }
            Instruction::RetN(size) => out.extend_from_slice(&size.to_le_bytes()),
            Instruction::NopN(skip) => {
                out.push(skip);
                out.resize(out.len() + skip as usize, Opcode::Nop as u8);
            }
            Instruction::Add(ops) | Instruction::Sub(ops) | Instruction::Mul(ops) => {
                out.push(ops.combo() as u8);
                match ops {
                    ArithOperands::RegReg(a, b) => {
                        out.push(a.to_byte());
                        out.push(b.to_byte());
                    }
                    ArithOperands::RegImm(reg, imm) => {
                        out.push(reg.to_byte());
                        scalar::write_sized(out, imm, reg.size());
                    }
                }
            }
            Instruction::Cmp {
                data_type,
                operands,
                condition,
                target,
            } => {
                let ptr = profile.pointer_width();
                let imm = data_type.size(profile);
                out.push(operands.combo() as u8);
                out.push(data_type as u8);
                match operands {
                    CmpOperands::RegReg(a, b) => {
                        out.push(a.to_byte());
                        out.push(b.to_byte());
                    }
                    CmpOperands::RegImm(reg, value) => {
                        out.push(reg.to_byte());
                        scalar::write_sized(out, value, imm);
                    }
                    CmpOperands::RegAddr(reg, addr) => {
                        out.push(reg.to_byte());
                        scalar::write_sized(out, addr, ptr);
                    }
                    CmpOperands::AddrImm(addr, value) => {
                        scalar::write_sized(out, addr, ptr);
                        scalar::write_sized(out, value, imm);
                    }
                    CmpOperands::AddrAddr(a, b) => {
                        scalar::write_sized(out, a, ptr);
                        scalar::write_sized(out, b, ptr);
                    }
                }
                out.push(condition as u8);
                out.push(target.jump_type() as u8);
                target.encode_into(out);
            }
            Instruction::Jmp(target) => {
                out.push(target.jump_type() as u8);
                target.encode_into(out);
            }
            Instruction::Call(target) => {
                out.push(target.call_type() as u8);
                target.encode_into(out);
            }
            Instruction::PushAll
            | Instruction::PopAll
            | Instruction::Ret
            | Instruction::Exit
            | Instruction::Nop => {}
        }
    }

    pub fn encode(&self, profile: TargetProfile) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len(profile));
        self.encode_into(&mut out, profile);
        out
    }

    /// Decode one instruction from the start of `bytes`. Returns the
    /// instruction and the number of bytes it occupies.
    pub fn decode(bytes: &[u8], profile: TargetProfile) -> Result<(Self, usize), DecodeError> {
        let mut src = SliceSource::new(bytes);
        let instr = Self::decode_from(&mut src, profile)?;
        Ok((instr, src.position()))
    }

    /// Decode one instruction, consuming its bytes from `src`.
    pub fn decode_from<S: ByteSource>(src: &mut S, profile: TargetProfile) -> Result<Self, DecodeError> {
        let opcode = Opcode::try_from(src.read_u8()?)?;
        let instr = match opcode {
            Opcode::Push => Instruction::Push(match StackTag::try_from(src.read_u8()?)? {
                StackTag::Reg => PushOperand::Reg(read_reg(src, profile)?),
                StackTag::Data => PushOperand::Data(src.read()?),
                StackTag::Typed(dt) => {
                    let dt = dt.check(profile)?;
                    PushOperand::Typed(dt, src.read_sized(dt.size(profile))?)
                }
            }),
            Opcode::Pop => Instruction::Pop(match StackTag::try_from(src.read_u8()?)? {
                StackTag::Reg => PopOperand::Reg(read_reg(src, profile)?),
                StackTag::Data => PopOperand::Data,
                StackTag::Typed(dt) => PopOperand::Typed(dt.check(profile)?),
            }),
            Opcode::PushAll => Instruction::PushAll,
            Opcode::PopAll => Instruction::PopAll,
            Opcode::AddSp => Instruction::AddSp(src.read_u8()?),
            Opcode::SubSp => Instruction::SubSp(src.read_u8()?),
            Opcode::Load => {
                let reg = read_reg(src, profile)?;
                let imm = src.read_sized(reg.size())?;
                Instruction::Load { reg, imm }
            }
            Opcode::Move => {
                let dst = read_reg(src, profile)?;
                let src_reg = read_reg(src, profile)?;
                Instruction::Move { dst, src: src_reg }
            }
            Opcode::Inc => Instruction::Inc(read_reg(src, profile)?),
            Opcode::Dec => Instruction::Dec(read_reg(src, profile)?),
            Opcode::Add => Instruction::Add(read_arith(src, profile)?),
            Opcode::Sub => Instruction::Sub(read_arith(src, profile)?),
            Opcode::Mul => Instruction::Mul(read_arith(src, profile)?),
            Opcode::Cmp => {
                let combo = Combo::try_from(src.read_u8()?)?;
                let data_type = DataType::try_from(src.read_u8()?)?.check(profile)?;
                let ptr = profile.pointer_width();
                let imm = data_type.size(profile);
                let operands = match combo {
                    Combo::RegReg => {
                        CmpOperands::RegReg(read_reg(src, profile)?, read_reg(src, profile)?)
                    }
                    Combo::RegImm => {
                        CmpOperands::RegImm(read_reg(src, profile)?, src.read_sized(imm)?)
                    }
                    Combo::RegAddr => {
                        CmpOperands::RegAddr(read_reg(src, profile)?, src.read_sized(ptr)?)
                    }
                    Combo::AddrImm => {
                        CmpOperands::AddrImm(src.read_sized(ptr)?, src.read_sized(imm)?)
                    }
                    Combo::AddrAddr => {
                        CmpOperands::AddrAddr(src.read_sized(ptr)?, src.read_sized(ptr)?)
                    }
                };
                let condition = Condition::try_from(src.read_u8()?)?;
                let jump_type = JumpType::try_from(src.read_u8()?)?.check(profile)?;
                let target = JumpTarget::decode_from(src, jump_type)?;
                Instruction::Cmp {
                    data_type,
                    operands,
                    condition,
                    target,
                }
            }
            Opcode::Jmp => {
                let jump_type = JumpType::try_from(src.read_u8()?)?.check(profile)?;
                Instruction::Jmp(JumpTarget::decode_from(src, jump_type)?)
            }
            Opcode::Jz
            | Opcode::Jnz
            | Opcode::Je
            | Opcode::Jne
            | Opcode::Jl
            | Opcode::Jle
            | Opcode::Jg
            | Opcode::Jge => return Err(DecodeError::DanglingCondition(opcode as u8)),
            Opcode::Call => {
                let call_type = CallType::try_from(src.read_u8()?)?.check(profile)?;
                Instruction::Call(CallTarget::decode_from(src, call_type)?)
            }
            Opcode::Ret => Instruction::Ret,
            Opcode::RetN => Instruction::RetN(src.read()?),
            Opcode::RetNSm => Instruction::RetNSm(src.read_u8()?),
            Opcode::Exit => Instruction::Exit,
            Opcode::Nop => Instruction::Nop,
            Opcode::NopN => {
                let skip = src.read_u8()?;
                src.take(skip as usize)?;
                Instruction::NopN(skip)
            }
        };
        Ok(instr)
    }
}

fn read_reg<S: ByteSource>(src: &mut S, profile: TargetProfile) -> Result<RegId, DecodeError> {
    RegId::decode(src.read_u8()?, profile)
}

fn read_arith<S: ByteSource>(
    src: &mut S,
    profile: TargetProfile,
) -> Result<ArithOperands, DecodeError> {
    match Combo::try_from(src.read_u8()?)? {
        Combo::RegReg => Ok(ArithOperands::RegReg(
            read_reg(src, profile)?,
            read_reg(src, profile)?,
        )),
        Combo::RegImm => {
            let reg = read_reg(src, profile)?;
            let imm = src.read_sized(reg.size())?;
            Ok(ArithOperands::RegImm(reg, imm))
        }
        other => Err(DecodeError::UnknownCombo(other as u8)),
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode().mnemonic();
        match *self {
            Instruction::Push(PushOperand::Reg(reg)) => write!(f, "{m} {reg}"),
            Instruction::Push(PushOperand::Data(word)) => write!(f, "{m}.data {word:#x}"),
            Instruction::Push(PushOperand::Typed(dt, imm)) => {
                write!(f, "{m}.{} {imm:#x}", dt.suffix())
            }
            Instruction::Pop(PopOperand::Reg(reg)) => write!(f, "{m} {reg}"),
            Instruction::Pop(PopOperand::Data) => write!(f, "{m}.data"),
            Instruction::Pop(PopOperand::Typed(dt)) => write!(f, "{m}.{}", dt.suffix()),
            Instruction::Load { reg, imm } => write!(f, "{m} {reg}, {imm:#x}"),
            Instruction::Move { dst, src } => write!(f, "{m} {dst}, {src}"),
            Instruction::Inc(reg) | Instruction::Dec(reg) => write!(f, "{m} {reg}"),
            Instruction::AddSp(size) | Instruction::SubSp(size) | Instruction::RetNSm(size) => {
                write!(f, "{m} {size}")
            }
            Instruction::RetN(size) => write!(f, "{m} {size}"),
            Instruction::NopN(skip) => write!(f, "{m} {skip}"),
            Instruction::Add(ops) | Instruction::Sub(ops) | Instruction::Mul(ops) => match ops {
                ArithOperands::RegReg(a, b) => write!(f, "{m} {a}, {b}"),
                ArithOperands::RegImm(reg, imm) => write!(f, "{m} {reg}, {imm:#x}"),
            },
            Instruction::Cmp {
                data_type,
                operands,
                condition,
                target,
            } => {
                write!(f, "{m}.{} ", data_type.suffix())?;
                match operands {
                    CmpOperands::RegReg(a, b) => write!(f, "{a}, {b}")?,
                    CmpOperands::RegImm(reg, imm) => write!(f, "{reg}, {imm:#x}")?,
                    CmpOperands::RegAddr(reg, addr) => write!(f, "{reg}, [{addr:#x}]")?,
                    CmpOperands::AddrImm(addr, imm) => write!(f, "[{addr:#x}], {imm:#x}")?,
                    CmpOperands::AddrAddr(a, b) => write!(f, "[{a:#x}], [{b:#x}]")?,
                }
                write!(f, " ; {condition} {target}")
            }
            Instruction::Jmp(target) => write!(f, "{m} {target}"),
            Instruction::Call(target) => write!(f, "{m} {target}"),
            Instruction::PushAll
            | Instruction::PopAll
            | Instruction::Ret
            | Instruction::Exit
            | Instruction::Nop => f.write_str(m),
        }
    }
}
