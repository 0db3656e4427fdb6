//! Programmatic image construction.
//!
//! [`ImageBuilder`] appends encoded instructions, tracks labels and patches
//! branch targets once every label is bound.
//!
//! ```
//! use regvm_common::builder::ImageBuilder;
//! use regvm_common::instruction::Instruction;
//! use regvm_common::operand::{CallType, TargetProfile};
//!
//! let mut b = ImageBuilder::new(TargetProfile::Bits64);
//! let func = b.label();
//! b.call(CallType::Short, func).emit(Instruction::Exit).align(16);
//! b.bind(func).unwrap();
//! b.emit(Instruction::Ret);
//! let image = b.finish().unwrap();
//! assert_eq!(image.len(), 17);
//! ```

use crate::condition::Condition;
use crate::error::BuildError;
use crate::instruction::{CallTarget, CmpOperands, Instruction, JumpTarget};
use crate::opcode::Opcode;
use crate::operand::{CallType, DataType, JumpType, TargetProfile};

/// A position in the image, bound later with [`ImageBuilder::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

impl Label {
    pub fn id(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
enum TargetKind {
    Jump(JumpType),
    Call(CallType),
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    label: Label,
    /// Offset of the encoded target bytes.
    at: usize,
    /// Offset relative targets are measured from.
    base: usize,
    kind: TargetKind,
}

/// Builds the byte image of a program for one target profile.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    profile: TargetProfile,
    base_address: u64,
    bytes: Vec<u8>,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
}

impl ImageBuilder {
    pub fn new(profile: TargetProfile) -> Self {
        Self {
            profile,
            base_address: 0,
            bytes: Vec::new(),
            labels: Vec::new(),
            fixups: Vec::new(),
        }
    }

    /// Address the image will be loaded at. Absolute targets include it.
    pub fn with_base_address(mut self, base_address: u64) -> Self {
        self.base_address = base_address;
        self
    }

    pub fn profile(&self) -> TargetProfile {
        self.profile
    }

    /// Current offset from the start of the image.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind `label` to the current offset.
    pub fn bind(&mut self, label: Label) -> Result<(), BuildError> {
        let offset = self.bytes.len();
        let slot = self
            .labels
            .get_mut(label.0)
            .ok_or(BuildError::UnboundLabel(label.0))?;
        if slot.is_some() {
            return Err(BuildError::Rebound(label.0));
        }
        *slot = Some(offset);
        Ok(())
    }

    /// Create a label bound to the current offset.
    pub fn here(&mut self) -> Label {
        self.labels.push(Some(self.bytes.len()));
        Label(self.labels.len() - 1)
    }

    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        instr.encode_into(&mut self.bytes, self.profile);
        self
    }

    /// Pad with `nop` up to a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) -> &mut Self {
        if alignment > 1 {
            while self.bytes.len() % alignment != 0 {
                self.bytes.push(Opcode::Nop as u8);
            }
        }
        self
    }

    /// Append raw bytes, e.g. data tables or deliberately malformed code.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn jmp(&mut self, jump_type: JumpType, label: Label) -> &mut Self {
        let instr = Instruction::Jmp(placeholder_jump(jump_type));
        self.emit_with_fixup(instr, label, TargetKind::Jump(jump_type))
    }

    pub fn call(&mut self, call_type: CallType, label: Label) -> &mut Self {
        let instr = Instruction::Call(placeholder_call(call_type));
        self.emit_with_fixup(instr, label, TargetKind::Call(call_type))
    }

    /// Compare and branch to `label` when `condition` holds.
    pub fn cmp(
        &mut self,
        data_type: DataType,
        operands: CmpOperands,
        condition: Condition,
        jump_type: JumpType,
        label: Label,
    ) -> &mut Self {
        let instr = Instruction::Cmp {
            data_type,
            operands,
            condition,
            target: placeholder_jump(jump_type),
        };
        self.emit_with_fixup(instr, label, TargetKind::Jump(jump_type))
    }

    fn emit_with_fixup(&mut self, instr: Instruction, label: Label, kind: TargetKind) -> &mut Self {
        let start = self.bytes.len();
        let operand_size = match kind {
            TargetKind::Jump(jt) => jt.operand_size(),
            TargetKind::Call(ct) => ct.operand_size(),
        };
        self.fixups.push(Fixup {
            label,
            at: start + instr.encoded_len(self.profile) - operand_size,
            base: start + instr.branch_base(self.profile),
            kind,
        });
        self.emit(instr)
    }

    /// Patch every branch target and return the image bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, BuildError> {
        let mut patch = Vec::with_capacity(8);
        for fixup in &self.fixups {
            let offset = self
                .labels
                .get(fixup.label.0)
                .copied()
                .flatten()
                .ok_or(BuildError::UnboundLabel(fixup.label.0))?;
            let dest = self.base_address + offset as u64;
            let base = self.base_address + fixup.base as u64;
            let out_of_range = |kind: &'static str| BuildError::OutOfRange {
                label: fixup.label.0,
                kind,
                base,
                dest,
            };

            patch.clear();
            match fixup.kind {
                TargetKind::Jump(jt) => JumpTarget::encode_for(jt, base, dest)
                    .ok_or_else(|| out_of_range(jt.name()))?
                    .encode_into(&mut patch),
                TargetKind::Call(ct) => CallTarget::encode_for(ct, base, dest)
                    .ok_or_else(|| out_of_range(ct.name()))?
                    .encode_into(&mut patch),
            }
            self.bytes[fixup.at..fixup.at + patch.len()].copy_from_slice(&patch);
        }
        Ok(self.bytes)
    }
}

fn placeholder_jump(jump_type: JumpType) -> JumpTarget {
    match jump_type {
        JumpType::Near => JumpTarget::Near(0),
        JumpType::Short => JumpTarget::Short(0),
        JumpType::Long => JumpTarget::Long(0),
        JumpType::Ptr32 => JumpTarget::Ptr32(0),
        JumpType::Ptr64 => JumpTarget::Ptr64(0),
    }
}

fn placeholder_call(call_type: CallType) -> CallTarget {
    match call_type {
        CallType::Short => CallTarget::Short(0),
        CallType::Long => CallTarget::Long(0),
        CallType::Ptr32 => CallTarget::Ptr32(0),
        CallType::Ptr64 => CallTarget::Ptr64(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegId;

    const P64: TargetProfile = TargetProfile::Bits64;

    #[test]
    fn forward_call_is_patched() {
        let mut b = ImageBuilder::new(P64);
        let func = b.label();
        b.emit(Instruction::Nop).call(CallType::Short, func);
        b.align(16);
        b.bind(func).unwrap();
        b.emit(Instruction::Ret);
        let bytes = b.finish().unwrap();
        // call at 1, target 16 -> +15
        assert_eq!(&bytes[1..5], &[0x50, 0x00, 0x0F, 0x00]);
        assert_eq!(bytes[16], Opcode::Ret as u8);
        assert!(bytes[5..16].iter().all(|&b| b == Opcode::Nop as u8));
    }

    #[test]
    fn backward_jump_is_negative() {
        let mut b = ImageBuilder::new(P64);
        let top = b.here();
        b.emit(Instruction::Nop).emit(Instruction::Nop);
        b.jmp(JumpType::Near, top);
        let bytes = b.finish().unwrap();
        assert_eq!(&bytes[2..], &[0x40, 0x00, 0xFE]);
    }

    #[test]
    fn cmp_target_measured_from_condition_byte() {
        let mut b = ImageBuilder::new(P64);
        let out = b.label();
        b.cmp(
            DataType::UInt32,
            CmpOperands::RegImm(RegId::EEX, 1),
            Condition::Jle,
            JumpType::Short,
            out,
        );
        b.bind(out).unwrap();
        let bytes = b.finish().unwrap();
        // condition byte at 8, label at 12
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[10..12], &[0x04, 0x00]);
    }

    #[test]
    fn absolute_targets_include_base_address() {
        let mut b = ImageBuilder::new(P64).with_base_address(0x1000);
        let func = b.label();
        b.call(CallType::Ptr32, func).align(16);
        b.bind(func).unwrap();
        b.emit(Instruction::Ret);
        let bytes = b.finish().unwrap();
        assert_eq!(&bytes[2..6], &0x1010u32.to_le_bytes());
    }

    #[test]
    fn unbound_label_is_reported() {
        let mut b = ImageBuilder::new(P64);
        let nowhere = b.label();
        b.jmp(JumpType::Short, nowhere);
        assert_eq!(b.finish(), Err(BuildError::UnboundLabel(0)));
    }

    #[test]
    fn rebinding_is_rejected() {
        let mut b = ImageBuilder::new(P64);
        let l = b.here();
        assert_eq!(b.bind(l), Err(BuildError::Rebound(0)));
    }

    #[test]
    fn near_out_of_range() {
        let mut b = ImageBuilder::new(P64);
        let far = b.label();
        b.jmp(JumpType::Near, far);
        b.raw(&[Opcode::Nop as u8; 200]);
        b.bind(far).unwrap();
        assert!(matches!(
            b.finish(),
            Err(BuildError::OutOfRange { kind: "near", .. })
        ));
    }
}
