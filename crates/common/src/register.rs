//! Register identifiers.
//!
//! A register id byte packs a width class and a slot index as
//! `class * 32 + index`. All five classes address the same 32 slots:
//! `al`, `ah`, `ax`, `eax` and `rax` are views of slot 4.

use std::fmt;

use crate::error::DecodeError;
use crate::operand::TargetProfile;

/// Number of register slots in one register file.
pub const MAX_REGS: usize = 32;

/// Width class of a register view.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// Low byte.
    R8 = 0,
    /// Second byte (bits 8..16).
    R8High = 1,
    R16 = 2,
    R32 = 3,
    R64 = 4,
}

pub const ALL_REG_CLASSES: [RegClass; 5] = [
    RegClass::R8,
    RegClass::R8High,
    RegClass::R16,
    RegClass::R32,
    RegClass::R64,
];

impl RegClass {
    /// Width of the view in bytes.
    pub fn size(self) -> usize {
        match self {
            RegClass::R8 | RegClass::R8High => 1,
            RegClass::R16 => 2,
            RegClass::R32 => 4,
            RegClass::R64 => 8,
        }
    }

    /// Byte offset of the view inside its slot.
    pub fn offset(self) -> usize {
        match self {
            RegClass::R8High => 1,
            _ => 0,
        }
    }

    /// Mask covering the bits of a value of this width.
    pub fn mask(self) -> u64 {
        match self.size() {
            8 => u64::MAX,
            n => (1u64 << (n * 8)) - 1,
        }
    }

    pub fn check(self, profile: TargetProfile) -> Result<Self, DecodeError> {
        if self == RegClass::R64 {
            profile.require_64("64-bit register")?;
        }
        Ok(self)
    }

    pub fn name(self) -> &'static str {
        match self {
            RegClass::R8 => "8bit",
            RegClass::R8High => "8bit high",
            RegClass::R16 => "16bit",
            RegClass::R32 => "32bit",
            RegClass::R64 => "64bit",
        }
    }
}

/// Split a raw register id into `(class, index)`.
pub fn decompose(raw: u32) -> (u32, u32) {
    (raw / MAX_REGS as u32, raw % MAX_REGS as u32)
}

/// One register view: a width class over one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegId {
    class: RegClass,
    index: u8,
}

impl RegId {
    pub const SP: RegId = RegId::new(RegClass::R16, 0);
    pub const EAX: RegId = RegId::new(RegClass::R32, 4);
    pub const EBX: RegId = RegId::new(RegClass::R32, 5);
    pub const ECX: RegId = RegId::new(RegClass::R32, 6);
    pub const EDX: RegId = RegId::new(RegClass::R32, 7);
    pub const EEX: RegId = RegId::new(RegClass::R32, 8);
    pub const RAX: RegId = RegId::new(RegClass::R64, 4);
    pub const RBX: RegId = RegId::new(RegClass::R64, 5);
    pub const RCX: RegId = RegId::new(RegClass::R64, 6);
    pub const AL: RegId = RegId::new(RegClass::R8, 4);
    pub const AH: RegId = RegId::new(RegClass::R8High, 4);
    pub const AX: RegId = RegId::new(RegClass::R16, 4);

    /// Build a register view.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`MAX_REGS`].
    pub const fn new(class: RegClass, index: u8) -> Self {
        assert!((index as usize) < MAX_REGS, "register index out of range");
        Self { class, index }
    }

    pub fn class(self) -> RegClass {
        self.class
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Width of this view in bytes.
    pub fn size(self) -> usize {
        self.class.size()
    }

    /// The same slot seen through another width class.
    pub fn with_class(self, class: RegClass) -> Self {
        Self {
            class,
            index: self.index,
        }
    }

    pub fn to_byte(self) -> u8 {
        self.class as u8 * MAX_REGS as u8 + self.index
    }

    /// Decode a register id byte, rejecting reserved classes.
    pub fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        let (class, index) = decompose(byte as u32);
        let class = match class {
            0 => RegClass::R8,
            1 => RegClass::R8High,
            2 => RegClass::R16,
            3 => RegClass::R32,
            4 => RegClass::R64,
            _ => {
                return Err(DecodeError::UnsupportedRegister {
                    id: byte,
                    class: class as u8,
                })
            }
        };
        Ok(Self {
            class,
            index: index as u8,
        })
    }

    /// Decode and check the class against the profile.
    pub fn decode(byte: u8, profile: TargetProfile) -> Result<Self, DecodeError> {
        let reg = Self::from_byte(byte)?;
        reg.class.check(profile)?;
        Ok(reg)
    }
}

const LEGACY: [&str; 4] = ["sp", "bp", "si", "di"];
const LETTERS: &[u8; 12] = b"abcdefghijkl";

impl fmt::Display for RegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index as usize;
        if index >= 16 {
            let n = index - 16;
            let suffix = match self.class {
                RegClass::R8 => "l",
                RegClass::R8High => "h",
                RegClass::R16 => "x",
                RegClass::R32 => "d",
                RegClass::R64 => "",
            };
            return write!(f, "r{n}{suffix}");
        }

        let prefix = match self.class {
            RegClass::R32 => "e",
            RegClass::R64 => "r",
            _ => "",
        };
        if index < 4 {
            let base = LEGACY[index];
            match self.class {
                RegClass::R8 => write!(f, "{base}l"),
                RegClass::R8High => write!(f, "{base}h"),
                _ => write!(f, "{prefix}{base}"),
            }
        } else {
            let letter = LETTERS[index - 4] as char;
            match self.class {
                RegClass::R8 => write!(f, "{letter}l"),
                RegClass::R8High => write!(f, "{letter}h"),
                _ => write!(f, "{prefix}{letter}x"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose_is_div_mod() {
        assert_eq!(decompose(0), (0, 0));
        assert_eq!(decompose(36), (1, 4));
        assert_eq!(decompose(3 * 32 + 8), (3, 8));
        assert_eq!(decompose(159), (4, 31));
    }

    #[test]
    fn byte_roundtrip_for_every_valid_id() {
        for byte in 0..160u8 {
            let reg = RegId::from_byte(byte).unwrap();
            assert_eq!(reg.to_byte(), byte);
        }
    }

    #[test]
    fn reserved_classes_rejected() {
        assert_eq!(
            RegId::from_byte(160),
            Err(DecodeError::UnsupportedRegister { id: 160, class: 5 })
        );
        assert!(RegId::from_byte(255).is_err());
    }

    #[test]
    fn profile_rejects_r64_on_32_bit() {
        let rax = RegId::RAX.to_byte();
        assert!(RegId::decode(rax, TargetProfile::Bits32).is_err());
        assert_eq!(RegId::decode(rax, TargetProfile::Bits64), Ok(RegId::RAX));
    }

    #[test]
    fn legacy_names() {
        assert_eq!(RegId::EAX.to_string(), "eax");
        assert_eq!(RegId::EEX.to_string(), "eex");
        assert_eq!(RegId::RAX.to_string(), "rax");
        assert_eq!(RegId::AL.to_string(), "al");
        assert_eq!(RegId::AH.to_string(), "ah");
        assert_eq!(RegId::AX.to_string(), "ax");
        assert_eq!(RegId::SP.to_string(), "sp");
        assert_eq!(RegId::new(RegClass::R8, 0).to_string(), "spl");
        assert_eq!(RegId::new(RegClass::R32, 1).to_string(), "ebp");
        assert_eq!(RegId::new(RegClass::R64, 15).to_string(), "rlx");
    }

    #[test]
    fn numbered_names() {
        assert_eq!(RegId::new(RegClass::R64, 16).to_string(), "r0");
        assert_eq!(RegId::new(RegClass::R32, 31).to_string(), "r15d");
        assert_eq!(RegId::new(RegClass::R16, 20).to_string(), "r4x");
        assert_eq!(RegId::new(RegClass::R8High, 17).to_string(), "r1h");
    }

    #[test]
    fn class_masks() {
        assert_eq!(RegClass::R8.mask(), 0xFF);
        assert_eq!(RegClass::R8High.mask(), 0xFF);
        assert_eq!(RegClass::R16.mask(), 0xFFFF);
        assert_eq!(RegClass::R32.mask(), 0xFFFF_FFFF);
        assert_eq!(RegClass::R64.mask(), u64::MAX);
    }

    #[test]
    fn with_class_keeps_slot() {
        assert_eq!(RegId::EAX.with_class(RegClass::R64), RegId::RAX);
        assert_eq!(RegId::EAX.with_class(RegClass::R8High), RegId::AH);
    }
}
