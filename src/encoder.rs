//! Field-level encoders, one per instruction class.
//!
//! Words are built MSB-first by appending fixed-width fields to a bit buffer.
//! A buffer that does not come out at exactly 32 bits is an error rather than
//! something to truncate: it means a table or layout is wrong.

use bitflags::bitflags;
use bitvec::prelude::*;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::EncodeError;
use crate::parser::WordOperand;
use crate::tables::{
    self, DpOp, Reg, BNZ_OPCODE, BX_OPCODE, BX_SBO, BX_TAIL, B_CLASS, BZ_OPCODE, COND_AL,
    DP_PREFIX, LS_PREFIX, ROT, S_BIT,
};

/// `mov r0, r0`: writes the hard-wired zero register, so it does nothing.
pub const NOP: u32 = 0xE1A0_0000;

pub const COND_DISP_BITS: u32 = 12;
pub const UNCOND_DISP_BITS: u32 = 16;
pub const IMM_BITS: u32 = 8;

bitflags! {
/// Control bits between the load/store class prefix and the sub-mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LsFlags: u32 {
const IMMEDIATE = 0b100; // offset is an immediate
const PRE_INDEX = 0b010;
const UP = 0b001; // add the offset (clear: subtract)
}
}

/// Second operand of a data-processing word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand2 {
    Imm(u32),
    Reg(Reg),
}

/// What a branch tests before jumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    Always,
    /// Taken when the register reads zero.
    IfZero(Reg),
    IfNonZero(Reg),
}

impl BranchKind {
    pub fn disp_bits(self) -> u32 {
        match self {
            BranchKind::Always => UNCOND_DISP_BITS,
            _ => COND_DISP_BITS,
        }
    }

    pub fn is_conditional(self) -> bool {
        !matches!(self, BranchKind::Always)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Fields {
    bits: BitVec<u32, Msb0>,
}

impl Fields {
    pub(crate) fn new() -> Self {
        Self {
            bits: BitVec::with_capacity(32),
        }
    }

    /// Appends the low `width` bits of `value`.
    pub(crate) fn push(mut self, value: u32, width: usize) -> Self {
        let width = width.min(32);
        let view = value.view_bits::<Msb0>();
        self.bits.extend_from_bitslice(&view[32 - width..]);
        self
    }

    pub(crate) fn finish(self) -> Result<u32, EncodeError> {
        if self.bits.len() != 32 {
            return Err(EncodeError::Width(self.bits.len()));
        }
        Ok(self.bits.load_be::<u32>())
    }
}

pub fn encode_dp(op: DpOp, rd: Reg, rn: Reg, operand: Operand2) -> Result<u32, EncodeError> {
    let f = Fields::new()
        .push(COND_AL, 4)
        .push(DP_PREFIX, 2);
    let f = match operand {
        Operand2::Imm(v) => {
            if v > 0xFF {
                return Err(EncodeError::Immediate {
                    value: v as i64,
                    bits: IMM_BITS,
                });
            }
            f.push(1, 1)
                .push(op.opcode(), 4)
                .push(S_BIT, 1)
                .push(rn.code(), 4)
                .push(rd.code(), 4)
                .push(ROT, 4)
                .push(v, 8)
        }
        Operand2::Reg(rm) => f
            .push(0, 1)
            .push(op.opcode(), 4)
            .push(S_BIT, 1)
            .push(rn.code(), 4)
            .push(rd.code(), 4)
            .push(ROT, 4)
            .push(0, 4)
            .push(rm.code(), 4),
    };
    f.finish()
}

/// Single load/store, always immediate-offset and pre-indexed. The offset
/// sign selects the direction bit; its magnitude fills the offset field.
pub fn encode_ls(
    load: bool,
    value: Reg,
    base: Reg,
    offset: i64,
    writeback: bool,
) -> Result<u32, EncodeError> {
    let magnitude = offset
        .unsigned_abs()
        .to_u32()
        .filter(|m| *m <= 0xFF)
        .ok_or(EncodeError::Immediate {
            value: offset,
            bits: IMM_BITS,
        })?;
    let mut flags = LsFlags::IMMEDIATE | LsFlags::PRE_INDEX;
    flags.set(LsFlags::UP, offset >= 0);
    Fields::new()
        .push(COND_AL, 4)
        .push(LS_PREFIX, 2)
        .push(flags.bits(), 3)
        .push(tables::ls_mode(load, writeback), 3)
        .push(base.code(), 4)
        .push(value.code(), 4)
        .push(ROT, 4)
        .push(magnitude, 8)
        .finish()
}

/// Branch displacement in instruction words, compensating for the two
/// words already fetched when the branch resolves.
pub fn displacement(target: u32, pc: u32) -> i64 {
    target as i64 - pc as i64 - 2
}

pub fn encode_branch(kind: BranchKind, disp: i64) -> Result<u32, EncodeError> {
    let bits = kind.disp_bits();
    let limit = 1i64 << (bits - 1);
    if disp < -limit || disp >= limit {
        return Err(EncodeError::Displacement { disp, bits });
    }
    // two's complement, masked by the field width
    let raw = disp as u32;
    let f = Fields::new().push(COND_AL, 4);
    match kind {
        BranchKind::Always => f
            .push(B_CLASS, 4)
            .push(0, 4)
            .push(0, 4)
            .push(raw, bits as usize)
            .finish(),
        BranchKind::IfZero(r) | BranchKind::IfNonZero(r) => {
            let opcode = if matches!(kind, BranchKind::IfZero(_)) {
                BZ_OPCODE
            } else {
                BNZ_OPCODE
            };
            f.push(opcode, 8)
                .push(r.code(), 4)
                .push(Reg::ZERO.code(), 4)
                .push(raw, bits as usize)
                .finish()
        }
    }
}

pub fn encode_bx(rm: Reg) -> Result<u32, EncodeError> {
    Fields::new()
        .push(COND_AL, 4)
        .push(BX_OPCODE, 8)
        .push(BX_SBO, 12)
        .push(BX_TAIL, 4)
        .push(rm.code(), 4)
        .finish()
}

/// Splits a `.word` literal into its high and low 32-bit halves. Negative
/// literals are sign-extended to 64 bits first.
pub fn split_word(value: i128) -> Result<(u32, u32), EncodeError> {
    if value < i64::MIN as i128 || value > u64::MAX as i128 {
        return Err(EncodeError::Immediate {
            value: value.clamp(i64::MIN as i128, i64::MAX as i128) as i64,
            bits: 64,
        });
    }
    let v = value as u64;
    Ok(((v >> 32) as u32, v as u32))
}

/// Outcome of a `.word` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordDirective {
    Write { high: u32, low: u32 },
    /// A label operand: the data section ends here and nothing is written.
    Boundary(String),
}

pub fn encode_word(operand: &WordOperand) -> Result<WordDirective, EncodeError> {
    match operand {
        WordOperand::Value(v) => {
            let (high, low) = split_word(*v)?;
            Ok(WordDirective::Write { high, low })
        }
        WordOperand::Symbol(label) => Ok(WordDirective::Boundary(label.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: &str) -> Reg {
        Reg::lookup(n).unwrap()
    }

    #[test]
    fn field_buffer_rejects_wrong_widths() {
        assert_eq!(Fields::new().push(0, 16).push(0, 15).finish(), Err(EncodeError::Width(31)));
        assert_eq!(
            Fields::new().push(0, 16).push(0, 16).push(1, 1).finish(),
            Err(EncodeError::Width(33))
        );
        assert_eq!(Fields::new().push(0xABCD, 16).push(0x1234, 16).finish(), Ok(0xABCD_1234));
    }

    #[test]
    fn field_buffer_masks_to_width() {
        assert_eq!(Fields::new().push(0xFFFF_FFFF, 4).push(0, 28).finish(), Ok(0xF000_0000));
    }

    #[test]
    fn add_immediate_matches_reference() {
        let w = encode_dp(DpOp::Add, r("r1"), r("r2"), Operand2::Imm(5)).unwrap();
        assert_eq!(w, 0xE282_1005);
        assert_eq!(w >> 28, COND_AL);
        assert_eq!((w >> 25) & 1, 1);
        assert_eq!((w >> 21) & 0xF, DpOp::Add.opcode());
        assert_eq!(w & 0xFF, 0b0000_0101);
    }

    #[test]
    fn nop_is_mov_zero_zero() {
        let w = encode_dp(DpOp::Mov, Reg::ZERO, Reg::ZERO, Operand2::Reg(Reg::ZERO)).unwrap();
        assert_eq!(w, NOP);
    }

    #[test]
    fn immediate_range() {
        assert!(encode_dp(DpOp::Mov, r("r1"), Reg::ZERO, Operand2::Imm(255)).is_ok());
        assert_eq!(
            encode_dp(DpOp::Mov, r("r1"), Reg::ZERO, Operand2::Imm(256)),
            Err(EncodeError::Immediate { value: 256, bits: 8 })
        );
        assert!(encode_ls(true, r("r1"), Reg::SP, -255, false).is_ok());
        assert!(encode_ls(true, r("r1"), Reg::SP, 256, false).is_err());
    }

    #[test]
    fn load_store_direction_and_modes() {
        assert_eq!(encode_ls(true, r("r3"), Reg::FP, -8, false).unwrap(), 0xE71D_3008);
        assert_eq!(encode_ls(false, r("r3"), Reg::FP, -8, false).unwrap(), 0xE72D_3008);
        assert_eq!(encode_ls(true, r("r3"), Reg::SP, 4, false).unwrap(), 0xE79C_3004);
        assert_eq!(encode_ls(false, Reg::FP, Reg::SP, 0, true).unwrap(), 0xE78C_D000);
        assert_eq!(encode_ls(true, Reg::FP, Reg::SP, 0, true).unwrap(), 0xE7BC_D000);
    }

    #[test]
    fn branches() {
        assert_eq!(encode_branch(BranchKind::Always, -1).unwrap(), 0xEA00_FFFF);
        assert_eq!(encode_branch(BranchKind::IfZero(Reg::LT_AB), 3).unwrap(), 0xEB0A_0003);
        assert_eq!(encode_branch(BranchKind::IfNonZero(Reg::LT_BA), -7).unwrap(), 0xEB1B_0FF9);
        assert_eq!(
            encode_branch(BranchKind::IfZero(Reg::LT_AB), 2048),
            Err(EncodeError::Displacement { disp: 2048, bits: 12 })
        );
        assert!(encode_branch(BranchKind::Always, -32768).is_ok());
        assert!(encode_branch(BranchKind::Always, 32768).is_err());
        assert_eq!(displacement(5, 10), -7);
    }

    #[test]
    fn bx_lr() {
        assert_eq!(encode_bx(Reg::LR).unwrap(), 0xE12F_FF1E);
    }

    #[test]
    fn word_split() {
        assert_eq!(split_word(0x1234_5678).unwrap(), (0, 0x1234_5678));
        assert_eq!(split_word(0x1_0000_0002).unwrap(), (1, 2));
        assert_eq!(split_word(-1).unwrap(), (0xFFFF_FFFF, 0xFFFF_FFFF));
        assert!(split_word(1i128 << 64).is_err());
        assert_eq!(
            encode_word(&WordOperand::Symbol(".LC0".into())).unwrap(),
            WordDirective::Boundary(".LC0".into())
        );
    }
}
