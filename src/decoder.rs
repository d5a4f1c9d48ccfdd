use serde::{Deserialize, Serialize};

use crate::encoder::{BranchKind, LsFlags, NOP};
use crate::tables::{
    self, DpOp, Reg, BNZ_OPCODE, BX_OPCODE, BX_SBO, BX_TAIL, B_CLASS, BZ_OPCODE, COND_AL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    Nop,
    Dp(DpOp),
    Ldr,
    Str,
    Branch(BranchKind),
    Bx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoded {
    pub op: Op,
    pub rd: Reg,
    pub rn: Reg,
    /// Register operand of register-mode data-processing and BX.
    pub rm: Option<Reg>,
    /// Immediate operand, signed load/store offset, or branch displacement.
    pub imm: i32,
    pub ls: Option<LsFlags>,
    pub writeback: bool,
}

pub trait Decoder {
    fn decode(&self, raw32: u32) -> Option<Decoded>;
}

/// Decoder for the words produced by [`crate::encoder`].
pub struct PipeDecoder;

impl PipeDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PipeDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn sign_ext(v: u32, bits: u32) -> i32 {
    let s = 32 - bits;
    ((v << s) as i32) >> s
}

#[inline]
fn reg(raw32: u32, shift: u32) -> Reg {
    // four-bit fields always name a register
    Reg::from_code(((raw32 >> shift) & 0xF) as u8).unwrap_or(Reg::ZERO)
}

impl Decoder for PipeDecoder {
    fn decode(&self, raw32: u32) -> Option<Decoded> {
        if raw32 >> 28 != COND_AL {
            return None;
        }
        let blank = Decoded {
            op: Op::Nop,
            rd: Reg::ZERO,
            rn: Reg::ZERO,
            rm: None,
            imm: 0,
            ls: None,
            writeback: false,
        };
        if raw32 == NOP {
            return Some(blank);
        }
        if (raw32 >> 4) & 0xFF_FFFF == (BX_OPCODE << 16) | (BX_SBO << 4) | BX_TAIL {
            return Some(Decoded {
                op: Op::Bx,
                rm: Some(reg(raw32, 0)),
                ..blank
            });
        }
        let op8 = (raw32 >> 20) & 0xFF;
        if (raw32 >> 24) & 0xF == B_CLASS {
            return Some(Decoded {
                op: Op::Branch(BranchKind::Always),
                imm: sign_ext(raw32 & 0xFFFF, 16),
                ..blank
            });
        }
        if op8 == BZ_OPCODE || op8 == BNZ_OPCODE {
            let r = reg(raw32, 16);
            let kind = if op8 == BZ_OPCODE {
                BranchKind::IfZero(r)
            } else {
                BranchKind::IfNonZero(r)
            };
            return Some(Decoded {
                op: Op::Branch(kind),
                rn: r,
                imm: sign_ext(raw32 & 0xFFF, 12),
                ..blank
            });
        }
        match (raw32 >> 26) & 0b11 {
            tables::DP_PREFIX => {
                if (raw32 >> 20) & 1 != 0 {
                    return None;
                }
                let dp = DpOp::from_opcode((raw32 >> 21) & 0xF)?;
                let imm_mode = (raw32 >> 25) & 1 == 1;
                if (raw32 >> 8) & 0xF != tables::ROT {
                    return None;
                }
                Some(Decoded {
                    op: Op::Dp(dp),
                    rn: reg(raw32, 16),
                    rd: reg(raw32, 12),
                    rm: (!imm_mode).then(|| reg(raw32, 0)),
                    imm: if imm_mode { (raw32 & 0xFF) as i32 } else { 0 },
                    ..blank
                })
            }
            tables::LS_PREFIX => {
                let flags = LsFlags::from_bits((raw32 >> 23) & 0b111)?;
                let (load, writeback) = tables::ls_mode_decode((raw32 >> 20) & 0b111)?;
                let magnitude = (raw32 & 0xFF) as i32;
                Some(Decoded {
                    op: if load { Op::Ldr } else { Op::Str },
                    rn: reg(raw32, 16),
                    rd: reg(raw32, 12),
                    imm: if flags.contains(LsFlags::UP) { magnitude } else { -magnitude },
                    ls: Some(flags),
                    writeback,
                    ..blank
                })
            }
            _ => None,
        }
    }
}
