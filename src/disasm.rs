use crate::decoder::{Decoded, Op};
use crate::encoder::BranchKind;
use crate::tables::{DpOp, Reg};

pub fn fmt_decoded(d: &Decoded) -> String {
    match d.op {
        Op::Nop => "nop".to_string(),
        Op::Dp(DpOp::Mov) => format!("mov {}, {}", d.rd, operand2(d)),
        Op::Dp(op) => format!("{} {}, {}, {}", op.mnemonic(), d.rd, d.rn, operand2(d)),
        Op::Ldr => mem("ldr", d),
        Op::Str => mem("str", d),
        Op::Branch(BranchKind::Always) => format!("b {:+}", d.imm),
        Op::Branch(BranchKind::IfZero(r)) => format!("bz {}, {:+}", r, d.imm),
        Op::Branch(BranchKind::IfNonZero(r)) => format!("bnz {}, {:+}", r, d.imm),
        Op::Bx => format!("bx {}", d.rm.unwrap_or(Reg::ZERO)),
    }
}

/// Same as [`fmt_decoded`] but shows branch targets as absolute addresses.
pub fn fmt_at(d: &Decoded, pc: u32) -> String {
    match d.op {
        Op::Branch(kind) => {
            let target = pc as i64 + d.imm as i64 + 2;
            match kind {
                BranchKind::Always => format!("b {target:#x}"),
                BranchKind::IfZero(r) => format!("bz {r}, {target:#x}"),
                BranchKind::IfNonZero(r) => format!("bnz {r}, {target:#x}"),
            }
        }
        _ => fmt_decoded(d),
    }
}

fn operand2(d: &Decoded) -> String {
    match d.rm {
        Some(rm) => rm.to_string(),
        None => format!("#{:#x}", d.imm),
    }
}

fn mem(mn: &str, d: &Decoded) -> String {
    let wb = if d.writeback { "!" } else { "" };
    if d.imm == 0 {
        format!("{} {}, [{}]{}", mn, d.rd, d.rn, wb)
    } else {
        format!("{} {}, [{}, #{}]{}", mn, d.rd, d.rn, d.imm, wb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{Decoder, PipeDecoder};

    #[test]
    fn renders_common_words() {
        let dec = PipeDecoder::new();
        let cases = [
            (0xE282_1005, "add r1, r2, #0x5"),
            (0xE1A0_3002, "mov r3, r2"),
            (0xE71D_3008, "ldr r3, [fp, #-8]"),
            (0xE78C_D000, "str fp, [sp]!"),
            (0xEB0A_0003, "bz r10, +3"),
            (0xE12F_FF1E, "bx lr"),
            (0xE1A0_0000, "nop"),
        ];
        for (raw, text) in cases {
            assert_eq!(fmt_decoded(&dec.decode(raw).unwrap()), text, "{raw:#010x}");
        }
        assert_eq!(fmt_at(&dec.decode(0xEA00_FFFF).unwrap(), 10), "b 0xb");
    }
}
