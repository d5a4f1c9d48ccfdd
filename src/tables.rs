//! Static mnemonic and register tables plus the fixed bit constants of the
//! instruction formats.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition field: execute unconditionally.
pub const COND_AL: u32 = 0b1110;
/// Rotate field; the dialect never rotates immediates.
pub const ROT: u32 = 0b0000;
/// Flag-setting bit of data-processing words; there is no flag register.
pub const S_BIT: u32 = 0;

pub const DP_PREFIX: u32 = 0b00;
pub const LS_PREFIX: u32 = 0b01;

/// Unconditional branch class nibble.
pub const B_CLASS: u32 = 0b1010;
/// Conditional branch opcodes (8 bits after the condition).
pub const BZ_OPCODE: u32 = 0b1011_0000;
pub const BNZ_OPCODE: u32 = 0b1011_0001;

/// Fixed bit pattern of BX between the condition and the operand register.
pub const BX_OPCODE: u32 = 0b0001_0010;
pub const BX_SBO: u32 = 0xFFF;
pub const BX_TAIL: u32 = 0b0001;

/// A 4-bit register code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reg(u8);

impl Reg {
    pub const R0: Reg = Reg(0);
    pub const R8: Reg = Reg(8);
    pub const R9: Reg = Reg(9);
    pub const R10: Reg = Reg(10);
    pub const R11: Reg = Reg(11);
    pub const SP: Reg = Reg(12);
    pub const FP: Reg = Reg(13);
    pub const LR: Reg = Reg(14);
    pub const IP: Reg = Reg(15);

    /// Hard-wired zero register; reads always return 0.
    pub const ZERO: Reg = Reg::R0;
    /// Stand-in for every `r0` written in source text.
    pub const ZERO_ALIAS: Reg = Reg::R8;
    /// Scratch for immediates the ALU can only take as a register.
    pub const SCRATCH: Reg = Reg::R9;
    /// Compare result: first operand less than second.
    pub const LT_AB: Reg = Reg::R10;
    /// Compare result: second operand less than first.
    pub const LT_BA: Reg = Reg::R11;

    pub fn from_code(code: u8) -> Option<Reg> {
        (code < 16).then_some(Reg(code))
    }

    pub fn code(self) -> u32 {
        self.0 as u32
    }

    pub fn name(self) -> &'static str {
        REGISTERS[self.0 as usize].0
    }

    /// Looks a register up by table name, ignoring ASCII case.
    pub fn lookup(name: &str) -> Option<Reg> {
        REGISTERS
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, r)| r)
    }

    /// Registers owned by the assembler; source text may not name them.
    pub fn is_reserved(self) -> bool {
        matches!(self, Reg::R8 | Reg::R9 | Reg::R10 | Reg::R11)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Register name to code, indexed by code.
pub const REGISTERS: [(&str, Reg); 16] = [
    ("r0", Reg(0)),
    ("r1", Reg(1)),
    ("r2", Reg(2)),
    ("r3", Reg(3)),
    ("r4", Reg(4)),
    ("r5", Reg(5)),
    ("r6", Reg(6)),
    ("r7", Reg(7)),
    ("r8", Reg(8)),
    ("r9", Reg(9)),
    ("r10", Reg(10)),
    ("r11", Reg(11)),
    ("sp", Reg(12)),
    ("fp", Reg(13)),
    ("lr", Reg(14)),
    ("ip", Reg(15)),
];

/// Data-processing operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DpOp {
    Add,
    Sub,
    Lsl,
    Slt,
    Mov,
}

impl DpOp {
    pub fn opcode(self) -> u32 {
        match self {
            DpOp::Add => 0b0100,
            DpOp::Sub => 0b0101,
            DpOp::Lsl => 0b0110,
            DpOp::Slt => 0b1010,
            DpOp::Mov => 0b1101,
        }
    }

    pub fn from_opcode(op: u32) -> Option<DpOp> {
        Some(match op {
            0b0100 => DpOp::Add,
            0b0101 => DpOp::Sub,
            0b0110 => DpOp::Lsl,
            0b1010 => DpOp::Slt,
            0b1101 => DpOp::Mov,
            _ => return None,
        })
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            DpOp::Add => "add",
            DpOp::Sub => "sub",
            DpOp::Lsl => "lsl",
            DpOp::Slt => "slt",
            DpOp::Mov => "mov",
        }
    }
}

/// Load/store sub-mode (byte/word/writeback/load field), as wired in hardware.
pub fn ls_mode(load: bool, writeback: bool) -> u32 {
    match (load, writeback) {
        (true, false) => 0b001,
        (true, true) => 0b011,
        (false, true) => 0b000,
        (false, false) => 0b010,
    }
}

/// Inverse of [`ls_mode`]: `(load, writeback)`.
pub fn ls_mode_decode(mode: u32) -> Option<(bool, bool)> {
    Some(match mode {
        0b001 => (true, false),
        0b011 => (true, true),
        0b000 => (false, true),
        0b010 => (false, false),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mnemonic {
    Word,
    Add,
    Sub,
    Mov,
    Lsl,
    Cmp,
    Ldr,
    Str,
    Push,
    Pop,
    Ldm,
    Stm,
    B,
    Bge,
    Ble,
    Blt,
    Bgt,
    Bx,
    Nop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Class {
    Data,
    DataProc,
    Compare,
    LoadStore,
    Stack,
    Block,
    Branch,
    CondBranch,
    BranchExchange,
    Nop,
}

/// Which device directive a mnemonic ultimately produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectiveKind {
    DmemWrite,
    ImemWrite,
}

#[derive(Debug, Clone, Copy)]
pub struct MnemonicDesc {
    pub op: Mnemonic,
    pub mnemonic: &'static str,
    pub class: Class,
    pub directive: DirectiveKind,
}

const fn desc(mnemonic: &'static str, op: Mnemonic, class: Class) -> MnemonicDesc {
    let directive = match class {
        Class::Data => DirectiveKind::DmemWrite,
        _ => DirectiveKind::ImemWrite,
    };
    MnemonicDesc {
        op,
        mnemonic,
        class,
        directive,
    }
}

pub const TABLE: &[MnemonicDesc] = &[
    desc(".word", Mnemonic::Word, Class::Data),
    desc("add", Mnemonic::Add, Class::DataProc),
    desc("sub", Mnemonic::Sub, Class::DataProc),
    desc("mov", Mnemonic::Mov, Class::DataProc),
    desc("lsl", Mnemonic::Lsl, Class::DataProc),
    desc("cmp", Mnemonic::Cmp, Class::Compare),
    desc("ldr", Mnemonic::Ldr, Class::LoadStore),
    desc("str", Mnemonic::Str, Class::LoadStore),
    desc("push", Mnemonic::Push, Class::Stack),
    desc("pop", Mnemonic::Pop, Class::Stack),
    desc("ldm", Mnemonic::Ldm, Class::Block),
    desc("ldmia", Mnemonic::Ldm, Class::Block),
    desc("stm", Mnemonic::Stm, Class::Block),
    desc("stmia", Mnemonic::Stm, Class::Block),
    desc("b", Mnemonic::B, Class::Branch),
    desc("bge", Mnemonic::Bge, Class::CondBranch),
    desc("ble", Mnemonic::Ble, Class::CondBranch),
    desc("blt", Mnemonic::Blt, Class::CondBranch),
    desc("bgt", Mnemonic::Bgt, Class::CondBranch),
    desc("bx", Mnemonic::Bx, Class::BranchExchange),
    desc("nop", Mnemonic::Nop, Class::Nop),
];

pub fn lookup(mnemonic: &str) -> Option<&'static MnemonicDesc> {
    TABLE
        .iter()
        .find(|d| d.mnemonic.eq_ignore_ascii_case(mnemonic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn register_codes_are_a_bijection() {
        let codes: HashSet<u32> = REGISTERS.iter().map(|(_, r)| r.code()).collect();
        assert_eq!(codes.len(), 16);
        assert!(codes.iter().all(|&c| c < 16));
        let names: HashSet<&str> = REGISTERS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), 16);
        for (i, (name, reg)) in REGISTERS.iter().enumerate() {
            assert_eq!(reg.code() as usize, i);
            assert_eq!(Reg::lookup(name), Some(*reg));
            assert_eq!(reg.name(), *name);
        }
    }

    #[test]
    fn one_entry_per_mnemonic() {
        let names: HashSet<&str> = TABLE.iter().map(|d| d.mnemonic).collect();
        assert_eq!(names.len(), TABLE.len());
        assert_eq!(lookup(".word").unwrap().directive, DirectiveKind::DmemWrite);
        assert_eq!(lookup("ldmia").unwrap().op, Mnemonic::Ldm);
        assert_eq!(lookup("PUSH").unwrap().class, Class::Stack);
        assert!(lookup("mul").is_none());
    }

    #[test]
    fn ls_mode_round_trips() {
        for load in [false, true] {
            for wb in [false, true] {
                assert_eq!(ls_mode_decode(ls_mode(load, wb)), Some((load, wb)));
            }
        }
    }
}
