//! Rewrites one source instruction into the queue of primitive requests the
//! encoder understands. Composite mnemonics (register lists, compare, shifts
//! by immediate, writeback addressing) become several primitives; simple ones
//! become one.

use std::collections::VecDeque;

use crate::encoder::{BranchKind, Operand2, IMM_BITS};
use crate::error::{AsmError, EncodeError, OperandError};
use crate::parser::{Index, Operand, SourceLine};
use crate::symbols::SymbolTable;
use crate::tables::{DpOp, Mnemonic, MnemonicDesc, Reg};

/// Bytes per stacked register.
const SLOT: i64 = 4;

/// A single instruction word request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prim {
    Dp {
        op: DpOp,
        rd: Reg,
        rn: Reg,
        operand: Operand2,
    },
    Mem {
        load: bool,
        value: Reg,
        base: Reg,
        offset: i64,
        writeback: bool,
    },
    Branch {
        kind: BranchKind,
        target: String,
    },
    Bx(Reg),
    Nop,
}

impl Prim {
    /// Whether the instruction writes a general register when it retires.
    pub fn writes_register(&self) -> bool {
        match self {
            Prim::Dp { .. } => true,
            Prim::Mem { load, .. } => *load,
            Prim::Branch { .. } | Prim::Bx(_) | Prim::Nop => false,
        }
    }
}

fn shape(expected: &'static str) -> OperandError {
    OperandError::Shape { expected }
}

/// `base ± |delta|` as an add or sub immediate.
fn adjust(base: Reg, delta: i64) -> Prim {
    let op = if delta < 0 { DpOp::Sub } else { DpOp::Add };
    let magnitude = u32::try_from(delta.unsigned_abs()).unwrap_or(u32::MAX);
    Prim::Dp {
        op,
        rd: base,
        rn: base,
        operand: Operand2::Imm(magnitude),
    }
}

fn imm(line: &SourceLine, v: i64) -> Result<u32, AsmError> {
    u32::try_from(v).map_err(|_| {
        line.encode_err(EncodeError::Immediate {
            value: v,
            bits: IMM_BITS,
        })
    })
}

fn operand2(line: &SourceLine, op: &Operand) -> Result<Operand2, AsmError> {
    match op {
        Operand::Reg(r) => Ok(Operand2::Reg(*r)),
        Operand::Imm(v) => Ok(Operand2::Imm(imm(line, *v)?)),
        _ => Err(line.operand_err(shape("register or #immediate"))),
    }
}

pub fn expand(
    line: &SourceLine,
    desc: &MnemonicDesc,
    operands: &[Operand],
    symbols: &SymbolTable,
) -> Result<VecDeque<Prim>, AsmError> {
    let err = |e: OperandError| line.operand_err(e);
    let mut q = VecDeque::new();
    match desc.op {
        Mnemonic::Add | Mnemonic::Sub => {
            let (rd, rn, src) = match operands {
                [Operand::Reg(rd), Operand::Reg(rn), src] => (*rd, *rn, src),
                [Operand::Reg(rd), src] => (*rd, *rd, src),
                _ => return Err(err(shape("rd, rn, register or #immediate"))),
            };
            let mut op = if desc.op == Mnemonic::Add { DpOp::Add } else { DpOp::Sub };
            let operand = match src {
                Operand::Imm(v) if *v < 0 => {
                    op = if op == DpOp::Add { DpOp::Sub } else { DpOp::Add };
                    Operand2::Imm(imm(line, v.saturating_neg())?)
                }
                other => operand2(line, other)?,
            };
            q.push_back(Prim::Dp { op, rd, rn, operand });
        }
        Mnemonic::Mov => match operands {
            [Operand::Reg(rd), src] => q.push_back(Prim::Dp {
                op: DpOp::Mov,
                rd: *rd,
                rn: Reg::ZERO,
                operand: operand2(line, src)?,
            }),
            _ => return Err(err(shape("rd, register or #immediate"))),
        },
        Mnemonic::Lsl => match operands {
            [Operand::Reg(rd), Operand::Reg(rn), Operand::Reg(rm)] => q.push_back(Prim::Dp {
                op: DpOp::Lsl,
                rd: *rd,
                rn: *rn,
                operand: Operand2::Reg(*rm),
            }),
            // the ALU only shifts by a register
            [Operand::Reg(rd), Operand::Reg(rn), amount @ Operand::Imm(_)] => {
                q.push_back(Prim::Dp {
                    op: DpOp::Mov,
                    rd: Reg::SCRATCH,
                    rn: Reg::ZERO,
                    operand: operand2(line, amount)?,
                });
                q.push_back(Prim::Dp {
                    op: DpOp::Lsl,
                    rd: *rd,
                    rn: *rn,
                    operand: Operand2::Reg(Reg::SCRATCH),
                });
            }
            _ => return Err(err(shape("rd, rn, register or #immediate"))),
        },
        Mnemonic::Cmp => {
            let (a, b) = match operands {
                [Operand::Reg(a), Operand::Reg(b)] => (*a, *b),
                [Operand::Reg(a), imm @ Operand::Imm(_)] => {
                    q.push_back(Prim::Dp {
                        op: DpOp::Mov,
                        rd: Reg::SCRATCH,
                        rn: Reg::ZERO,
                        operand: operand2(line, imm)?,
                    });
                    (*a, Reg::SCRATCH)
                }
                _ => return Err(err(shape("ra, register or #immediate"))),
            };
            q.push_back(slt(Reg::LT_AB, a, b));
            q.push_back(slt(Reg::LT_BA, b, a));
        }
        Mnemonic::Ldr | Mnemonic::Str => {
            let load = desc.op == Mnemonic::Ldr;
            single_transfer(load, operands, symbols, line, &mut q)?;
        }
        Mnemonic::Push => {
            let regs = reg_list(operands, 0).map_err(err)?;
            // highest offset first so the first listed register lands lowest
            for (k, r) in regs.iter().rev().enumerate() {
                q.push_back(Prim::Mem {
                    load: false,
                    value: *r,
                    base: Reg::SP,
                    offset: -SLOT * (k as i64 + 1),
                    writeback: false,
                });
            }
            q.push_back(adjust(Reg::SP, -SLOT * regs.len() as i64));
        }
        Mnemonic::Pop => {
            let regs = reg_list(operands, 0).map_err(err)?;
            for (k, r) in regs.iter().enumerate() {
                q.push_back(Prim::Mem {
                    load: true,
                    value: *r,
                    base: Reg::SP,
                    offset: SLOT * k as i64,
                    writeback: false,
                });
            }
            q.push_back(adjust(Reg::SP, SLOT * regs.len() as i64));
        }
        Mnemonic::Ldm | Mnemonic::Stm => {
            let (base, writeback) = match operands.first() {
                Some(Operand::Reg(b)) => (*b, false),
                Some(Operand::RegWriteback(b)) => (*b, true),
                _ => return Err(err(shape("base[!], {register list}"))),
            };
            let regs = reg_list(operands, 1).map_err(err)?;
            for (k, r) in regs.iter().enumerate() {
                q.push_back(Prim::Mem {
                    load: desc.op == Mnemonic::Ldm,
                    value: *r,
                    base,
                    offset: SLOT * k as i64,
                    writeback: false,
                });
            }
            if writeback {
                q.push_back(adjust(base, SLOT * regs.len() as i64));
            }
        }
        Mnemonic::B | Mnemonic::Bge | Mnemonic::Ble | Mnemonic::Blt | Mnemonic::Bgt => {
            let target = match operands {
                [Operand::Label(l)] => l.clone(),
                _ => return Err(err(shape("label"))),
            };
            let kind = match desc.op {
                Mnemonic::Bge => BranchKind::IfZero(Reg::LT_AB),
                Mnemonic::Ble => BranchKind::IfZero(Reg::LT_BA),
                Mnemonic::Blt => BranchKind::IfNonZero(Reg::LT_AB),
                Mnemonic::Bgt => BranchKind::IfNonZero(Reg::LT_BA),
                _ => BranchKind::Always,
            };
            q.push_back(Prim::Branch { kind, target });
        }
        Mnemonic::Bx => match operands {
            [Operand::Reg(r)] => q.push_back(Prim::Bx(*r)),
            _ => return Err(err(shape("register"))),
        },
        Mnemonic::Nop => match operands {
            [] => q.push_back(Prim::Nop),
            _ => return Err(err(shape("no operands"))),
        },
        Mnemonic::Word => return Err(err(shape("instruction, not a data directive"))),
    }
    Ok(q)
}

fn slt(rd: Reg, a: Reg, b: Reg) -> Prim {
    Prim::Dp {
        op: DpOp::Slt,
        rd,
        rn: a,
        operand: Operand2::Reg(b),
    }
}

fn reg_list(operands: &[Operand], at: usize) -> Result<&[Reg], OperandError> {
    match (operands.get(at), operands.len() == at + 1) {
        (Some(Operand::RegList(regs)), true) => Ok(regs),
        _ => Err(shape("{register list}")),
    }
}

fn single_transfer(
    load: bool,
    operands: &[Operand],
    symbols: &SymbolTable,
    line: &SourceLine,
    q: &mut VecDeque<Prim>,
) -> Result<(), AsmError> {
    let value = match operands.first() {
        Some(Operand::Reg(r)) => *r,
        _ => return Err(line.operand_err(shape("rd, memory operand"))),
    };
    let mem = |base: Reg, offset: i64, writeback: bool| Prim::Mem {
        load,
        value,
        base,
        offset,
        writeback,
    };
    match &operands[1..] {
        [Operand::Mem { base, offset, index: Index::Pre, .. }] => {
            q.push_back(mem(*base, *offset, false));
        }
        // pre-indexed writeback: move the base first, then access at +0
        [Operand::Mem { base, offset, index: Index::PreWriteback, .. }] => {
            q.push_back(adjust(*base, *offset));
            q.push_back(mem(*base, 0, true));
        }
        // post-indexed: access at +0, then move the base
        [Operand::Mem { base, explicit: false, index: Index::Pre, .. }, Operand::Imm(step)] => {
            q.push_back(mem(*base, 0, true));
            q.push_back(adjust(*base, *step));
        }
        [Operand::Label(name)] => {
            let data_addr = |label: &str| match symbols.data(label) {
                Some(addr) => Ok(addr),
                // data labels are all bound in pass 1
                None if symbols.is_declared(label) => {
                    Err(line.operand_err(OperandError::NotDataLabel(label.to_string())))
                }
                None => Err(line.unresolved(label)),
            };
            match symbols.pointer(name) {
                // a pool entry holds its target's address, so loading it is a move
                Some(target) if load => q.push_back(Prim::Dp {
                    op: DpOp::Mov,
                    rd: value,
                    rn: Reg::ZERO,
                    operand: Operand2::Imm(data_addr(target)?),
                }),
                Some(_) => return Err(line.operand_err(OperandError::NotDataLabel(name.clone()))),
                // the zero register as base makes the offset an absolute address
                None => q.push_back(mem(Reg::ZERO, data_addr(name)? as i64, false)),
            }
        }
        _ => return Err(line.operand_err(shape("[base, #offset], [base, #offset]!, [base], #offset or a data label"))),
    }
    Ok(())
}
