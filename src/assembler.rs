//! The assembly session: pass 1 (label collection), the forward encoding pass
//! with hazard padding, and pass 2 (deferred branch patching).

use tracing::{debug, info};

use crate::config::{AsmConfig, PadPolicy};
use crate::encoder::{
    displacement, encode_branch, encode_bx, encode_dp, encode_ls, encode_word, BranchKind,
    Operand2, WordDirective, NOP,
};
use crate::error::{AsmError, EncodeError, OperandError};
use crate::expand::{expand, Prim};
use crate::output::{Program, Sequencer};
use crate::parser::{SourceLine, Statement};
use crate::symbols::{self, Binding, SymbolTable};
use crate::tables::{Class, DpOp, MnemonicDesc, Reg};

/// A branch emitted before its target label was bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBranch {
    pub line: SourceLine,
    /// Output position of the placeholder word.
    pub position: usize,
    /// Address the branch itself occupies.
    pub pc: u32,
    pub kind: BranchKind,
    pub label: String,
}

#[derive(Debug)]
pub struct Assembler {
    cfg: AsmConfig,
    pc: u32,
    data_addr: u32,
    seq: Sequencer,
    symbols: SymbolTable,
    pending: Vec<PendingBranch>,
    /// Set by `cmp`, kept across conditional branches, cleared by anything else.
    compare_live: bool,
    data_boundary: Option<String>,
}

impl Assembler {
    pub fn new(cfg: AsmConfig) -> Result<Self, AsmError> {
        cfg.validate()?;
        Ok(Self {
            pc: cfg.text_start,
            data_addr: cfg.data_start,
            seq: Sequencer::default(),
            symbols: SymbolTable::default(),
            pending: Vec::new(),
            compare_live: false,
            data_boundary: None,
            cfg,
        })
    }

    pub fn config(&self) -> &AsmConfig {
        &self.cfg
    }

    /// Next instruction address.
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Next data address.
    pub fn data_addr(&self) -> u32 {
        self.data_addr
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn pending(&self) -> &[PendingBranch] {
        &self.pending
    }

    /// Runs both passes and returns the finished program.
    pub fn run(mut self, lines: &[SourceLine]) -> Result<Program, AsmError> {
        self.forward(lines)?;
        self.resolve()?;
        Ok(self.finish())
    }

    /// Label collection followed by the forward encoding pass. Branches to
    /// labels not yet bound are left as placeholders in [`Self::pending`].
    pub fn forward(&mut self, lines: &[SourceLine]) -> Result<(), AsmError> {
        let stmts = lines
            .iter()
            .map(|l| Statement::parse(l).map(|s| (l.clone(), s)))
            .collect::<Result<Vec<_>, _>>()?;
        self.symbols = symbols::collect(&stmts, self.cfg.data_start)?;

        if self.cfg.prologue {
            self.prologue()?;
        }

        for (i, (line, stmt)) in stmts.iter().enumerate() {
            self.bind(i);
            match stmt {
                Statement::Label(_) => self.compare_live = false,
                Statement::Word(operand) => {
                    self.compare_live = false;
                    match encode_word(operand).map_err(|e| line.encode_err(e))? {
                        WordDirective::Write { high, low } => {
                            debug!(addr = self.data_addr, high, low, text = %line.text, "data");
                            self.seq.push_data(self.data_addr, high, low);
                            self.data_addr = self
                                .data_addr
                                .checked_add(1)
                                .ok_or_else(|| line.overflow("data"))?;
                        }
                        WordDirective::Boundary(label) => {
                            debug!(line = line.index, %label, "data section boundary");
                            self.data_boundary.get_or_insert(label);
                        }
                    }
                }
                Statement::Instr { desc, operands } => {
                    self.check_compare(line, desc)?;
                    for prim in expand(line, desc, operands, &self.symbols)? {
                        self.emit(line, prim)?;
                    }
                }
            }
        }
        // trailing labels bind just past the last word
        self.bind(stmts.len());
        Ok(())
    }

    /// Patches every placeholder branch. Returns how many were patched.
    pub fn resolve(&mut self) -> Result<usize, AsmError> {
        let pending = std::mem::take(&mut self.pending);
        for p in &pending {
            let target = match self.symbols.get(&p.label) {
                Some(Binding::Code { pc, .. }) => *pc,
                Some(Binding::Data { .. } | Binding::Pointer { .. }) => {
                    return Err(p
                        .line
                        .operand_err(OperandError::NotCodeLabel(p.label.clone())))
                }
                None => return Err(p.line.unresolved(&p.label)),
            };
            let disp = displacement(target, p.pc);
            let word = encode_branch(p.kind, disp).map_err(|e| p.line.encode_err(e))?;
            self.seq.patch(p.position, word);
            debug!(pc = p.pc, position = p.position, label = %p.label, disp, "patched branch");
        }
        Ok(pending.len())
    }

    pub fn finish(self) -> Program {
        info!(
            instructions = self.pc - self.cfg.text_start,
            data = self.data_addr - self.cfg.data_start,
            labels = self.symbols.iter().count(),
            "assembled"
        );
        self.seq.finish(self.symbols, self.data_boundary)
    }

    fn bind(&mut self, stmt: usize) {
        let names = self.symbols.bind_waiting(stmt, self.pc, self.seq.next_position());
        if !names.is_empty() {
            debug!(pc = self.pc, ?names, "bound code labels");
        }
    }

    fn prologue(&mut self) -> Result<(), AsmError> {
        let line = SourceLine::new(0, "<prologue>");
        let ws = self.cfg.workspace_base;
        for (rd, value) in [(Reg::SP, ws), (Reg::FP, ws), (Reg::LR, 0)] {
            let prim = Prim::Dp {
                op: DpOp::Mov,
                rd,
                rn: Reg::ZERO,
                operand: Operand2::Imm(value),
            };
            self.emit(&line, prim)?;
        }
        Ok(())
    }

    fn check_compare(&mut self, line: &SourceLine, desc: &MnemonicDesc) -> Result<(), AsmError> {
        match desc.class {
            Class::Compare => self.compare_live = true,
            Class::CondBranch => {
                if self.cfg.strict_compare && !self.compare_live {
                    return Err(AsmError::BranchWithoutCompare {
                        line: line.index,
                        text: line.text.clone(),
                    });
                }
            }
            _ => self.compare_live = false,
        }
        Ok(())
    }

    fn emit(&mut self, line: &SourceLine, prim: Prim) -> Result<(), AsmError> {
        let word = match &prim {
            Prim::Dp { op, rd, rn, operand } => encode_dp(*op, *rd, *rn, *operand),
            Prim::Mem {
                load,
                value,
                base,
                offset,
                writeback,
            } => encode_ls(*load, *value, *base, *offset, *writeback),
            Prim::Branch { kind, target } => self.branch_word(line, *kind, target)?,
            Prim::Bx(rm) => encode_bx(*rm),
            Prim::Nop => Ok(NOP),
        }
        .map_err(|e| line.encode_err(e))?;
        self.push_word(line, word)?;

        let padded = match self.cfg.pad_policy {
            PadPolicy::All => true,
            PadPolicy::Writes => prim.writes_register(),
        };
        if padded {
            for _ in 0..self.cfg.hazard_pad {
                self.push_word(line, NOP)?;
            }
        }
        Ok(())
    }

    /// Encodes a branch against a bound label, or records it and returns a
    /// zero-displacement placeholder.
    fn branch_word(
        &mut self,
        line: &SourceLine,
        kind: BranchKind,
        target: &str,
    ) -> Result<Result<u32, EncodeError>, AsmError> {
        match self.symbols.get(target) {
            Some(Binding::Code { pc, .. }) => Ok(encode_branch(kind, displacement(*pc, self.pc))),
            Some(Binding::Data { .. } | Binding::Pointer { .. }) => {
                Err(line.operand_err(OperandError::NotCodeLabel(target.to_string())))
            }
            None => {
                debug!(pc = self.pc, label = target, "forward branch");
                self.pending.push(PendingBranch {
                    line: line.clone(),
                    position: self.seq.next_position(),
                    pc: self.pc,
                    kind,
                    label: target.to_string(),
                });
                Ok(encode_branch(kind, 0))
            }
        }
    }

    fn push_word(&mut self, line: &SourceLine, word: u32) -> Result<(), AsmError> {
        let position = self.seq.push_instr(self.pc, word);
        debug!(pc = self.pc, position, word = format_args!("{word:#010x}"), text = %line.text, "instr");
        self.pc = self
            .pc
            .checked_add(1)
            .ok_or_else(|| line.overflow("instruction"))?;
        Ok(())
    }
}

/// Assembles raw source lines with `cfg`. Blank lines are skipped but still
/// count for line numbers.
pub fn assemble<S: AsRef<str>>(cfg: AsmConfig, lines: &[S]) -> Result<Program, AsmError> {
    Assembler::new(cfg)?.run(&SourceLine::numbered(lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn bare() -> AsmConfig {
        AsmConfig {
            hazard_pad: 0,
            prologue: false,
            ..AsmConfig::default()
        }
    }

    #[test]
    fn forward_branch_is_placeholder_until_resolved() {
        let lines = SourceLine::numbered(&["b .L1", "nop", ".L1:", "nop"]);
        let mut asm = Assembler::new(bare()).unwrap();
        asm.forward(&lines).unwrap();
        assert_eq!(asm.pending().len(), 1);
        assert_eq!(asm.pending()[0].pc, 0);
        assert_eq!(asm.pending()[0].label, ".L1");
        assert_eq!(asm.resolve().unwrap(), 1);
        assert!(asm.pending().is_empty());
        let prog = asm.finish();
        // target 2, pc 0: 2 - 0 - 2
        assert_eq!(prog.instructions().next(), Some((0, 0xEA00_0000)));
        assert_eq!(prog.symbols().code(".L1"), Some(2));
    }

    #[test]
    fn padding_policies() {
        let src = ["mov r1, #1", "str r1, [sp]", "bx lr"];
        let all = assemble(AsmConfig { hazard_pad: 2, ..bare() }, &src).unwrap();
        assert_eq!(all.instructions().count(), 9);
        let writes = assemble(
            AsmConfig {
                hazard_pad: 2,
                pad_policy: PadPolicy::Writes,
                ..bare()
            },
            &src,
        )
        .unwrap();
        assert_eq!(writes.instructions().count(), 5);
    }

    #[test]
    fn prologue_comes_first() {
        let cfg = AsmConfig {
            workspace_base: 0x40,
            hazard_pad: 0,
            ..AsmConfig::default()
        };
        let prog = assemble(cfg, &["nop"]).unwrap();
        let words: Vec<u32> = prog.instructions().map(|(_, w)| w).collect();
        assert_eq!(words, vec![0xE3A0_C040, 0xE3A0_D040, 0xE3A0_E000, NOP]);
    }

    #[test]
    fn compare_must_precede_conditional_branch() {
        let src = ["top:", "cmp r1, r2", "bge top", "blt top", "mov r1, #0", "bgt top"];
        match assemble(bare(), &src) {
            Err(AsmError::BranchWithoutCompare { line, .. }) => assert_eq!(line, 5),
            other => panic!("unexpected {other:?}"),
        }
        let relaxed = AsmConfig {
            strict_compare: false,
            ..bare()
        };
        assert!(assemble(relaxed, &src).is_ok());
    }

    #[test]
    fn counters_start_at_configured_offsets() {
        let cfg = AsmConfig {
            text_start: 100,
            data_start: 8,
            ..bare()
        };
        let mut asm = Assembler::new(cfg).unwrap();
        asm.forward(&SourceLine::numbered(&[".LC0:", ".word 7", "ldr r1, .LC0"]))
            .unwrap();
        assert_eq!((asm.pc(), asm.data_addr()), (101, 9));
        let prog = asm.finish();
        assert_eq!(prog.data().collect::<Vec<_>>(), vec![(8, 0, 7)]);
        // base r0, offset 8
        assert_eq!(prog.instructions().collect::<Vec<_>>(), vec![(100, 0xE790_1008)]);
    }

    #[test]
    fn counters_stop_at_the_top_of_the_address_space() {
        let text = AsmConfig {
            text_start: u32::MAX,
            ..bare()
        };
        assert_eq!(
            assemble(text, &["nop", "nop"]).unwrap_err(),
            AsmError::AddressOverflow {
                line: 0,
                text: "nop".into(),
                space: "instruction",
            }
        );
        let data = AsmConfig {
            data_start: u32::MAX,
            ..bare()
        };
        assert!(matches!(
            assemble(data, &[".word 1", ".word 2"]),
            Err(AsmError::AddressOverflow { space: "data", .. })
        ));
        let near = AsmConfig {
            text_start: u32::MAX - 2,
            ..bare()
        };
        assert_eq!(assemble(near, &["nop", "nop"]).unwrap().instructions().count(), 2);
    }

    #[test]
    fn branch_to_pool_entry_is_rejected() {
        let err = assemble(bare(), &[".LC0:", ".word 1", ".L3:", ".word .LC0", "b .L3"]).unwrap_err();
        assert!(matches!(
            err,
            AsmError::MalformedOperand { source: OperandError::NotCodeLabel(_), .. }
        ));
    }

    #[test]
    fn branch_to_data_label_is_rejected() {
        let err = assemble(bare(), &[".LC0:", ".word 1", "b .LC0"]).unwrap_err();
        assert!(matches!(
            err,
            AsmError::MalformedOperand { source: OperandError::NotCodeLabel(_), .. }
        ));
    }
}
