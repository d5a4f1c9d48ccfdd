//! Symbol table and the first pass that fills it.
//!
//! Data labels get their address during collection because data addresses
//! only depend on how many `.word` directives precede them. Code labels are
//! only scheduled: their instruction address is known once the line they
//! precede is encoded. A label on a `.word <label>` entry allocates nothing;
//! it names the address of the referenced data label.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::AsmError;
use crate::parser::{SourceLine, Statement, WordOperand};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Binding {
    Data { addr: u32 },
    Code { pc: u32, position: usize },
    /// Label on a `.word <target>` literal-pool entry.
    Pointer { target: String },
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    bound: HashMap<String, Binding>,
    /// Code labels waiting for the statement at this index.
    waiting: BTreeMap<usize, Vec<String>>,
    /// Line each label was declared on.
    declared: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bound.get(name)
    }

    /// Instruction address of a bound code label.
    pub fn code(&self, name: &str) -> Option<u32> {
        match self.bound.get(name)? {
            Binding::Code { pc, .. } => Some(*pc),
            Binding::Data { .. } | Binding::Pointer { .. } => None,
        }
    }

    pub fn data(&self, name: &str) -> Option<u32> {
        match self.bound.get(name)? {
            Binding::Data { addr } => Some(*addr),
            Binding::Code { .. } | Binding::Pointer { .. } => None,
        }
    }

    /// Data label a pointer label refers to.
    pub fn pointer(&self, name: &str) -> Option<&str> {
        match self.bound.get(name)? {
            Binding::Pointer { target } => Some(target),
            Binding::Data { .. } | Binding::Code { .. } => None,
        }
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    /// Binds every code label waiting on statement `stmt`. Returns the names
    /// bound.
    pub(crate) fn bind_waiting(&mut self, stmt: usize, pc: u32, position: usize) -> Vec<String> {
        let names = self.waiting.remove(&stmt).unwrap_or_default();
        for name in &names {
            self.bound
                .insert(name.clone(), Binding::Code { pc, position });
        }
        names
    }

    /// All bound labels, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        let mut v: Vec<_> = self.bound.iter().map(|(k, b)| (k.as_str(), b)).collect();
        v.sort_by(|a, b| a.0.cmp(b.0));
        v.into_iter()
    }

    /// Code labels keyed by address, for listings.
    pub fn code_labels(&self) -> BTreeMap<u32, Vec<String>> {
        let mut out: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for (name, b) in self.iter() {
            if let Binding::Code { pc, .. } = b {
                out.entry(*pc).or_default().push(name.to_string());
            }
        }
        out
    }
}

/// Pass 1. `stmts` are the parsed statements in source order; indices into
/// it identify the statement a code label waits for. A label with nothing
/// after it waits on `stmts.len()`, which the session binds at the end.
pub fn collect(stmts: &[(SourceLine, Statement)], data_start: u32) -> Result<SymbolTable, AsmError> {
    let mut table = SymbolTable::default();
    let mut data_addr = data_start;
    for (i, (line, stmt)) in stmts.iter().enumerate() {
        match stmt {
            Statement::Label(name) => {
                if let Some(&first) = table.declared.get(name) {
                    return Err(AsmError::DuplicateLabel {
                        line: line.index,
                        text: line.text.clone(),
                        label: name.clone(),
                        first,
                    });
                }
                table.declared.insert(name.clone(), line.index);
                let next = stmts[i + 1..]
                    .iter()
                    .position(|(_, s)| !matches!(s, Statement::Label(_)))
                    .map_or(stmts.len(), |off| i + 1 + off);
                let binding = match stmts.get(next) {
                    Some((_, Statement::Word(WordOperand::Symbol(target)))) => Binding::Pointer {
                        target: target.clone(),
                    },
                    Some((_, Statement::Word(WordOperand::Value(_)))) => Binding::Data { addr: data_addr },
                    _ => {
                        table.waiting.entry(next).or_default().push(name.clone());
                        continue;
                    }
                };
                table.bound.insert(name.clone(), binding);
            }
            Statement::Word(WordOperand::Value(_)) => {
                data_addr = data_addr.checked_add(1).ok_or_else(|| line.overflow("data"))?;
            }
            Statement::Word(WordOperand::Symbol(_)) | Statement::Instr { .. } => {}
        }
    }
    Ok(table)
}
