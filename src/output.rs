//! Output records consumed by the transport layer, and the ordered program
//! that holds them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AsmError;
use crate::symbols::SymbolTable;

/// One directive for the device. `Display` renders the exact line format the
/// transport scripts expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputWord {
    DmemWrite { addr: u32, high: u32, low: u32 },
    DmemRead { addr: u32 },
    ImemWrite { addr: u32, word: u32 },
    PcReset,
    Step,
    Run { enable: bool },
}

impl fmt::Display for OutputWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputWord::DmemWrite { addr, high, low } => {
                write!(f, "dmem_write {addr} {high:#x} {low:#x}")
            }
            OutputWord::DmemRead { addr } => write!(f, "dmem_read {addr}"),
            OutputWord::ImemWrite { addr, word } => write!(f, "imem_write {addr} {word:#x}"),
            OutputWord::PcReset => f.write_str("pcreset"),
            OutputWord::Step => f.write_str("step"),
            OutputWord::Run { enable } => write!(f, "run {}", u8::from(*enable)),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("bad directive line `{0}`")]
pub struct ParseWordError(pub String);

fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

impl FromStr for OutputWord {
    type Err = ParseWordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseWordError(s.to_string());
        let toks: Vec<&str> = s.split_whitespace().collect();
        let num = |i: usize| toks.get(i).and_then(|t| parse_u32(t)).ok_or_else(bad);
        let word = match toks.first().copied() {
            Some("dmem_write") if toks.len() == 4 => OutputWord::DmemWrite {
                addr: num(1)?,
                high: num(2)?,
                low: num(3)?,
            },
            Some("dmem_read") if toks.len() == 2 => OutputWord::DmemRead { addr: num(1)? },
            Some("imem_write") if toks.len() == 3 => OutputWord::ImemWrite {
                addr: num(1)?,
                word: num(2)?,
            },
            Some("pcreset") if toks.len() == 1 => OutputWord::PcReset,
            Some("step") if toks.len() == 1 => OutputWord::Step,
            Some("run") if toks.len() == 2 => match toks[1] {
                "1" => OutputWord::Run { enable: true },
                "0" => OutputWord::Run { enable: false },
                _ => return Err(bad()),
            },
            _ => return Err(bad()),
        };
        Ok(word)
    }
}

/// Append-only streams filled during the forward pass. Instruction words are
/// addressed by output position, which is what deferred branches patch.
#[derive(Debug, Default)]
pub(crate) struct Sequencer {
    data: Vec<OutputWord>,
    text: Vec<OutputWord>,
}

impl Sequencer {
    /// Position the next instruction word will occupy.
    pub(crate) fn next_position(&self) -> usize {
        self.text.len()
    }

    pub(crate) fn push_data(&mut self, addr: u32, high: u32, low: u32) {
        self.data.push(OutputWord::DmemWrite { addr, high, low });
    }

    pub(crate) fn push_instr(&mut self, addr: u32, word: u32) -> usize {
        let pos = self.text.len();
        self.text.push(OutputWord::ImemWrite { addr, word });
        pos
    }

    /// Overwrites the instruction word at `pos`, keeping its address.
    pub(crate) fn patch(&mut self, pos: usize, new: u32) -> Option<u32> {
        match self.text.get_mut(pos) {
            Some(OutputWord::ImemWrite { word, .. }) => Some(std::mem::replace(word, new)),
            _ => None,
        }
    }

    pub(crate) fn finish(self, symbols: SymbolTable, data_boundary: Option<String>) -> Program {
        let mut words = Vec::with_capacity(1 + self.data.len() + self.text.len());
        words.push(OutputWord::PcReset);
        words.extend(self.data);
        words.extend(self.text);
        Program {
            words,
            symbols,
            data_boundary,
        }
    }
}

/// A fully assembled and resolved program.
#[derive(Debug, Clone)]
pub struct Program {
    words: Vec<OutputWord>,
    symbols: SymbolTable,
    data_boundary: Option<String>,
}

impl Program {
    pub fn words(&self) -> &[OutputWord] {
        &self.words
    }

    /// `(address, word)` for every instruction-memory write, in order.
    pub fn instructions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.words.iter().filter_map(|w| match *w {
            OutputWord::ImemWrite { addr, word } => Some((addr, word)),
            _ => None,
        })
    }

    /// `(address, high, low)` for every data-memory write, in order.
    pub fn data(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
        self.words.iter().filter_map(|w| match *w {
            OutputWord::DmemWrite { addr, high, low } => Some((addr, high, low)),
            _ => None,
        })
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Label named by the `.word` directive that ended the data section.
    pub fn data_boundary(&self) -> Option<&str> {
        self.data_boundary.as_deref()
    }

    /// Appends a trailing control directive (run, step, read-back).
    pub fn push(&mut self, word: OutputWord) {
        self.words.push(word);
    }

    /// Appends `dmem_read` for `count` addresses from `start`.
    pub fn push_readback(&mut self, start: u32, count: u32) -> Result<(), AsmError> {
        let end = start.checked_add(count).ok_or_else(|| {
            AsmError::InvalidConfig(format!(
                "read-back of {count} words from {start} runs past the data address space"
            ))
        })?;
        self.words
            .extend((start..end).map(|addr| OutputWord::DmemRead { addr }));
        Ok(())
    }

    /// One directive per line, newline-terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for w in &self.words {
            out.push_str(&w.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_transport_format() {
        let cases = [
            (OutputWord::DmemWrite { addr: 0, high: 0, low: 0x1234_5678 }, "dmem_write 0 0x0 0x12345678"),
            (OutputWord::ImemWrite { addr: 7, word: 0xE282_1005 }, "imem_write 7 0xe2821005"),
            (OutputWord::PcReset, "pcreset"),
            (OutputWord::Run { enable: true }, "run 1"),
            (OutputWord::Run { enable: false }, "run 0"),
            (OutputWord::Step, "step"),
            (OutputWord::DmemRead { addr: 3 }, "dmem_read 3"),
        ];
        for (w, text) in cases {
            assert_eq!(w.to_string(), text);
            assert_eq!(text.parse::<OutputWord>().unwrap(), w);
        }
    }

    #[test]
    fn parse_accepts_hex_addresses_and_rejects_junk() {
        assert_eq!(
            "dmem_read 0x10".parse::<OutputWord>().unwrap(),
            OutputWord::DmemRead { addr: 16 }
        );
        assert!("imem_write 1".parse::<OutputWord>().is_err());
        assert!("run 2".parse::<OutputWord>().is_err());
        assert!("launch".parse::<OutputWord>().is_err());
    }

    #[test]
    fn patch_keeps_address() {
        let mut seq = Sequencer::default();
        seq.push_instr(4, 1);
        let pos = seq.push_instr(5, 0);
        assert_eq!(seq.patch(pos, 0xAB), Some(0));
        assert_eq!(seq.patch(9, 0xAB), None);
        let prog = seq.finish(SymbolTable::default(), None);
        assert_eq!(prog.instructions().collect::<Vec<_>>(), vec![(4, 1), (5, 0xAB)]);
        assert_eq!(prog.words()[0], OutputWord::PcReset);
    }

    #[test]
    fn readback_stays_inside_the_address_space() {
        let mut prog = Sequencer::default().finish(SymbolTable::default(), None);
        prog.push_readback(u32::MAX - 1, 1).unwrap();
        assert_eq!(prog.words().last(), Some(&OutputWord::DmemRead { addr: u32::MAX - 1 }));
        assert!(matches!(
            prog.push_readback(u32::MAX, 2),
            Err(AsmError::InvalidConfig(_))
        ));
        assert_eq!(prog.words().len(), 2);
    }
}
