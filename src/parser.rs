//! Line tokenizer: one cleaned source line in, one structured [`Statement`] out.
//!
//! Register tokens are resolved here, which is also where the hard-wired zero
//! register is swapped for its alias. Because only whole operand tokens are
//! matched, `r0` inside `r10`, inside a label or inside a literal is untouched.

use crate::error::{AsmError, EncodeError, OperandError};
use crate::tables::{self, MnemonicDesc, Reg};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// One input line together with its position in the source sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLine {
    pub index: usize,
    pub text: String,
}

impl SourceLine {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Numbers lines by their position, dropping blank ones.
    pub fn numbered<S: AsRef<str>>(lines: &[S]) -> Vec<SourceLine> {
        lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.as_ref().trim().is_empty())
            .map(|(i, l)| SourceLine::new(i, l.as_ref().trim()))
            .collect()
    }

    pub(crate) fn operand_err(&self, source: OperandError) -> AsmError {
        AsmError::MalformedOperand {
            line: self.index,
            text: self.text.clone(),
            source,
        }
    }

    pub(crate) fn encode_err(&self, e: EncodeError) -> AsmError {
        let (line, text) = (self.index, self.text.clone());
        match e {
            EncodeError::Width(width) => AsmError::EncodingWidth { line, text, width },
            EncodeError::Immediate { value, bits } => AsmError::ImmediateOutOfRange {
                line,
                text,
                value,
                bits,
            },
            EncodeError::Displacement { disp, bits } => AsmError::DisplacementOutOfRange {
                line,
                text,
                disp,
                bits,
            },
        }
    }

    /// `space` is "instruction" or "data".
    pub(crate) fn overflow(&self, space: &'static str) -> AsmError {
        AsmError::AddressOverflow {
            line: self.index,
            text: self.text.clone(),
            space,
        }
    }

    pub(crate) fn unresolved(&self, label: &str) -> AsmError {
        AsmError::UnresolvedSymbol {
            line: self.index,
            text: self.text.clone(),
            label: label.to_string(),
        }
    }
}

/// Memory operand addressing forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// `[base, #off]`
    Pre,
    /// `[base, #off]!`
    PreWriteback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    /// `base!` in block transfers.
    RegWriteback(Reg),
    Imm(i64),
    Mem {
        base: Reg,
        offset: i64,
        /// Whether an offset was written at all (`[base]` vs `[base, #0]`).
        explicit: bool,
        index: Index,
    },
    RegList(Vec<Reg>),
    Label(String),
}

/// Operand of a `.word` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordOperand {
    Value(i128),
    /// Non-numeric operand: a label reference marking the end of the data.
    Symbol(String),
}

#[derive(Debug, Clone)]
pub enum Statement {
    Label(String),
    Word(WordOperand),
    Instr {
        desc: &'static MnemonicDesc,
        operands: Vec<Operand>,
    },
}

impl Statement {
    pub fn parse(line: &SourceLine) -> Result<Statement, AsmError> {
        let s = line.text.trim();
        if let Some(name) = s.strip_suffix(':') {
            let name = name.trim();
            if is_ident(name) {
                return Ok(Statement::Label(name.to_string()));
            }
            return Err(line.operand_err(OperandError::Unparsable(name.to_string())));
        }
        let (mn, rest) = match s.split_once(char::is_whitespace) {
            Some((mn, rest)) => (mn, rest.trim()),
            None => (s, ""),
        };
        let desc = tables::lookup(mn).ok_or_else(|| AsmError::UnknownMnemonic {
            line: line.index,
            text: line.text.clone(),
            mnemonic: mn.to_string(),
        })?;
        if desc.op == tables::Mnemonic::Word {
            let operand = match parse_number(rest) {
                Ok(v) => WordOperand::Value(v),
                Err(_) if is_ident(rest) => WordOperand::Symbol(rest.to_string()),
                Err(e) => return Err(line.operand_err(e)),
            };
            return Ok(Statement::Word(operand));
        }
        let operands = parse_operands(rest).map_err(|e| line.operand_err(e))?;
        Ok(Statement::Instr { desc, operands })
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '.' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}

/// Parses `0x` hex, `$` decimal or plain decimal, with an optional `-`.
pub fn parse_number(s: &str) -> Result<i128, OperandError> {
    let t = s.trim();
    let bad = || OperandError::BadNumber(t.to_string());
    let (neg, body) = match t.strip_prefix('-') {
        Some(b) => (true, b.trim_start()),
        None => (false, t),
    };
    let magnitude = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).map_err(|_| bad())?
    } else if let Some(dec) = body.strip_prefix('$') {
        dec.parse::<i128>().map_err(|_| bad())?
    } else if body.starts_with(|c: char| c.is_ascii_digit()) {
        body.parse::<i128>().map_err(|_| bad())?
    } else {
        return Err(bad());
    };
    Ok(if neg { -magnitude } else { magnitude })
}

fn parse_imm(s: &str) -> Result<i64, OperandError> {
    let v = parse_number(s)?;
    v.to_i64().ok_or_else(|| OperandError::BadNumber(s.trim().to_string()))
}

/// Resolves a register token, applying the zero-register alias.
pub fn parse_reg(tok: &str) -> Result<Reg, OperandError> {
    let t = tok.trim();
    let reg = Reg::lookup(t).ok_or_else(|| OperandError::UnknownRegister(t.to_string()))?;
    if reg == Reg::ZERO {
        return Ok(Reg::ZERO_ALIAS);
    }
    if reg.is_reserved() {
        return Err(OperandError::ReservedRegister(reg));
    }
    Ok(reg)
}

/// Splits on commas that are not nested inside `[]` or `{}`.
fn split_top(s: &str) -> Result<Vec<&str>, OperandError> {
    let mut parts = Vec::new();
    let mut depth: Vec<char> = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth.push(']'),
            '{' => depth.push('}'),
            ']' | '}' => {
                if depth.pop() != Some(c) {
                    return Err(OperandError::Unparsable(s.to_string()));
                }
            }
            ',' if depth.is_empty() => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if let Some(&open) = depth.last() {
        return Err(OperandError::Unterminated(if open == ']' { '[' } else { '{' }));
    }
    let tail = s[start..].trim();
    if !tail.is_empty() || !parts.is_empty() {
        parts.push(tail);
    }
    Ok(parts)
}

pub fn parse_operands(s: &str) -> Result<Vec<Operand>, OperandError> {
    split_top(s)?.into_iter().map(parse_operand).collect()
}

fn parse_operand(tok: &str) -> Result<Operand, OperandError> {
    if tok.is_empty() {
        return Err(OperandError::Unparsable(tok.to_string()));
    }
    if let Some(imm) = tok.strip_prefix('#') {
        return Ok(Operand::Imm(parse_imm(imm)?));
    }
    if tok.starts_with('[') {
        return parse_mem(tok);
    }
    if let Some(inner) = tok.strip_prefix('{') {
        let inner = inner
            .strip_suffix('}')
            .ok_or(OperandError::Unterminated('{'))?;
        let regs = inner
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(parse_reg)
            .collect::<Result<Vec<_>, _>>()?;
        if regs.is_empty() {
            return Err(OperandError::EmptyList);
        }
        return Ok(Operand::RegList(regs));
    }
    if let Some(base) = tok.strip_suffix('!') {
        return Ok(Operand::RegWriteback(parse_reg(base)?));
    }
    if Reg::lookup(tok).is_some() {
        return Ok(Operand::Reg(parse_reg(tok)?));
    }
    if is_ident(tok) {
        return Ok(Operand::Label(tok.to_string()));
    }
    Err(OperandError::Unparsable(tok.to_string()))
}

fn parse_mem(tok: &str) -> Result<Operand, OperandError> {
    let (body, index) = match tok.strip_suffix('!') {
        Some(b) => (b.trim_end(), Index::PreWriteback),
        None => (tok, Index::Pre),
    };
    let inner = body
        .strip_prefix('[')
        .and_then(|b| b.strip_suffix(']'))
        .ok_or(OperandError::Unterminated('['))?;
    let mut parts = inner.split(',').map(str::trim);
    let base = parse_reg(parts.next().unwrap_or(""))?;
    let (offset, explicit) = match parts.next() {
        Some(off) => {
            let imm = off
                .strip_prefix('#')
                .ok_or(OperandError::Shape {
                    expected: "immediate offset `#n`",
                })?;
            (parse_imm(imm)?, true)
        }
        None => (0, false),
    };
    if parts.next().is_some() {
        return Err(OperandError::Unparsable(tok.to_string()));
    }
    Ok(Operand::Mem {
        base,
        offset,
        explicit,
        index,
    })
}
