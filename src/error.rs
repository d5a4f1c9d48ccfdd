use crate::tables::Reg;

/// Why an operand list did not fit its mnemonic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OperandError {
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    #[error("register `{0}` is reserved by the assembler")]
    ReservedRegister(Reg),
    #[error("bad number `{0}`")]
    BadNumber(String),
    #[error("unterminated `{0}`")]
    Unterminated(char),
    #[error("empty register list")]
    EmptyList,
    #[error("cannot parse operand `{0}`")]
    Unparsable(String),
    #[error("expected {expected}")]
    Shape { expected: &'static str },
    #[error("`{0}` is not a code label")]
    NotCodeLabel(String),
    #[error("`{0}` is not a data label")]
    NotDataLabel(String),
}

/// Raised by the field encoder, without source context.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    #[error("assembled {0} bits, expected 32")]
    Width(usize),
    #[error("immediate {value} does not fit in {bits} bits")]
    Immediate { value: i64, bits: u32 },
    #[error("displacement {disp} does not fit in {bits} signed bits")]
    Displacement { disp: i64, bits: u32 },
}

/// Fatal assembly errors. Every variant names the source line it came from.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic `{mnemonic}` in `{text}`")]
    UnknownMnemonic {
        line: usize,
        text: String,
        mnemonic: String,
    },
    #[error("line {line}: malformed operand in `{text}`")]
    MalformedOperand {
        line: usize,
        text: String,
        #[source]
        source: OperandError,
    },
    #[error("line {line}: `{text}` assembled to {width} bits, expected 32")]
    EncodingWidth {
        line: usize,
        text: String,
        width: usize,
    },
    #[error("line {line}: unresolved symbol `{label}` in `{text}`")]
    UnresolvedSymbol {
        line: usize,
        text: String,
        label: String,
    },
    #[error("line {line}: label `{label}` already defined on line {first}")]
    DuplicateLabel {
        line: usize,
        text: String,
        label: String,
        first: usize,
    },
    #[error("line {line}: immediate {value} does not fit in {bits} bits in `{text}`")]
    ImmediateOutOfRange {
        line: usize,
        text: String,
        value: i64,
        bits: u32,
    },
    #[error("line {line}: branch displacement {disp} does not fit in {bits} bits in `{text}`")]
    DisplacementOutOfRange {
        line: usize,
        text: String,
        disp: i64,
        bits: u32,
    },
    #[error("line {line}: conditional branch `{text}` does not directly follow a cmp")]
    BranchWithoutCompare { line: usize, text: String },
    #[error("line {line}: {space} address space exhausted at `{text}`")]
    AddressOverflow {
        line: usize,
        text: String,
        space: &'static str,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AsmError {
    /// Source line index the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            AsmError::UnknownMnemonic { line, .. }
            | AsmError::MalformedOperand { line, .. }
            | AsmError::EncodingWidth { line, .. }
            | AsmError::UnresolvedSymbol { line, .. }
            | AsmError::DuplicateLabel { line, .. }
            | AsmError::ImmediateOutOfRange { line, .. }
            | AsmError::DisplacementOutOfRange { line, .. }
            | AsmError::BranchWithoutCompare { line, .. }
            | AsmError::AddressOverflow { line, .. } => Some(*line),
            AsmError::InvalidConfig(_) => None,
        }
    }
}
