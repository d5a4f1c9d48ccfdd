pub mod assembler;
pub mod config;
pub mod decoder;
pub mod device;
pub mod disasm;
pub mod encoder;
pub mod error;
pub mod expand;
pub mod output;
pub mod parser;
pub mod symbols;
pub mod tables;

pub use assembler::{assemble, Assembler, PendingBranch};
pub use config::{AsmConfig, PadPolicy};
pub use device::{Device, ImageDevice};
pub use error::{AsmError, EncodeError, OperandError};
pub use output::{OutputWord, Program};
pub use parser::SourceLine;
pub use symbols::{Binding, SymbolTable};
