use serde::{Deserialize, Serialize};

use crate::error::AsmError;

/// Which primitives get hazard padding after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadPolicy {
    #[default]
    All,
    /// Only instructions that write a register (data-processing, loads).
    Writes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsmConfig {
    pub text_start: u32,
    pub data_start: u32,
    /// Initial `sp`/`fp` written by the prologue.
    pub workspace_base: u32,
    pub hazard_pad: u32,
    pub pad_policy: PadPolicy,
    /// Require every conditional branch to follow a `cmp`.
    pub strict_compare: bool,
    pub prologue: bool,
}

impl Default for AsmConfig {
    fn default() -> Self {
        Self {
            text_start: 0,
            data_start: 0,
            workspace_base: 0,
            hazard_pad: 3,
            pad_policy: PadPolicy::All,
            strict_compare: true,
            prologue: true,
        }
    }
}

impl AsmConfig {
    pub fn validate(&self) -> Result<(), AsmError> {
        // the prologue loads it with a single 8-bit mov
        if self.prologue && self.workspace_base > 0xFF {
            return Err(AsmError::InvalidConfig(format!(
                "workspace_base {} does not fit an 8-bit immediate",
                self.workspace_base
            )));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
