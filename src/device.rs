use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::output::{OutputWord, Program};

/// What the transport drives on the far side of the serial link.
pub trait Device {
    fn dmem_write(&mut self, addr: u32, high: u32, low: u32) -> Result<()>;
    fn dmem_read(&mut self, addr: u32) -> Result<(u32, u32)>;
    fn imem_write(&mut self, addr: u32, word: u32) -> Result<()>;
    fn pc_reset(&mut self) -> Result<()>;
    fn step(&mut self) -> Result<()>;
    fn run(&mut self, enable: bool) -> Result<()>;

    /// Applies one directive.
    fn apply(&mut self, word: &OutputWord) -> Result<()> {
        match *word {
            OutputWord::DmemWrite { addr, high, low } => self.dmem_write(addr, high, low),
            OutputWord::DmemRead { addr } => self.dmem_read(addr).map(|_| ()),
            OutputWord::ImemWrite { addr, word } => self.imem_write(addr, word),
            OutputWord::PcReset => self.pc_reset(),
            OutputWord::Step => self.step(),
            OutputWord::Run { enable } => self.run(enable),
        }
    }
}

/// Replays every directive of `prog` into `dev`, in order.
pub fn load<D: Device + ?Sized>(dev: &mut D, prog: &Program) -> Result<()> {
    prog.words().iter().try_for_each(|w| dev.apply(w))
}

/// Records what a device would hold after loading. Used by the disassembler
/// and by tests; it does not execute anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDevice {
    pub imem: BTreeMap<u32, u32>,
    /// `(high, low)` per data address.
    pub dmem: BTreeMap<u32, (u32, u32)>,
    pub resets: u32,
    pub steps: u32,
    pub running: bool,
    /// Addresses read back, in order.
    pub reads: Vec<u32>,
    /// Reject a second write to the same instruction address.
    pub strict: bool,
}

impl ImageDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Builds an image from directive text, one directive per line. Blank
    /// lines and `#` comments are skipped.
    pub fn from_directives(text: &str) -> Result<Self> {
        let mut dev = Self::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let word: OutputWord = line
                .parse()
                .map_err(|e| anyhow::anyhow!("line {}: {e}", n + 1))?;
            dev.apply(&word)?;
        }
        Ok(dev)
    }
}

impl Device for ImageDevice {
    fn dmem_write(&mut self, addr: u32, high: u32, low: u32) -> Result<()> {
        self.dmem.insert(addr, (high, low));
        Ok(())
    }

    fn dmem_read(&mut self, addr: u32) -> Result<(u32, u32)> {
        self.reads.push(addr);
        Ok(self.dmem.get(&addr).copied().unwrap_or_default())
    }

    fn imem_write(&mut self, addr: u32, word: u32) -> Result<()> {
        if self.imem.insert(addr, word).is_some() && self.strict {
            bail!("instruction address {addr} written twice");
        }
        Ok(())
    }

    fn pc_reset(&mut self) -> Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn step(&mut self) -> Result<()> {
        self.steps += 1;
        Ok(())
    }

    fn run(&mut self, enable: bool) -> Result<()> {
        self.running = enable;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_directive_text() {
        let dev = ImageDevice::from_directives(
            "pcreset\n# data\ndmem_write 0 0x0 0x2a\n\nimem_write 0 0xe1a00000\nrun 1\ndmem_read 0\n",
        )
        .unwrap();
        assert_eq!(dev.resets, 1);
        assert_eq!(dev.dmem.get(&0), Some(&(0, 0x2a)));
        assert_eq!(dev.imem.get(&0), Some(&0xE1A0_0000));
        assert!(dev.running);
        assert_eq!(dev.reads, vec![0]);
        assert!(ImageDevice::from_directives("imem_write zero 1").is_err());
    }

    #[test]
    fn strict_image_rejects_overwrites() {
        let mut dev = ImageDevice::strict();
        dev.imem_write(3, 1).unwrap();
        assert!(dev.imem_write(3, 2).is_err());
    }
}
