use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use pipeasm::ImageDevice;

/// A run of consecutive addresses in one memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub name: String,
    pub kind: &'static str, // "text" or "data"
    pub start: u32,
    /// Exclusive.
    pub end: u32,
}

pub fn load_directives(path: &Path) -> Result<ImageDevice> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    ImageDevice::from_directives(&text).with_context(|| format!("parsing {}", path.display()))
}

fn runs<V>(mem: &BTreeMap<u32, V>) -> Vec<(u32, u32)> {
    let mut out: Vec<(u32, u32)> = Vec::new();
    for &addr in mem.keys() {
        match out.last_mut() {
            Some((_, end)) if *end == addr => *end += 1,
            _ => out.push((addr, addr + 1)),
        }
    }
    out
}

pub fn sections(img: &ImageDevice) -> Vec<Section> {
    let text = runs(&img.imem)
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| Section {
            name: format!("text{i}"),
            kind: "text",
            start,
            end,
        });
    let data = runs(&img.dmem)
        .into_iter()
        .enumerate()
        .map(|(i, (start, end))| Section {
            name: format!("data{i}"),
            kind: "data",
            start,
            end,
        });
    text.chain(data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaps_split_sections() {
        let img = ImageDevice::from_directives(
            "pcreset\ndmem_write 0 0x0 0x1\nimem_write 0 0xe1a00000\nimem_write 1 0xe1a00000\nimem_write 5 0xe12fff1e\n",
        )
        .unwrap();
        let s = sections(&img);
        assert_eq!(s.len(), 3);
        assert_eq!((s[0].start, s[0].end), (0, 2));
        assert_eq!((s[1].name.as_str(), s[1].start), ("text1", 5));
        assert_eq!(s[2].kind, "data");
    }
}
