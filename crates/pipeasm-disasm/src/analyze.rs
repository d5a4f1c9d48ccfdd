use serde::Serialize;
use std::collections::BTreeMap;

use pipeasm::decoder::{Decoder, Op, PipeDecoder};
use pipeasm::ImageDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Branch,
    CondBranch,
    /// `bx`: target only known at run time.
    Indirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge {
    pub from: u32,
    pub to: Option<u32>,
    pub kind: EdgeKind,
}

/// Control transfers found by a linear sweep of instruction memory.
pub fn edges(img: &ImageDevice) -> Vec<Edge> {
    let dec = PipeDecoder::new();
    let mut out = Vec::new();
    for (&pc, &raw32) in &img.imem {
        let Some(d) = dec.decode(raw32) else { continue };
        match d.op {
            Op::Branch(kind) => {
                // branches resolve two words after fetch
                let to = (pc as i64 + d.imm as i64 + 2).try_into().ok();
                let kind = if kind.is_conditional() {
                    EdgeKind::CondBranch
                } else {
                    EdgeKind::Branch
                };
                out.push(Edge { from: pc, to, kind });
            }
            Op::Bx => out.push(Edge {
                from: pc,
                to: None,
                kind: EdgeKind::Indirect,
            }),
            _ => {}
        }
    }
    out
}

/// `loc_` names for every branch target, plus `start` at the lowest address.
pub fn labels(img: &ImageDevice, edges: &[Edge]) -> BTreeMap<u32, String> {
    let mut labels = BTreeMap::new();
    if let Some(&entry) = img.imem.keys().next() {
        labels.insert(entry, "start".to_string());
    }
    for to in edges.iter().filter_map(|e| e.to) {
        labels.entry(to).or_insert_with(|| format!("loc_{to:04x}"));
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_loop_gets_a_label() {
        // 0: nop, 1: nop, 2: b -> 0 (disp -4), 3: bx lr
        let img = ImageDevice::from_directives(
            "imem_write 0 0xe1a00000\nimem_write 1 0xe1a00000\nimem_write 2 0xea00fffc\nimem_write 3 0xe12fff1e\n",
        )
        .unwrap();
        let e = edges(&img);
        assert_eq!(
            e,
            vec![
                Edge { from: 2, to: Some(0), kind: EdgeKind::Branch },
                Edge { from: 3, to: None, kind: EdgeKind::Indirect },
            ]
        );
        let l = labels(&img, &e);
        assert_eq!(l.get(&0).map(String::as_str), Some("start"));
        assert_eq!(l.len(), 1);
    }
}
