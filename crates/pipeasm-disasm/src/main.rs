use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Write as _;
use std::path::PathBuf;

use pipeasm::decoder::{Decoder, PipeDecoder};
use pipeasm::disasm::fmt_at;
use pipeasm::ImageDevice;

mod analyze;
mod model;
use analyze::{edges, labels, Edge};
use model::{load_directives, sections, Section};

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect a pipeasm directive file", long_about = None)]
struct Cli {
    /// Directive file (`imem_write`, `dmem_write`, ... one per line)
    #[arg(value_name = "DIRFILE")]
    input: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List contiguous text and data ranges
    Sections,
    /// Disassemble instruction memory with branch-target labels
    Listing {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Also print data memory
        #[arg(long)]
        data: bool,
        /// Write output to file instead of stdout
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, serde::Serialize)]
struct InsnOut {
    pc: u32,
    word: u32,
    text: String,
    label: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
struct ListingOut {
    sections: Vec<Section>,
    insns: Vec<InsnOut>,
    edges: Vec<Edge>,
}

fn insns(img: &ImageDevice) -> Vec<InsnOut> {
    let dec = PipeDecoder::new();
    let names = labels(img, &edges(img));
    img.imem
        .iter()
        .map(|(&pc, &word)| InsnOut {
            pc,
            word,
            text: dec
                .decode(word)
                .map(|d| fmt_at(&d, pc))
                .unwrap_or_else(|| format!(".word {word:#010x}")),
            label: names.get(&pc).cloned(),
        })
        .collect()
}

fn render_text(img: &ImageDevice, with_data: bool) -> String {
    let mut buf = String::new();
    for i in insns(img) {
        if let Some(lbl) = &i.label {
            let _ = writeln!(buf, "{:#06x} <{lbl}>:", i.pc);
        }
        let _ = writeln!(buf, "  {:#06x}: {:08x}  {}", i.pc, i.word, i.text);
    }
    if with_data {
        let _ = writeln!(buf, "\ndata:");
        for (addr, (high, low)) in &img.dmem {
            let _ = writeln!(buf, "  {addr:#06x}: {high:08x} {low:08x}");
        }
    }
    buf
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let img = load_directives(&cli.input)?;

    match cli.cmd {
        Command::Sections => {
            println!("{:<8} {:<6} {:<8} {:<8}", "name", "kind", "start", "end");
            for s in sections(&img) {
                println!("{:<8} {:<6} {:<8} {:<8}", s.name, s.kind, s.start, s.end);
            }
        }
        Command::Listing { format, data, out } => {
            let text = match format {
                OutputFormat::Text => render_text(&img, data),
                OutputFormat::Json => {
                    let report = ListingOut {
                        sections: sections(&img),
                        insns: insns(&img),
                        edges: edges(&img),
                    };
                    serde_json::to_string_pretty(&report)? + "\n"
                }
            };
            if let Some(path) = out {
                std::fs::write(path, text)?;
            } else {
                print!("{text}");
            }
        }
    }

    Ok(())
}
