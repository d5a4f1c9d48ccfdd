use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pipeasm::decoder::{Decoder, PipeDecoder};
use pipeasm::disasm::fmt_at;
use pipeasm::{AsmConfig, Assembler, Binding, OutputWord, PadPolicy, Program, SourceLine};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Assemble cleaned ARM-subset source into imem/dmem load directives"
)]
struct Opts {
    /// Cleaned assembly source, one statement per line
    #[arg(value_name = "SRCFILE")]
    input: PathBuf,
    /// Write directives to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// JSON configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long)]
    text_start: Option<u32>,
    #[arg(long)]
    data_start: Option<u32>,
    /// Initial sp/fp loaded by the prologue
    #[arg(long)]
    workspace: Option<u32>,
    /// No-ops after each instruction
    #[arg(long)]
    pad: Option<u32>,
    #[arg(long, value_enum)]
    pad_policy: Option<PadArg>,
    /// Allow conditional branches that do not follow a cmp
    #[arg(long)]
    relaxed_compare: bool,
    #[arg(long)]
    no_prologue: bool,
    /// Append `run 1`
    #[arg(long)]
    run: bool,
    /// Append N `step` directives
    #[arg(long, value_name = "N", default_value_t = 0u32)]
    step: u32,
    /// Append `dmem_read` for the first N data addresses
    #[arg(long, value_name = "N", default_value_t = 0u32)]
    readback: u32,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Print an annotated listing instead of directives (text format only)
    #[arg(long)]
    listing: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PadArg {
    All,
    Writes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, serde::Serialize)]
struct SymbolOut<'a> {
    name: &'a str,
    #[serde(flatten)]
    binding: &'a Binding,
}

#[derive(Debug, serde::Serialize)]
struct ProgramOut<'a> {
    words: &'a [OutputWord],
    symbols: Vec<SymbolOut<'a>>,
    data_boundary: Option<&'a str>,
}

fn config(opts: &Opts) -> Result<AsmConfig> {
    let mut cfg = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            AsmConfig::from_json(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => AsmConfig::default(),
    };
    if let Some(v) = opts.text_start {
        cfg.text_start = v;
    }
    if let Some(v) = opts.data_start {
        cfg.data_start = v;
    }
    if let Some(v) = opts.workspace {
        cfg.workspace_base = v;
    }
    if let Some(v) = opts.pad {
        cfg.hazard_pad = v;
    }
    if let Some(p) = opts.pad_policy {
        cfg.pad_policy = match p {
            PadArg::All => PadPolicy::All,
            PadArg::Writes => PadPolicy::Writes,
        };
    }
    if opts.relaxed_compare {
        cfg.strict_compare = false;
    }
    if opts.no_prologue {
        cfg.prologue = false;
    }
    Ok(cfg)
}

fn listing(prog: &Program) -> String {
    use std::fmt::Write as _;
    let dec = PipeDecoder::new();
    let labels = prog.symbols().code_labels();
    let mut buf = String::new();
    for (addr, high, low) in prog.data() {
        let _ = writeln!(buf, "  d{addr:<5} {high:#010x} {low:#010x}");
    }
    for (pc, word) in prog.instructions() {
        for name in labels.get(&pc).into_iter().flatten() {
            let _ = writeln!(buf, "{name}:");
        }
        let text = dec
            .decode(word)
            .map(|d| fmt_at(&d, pc))
            .unwrap_or_else(|| format!(".word {word:#010x}"));
        let _ = writeln!(buf, "  {pc:<6} {word:#010x}  {text}");
    }
    buf
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let cfg = config(&opts)?;
    let data_start = cfg.data_start;

    let src = std::fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let lines: Vec<&str> = src.lines().collect();
    let mut prog = Assembler::new(cfg)?
        .run(&SourceLine::numbered(&lines))
        .with_context(|| format!("assembling {}", opts.input.display()))?;

    if opts.run {
        prog.push(OutputWord::Run { enable: true });
    }
    for _ in 0..opts.step {
        prog.push(OutputWord::Step);
    }
    if opts.readback > 0 {
        prog.push_readback(data_start, opts.readback)?;
    }

    let out = match opts.format {
        OutputFormat::Json => {
            let report = ProgramOut {
                words: prog.words(),
                symbols: prog
                    .symbols()
                    .iter()
                    .map(|(name, binding)| SymbolOut { name, binding })
                    .collect(),
                data_boundary: prog.data_boundary(),
            };
            serde_json::to_string_pretty(&report)? + "\n"
        }
        OutputFormat::Text if opts.listing => listing(&prog),
        OutputFormat::Text => prog.render(),
    };
    match &opts.output {
        Some(path) => std::fs::write(path, out)
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{out}"),
    }
    Ok(())
}
