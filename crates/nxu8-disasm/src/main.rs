use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nxu8_disasm::{
    load_labels, load_raw_bin, render_json, render_text, save_labels, DisasmConfig, Disassembler, Label,
    LabelKind,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "nX-U8/100 control-flow disassembler", long_about = None)]
struct Cli {
    /// ROM image; the reset vector at offset 2 is the entry point
    #[arg(value_name = "BINFILE")]
    input: String,
    /// Skip N bytes at start of file before loading
    #[arg(long, default_value_t = 0usize)]
    skip: usize,
    /// Limit bytes loaded (default: to EOF after --skip)
    #[arg(long)]
    len: Option<usize>,
    /// Extra function entry points (hex or dec). Repeat to add more.
    #[arg(long = "entry", value_name = "ADDR")]
    entries: Vec<String>,
    /// Maximum words to decode before stopping
    #[arg(long, default_value_t = DisasmConfig::default().max_steps)]
    max_steps: usize,
    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Show instruction words in the text listing
    #[arg(long)]
    show_bytes: bool,
    /// Import labels from JSON (Vec<{ addr, kind, name }>)
    #[arg(long, value_name = "FILE")]
    labels_in: Option<String>,
    /// Export labels to JSON (Vec<{ addr, kind, name }>)
    #[arg(long, value_name = "FILE")]
    labels_out: Option<String>,
    /// Write listing to file instead of stdout
    #[arg(long, value_name = "FILE")]
    out: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn parse_u32(s: &str) -> Result<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Ok(u32::from_str_radix(hex, 16)?)
    } else {
        Ok(s.parse::<u32>()?)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bytes = load_raw_bin(Path::new(&cli.input), cli.skip, cli.len)?;
    let mut dis = Disassembler::with_config(&bytes, DisasmConfig { max_steps: cli.max_steps })?;

    if let Some(path) = &cli.labels_in {
        for seed in load_labels(Path::new(path))? {
            let (addr, label) = seed.into_label();
            dis.seed(addr, label);
        }
    }
    let mut entries = vec![dis.entry()];
    for e in &cli.entries {
        let addr = dis.image().wrap(parse_u32(e)?);
        dis.seed(addr, Label::auto(LabelKind::Function, addr));
        entries.push(addr);
    }

    let listing = dis.disassemble();
    info!("{} instructions, {} labels, {} words decoded", listing.code.len(), listing.labels.len(), listing.steps);

    let text = match cli.format {
        OutputFormat::Text => render_text(&listing, cli.show_bytes),
        OutputFormat::Json => render_json(&listing, &entries)?,
    };
    match &cli.out {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    if let Some(path) = &cli.labels_out {
        save_labels(Path::new(path), &listing.labels)?;
    }
    Ok(())
}
