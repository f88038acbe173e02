use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use nxu8_rs::disasm::fmt_record;
use nxu8_rs::{CodeImage, Cursor, Decoded, Decoder, U8Decoder};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Decode nX-U8 instruction words linearly, without following control flow"
)]
struct Opts {
    /// Read words from a binary image instead of the command line
    #[arg(short, long, value_name = "BINFILE")]
    input: Option<String>,
    /// Start address inside the image (hex or dec)
    #[arg(long, default_value = "0")]
    start: String,
    /// Number of instructions to decode from the image
    #[arg(long, default_value_t = 32usize)]
    count: usize,
    /// Instruction words in hex, e.g. `0312 C802`
    #[arg(value_name = "WORD")]
    words: Vec<String>,
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
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let (bytes, start, count) = match &opts.input {
        Some(path) => (std::fs::read(path)?, parse_u32(&opts.start)?, opts.count),
        None => {
            anyhow::ensure!(!opts.words.is_empty(), "no input file and no words given");
            let mut bytes = Vec::new();
            for w in &opts.words {
                let w = w.trim_start_matches("0x").trim_start_matches("0X");
                bytes.extend_from_slice(&u16::from_str_radix(w, 16)?.to_le_bytes());
            }
            // room for extension words past the last one given
            bytes.extend_from_slice(&[0; 4]);
            (bytes, 0, opts.words.len())
        }
    };
    let img = CodeImage::new(&bytes)?;
    let dec = U8Decoder::new();
    let mut cur = Cursor::new(&img, start);

    for _ in 0..count {
        let text = match dec.decode(&mut cur) {
            Decoded::Insn(r) => fmt_record(&r),
            Decoded::Prefix { segment, .. } => format!("DSR <- {segment}"),
            Decoded::Data { record, error } => match error {
                Some(e) => format!("{}  ; {e}", fmt_record(&record)),
                None => fmt_record(&record),
            },
        };
        let (addr, words) = cur.take();
        let hex: Vec<String> = words.iter().map(|w| format!("{w:04X}")).collect();
        println!("{addr:05X}: {:<10} {text}", hex.join(" "));
    }

    Ok(())
}
