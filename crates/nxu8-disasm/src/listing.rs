use serde::Serialize;

use nxu8_rs::disasm::fmt_record_with;

use crate::analyze::{LabelKind, Listing};
use crate::model::{labels_to_seeds, LabelSeed};

#[derive(Debug, Clone, Serialize)]
pub struct LineOut {
    pub addr: u32,
    pub words: Vec<u16>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingOut {
    pub entries: Vec<u32>,
    pub code: Vec<LineOut>,
    pub labels: Vec<LabelSeed>,
}

pub fn lines(listing: &Listing) -> Vec<LineOut> {
    listing
        .code
        .iter()
        .map(|(addr, e)| LineOut {
            addr: *addr,
            words: e.words.clone(),
            text: fmt_record_with(&e.record, |a| listing.label_for(a)),
        })
        .collect()
}

/// Assembler-style listing. Labels with no code at their address are
/// emitted up front as equates.
pub fn render_text(listing: &Listing, show_bytes: bool) -> String {
    let mut buf = String::new();
    for (addr, l) in &listing.labels {
        if !listing.code.contains_key(addr) {
            buf.push_str(&format!("{:<16} EQU {addr:05X}H\n", l.name));
        }
    }
    for line in lines(listing) {
        if let Some(l) = listing.labels.get(&line.addr) {
            if l.kind == LabelKind::Function {
                buf.push('\n');
            }
            buf.push_str(&format!("{}:  ; {}\n", l.name, l.kind.keyword()));
        }
        if show_bytes {
            let hex: Vec<String> = line.words.iter().map(|w| format!("{w:04X}")).collect();
            buf.push_str(&format!("  {:05X}: {:<15} {}\n", line.addr, hex.join(" "), line.text));
        } else {
            buf.push_str(&format!("  {:05X}: {}\n", line.addr, line.text));
        }
    }
    buf
}

pub fn render_json(listing: &Listing, entries: &[u32]) -> serde_json::Result<String> {
    let out = ListingOut { entries: entries.to_vec(), code: lines(listing), labels: labels_to_seeds(&listing.labels) };
    serde_json::to_string_pretty(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{Disassembler, Label};

    fn program(code: &[u16]) -> Vec<u8> {
        let mut words = vec![0x0000, 0x0004];
        words.extend_from_slice(code);
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn text_listing_uses_labels() {
        // 4: BNE 8 / 6: BRK / 8: RT
        let d = Disassembler::new(&program(&[0xC801, 0xFFFF, 0xFE1F])).unwrap();
        let text = render_text(&d.disassemble(), false);
        assert!(text.contains("start:  ; function\n  00004: BNE LAB_00008\n"));
        assert!(text.contains("LAB_00008:  ; label\n  00008: RT\n"));
    }

    #[test]
    fn text_listing_shows_words() {
        let d = Disassembler::new(&program(&[0xF001, 0x0008, 0xFE1F])).unwrap();
        let text = render_text(&d.disassemble(), true);
        assert!(text.contains("00004: F001 0008"));
        assert!(text.contains("BL FUN_00008"));
    }

    #[test]
    fn dangling_labels_become_equates() {
        let mut d = Disassembler::new(&program(&[0xFFFF])).unwrap();
        d.seed(0x8000, Label::new(LabelKind::Data, "buf"));
        let text = render_text(&d.disassemble(), false);
        assert!(text.starts_with("buf"));
        assert!(text.contains("EQU 08000H"));
    }

    #[test]
    fn json_listing_has_code_and_labels() {
        let d = Disassembler::new(&program(&[0xFFFF])).unwrap();
        let json = render_json(&d.disassemble(), &[d.entry()]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["entries"][0], 4);
        assert_eq!(v["code"][0]["text"], "BRK");
        assert_eq!(v["labels"][0]["name"], "start");
        assert_eq!(v["labels"][0]["kind"], "function");
    }
}
