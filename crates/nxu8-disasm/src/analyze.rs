use std::collections::BTreeMap;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use nxu8_rs::decoder::{Decoded, Decoder, Record};
use nxu8_rs::operand::{Address, Condition, DsrPrefix, Operand, SegmentSource};
use nxu8_rs::{CodeImage, Cursor, ImageError, U8Decoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    Function,
    Label,
    Data,
}

impl LabelKind {
    fn prefix(self) -> &'static str {
        match self {
            LabelKind::Function => "FUN",
            LabelKind::Label => "LAB",
            LabelKind::Data => "DAT",
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            LabelKind::Function => "function",
            LabelKind::Label => "label",
            LabelKind::Data => "data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub kind: LabelKind,
    pub name: String,
}

impl Label {
    pub fn new(kind: LabelKind, name: impl Into<String>) -> Self {
        Self { kind, name: name.into() }
    }

    /// Generated name, e.g. `FUN_01234`.
    pub fn auto(kind: LabelKind, addr: u32) -> Self {
        Self { kind, name: format!("{}_{addr:05X}", kind.prefix()) }
    }
}

/// Words consumed by one instruction and what they decoded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeEntry {
    pub words: Vec<u16>,
    pub record: Record,
}

/// Final result of a traversal, sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub code: BTreeMap<u32, CodeEntry>,
    pub labels: BTreeMap<u32, Label>,
    /// Words decoded to produce this listing, prefixes included.
    pub steps: usize,
}

impl Listing {
    pub fn label_for(&self, a: &Address) -> Option<&str> {
        self.labels.get(&a.linear()).map(|l| l.name.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DisasmConfig {
    /// Upper bound on decoded words per traversal.
    pub max_steps: usize,
}

impl Default for DisasmConfig {
    fn default() -> Self {
        Self { max_steps: 1 << 20 }
    }
}

/// Pending addresses, popped last-in first-out. An address is held at most
/// once; membership is a bitmap over the image's words.
#[derive(Debug, Clone)]
pub struct WorkList {
    stack: Vec<u32>,
    pending: BitVec,
}

impl WorkList {
    pub fn new(image_len: usize) -> Self {
        Self { stack: Vec::new(), pending: bitvec![0; image_len / 2] }
    }

    /// `addr` must already be wrapped into the image. Returns false when it
    /// was pending.
    pub fn push(&mut self, addr: u32) -> bool {
        let i = (addr / 2) as usize;
        if self.pending[i] {
            return false;
        }
        self.pending.set(i, true);
        self.stack.push(addr);
        true
    }

    pub fn pop(&mut self) -> Option<u32> {
        let addr = self.stack.pop()?;
        self.pending.set((addr / 2) as usize, false);
        Some(addr)
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.pending.get((addr / 2) as usize).map(|b| *b).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Where control can go after an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Jump(u32),
    Branch { target: u32, fallthrough: bool },
    Call(u32),
    Stop,
    Next,
}

pub fn flow(r: &Record) -> Flow {
    match (r.mnemonic, &r.operands) {
        ("B", [Some(Operand::Address(a)), _]) => Flow::Jump(a.linear()),
        ("BC", [Some(Operand::Condition(c)), Some(Operand::Address(a))]) => {
            Flow::Branch { target: a.linear(), fallthrough: *c != Condition::Al }
        }
        ("BL", [Some(Operand::Address(a)), _]) => Flow::Call(a.linear()),
        ("RT" | "RTI" | "BRK", _) => Flow::Stop,
        ("POP", [Some(Operand::List(l)), _]) if l.pops_pc() => Flow::Stop,
        _ => Flow::Next,
    }
}

/// Attaches a DSR prefix to the last operand when it references memory.
/// Hands the record back untouched otherwise. Branch targets are code
/// addresses and never take a data segment.
pub fn fuse(mut r: Record, segment: SegmentSource) -> Result<Record, Record> {
    if flow(&r) != Flow::Next {
        return Err(r);
    }
    let Some(i) = r.last_operand() else { return Err(r) };
    match r.operands[i].and_then(|op| op.into_memory().ok()) {
        Some(item) => {
            r.operands[i] = Some(Operand::Dsr(DsrPrefix { segment, item }));
            Ok(r)
        }
        None => Err(r),
    }
}

/// Adds a label. Existing labels win, except that a FUNCTION upgrades a
/// LABEL (renaming it when the name was generated). FUNCTION labels are
/// never downgraded.
pub fn merge_label(labels: &mut BTreeMap<u32, Label>, addr: u32, new: Label) {
    match labels.get_mut(&addr) {
        None => {
            debug!("label {} at {addr:05X}", new.name);
            labels.insert(addr, new);
        }
        Some(old) if old.kind == LabelKind::Label && new.kind == LabelKind::Function => {
            if old.name == Label::auto(LabelKind::Label, addr).name {
                old.name = new.name;
            }
            old.kind = LabelKind::Function;
            debug!("label {} at {addr:05X} upgraded to function", old.name);
        }
        Some(_) => {}
    }
}

/// Control-flow driven disassembler over one code image.
#[derive(Debug, Clone)]
pub struct Disassembler {
    image: CodeImage,
    decoder: U8Decoder,
    config: DisasmConfig,
    seeds: Vec<(u32, Label)>,
}

impl Disassembler {
    pub fn new(bytes: &[u8]) -> Result<Self, ImageError> {
        Self::with_config(bytes, DisasmConfig::default())
    }

    pub fn with_config(bytes: &[u8], config: DisasmConfig) -> Result<Self, ImageError> {
        Ok(Self { image: CodeImage::new(bytes)?, decoder: U8Decoder::new(), config, seeds: Vec::new() })
    }

    pub fn image(&self) -> &CodeImage {
        &self.image
    }

    pub fn entry(&self) -> u32 {
        self.image.wrap(self.image.entry())
    }

    /// Pre-populates a label. Function and label seeds are also traversed.
    pub fn seed(&mut self, addr: u32, label: Label) {
        self.seeds.push((addr, label));
    }

    /// Walks all code reachable from the reset vector and the seeds.
    pub fn disassemble(&self) -> Listing {
        let mut t = Traversal {
            image: &self.image,
            decoder: &self.decoder,
            max_steps: self.config.max_steps,
            steps: 0,
            work: WorkList::new(self.image.len()),
            listing: Listing::default(),
        };
        let entry = self.entry();
        t.listing.labels.insert(entry, Label::new(LabelKind::Function, "start"));
        for (addr, label) in &self.seeds {
            let traverse = label.kind != LabelKind::Data;
            let addr = if traverse { self.image.wrap(*addr) } else { *addr };
            debug!("seed {} at {addr:05X}", label.name);
            merge_label(&mut t.listing.labels, addr, label.clone());
            if traverse {
                t.enqueue(addr);
            }
        }
        t.enqueue(entry);
        t.run()
    }
}

/// A decoded segment prefix waiting for the next instruction.
struct Held {
    addr: u32,
    words: Vec<u16>,
    sentinel: Record,
    segment: SegmentSource,
}

struct Traversal<'a> {
    image: &'a CodeImage,
    decoder: &'a U8Decoder,
    max_steps: usize,
    steps: usize,
    work: WorkList,
    listing: Listing,
}

impl<'a> Traversal<'a> {
    fn run(mut self) -> Listing {
        while let Some(addr) = self.work.pop() {
            if self.steps >= self.max_steps {
                warn!("step limit {} reached, {} addresses left unvisited", self.max_steps, self.work.len() + 1);
                break;
            }
            if self.listing.code.contains_key(&addr) {
                continue;
            }
            self.step(addr);
        }
        self.listing.steps = self.steps;
        self.listing
    }

    fn enqueue(&mut self, addr: u32) {
        let addr = self.image.wrap(addr);
        if !self.listing.code.contains_key(&addr) && !self.work.contains(addr) {
            self.work.push(addr);
        }
    }

    fn commit(&mut self, addr: u32, words: Vec<u16>, record: Record) {
        let addr = self.image.wrap(addr);
        trace!("{addr:05X}: {record}");
        self.listing.code.entry(addr).or_insert(CodeEntry { words, record });
    }

    fn orphan(&mut self, p: Held) {
        warn!("segment prefix at {:05X} not followed by a memory operand", p.addr);
        self.commit(p.addr, p.words, p.sentinel);
    }

    fn step(&mut self, addr: u32) {
        let start = self.image.wrap(addr);
        let mut cur = Cursor::new(self.image, addr);
        let mut held: Option<Held> = None;
        let record = loop {
            self.steps += 1;
            match self.decoder.decode(&mut cur) {
                Decoded::Prefix { sentinel, segment } => {
                    let (at, words) = cur.take();
                    let next = Held { addr: at, words, sentinel, segment };
                    if let Some(prev) = held.replace(next) {
                        self.orphan(prev);
                    }
                    // Stop a prefix streak at known code or when it wraps onto itself.
                    let pc = self.image.wrap(cur.pc());
                    if self.steps >= self.max_steps || pc == start || self.listing.code.contains_key(&pc) {
                        if let Some(p) = held.take() {
                            self.orphan(p);
                        }
                        return;
                    }
                }
                Decoded::Insn(r) => break r,
                Decoded::Data { record, error } => {
                    if let Some(e) = error {
                        debug!("{:05X}: {e}, kept as data", cur.start());
                    }
                    break record;
                }
            }
        };
        let next = cur.pc();
        let (at, words) = cur.take();

        let record = match held.take() {
            None => {
                self.commit(at, words, record.clone());
                record
            }
            Some(mut p) => match fuse(record, p.segment) {
                Ok(fused) => {
                    p.words.extend(words);
                    self.commit(p.addr, p.words, fused.clone());
                    fused
                }
                Err(record) => {
                    self.orphan(p);
                    self.commit(at, words, record.clone());
                    record
                }
            },
        };

        match flow(&record) {
            Flow::Jump(target) => {
                let target = self.image.wrap(target);
                self.listing.labels.entry(target).or_insert_with(|| Label::auto(LabelKind::Label, target));
                self.enqueue(target);
            }
            Flow::Branch { target, fallthrough } => {
                let target = self.image.wrap(target);
                self.listing.labels.entry(target).or_insert_with(|| Label::auto(LabelKind::Label, target));
                self.enqueue(target);
                if fallthrough {
                    self.enqueue(next);
                }
            }
            Flow::Call(target) => {
                let target = self.image.wrap(target);
                merge_label(&mut self.listing.labels, target, Label::auto(LabelKind::Function, target));
                self.enqueue(target);
                self.enqueue(next);
            }
            Flow::Stop => {}
            Flow::Next => self.enqueue(next),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Image whose reset vector points at word index 2 (address 4).
    fn program(code: &[u16]) -> Vec<u8> {
        let mut words = vec![0x0000, 0x0004];
        words.extend_from_slice(code);
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn mnemonics(l: &Listing) -> Vec<(u32, &'static str)> {
        l.code.iter().map(|(a, e)| (*a, e.record.mnemonic)).collect()
    }

    #[test]
    fn terminal_brk_stops_traversal() {
        let d = Disassembler::new(&program(&[0x0000, 0xFFFF, 0x0000])).unwrap();
        let l = d.disassemble();
        assert_eq!(mnemonics(&l), vec![(4, "MOV"), (6, "BRK")]);
        assert_eq!(l.labels[&4], Label::new(LabelKind::Function, "start"));
    }

    #[test]
    fn conditional_branch_visits_both_paths() {
        // 4: BNE 8 / 6: BRK / 8: RT
        let d = Disassembler::new(&program(&[0xC801, 0xFFFF, 0xFE1F])).unwrap();
        let l = d.disassemble();
        assert_eq!(mnemonics(&l), vec![(4, "BC"), (6, "BRK"), (8, "RT")]);
        assert_eq!(l.labels[&8], Label::auto(LabelKind::Label, 8));
    }

    #[test]
    fn branch_always_has_no_fallthrough() {
        let d = Disassembler::new(&program(&[0xCE01, 0xFFFF, 0xFE1F])).unwrap();
        assert_eq!(mnemonics(&d.disassemble()), vec![(4, "BC"), (8, "RT")]);
    }

    #[test]
    fn unknown_word_falls_through() {
        let d = Disassembler::new(&program(&[0xFFFE, 0xFFFF])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.code[&4].record, Record::data(0xFFFE));
        assert_eq!(l.code[&4].words, vec![0xFFFE]);
        assert_eq!(l.code[&6].record.mnemonic, "BRK");
    }

    #[test]
    fn call_upgrades_branch_label() {
        // 4: BNE 0x0C / 6: BL 0:000C / A: BRK / C: RT
        let d = Disassembler::new(&program(&[0xC803, 0xF001, 0x000C, 0xFFFF, 0xFE1F])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.labels[&0x0C], Label::auto(LabelKind::Function, 0x0C));
        assert_eq!(mnemonics(&l), vec![(4, "BC"), (6, "BL"), (0x0A, "BRK"), (0x0C, "RT")]);
    }

    #[test]
    fn jump_never_downgrades_function() {
        // 4: BL 0:000C / 8: B 0:000C / C: RT
        let d = Disassembler::new(&program(&[0xF001, 0x000C, 0xF000, 0x000C, 0xFE1F])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.labels[&0x0C].kind, LabelKind::Function);
        assert_eq!(l.code[&4].words, vec![0xF001, 0x000C]);
        assert_eq!(mnemonics(&l), vec![(4, "BL"), (8, "B"), (0x0C, "RT")]);
    }

    #[test]
    fn self_loop_terminates() {
        let d = Disassembler::new(&program(&[0xF000, 0x0004])).unwrap();
        assert_eq!(mnemonics(&d.disassemble()), vec![(4, "B")]);
    }

    #[test]
    fn prefix_fuses_into_memory_operand() {
        // 4: DSR <- #12H / 6: L R0, [EA] / 8: BRK
        let d = Disassembler::new(&program(&[0xE312, 0x9030, 0xFFFF])).unwrap();
        let l = d.disassemble();
        let e = &l.code[&4];
        assert_eq!(e.words, vec![0xE312, 0x9030]);
        assert_eq!(e.record.to_string(), "L R0, 12H:[EA]");
        assert!(!l.code.contains_key(&6));
        assert_eq!(l.code[&8].record.mnemonic, "BRK");
    }

    #[test]
    fn orphaned_prefix_keeps_real_instruction() {
        // 4: DSR <- R3 / 6: MOV R0, #12H / 8: BRK
        let d = Disassembler::new(&program(&[0x903F, 0x0012, 0xFFFF])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.code[&4].record, Record::data(0x903F));
        assert_eq!(l.code[&6].record.to_string(), "MOV R0, #12H");
        assert_eq!(l.code[&8].record.mnemonic, "BRK");
    }

    #[test]
    fn orphaned_dsr_self_prefix_is_edsr() {
        let d = Disassembler::new(&program(&[0xFE9F, 0xFE9F, 0x9030, 0xFFFF])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.code[&4].record.mnemonic, "EDSR");
        assert_eq!(l.code[&6].record.to_string(), "L R0, DSR:[EA]");
    }

    #[test]
    fn prefix_before_jump_does_not_fuse() {
        // 4: DSR <- #1H / 6: B 0:000E / A, C: data / E: RT
        let d = Disassembler::new(&program(&[0xE301, 0xF000, 0x000E, 0xFFFE, 0xFFFE, 0xFE1F])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.code[&4].record, Record::data(0xE301));
        assert_eq!(l.code[&6].record.to_string(), "B 0:000EH");
        assert_eq!(mnemonics(&l), vec![(4, "DW"), (6, "B"), (0x0E, "RT")]);
        assert_eq!(l.labels[&0x0E], Label::auto(LabelKind::Label, 0x0E));
    }

    #[test]
    fn prefix_before_call_keeps_target() {
        // 4: DSR <- R3 / 6: BL 0:000C / A: BRK / C: RT
        let d = Disassembler::new(&program(&[0x903F, 0xF001, 0x000C, 0xFFFF, 0xFE1F])).unwrap();
        let l = d.disassemble();
        assert_eq!(l.labels[&0x0C].kind, LabelKind::Function);
        assert_eq!(mnemonics(&l), vec![(4, "DW"), (6, "BL"), (0x0A, "BRK"), (0x0C, "RT")]);
    }

    #[test]
    fn prefix_streak_decodes_each_word_once() {
        let bytes: Vec<u8> = [0xE300u16; 8].iter().flat_map(|w| w.to_le_bytes()).collect();
        let l = Disassembler::new(&bytes).unwrap().disassemble();
        assert_eq!(l.code.len(), 8);
        assert_eq!(l.steps, 8);
        assert!(l.code.values().all(|e| e.words.len() == 1));
    }

    #[test]
    fn repeated_runs_are_identical() {
        let d = Disassembler::new(&program(&[0xC803, 0xF001, 0x000C, 0xFFFF, 0xE312, 0x9030, 0xFE1F])).unwrap();
        assert_eq!(d.disassemble(), d.disassemble());
    }

    #[test]
    fn seeds_extend_traversal() {
        let mut d = Disassembler::new(&program(&[0xFFFF, 0xFE1F, 0x0000, 0x0000])).unwrap();
        d.seed(6, Label::new(LabelKind::Function, "handler"));
        d.seed(8, Label::new(LabelKind::Data, "table"));
        let l = d.disassemble();
        assert_eq!(mnemonics(&l), vec![(4, "BRK"), (6, "RT")]);
        assert_eq!(l.labels[&6].name, "handler");
        assert_eq!(l.labels[&8].kind, LabelKind::Data);
    }

    #[test]
    fn step_limit_bounds_traversal() {
        let cfg = DisasmConfig { max_steps: 1 };
        let d = Disassembler::with_config(&program(&[0x0000, 0x0000, 0xFFFF]), cfg).unwrap();
        assert_eq!(d.disassemble().code.len(), 1);
    }

    #[test]
    fn work_list_is_lifo_without_duplicates() {
        let mut w = WorkList::new(16);
        assert!(w.push(4));
        assert!(w.push(8));
        assert!(!w.push(4));
        assert!(w.contains(4));
        assert_eq!(w.pop(), Some(8));
        assert_eq!(w.pop(), Some(4));
        assert!(w.is_empty());
        assert!(!w.contains(4));
    }

    #[test]
    fn merge_keeps_custom_names() {
        let mut labels = BTreeMap::new();
        merge_label(&mut labels, 0x10, Label::new(LabelKind::Label, "loop"));
        merge_label(&mut labels, 0x10, Label::auto(LabelKind::Function, 0x10));
        assert_eq!(labels[&0x10], Label::new(LabelKind::Function, "loop"));
        merge_label(&mut labels, 0x10, Label::auto(LabelKind::Label, 0x10));
        assert_eq!(labels[&0x10].kind, LabelKind::Function);
    }
}
