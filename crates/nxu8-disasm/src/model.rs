use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::analyze::{Label, LabelKind};

/// Reads a flat ROM dump. `skip` and `len` select a window of the file.
pub fn load_raw_bin(path: &Path, skip: usize, len: Option<usize>) -> Result<Vec<u8>> {
    let file = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(skip <= file.len(), "--skip exceeds file size");
    let mut payload = &file[skip..];
    if let Some(lim) = len {
        anyhow::ensure!(lim <= payload.len(), "--len exceeds remaining file size after skip");
        payload = &payload[..lim];
    }
    Ok(payload.to_vec())
}

/// One line of a label file: `{"addr": 4660, "kind": "function", "name": "main"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSeed {
    pub addr: u32,
    pub kind: LabelKind,
    pub name: String,
}

impl LabelSeed {
    pub fn into_label(self) -> (u32, Label) {
        (self.addr, Label::new(self.kind, self.name))
    }
}

pub fn load_labels(path: &Path) -> Result<Vec<LabelSeed>> {
    let s = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let seeds = serde_json::from_str(&s).with_context(|| format!("parsing labels in {}", path.display()))?;
    Ok(seeds)
}

pub fn labels_to_seeds(labels: &BTreeMap<u32, Label>) -> Vec<LabelSeed> {
    labels
        .iter()
        .map(|(addr, l)| LabelSeed { addr: *addr, kind: l.kind, name: l.name.clone() })
        .collect()
}

pub fn save_labels(path: &Path, labels: &BTreeMap<u32, Label>) -> Result<()> {
    let s = serde_json::to_string_pretty(&labels_to_seeds(labels))?;
    std::fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
