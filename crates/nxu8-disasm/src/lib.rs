pub mod analyze;
pub mod listing;
pub mod model;

pub use analyze::{CodeEntry, DisasmConfig, Disassembler, Label, LabelKind, Listing};
pub use listing::{render_json, render_text};
pub use model::{load_labels, load_raw_bin, save_labels, LabelSeed};
