use serde::Serialize;

use crate::memory::Cursor;
use crate::operand::{Num, Operand, SegmentSource};

/// Mnemonic of the fallback record for words that are not instructions.
pub const DATA_WORD: &str = "DW";
/// Mnemonic of a `DSR <- DSR` prefix that no memory operand absorbed.
pub const EDSR: &str = "EDSR";

/// Reasons a single instruction cannot be decoded. Always local to one word:
/// the caller falls back to a [`DATA_WORD`] record.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid register size {0}")]
    RegisterSize(u8),
    #[error("invalid register index {index} for size {size}")]
    RegisterIndex { size: u8, index: u8 },
    #[error("bit offset {0} out of range")]
    BitOffset(u8),
    #[error("invalid control register selector {0}")]
    ControlRegister(u8),
    #[error("invalid condition code {0}")]
    Condition(u8),
    #[error("invalid memory operand flags {flags:#06x} (field {value:#x})")]
    MemoryOperand { flags: u16, value: u16 },
    #[error("empty register list")]
    EmptyRegisterList,
    #[error("operand cannot supply a data segment")]
    SegmentSource,
}

/// Mnemonic plus up to two operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub mnemonic: &'static str,
    pub operands: [Option<Operand>; 2],
}

impl Record {
    pub fn new(mnemonic: &'static str) -> Self {
        Self { mnemonic, operands: [None, None] }
    }

    /// Raw data word fallback.
    pub fn data(word: u16) -> Self {
        Self { mnemonic: DATA_WORD, operands: [Some(Operand::Num(Num::new(16, word.into()))), None] }
    }

    pub fn is_data(&self) -> bool {
        self.mnemonic == DATA_WORD
    }

    pub fn operands(&self) -> impl Iterator<Item = &Operand> {
        self.operands.iter().flatten()
    }

    /// Index of the last present operand.
    pub fn last_operand(&self) -> Option<usize> {
        self.operands.iter().rposition(Option::is_some)
    }
}

/// Result of decoding the word under a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A DSR prefix. `sentinel` is what the word shows as when no following
    /// memory operand absorbs it.
    Prefix { sentinel: Record, segment: SegmentSource },
    Insn(Record),
    /// No template matched, or the matched template rejected its fields.
    /// Only the first word is consumed.
    Data { record: Record, error: Option<DecodeError> },
}

pub trait Decoder {
    /// Decodes the instruction starting at the cursor, fetching extension
    /// words as needed.
    fn decode(&self, cur: &mut Cursor<'_>) -> Decoded;
}
