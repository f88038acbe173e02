use tracing::trace;

use crate::decoder::{Decoded, DecodeError, Decoder, Record, EDSR};
use crate::instructions::{Template, PREFIX_TABLE, TABLE};
use crate::memory::Cursor;
use crate::operand::{Operand, SegmentSource};

/// A template selected for a word.
#[derive(Debug, Clone, Copy)]
pub struct Match {
    pub template: &'static Template,
    pub prefix: bool,
}

/// Finds the template for `word`. Segment prefixes take precedence over the
/// main table regardless of position; main table entries are tried in order.
pub fn lookup(word: u16) -> Option<Match> {
    if let Some(template) = PREFIX_TABLE.iter().find(|t| t.matches(word)) {
        return Some(Match { template, prefix: true });
    }
    TABLE.iter().find(|t| t.matches(word)).map(|template| Match { template, prefix: false })
}

/// nX-U8/100 decoder driven by the pattern tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct U8Decoder;

impl U8Decoder {
    pub fn new() -> Self {
        Self
    }
}

fn operands(t: &Template, word: u16, cur: &mut Cursor<'_>) -> Result<[Option<Operand>; 2], DecodeError> {
    let mut out = [None, None];
    for (slot, field) in out.iter_mut().zip(t.ops.iter()) {
        if let Some(f) = field {
            *slot = Some(f.handler.apply(f.flags, f.extract(word), cur)?);
        }
    }
    Ok(out)
}

impl Decoder for U8Decoder {
    fn decode(&self, cur: &mut Cursor<'_>) -> Decoded {
        let first = cur.words().len();
        let word = cur.fetch();
        let Some(m) = lookup(word) else {
            return Decoded::Data { record: Record::data(word), error: None };
        };

        let decoded = operands(m.template, word, cur).and_then(|ops| {
            if !m.prefix {
                return Ok(Decoded::Insn(Record { mnemonic: m.template.mnemonic, operands: ops }));
            }
            let source = ops[0].ok_or(DecodeError::SegmentSource)?;
            let segment = SegmentSource::try_from(source)?;
            let sentinel = match segment {
                SegmentSource::Dsr => Record::new(EDSR),
                _ => Record::data(word),
            };
            Ok(Decoded::Prefix { sentinel, segment })
        });

        decoded.unwrap_or_else(|error| {
            trace!("{word:04X} rejected by {}: {error}", m.template.mnemonic);
            // Only the opcode word becomes data; the next word may be code.
            cur.truncate(first + 1);
            Decoded::Data { record: Record::data(word), error: Some(error) }
        })
    }
}
