use std::fmt;

use crate::decoder::Record;
use crate::operand::{Address, DsrPrefix, MemoryOperand, Operand};

/// Renders a record, letting `label` name absolute addresses.
pub fn fmt_record_with<'a>(r: &Record, label: impl Fn(&Address) -> Option<&'a str>) -> String {
    let ops: Vec<String> = r.operands().map(|op| fmt_operand(op, &label)).collect();
    // BC carries its condition as the first operand but is written B<cond>.
    if let ("BC", [Some(Operand::Condition(c)), _]) = (r.mnemonic, &r.operands) {
        return format!("B{c} {}", ops[1..].join(", "));
    }
    if ops.is_empty() {
        r.mnemonic.to_string()
    } else {
        format!("{} {}", r.mnemonic, ops.join(", "))
    }
}

pub fn fmt_record(r: &Record) -> String {
    fmt_record_with(r, |_| None)
}

fn fmt_operand<'a>(op: &Operand, label: &impl Fn(&Address) -> Option<&'a str>) -> String {
    match op {
        Operand::Address(a) => label(a).map(str::to_string).unwrap_or_else(|| a.to_string()),
        Operand::Dsr(DsrPrefix { segment, item: MemoryOperand::Address(a) }) => match label(a) {
            Some(name) => format!("{segment}:{name}"),
            None => op.to_string(),
        },
        other => other.to_string(),
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&fmt_record(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{Condition, Register, SegmentSource};

    #[test]
    fn renders_condition_into_mnemonic() {
        let r = Record {
            mnemonic: "BC",
            operands: [Some(Operand::Condition(Condition::Ne)), Some(Operand::Address(Address::new(0x104)))],
        };
        assert_eq!(fmt_record(&r), "BNE 0104H");
    }

    #[test]
    fn substitutes_labels() {
        let r = Record { mnemonic: "BL", operands: [Some(Operand::Address(Address::far(0, 0x200))), None] };
        let text = fmt_record_with(&r, |a| (a.linear() == 0x200).then_some("FUN_00200"));
        assert_eq!(text, "BL FUN_00200");
    }

    #[test]
    fn renders_prefixed_address() {
        let op = Operand::Dsr(DsrPrefix {
            segment: SegmentSource::Register(Register::new(1, 2).unwrap()),
            item: MemoryOperand::Address(Address::new(0x8000)),
        });
        let r = Record { mnemonic: "L", operands: [Some(Operand::Register(Register::new(1, 0).unwrap())), Some(op)] };
        assert_eq!(r.to_string(), "L R0, R2:8000H");
        assert_eq!(fmt_record(&Record::data(0xFFFE)), "DW 0FFFEH");
    }
}
