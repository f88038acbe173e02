//! nX-U8/100 instruction pattern table.
//!
//! Every entry is plain data: the fixed bits of the encoding plus up to two
//! operand fields. A field names the bits it covers, the shift that brings
//! them down to bit 0, handler-specific flags and the [`Handler`] that turns
//! the extracted value into an operand. All bits not covered by a field must
//! equal the template's fixed bits.

use serde::Serialize;

/// Operand construction strategies. Dispatch lives in `isa::handlers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Handler {
    /// Register of `flags` bytes.
    Reg,
    /// Signed immediate, `flags` bits wide.
    Num,
    /// Unsigned immediate, `flags` bits wide.
    Unsigned,
    /// Control register, selector is `value | flags`.
    Control,
    /// Branch condition code.
    Cond,
    /// Memory operand, `flags` packed by [`mem`].
    Mem,
    /// Two-word absolute code address, field is the segment.
    Far,
    /// PC-relative 8-bit word displacement.
    Rel,
    /// PUSH/POP register list; `flags` 0 = push, 1 = pop.
    RegList,
    /// `Rn.b` from a `nnnn0bbb` field.
    RegBit,
    /// `Dadr.b`, bit from the field, address from the next word.
    BitAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Field {
    pub mask: u16,
    pub shift: u32,
    pub flags: u16,
    pub handler: Handler,
}

impl Field {
    pub fn extract(&self, word: u16) -> u16 {
        (word & self.mask) >> self.shift
    }

    pub fn insert(&self, value: u16) -> u16 {
        (value << self.shift) & self.mask
    }
}

/// Bits that must repeat operand 0's field (EXTBW encodes its register
/// twice).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mirror {
    pub mask: u16,
    pub shift: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Template {
    pub mnemonic: &'static str,
    pub bits: u16,
    pub ops: [Option<Field>; 2],
    pub mirror: Option<Mirror>,
}

impl Template {
    /// Bits that must equal `bits` for a word to match.
    pub const fn mask(&self) -> u16 {
        let mut care = 0u16;
        if let Some(f) = self.ops[0] {
            care |= f.mask;
        }
        if let Some(f) = self.ops[1] {
            care |= f.mask;
        }
        if let Some(m) = self.mirror {
            care |= m.mask;
        }
        !care
    }

    pub fn matches(&self, word: u16) -> bool {
        let mask = self.mask();
        if word & mask != self.bits & mask {
            return false;
        }
        match (self.mirror, self.ops[0]) {
            (Some(m), Some(f)) => (word & m.mask) >> m.shift == f.extract(word),
            _ => true,
        }
    }

    pub fn operand_count(&self) -> usize {
        self.ops.iter().flatten().count()
    }

    /// Inverse of field extraction: builds the word carrying `values` in the
    /// operand fields. Values wider than their field are truncated.
    pub fn encode(&self, values: [u16; 2]) -> u16 {
        let mut word = self.bits & self.mask();
        for (f, v) in self.ops.iter().zip(values) {
            if let Some(f) = f {
                word |= f.insert(v);
            }
        }
        if let (Some(m), Some(f)) = (self.mirror, self.ops[0]) {
            word |= (f.extract(word) << m.shift) & m.mask;
        }
        word
    }
}

/// Packs memory operand flags: segment flag, displacement kind (0 none,
/// 1 next word, 2 from field), extra displacement width (field width - 1)
/// and base selector (0 absolute, 1 EA, 2 ERm from field, 3 BP, 4 FP).
pub const fn mem(seg: u16, disp: u16, width: u16, sel: u16) -> u16 {
    ((seg & 0xF) << 12) | ((disp & 0xF) << 8) | ((width & 0xF) << 4) | (sel & 0xF)
}

const fn f(mask: u16, shift: u32, flags: u16, handler: Handler) -> Option<Field> {
    Some(Field { mask, shift, flags, handler })
}

const fn t(mnemonic: &'static str, bits: u16, a: Option<Field>, b: Option<Field>) -> Template {
    Template { mnemonic, bits, ops: [a, b], mirror: None }
}

const fn fixed(mnemonic: &'static str, bits: u16) -> Template {
    t(mnemonic, bits, None, None)
}

const fn ctl(sel: u16) -> Option<Field> {
    f(0, 0, sel, Handler::Control)
}

const RN: Option<Field> = f(0x0F00, 8, 1, Handler::Reg);
const RM: Option<Field> = f(0x00F0, 4, 1, Handler::Reg);
const ERN: Option<Field> = f(0x0E00, 8, 2, Handler::Reg);
const ERM: Option<Field> = f(0x00E0, 4, 2, Handler::Reg);
const XRN: Option<Field> = f(0x0C00, 8, 4, Handler::Reg);
const QRN: Option<Field> = f(0x0800, 8, 8, Handler::Reg);

const IMM8: Option<Field> = f(0x00FF, 0, 8, Handler::Num);
const IMM7: Option<Field> = f(0x007F, 0, 7, Handler::Num);
const UIMM8: Option<Field> = f(0x00FF, 0, 8, Handler::Unsigned);
const WIDTH: Option<Field> = f(0x0070, 4, 3, Handler::Unsigned);
const SNUM: Option<Field> = f(0x003F, 0, 6, Handler::Unsigned);

const AT_EA: Option<Field> = f(0, 0, mem(0, 0, 0, 1), Handler::Mem);
const AT_EA_INC: Option<Field> = f(0, 0, mem(8, 0, 0, 1), Handler::Mem);
const AT_ERM: Option<Field> = f(0x00E0, 4, mem(0, 0, 0, 2), Handler::Mem);
const D16_ERM: Option<Field> = f(0x00E0, 4, mem(0, 1, 0, 2), Handler::Mem);
const D6_BP: Option<Field> = f(0x003F, 0, mem(0, 2, 5, 3), Handler::Mem);
const D6_FP: Option<Field> = f(0x003F, 0, mem(0, 2, 5, 4), Handler::Mem);
const DADR: Option<Field> = f(0, 0, mem(0, 1, 0, 0), Handler::Mem);

const ECSR: Option<Field> = ctl(0);
const ELR: Option<Field> = ctl(1);
const PSW: Option<Field> = ctl(2);
const EPSW: Option<Field> = ctl(3);
const SP: Option<Field> = ctl(4);

const COND: Option<Field> = f(0x0F00, 8, 0, Handler::Cond);
const REL: Option<Field> = f(0x00FF, 0, 0, Handler::Rel);
const FAR: Option<Field> = f(0x0F00, 8, 0, Handler::Far);
const PUSH_LIST: Option<Field> = f(0x0F00, 8, 0, Handler::RegList);
const POP_LIST: Option<Field> = f(0x0F00, 8, 1, Handler::RegList);
const REG_BIT: Option<Field> = f(0x0F70, 4, 0, Handler::RegBit);
const BIT_ADR: Option<Field> = f(0x0070, 4, 0, Handler::BitAddr);

/// Segment prefix instructions. Always tried before [`TABLE`].
pub static PREFIX_TABLE: &[Template] = &[
    t("DSR", 0xE300, UIMM8, None),
    t("DSR", 0x900F, RM, None),
    t("DSR", 0xFE9F, f(0, 0, 6, Handler::Control), None),
];

/// Main table, first match wins.
pub static TABLE: &[Template] = &[
    // fixed encodings
    fixed("BRK", 0xFFFF),
    fixed("EI", 0xED08),
    fixed("DI", 0xEBF7),
    fixed("SC", 0xED80),
    fixed("RC", 0xEB7F),
    fixed("CPLC", 0xFECF),
    fixed("NOP", 0xFE8F),
    fixed("RT", 0xFE1F),
    fixed("RTI", 0xFE0F),
    t("INC", 0xFE2F, AT_EA, None),
    t("DEC", 0xFE3F, AT_EA, None),
    // 8-bit ALU, register operands
    t("MOV", 0x8000, RN, RM),
    t("ADD", 0x8001, RN, RM),
    t("AND", 0x8002, RN, RM),
    t("OR", 0x8003, RN, RM),
    t("XOR", 0x8004, RN, RM),
    t("CMPC", 0x8005, RN, RM),
    t("ADDC", 0x8006, RN, RM),
    t("CMP", 0x8007, RN, RM),
    t("SUB", 0x8008, RN, RM),
    t("SUBC", 0x8009, RN, RM),
    t("SLL", 0x800A, RN, RM),
    t("SLLC", 0x800B, RN, RM),
    t("SRL", 0x800C, RN, RM),
    t("SRLC", 0x800D, RN, RM),
    t("SRA", 0x800E, RN, RM),
    t("DAA", 0x801F, RN, None),
    t("DAS", 0x803F, RN, None),
    t("NEG", 0x805F, RN, None),
    Template { mnemonic: "EXTBW", bits: 0x810F, ops: [ERN, None], mirror: Some(Mirror { mask: 0x00E0, shift: 4 }) },
    // 8-bit ALU, immediate operands
    t("MOV", 0x0000, RN, IMM8),
    t("ADD", 0x1000, RN, IMM8),
    t("AND", 0x2000, RN, IMM8),
    t("OR", 0x3000, RN, IMM8),
    t("XOR", 0x4000, RN, IMM8),
    t("CMPC", 0x5000, RN, IMM8),
    t("ADDC", 0x6000, RN, IMM8),
    t("CMP", 0x7000, RN, IMM8),
    // shifts by immediate width
    t("SLL", 0x900A, RN, WIDTH),
    t("SLLC", 0x900B, RN, WIDTH),
    t("SRL", 0x900C, RN, WIDTH),
    t("SRLC", 0x900D, RN, WIDTH),
    t("SRA", 0x900E, RN, WIDTH),
    // 16-bit ALU
    t("MOV", 0xF005, ERN, ERM),
    t("ADD", 0xF006, ERN, ERM),
    t("CMP", 0xF007, ERN, ERM),
    t("MOV", 0xE000, ERN, IMM7),
    t("ADD", 0xE080, ERN, IMM7),
    t("ADD", 0xE100, SP, IMM8),
    t("MUL", 0xF004, ERN, RM),
    t("DIV", 0xF009, ERN, RM),
    // loads
    t("L", 0x9032, ERN, AT_EA),
    t("L", 0x9052, ERN, AT_EA_INC),
    t("L", 0x9012, ERN, DADR),
    t("L", 0x9002, ERN, AT_ERM),
    t("L", 0xA008, ERN, D16_ERM),
    t("L", 0xB000, ERN, D6_BP),
    t("L", 0xB040, ERN, D6_FP),
    t("L", 0x9030, RN, AT_EA),
    t("L", 0x9050, RN, AT_EA_INC),
    t("L", 0x9010, RN, DADR),
    t("L", 0x9000, RN, AT_ERM),
    t("L", 0x9008, RN, D16_ERM),
    t("L", 0xD000, RN, D6_BP),
    t("L", 0xD040, RN, D6_FP),
    t("L", 0x9034, XRN, AT_EA),
    t("L", 0x9054, XRN, AT_EA_INC),
    t("L", 0x9036, QRN, AT_EA),
    t("L", 0x9056, QRN, AT_EA_INC),
    // stores
    t("ST", 0x9033, ERN, AT_EA),
    t("ST", 0x9053, ERN, AT_EA_INC),
    t("ST", 0x9013, ERN, DADR),
    t("ST", 0x9003, ERN, AT_ERM),
    t("ST", 0xA009, ERN, D16_ERM),
    t("ST", 0xB080, ERN, D6_BP),
    t("ST", 0xB0C0, ERN, D6_FP),
    t("ST", 0x9031, RN, AT_EA),
    t("ST", 0x9051, RN, AT_EA_INC),
    t("ST", 0x9011, RN, DADR),
    t("ST", 0x9001, RN, AT_ERM),
    t("ST", 0x9009, RN, D16_ERM),
    t("ST", 0xD080, RN, D6_BP),
    t("ST", 0xD0C0, RN, D6_FP),
    t("ST", 0x9035, XRN, AT_EA),
    t("ST", 0x9055, XRN, AT_EA_INC),
    t("ST", 0x9037, QRN, AT_EA),
    t("ST", 0x9057, QRN, AT_EA_INC),
    // EA
    t("LEA", 0xF00A, AT_ERM, None),
    t("LEA", 0xF00B, D16_ERM, None),
    t("LEA", 0xF00C, DADR, None),
    // control registers
    t("MOV", 0xA00F, ECSR, RM),
    t("MOV", 0xA00D, ELR, ERN),
    t("MOV", 0xA00C, EPSW, RM),
    t("MOV", 0xA00B, PSW, RM),
    t("MOV", 0xE900, PSW, UIMM8),
    t("MOV", 0xA10A, SP, ERM),
    t("MOV", 0xA005, ERN, ELR),
    t("MOV", 0xA01A, ERN, SP),
    t("MOV", 0xA007, RN, ECSR),
    t("MOV", 0xA004, RN, EPSW),
    t("MOV", 0xA003, RN, PSW),
    // stack
    t("PUSH", 0xF0CE, PUSH_LIST, None),
    t("POP", 0xF08E, POP_LIST, None),
    t("PUSH", 0xF04E, RN, None),
    t("PUSH", 0xF05E, ERN, None),
    t("PUSH", 0xF06E, XRN, None),
    t("PUSH", 0xF07E, QRN, None),
    t("POP", 0xF00E, RN, None),
    t("POP", 0xF01E, ERN, None),
    t("POP", 0xF02E, XRN, None),
    t("POP", 0xF03E, QRN, None),
    // bit access
    t("SB", 0xA080, BIT_ADR, None),
    t("TB", 0xA081, BIT_ADR, None),
    t("RB", 0xA082, BIT_ADR, None),
    t("SB", 0xA000, REG_BIT, None),
    t("TB", 0xA001, REG_BIT, None),
    t("RB", 0xA002, REG_BIT, None),
    // control transfer
    t("SWI", 0xE500, SNUM, None),
    t("B", 0xF000, FAR, None),
    t("BL", 0xF001, FAR, None),
    t("B", 0xF002, ERM, None),
    t("BL", 0xF003, ERM, None),
    t("BC", 0xC000, COND, REL),
];
