use std::fmt;

use bitflags::bitflags;
use serde::Serialize;

use crate::decoder::DecodeError;

/// General purpose register view: R (1 byte), ER (2), XR (4) or QR (8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Register {
    size: u8,
    index: u8,
}

impl Register {
    /// Base pointer, ER12.
    pub const BP: Register = Register { size: 2, index: 12 };
    /// Frame pointer, ER14.
    pub const FP: Register = Register { size: 2, index: 14 };

    pub fn new(size: u8, index: u8) -> Result<Self, DecodeError> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(DecodeError::RegisterSize(size));
        }
        if index >= 16 || index % size != 0 {
            return Err(DecodeError::RegisterIndex { size, index });
        }
        Ok(Self { size, index })
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    fn prefix(&self) -> &'static str {
        match self.size {
            1 => "R",
            2 => "ER",
            4 => "XR",
            _ => "QR",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.index)
    }
}

/// A single bit of a byte register, `Rn.b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterBit {
    register: Register,
    bit: u8,
}

impl RegisterBit {
    pub fn new(register: Register, bit: u8) -> Result<Self, DecodeError> {
        if register.size() != 1 {
            return Err(DecodeError::RegisterSize(register.size()));
        }
        if bit >= 8 {
            return Err(DecodeError::BitOffset(bit));
        }
        Ok(Self { register, bit })
    }

    pub fn register(&self) -> Register {
        self.register
    }

    pub fn bit(&self) -> u8 {
        self.bit
    }
}

impl fmt::Display for RegisterBit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.register, self.bit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Radix {
    Hex,
    Dec,
    Oct,
    Bin,
}

/// Immediate or displacement value of a fixed bit width.
///
/// Width and value are the identity of a `Num`; `immediate`, `radix` and
/// `signed` only change how it is displayed and can be flipped freely by a
/// renderer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Num {
    width: u8,
    raw: u32,
    pub immediate: bool,
    pub radix: Radix,
    pub signed: bool,
}

impl Num {
    /// Non-immediate, unsigned, hex. `raw` is masked to `width` bits.
    pub fn new(width: u8, raw: u32) -> Self {
        let width = width.clamp(1, 32);
        Self { width, raw: raw & mask(width), immediate: false, radix: Radix::Hex, signed: false }
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Numeric value with the current signedness applied.
    pub fn value(&self) -> i64 {
        if self.signed {
            sign_extend(self.raw, self.width) as i64
        } else {
            self.raw as i64
        }
    }
}

impl PartialEq for Num {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.raw == other.raw
    }
}

impl Eq for Num {}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.value();
        let mag = v.unsigned_abs();
        let digits = match self.radix {
            Radix::Hex => format!("{mag:X}H"),
            Radix::Dec => mag.to_string(),
            Radix::Oct => format!("{mag:o}O"),
            Radix::Bin => format!("{mag:b}B"),
        };
        if self.immediate {
            f.write_str("#")?;
        }
        if v < 0 {
            f.write_str("-")?;
        }
        f.write_str(&lead_zero(digits))
    }
}

pub(crate) fn mask(width: u8) -> u32 {
    if width >= 32 { u32::MAX } else { (1u32 << width) - 1 }
}

/// Two's-complement sign extension of the low `bits` bits of `v`.
pub fn sign_extend(v: u32, bits: u8) -> i32 {
    let s = 32 - u32::from(bits.clamp(1, 32));
    ((v << s) as i32) >> s
}

/// Hex literals must not start with a letter or they read as symbols.
fn lead_zero(s: String) -> String {
    match s.chars().next() {
        Some(c) if !c.is_ascii_digit() => format!("0{s}"),
        _ => s,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlRegister {
    Ecsr,
    Elr,
    Psw,
    Epsw,
    Sp,
    Dsr,
}

impl ControlRegister {
    pub fn from_selector(sel: u8) -> Result<Self, DecodeError> {
        Ok(match sel {
            0 => Self::Ecsr,
            1 => Self::Elr,
            2 => Self::Psw,
            3 => Self::Epsw,
            4 => Self::Sp,
            6 => Self::Dsr,
            _ => return Err(DecodeError::ControlRegister(sel)),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ecsr => "ECSR",
            Self::Elr => "ELR",
            Self::Psw => "PSW",
            Self::Epsw => "EPSW",
            Self::Sp => "SP",
            Self::Dsr => "DSR",
        }
    }
}

impl fmt::Display for ControlRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Condition {
    Ge,
    Lt,
    Gt,
    Le,
    Ges,
    Lts,
    Gts,
    Les,
    Ne,
    Eq,
    Nv,
    Ov,
    Ps,
    Ns,
    Al,
}

impl Condition {
    const ALL: [Condition; 15] = [
        Self::Ge, Self::Lt, Self::Gt, Self::Le, Self::Ges, Self::Lts, Self::Gts, Self::Les,
        Self::Ne, Self::Eq, Self::Nv, Self::Ov, Self::Ps, Self::Ns, Self::Al,
    ];

    pub fn from_selector(sel: u8) -> Result<Self, DecodeError> {
        Self::ALL.get(sel as usize).copied().ok_or(DecodeError::Condition(sel))
    }

    pub fn selector(&self) -> u8 {
        *self as u8
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Ge => "GE",
            Self::Lt => "LT",
            Self::Gt => "GT",
            Self::Le => "LE",
            Self::Ges => "GES",
            Self::Lts => "LTS",
            Self::Gts => "GTS",
            Self::Les => "LES",
            Self::Ne => "NE",
            Self::Eq => "EQ",
            Self::Nv => "NV",
            Self::Ov => "OV",
            Self::Ps => "PS",
            Self::Ns => "NS",
            Self::Al => "AL",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PointerBase {
    Reg(Register),
    /// The EA pseudo-register.
    Ea,
    /// EA with post-increment.
    EaPlus,
}

impl fmt::Display for PointerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "{r}"),
            Self::Ea => f.write_str("EA"),
            Self::EaPlus => f.write_str("EA+"),
        }
    }
}

/// Indirect memory reference `disp[base]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pointer {
    pub base: PointerBase,
    pub disp: Option<Num>,
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(d) = &self.disp {
            write!(f, "{d}")?;
        }
        write!(f, "[{}]", self.base)
    }
}

/// Absolute address; `segment` is the 4-bit code/data segment when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Address {
    pub offset: u16,
    pub segment: Option<u8>,
}

impl Address {
    pub fn new(offset: u16) -> Self {
        Self { offset, segment: None }
    }

    pub fn far(segment: u8, offset: u16) -> Self {
        Self { offset, segment: Some(segment & 0xF) }
    }

    /// Flat 20-bit address; a missing segment counts as segment 0.
    pub fn linear(&self) -> u32 {
        (u32::from(self.segment.unwrap_or(0)) << 16) | u32::from(self.offset)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(seg) = self.segment {
            write!(f, "{seg:X}:")?;
        }
        f.write_str(&lead_zero(format!("{:04X}H", self.offset)))
    }
}

/// Direct bit address, `Dadr.b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BitAddress {
    pub address: Address,
    pub bit: u8,
}

impl fmt::Display for BitAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.bit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StackOp {
    Push,
    Pop,
}

bitflags! {
    /// The `lepa` field of PUSH/POP register_list.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct ListMask: u8 {
        const A = 1 << 0;
        const P = 1 << 1;
        const E = 1 << 2;
        const L = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterList {
    pub op: StackOp,
    pub mask: ListMask,
}

impl RegisterList {
    pub fn new(op: StackOp, bits: u8) -> Result<Self, DecodeError> {
        let mask = ListMask::from_bits_truncate(bits);
        if mask.is_empty() {
            return Err(DecodeError::EmptyRegisterList);
        }
        Ok(Self { op, mask })
    }

    /// Register names in the order the hardware transfers them.
    pub fn names(&self) -> Vec<&'static str> {
        let order: [(ListMask, &'static str); 4] = match self.op {
            StackOp::Push => [
                (ListMask::E, "ELR"),
                (ListMask::P, "EPSW"),
                (ListMask::L, "LR"),
                (ListMask::A, "EA"),
            ],
            StackOp::Pop => [
                (ListMask::A, "EA"),
                (ListMask::E, "PC"),
                (ListMask::P, "PSW"),
                (ListMask::L, "LR"),
            ],
        };
        order.iter().filter(|(m, _)| self.mask.contains(*m)).map(|(_, n)| *n).collect()
    }

    /// Popping PC transfers control, the POP acts as a return.
    pub fn pops_pc(&self) -> bool {
        self.op == StackOp::Pop && self.mask.contains(ListMask::E)
    }
}

impl fmt::Display for RegisterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}

/// Where a DSR prefix took its segment value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentSource {
    Register(Register),
    Num(Num),
    /// DSR itself (the `DSR <- DSR` prefix).
    Dsr,
}

impl TryFrom<Operand> for SegmentSource {
    type Error = DecodeError;

    fn try_from(op: Operand) -> Result<Self, Self::Error> {
        match op {
            Operand::Register(r) => Ok(Self::Register(r)),
            Operand::Num(mut n) => {
                n.immediate = false;
                Ok(Self::Num(n))
            }
            Operand::Control(ControlRegister::Dsr) => Ok(Self::Dsr),
            _ => Err(DecodeError::SegmentSource),
        }
    }
}

impl fmt::Display for SegmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(r) => write!(f, "{r}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Dsr => f.write_str("DSR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MemoryOperand {
    Pointer(Pointer),
    Address(Address),
    BitAddress(BitAddress),
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pointer(p) => write!(f, "{p}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::BitAddress(b) => write!(f, "{b}"),
        }
    }
}

/// Memory operand qualified by a preceding DSR prefix instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DsrPrefix {
    pub segment: SegmentSource,
    pub item: MemoryOperand,
}

impl fmt::Display for DsrPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.item)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Register(Register),
    RegisterBit(RegisterBit),
    Num(Num),
    Control(ControlRegister),
    Condition(Condition),
    Pointer(Pointer),
    Address(Address),
    BitAddress(BitAddress),
    Dsr(DsrPrefix),
    List(RegisterList),
}

impl Operand {
    /// Splits out operands a DSR prefix can qualify.
    pub fn into_memory(self) -> Result<MemoryOperand, Operand> {
        match self {
            Self::Pointer(p) => Ok(MemoryOperand::Pointer(p)),
            Self::Address(a) => Ok(MemoryOperand::Address(a)),
            Self::BitAddress(b) => Ok(MemoryOperand::BitAddress(b)),
            other => Err(other),
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Pointer(_) | Self::Address(_) | Self::BitAddress(_))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register(r) => write!(f, "{r}"),
            Self::RegisterBit(b) => write!(f, "{b}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Control(c) => write!(f, "{c}"),
            Self::Condition(c) => write!(f, "{c}"),
            Self::Pointer(p) => write!(f, "{p}"),
            Self::Address(a) => write!(f, "{a}"),
            Self::BitAddress(b) => write!(f, "{b}"),
            Self::Dsr(d) => write!(f, "{d}"),
            Self::List(l) => write!(f, "{l}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_validates_alignment() {
        assert_eq!(Register::new(2, 4).unwrap().to_string(), "ER4");
        assert_eq!(Register::new(8, 8).unwrap().to_string(), "QR8");
        assert!(Register::new(2, 3).is_err());
        assert!(Register::new(4, 16).is_err());
        assert!(Register::new(3, 0).is_err());
    }

    #[test]
    fn num_hex_gets_leading_zero() {
        assert_eq!(Num::new(8, 0xFF).immediate().to_string(), "#0FFH");
        assert_eq!(Num::new(8, 0x7F).immediate().signed().to_string(), "#7FH");
        assert_eq!(Num::new(8, 0xFF).immediate().signed().to_string(), "#-1H");
    }

    #[test]
    fn num_radix_variants() {
        let mut n = Num::new(8, 0xFF).immediate().signed();
        n.radix = Radix::Dec;
        assert_eq!(n.to_string(), "#-1");
        n.signed = false;
        assert_eq!(n.to_string(), "#255");
        n.radix = Radix::Oct;
        assert_eq!(n.to_string(), "#377O");
        n.radix = Radix::Bin;
        n.immediate = false;
        assert_eq!(n.to_string(), "11111111B");
    }

    #[test]
    fn num_identity_ignores_presentation() {
        let a = Num::new(8, 0x1FF);
        assert_eq!(a.raw(), 0xFF);
        assert_eq!(a, Num::new(8, 0xFF).immediate().signed());
        assert_ne!(a, Num::new(16, 0xFF));
    }

    #[test]
    fn address_rendering() {
        assert_eq!(Address::new(0x100).to_string(), "0100H");
        assert_eq!(Address::far(0xA, 0x100).to_string(), "A:0100H");
        assert_eq!(Address::new(0xB000).to_string(), "0B000H");
        assert_eq!(Address::far(1, 0x2345).linear(), 0x1_2345);
    }

    #[test]
    fn register_list_order_depends_on_direction() {
        let push = RegisterList::new(StackOp::Push, 0xF).unwrap();
        assert_eq!(push.names(), vec!["ELR", "EPSW", "LR", "EA"]);
        let pop = RegisterList::new(StackOp::Pop, 0xF).unwrap();
        assert_eq!(pop.names(), vec!["EA", "PC", "PSW", "LR"]);
        assert!(pop.pops_pc());
        assert!(RegisterList::new(StackOp::Pop, 0).is_err());
    }

    #[test]
    fn pointer_and_prefix_rendering() {
        let p = Pointer { base: PointerBase::Reg(Register::BP), disp: Some(Num::new(6, 0x3E).signed()) };
        assert_eq!(p.to_string(), "-2H[ER12]");
        let d = DsrPrefix {
            segment: SegmentSource::Register(Register::new(1, 2).unwrap()),
            item: MemoryOperand::Pointer(Pointer { base: PointerBase::Ea, disp: None }),
        };
        assert_eq!(d.to_string(), "R2:[EA]");
    }
}
