use crate::decoder::DecodeError;
use crate::instructions::Handler;
use crate::memory::Cursor;
use crate::operand::{
    sign_extend, Address, BitAddress, Condition, ControlRegister, Num, Operand, Pointer,
    PointerBase, Register, RegisterBit, RegisterList, StackOp,
};

impl Handler {
    /// Builds the operand for a field. `value` is the field already shifted
    /// down; extension words are fetched through `cur`.
    pub fn apply(self, flags: u16, value: u16, cur: &mut Cursor<'_>) -> Result<Operand, DecodeError> {
        match self {
            Handler::Reg => Ok(Operand::Register(Register::new(flags as u8, value as u8)?)),
            Handler::Num => Ok(Operand::Num(Num::new(flags as u8, value.into()).signed().immediate())),
            Handler::Unsigned => Ok(Operand::Num(Num::new(flags as u8, value.into()).immediate())),
            Handler::Control => Ok(Operand::Control(ControlRegister::from_selector((value | flags) as u8)?)),
            Handler::Cond => Ok(Operand::Condition(Condition::from_selector(value as u8)?)),
            Handler::Mem => memory(flags, value, cur),
            Handler::Far => {
                let offset = cur.fetch();
                Ok(Operand::Address(Address::far(value as u8, offset)))
            }
            Handler::Rel => Ok(Operand::Address(relative(cur.pc(), value))),
            Handler::RegList => {
                let op = if flags == 0 { StackOp::Push } else { StackOp::Pop };
                Ok(Operand::List(RegisterList::new(op, value as u8)?))
            }
            Handler::RegBit => {
                let reg = Register::new(1, (value >> 4) as u8)?;
                Ok(Operand::RegisterBit(RegisterBit::new(reg, (value & 7) as u8)?))
            }
            Handler::BitAddr => {
                let address = Address::new(cur.fetch());
                Ok(Operand::BitAddress(BitAddress { address, bit: (value & 7) as u8 }))
            }
        }
    }
}

/// Branch target for an 8-bit word displacement from `pc` (the address of
/// the following word). Relative branches never leave the pc's segment.
pub fn relative(pc: u32, disp: u16) -> Address {
    let offset = (pc & 0xFFFF) as i32 + sign_extend(disp.into(), 8) * 2;
    Address::far(((pc >> 16) & 0xF) as u8, (offset & 0xFFFF) as u16)
}

fn memory(flags: u16, value: u16, cur: &mut Cursor<'_>) -> Result<Operand, DecodeError> {
    let seg = (flags >> 12) & 0xF;
    let kind = (flags >> 8) & 0xF;
    let width = ((flags >> 4) & 0xF) as u8;
    let sel = flags & 0xF;
    let invalid = DecodeError::MemoryOperand { flags, value };

    if seg & 0x8 != 0 && sel == 1 {
        return Ok(Operand::Pointer(Pointer { base: PointerBase::EaPlus, disp: None }));
    }
    let disp = match kind {
        0 => None,
        1 => Some(Num::new(16, cur.fetch().into())),
        2 => Some(Num::new(width + 1, value.into()).signed()),
        _ => return Err(invalid),
    };
    let base = match sel {
        0 => {
            return match disp {
                Some(d) => Ok(Operand::Address(Address::new(d.raw() as u16))),
                None => Err(invalid),
            }
        }
        1 => PointerBase::Ea,
        2 => PointerBase::Reg(Register::new(2, value as u8)?),
        3 => PointerBase::Reg(Register::BP),
        4 => PointerBase::Reg(Register::FP),
        _ => return Err(invalid),
    };
    Ok(Operand::Pointer(Pointer { base, disp }))
}
