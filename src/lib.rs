pub mod decoder;
pub mod disasm;
pub mod instructions;
pub mod memory;
pub mod operand;

pub mod isa {
    pub mod handlers;
    pub mod nxu8; // nX-U8/100 core
}

pub use decoder::{Decoded, DecodeError, Decoder, Record};
pub use isa::nxu8::{lookup, U8Decoder};
pub use memory::{CodeImage, Cursor, ImageError};
pub use operand::{Address, Operand};
