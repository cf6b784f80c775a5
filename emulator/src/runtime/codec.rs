//! Packing and unpacking of instruction words.
//!
//! Every field lives at a fixed place in the 64-bit word. A field is recovered
//! by rotating the whole word to the left until the field lands in the lowest
//! bits, then masking it. Writing a field is the same dance backwards.
//!
//! ```text
//!  63      56 55  52 51  48 47   43 42 41     32 31                    0
//! +----------+------+------+-------+--+---------+-----------------------+
//! |  opcode  | op 1 | op 2 |  reg  |cv| unused  |        address        |
//! +----------+------+------+-------+--+---------+-----------------------+
//! ```

use crate::constants::{Address, Word};

use super::instructions::Opcode;
use super::registers::Reg;

pub const INSTRUCTION_MASK: Word = 0xFF;
pub const REGISTER_MASK: Word = 0xF;
pub const FULL_REGISTER_MASK: Word = 0x1F;
pub const CONVERSION_MASK: Word = 0x1;
pub const ADDRESS_MASK: Word = 0xFFFF_FFFF;

pub const INSTRUCTION_ROTATION: u32 = 8;
pub const OPERAND_ONE_ROTATION: u32 = 12;
pub const OPERAND_TWO_ROTATION: u32 = 16;
pub const FULL_REGISTER_ROTATION: u32 = 21;
pub const CONVERSION_ROTATION: u32 = 22;
pub const ADDRESS_ROTATION: u32 = 0;

/// Extract a field from a word
#[inline]
#[must_use]
pub const fn decode_field(word: Word, rotation: u32, mask: Word) -> Word {
    word.rotate_left(rotation) & mask
}

/// Replace a field in a word, leaving every other bit untouched
#[inline]
#[must_use]
pub const fn encode_field(word: Word, rotation: u32, mask: Word, value: Word) -> Word {
    let rotated = word.rotate_left(rotation);
    ((rotated & !mask) | (value & mask)).rotate_right(rotation)
}

#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_opcode(word: Word) -> u8 {
    // Masked to 8 bits
    decode_field(word, INSTRUCTION_ROTATION, INSTRUCTION_MASK) as u8
}

/// Decode the register selector of one of the two arithmetic operands.
///
/// `rotation` is either [`OPERAND_ONE_ROTATION`] or [`OPERAND_TWO_ROTATION`].
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_narrow_operand(word: Word, rotation: u32) -> u8 {
    decode_field(word, rotation, REGISTER_MASK) as u8
}

/// Decode the full register selector. It can hold values from 0 to 31, but
/// only 0 to 10 name an actual register.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn decode_full_register(word: Word) -> u8 {
    decode_field(word, FULL_REGISTER_ROTATION, FULL_REGISTER_MASK) as u8
}

/// Decode the direction bit of a conversion: `0` converts an integer to a
/// float, `1` a float to an integer.
#[must_use]
pub const fn decode_conversion(word: Word) -> Word {
    decode_field(word, CONVERSION_ROTATION, CONVERSION_MASK)
}

#[must_use]
pub const fn decode_address(word: Word) -> Address {
    decode_field(word, ADDRESS_ROTATION, ADDRESS_MASK)
}

/// Direction of a `CON` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    IntToFloat,
    FloatToInt,
}

impl Conversion {
    #[must_use]
    pub const fn decode(word: Word) -> Self {
        if decode_conversion(word) == 0 {
            Self::IntToFloat
        } else {
            Self::FloatToInt
        }
    }

    const fn bit(self) -> Word {
        match self {
            Self::IntToFloat => 0,
            Self::FloatToInt => 1,
        }
    }
}

/// Builder for instruction words.
///
/// ```
/// use tpm_emulator::runtime::{Instruction, Opcode, Reg};
///
/// let word = Instruction::new(Opcode::Add)
///     .with_operands(Reg::R0, Reg::R1)
///     .encode();
/// assert_eq!(word, 0x0501_0000_0000_0000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(Word);

impl Instruction {
    #[must_use]
    pub const fn new(opcode: Opcode) -> Self {
        Self(encode_field(
            0,
            INSTRUCTION_ROTATION,
            INSTRUCTION_MASK,
            opcode as Word,
        ))
    }

    #[must_use]
    pub const fn with_operands(self, first: Reg, second: Reg) -> Self {
        let word = encode_field(
            self.0,
            OPERAND_ONE_ROTATION,
            REGISTER_MASK,
            first as Word,
        );
        Self(encode_field(
            word,
            OPERAND_TWO_ROTATION,
            REGISTER_MASK,
            second as Word,
        ))
    }

    #[must_use]
    pub const fn with_register(self, reg: Reg) -> Self {
        Self(encode_field(
            self.0,
            FULL_REGISTER_ROTATION,
            FULL_REGISTER_MASK,
            reg as Word,
        ))
    }

    #[must_use]
    pub const fn with_conversion(self, conversion: Conversion) -> Self {
        Self(encode_field(
            self.0,
            CONVERSION_ROTATION,
            CONVERSION_MASK,
            conversion.bit(),
        ))
    }

    #[must_use]
    pub const fn with_address(self, address: Address) -> Self {
        Self(encode_field(self.0, ADDRESS_ROTATION, ADDRESS_MASK, address))
    }

    #[must_use]
    pub const fn encode(self) -> Word {
        self.0
    }
}

impl From<Instruction> for Word {
    fn from(instruction: Instruction) -> Self {
        instruction.encode()
    }
}
