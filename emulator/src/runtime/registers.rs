use num_enum::{IntoPrimitive, TryFromPrimitive};
use parse_display::Display;
use thiserror::Error;

use super::memory::MemoryError;
use crate::constants as C;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    /// General purpose, `%r0` to `%r7`
    pub general: [C::Word; C::GENERAL_REGISTERS],

    /// Instruction pointer
    pub ip: C::Address,

    /// Stack pointer, address of the last pushed value
    pub sp: C::Address,

    /// Accumulator
    pub acc: C::Word,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            general: [0; C::GENERAL_REGISTERS],
            ip: C::PROGRAM_START,
            // On startup, the stack is empty
            sp: C::STACK_START,
            acc: 0,
        }
    }
}

impl Registers {
    #[must_use]
    pub fn get(&self, reg: Reg) -> C::Word {
        match reg {
            Reg::Ip => self.ip,
            Reg::Sp => self.sp,
            Reg::Acc => self.acc,
            general => self.general[usize::from(u8::from(general))],
        }
    }

    /// Set a register value.
    ///
    /// Writing `%ip` from an instruction is a jump and goes through the
    /// dispatcher instead, so that it does not get advanced afterwards.
    pub fn set(&mut self, reg: Reg, value: C::Word) {
        match reg {
            Reg::Ip => self.ip = value,
            Reg::Sp => self.sp = value,
            Reg::Acc => self.acc = value,
            general => self.general[usize::from(u8::from(general))] = value,
        }
    }

    /// Read a register as the bit pattern of a double
    #[must_use]
    pub fn get_f64(&self, reg: Reg) -> f64 {
        f64::from_bits(self.get(reg))
    }

    /// Read the accumulator as a signed integer
    #[must_use]
    pub fn acc_signed(&self) -> i64 {
        i64::from_ne_bytes(self.acc.to_ne_bytes())
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, value) in self.general.iter().enumerate() {
            write!(f, "%r{index} = {value:#x} | ")?;
        }
        write!(
            f,
            "%ip = {} | %sp = {} | %acc = {:#x}",
            self.ip, self.sp, self.acc
        )
    }
}

/// A register, as selected by its index in an instruction word
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, TryFromPrimitive, IntoPrimitive,
)]
#[display("%{}", style = "lowercase")]
#[repr(u8)]
pub enum Reg {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,

    /// Instruction pointer
    Ip = 8,

    /// Stack pointer
    Sp = 9,

    /// Accumulator
    Acc = 10,
}

impl Reg {
    /// Select a register from the index encoded in an instruction
    ///
    /// # Errors
    ///
    /// Fails if the index does not name a register.
    pub fn from_index(index: u8) -> Result<Self, MemoryError> {
        Self::try_from(index).map_err(|e| MemoryError::UnknownRegister(e.number))
    }
}

#[derive(Error, Debug)]
#[error("could not parse register")]
pub struct RegisterParseError;

impl std::str::FromStr for Reg {
    type Err = RegisterParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.strip_prefix('%').unwrap_or(s).to_lowercase();
        match name.as_str() {
            "ip" => Ok(Reg::Ip),
            "sp" => Ok(Reg::Sp),
            "acc" => Ok(Reg::Acc),
            general => general
                .strip_prefix('r')
                .and_then(|index| index.parse::<u8>().ok())
                .filter(|index| usize::from(*index) < C::GENERAL_REGISTERS)
                .and_then(|index| Reg::from_index(index).ok())
                .ok_or(RegisterParseError),
        }
    }
}
