use thiserror::Error;
use tracing::{debug, info, warn};

use crate::constants as C;

pub mod codec;
mod console;
mod exception;
mod instructions;
mod memory;
mod registers;

pub use self::codec::{Conversion, Instruction};
pub use self::console::{Console, IoError, Terminal};
pub use self::exception::{Fault, FaultKind, State};
pub use self::instructions::Opcode;
pub use self::memory::{Memory, MemoryError};
pub use self::registers::{Reg, RegisterParseError, Registers};

use self::instructions::Flow;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("program of {len} words does not fit in the {capacity} words of the code zone")]
    TooLarge { len: usize, capacity: C::Address },
}

#[derive(Default, Clone)]
pub struct Computer {
    pub registers: Registers,
    pub memory: Memory,
    pub cycles: usize,
    state: State,
}

impl std::fmt::Debug for Computer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Computer {{ registers: {:?}, state: {:?}, memory: [...] }}",
            self.registers, self.state
        )
    }
}

impl Computer {
    /// Create a computer with the given program loaded
    ///
    /// # Errors
    ///
    /// Fails if the program does not fit below the stack zone.
    pub fn with_program(program: &[C::Word]) -> Result<Self, LoadError> {
        let mut computer = Self::default();
        computer.load(program)?;
        Ok(computer)
    }

    /// Start a new session with the given program copied at address 0.
    ///
    /// Opcodes are not checked here. An invalid one only faults once the
    /// computer reaches it.
    ///
    /// # Errors
    ///
    /// Fails if the program does not fit below the stack zone.
    #[tracing::instrument(skip_all, fields(len = program.len()))]
    pub fn load(&mut self, program: &[C::Word]) -> Result<(), LoadError> {
        let too_large = LoadError::TooLarge {
            len: program.len(),
            capacity: C::CODE_SIZE,
        };
        let fits = u64::try_from(program.len()).is_ok_and(|len| len <= C::CODE_SIZE);
        if !fits {
            return Err(too_large);
        }

        *self = Self::default();
        self.memory
            .write_block(C::PROGRAM_START, program)
            .map_err(|_| too_large)?;

        info!("Program loaded");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Execute a single instruction.
    ///
    /// Does nothing once the computer halted. Once it faulted, it returns the
    /// same fault again.
    ///
    /// # Errors
    ///
    /// Returns the fault raised by the instruction, if any.
    #[tracing::instrument(skip_all, fields(ip = self.registers.ip), level = "debug")]
    pub fn step<T: Console + ?Sized>(&mut self, console: &mut T) -> Result<(), Fault> {
        match &self.state {
            State::Halted => return Ok(()),
            State::Faulted(fault) => return Err(fault.clone()),
            State::Ready | State::Running => {}
        }

        self.state = State::Running;
        let ip = self.registers.ip;

        let flow = self.decode_and_execute(console).map_err(|kind| {
            let fault = Fault { ip, kind };
            warn!(%fault, "Program faulted");
            self.state = State::Faulted(fault.clone());
            fault
        })?;

        self.cycles += 1;
        match flow {
            Flow::Next => self.registers.ip = ip + 1,
            Flow::Jump(address) => {
                debug!("Jumping to address {}", address);
                self.registers.ip = address;
            }
            Flow::Halt => {
                info!(ip, cycles = self.cycles, "Program halted");
                self.state = State::Halted;
            }
        }

        debug!("Register state {:?}", self.registers);
        Ok(())
    }

    fn decode_and_execute<T: Console + ?Sized>(
        &mut self,
        console: &mut T,
    ) -> Result<Flow, FaultKind> {
        let word = self.memory.get(self.registers.ip)?;
        let opcode = Opcode::decode(word)?;
        debug!(
            ip = self.registers.ip,
            "Executing instruction {} ({:#018x})",
            opcode,
            word
        );
        opcode.execute(word, self, console)
    }

    /// Run until the program halts or faults
    ///
    /// # Errors
    ///
    /// Returns the fault that stopped the program. The registers and memory
    /// are left as they were when it happened.
    #[tracing::instrument(skip_all)]
    pub fn run<T: Console + ?Sized>(&mut self, console: &mut T) -> Result<(), Fault> {
        while !self.state.is_terminal() {
            self.step(console)?;
        }

        match &self.state {
            State::Faulted(fault) => Err(fault.clone()),
            _ => Ok(()),
        }
    }

    /// Read the two arithmetic operands of an instruction as doubles
    fn operands(&self, word: C::Word) -> Result<(f64, f64), MemoryError> {
        let first = Reg::from_index(codec::decode_narrow_operand(
            word,
            codec::OPERAND_ONE_ROTATION,
        ))?;
        let second = Reg::from_index(codec::decode_narrow_operand(
            word,
            codec::OPERAND_TWO_ROTATION,
        ))?;
        Ok((
            self.registers.get_f64(first),
            self.registers.get_f64(second),
        ))
    }

    /// Set a register from an instruction. Writing `%ip` is a jump.
    fn load_register(&mut self, reg: Reg, value: C::Word) -> Flow {
        if reg == Reg::Ip {
            Flow::Jump(value)
        } else {
            self.registers.set(reg, value);
            Flow::Next
        }
    }

    fn push(&mut self, value: C::Word) -> Result<(), MemoryError> {
        let sp = self.registers.sp;
        if sp > C::STACK_START {
            return Err(MemoryError::InvalidStackPointer(sp));
        }
        if sp <= C::STACK_MEM_BOTTOM {
            return Err(MemoryError::StackOverflow);
        }

        let sp = sp - 1;
        *self.memory.get_mut(sp)? = value;
        self.registers.sp = sp;
        Ok(())
    }

    fn pop(&mut self) -> Result<C::Word, MemoryError> {
        let sp = self.registers.sp;
        if sp > C::STACK_MEM_TOP {
            return Err(MemoryError::StackUnderflow);
        }
        if sp < C::STACK_MEM_BOTTOM {
            return Err(MemoryError::InvalidStackPointer(sp));
        }

        // First read the value, then move the SP
        let value = self.memory.get(sp)?;
        self.registers.sp = sp + 1;
        Ok(value)
    }
}
