use thiserror::Error;

use crate::constants::{Address, Word, MEMORY_SIZE, VAR_MEM_BOTTOM, VAR_MEM_TOP};

/// Represents errors related to memory manipulations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The given address is past the end of the memory
    #[error("invalid address {0}")]
    InvalidAddress(Address),

    /// A variable access outside of the variable zone
    #[error("address {0} is out of bounds of the variable zone")]
    OutOfBounds(Address),

    #[error("push attempt on full stack")]
    StackOverflow,

    #[error("pop attempt on empty stack")]
    StackUnderflow,

    /// `%sp` was moved outside of the stack zone
    #[error("stack pointer {0} is outside of the stack zone")]
    InvalidStackPointer(Address),

    #[error("unknown register {0}")]
    UnknownRegister(u8),
}

/// Holds the memory cells of the computer.
///
/// Code, stack and variables all share this one array.
#[derive(Clone)]
pub struct Memory {
    inner: Box<[Word]>,
}

impl Default for Memory {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            inner: vec![0; MEMORY_SIZE as usize].into_boxed_slice(),
        }
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory [{} cells]", self.inner.len())
    }
}

impl Memory {
    fn index(address: Address) -> Result<usize, MemoryError> {
        usize::try_from(address).map_err(|_e| MemoryError::InvalidAddress(address))
    }

    /// Get a cell at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get(&self, address: Address) -> Result<Word, MemoryError> {
        self.inner
            .get(Self::index(address)?)
            .copied()
            .ok_or(MemoryError::InvalidAddress(address))
    }

    /// Get a mutable reference to a cell at an address
    ///
    /// # Errors
    ///
    /// It fails if the address is out of bounds.
    pub fn get_mut(&mut self, address: Address) -> Result<&mut Word, MemoryError> {
        self.inner
            .get_mut(Self::index(address)?)
            .ok_or(MemoryError::InvalidAddress(address))
    }

    /// Copy a block of words, starting at `start`
    ///
    /// # Errors
    ///
    /// It fails if the block does not fit in memory.
    pub fn write_block(&mut self, start: Address, words: &[Word]) -> Result<(), MemoryError> {
        let begin = Self::index(start)?;
        let end = begin
            .checked_add(words.len())
            .filter(|end| *end <= self.inner.len())
            .ok_or(MemoryError::InvalidAddress(start))?;
        self.inner[begin..end].copy_from_slice(words);
        Ok(())
    }

    /// Check that `len` cells starting at `base` all lie in the variable zone
    ///
    /// # Errors
    ///
    /// Returns the first offending address.
    pub fn check_variables(base: Address, len: u64) -> Result<(), MemoryError> {
        if !(VAR_MEM_BOTTOM..=VAR_MEM_TOP).contains(&base) {
            return Err(MemoryError::OutOfBounds(base));
        }

        if len == 0 {
            return Ok(());
        }

        let last = base.saturating_add(len - 1);
        if last > VAR_MEM_TOP {
            return Err(MemoryError::OutOfBounds(VAR_MEM_TOP + 1));
        }

        Ok(())
    }

    /// Read a cell of the variable zone
    ///
    /// # Errors
    ///
    /// It fails if the address is not in the variable zone.
    pub fn read_variable(&self, address: Address) -> Result<Word, MemoryError> {
        Self::check_variables(address, 1)?;
        self.get(address)
    }

    /// Write a cell of the variable zone
    ///
    /// # Errors
    ///
    /// It fails if the address is not in the variable zone.
    pub fn write_variable(&mut self, address: Address, value: Word) -> Result<(), MemoryError> {
        Self::check_variables(address, 1)?;
        *self.get_mut(address)? = value;
        Ok(())
    }
}
