use thiserror::Error;

use crate::constants::Address;

use super::console::IoError;
use super::memory::MemoryError;

/// What went wrong while executing an instruction
#[derive(Error, Debug, Clone)]
pub enum FaultKind {
    #[error("i/o fault ({0})")]
    Io(#[from] IoError),

    #[error("memory fault ({0})")]
    Memory(#[from] MemoryError),

    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
}

/// A fault raised by an instruction. Faults always end the run.
#[derive(Error, Debug, Clone)]
#[error("instruction at address {ip} caused fault: {kind}")]
pub struct Fault {
    /// Address of the faulting instruction
    pub ip: Address,

    #[source]
    pub kind: FaultKind,
}

/// Lifecycle of a computer
#[derive(Debug, Clone, Default)]
pub enum State {
    /// Program loaded, nothing executed yet
    #[default]
    Ready,

    Running,

    /// Reached a `HALT` instruction
    Halted,

    Faulted(Fault),
}

impl State {
    /// Once halted or faulted, a computer does not fetch any more instructions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Halted | Self::Faulted(_))
    }
}
