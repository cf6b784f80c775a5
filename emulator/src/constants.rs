pub type Address = u64;
pub type Word = u64;

/// Number of general purpose registers
pub const GENERAL_REGISTERS: usize = 8;

/// Total size of the computer memory
pub const MEMORY_SIZE: Address = VAR_MEM_TOP + 1;

/// Highest address of the variable zone
pub const VAR_MEM_TOP: Address = 50000;

/// Lowest address of the variable zone
pub const VAR_MEM_BOTTOM: Address = 40001;

/// Highest address of the stack zone. The stack grows downward from here.
pub const STACK_MEM_TOP: Address = 40000;

/// Lowest address of the stack zone
pub const STACK_MEM_BOTTOM: Address = 30001;

/// Value of `%sp` when the stack is empty
pub const STACK_START: Address = STACK_MEM_TOP + 1;

/// Where the program gets loaded
pub const PROGRAM_START: Address = 0;

/// Number of cells available for the program, below the stack zone
pub const CODE_SIZE: Address = STACK_MEM_BOTTOM;
