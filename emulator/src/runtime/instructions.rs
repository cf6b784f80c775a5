use num_enum::{IntoPrimitive, TryFromPrimitive};
use parse_display::Display;
use tracing::debug;

use crate::constants::{Address, Word};

use super::{
    codec::{self, Conversion},
    console::{Console, IoError},
    exception::FaultKind,
    memory::Memory,
    registers::Reg,
    Computer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, TryFromPrimitive, IntoPrimitive)]
#[display(style = "SNAKE_CASE")]
#[repr(u8)]
pub enum Opcode {
    /// Stop the computer
    Halt = 0x00,

    /// Read a number into `%acc`
    InN = 0x01,

    /// Write `%acc` as a number
    OutN = 0x02,

    /// Read a line of text into the variable zone, its length into `%acc`
    InS = 0x03,

    /// Write `%acc` characters from the variable zone
    OutS = 0x04,

    /// Add two registers into `%acc`
    Add = 0x05,

    /// Substract two registers into `%acc`
    Sub = 0x06,

    /// Multiply two registers into `%acc`
    Mul = 0x07,

    /// Divide two registers into `%acc`
    Div = 0x08,

    /// Convert a register between integer and float into `%acc`
    Con = 0x09,

    /// Push a register on the stack
    Push = 0x0A,

    /// Pop a value from the stack into a register
    Pop = 0x0B,

    /// Load a register from the variable zone
    Ld = 0x0C,

    /// Store a register in the variable zone
    St = 0x0D,

    /// Unconditional jump
    Jmp = 0x0E,

    /// Jump if `%acc` is strictly greater than zero
    Jgr = 0x0F,

    /// Jump if `%acc` is greater or equal to zero
    Jge = 0x10,

    /// Jump if `%acc` is zero
    Jeq = 0x11,

    /// Jump if `%acc` is not zero
    Jne = 0x12,

    /// Jump if `%acc` is less or equal to zero
    Jle = 0x13,

    /// Jump if `%acc` is strictly less than zero
    Jls = 0x14,
}

impl Opcode {
    /// Decode the opcode of an instruction word
    ///
    /// # Errors
    ///
    /// Fails with [`FaultKind::InvalidOpcode`] if the opcode byte is unknown.
    pub fn decode(word: Word) -> Result<Self, FaultKind> {
        let byte = codec::decode_opcode(word);
        Self::try_from(byte).map_err(|_| FaultKind::InvalidOpcode(byte))
    }
}

/// What the dispatcher does after an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Go to the next instruction
    Next,

    /// Continue at the given address
    Jump(Address),

    Halt,
}

const fn branch(taken: bool, target: Address) -> Flow {
    if taken {
        Flow::Jump(target)
    } else {
        Flow::Next
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
fn int_to_float(word: Word) -> Word {
    ((word as i64) as f64).to_bits()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_int(word: Word) -> Word {
    // Saturates, NaN gives 0
    (f64::from_bits(word) as i64) as Word
}

impl Opcode {
    /// Execute the instruction held in `word`
    #[tracing::instrument(skip(computer, console), level = "debug")]
    pub(crate) fn execute<C: Console + ?Sized>(
        self,
        word: Word,
        computer: &mut Computer,
        console: &mut C,
    ) -> Result<Flow, FaultKind> {
        let flow = match self {
            Self::Halt => Flow::Halt,

            Self::InN => {
                let value = console.read_number()?;
                debug!("read {}", value);
                computer.registers.acc = value.to_bits();
                Flow::Next
            }

            Self::OutN => {
                let value = f64::from_bits(computer.registers.acc);
                debug!("write {}", value);
                console.write_number(value)?;
                Flow::Next
            }

            Self::InS => {
                let base = codec::decode_address(word);
                // A bad buffer address must not swallow a line of input
                Memory::check_variables(base, 0)?;
                let line = console.read_line()?;
                let cells: Vec<Word> = line.chars().map(|c| Word::from(u32::from(c))).collect();
                let len = cells.len() as Word;

                Memory::check_variables(base, len)?;
                for (address, cell) in (base..).zip(cells) {
                    computer.memory.write_variable(address, cell)?;
                }

                debug!(base, len, "read line {:?}", line);
                computer.registers.acc = len;
                Flow::Next
            }

            Self::OutS => {
                let base = codec::decode_address(word);
                let len = computer.registers.acc;
                Memory::check_variables(base, len)?;

                let text = (base..base + len)
                    .map(|address| {
                        let cell = computer.memory.read_variable(address)?;
                        u32::try_from(cell)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or(FaultKind::Io(IoError::InvalidCharacter(cell)))
                    })
                    .collect::<Result<String, FaultKind>>()?;

                debug!(base, len, "write line {:?}", text);
                console.write_str(&text)?;
                Flow::Next
            }

            Self::Add => {
                let (a, b) = computer.operands(word)?;
                let res = a + b;
                debug!("{} + {} = {}", a, b, res);
                computer.registers.acc = res.to_bits();
                Flow::Next
            }

            Self::Sub => {
                let (a, b) = computer.operands(word)?;
                let res = a - b;
                debug!("{} - {} = {}", a, b, res);
                computer.registers.acc = res.to_bits();
                Flow::Next
            }

            Self::Mul => {
                let (a, b) = computer.operands(word)?;
                let res = a * b;
                debug!("{} * {} = {}", a, b, res);
                computer.registers.acc = res.to_bits();
                Flow::Next
            }

            Self::Div => {
                // Division by zero gives an infinity or NaN, not a fault
                let (a, b) = computer.operands(word)?;
                let res = a / b;
                debug!("{} / {} = {}", a, b, res);
                computer.registers.acc = res.to_bits();
                Flow::Next
            }

            Self::Con => {
                let reg = Reg::from_index(codec::decode_full_register(word))?;
                let value = computer.registers.get(reg);
                let res = match Conversion::decode(word) {
                    Conversion::IntToFloat => int_to_float(value),
                    Conversion::FloatToInt => float_to_int(value),
                };
                debug!("con {} ({:#x}) => {:#x}", reg, value, res);
                computer.registers.acc = res;
                Flow::Next
            }

            Self::Push => {
                let reg = Reg::from_index(codec::decode_full_register(word))?;
                let value = computer.registers.get(reg);
                debug!("push {} ({:#x})", reg, value);
                computer.push(value)?;
                Flow::Next
            }

            Self::Pop => {
                let reg = Reg::from_index(codec::decode_full_register(word))?;
                let value = computer.pop()?;
                debug!("pop {} ({:#x})", reg, value);
                computer.load_register(reg, value)
            }

            Self::Ld => {
                let reg = Reg::from_index(codec::decode_full_register(word))?;
                let address = codec::decode_address(word);
                let value = computer.memory.read_variable(address)?;
                debug!("ld [{}] ({:#x}) => {}", address, value, reg);
                computer.load_register(reg, value)
            }

            Self::St => {
                let reg = Reg::from_index(codec::decode_full_register(word))?;
                let address = codec::decode_address(word);
                let value = computer.registers.get(reg);
                debug!("st {} ({:#x}) => [{}]", reg, value, address);
                computer.memory.write_variable(address, value)?;
                Flow::Next
            }

            Self::Jmp => Flow::Jump(codec::decode_address(word)),

            Self::Jgr => branch(computer.registers.acc_signed() > 0, codec::decode_address(word)),
            Self::Jge => branch(computer.registers.acc_signed() >= 0, codec::decode_address(word)),
            Self::Jeq => branch(computer.registers.acc_signed() == 0, codec::decode_address(word)),
            Self::Jne => branch(computer.registers.acc_signed() != 0, codec::decode_address(word)),
            Self::Jle => branch(computer.registers.acc_signed() <= 0, codec::decode_address(word)),
            Self::Jls => branch(computer.registers.acc_signed() < 0, codec::decode_address(word)),
        };

        Ok(flow)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants as C;
    use crate::runtime::{memory::MemoryError, Instruction, Terminal};

    fn run(computer: &mut Computer, instruction: Instruction) -> Result<Flow, FaultKind> {
        let word = instruction.encode();
        let mut console = Terminal::new(&b""[..], Vec::new());
        Opcode::decode(word)?.execute(word, computer, &mut console)
    }

    fn set_f64(computer: &mut Computer, reg: Reg, value: f64) {
        computer.registers.set(reg, value.to_bits());
    }

    #[test]
    fn mnemonics() {
        insta::assert_snapshot!(Opcode::InN, @"IN_N");
        insta::assert_snapshot!(Opcode::Halt, @"HALT");
        insta::assert_snapshot!(Opcode::Jls, @"JLS");
    }

    #[test]
    fn decode_unknown_opcode() {
        assert_eq!(Opcode::decode(0x1400_0000_0000_0000).unwrap(), Opcode::Jls);
        assert!(matches!(
            Opcode::decode(0x1500_0000_0000_0000),
            Err(FaultKind::InvalidOpcode(0x15))
        ));
    }

    #[test]
    fn arithmetic() {
        let pairs = [
            (2.0, 3.0),
            (-1.5, 0.25),
            (1e300, 1e-300),
            (7.0, -0.0),
            (0.1, 0.2),
        ];

        for (a, b) in pairs {
            let mut computer = Computer::default();
            set_f64(&mut computer, Reg::R4, a);
            set_f64(&mut computer, Reg::R6, b);

            let cases: [(Opcode, f64); 4] = [
                (Opcode::Add, a + b),
                (Opcode::Sub, a - b),
                (Opcode::Mul, a * b),
                (Opcode::Div, a / b),
            ];

            for (opcode, expected) in cases {
                let flow = run(
                    &mut computer,
                    Instruction::new(opcode).with_operands(Reg::R4, Reg::R6),
                )
                .unwrap();
                assert_eq!(flow, Flow::Next);
                assert_eq!(computer.registers.acc, expected.to_bits(), "{opcode} {a} {b}");
            }
        }
    }

    #[test]
    fn division_by_zero() {
        let mut computer = Computer::default();
        set_f64(&mut computer, Reg::R0, 1.0);
        set_f64(&mut computer, Reg::R1, 0.0);
        set_f64(&mut computer, Reg::R2, -1.0);

        let div = |a, b| Instruction::new(Opcode::Div).with_operands(a, b);

        run(&mut computer, div(Reg::R0, Reg::R1)).unwrap();
        assert_eq!(computer.registers.acc, f64::INFINITY.to_bits());

        run(&mut computer, div(Reg::R2, Reg::R1)).unwrap();
        assert_eq!(computer.registers.acc, f64::NEG_INFINITY.to_bits());

        run(&mut computer, div(Reg::R1, Reg::R1)).unwrap();
        assert!(f64::from_bits(computer.registers.acc).is_nan());
    }

    #[test]
    fn arithmetic_on_unknown_register() {
        let mut computer = Computer::default();
        let word = codec::encode_field(
            Instruction::new(Opcode::Add).encode(),
            codec::OPERAND_TWO_ROTATION,
            codec::REGISTER_MASK,
            12,
        );
        let mut console = Terminal::new(&b""[..], Vec::new());
        let res = Opcode::Add.execute(word, &mut computer, &mut console);
        assert!(matches!(
            res,
            Err(FaultKind::Memory(MemoryError::UnknownRegister(12)))
        ));
    }

    #[test]
    fn conversions() {
        let mut computer = Computer::default();
        computer.registers.set(Reg::R1, (-42_i64) as Word);
        run(
            &mut computer,
            Instruction::new(Opcode::Con)
                .with_register(Reg::R1)
                .with_conversion(Conversion::IntToFloat),
        )
        .unwrap();
        assert_eq!(computer.registers.acc, (-42.0_f64).to_bits());

        set_f64(&mut computer, Reg::R2, -3.75);
        run(
            &mut computer,
            Instruction::new(Opcode::Con)
                .with_register(Reg::R2)
                .with_conversion(Conversion::FloatToInt),
        )
        .unwrap();
        assert_eq!(computer.registers.acc_signed(), -3);

        set_f64(&mut computer, Reg::R2, f64::NAN);
        run(
            &mut computer,
            Instruction::new(Opcode::Con)
                .with_register(Reg::R2)
                .with_conversion(Conversion::FloatToInt),
        )
        .unwrap();
        assert_eq!(computer.registers.acc_signed(), 0);
    }

    #[test]
    fn push_pop_round_trip() {
        let mut computer = Computer::default();
        computer.registers.set(Reg::R3, 0xABCD);
        let before = computer.registers.clone();

        run(&mut computer, Instruction::new(Opcode::Push).with_register(Reg::R3)).unwrap();
        assert_eq!(computer.registers.sp, C::STACK_START - 1);
        assert_eq!(computer.memory.get(C::STACK_MEM_TOP), Ok(0xABCD));

        run(&mut computer, Instruction::new(Opcode::Pop).with_register(Reg::R3)).unwrap();
        assert_eq!(computer.registers, before);
    }

    #[test]
    fn push_pop_many() {
        let mut computer = Computer::default();
        for (index, reg) in [Reg::R0, Reg::R1, Reg::R2, Reg::Acc].into_iter().enumerate() {
            computer.registers.set(reg, 100 + index as Word);
        }
        let before = computer.registers.clone();

        for reg in [Reg::R0, Reg::R1, Reg::R2, Reg::Acc] {
            run(&mut computer, Instruction::new(Opcode::Push).with_register(reg)).unwrap();
        }
        assert_eq!(computer.registers.sp, C::STACK_START - 4);

        for reg in [Reg::Acc, Reg::R2, Reg::R1, Reg::R0] {
            run(&mut computer, Instruction::new(Opcode::Pop).with_register(reg)).unwrap();
        }
        assert_eq!(computer.registers, before);
    }

    #[test]
    fn stack_limits() {
        let mut computer = Computer::default();
        let push = Instruction::new(Opcode::Push).with_register(Reg::R0);

        computer.registers.sp = C::STACK_MEM_BOTTOM + 1;
        run(&mut computer, push).unwrap();
        assert_eq!(computer.registers.sp, C::STACK_MEM_BOTTOM);

        assert!(matches!(
            run(&mut computer, push),
            Err(FaultKind::Memory(MemoryError::StackOverflow))
        ));
        assert_eq!(computer.registers.sp, C::STACK_MEM_BOTTOM);

        let mut computer = Computer::default();
        assert!(matches!(
            run(&mut computer, Instruction::new(Opcode::Pop).with_register(Reg::R0)),
            Err(FaultKind::Memory(MemoryError::StackUnderflow))
        ));
        assert_eq!(computer.registers.sp, C::STACK_START);
    }

    #[test]
    fn push_unknown_register() {
        let mut computer = Computer::default();
        let word = codec::encode_field(
            Instruction::new(Opcode::Push).encode(),
            codec::FULL_REGISTER_ROTATION,
            codec::FULL_REGISTER_MASK,
            11,
        );
        let mut console = Terminal::new(&b""[..], Vec::new());
        let res = Opcode::Push.execute(word, &mut computer, &mut console);
        assert!(matches!(
            res,
            Err(FaultKind::Memory(MemoryError::UnknownRegister(11)))
        ));
        assert_eq!(computer.registers.sp, C::STACK_START);
    }

    #[test]
    fn special_registers_on_stack() {
        let mut computer = Computer::default();
        computer.registers.ip = 7;

        run(&mut computer, Instruction::new(Opcode::Push).with_register(Reg::Ip)).unwrap();
        assert_eq!(computer.memory.get(C::STACK_MEM_TOP), Ok(7));

        // Popping into %ip is a jump
        let flow = run(&mut computer, Instruction::new(Opcode::Pop).with_register(Reg::Ip)).unwrap();
        assert_eq!(flow, Flow::Jump(7));

        // Popping into %sp re-targets the stack
        computer.memory.write_block(C::STACK_MEM_TOP, &[35_000]).unwrap();
        computer.registers.sp = C::STACK_MEM_TOP;
        run(&mut computer, Instruction::new(Opcode::Pop).with_register(Reg::Sp)).unwrap();
        assert_eq!(computer.registers.sp, 35_000);
    }

    #[test]
    fn load_into_ip_is_a_jump() {
        let mut computer = Computer::default();
        computer.registers.ip = 4;
        computer
            .memory
            .write_variable(C::VAR_MEM_BOTTOM, 17)
            .unwrap();

        let ld = Instruction::new(Opcode::Ld)
            .with_register(Reg::Ip)
            .with_address(C::VAR_MEM_BOTTOM);
        assert_eq!(run(&mut computer, ld).unwrap(), Flow::Jump(17));
        assert_eq!(computer.registers.ip, 4);
    }

    #[test]
    fn push_with_stack_pointer_above_the_stack() {
        let mut computer = Computer::default();
        computer.registers.sp = C::STACK_START + 1;

        let push = Instruction::new(Opcode::Push).with_register(Reg::R0);
        assert!(matches!(
            run(&mut computer, push),
            Err(FaultKind::Memory(MemoryError::InvalidStackPointer(sp))) if sp == C::STACK_START + 1
        ));
        assert_eq!(computer.registers.sp, C::STACK_START + 1);
    }

    #[test]
    fn string_input_checks_the_buffer_first() {
        let mut computer = Computer::default();
        let mut console = Terminal::new(&b"first\nsecond\n"[..], Vec::new());

        let word = Instruction::new(Opcode::InS).with_address(0).encode();
        assert!(matches!(
            Opcode::InS.execute(word, &mut computer, &mut console),
            Err(FaultKind::Memory(MemoryError::OutOfBounds(0)))
        ));

        // The line is still there for the next read
        assert_eq!(console.read_line().unwrap(), "first");
    }

    #[test]
    fn load_store_bounds() {
        let mut computer = Computer::default();
        computer.registers.set(Reg::R5, 0x55);

        for address in [C::VAR_MEM_BOTTOM, C::VAR_MEM_TOP] {
            let st = Instruction::new(Opcode::St)
                .with_register(Reg::R5)
                .with_address(address);
            assert_eq!(run(&mut computer, st).unwrap(), Flow::Next);

            let ld = Instruction::new(Opcode::Ld)
                .with_register(Reg::R6)
                .with_address(address);
            assert_eq!(run(&mut computer, ld).unwrap(), Flow::Next);
            assert_eq!(computer.registers.get(Reg::R6), 0x55);
            computer.registers.set(Reg::R6, 0);
        }

        for address in [C::VAR_MEM_BOTTOM - 1, C::VAR_MEM_TOP + 1] {
            let st = Instruction::new(Opcode::St)
                .with_register(Reg::R5)
                .with_address(address);
            assert!(matches!(
                run(&mut computer, st),
                Err(FaultKind::Memory(MemoryError::OutOfBounds(a))) if a == address
            ));

            let ld = Instruction::new(Opcode::Ld)
                .with_register(Reg::R6)
                .with_address(address);
            assert!(matches!(
                run(&mut computer, ld),
                Err(FaultKind::Memory(MemoryError::OutOfBounds(a))) if a == address
            ));
        }
    }

    #[test]
    fn conditional_jumps() {
        let cases: [(Opcode, [bool; 3]); 6] = [
            // acc < 0, acc = 0, acc > 0
            (Opcode::Jgr, [false, false, true]),
            (Opcode::Jge, [false, true, true]),
            (Opcode::Jeq, [false, true, false]),
            (Opcode::Jne, [true, false, true]),
            (Opcode::Jle, [true, true, false]),
            (Opcode::Jls, [true, false, false]),
        ];

        let mut computer = Computer::default();
        for (opcode, expected) in cases {
            for (acc, taken) in [-5_i64, 0, 5].into_iter().zip(expected) {
                computer.registers.acc = acc as Word;
                let flow = run(&mut computer, Instruction::new(opcode).with_address(123)).unwrap();
                let expected = if taken { Flow::Jump(123) } else { Flow::Next };
                assert_eq!(flow, expected, "{opcode} with %acc = {acc}");
            }
        }

        let flow = run(&mut computer, Instruction::new(Opcode::Jmp).with_address(9)).unwrap();
        assert_eq!(flow, Flow::Jump(9));
    }
}
