use crate::error::RunError;
use crate::operand::{Bits, Kinds, Operand, Slot};
use crate::state::MachineState;

use super::{checkflag, float_div, float_op, target, three, word, ControlTransfer};

/// MIPS instructions, shared by the assembly and machine-readable flavors.
#[allow(clippy::upper_case_acronyms, non_camel_case_types)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MipsOp {
    ADD,
    SUB,
    MULT,
    DIV,
    MFLO,
    MFHI,
    AND,
    OR,
    XOR,
    NOR,
    SLL,
    SRL,
    SLT,
    JR,
    SYSCALL,
    LW,
    SW,
    ADDI,
    ANDI,
    ORI,
    SLTI,
    LUI,
    BEQ,
    BNE,
    J,
    JAL,
    ADD_S,
    SUB_S,
    /// Also written `MULT.S`
    MUL_S,
    DIV_S,
    /// Also written `LWC`
    LWC1,
    /// Also written `SWC`
    SWC1,
}

/// Binary encoding shape of an instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    /// Register format, carries the function code
    R(u8),
    /// Immediate format, carries the opcode
    I(u8),
    /// Jump format, carries the opcode
    J(u8),
    /// Single precision coprocessor 1 format, carries the function code
    FR(u8),
}

const REG: Slot = Slot::new(Kinds::REG);
const REG3: &[Slot] = &[REG, REG, REG];
const SHIFT: &[Slot] = &[REG, REG, Slot::imm(Kinds::IMM, Bits::Unsigned(5))];
const MEM: &[Slot] = &[REG, Slot::new(Kinds::MEM)];
const BRANCH: &[Slot] = &[REG, REG, Slot::imm(Kinds::TARGET, Bits::Signed(16))];
const JUMP: &[Slot] = &[Slot::imm(Kinds::TARGET, Bits::Unsigned(26))];
const IMM16: &[Slot] = &[REG, REG, Slot::imm(Kinds::IMM, Bits::Signed(16))];
const LOGIC16: &[Slot] = &[REG, REG, Slot::imm(Kinds::IMM, Bits::Either(16))];
const UPPER: &[Slot] = &[REG, Slot::imm(Kinds::IMM, Bits::Either(16))];
const FREG: Slot = Slot::new(Kinds::FREG);
const FLOAT3: &[Slot] = &[FREG, FREG, FREG];
const FLOAT_MEM: &[Slot] = &[FREG, Slot::new(Kinds::MEM)];

impl MipsOp {
    pub const ALL: [MipsOp; 32] = [
        MipsOp::ADD,
        MipsOp::SUB,
        MipsOp::MULT,
        MipsOp::DIV,
        MipsOp::MFLO,
        MipsOp::MFHI,
        MipsOp::AND,
        MipsOp::OR,
        MipsOp::XOR,
        MipsOp::NOR,
        MipsOp::SLL,
        MipsOp::SRL,
        MipsOp::SLT,
        MipsOp::JR,
        MipsOp::SYSCALL,
        MipsOp::LW,
        MipsOp::SW,
        MipsOp::ADDI,
        MipsOp::ANDI,
        MipsOp::ORI,
        MipsOp::SLTI,
        MipsOp::LUI,
        MipsOp::BEQ,
        MipsOp::BNE,
        MipsOp::J,
        MipsOp::JAL,
        MipsOp::ADD_S,
        MipsOp::SUB_S,
        MipsOp::MUL_S,
        MipsOp::DIV_S,
        MipsOp::LWC1,
        MipsOp::SWC1,
    ];

    /// Expects an uppercase mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name {
            "MULT.S" => Some(MipsOp::MUL_S),
            "LWC" => Some(MipsOp::LWC1),
            "SWC" => Some(MipsOp::SWC1),
            _ => Self::ALL.into_iter().find(|op| op.name() == name),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MipsOp::ADD => "ADD",
            MipsOp::SUB => "SUB",
            MipsOp::MULT => "MULT",
            MipsOp::DIV => "DIV",
            MipsOp::MFLO => "MFLO",
            MipsOp::MFHI => "MFHI",
            MipsOp::AND => "AND",
            MipsOp::OR => "OR",
            MipsOp::XOR => "XOR",
            MipsOp::NOR => "NOR",
            MipsOp::SLL => "SLL",
            MipsOp::SRL => "SRL",
            MipsOp::SLT => "SLT",
            MipsOp::JR => "JR",
            MipsOp::SYSCALL => "SYSCALL",
            MipsOp::LW => "LW",
            MipsOp::SW => "SW",
            MipsOp::ADDI => "ADDI",
            MipsOp::ANDI => "ANDI",
            MipsOp::ORI => "ORI",
            MipsOp::SLTI => "SLTI",
            MipsOp::LUI => "LUI",
            MipsOp::BEQ => "BEQ",
            MipsOp::BNE => "BNE",
            MipsOp::J => "J",
            MipsOp::JAL => "JAL",
            MipsOp::ADD_S => "ADD.S",
            MipsOp::SUB_S => "SUB.S",
            MipsOp::MUL_S => "MUL.S",
            MipsOp::DIV_S => "DIV.S",
            MipsOp::LWC1 => "LWC1",
            MipsOp::SWC1 => "SWC1",
        }
    }

    pub fn format(self) -> Format {
        match self {
            MipsOp::ADD => Format::R(0b100000),
            MipsOp::SUB => Format::R(0b100010),
            MipsOp::MULT => Format::R(0b011000),
            MipsOp::DIV => Format::R(0b011010),
            MipsOp::MFLO => Format::R(0b010010),
            MipsOp::MFHI => Format::R(0b010000),
            MipsOp::AND => Format::R(0b100100),
            MipsOp::OR => Format::R(0b100101),
            MipsOp::XOR => Format::R(0b100110),
            MipsOp::NOR => Format::R(0b100111),
            MipsOp::SLL => Format::R(0b000000),
            MipsOp::SRL => Format::R(0b000010),
            MipsOp::SLT => Format::R(0b101010),
            MipsOp::JR => Format::R(0b001000),
            MipsOp::SYSCALL => Format::R(0b001100),
            MipsOp::LW => Format::I(0b100011),
            MipsOp::SW => Format::I(0b101011),
            MipsOp::ADDI => Format::I(0b001000),
            MipsOp::ANDI => Format::I(0b001100),
            MipsOp::ORI => Format::I(0b001101),
            MipsOp::SLTI => Format::I(0b001010),
            MipsOp::LUI => Format::I(0b001111),
            MipsOp::BEQ => Format::I(0b000100),
            MipsOp::BNE => Format::I(0b000101),
            MipsOp::J => Format::J(0b000010),
            MipsOp::JAL => Format::J(0b000011),
            MipsOp::ADD_S => Format::FR(0b000000),
            MipsOp::SUB_S => Format::FR(0b000001),
            MipsOp::MUL_S => Format::FR(0b000010),
            MipsOp::DIV_S => Format::FR(0b000011),
            MipsOp::LWC1 => Format::I(0b110001),
            MipsOp::SWC1 => Format::I(0b111001),
        }
    }

    pub fn signatures(self) -> &'static [&'static [Slot]] {
        match self {
            MipsOp::ADD
            | MipsOp::SUB
            | MipsOp::AND
            | MipsOp::OR
            | MipsOp::XOR
            | MipsOp::NOR
            | MipsOp::SLT => &[REG3],
            MipsOp::MULT | MipsOp::DIV => &[&[REG, REG]],
            MipsOp::MFLO | MipsOp::MFHI | MipsOp::JR => &[&[REG]],
            MipsOp::SYSCALL => &[&[]],
            MipsOp::SLL | MipsOp::SRL => &[SHIFT],
            MipsOp::LW | MipsOp::SW => &[MEM],
            MipsOp::ADDI | MipsOp::SLTI => &[IMM16],
            MipsOp::ANDI | MipsOp::ORI => &[LOGIC16],
            MipsOp::LUI => &[UPPER],
            MipsOp::BEQ | MipsOp::BNE => &[BRANCH],
            MipsOp::J | MipsOp::JAL => &[JUMP],
            MipsOp::ADD_S | MipsOp::SUB_S | MipsOp::MUL_S | MipsOp::DIV_S => &[FLOAT3],
            MipsOp::LWC1 | MipsOp::SWC1 => &[FLOAT_MEM],
        }
    }
}

pub fn execute(
    op: MipsOp,
    ops: &[Operand],
    state: &mut MachineState,
) -> Result<ControlTransfer, RunError> {
    match op {
        MipsOp::ADD => three(ops, state, |state, a, b| Ok(checkflag(state, a + b))),
        MipsOp::SUB => three(ops, state, |state, a, b| Ok(checkflag(state, a - b))),
        MipsOp::AND => three(ops, state, |_, a, b| Ok(word(a & b))),
        MipsOp::OR => three(ops, state, |_, a, b| Ok(word(a | b))),
        MipsOp::XOR => three(ops, state, |_, a, b| Ok(word(a ^ b))),
        MipsOp::NOR => three(ops, state, |_, a, b| Ok(word(!(a | b)))),
        MipsOp::SLT => three(ops, state, |_, a, b| Ok((a < b) as i64)),
        MipsOp::SLL => three(ops, state, |state, a, b| Ok(checkflag(state, a << b))),
        MipsOp::SRL => three(ops, state, |_, a, b| Ok(word(((a as u32) >> b) as i64))),
        MipsOp::ADDI => three(ops, state, |state, a, b| Ok(checkflag(state, a + b))),
        MipsOp::ANDI => three(ops, state, |_, a, b| Ok(a & (b & 0xFFFF))),
        MipsOp::ORI => three(ops, state, |_, a, b| Ok(word(a | (b & 0xFFFF)))),
        MipsOp::SLTI => three(ops, state, |_, a, b| Ok((a < b) as i64)),
        MipsOp::LUI => {
            let upper = ops[1].value(state)? & 0xFFFF;
            ops[0].set_value(state, upper << 16)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::MULT => {
            let product = ops[0].value(state)?.wrapping_mul(ops[1].value(state)?);
            state.set_reg("LO", word(product));
            state.set_reg("HI", word(product >> 32));
            Ok(ControlTransfer::Continue)
        }
        MipsOp::DIV => {
            let dividend = ops[0].value(state)?;
            let divisor = ops[1].value(state)?;
            if divisor == 0 {
                return Err(RunError::DivisionZero);
            }
            state.set_reg("LO", word(dividend / divisor));
            state.set_reg("HI", word(dividend % divisor));
            Ok(ControlTransfer::Continue)
        }
        MipsOp::MFLO => {
            let value = state.reg("LO");
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::MFHI => {
            let value = state.reg("HI");
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::LW => {
            let value = ops[1].value(state)?;
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::SW => {
            let value = ops[0].value(state)?;
            ops[1].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::BEQ | MipsOp::BNE => {
            let equal = ops[0].value(state)? == ops[1].value(state)?;
            if equal != (op == MipsOp::BEQ) {
                return Ok(ControlTransfer::Continue);
            }
            // Word offset from the already advanced pointer
            let pc = state.ip as i64;
            target(&ops[2], state, |offs| pc + offs * 4).map(ControlTransfer::Jump)
        }
        MipsOp::J => jump(ops, state),
        MipsOp::JAL => {
            let ret = state.ip as i64;
            state.set_reg("R31", ret);
            jump(ops, state)
        }
        MipsOp::JR => target(&ops[0], state, |addr| addr).map(ControlTransfer::Jump),
        MipsOp::SYSCALL => match state.reg("R2") {
            10 => Ok(ControlTransfer::Halt),
            service => Err(RunError::InvalidArgument(format!(
                "unsupported system call {}",
                service
            ))),
        },
        MipsOp::ADD_S => float_op(&ops[0], &ops[1], &ops[2], state, |a, b| Ok(a + b)),
        MipsOp::SUB_S => float_op(&ops[0], &ops[1], &ops[2], state, |a, b| Ok(a - b)),
        MipsOp::MUL_S => float_op(&ops[0], &ops[1], &ops[2], state, |a, b| Ok(a * b)),
        MipsOp::DIV_S => float_op(&ops[0], &ops[1], &ops[2], state, float_div),
        // Memory holds the single precision bit pattern
        MipsOp::LWC1 => {
            let bits = ops[1].value(state)? as u32;
            ops[0].set_float(state, f32::from_bits(bits) as f64)?;
            Ok(ControlTransfer::Continue)
        }
        MipsOp::SWC1 => {
            let value = ops[0].float(state)? as f32;
            ops[1].set_value(state, value.to_bits() as i64)?;
            Ok(ControlTransfer::Continue)
        }
    }
}

/// Numeric targets are word addresses within the current 256MB region.
fn jump(ops: &[Operand], state: &MachineState) -> Result<ControlTransfer, RunError> {
    let region = (state.ip & 0xF000_0000) as i64;
    target(&ops[0], state, |word| region | (word << 2)).map(ControlTransfer::Jump)
}
