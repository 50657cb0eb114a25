use crate::error::RunError;
use crate::operand::{Bits, Kinds, Operand, Slot};
use crate::state::MachineState;

use super::{checkflag, target, three, word, ControlTransfer, Target};

/// RV32IM subset.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RiscvOp {
    ADD,
    SUB,
    AND,
    OR,
    XOR,
    SLL,
    SRL,
    SRA,
    SLT,
    MUL,
    DIV,
    REM,
    ADDI,
    ANDI,
    ORI,
    XORI,
    SLTI,
    SLLI,
    SRLI,
    SRAI,
    LUI,
    LW,
    SW,
    BEQ,
    BNE,
    BLT,
    BGE,
    JAL,
    JALR,
    RET,
    ECALL,
}

const REG: Slot = Slot::new(Kinds::REG);
const REG3: &[Slot] = &[REG, REG, REG];
const IMM12: &[Slot] = &[REG, REG, Slot::imm(Kinds::IMM, Bits::Signed(12))];
const SHAMT: &[Slot] = &[REG, REG, Slot::imm(Kinds::IMM, Bits::Unsigned(5))];
const BRANCH: &[Slot] = &[REG, REG, Slot::imm(Kinds::TARGET, Bits::Signed(13))];
const JUMP: Slot = Slot::imm(Kinds::TARGET, Bits::Signed(21));
const UPPER: &[Slot] = &[REG, Slot::imm(Kinds::IMM, Bits::Either(20))];
const MEM: &[Slot] = &[REG, Slot::new(Kinds::MEM)];

/// Link register used when `JAL`/`JALR` omit the destination.
const RA: &str = "X1";

impl RiscvOp {
    pub const ALL: [RiscvOp; 31] = [
        RiscvOp::ADD,
        RiscvOp::SUB,
        RiscvOp::AND,
        RiscvOp::OR,
        RiscvOp::XOR,
        RiscvOp::SLL,
        RiscvOp::SRL,
        RiscvOp::SRA,
        RiscvOp::SLT,
        RiscvOp::MUL,
        RiscvOp::DIV,
        RiscvOp::REM,
        RiscvOp::ADDI,
        RiscvOp::ANDI,
        RiscvOp::ORI,
        RiscvOp::XORI,
        RiscvOp::SLTI,
        RiscvOp::SLLI,
        RiscvOp::SRLI,
        RiscvOp::SRAI,
        RiscvOp::LUI,
        RiscvOp::LW,
        RiscvOp::SW,
        RiscvOp::BEQ,
        RiscvOp::BNE,
        RiscvOp::BLT,
        RiscvOp::BGE,
        RiscvOp::JAL,
        RiscvOp::JALR,
        RiscvOp::RET,
        RiscvOp::ECALL,
    ];

    /// Expects an uppercase mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }

    pub fn name(self) -> &'static str {
        match self {
            RiscvOp::ADD => "ADD",
            RiscvOp::SUB => "SUB",
            RiscvOp::AND => "AND",
            RiscvOp::OR => "OR",
            RiscvOp::XOR => "XOR",
            RiscvOp::SLL => "SLL",
            RiscvOp::SRL => "SRL",
            RiscvOp::SRA => "SRA",
            RiscvOp::SLT => "SLT",
            RiscvOp::MUL => "MUL",
            RiscvOp::DIV => "DIV",
            RiscvOp::REM => "REM",
            RiscvOp::ADDI => "ADDI",
            RiscvOp::ANDI => "ANDI",
            RiscvOp::ORI => "ORI",
            RiscvOp::XORI => "XORI",
            RiscvOp::SLTI => "SLTI",
            RiscvOp::SLLI => "SLLI",
            RiscvOp::SRLI => "SRLI",
            RiscvOp::SRAI => "SRAI",
            RiscvOp::LUI => "LUI",
            RiscvOp::LW => "LW",
            RiscvOp::SW => "SW",
            RiscvOp::BEQ => "BEQ",
            RiscvOp::BNE => "BNE",
            RiscvOp::BLT => "BLT",
            RiscvOp::BGE => "BGE",
            RiscvOp::JAL => "JAL",
            RiscvOp::JALR => "JALR",
            RiscvOp::RET => "RET",
            RiscvOp::ECALL => "ECALL",
        }
    }

    pub fn signatures(self) -> &'static [&'static [Slot]] {
        match self {
            RiscvOp::ADD
            | RiscvOp::SUB
            | RiscvOp::AND
            | RiscvOp::OR
            | RiscvOp::XOR
            | RiscvOp::SLL
            | RiscvOp::SRL
            | RiscvOp::SRA
            | RiscvOp::SLT
            | RiscvOp::MUL
            | RiscvOp::DIV
            | RiscvOp::REM => &[REG3],
            RiscvOp::ADDI | RiscvOp::ANDI | RiscvOp::ORI | RiscvOp::XORI | RiscvOp::SLTI => {
                &[IMM12]
            }
            RiscvOp::SLLI | RiscvOp::SRLI | RiscvOp::SRAI => &[SHAMT],
            RiscvOp::LUI => &[UPPER],
            RiscvOp::LW | RiscvOp::SW => &[MEM],
            RiscvOp::BEQ | RiscvOp::BNE | RiscvOp::BLT | RiscvOp::BGE => &[BRANCH],
            RiscvOp::JAL => &[&[JUMP], &[REG, JUMP]],
            RiscvOp::JALR => &[&[REG], IMM12],
            RiscvOp::RET | RiscvOp::ECALL => &[&[]],
        }
    }
}

pub fn execute(
    op: RiscvOp,
    ops: &[Operand],
    state: &mut MachineState,
) -> Result<ControlTransfer, RunError> {
    match op {
        RiscvOp::ADD | RiscvOp::ADDI => {
            three(ops, state, |state, a, b| Ok(checkflag(state, a + b)))
        }
        RiscvOp::SUB => three(ops, state, |state, a, b| Ok(checkflag(state, a - b))),
        RiscvOp::MUL => three(ops, state, |state, a, b| {
            Ok(checkflag(state, a.wrapping_mul(b)))
        }),
        RiscvOp::AND | RiscvOp::ANDI => three(ops, state, |_, a, b| Ok(word(a & b))),
        RiscvOp::OR | RiscvOp::ORI => three(ops, state, |_, a, b| Ok(word(a | b))),
        RiscvOp::XOR | RiscvOp::XORI => three(ops, state, |_, a, b| Ok(word(a ^ b))),
        RiscvOp::SLT | RiscvOp::SLTI => three(ops, state, |_, a, b| Ok((a < b) as i64)),
        // Register shift amounts use the low five bits
        RiscvOp::SLL | RiscvOp::SLLI => {
            three(ops, state, |state, a, b| Ok(checkflag(state, a << (b & 31))))
        }
        RiscvOp::SRL | RiscvOp::SRLI => {
            three(ops, state, |_, a, b| Ok(word(((a as u32) >> (b & 31)) as i64)))
        }
        RiscvOp::SRA | RiscvOp::SRAI => {
            three(ops, state, |_, a, b| Ok(((a as i32) >> (b & 31)) as i64))
        }
        RiscvOp::DIV => three(ops, state, |_, a, b| match b {
            0 => Err(RunError::DivisionZero),
            b => Ok(word(a / b)),
        }),
        RiscvOp::REM => three(ops, state, |_, a, b| match b {
            0 => Err(RunError::DivisionZero),
            b => Ok(word(a % b)),
        }),
        RiscvOp::LUI => {
            let upper = ops[1].value(state)?;
            ops[0].set_value(state, word(upper << 12))?;
            Ok(ControlTransfer::Continue)
        }
        RiscvOp::LW => {
            let value = ops[1].value(state)?;
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        RiscvOp::SW => {
            let value = ops[0].value(state)?;
            ops[1].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        RiscvOp::BEQ => branch(ops, state, |a, b| a == b),
        RiscvOp::BNE => branch(ops, state, |a, b| a != b),
        RiscvOp::BLT => branch(ops, state, |a, b| a < b),
        RiscvOp::BGE => branch(ops, state, |a, b| a >= b),
        RiscvOp::JAL => {
            let (link, dest) = match ops {
                [dest] => (RA, dest),
                [Operand::Reg(link), dest] => (link.name(), dest),
                _ => return Err(RunError::InvalidArgument("JAL".into())),
            };
            let here = state.ip as i64 - 4;
            let jump = target(dest, state, |offs| here + offs)?;
            let ret = state.ip as i64;
            state.set_reg(link, ret);
            Ok(ControlTransfer::Jump(jump))
        }
        RiscvOp::JALR => {
            let (link, base, offs) = match ops {
                [base] => (RA, base.value(state)?, 0),
                [Operand::Reg(link), base, offs] => {
                    (link.name(), base.value(state)?, offs.value(state)?)
                }
                _ => return Err(RunError::InvalidArgument("JALR".into())),
            };
            // Target is computed before the link register is written
            let dest = (base + offs) & !1;
            let ret = state.ip as i64;
            state.set_reg(link, ret);
            Ok(ControlTransfer::Jump(Target::Address(dest)))
        }
        RiscvOp::RET => Ok(ControlTransfer::Jump(Target::Address(state.reg(RA)))),
        RiscvOp::ECALL => match state.reg("X17") {
            10 | 93 => Ok(ControlTransfer::Halt),
            service => Err(RunError::InvalidArgument(format!(
                "unsupported system call {}",
                service
            ))),
        },
    }
}

/// Numeric branch offsets are relative to the branch itself.
fn branch(
    ops: &[Operand],
    state: &MachineState,
    cond: impl FnOnce(i64, i64) -> bool,
) -> Result<ControlTransfer, RunError> {
    if !cond(ops[0].value(state)?, ops[1].value(state)?) {
        return Ok(ControlTransfer::Continue);
    }
    let here = state.ip as i64 - 4;
    target(&ops[2], state, |offs| here + offs).map(ControlTransfer::Jump)
}
