use std::fmt;

use crate::error::RunError;
use crate::flavor::{FlavorSpec, Isa};
use crate::operand::{Operand, Slot};
use crate::state::MachineState;
use crate::symbol::Flag;

pub mod intel;
pub mod mips;
pub mod riscv;

use intel::IntelOp;
use mips::MipsOp;
use riscv::RiscvOp;

/// Instruction of any supported instruction set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Opcode {
    Intel(IntelOp),
    Mips(MipsOp),
    Riscv(RiscvOp),
}

/// What the interpreter loop should do after an instruction body returns.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ControlTransfer {
    Continue,
    Jump(Target),
    /// Explicit exit requested by the program
    Halt,
}

/// Destination of a jump, resolved by the interpreter loop.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Target {
    Label(String),
    Address(i64),
}

impl Opcode {
    /// Find the instruction named `mnemonic`, accepting the flavor's size suffix.
    pub fn lookup(spec: &FlavorSpec, mnemonic: &str) -> Option<Opcode> {
        let upper = mnemonic.to_ascii_uppercase();
        let find = |name: &str| match spec.isa {
            Isa::X86 => IntelOp::from_mnemonic(name).map(Opcode::Intel),
            Isa::Mips => MipsOp::from_mnemonic(name).map(Opcode::Mips),
            Isa::Riscv => RiscvOp::from_mnemonic(name).map(Opcode::Riscv),
        };
        find(&upper).or_else(|| {
            let suffix = spec.mnemonic_suffix?;
            find(upper.strip_suffix(suffix)?)
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Opcode::Intel(op) => op.name(),
            Opcode::Mips(op) => op.name(),
            Opcode::Riscv(op) => op.name(),
        }
    }

    /// Accepted operand lists, one entry per allowed arity.
    pub fn signatures(self) -> &'static [&'static [Slot]] {
        match self {
            Opcode::Intel(op) => op.signatures(),
            Opcode::Mips(op) => op.signatures(),
            Opcode::Riscv(op) => op.signatures(),
        }
    }

    /// Run the instruction body. The instruction pointer has already been advanced.
    pub fn execute(
        self,
        operands: &[Operand],
        state: &mut MachineState,
    ) -> Result<ControlTransfer, RunError> {
        match self {
            Opcode::Intel(op) => intel::execute(op, operands, state),
            Opcode::Mips(op) => mips::execute(op, operands, state),
            Opcode::Riscv(op) => riscv::execute(op, operands, state),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reduce an arithmetic result to 32 bits, setting the carry flag when it did not fit.
pub(crate) fn checkflag(state: &mut MachineState, value: i64) -> i64 {
    let fits = (i32::MIN as i64..=i32::MAX as i64).contains(&value);
    state.set_flag(Flag::Carry, !fits);
    value as i32 as i64
}

/// Truncate to the 32-bit two's complement pattern without touching flags.
pub(crate) fn word(value: i64) -> i64 {
    value as i32 as i64
}

/// Jump target named by a label or numeric operand. `numeric` maps the literal to an address.
pub(crate) fn target(
    operand: &Operand,
    state: &MachineState,
    numeric: impl FnOnce(i64) -> i64,
) -> Result<Target, RunError> {
    match operand {
        Operand::Label(label) => Ok(Target::Label(label.to_string())),
        Operand::Imm(imm) => Ok(Target::Address(numeric(imm.value))),
        Operand::Reg(_) | Operand::Mem(_) => Ok(Target::Address(operand.value(state)?)),
    }
}

/// `dest = f(a, b)` for three-operand register instructions.
pub(crate) fn three(
    ops: &[Operand],
    state: &mut MachineState,
    f: impl FnOnce(&mut MachineState, i64, i64) -> Result<i64, RunError>,
) -> Result<ControlTransfer, RunError> {
    let a = ops[1].value(state)?;
    let b = ops[2].value(state)?;
    let result = f(state, a, b)?;
    ops[0].set_value(state, result)?;
    Ok(ControlTransfer::Continue)
}

/// `dest = f(a, b)` over floating-point registers.
pub(crate) fn float_op(
    dest: &Operand,
    a: &Operand,
    b: &Operand,
    state: &mut MachineState,
    f: impl FnOnce(f64, f64) -> Result<f64, RunError>,
) -> Result<ControlTransfer, RunError> {
    let result = f(a.float(state)?, b.float(state)?)?;
    dest.set_float(state, result)?;
    Ok(ControlTransfer::Continue)
}

pub(crate) fn float_div(a: f64, b: f64) -> Result<f64, RunError> {
    if b == 0.0 {
        return Err(RunError::DivisionZero);
    }
    Ok(a / b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Flavor;
    use crate::operand::Kinds;

    #[test]
    fn lookup_per_isa() {
        let intel = Flavor::Intel.spec();
        assert_eq!(Opcode::lookup(intel, "mov"), Some(Opcode::Intel(IntelOp::MOV)));
        assert_eq!(Opcode::lookup(intel, "jz"), Some(Opcode::Intel(IntelOp::JE)));
        assert_eq!(Opcode::lookup(intel, "movl"), None);
        assert_eq!(Opcode::lookup(intel, "addi"), None);

        let att = Flavor::Att.spec();
        assert_eq!(Opcode::lookup(att, "movl"), Some(Opcode::Intel(IntelOp::MOV)));
        assert_eq!(Opcode::lookup(att, "shl"), Some(Opcode::Intel(IntelOp::SHL)));
        assert_eq!(Opcode::lookup(att, "call"), Some(Opcode::Intel(IntelOp::CALL)));

        let mips = Flavor::MipsMml.spec();
        assert_eq!(Opcode::lookup(mips, "addi"), Some(Opcode::Mips(MipsOp::ADDI)));
        let rv = Flavor::Riscv.spec();
        assert_eq!(Opcode::lookup(rv, "ecall"), Some(Opcode::Riscv(RiscvOp::ECALL)));

        assert_eq!(Opcode::lookup(intel, "fdiv"), Some(Opcode::Intel(IntelOp::FDIV)));
        assert_eq!(Opcode::lookup(mips, "add.s"), Some(Opcode::Mips(MipsOp::ADD_S)));
        assert_eq!(Opcode::lookup(mips, "MULT.S"), Some(Opcode::Mips(MipsOp::MUL_S)));
        assert_eq!(Opcode::lookup(mips, "lwc"), Some(Opcode::Mips(MipsOp::LWC1)));
    }

    #[test]
    fn every_instruction_has_a_signature() {
        let ops = IntelOp::ALL
            .into_iter()
            .map(Opcode::Intel)
            .chain(MipsOp::ALL.into_iter().map(Opcode::Mips))
            .chain(RiscvOp::ALL.into_iter().map(Opcode::Riscv));
        for op in ops {
            assert!(!op.signatures().is_empty(), "{}", op);
        }
        assert_eq!(
            Opcode::Intel(IntelOp::CMP).signatures(),
            &[&[Slot::new(Kinds::VALUE), Slot::new(Kinds::VALUE)][..]]
        );
    }

    #[test]
    fn checkflag_wraps() {
        let mut state = MachineState::new(Flavor::Intel);
        assert_eq!(checkflag(&mut state, i32::MAX as i64 + 1), i32::MIN as i64);
        assert_eq!(state.flag(Flag::Carry), 1);
        assert_eq!(checkflag(&mut state, i32::MIN as i64 - 1), i32::MAX as i64);
        assert_eq!(state.flag(Flag::Carry), 1);
        assert_eq!(checkflag(&mut state, -5), -5);
        assert_eq!(state.flag(Flag::Carry), 0);
    }
}
