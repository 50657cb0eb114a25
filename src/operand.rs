use std::fmt;

use crate::error::RunError;
use crate::ops::word;
use crate::state::MachineState;
use crate::symbol::{Label, Radix, Register};

/// Literal operand. Keeps the base it was written in for display.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Immediate {
    pub value: i64,
    pub radix: Radix,
}

/// Memory operand addressing `base + index + disp`.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct MemRef {
    pub base: Option<Register>,
    pub index: Option<Register>,
    pub disp: i64,
}

impl MemRef {
    pub fn absolute(disp: i64) -> Self {
        MemRef {
            disp,
            ..Default::default()
        }
    }

    pub fn address(&self, state: &MachineState) -> u32 {
        let base = self.base.map_or(0, |reg| state.reg(reg.name()));
        let index = self.index.map_or(0, |reg| state.reg(reg.name()));
        base.wrapping_add(index).wrapping_add(self.disp) as u32
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(base) = self.base {
            parts.push(base.to_string());
        }
        if let Some(index) = self.index {
            parts.push(index.to_string());
        }
        if self.disp != 0 || parts.is_empty() {
            parts.push(Radix::Hex.format(self.disp));
        }
        write!(f, "[{}]", parts.join(" + "))
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    Reg(Register),
    Imm(Immediate),
    Mem(MemRef),
    Label(Label),
}

impl Operand {
    pub fn imm(value: i64) -> Self {
        Operand::Imm(Immediate {
            value,
            radix: Radix::Dec,
        })
    }

    pub fn kind(&self) -> Kinds {
        match self {
            Operand::Reg(reg) if reg.is_float() => Kinds::FREG,
            Operand::Reg(_) => Kinds::REG,
            Operand::Imm(_) => Kinds::IMM,
            Operand::Mem(_) => Kinds::MEM,
            Operand::Label(_) => Kinds::LBL,
        }
    }

    /// Current value of the operand. A label reads as its address.
    pub fn value(&self, state: &MachineState) -> Result<i64, RunError> {
        match self {
            Operand::Reg(reg) if reg.is_float() => Err(float_mismatch(reg)),
            Operand::Reg(reg) => Ok(state.reg(reg.name())),
            Operand::Imm(imm) => Ok(imm.value),
            Operand::Mem(mem) => Ok(state.read_mem(mem.address(state))),
            Operand::Label(label) => state
                .label(label.name())
                .map(i64::from)
                .ok_or_else(|| RunError::InvalidLabel(label.to_string())),
        }
    }

    /// Store `value` reduced to the 32-bit machine width.
    pub fn set_value(&self, state: &mut MachineState, value: i64) -> Result<(), RunError> {
        let value = word(value);
        match self {
            Operand::Reg(reg) if reg.is_float() => Err(float_mismatch(reg)),
            Operand::Reg(reg) => {
                state.set_reg(reg.name(), value);
                Ok(())
            }
            Operand::Mem(mem) => {
                let addr = mem.address(state);
                state.write_mem(addr, value);
                Ok(())
            }
            Operand::Imm(_) | Operand::Label(_) => Err(RunError::InvalidArgument(format!(
                "cannot write to `{}`",
                self
            ))),
        }
    }

    /// Value of a floating-point register operand.
    pub fn float(&self, state: &MachineState) -> Result<f64, RunError> {
        match self {
            Operand::Reg(reg) if reg.is_float() => Ok(state.freg(reg.name())),
            _ => Err(RunError::InvalidArgument(format!(
                "`{}` is not a floating-point register",
                self
            ))),
        }
    }

    pub fn set_float(&self, state: &mut MachineState, value: f64) -> Result<(), RunError> {
        match self {
            Operand::Reg(reg) if reg.is_float() => {
                state.set_freg(reg.name(), value);
                Ok(())
            }
            _ => Err(RunError::InvalidArgument(format!(
                "`{}` is not a floating-point register",
                self
            ))),
        }
    }

    pub fn as_reg(&self) -> Option<Register> {
        match self {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        }
    }
}

fn float_mismatch(reg: &Register) -> RunError {
    RunError::InvalidArgument(format!("`{}` holds a floating-point value", reg))
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{}", reg),
            Operand::Imm(imm) => f.write_str(&imm.radix.format(imm.value)),
            Operand::Mem(mem) => write!(f, "{}", mem),
            Operand::Label(label) => write!(f, "{}", label),
        }
    }
}

/// Set of operand kinds accepted in one position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Kinds(u8);

impl Kinds {
    pub const REG: Kinds = Kinds(0b0001);
    pub const IMM: Kinds = Kinds(0b0010);
    pub const MEM: Kinds = Kinds(0b0100);
    pub const LBL: Kinds = Kinds(0b1000);
    pub const FREG: Kinds = Kinds(0b1_0000);
    pub const REG_MEM: Kinds = Kinds::REG.or(Kinds::MEM);
    pub const VALUE: Kinds = Kinds::REG.or(Kinds::MEM).or(Kinds::IMM);
    pub const TARGET: Kinds = Kinds::LBL.or(Kinds::IMM);

    pub const fn or(self, other: Kinds) -> Kinds {
        Kinds(self.0 | other.0)
    }

    pub fn contains(self, other: Kinds) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Display for Kinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Kinds::REG, "register"),
            (Kinds::IMM, "immediate"),
            (Kinds::MEM, "memory reference"),
            (Kinds::LBL, "label"),
            (Kinds::FREG, "floating-point register"),
        ]
        .into_iter()
        .filter(|(kind, _)| self.contains(*kind))
        .map(|(_, name)| name)
        .collect();
        f.write_str(&names.join(" or "))
    }
}

/// Convenient way to pass around bit limits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Bits {
    Signed(u8),
    Unsigned(u8),
    /// Signed or unsigned, as long as the bit pattern fits.
    Either(u8),
}

impl Bits {
    pub fn width(self) -> u8 {
        match self {
            Bits::Signed(n) | Bits::Unsigned(n) | Bits::Either(n) => n,
        }
    }

    pub fn fits(self, value: i64) -> bool {
        match self {
            Bits::Signed(n) => {
                let range = 1i64 << (n - 1);
                (-range..range).contains(&value)
            }
            Bits::Unsigned(n) => (0..1i64 << n).contains(&value),
            Bits::Either(n) => (-(1i64 << (n - 1))..1i64 << n).contains(&value),
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.width().to_string())
    }
}

/// One operand position of an instruction signature.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Slot {
    pub kinds: Kinds,
    pub imm: Bits,
}

impl Slot {
    pub const fn new(kinds: Kinds) -> Self {
        Slot {
            kinds,
            imm: Bits::Either(32),
        }
    }

    pub const fn imm(kinds: Kinds, imm: Bits) -> Self {
        Slot { kinds, imm }
    }
}
