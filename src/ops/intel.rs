use crate::error::RunError;
use crate::operand::{Bits, Kinds, Operand, Slot};
use crate::state::MachineState;
use crate::symbol::Flag;

use super::{checkflag, float_div, float_op, target, word, ControlTransfer, Target};

/// x86 instructions shared by the Intel and AT&T flavors.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IntelOp {
    MOV,
    ADD,
    SUB,
    IMUL,
    AND,
    OR,
    XOR,
    SHL,
    SHR,
    NOT,
    NEG,
    INC,
    DEC,
    IDIV,
    CMP,
    PUSH,
    POP,
    JMP,
    /// Also written `JZ`
    JE,
    /// Also written `JNZ`
    JNE,
    JG,
    JGE,
    JL,
    JLE,
    LOOP,
    CALL,
    RET,
    INT,
    BTR,
    BTS,
    BSF,
    BSR,
    FADD,
    FSUB,
    FMUL,
    FDIV,
}

const DEST_SRC: &[Slot] = &[Slot::new(Kinds::REG_MEM), Slot::new(Kinds::VALUE)];
const SHIFT: &[Slot] = &[
    Slot::new(Kinds::REG_MEM),
    Slot::imm(Kinds::VALUE, Bits::Unsigned(5)),
];
const DEST: &[Slot] = &[Slot::new(Kinds::REG_MEM)];
const SRC: &[Slot] = &[Slot::new(Kinds::VALUE)];
const JUMP: &[Slot] = &[Slot::new(Kinds::TARGET)];
const BIT_SCAN: &[Slot] = &[Slot::new(Kinds::REG), Slot::new(Kinds::VALUE)];
const COMPARE: &[Slot] = &[Slot::new(Kinds::VALUE), Slot::new(Kinds::VALUE)];
const INTERRUPT: &[Slot] = &[Slot::imm(Kinds::IMM, Bits::Unsigned(8))];
const FLOAT2: &[Slot] = &[Slot::new(Kinds::FREG), Slot::new(Kinds::FREG)];

impl IntelOp {
    pub const ALL: [IntelOp; 36] = [
        IntelOp::MOV,
        IntelOp::ADD,
        IntelOp::SUB,
        IntelOp::IMUL,
        IntelOp::AND,
        IntelOp::OR,
        IntelOp::XOR,
        IntelOp::SHL,
        IntelOp::SHR,
        IntelOp::NOT,
        IntelOp::NEG,
        IntelOp::INC,
        IntelOp::DEC,
        IntelOp::IDIV,
        IntelOp::CMP,
        IntelOp::PUSH,
        IntelOp::POP,
        IntelOp::JMP,
        IntelOp::JE,
        IntelOp::JNE,
        IntelOp::JG,
        IntelOp::JGE,
        IntelOp::JL,
        IntelOp::JLE,
        IntelOp::LOOP,
        IntelOp::CALL,
        IntelOp::RET,
        IntelOp::INT,
        IntelOp::BTR,
        IntelOp::BTS,
        IntelOp::BSF,
        IntelOp::BSR,
        IntelOp::FADD,
        IntelOp::FSUB,
        IntelOp::FMUL,
        IntelOp::FDIV,
    ];

    /// Expects an uppercase mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        match name {
            "JZ" => Some(IntelOp::JE),
            "JNZ" => Some(IntelOp::JNE),
            _ => Self::ALL.into_iter().find(|op| op.name() == name),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntelOp::MOV => "MOV",
            IntelOp::ADD => "ADD",
            IntelOp::SUB => "SUB",
            IntelOp::IMUL => "IMUL",
            IntelOp::AND => "AND",
            IntelOp::OR => "OR",
            IntelOp::XOR => "XOR",
            IntelOp::SHL => "SHL",
            IntelOp::SHR => "SHR",
            IntelOp::NOT => "NOT",
            IntelOp::NEG => "NEG",
            IntelOp::INC => "INC",
            IntelOp::DEC => "DEC",
            IntelOp::IDIV => "IDIV",
            IntelOp::CMP => "CMP",
            IntelOp::PUSH => "PUSH",
            IntelOp::POP => "POP",
            IntelOp::JMP => "JMP",
            IntelOp::JE => "JE",
            IntelOp::JNE => "JNE",
            IntelOp::JG => "JG",
            IntelOp::JGE => "JGE",
            IntelOp::JL => "JL",
            IntelOp::JLE => "JLE",
            IntelOp::LOOP => "LOOP",
            IntelOp::CALL => "CALL",
            IntelOp::RET => "RET",
            IntelOp::INT => "INT",
            IntelOp::BTR => "BTR",
            IntelOp::BTS => "BTS",
            IntelOp::BSF => "BSF",
            IntelOp::BSR => "BSR",
            IntelOp::FADD => "FADD",
            IntelOp::FSUB => "FSUB",
            IntelOp::FMUL => "FMUL",
            IntelOp::FDIV => "FDIV",
        }
    }

    pub fn signatures(self) -> &'static [&'static [Slot]] {
        match self {
            IntelOp::MOV
            | IntelOp::ADD
            | IntelOp::SUB
            | IntelOp::IMUL
            | IntelOp::AND
            | IntelOp::OR
            | IntelOp::XOR
            | IntelOp::BTR
            | IntelOp::BTS => &[DEST_SRC],
            IntelOp::SHL | IntelOp::SHR => &[SHIFT],
            IntelOp::NOT
            | IntelOp::NEG
            | IntelOp::INC
            | IntelOp::DEC
            | IntelOp::IDIV
            | IntelOp::POP => &[DEST],
            IntelOp::CMP => &[COMPARE],
            IntelOp::PUSH => &[SRC],
            IntelOp::JMP
            | IntelOp::JE
            | IntelOp::JNE
            | IntelOp::JG
            | IntelOp::JGE
            | IntelOp::JL
            | IntelOp::JLE
            | IntelOp::LOOP
            | IntelOp::CALL => &[JUMP],
            IntelOp::RET => &[&[]],
            IntelOp::INT => &[INTERRUPT],
            IntelOp::BSF | IntelOp::BSR => &[BIT_SCAN],
            IntelOp::FADD | IntelOp::FSUB | IntelOp::FMUL | IntelOp::FDIV => &[FLOAT2],
        }
    }
}

pub fn execute(
    op: IntelOp,
    ops: &[Operand],
    state: &mut MachineState,
) -> Result<ControlTransfer, RunError> {
    match op {
        IntelOp::MOV => {
            let value = ops[1].value(state)?;
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        IntelOp::ADD => arith(ops, state, |a, b| a + b),
        IntelOp::SUB => arith(ops, state, |a, b| a - b),
        IntelOp::IMUL => arith(ops, state, i64::wrapping_mul),
        IntelOp::AND => arith(ops, state, |a, b| a & b),
        IntelOp::OR => arith(ops, state, |a, b| a | b),
        IntelOp::XOR => arith(ops, state, |a, b| a ^ b),
        IntelOp::SHL => arith(ops, state, |a, b| a << (b & 31)),
        IntelOp::SHR => arith(ops, state, |a, b| word(((a as u32) >> (b & 31)) as i64)),
        IntelOp::NOT => {
            let value = ops[0].value(state)?;
            ops[0].set_value(state, word(!value))?;
            Ok(ControlTransfer::Continue)
        }
        IntelOp::NEG => unary(ops, state, |a| -a),
        IntelOp::INC => unary(ops, state, |a| a + 1),
        IntelOp::DEC => unary(ops, state, |a| a - 1),
        IntelOp::IDIV => idiv(ops, state),
        IntelOp::CMP => {
            let a = ops[0].value(state)?;
            let b = ops[1].value(state)?;
            state.set_flag(Flag::Zero, a == b);
            state.set_flag(Flag::Sign, a < b);
            Ok(ControlTransfer::Continue)
        }
        IntelOp::PUSH => {
            let value = ops[0].value(state)?;
            state.push(value)?;
            Ok(ControlTransfer::Continue)
        }
        IntelOp::POP => {
            let value = state.pop()?;
            ops[0].set_value(state, value)?;
            Ok(ControlTransfer::Continue)
        }
        IntelOp::JMP => jump_if(ops, state, true),
        IntelOp::JE => {
            let zero = state.flag(Flag::Zero) == 1;
            jump_if(ops, state, zero)
        }
        IntelOp::JNE => {
            let zero = state.flag(Flag::Zero) == 1;
            jump_if(ops, state, !zero)
        }
        IntelOp::JG => {
            let greater = state.flag(Flag::Zero) == 0 && state.flag(Flag::Sign) == 0;
            jump_if(ops, state, greater)
        }
        IntelOp::JGE => {
            let cond = state.flag(Flag::Sign) == 0;
            jump_if(ops, state, cond)
        }
        IntelOp::JL => {
            let cond = state.flag(Flag::Sign) == 1;
            jump_if(ops, state, cond)
        }
        IntelOp::JLE => {
            let cond = state.flag(Flag::Sign) == 1 || state.flag(Flag::Zero) == 1;
            jump_if(ops, state, cond)
        }
        IntelOp::LOOP => {
            let count = state.reg("ECX") - 1;
            state.set_reg("ECX", count);
            jump_if(ops, state, count != 0)
        }
        IntelOp::CALL => {
            // Return address is the already advanced pointer
            state.push(state.ip as i64)?;
            jump_if(ops, state, true)
        }
        IntelOp::RET => {
            let addr = state.pop()?;
            Ok(ControlTransfer::Jump(Target::Address(addr)))
        }
        IntelOp::INT => {
            let vector = ops[0].value(state)?;
            match vector {
                0x20 => Ok(ControlTransfer::Halt),
                0x80 => match state.reg("EAX") {
                    1 => Ok(ControlTransfer::Halt),
                    service => Err(RunError::InvalidArgument(format!(
                        "unsupported system call {}",
                        service
                    ))),
                },
                _ => Err(RunError::InvalidArgument(format!(
                    "unsupported interrupt {:#X}",
                    vector
                ))),
            }
        }
        IntelOp::BTR => bit_test(ops, state, |value, mask| value & !mask),
        IntelOp::BTS => bit_test(ops, state, |value, mask| value | mask),
        IntelOp::BSF | IntelOp::BSR => bit_scan(op == IntelOp::BSR, ops, state),
        // `ST0 = ST0 op STi`, the register forms only
        IntelOp::FADD => float_op(&ops[0], &ops[0], &ops[1], state, |a, b| Ok(a + b)),
        IntelOp::FSUB => float_op(&ops[0], &ops[0], &ops[1], state, |a, b| Ok(a - b)),
        IntelOp::FMUL => float_op(&ops[0], &ops[0], &ops[1], state, |a, b| Ok(a * b)),
        IntelOp::FDIV => float_op(&ops[0], &ops[0], &ops[1], state, float_div),
    }
}

fn arith(
    ops: &[Operand],
    state: &mut MachineState,
    f: impl FnOnce(i64, i64) -> i64,
) -> Result<ControlTransfer, RunError> {
    let a = ops[0].value(state)?;
    let b = ops[1].value(state)?;
    let result = checkflag(state, f(a, b));
    ops[0].set_value(state, result)?;
    Ok(ControlTransfer::Continue)
}

fn unary(
    ops: &[Operand],
    state: &mut MachineState,
    f: impl FnOnce(i64) -> i64,
) -> Result<ControlTransfer, RunError> {
    let a = ops[0].value(state)?;
    let result = checkflag(state, f(a));
    ops[0].set_value(state, result)?;
    Ok(ControlTransfer::Continue)
}

/// Divide `EDX:EAX` by the operand. Quotient to `EAX`, remainder to `EDX`.
fn idiv(ops: &[Operand], state: &mut MachineState) -> Result<ControlTransfer, RunError> {
    let divisor = ops[0].value(state)? as i128;
    if divisor == 0 {
        return Err(RunError::DivisionZero);
    }
    let dividend = ((state.reg("EDX") as i128) << 32) + state.reg("EAX") as i128;
    // Rust division truncates towards zero, as x86 does
    let quotient = dividend / divisor;
    let remainder = dividend % divisor;
    // x86 faults when the quotient cannot be stored
    let quotient = i64::try_from(quotient).map_err(|_| {
        RunError::InvalidArgument(format!("quotient {} overflows the destination", quotient))
    })?;
    state.set_reg("EAX", quotient);
    state.set_reg("EDX", remainder as i64);
    Ok(ControlTransfer::Continue)
}

fn jump_if(
    ops: &[Operand],
    state: &MachineState,
    cond: bool,
) -> Result<ControlTransfer, RunError> {
    if !cond {
        return Ok(ControlTransfer::Continue);
    }
    // Numeric targets are absolute line addresses
    target(&ops[0], state, |addr| addr).map(ControlTransfer::Jump)
}

/// Copy the indexed bit into `CF`, then store `update(value, mask)`.
fn bit_test(
    ops: &[Operand],
    state: &mut MachineState,
    update: impl FnOnce(i64, i64) -> i64,
) -> Result<ControlTransfer, RunError> {
    let index = ops[1].value(state)?;
    if !(0..32).contains(&index) {
        return Err(RunError::InvalidConstantValue(index));
    }
    let value = ops[0].value(state)?;
    let mask = 1i64 << index;
    state.set_flag(Flag::Carry, value & mask != 0);
    ops[0].set_value(state, word(update(value, mask)))?;
    Ok(ControlTransfer::Continue)
}

fn bit_scan(
    reverse: bool,
    ops: &[Operand],
    state: &mut MachineState,
) -> Result<ControlTransfer, RunError> {
    let source = ops[1].value(state)?;
    if source == 0 {
        state.set_flag(Flag::Zero, true);
        return Ok(ControlTransfer::Continue);
    }
    state.set_flag(Flag::Zero, false);
    let pattern = source as u32;
    let width = if pattern >> 16 == 0 { 16 } else { 32 };
    let index = if reverse {
        width - 1 - (pattern << (32 - width)).leading_zeros()
    } else {
        pattern.trailing_zeros()
    };
    ops[0].set_value(state, index as i64)?;
    Ok(ControlTransfer::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Flavor;
    use crate::symbol::Location;

    fn reg(name: &str) -> Operand {
        Operand::Reg(Flavor::Intel.spec().register(name).unwrap())
    }

    fn run(op: IntelOp, ops: &[Operand], state: &mut MachineState) -> ControlTransfer {
        execute(op, ops, state).unwrap()
    }

    #[test]
    fn not_complements() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 18);
        run(IntelOp::NOT, &[reg("EAX")], &mut state);
        assert_eq!(state.reg("EAX"), -19);
    }

    #[test]
    fn add_wraps_and_sets_carry() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", i32::MAX as i64);
        run(IntelOp::ADD, &[reg("EAX"), Operand::imm(1)], &mut state);
        assert_eq!(state.reg("EAX"), i32::MIN as i64);
        assert_eq!(state.flag(Flag::Carry), 1);

        run(IntelOp::SUB, &[reg("EAX"), Operand::imm(-5)], &mut state);
        assert_eq!(state.reg("EAX"), i32::MIN as i64 + 5);
        assert_eq!(state.flag(Flag::Carry), 0);
    }

    #[test]
    fn arithmetic_matches_operators() {
        let pairs = [(7, 3), (-12, 5), (0, -1), (100_000, 30_000), (-40_000, 60_000)];
        let table: [(IntelOp, fn(i64, i64) -> i64); 5] = [
            (IntelOp::ADD, |a, b| a + b),
            (IntelOp::SUB, |a, b| a - b),
            (IntelOp::IMUL, |a, b| a * b),
            (IntelOp::AND, |a, b| a & b),
            (IntelOp::XOR, |a, b| a ^ b),
        ];
        for (op, f) in table {
            for (a, b) in pairs {
                let mut state = MachineState::new(Flavor::Intel);
                state.set_reg("EAX", a);
                state.set_reg("EBX", b);
                run(op, &[reg("EAX"), reg("EBX")], &mut state);
                let exact = f(a, b);
                let wrapped = exact as i32 as i64;
                assert_eq!(state.reg("EAX"), wrapped, "{} {} {}", op.name(), a, b);
                assert_eq!(state.flag(Flag::Carry), (exact != wrapped) as u8);
            }
        }
    }

    #[test]
    fn idiv_uses_edx_eax() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 1);
        state.set_reg("EDX", 1);
        state.set_reg("EBX", 2);
        state.clear_changes();
        run(IntelOp::IDIV, &[reg("EBX")], &mut state);
        assert_eq!(state.reg("EAX"), 2147483648);
        assert_eq!(state.reg("EDX"), 1);
        let changed: Vec<_> = state.changes.iter().copied().collect();
        assert_eq!(
            changed,
            vec![Location::Register("EAX"), Location::Register("EDX")]
        );
    }

    #[test]
    fn idiv_truncates() {
        for (eax, divisor) in [(-7i64, 2i64), (7, -2), (-9, -4), (13, 5)] {
            let mut state = MachineState::new(Flavor::Intel);
            let edx = if eax < 0 { -1 } else { 0 };
            state.set_reg("EAX", eax);
            state.set_reg("EDX", edx);
            state.set_reg("ECX", divisor);
            run(IntelOp::IDIV, &[reg("ECX")], &mut state);
            let dividend = (edx << 32) + eax;
            let (q, r) = (state.reg("EAX"), state.reg("EDX"));
            assert_eq!(q * divisor + r, dividend);
            assert!(r == 0 || r.signum() == dividend.signum());
        }
    }

    #[test]
    fn idiv_by_zero_leaves_registers() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 10);
        state.set_reg("EDX", 3);
        let result = execute(IntelOp::IDIV, &[reg("EBX")], &mut state);
        assert_eq!(result, Err(RunError::DivisionZero));
        assert_eq!(state.reg("EAX"), 10);
        assert_eq!(state.reg("EDX"), 3);
    }

    #[test]
    fn idiv_quotient_overflow_faults() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EDX", i32::MIN as i64);
        state.set_reg("EAX", 0);
        state.set_reg("EBX", -1);
        let result = execute(IntelOp::IDIV, &[reg("EBX")], &mut state);
        assert!(matches!(result, Err(RunError::InvalidArgument(_))));
        assert_eq!(state.reg("EAX"), 0);
        assert_eq!(state.reg("EDX"), i32::MIN as i64);
    }

    #[test]
    fn float_arithmetic_on_st_registers() {
        let cases: [(IntelOp, f64); 4] = [
            (IntelOp::FADD, 7.75),
            (IntelOp::FSUB, 4.25),
            (IntelOp::FMUL, 10.5),
            (IntelOp::FDIV, 3.428571428571429),
        ];
        for (op, expected) in cases {
            let mut state = MachineState::new(Flavor::Intel);
            state.set_freg("ST0", 6.0);
            state.set_freg("ST1", 1.75);
            state.clear_changes();
            run(op, &[reg("ST0"), reg("ST1")], &mut state);
            assert!((state.freg("ST0") - expected).abs() < 1e-9, "{:?}", op);
            assert_eq!(state.freg("ST1"), 1.75);
            assert_eq!(
                state.changes.iter().copied().collect::<Vec<_>>(),
                vec![Location::Register("ST0")]
            );
        }

        let mut state = MachineState::new(Flavor::Intel);
        state.set_freg("ST0", 1.0);
        let result = execute(IntelOp::FDIV, &[reg("ST0"), reg("ST1")], &mut state);
        assert_eq!(result, Err(RunError::DivisionZero));
        assert_eq!(state.freg("ST0"), 1.0);
    }

    #[test]
    fn cmp_sets_zero_and_sign() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 3);
        run(IntelOp::CMP, &[reg("EAX"), Operand::imm(5)], &mut state);
        assert_eq!(state.flag(Flag::Zero), 0);
        assert_eq!(state.flag(Flag::Sign), 1);
        run(IntelOp::CMP, &[reg("EAX"), Operand::imm(3)], &mut state);
        assert_eq!(state.flag(Flag::Zero), 1);
        assert_eq!(state.flag(Flag::Sign), 0);
        assert_eq!(state.reg("EAX"), 3);
    }

    #[test]
    fn conditional_jumps() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 1);
        run(IntelOp::CMP, &[reg("EAX"), Operand::imm(2)], &mut state);
        let target = Operand::Label(crate::symbol::Label::new("done"));
        assert_eq!(
            run(IntelOp::JL, &[target.clone()], &mut state),
            ControlTransfer::Jump(Target::Label("done".into()))
        );
        assert_eq!(
            run(IntelOp::JGE, &[target], &mut state),
            ControlTransfer::Continue
        );
    }

    #[test]
    fn shifts() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", -8);
        run(IntelOp::SHR, &[reg("EAX"), Operand::imm(1)], &mut state);
        assert_eq!(state.reg("EAX"), 0x7FFF_FFFC);
        run(IntelOp::SHL, &[reg("EAX"), Operand::imm(1)], &mut state);
        assert_eq!(state.reg("EAX"), -8);
        assert_eq!(state.flag(Flag::Carry), 1);
    }

    #[test]
    fn bit_test_and_set() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 0b1010);
        run(IntelOp::BTR, &[reg("EAX"), Operand::imm(1)], &mut state);
        assert_eq!(state.reg("EAX"), 0b1000);
        assert_eq!(state.flag(Flag::Carry), 1);
        run(IntelOp::BTS, &[reg("EAX"), Operand::imm(0)], &mut state);
        assert_eq!(state.reg("EAX"), 0b1001);
        assert_eq!(state.flag(Flag::Carry), 0);
        assert_eq!(
            execute(IntelOp::BTS, &[reg("EAX"), Operand::imm(32)], &mut state),
            Err(RunError::InvalidConstantValue(32))
        );
    }

    #[test]
    fn bit_scan_forward_and_reverse() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EBX", 0b0110_0000);
        run(IntelOp::BSF, &[reg("EAX"), reg("EBX")], &mut state);
        assert_eq!(state.reg("EAX"), 5);
        run(IntelOp::BSR, &[reg("EAX"), reg("EBX")], &mut state);
        assert_eq!(state.reg("EAX"), 6);
        assert_eq!(state.flag(Flag::Zero), 0);

        state.set_reg("EBX", 0x10000);
        run(IntelOp::BSR, &[reg("EAX"), reg("EBX")], &mut state);
        assert_eq!(state.reg("EAX"), 16);

        state.set_reg("EBX", 0);
        run(IntelOp::BSF, &[reg("EAX"), reg("EBX")], &mut state);
        assert_eq!(state.flag(Flag::Zero), 1);
        assert_eq!(state.reg("EAX"), 16);
    }

    #[test]
    fn call_and_ret() {
        let mut state = MachineState::new(Flavor::Intel);
        state.ip = 4;
        let target = Operand::Label(crate::symbol::Label::new("sub"));
        run(IntelOp::CALL, &[target], &mut state);
        assert_eq!(
            run(IntelOp::RET, &[], &mut state),
            ControlTransfer::Jump(Target::Address(4))
        );
    }

    #[test]
    fn interrupts() {
        let mut state = MachineState::new(Flavor::Intel);
        assert_eq!(
            run(IntelOp::INT, &[Operand::imm(0x20)], &mut state),
            ControlTransfer::Halt
        );
        assert!(execute(IntelOp::INT, &[Operand::imm(0x80)], &mut state).is_err());
        state.set_reg("EAX", 1);
        assert_eq!(
            run(IntelOp::INT, &[Operand::imm(0x80)], &mut state),
            ControlTransfer::Halt
        );
    }
}
