use crate::air::{Air, Stmt};
use crate::error::EncodeError;
use crate::operand::{Bits, Operand};
use crate::ops::mips::{Format, MipsOp};
use crate::ops::Opcode;
use crate::state::MachineState;

/// Encode a whole program, one line per instruction in address order.
pub fn encode_program(air: &Air, state: &MachineState) -> Result<String, EncodeError> {
    let mut out = String::new();
    for stmt in air {
        out.push_str(&encode_stmt(stmt, state)?);
    }
    Ok(out)
}

/// Encode one instruction as `<pc> <fields...>\n`, every field in binary.
///
/// Label operands are resolved through the label map of `state`, so the
/// program must have been parsed into that state first.
pub fn encode_stmt(stmt: &Stmt, state: &MachineState) -> Result<String, EncodeError> {
    let Opcode::Mips(op) = stmt.op else {
        return Err(EncodeError::Unsupported {
            mnemonic: stmt.op.name(),
            line: stmt.line,
        });
    };
    let enc = Encoder { stmt, state };
    let fields = match op.format() {
        Format::R(funct) => enc.r_format(op, funct),
        Format::I(opcode) => enc.i_format(op, opcode)?,
        Format::J(opcode) => enc.j_format(opcode)?,
        Format::FR(funct) => enc.fr_format(funct),
    };

    let fields: Vec<String> = fields.iter().map(Field::to_string).collect();
    Ok(format!("{:032b} {}\n", stmt.addr, fields.join(" ")))
}

/// Fixed-width binary field.
#[derive(Clone, Copy, Debug)]
struct Field {
    value: u32,
    width: usize,
}

impl Field {
    fn new(value: u32, width: usize) -> Self {
        let mask = if width >= 32 { u32::MAX } else { (1 << width) - 1 };
        Field {
            value: value & mask,
            width,
        }
    }

    fn reg(reg: u8) -> Self {
        Field::new(reg as u32, 5)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:0width$b}", self.value, width = self.width)
    }
}

struct Encoder<'a> {
    stmt: &'a Stmt,
    state: &'a MachineState,
}

impl Encoder<'_> {
    /// Register number of operand `i`. Absent or non-register operands encode as zero.
    fn reg(&self, i: usize) -> u8 {
        self.stmt
            .operands
            .get(i)
            .and_then(Operand::as_reg)
            .map_or(0, |reg| reg.num())
    }

    /// Numeric value of an immediate or the address of a label.
    fn value(&self, i: usize) -> Result<i64, EncodeError> {
        match self.stmt.operands.get(i) {
            Some(Operand::Imm(imm)) => Ok(imm.value),
            Some(Operand::Label(label)) => self
                .state
                .label(label.name())
                .map(i64::from)
                .ok_or_else(|| EncodeError::UnresolvedLabel {
                    label: label.to_string(),
                    line: self.stmt.line,
                }),
            Some(Operand::Mem(mem)) => Ok(mem.disp),
            _ => Ok(0),
        }
    }

    fn is_label(&self, i: usize) -> bool {
        matches!(self.stmt.operands.get(i), Some(Operand::Label(_)))
    }

    /// Immediate field of `width` bits. Values outside `limit` cannot be encoded.
    fn immediate(&self, value: i64, limit: Bits, width: usize) -> Result<Field, EncodeError> {
        if !limit.fits(value) {
            return Err(EncodeError::ImmediateRange {
                value,
                bits: limit.width(),
                line: self.stmt.line,
            });
        }
        Ok(Field::new(value as u32, width))
    }

    // op rs rt rd shamt funct
    fn r_format(&self, op: MipsOp, funct: u8) -> Vec<Field> {
        let (rs, rt, rd, shamt) = match op {
            MipsOp::SLL | MipsOp::SRL => {
                let shamt = self.value(2).unwrap_or(0);
                (0, self.reg(1), self.reg(0), shamt as u32)
            }
            MipsOp::MULT | MipsOp::DIV => (self.reg(0), self.reg(1), 0, 0),
            MipsOp::MFLO | MipsOp::MFHI => (0, 0, self.reg(0), 0),
            MipsOp::JR => (self.reg(0), 0, 0, 0),
            MipsOp::SYSCALL => (0, 0, 0, 0),
            _ => (self.reg(1), self.reg(2), self.reg(0), 0),
        };
        vec![
            Field::new(0, 6),
            Field::reg(rs),
            Field::reg(rt),
            Field::reg(rd),
            Field::new(shamt, 5),
            Field::new(funct as u32, 6),
        ]
    }

    // op rs rt imm16
    fn i_format(&self, op: MipsOp, opcode: u8) -> Result<Vec<Field>, EncodeError> {
        let (rs, rt, imm) = match op {
            MipsOp::LW | MipsOp::SW | MipsOp::LWC1 | MipsOp::SWC1 => {
                let base = match self.stmt.operands.get(1) {
                    Some(Operand::Mem(mem)) => mem.base.map_or(0, |reg| reg.num()),
                    _ => 0,
                };
                (base, self.reg(0), self.value(1)?)
            }
            MipsOp::BEQ | MipsOp::BNE => {
                let imm = if self.is_label(2) {
                    // Word offset from the instruction after the branch
                    (self.value(2)? - (self.stmt.addr as i64 + 4)) >> 2
                } else {
                    self.value(2)?
                };
                (self.reg(0), self.reg(1), imm)
            }
            MipsOp::LUI => (0, self.reg(0), self.value(1)?),
            _ => (self.reg(1), self.reg(0), self.value(2)?),
        };
        let limit = match op {
            MipsOp::ANDI | MipsOp::ORI | MipsOp::LUI => Bits::Either(16),
            _ => Bits::Signed(16),
        };
        Ok(vec![
            Field::new(opcode as u32, 6),
            Field::reg(rs),
            Field::reg(rt),
            self.immediate(imm, limit, 16)?,
        ])
    }

    // op target26
    fn j_format(&self, opcode: u8) -> Result<Vec<Field>, EncodeError> {
        let target = if self.is_label(0) {
            self.value(0)? >> 2
        } else {
            self.value(0)?
        };
        Ok(vec![
            Field::new(opcode as u32, 6),
            self.immediate(target, Bits::Unsigned(26), 26)?,
        ])
    }

    // op fmt ft fs fd funct
    fn fr_format(&self, funct: u8) -> Vec<Field> {
        const COP1: u32 = 0b010001;
        const SINGLE: u32 = 0b10000;
        vec![
            Field::new(COP1, 6),
            Field::new(SINGLE, 5),
            Field::reg(self.reg(2)),
            Field::reg(self.reg(1)),
            Field::reg(self.reg(0)),
            Field::new(funct as u32, 6),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Flavor;
    use crate::parser::AsmParser;

    fn encode(src: &str, flavor: Flavor) -> Result<String, EncodeError> {
        let mut state = MachineState::new(flavor);
        let air = AsmParser::new(src, flavor).unwrap().parse(&mut state).unwrap();
        encode_program(&air, &state)
    }

    #[test]
    fn add_r_format() {
        let bits = encode("40000 ADD R10, R8, R9", Flavor::MipsMml).unwrap();
        assert_eq!(
            bits,
            "00000000000001000000000000000000 000000 01000 01001 01010 00000 100000\n"
        );
    }

    #[test]
    fn r_format_variants() {
        let src = "SLL $t0, $t1, 4\nMULT $t0, $t1\nMFLO $t2\nJR $ra\nSYSCALL";
        let bits = encode(src, Flavor::MipsAsm).unwrap();
        let lines: Vec<&str> = bits.lines().map(|line| &line[33..]).collect();
        assert_eq!(lines[0], "000000 00000 01001 01000 00100 000000");
        assert_eq!(lines[1], "000000 01000 01001 00000 00000 011000");
        assert_eq!(lines[2], "000000 00000 00000 01010 00000 010010");
        assert_eq!(lines[3], "000000 11111 00000 00000 00000 001000");
        assert_eq!(lines[4], "000000 00000 00000 00000 00000 001100");
    }

    #[test]
    fn i_format_immediates() {
        let bits = encode("ADDI $t0, $zero, -1\nLW $t1, 8($sp)", Flavor::MipsAsm).unwrap();
        let lines: Vec<&str> = bits.lines().map(|line| &line[33..]).collect();
        assert_eq!(lines[0], "001000 00000 01000 1111111111111111");
        assert_eq!(lines[1], "100011 11101 01001 0000000000001000");
    }

    #[test]
    fn branch_and_jump_to_labels() {
        let src = "top: ADDI $t0, $t0, 1\nBNE $t0, $zero, top\nJ top";
        let bits = encode(src, Flavor::MipsAsm).unwrap();
        let lines: Vec<&str> = bits.lines().collect();
        // 0x400000 - 0x400008 = -8 bytes = -2 words
        assert!(lines[1].ends_with("000101 01000 00000 1111111111111110"));
        assert!(lines[2].ends_with("000010 00000100000000000000000000"));
        assert!(lines[2].starts_with("00000000010000000000000000001000"));
    }

    #[test]
    fn out_of_range_immediates_fail() {
        let src = ".data\nnums: .word 7\n.text\nlw $t0, nums";
        assert_eq!(
            encode(src, Flavor::MipsAsm),
            Err(EncodeError::ImmediateRange {
                value: 0x1001_0000,
                bits: 16,
                line: 4
            })
        );

        // A label 2^18 bytes away is past the reach of a branch
        let mut src = String::from("BEQ $t0, $t1, far\n");
        src.push_str(&"ADD $t0, $t0, $t0\n".repeat(1 << 16));
        src.push_str("far: SYSCALL");
        assert!(matches!(
            encode(&src, Flavor::MipsAsm),
            Err(EncodeError::ImmediateRange { bits: 16, line: 1, .. })
        ));

        assert!(encode("ORI $t0, $t0, 0xFFFF", Flavor::MipsAsm).is_ok());
        let bits = encode("LUI $t0, 0x1001\nLW $t1, 0($t0)", Flavor::MipsAsm).unwrap();
        assert!(bits.lines().next().unwrap().ends_with("001111 00000 01000 0001000000000001"));
    }

    #[test]
    fn coprocessor_formats() {
        let src = "ADD.S $f10, $f8, $f9\nDIV.S $f2, $f4, $f6\nLWC1 $f8, 4($gp)\nSWC1 $f8, 0($gp)";
        let bits = encode(src, Flavor::MipsAsm).unwrap();
        let lines: Vec<&str> = bits.lines().map(|line| &line[33..]).collect();
        assert_eq!(lines[0], "010001 10000 01001 01000 01010 000000");
        assert_eq!(lines[1], "010001 10000 00110 00100 00010 000011");
        assert_eq!(lines[2], "110001 11100 01000 0000000000000100");
        assert_eq!(lines[3], "111001 11100 01000 0000000000000000");
    }

    #[test]
    fn idempotent() {
        let flavor = Flavor::MipsAsm;
        let mut state = MachineState::new(flavor);
        let air = AsmParser::new("loop: ADD $t2, $t0, $t1\nJ loop", flavor)
            .unwrap()
            .parse(&mut state)
            .unwrap();
        for stmt in &air {
            assert_eq!(encode_stmt(stmt, &state), encode_stmt(stmt, &state));
        }
    }

    #[test]
    fn unresolved_label_fails() {
        let flavor = Flavor::MipsAsm;
        let mut state = MachineState::new(flavor);
        let air = AsmParser::new("end: J end", flavor)
            .unwrap()
            .parse(&mut state)
            .unwrap();
        state.labels.clear();
        assert_eq!(
            encode_program(&air, &state),
            Err(EncodeError::UnresolvedLabel {
                label: "end".into(),
                line: 1
            })
        );
    }

    #[test]
    fn intel_has_no_encoding() {
        assert!(matches!(
            encode("mov eax, 1", Flavor::Intel),
            Err(EncodeError::Unsupported { mnemonic: "MOV", .. })
        ));
    }
}
