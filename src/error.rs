use std::fmt;

use miette::{miette, LabeledSpan, Report, Severity};

use crate::span::Span;

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::unknown",
        help = "only mnemonics, registers, numbers, labels and punctuation may appear in source",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn lex_invalid_lit(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::bad_lit",
        help = "use decimal digits, or a 0x prefix for hexadecimal",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an invalid numeric literal `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn lex_unclosed_str(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::str_lit",
        help = "make sure to close string literals with a \" character.",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered an unterminated string literal `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn lex_unknown_register(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "lex::register",
        help = "check the register table for this flavor",
        labels = vec![LabeledSpan::at(span, "unknown register")],
        "Unknown register `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

// Parser errors

pub fn parse_unexpected_token(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::unexpected_token",
        help = "lines should start with a label, an instruction or a directive",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Unexpected token `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_unknown_mnemonic(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::mnemonic",
        help = "check the list of instructions available for this flavor",
        labels = vec![LabeledSpan::at(span, "unknown instruction")],
        "Unknown instruction `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::duplicate_label",
        help = "labels may only be defined once per program",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_undefined_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::undefined_label",
        help = "memory operands must name a label defined somewhere in the program",
        labels = vec![LabeledSpan::at(span, "undefined label")],
        "Undefined label `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_operand_count(
    span: Span,
    src: &str,
    mnemonic: &str,
    expected: &str,
    found: usize,
) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand_count",
        help = "check the number of operands for this instruction",
        labels = vec![LabeledSpan::at(span, "wrong number of operands")],
        "Instruction {mnemonic} expects {expected} operand(s), found {found}",
    )
    .with_source_code(src.to_string())
}

pub fn parse_operand_kind(span: Span, src: &str, mnemonic: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand_kind",
        help = "check the type of operands allowed for this instruction",
        labels = vec![LabeledSpan::at(span, "unexpected operand")],
        "Instruction {mnemonic} expects {expected}, found `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_imm_range(span: Span, src: &str, value: i64, bits: impl fmt::Display) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::imm_range",
        help = format!("this operand expects literals that can be contained in {bits} bits"),
        labels = vec![LabeledSpan::at(span, "out-of-range literal")],
        "Found numeric literal {value} of incorrect size",
    )
    .with_source_code(src.to_string())
}

pub fn parse_malformed_operand(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::operand",
        help = "operands are registers, immediates, labels or memory references",
        labels = vec![LabeledSpan::at(span, "malformed operand")],
        "Malformed operand `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_bad_directive(span: Span, src: &str, reason: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::directive",
        help = ".BYTE, .WORD and .FLOAT take numbers, .ASCIIZ takes a string literal",
        labels = vec![LabeledSpan::at(span, "invalid directive")],
        "Malformed data directive `{}`: {reason}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_missing_address(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::address",
        help = "machine-readable MIPS requires every instruction to start with its hex address",
        labels = vec![LabeledSpan::at(span, "missing address")],
        "Missing instruction address before `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_wrong_address(span: Span, src: &str, expected: u32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::address",
        help = "instruction addresses must increase by 4 from the first instruction",
        labels = vec![LabeledSpan::at(span, "unexpected address")],
        "Instruction address `{}` does not match expected address {expected:X}",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_address_range(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::address_range",
        help = "the program and its data must end below address FFFFFFFF",
        labels = vec![LabeledSpan::at(span, "address out of range")],
        "Address out of range at `{}`",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

pub fn parse_forbidden_address(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "parse::address",
        help = "lines should start with a label, an instruction or a directive",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Unexpected number `{}` at start of line",
        &src[span.as_range()]
    )
    .with_source_code(src.to_string())
}

/// Error raised while executing a single instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunError {
    /// Operand of the wrong kind, or an unsupported service request.
    InvalidArgument(String),
    /// Immediate outside of the range the instruction can use.
    InvalidConstantValue(i64),
    DivisionZero,
    /// Computed jump target outside of the program.
    OutOfBounds(i64),
    /// Instruction pointer does not point at an instruction.
    InvalidInstruction(String),
    InvalidLabel(String),
    StackOverflow,
    StackUnderflow,
}

impl std::error::Error for RunError {}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(arg) => write!(f, "Invalid argument: {}", arg),
            Self::InvalidConstantValue(value) => write!(f, "Invalid constant value: {}", value),
            Self::DivisionZero => write!(f, "Division by zero"),
            Self::OutOfBounds(target) => write!(f, "Jump target out of bounds: {}", target),
            Self::InvalidInstruction(reason) => write!(f, "Invalid instruction: {}", reason),
            Self::InvalidLabel(label) => write!(f, "Invalid label: {}", label),
            Self::StackOverflow => write!(f, "Stack overflow: no free stack cells"),
            Self::StackUnderflow => write!(f, "Stack underflow: pop from empty stack"),
        }
    }
}

/// Error raised while producing the MIPS binary encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    UnresolvedLabel { label: String, line: usize },
    /// Only MIPS instructions have a binary form
    Unsupported { mnemonic: &'static str, line: usize },
    /// Immediate, displacement or offset wider than its field
    ImmediateRange { value: i64, bits: u8, line: usize },
}

impl std::error::Error for EncodeError {}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel { label, line } => {
                write!(f, "Cannot encode line {}: undefined label `{}`", line, label)
            }
            Self::Unsupported { mnemonic, line } => {
                write!(f, "Cannot encode line {}: `{}` has no MIPS encoding", line, mnemonic)
            }
            Self::ImmediateRange { value, bits, line } => write!(
                f,
                "Cannot encode line {}: {} does not fit in {} bits",
                line, value, bits
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Idx;

    #[test]
    fn report_names_offending_text() {
        let src = "mov eax, @";
        let report = lex_unknown(Span::new(Idx(9), 1), src);
        assert_eq!(report.to_string(), "Encountered an unknown token `@`");
        assert_eq!(report.code().unwrap().to_string(), "lex::unknown");
    }

    #[test]
    fn run_error_messages() {
        assert_eq!(RunError::InvalidLabel("loop".into()).to_string(), "Invalid label: loop");
        assert_eq!(RunError::OutOfBounds(-4).to_string(), "Jump target out of bounds: -4");
        assert_eq!(RunError::DivisionZero.to_string(), "Division by zero");
    }
}
