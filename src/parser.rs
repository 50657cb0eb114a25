use std::borrow::Cow;

use miette::Result;

use crate::air::{Air, DataDecl, Stmt};
use crate::error;
use crate::flavor::{AddressPrefix, Flavor, FlavorSpec};
use crate::lexer::{tokenize, Line, Literal, Token, TokenKind};
use crate::operand::{Bits, Immediate, Kinds, MemRef, Operand, Slot};
use crate::ops::Opcode;
use crate::span::Span;
use crate::state::MachineState;
use crate::symbol::{FxMap, Label, Register};

fn unescape(s: &str) -> Cow<str> {
    if !s.contains('\\') {
        return Cow::Borrowed(s);
    }
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(c) => {
                result.push('\\');
                result.push(c);
            }
            // Trailing backslash; include it as is
            None => result.push('\\'),
        }
    }
    Cow::Owned(result)
}

/// Data directive kinds, dotted (`.WORD`) or Intel style (`DW`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DataKind {
    Byte,
    Word,
    /// Single precision, stored as its IEEE 754 bit pattern
    Float,
    Ascii { terminated: bool },
}

impl DataKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            ".BYTE" | "DB" => Some(DataKind::Byte),
            ".WORD" | "DW" | "DD" => Some(DataKind::Word),
            ".FLOAT" => Some(DataKind::Float),
            ".ASCII" => Some(DataKind::Ascii { terminated: false }),
            ".ASCIIZ" => Some(DataKind::Ascii { terminated: true }),
            _ => None,
        }
    }
}

/// Assembler bookkeeping directives with no effect on the program.
fn is_ignored_directive(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        ".DATA" | ".TEXT" | ".GLOBL" | ".GLOBAL" | ".SECTION" | ".ALIGN" | "SECTION" | "GLOBAL"
    )
}

/// Instruction laid out by the first pass, operands still unparsed.
struct Pending {
    addr: u32,
    op: Opcode,
    /// Index into `lines`
    line: usize,
    /// Mnemonic token index within the line
    mnemonic: usize,
}

/// Transforms token lines into AIR and installs labels into the machine state.
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    spec: &'static FlavorSpec,
    lines: Vec<Line>,
    /// Label name to absolute address, built by the first pass
    labels: FxMap<String, u32>,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str, flavor: Flavor) -> Result<Self> {
        let spec = flavor.spec();
        let lines = tokenize(src, spec)?;
        Ok(AsmParser {
            src,
            spec,
            lines,
            labels: FxMap::default(),
        })
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.as_range()]
    }

    /// Create AIR out of the token lines.
    pub fn parse(mut self, state: &mut MachineState) -> Result<Air> {
        let (start, pending, data) = self.layout()?;
        let mut air = Air::new(start, self.spec.addr_step);
        for decl in data {
            air.add_data(decl);
        }
        for item in &pending {
            let stmt = self.parse_stmt(item)?;
            air.add_stmt(stmt);
        }
        state.labels = self.labels;
        state.start_ip = start;
        Ok(air)
    }

    /// First pass: assign addresses, bind labels and collect data.
    fn layout(&mut self) -> Result<(u32, Vec<Pending>, Vec<DataDecl>)> {
        let mut start = self.spec.default_start;
        let mut code_addr = start;
        let mut data_addr = self.spec.data_base;
        let mut pending: Vec<Pending> = Vec::new();
        let mut data = Vec::new();
        let mut unbound: Vec<Token> = Vec::new();

        for (line_idx, line) in self.lines.iter().enumerate() {
            let toks = &line.tokens;
            let mut idx = 0;

            // Leading instruction address
            let mut address = None;
            if let TokenKind::Lit(Literal { value, .. }) = toks[0].kind {
                if self.spec.address_prefix == AddressPrefix::Forbidden {
                    return Err(error::parse_forbidden_address(toks[0].span, self.src));
                }
                address = Some((value as u32, toks[0].span));
                idx += 1;
            }

            while idx < toks.len() && toks[idx].kind == TokenKind::Label {
                unbound.push(toks[idx]);
                idx += 1;
            }
            // NASM-style data label without a colon: `count DB 3`
            if let [name, dir, ..] = &toks[idx..] {
                if name.kind == TokenKind::Ident
                    && dir.kind == TokenKind::Ident
                    && DataKind::from_name(self.get_span(dir.span)).is_some()
                {
                    unbound.push(*name);
                    idx += 1;
                }
            }
            let Some(head) = toks.get(idx) else {
                continue;
            };
            let name = self.get_span(head.span);

            if matches!(head.kind, TokenKind::Dir | TokenKind::Ident) {
                if is_ignored_directive(name) {
                    continue;
                }
                if let Some(kind) = DataKind::from_name(name) {
                    let (values, width) = self.data_values(kind, head, &toks[idx + 1..])?;
                    for label in unbound.drain(..) {
                        bind(&mut self.labels, self.src, label, data_addr)?;
                    }
                    let span = toks[idx..].iter().fold(head.span, |span, tok| span.join(tok.span));
                    let next = (width as u64)
                        .checked_mul(values.len() as u64)
                        .and_then(|size| u32::try_from(size).ok())
                        .and_then(|size| data_addr.checked_add(size))
                        .ok_or_else(|| error::parse_address_range(span, self.src))?;
                    data.push(DataDecl {
                        addr: data_addr,
                        values,
                        width,
                        line: line.number,
                    });
                    data_addr = next;
                    continue;
                }
            }

            match head.kind {
                TokenKind::Dir => {
                    return Err(error::parse_bad_directive(
                        head.span,
                        self.src,
                        "unknown directive",
                    ))
                }
                TokenKind::Ident => {
                    let op = Opcode::lookup(self.spec, name)
                        .ok_or_else(|| error::parse_unknown_mnemonic(head.span, self.src))?;
                    match address {
                        // The first explicit address fixes the program start
                        Some((addr, _)) if pending.is_empty() => {
                            start = addr;
                            code_addr = addr;
                        }
                        Some((addr, span)) if addr != code_addr => {
                            return Err(error::parse_wrong_address(span, self.src, code_addr))
                        }
                        Some(_) => (),
                        None if self.spec.address_prefix == AddressPrefix::Required => {
                            return Err(error::parse_missing_address(head.span, self.src))
                        }
                        None => (),
                    }
                    for label in unbound.drain(..) {
                        bind(&mut self.labels, self.src, label, code_addr)?;
                    }
                    pending.push(Pending {
                        addr: code_addr,
                        op,
                        line: line_idx,
                        mnemonic: idx,
                    });
                    code_addr = code_addr
                        .checked_add(self.spec.addr_step)
                        .ok_or_else(|| error::parse_address_range(head.span, self.src))?;
                }
                _ => return Err(error::parse_unexpected_token(head.span, self.src)),
            }
        }
        // Trailing labels mark the end of the program
        for label in unbound {
            bind(&mut self.labels, self.src, label, code_addr)?;
        }
        Ok((start, pending, data))
    }

    fn data_values(&self, kind: DataKind, head: &Token, args: &[Token]) -> Result<(Vec<i64>, u32)> {
        let span = args.iter().fold(head.span, |span, tok| span.join(tok.span));
        let mut values = Vec::new();
        match kind {
            DataKind::Ascii { terminated } => {
                let [tok] = args else {
                    return Err(error::parse_bad_directive(span, self.src, "expected one string"));
                };
                if tok.kind != TokenKind::Str {
                    return Err(error::parse_bad_directive(span, self.src, "expected a string"));
                }
                values.extend(self.string_bytes(tok));
                if terminated {
                    values.push(0);
                }
                Ok((values, 1))
            }
            DataKind::Float => {
                for (i, tok) in args.iter().enumerate() {
                    let value = match (i % 2, tok.kind) {
                        (0, TokenKind::Lit(lit)) => lit.value as f32,
                        (0, TokenKind::Float) => self
                            .get_span(tok.span)
                            .parse::<f32>()
                            .map_err(|_| error::lex_invalid_lit(tok.span, self.src))?,
                        (1, TokenKind::Comma) => continue,
                        _ => {
                            return Err(error::parse_bad_directive(
                                span,
                                self.src,
                                "expected comma separated numbers",
                            ))
                        }
                    };
                    values.push(value.to_bits() as i64);
                }
                if values.is_empty() || args.len() % 2 == 0 {
                    return Err(error::parse_bad_directive(span, self.src, "expected a value"));
                }
                Ok((values, self.spec.word_size))
            }
            DataKind::Byte | DataKind::Word => {
                let (bits, width) = match kind {
                    DataKind::Byte => (Bits::Either(8), 1),
                    _ => (Bits::Either(32), self.spec.word_size),
                };
                for (i, tok) in args.iter().enumerate() {
                    match (i % 2, tok.kind) {
                        (0, TokenKind::Lit(lit)) if bits.fits(lit.value) => values.push(lit.value),
                        (0, TokenKind::Lit(lit)) => {
                            return Err(error::parse_imm_range(tok.span, self.src, lit.value, bits))
                        }
                        (0, TokenKind::Str) if kind == DataKind::Byte => {
                            values.extend(self.string_bytes(tok))
                        }
                        (1, TokenKind::Comma) => (),
                        _ => {
                            return Err(error::parse_bad_directive(
                                span,
                                self.src,
                                "expected comma separated numbers",
                            ))
                        }
                    }
                }
                if values.is_empty() || args.len() % 2 == 0 {
                    return Err(error::parse_bad_directive(span, self.src, "expected a value"));
                }
                Ok((values, width))
            }
        }
    }

    fn string_bytes(&self, tok: &Token) -> Vec<i64> {
        let raw = self.get_span(tok.span);
        let inner = &raw[1..raw.len() - 1];
        unescape(inner).chars().map(|c| c as i64).collect()
    }

    /// Second pass: build and check the operands of one instruction.
    fn parse_stmt(&self, item: &Pending) -> Result<Stmt> {
        let line = &self.lines[item.line];
        let mnemonic = line.tokens[item.mnemonic];
        let args = &line.tokens[item.mnemonic + 1..];
        let mut groups = split_operands(args);
        if self.spec.reversed_operands {
            groups.reverse();
        }
        let name = item.op.name();
        let signatures = item.op.signatures();
        let line_span = args.iter().fold(mnemonic.span, |span, tok| span.join(tok.span));

        let Some(signature) = signatures.iter().find(|sig| sig.len() == groups.len()) else {
            let expected = signatures
                .iter()
                .map(|sig| sig.len().to_string())
                .collect::<Vec<_>>()
                .join(" or ");
            return Err(error::parse_operand_count(
                line_span,
                self.src,
                name,
                &expected,
                groups.len(),
            ));
        };

        if let Some(empty) = groups.iter().position(|group| group.is_empty()) {
            let at = args
                .iter()
                .filter(|tok| tok.kind == TokenKind::Comma)
                .nth(empty.saturating_sub(1))
                .map_or(line_span, |tok| tok.span);
            return Err(error::parse_malformed_operand(at, self.src));
        }

        let operands = groups
            .iter()
            .zip(signature.iter())
            .map(|(group, slot)| self.operand(group, *slot, name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Stmt {
            addr: item.addr,
            op: item.op,
            operands,
            line: line.number,
            source: self.get_span(line_span).to_string(),
        })
    }

    /// Parse one comma separated operand against the slot it fills.
    fn operand(&self, group: &[Token], slot: Slot, mnemonic: &str) -> Result<Operand> {
        let span = group[0].span.join(group[group.len() - 1].span);
        let operand = match group {
            [tok] => match tok.kind {
                TokenKind::Reg(reg) => Operand::Reg(reg),
                TokenKind::Lit(lit) if lit.immediate || !slot.kinds.contains(Kinds::MEM) => {
                    Operand::Imm(Immediate {
                        value: lit.value,
                        radix: lit.radix,
                    })
                }
                // Unprefixed AT&T numbers are absolute addresses
                TokenKind::Lit(lit) => Operand::Mem(MemRef::absolute(lit.value)),
                TokenKind::Ident => self.symbol(*tok, slot)?,
                _ => return Err(error::parse_malformed_operand(span, self.src)),
            },
            _ if group[0].kind == TokenKind::LBracket => self.bracket_mem(group, span)?,
            _ if group.iter().any(|tok| tok.kind == TokenKind::LParen) => {
                self.paren_mem(group, span)?
            }
            _ => return Err(error::parse_malformed_operand(span, self.src)),
        };

        if !slot.kinds.contains(operand.kind()) {
            return Err(error::parse_operand_kind(
                span,
                self.src,
                mnemonic,
                &slot.kinds.to_string(),
            ));
        }
        if let Operand::Imm(imm) = &operand {
            if !slot.imm.fits(imm.value) {
                return Err(error::parse_imm_range(span, self.src, imm.value, slot.imm));
            }
        }
        Ok(operand)
    }

    /// Bare identifier: a jump target, or the memory cell or address it labels.
    fn symbol(&self, tok: Token, slot: Slot) -> Result<Operand> {
        let name = self.get_span(tok.span);
        if slot.kinds.contains(Kinds::LBL) {
            return Ok(Operand::Label(Label::new(name)));
        }
        let addr = self.resolve(tok)?;
        if slot.kinds.contains(Kinds::MEM) {
            Ok(Operand::Mem(MemRef::absolute(addr)))
        } else {
            Ok(Operand::imm(addr))
        }
    }

    fn resolve(&self, tok: Token) -> Result<i64> {
        self.labels
            .get(self.get_span(tok.span))
            .map(|addr| *addr as i64)
            .ok_or_else(|| error::parse_undefined_label(tok.span, self.src))
    }

    /// `[base + index + disp]`, terms in any order, `-` allowed before numbers.
    fn bracket_mem(&self, group: &[Token], span: Span) -> Result<Operand> {
        let malformed = || error::parse_malformed_operand(span, self.src);
        let inner = match group {
            [open, inner @ .., close]
                if open.kind == TokenKind::LBracket && close.kind == TokenKind::RBracket =>
            {
                inner
            }
            _ => return Err(malformed()),
        };
        let mut mem = MemRef::default();
        let mut sign = 1;
        let mut expect_term = true;
        for tok in inner {
            match (expect_term, tok.kind) {
                (true, TokenKind::Reg(reg)) if sign == 1 && !reg.is_float() => {
                    if mem.base.is_none() {
                        mem.base = Some(reg);
                    } else if mem.index.is_none() {
                        mem.index = Some(reg);
                    } else {
                        return Err(malformed());
                    }
                }
                (true, TokenKind::Lit(lit)) => mem.disp += sign * lit.value,
                (true, TokenKind::Ident) => mem.disp += sign * self.resolve(*tok)?,
                (false, TokenKind::Plus) => sign = 1,
                (false, TokenKind::Minus) => sign = -1,
                _ => return Err(malformed()),
            }
            expect_term = !expect_term;
        }
        if expect_term {
            return Err(malformed());
        }
        Ok(Operand::Mem(mem))
    }

    /// `disp(base)` or `disp(base, index)`, where `disp` may be a number or a label.
    fn paren_mem(&self, group: &[Token], span: Span) -> Result<Operand> {
        let malformed = || error::parse_malformed_operand(span, self.src);
        let open = group
            .iter()
            .position(|tok| tok.kind == TokenKind::LParen)
            .ok_or_else(malformed)?;
        let disp = match &group[..open] {
            [] => 0,
            [tok] => match tok.kind {
                TokenKind::Lit(lit) => lit.value,
                TokenKind::Ident => self.resolve(*tok)?,
                _ => return Err(malformed()),
            },
            _ => return Err(malformed()),
        };
        let mut mem = MemRef::absolute(disp);
        match &group[open + 1..] {
            [base, close] if close.kind == TokenKind::RParen => {
                mem.base = Some(register(base).ok_or_else(malformed)?);
            }
            [base, comma, index, close]
                if comma.kind == TokenKind::Comma && close.kind == TokenKind::RParen =>
            {
                mem.base = Some(register(base).ok_or_else(malformed)?);
                mem.index = Some(register(index).ok_or_else(malformed)?);
            }
            _ => return Err(malformed()),
        }
        Ok(Operand::Mem(mem))
    }
}

/// Integer register usable as an address base or index.
fn register(tok: &Token) -> Option<Register> {
    match tok.kind {
        TokenKind::Reg(reg) if !reg.is_float() => Some(reg),
        _ => None,
    }
}

fn bind(labels: &mut FxMap<String, u32>, src: &str, label: Token, addr: u32) -> Result<()> {
    let name = &src[label.span.as_range()];
    if labels.contains_key(name) {
        return Err(error::parse_duplicate_label(label.span, src));
    }
    labels.insert(name.to_string(), addr);
    Ok(())
}

/// Split operand tokens on commas outside brackets and parentheses.
fn split_operands(toks: &[Token]) -> Vec<&[Token]> {
    if toks.is_empty() {
        return Vec::new();
    }
    let mut groups = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, tok) in toks.iter().enumerate() {
        match tok.kind {
            TokenKind::LBracket | TokenKind::LParen => depth += 1,
            TokenKind::RBracket | TokenKind::RParen => depth -= 1,
            TokenKind::Comma if depth == 0 => {
                groups.push(&toks[start..i]);
                start = i + 1;
            }
            _ => (),
        }
    }
    groups.push(&toks[start..]);
    groups
}
