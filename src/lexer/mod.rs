use miette::Result;

use crate::error;
use crate::flavor::{AddressPrefix, FlavorSpec};
use crate::lexer::cursor::Cursor;
use crate::span::Span;
use crate::symbol::{Radix, Register};

pub mod cursor;

/// Numeric literal with the base it was written in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Literal {
    pub value: i64,
    pub radix: Radix,
    /// False for AT&T numbers written without `$`, which denote memory addresses.
    pub immediate: bool,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Mnemonic, label reference or bare directive name such as `DB`
    Ident,
    /// Dot-prefixed directive such as `.WORD`
    Dir,
    /// Label definition, span excludes the colon
    Label,
    Reg(Register),
    Lit(Literal),
    /// Decimal number with a fraction, parsed from its span where needed
    Float,
    /// String literal, span includes the quotes
    Str,
    Comma,
    Plus,
    Minus,
    LBracket,
    RBracket,
    LParen,
    RParen,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Tokens of one non-empty source line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Line {
    /// One-based line number
    pub number: usize,
    pub tokens: Vec<Token>,
}

/// Split `src` into per-line token lists. Blank and comment-only lines are dropped.
pub fn tokenize(src: &str, spec: &FlavorSpec) -> Result<Vec<Line>> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for (i, raw) in src.split('\n').enumerate() {
        let tokens = Lexer::new(raw, offset, src, spec).line_tokens()?;
        offset += raw.len() + 1;
        if tokens.is_empty() {
            continue;
        }
        lines.push(Line {
            number: i + 1,
            tokens,
        });
    }
    Ok(lines)
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r')
}

pub(crate) fn is_id_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

pub(crate) fn is_id(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.')
}

struct Lexer<'a> {
    cur: Cursor<'a>,
    src: &'a str,
    spec: &'a FlavorSpec,
    /// Kind of the previous token on this line
    prev: Option<TokenKind>,
    in_bracket: bool,
}

impl<'a> Lexer<'a> {
    fn new(line: &'a str, offset: usize, src: &'a str, spec: &'a FlavorSpec) -> Self {
        Lexer {
            cur: Cursor::new(line, offset),
            src,
            spec,
            prev: None,
            in_bracket: false,
        }
    }

    fn line_tokens(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.advance_token()? {
            match tok.kind {
                TokenKind::LBracket => self.in_bracket = true,
                TokenKind::RBracket => self.in_bracket = false,
                _ => (),
            }
            self.prev = Some(tok.kind);
            tokens.push(tok);
        }
        Ok(tokens)
    }

    /// A `-` directly after a value is subtraction, not a sign. Outside brackets
    /// an identifier is a mnemonic, as in `push -1`.
    fn after_value(&self) -> bool {
        match self.prev {
            Some(TokenKind::Reg(_) | TokenKind::Lit(_) | TokenKind::RBracket | TokenKind::RParen) => {
                true
            }
            Some(TokenKind::Ident) => self.in_bracket,
            _ => false,
        }
    }

    fn advance_token(&mut self) -> Result<Option<Token>> {
        self.cur.take_while(is_whitespace);
        self.cur.reset_pos();
        let first_char = match self.cur.bump() {
            Some(c) if c == self.spec.comment => return Ok(None),
            Some(c) => c,
            None => return Ok(None),
        };
        let kind = match first_char {
            ',' => TokenKind::Comma,
            '+' => TokenKind::Plus,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '-' if self.cur.first().is_ascii_digit() && !self.after_value() => {
                self.number(self.spec.imm_prefix.is_none())?
            }
            '-' => TokenKind::Minus,
            c if Some(c) == self.spec.reg_prefix => self.prefixed_register()?,
            c if Some(c) == self.spec.imm_prefix => {
                if self.cur.first() == '-' {
                    self.cur.bump();
                }
                if !self.cur.first().is_ascii_digit() {
                    self.cur.take_while(is_id);
                    return Err(error::lex_invalid_lit(self.cur.token_span(), self.src));
                }
                self.number(true)?
            }
            c if c.is_ascii_digit() => {
                if self.prev.is_none() && self.spec.address_prefix != AddressPrefix::Forbidden {
                    self.address()?
                } else {
                    self.number(self.spec.imm_prefix.is_none())?
                }
            }
            '.' if is_id_start(self.cur.first()) => {
                self.cur.take_while(is_id);
                TokenKind::Dir
            }
            c if is_id_start(c) => {
                self.cur.take_while(is_id);
                if self.cur.first() == ':' {
                    // Label span excludes the colon
                    let span = self.cur.token_span();
                    self.cur.bump();
                    return Ok(Some(Token {
                        kind: TokenKind::Label,
                        span,
                    }));
                }
                match self.spec.bare_register(self.cur.token_text()) {
                    Some(reg) => TokenKind::Reg(reg),
                    None => TokenKind::Ident,
                }
            }
            '"' => self.string()?,
            _ => return Err(error::lex_unknown(self.cur.token_span(), self.src)),
        };
        Ok(Some(Token {
            kind,
            span: self.cur.token_span(),
        }))
    }

    /// Numeric literal. Any sign or immediate prefix has been consumed.
    fn number(&mut self, immediate: bool) -> Result<TokenKind> {
        self.cur.take_while(is_id);
        let text = self.cur.token_text();
        let unprefixed = text.trim_start_matches(|c| Some(c) == self.spec.imm_prefix);
        let (negative, digits) = match unprefixed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, unprefixed),
        };
        let hex = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"));
        if hex.is_none() && digits.contains('.') {
            return match digits.parse::<f64>() {
                Ok(_) => Ok(TokenKind::Float),
                Err(_) => Err(error::lex_invalid_lit(self.cur.token_span(), self.src)),
            };
        }
        let (radix, parsed) = match hex {
            Some(hex) => (Radix::Hex, i64::from_str_radix(hex, 16)),
            None => (Radix::Dec, digits.parse::<i64>()),
        };
        let value = parsed.map_err(|_| error::lex_invalid_lit(self.cur.token_span(), self.src))?;
        Ok(TokenKind::Lit(Literal {
            value: if negative { -value } else { value },
            radix,
            immediate,
        }))
    }

    /// Hex instruction address at the start of a MIPS line.
    fn address(&mut self) -> Result<TokenKind> {
        self.cur.take_while(is_id);
        let text = self.cur.token_text();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        let value = u32::from_str_radix(digits, 16)
            .map_err(|_| error::lex_invalid_lit(self.cur.token_span(), self.src))?;
        Ok(TokenKind::Lit(Literal {
            value: value as i64,
            radix: Radix::Hex,
            immediate: false,
        }))
    }

    fn prefixed_register(&mut self) -> Result<TokenKind> {
        self.cur.take_while(is_id);
        let name = &self.cur.token_text()[1..];
        match self.spec.prefixed_register(name) {
            Some(reg) => Ok(TokenKind::Reg(reg)),
            None => Err(error::lex_unknown_register(self.cur.token_span(), self.src)),
        }
    }

    /// String literal. Escapes are kept verbatim and resolved by the parser.
    fn string(&mut self) -> Result<TokenKind> {
        loop {
            match self.cur.bump() {
                Some('"') => return Ok(TokenKind::Str),
                Some('\\') => {
                    self.cur.bump();
                }
                Some(_) => (),
                None => return Err(error::lex_unclosed_str(self.cur.token_span(), self.src)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Flavor;

    fn kinds(src: &str, flavor: Flavor) -> Vec<TokenKind> {
        tokenize(src, flavor.spec())
            .unwrap()
            .into_iter()
            .flat_map(|line| line.tokens)
            .map(|tok| tok.kind)
            .collect()
    }

    fn lit(value: i64, radix: Radix, immediate: bool) -> TokenKind {
        TokenKind::Lit(Literal {
            value,
            radix,
            immediate,
        })
    }

    #[test]
    fn intel_instruction() {
        let spec = Flavor::Intel.spec();
        let eax = spec.register("EAX").unwrap();
        assert_eq!(
            kinds("mov eax, 0x1F ; load", Flavor::Intel),
            vec![
                TokenKind::Ident,
                TokenKind::Reg(eax),
                TokenKind::Comma,
                lit(31, Radix::Hex, true),
            ]
        );
    }

    #[test]
    fn literal_radix() {
        assert_eq!(kinds("10", Flavor::Intel), vec![lit(10, Radix::Dec, true)]);
        assert_eq!(kinds("0xff", Flavor::Intel), vec![lit(255, Radix::Hex, true)]);
        assert_eq!(kinds("-7", Flavor::Intel), vec![lit(-7, Radix::Dec, true)]);
    }

    #[test]
    fn fractions_are_floats() {
        assert_eq!(
            kinds("x: .float 12.5, -0.25", Flavor::MipsAsm),
            vec![
                TokenKind::Label,
                TokenKind::Dir,
                TokenKind::Float,
                TokenKind::Comma,
                TokenKind::Float,
            ]
        );
        assert!(tokenize(".float 1.2.3", Flavor::MipsAsm.spec()).is_err());
        // Hex digits never form a fraction
        assert!(tokenize("mov eax, 0x1.8", Flavor::Intel.spec()).is_err());
    }

    #[test]
    fn minus_after_register_is_operator() {
        let toks = kinds("[ebx-4]", Flavor::Intel);
        assert_eq!(toks[2], TokenKind::Minus);
        assert_eq!(toks[3], lit(4, Radix::Dec, true));

        let toks = kinds("push -1", Flavor::Intel);
        assert_eq!(toks[1], lit(-1, Radix::Dec, true));
    }

    #[test]
    fn att_prefixes() {
        let spec = Flavor::Att.spec();
        let ebx = spec.register("EBX").unwrap();
        assert_eq!(
            kinds("movl $-5, 8(%ebx)", Flavor::Att),
            vec![
                TokenKind::Ident,
                lit(-5, Radix::Dec, true),
                TokenKind::Comma,
                lit(8, Radix::Dec, false),
                TokenKind::LParen,
                TokenKind::Reg(ebx),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn mips_address_and_aliases() {
        let spec = Flavor::MipsAsm.spec();
        let lines = tokenize("40000 ADD $t2, $8, R9 # sum", spec).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].tokens.len(), 7);
        let tokens = &lines[0].tokens;
        assert_eq!(tokens[0].kind, lit(0x40000, Radix::Hex, false));
        assert_eq!(tokens[2].kind, TokenKind::Reg(spec.register("R10").unwrap()));
        assert_eq!(tokens[4].kind, TokenKind::Reg(spec.register("R8").unwrap()));
        assert_eq!(tokens[6].kind, TokenKind::Reg(spec.register("R9").unwrap()));
    }

    #[test]
    fn label_definition_span() {
        let src = "\n  loop: dec ecx";
        let lines = tokenize(src, Flavor::Intel.spec()).unwrap();
        assert_eq!(lines[0].number, 2);
        let label = lines[0].tokens[0];
        assert_eq!(label.kind, TokenKind::Label);
        assert_eq!(&src[label.span.as_range()], "loop");
    }

    #[test]
    fn skips_blank_and_comment_lines() {
        let lines = tokenize("; header\n\n   \nINT 0x20\n", Flavor::Intel.spec()).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].number, 4);
    }

    #[test]
    fn comment_marker_inside_string() {
        let lines = tokenize(".ASCIIZ \"a # b\" # note", Flavor::MipsAsm.spec()).unwrap();
        assert_eq!(lines[0].tokens.len(), 2);
        assert_eq!(lines[0].tokens[1].kind, TokenKind::Str);
    }

    #[test]
    fn lex_errors() {
        let intel = Flavor::Intel.spec();
        assert!(tokenize("mov eax, @", intel).is_err());
        assert!(tokenize("mov eax, 12ab", intel).is_err());
        assert!(tokenize("db \"open", intel).is_err());
        assert!(tokenize("movl %foo, %eax", Flavor::Att.spec()).is_err());
        assert!(tokenize("ADD $t2, $t9x, $t1", Flavor::MipsAsm.spec()).is_err());
    }
}
