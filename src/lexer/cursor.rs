// Heavily inspired by the cursor in `rustc_lexer` and adapted to suit the project.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

use crate::span::{Idx, Span};

/// Peekable iterator over the characters of one source line.
pub struct Cursor<'a> {
    /// Remaining characters of the line
    chars: Chars<'a>,
    /// The whole line
    input: &'a str,
    /// Offset of the line from the start of the source
    base: usize,
    /// Offset of the current token from the start of the line
    token_start: usize,
}

pub(crate) const EOF_CHAR: char = '\0';

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str, base: usize) -> Cursor<'a> {
        Cursor {
            chars: input.chars(),
            input,
            base,
            token_start: 0,
        }
    }

    /// Peek the next character without consuming it.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Advance by one character.
    pub fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.is_eof() {
            self.bump();
        }
    }

    /// Offset of the cursor from the start of the line.
    fn pos(&self) -> usize {
        self.input.len() - self.chars.as_str().len()
    }

    /// Length consumed since the last `reset_pos`.
    pub fn pos_in_token(&self) -> usize {
        self.pos() - self.token_start
    }

    pub fn reset_pos(&mut self) {
        self.token_start = self.pos();
    }

    /// Span of the token consumed since the last `reset_pos`.
    pub fn token_span(&self) -> Span {
        Span::new(Idx(self.base + self.token_start), self.pos_in_token())
    }

    pub fn token_text(&self) -> &'a str {
        &self.input[self.token_start..self.pos()]
    }
}
