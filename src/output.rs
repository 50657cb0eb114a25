use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::state::{Cell, MachineState, STACK_BOTTOM};
use crate::symbol::{Flag, Location};

/// Print a trace line to stderr when `POLYASM_TRACE=1`.
#[macro_export]
macro_rules! tprintln {
    ( $fmt:literal $($tt:tt)* ) => {{
        if $crate::env::is_trace_enabled() {
            let s = format!(
                concat!($fmt, "\n")
                $($tt)*
            );
            $crate::output::Output::Trace.print_str(&s);
        }
    }};
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Output {
    Normal,
    Trace,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }

    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    pub fn print_str(&self, string: &str) {
        match (self, Self::is_minimal()) {
            (Self::Normal, false) => print!("{}", string),
            (Self::Normal, true) => print_colorless(string),
            (Self::Trace, false) => eprint!("{}", ColoredString::from(string).blue()),
            (Self::Trace, true) => eprint_colorless(string),
        }
    }

    /// Registers, flags and every written memory and stack cell. Changed locations are bold.
    pub fn print_state(&self, state: &MachineState) {
        let changed = |loc: Location| state.changes.contains(&loc);
        let value = |v: i64| state.base.format(v);
        // Only floating-point registers in use are shown
        let floats = state
            .float_registers
            .iter()
            .filter(|&(name, v)| *v != 0.0 || changed(Location::Register(*name)));

        if Self::is_minimal() {
            for (name, v) in &state.registers {
                self.print_str(&format!("{} {}\n", name, value(*v)));
            }
            for (name, v) in floats {
                self.print_str(&format!("{} {}\n", name, v));
            }
            for (flag, v) in &state.flags {
                self.print_str(&format!("{} {}\n", flag, v));
            }
            for (addr, v) in &state.memory {
                self.print_str(&format!("{:X} {}\n", addr, value(*v)));
            }
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────┐\x1b[0m\n");
        for (name, v) in &state.registers {
            let cell = format!("{:>22}", value(*v));
            let cell = if changed(Location::Register(*name)) {
                cell.bold().to_string()
            } else {
                cell
            };
            self.print_str(&format!(
                "\x1b[2m│\x1b[0m \x1b[1m{:<4}\x1b[0m {} \x1b[2m│\x1b[0m\n",
                name, cell
            ));
        }
        for (name, v) in floats {
            let cell = format!("{:>22}", v);
            let cell = if changed(Location::Register(*name)) {
                cell.bold().to_string()
            } else {
                cell
            };
            self.print_str(&format!(
                "\x1b[2m│\x1b[0m \x1b[1m{:<4}\x1b[0m {} \x1b[2m│\x1b[0m\n",
                name, cell
            ));
        }
        self.print_str("\x1b[2m├──────────────────────────────┤\x1b[0m\n");
        let flags: Vec<String> = Flag::ALL
            .iter()
            .map(|flag| {
                let text = format!("{} {}", flag, state.flag(*flag));
                if changed(Location::Flag(*flag)) {
                    text.bold().to_string()
                } else {
                    text
                }
            })
            .collect();
        self.print_str(&format!(
            "\x1b[2m│\x1b[0m {:<28} \x1b[2m│\x1b[0m\n",
            flags.join("  ")
        ));
        self.print_str("\x1b[2m└──────────────────────────────┘\x1b[0m\n");

        for (addr, v) in &state.memory {
            let line = format!("  [{:08X}] {}", addr, value(*v));
            if changed(Location::Memory(*addr)) {
                self.print_str(&format!("{}\n", line.bold()));
            } else {
                self.print_str(&format!("{}\n", line));
            }
        }
        for (slot, cell) in state.stack.iter().enumerate().rev() {
            if let Cell::Value(v) = cell {
                let addr = STACK_BOTTOM + slot as u32;
                let line = format!("  stack[{:03X}] {}", addr, value(*v));
                if changed(Location::Stack(addr)) {
                    self.print_str(&format!("{}\n", line.bold()));
                } else {
                    self.print_str(&format!("{}\n", line));
                }
            }
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn print_colorless(string: &str) {
    print!("{}", Decolored::new(string).collect::<String>());
}

fn eprint_colorless(string: &str) {
    eprint!("{}", Decolored::new(string).collect::<String>());
}
