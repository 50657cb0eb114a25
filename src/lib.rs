// Parsing
mod lexer;
mod parser;
pub use parser::AsmParser;
mod air;
pub use air::{Air, DataDecl, Stmt};
pub mod flavor;
pub use flavor::Flavor;
pub mod operand;
pub mod ops;
mod span;
pub mod symbol;

// Running
pub mod state;
pub use state::MachineState;
pub mod runtime;
pub use runtime::{Exit, Runner};
mod assemble;
pub use assemble::{assemble, Outcome, END_OF_CODE, EXITING, NO_SOURCE};
pub mod encode;
pub mod output;

mod error;
pub use error::{EncodeError, RunError};
pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
