use crate::air::Air;
use crate::encode::encode_program;
use crate::env;
use crate::flavor::Flavor;
use crate::parser::AsmParser;
use crate::runtime::{Exit, Runner};
use crate::state::MachineState;

pub const NO_SOURCE: &str = "Must submit code to run.";
pub const EXITING: &str = "Exiting program";
pub const END_OF_CODE: &str = "Reached end of executable code.";

/// Result of one `assemble` call, in the shape a front end displays.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct Outcome {
    /// Source of the last instruction executed, or a status message
    pub last_instr: String,
    /// Empty when nothing went wrong
    pub error: String,
    /// MIPS binary encoding, one line per instruction
    pub bit_code: String,
}

/// Assemble `source` and run it to completion, or execute a single instruction when `step` is set.
///
/// Lex, parse and encode errors abort before anything executes. A runtime
/// error stops execution and keeps every change made before it.
pub fn assemble(
    source: Option<&str>,
    flavor: Flavor,
    state: &mut MachineState,
    step: bool,
) -> Outcome {
    let Some(source) = source.filter(|src| !src.trim().is_empty()) else {
        return Outcome {
            error: NO_SOURCE.to_string(),
            ..Default::default()
        };
    };

    if state.flavor != flavor {
        let base = state.base;
        *state = MachineState::new(flavor);
        state.base = base;
    }

    let air = match AsmParser::new(source, flavor).and_then(|parser| parser.parse(state)) {
        Ok(air) => air,
        Err(report) => {
            return Outcome {
                error: report.to_string(),
                ..Default::default()
            }
        }
    };

    let mut outcome = Outcome::default();
    if flavor.is_mips() {
        match encode_program(&air, state) {
            Ok(bits) => outcome.bit_code = bits,
            Err(err) => {
                outcome.error = err.to_string();
                return outcome;
            }
        }
    }

    if step {
        step_once(&air, state, &mut outcome);
    } else {
        run(&air, state, &mut outcome);
    }
    outcome
}

fn run(air: &Air, state: &mut MachineState, outcome: &mut Outcome) {
    let mut runner = Runner::new(air, state);
    let result = runner.run();
    if let Some(stmt) = runner.last() {
        outcome.last_instr = stmt.source.clone();
    }
    match result {
        Ok(Exit::Halted) => outcome.last_instr = EXITING.to_string(),
        Ok(Exit::StepLimit) => {
            outcome.error = format!(
                "Possible infinite loop detected: instructions run has exceeded {}",
                env::max_steps()
            )
        }
        Ok(Exit::Stepped | Exit::EndOfCode) => (),
        Err(err) => outcome.error = err.to_string(),
    }
}

fn step_once(air: &Air, state: &mut MachineState, outcome: &mut Outcome) {
    let start = air.start();
    if !state.data_loaded || state.ip < start {
        state.ip = start;
    }
    if air.fetch(state.ip).is_none() {
        outcome.last_instr = END_OF_CODE.to_string();
        state.ip = start;
        state.data_loaded = false;
        return;
    }

    // Data is loaded once per pass, so jumping back to the start keeps memory
    let load_data = !state.data_loaded;
    let mut runner = Runner::new(air, state);
    if load_data {
        runner.init_data();
    }
    let result = runner.step();
    if let Some(stmt) = runner.last() {
        outcome.last_instr = stmt.source.clone();
    }
    match result {
        Ok(Exit::Halted) => outcome.last_instr = EXITING.to_string(),
        Ok(_) => (),
        Err(err) => outcome.error = err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 3);
        for source in [None, Some(""), Some("  \n ")] {
            let outcome = assemble(source, Flavor::Intel, &mut state, false);
            assert_eq!(outcome.error, NO_SOURCE);
        }
        assert_eq!(state.reg("EAX"), 3);
    }

    #[test]
    fn parse_error_names_token() {
        let mut state = MachineState::new(Flavor::Intel);
        let outcome = assemble(Some("frob eax"), Flavor::Intel, &mut state, false);
        assert!(outcome.error.contains("frob"), "{}", outcome.error);
        assert!(outcome.last_instr.is_empty());
    }

    #[test]
    fn run_reports_last_instruction() {
        let mut state = MachineState::new(Flavor::Intel);
        let outcome = assemble(Some("mov eax, 5\nadd eax, 1"), Flavor::Intel, &mut state, false);
        assert_eq!(outcome.error, "");
        assert_eq!(outcome.last_instr, "add eax, 1");
        assert_eq!(state.reg("EAX"), 6);
    }

    #[test]
    fn step_walks_then_rewinds() {
        let src = "mov eax, 1\nadd eax, 1";
        let mut state = MachineState::new(Flavor::Intel);
        assert_eq!(assemble(Some(src), Flavor::Intel, &mut state, true).last_instr, "mov eax, 1");
        assert_eq!(assemble(Some(src), Flavor::Intel, &mut state, true).last_instr, "add eax, 1");
        assert_eq!(
            assemble(Some(src), Flavor::Intel, &mut state, true).last_instr,
            END_OF_CODE
        );
        assert_eq!(state.ip, 0);
        assert_eq!(state.reg("EAX"), 2);
    }

    #[test]
    fn step_keeps_data_across_jumps_to_start() {
        let src = "x DB 5\nmov eax, [x]\nmov [x], 9\njmp 0";
        let mut state = MachineState::new(Flavor::Intel);
        for _ in 0..4 {
            assert_eq!(assemble(Some(src), Flavor::Intel, &mut state, true).error, "");
        }
        assert_eq!(state.reg("EAX"), 9);

        // Reaching the end rewinds and reloads the data
        let src = "x DB 5\nmov eax, [x]\nmov [x], 9";
        let mut state = MachineState::new(Flavor::Intel);
        for _ in 0..3 {
            assemble(Some(src), Flavor::Intel, &mut state, true);
        }
        assert!(!state.data_loaded);
        assert_eq!(assemble(Some(src), Flavor::Intel, &mut state, true).error, "");
        assert_eq!(state.reg("EAX"), 5);
    }

    #[test]
    fn step_starts_at_explicit_address() {
        let src = "40000 ADDI R8, R8, 1\n40004 ADDI R8, R8, 1";
        let mut state = MachineState::new(Flavor::MipsMml);
        let outcome = assemble(Some(src), Flavor::MipsMml, &mut state, true);
        assert_eq!(outcome.last_instr, "ADDI R8, R8, 1");
        assert_eq!(state.ip, 0x40004);
    }

    #[test]
    fn flavor_switch_resets_state() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_reg("EAX", 9);
        assemble(Some("ADDI R8, R0, 1"), Flavor::MipsAsm, &mut state, false);
        assert_eq!(state.flavor, Flavor::MipsAsm);
        assert_eq!(state.reg("R8"), 1);
        assert_eq!(state.reg("EAX"), 0);
    }

    #[test]
    fn runtime_error_keeps_prior_changes() {
        let mut state = MachineState::new(Flavor::Intel);
        let outcome = assemble(
            Some("mov eax, 7\nmov ebx, 0\nidiv ebx\nmov eax, 1"),
            Flavor::Intel,
            &mut state,
            false,
        );
        assert_eq!(outcome.error, "Division by zero");
        assert_eq!(outcome.last_instr, "idiv ebx");
        assert_eq!(state.reg("EAX"), 7);
    }

    #[test]
    fn mips_bit_code_only() {
        let mut state = MachineState::new(Flavor::MipsAsm);
        let outcome = assemble(Some("ADD R10, R8, R9"), Flavor::MipsAsm, &mut state, false);
        assert_eq!(outcome.bit_code.lines().count(), 1);

        let mut state = MachineState::new(Flavor::Riscv);
        let outcome = assemble(Some("add a0, a1, a2"), Flavor::Riscv, &mut state, false);
        assert!(outcome.bit_code.is_empty());
    }
}
