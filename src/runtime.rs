use crate::air::{Air, Stmt};
use crate::env;
use crate::error::RunError;
use crate::ops::{word, ControlTransfer, Target};
use crate::state::MachineState;
use crate::tprintln;

/// Step guard for run mode.
pub const MAX_INSTRUCTIONS: usize = 1000;

/// Why a run or step stopped without a fault.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exit {
    /// The instruction executed and the program can continue
    Stepped,
    /// Pointer left the instruction table
    EndOfCode,
    /// Explicit exit instruction
    Halted,
    /// Step guard reached
    StepLimit,
}

/// Fetch/execute loop over a parsed program and the machine it mutates.
pub struct Runner<'a> {
    air: &'a Air,
    state: &'a mut MachineState,
    /// Last instruction fetched, even if it faulted
    last: Option<&'a Stmt>,
}

impl<'a> Runner<'a> {
    pub fn new(air: &'a Air, state: &'a mut MachineState) -> Self {
        Runner {
            air,
            state,
            last: None,
        }
    }

    pub fn last(&self) -> Option<&'a Stmt> {
        self.last
    }

    /// Write every data declaration into memory and mark the data as loaded.
    pub fn init_data(&mut self) {
        for decl in self.air.data() {
            for (i, value) in decl.values.iter().enumerate() {
                let addr = decl.addr.wrapping_add(decl.width.wrapping_mul(i as u32));
                self.state.write_mem(addr, word(*value));
            }
        }
        self.state.data_loaded = true;
    }

    fn in_program(&self) -> bool {
        self.air.fetch(self.state.ip).is_some()
    }

    /// Execute the instruction at the pointer.
    pub fn step(&mut self) -> Result<Exit, RunError> {
        let ip = self.state.ip;
        let stmt = self
            .air
            .fetch(ip)
            .ok_or_else(|| RunError::InvalidInstruction(format!("no instruction at {:#X}", ip)))?;
        self.last = Some(stmt);
        // Pointer is advanced before the body runs
        self.state.ip = ip + self.air.step();
        self.state.clear_changes();
        tprintln!("{:>8X}  {}", ip, stmt.source);

        match stmt.op.execute(&stmt.operands, self.state)? {
            ControlTransfer::Continue => (),
            ControlTransfer::Jump(target) => {
                let addr = self.resolve(&target)?;
                tprintln!("          jump to {:X}", addr);
                self.state.ip = addr;
            }
            ControlTransfer::Halt => return Ok(Exit::Halted),
        }
        if self.in_program() {
            Ok(Exit::Stepped)
        } else {
            Ok(Exit::EndOfCode)
        }
    }

    /// Jump targets must lie inside the program. The end address is allowed and stops the run.
    fn resolve(&self, target: &Target) -> Result<u32, RunError> {
        let addr = match target {
            Target::Label(name) => self
                .state
                .label(name)
                .ok_or_else(|| RunError::InvalidLabel(name.clone()))?
                as i64,
            Target::Address(addr) => *addr,
        };
        if addr < self.air.start() as i64 || addr > self.air.end() as i64 {
            return Err(RunError::OutOfBounds(addr));
        }
        Ok(addr as u32)
    }

    /// Rewind, load data and execute until the program ends, exits or hits the step guard.
    pub fn run(&mut self) -> Result<Exit, RunError> {
        self.state.ip = self.air.start();
        self.init_data();
        let max_steps = env::max_steps();
        let mut count = 0;
        while self.in_program() {
            if count >= max_steps {
                return Ok(Exit::StepLimit);
            }
            match self.step()? {
                Exit::Stepped | Exit::EndOfCode => count += 1,
                exit => return Ok(exit),
            }
        }
        Ok(Exit::EndOfCode)
    }
}
