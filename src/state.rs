use std::collections::BTreeMap;

use crate::error::RunError;
use crate::flavor::{Flavor, Isa};
use crate::symbol::{Flag, FxMap, FxSet, Location, Radix};

/// Lowest address of the stack region.
pub const STACK_BOTTOM: u32 = 0x1F0;
/// Highest address of the stack region, where the stack pointer starts.
pub const STACK_TOP: u32 = 0x1FF;

const STACK_SIZE: usize = (STACK_TOP - STACK_BOTTOM + 1) as usize;

/// Stack pointer used by `PUSH`, `POP`, `CALL` and `RET`.
pub const STACK_POINTER: &str = "ESP";

/// Stack slot, distinguishing a never-written cell from a zero.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub enum Cell {
    #[default]
    Empty,
    Value(i64),
}

impl Cell {
    pub fn value(self) -> i64 {
        match self {
            Cell::Empty => 0,
            Cell::Value(value) => value,
        }
    }
}

/// Represents the complete simulated machine for one session.
#[derive(Clone, Debug)]
pub struct MachineState {
    /// Register name to value, in display order
    pub registers: FxMap<&'static str, i64>,
    /// Floating-point bank, kept apart from the integer registers
    pub float_registers: FxMap<&'static str, f64>,
    pub flags: FxMap<Flag, u8>,
    /// Sparse memory. Missing addresses were never written.
    pub memory: BTreeMap<u32, i64>,
    /// Indexed by `addr - STACK_BOTTOM`
    pub stack: Vec<Cell>,
    /// Address of the next instruction to fetch
    pub ip: u32,
    pub start_ip: u32,
    pub labels: FxMap<String, u32>,
    /// Locations written by the last instruction
    pub changes: FxSet<Location>,
    pub flavor: Flavor,
    /// Base used to display values
    pub base: Radix,
    /// Data declarations have been written since the last rewind
    pub data_loaded: bool,
}

impl MachineState {
    pub fn new(flavor: Flavor) -> Self {
        let spec = flavor.spec();
        let mut registers: FxMap<&'static str, i64> = spec
            .registers()
            .iter()
            .map(|reg| (reg.name(), 0))
            .collect();
        if spec.isa == Isa::X86 {
            registers.insert(STACK_POINTER, STACK_TOP as i64);
        }
        MachineState {
            registers,
            float_registers: spec
                .float_registers()
                .iter()
                .map(|reg| (reg.name(), 0.0))
                .collect(),
            flags: Flag::ALL.into_iter().map(|flag| (flag, 0)).collect(),
            memory: BTreeMap::new(),
            stack: vec![Cell::Empty; STACK_SIZE],
            ip: spec.default_start,
            start_ip: spec.default_start,
            labels: FxMap::default(),
            changes: FxSet::default(),
            flavor,
            base: Radix::default(),
            data_loaded: false,
        }
    }

    /// Restore zeroed registers, flags, memory and stack. Keeps flavor and display base.
    pub fn reset(&mut self) {
        let base = self.base;
        *self = MachineState::new(self.flavor);
        self.base = base;
    }

    pub fn reg(&self, name: &str) -> i64 {
        self.registers.get(name).copied().unwrap_or(0)
    }

    /// Writes to the hardwired zero register are discarded.
    pub fn set_reg(&mut self, name: &'static str, value: i64) {
        if matches!(name, "R0" | "X0") && self.flavor.isa() != Isa::X86 {
            return;
        }
        self.registers.insert(name, value);
        self.changes.insert(Location::Register(name));
    }

    pub fn freg(&self, name: &str) -> f64 {
        self.float_registers.get(name).copied().unwrap_or(0.0)
    }

    pub fn set_freg(&mut self, name: &'static str, value: f64) {
        self.float_registers.insert(name, value);
        self.changes.insert(Location::Register(name));
    }

    pub fn flag(&self, flag: Flag) -> u8 {
        self.flags.get(&flag).copied().unwrap_or(0)
    }

    pub fn set_flag(&mut self, flag: Flag, set: bool) {
        self.flags.insert(flag, set as u8);
        self.changes.insert(Location::Flag(flag));
    }

    fn stack_slot(addr: u32) -> Option<usize> {
        (STACK_BOTTOM..=STACK_TOP)
            .contains(&addr)
            .then(|| (addr - STACK_BOTTOM) as usize)
    }

    /// Never-written memory reads as zero.
    pub fn read_mem(&self, addr: u32) -> i64 {
        match Self::stack_slot(addr) {
            Some(slot) => self.stack[slot].value(),
            None => self.memory.get(&addr).copied().unwrap_or(0),
        }
    }

    pub fn write_mem(&mut self, addr: u32, value: i64) {
        match Self::stack_slot(addr) {
            Some(slot) => {
                self.stack[slot] = Cell::Value(value);
                self.changes.insert(Location::Stack(addr));
            }
            None => {
                self.memory.insert(addr, value);
                self.changes.insert(Location::Memory(addr));
            }
        }
    }

    /// Write at the stack pointer, then move it down.
    pub fn push(&mut self, value: i64) -> Result<(), RunError> {
        let sp = self.reg(STACK_POINTER);
        let slot = u32::try_from(sp)
            .ok()
            .and_then(Self::stack_slot)
            .ok_or(RunError::StackOverflow)?;
        self.stack[slot] = Cell::Value(value);
        self.changes.insert(Location::Stack(sp as u32));
        self.set_reg(STACK_POINTER, sp - 1);
        Ok(())
    }

    /// Move the stack pointer up, then take the cell it points at.
    pub fn pop(&mut self) -> Result<i64, RunError> {
        let sp = self.reg(STACK_POINTER) + 1;
        let slot = u32::try_from(sp)
            .ok()
            .and_then(Self::stack_slot)
            .ok_or(RunError::StackUnderflow)?;
        let value = std::mem::take(&mut self.stack[slot]).value();
        self.changes.insert(Location::Stack(sp as u32));
        self.set_reg(STACK_POINTER, sp);
        Ok(value)
    }

    pub fn label(&self, name: &str) -> Option<u32> {
        self.labels.get(name).copied()
    }

    pub fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state() {
        let state = MachineState::new(Flavor::Intel);
        assert_eq!(state.reg("EAX"), 0);
        assert_eq!(state.reg(STACK_POINTER), STACK_TOP as i64);
        assert_eq!(state.flags.len(), 4);
        assert!(state.stack.iter().all(|cell| *cell == Cell::Empty));

        let mips = MachineState::new(Flavor::MipsAsm);
        assert_eq!(mips.ip, 0x0040_0000);
        assert_eq!(mips.registers.len(), 34);
        assert_eq!(mips.float_registers.len(), 32);
        assert_eq!(mips.freg("F31"), 0.0);
    }

    #[test]
    fn float_writes_are_tracked() {
        let mut state = MachineState::new(Flavor::Intel);
        state.set_freg("ST1", -0.5);
        assert_eq!(state.freg("ST1"), -0.5);
        assert_eq!(state.reg("ST1"), 0);
        assert!(state.changes.contains(&Location::Register("ST1")));
    }

    #[test]
    fn zero_register_is_hardwired() {
        let mut state = MachineState::new(Flavor::MipsMml);
        state.set_reg("R0", 5);
        assert_eq!(state.reg("R0"), 0);
        assert!(state.changes.is_empty());
    }

    #[test]
    fn stack_is_lifo() {
        let mut state = MachineState::new(Flavor::Intel);
        for value in 1..=3 {
            state.push(value).unwrap();
        }
        assert_eq!(state.reg(STACK_POINTER), STACK_TOP as i64 - 3);
        assert_eq!(state.pop(), Ok(3));
        assert_eq!(state.pop(), Ok(2));
        assert_eq!(state.pop(), Ok(1));
        assert!(state.stack.iter().all(|cell| *cell == Cell::Empty));
        assert_eq!(state.pop(), Err(RunError::StackUnderflow));
    }

    #[test]
    fn stack_overflow() {
        let mut state = MachineState::new(Flavor::Intel);
        for value in 0..STACK_SIZE as i64 {
            state.push(value).unwrap();
        }
        assert_eq!(state.push(99), Err(RunError::StackOverflow));
    }

    #[test]
    fn memory_reads_route_to_stack() {
        let mut state = MachineState::new(Flavor::Intel);
        state.push(7).unwrap();
        assert_eq!(state.read_mem(STACK_TOP), 7);
        assert_eq!(state.read_mem(0x40), 0);
        state.write_mem(0x40, -2);
        assert_eq!(state.read_mem(0x40), -2);
        assert!(state.changes.contains(&Location::Memory(0x40)));
    }

    #[test]
    fn reset_keeps_base() {
        let mut state = MachineState::new(Flavor::Intel);
        state.base = Radix::Hex;
        state.set_reg("EAX", 9);
        state.reset();
        assert_eq!(state.reg("EAX"), 0);
        assert_eq!(state.base, Radix::Hex);
    }
}
