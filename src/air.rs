use crate::ops::Opcode;
use crate::operand::Operand;

/// Assembly intermediate representation: the resolved instruction table plus data.
#[derive(Clone, Debug)]
pub struct Air {
    /// Address of the first instruction
    start: u32,
    /// Address distance between instructions
    step: u32,
    stmts: Vec<Stmt>,
    data: Vec<DataDecl>,
}

/// Single resolved instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Stmt {
    pub addr: u32,
    pub op: Opcode,
    pub operands: Vec<Operand>,
    /// One-based source line
    pub line: usize,
    /// Source text without the comment
    pub source: String,
}

/// Memory initialised from a data directive before execution.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DataDecl {
    pub addr: u32,
    pub values: Vec<i64>,
    /// Address distance between consecutive values
    pub width: u32,
    pub line: usize,
}

impl Air {
    pub fn new(start: u32, step: u32) -> Self {
        Air {
            start,
            step,
            stmts: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    /// Address one past the last instruction.
    pub fn end(&self) -> u32 {
        let len = u32::try_from(self.stmts.len()).unwrap_or(u32::MAX);
        self.start.saturating_add(self.step.saturating_mul(len))
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn add_stmt(&mut self, stmt: Stmt) {
        self.stmts.push(stmt)
    }

    pub fn add_data(&mut self, decl: DataDecl) {
        self.data.push(decl)
    }

    /// Instruction stored at `addr`, if `addr` is inside the table and aligned.
    pub fn fetch(&self, addr: u32) -> Option<&Stmt> {
        let offs = addr.checked_sub(self.start)?;
        if offs % self.step != 0 {
            return None;
        }
        self.stmts.get((offs / self.step) as usize)
    }

    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    pub fn data(&self) -> &[DataDecl] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }
}

impl<'a> IntoIterator for &'a Air {
    type Item = &'a Stmt;
    type IntoIter = std::slice::Iter<'a, Stmt>;

    fn into_iter(self) -> Self::IntoIter {
        self.stmts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::mips::MipsOp;

    fn stmt(addr: u32) -> Stmt {
        Stmt {
            addr,
            op: Opcode::Mips(MipsOp::SYSCALL),
            operands: Vec::new(),
            line: 1,
            source: "SYSCALL".into(),
        }
    }

    #[test]
    fn fetch_by_address() {
        let mut air = Air::new(0x400000, 4);
        air.add_stmt(stmt(0x400000));
        air.add_stmt(stmt(0x400004));
        assert_eq!(air.end(), 0x400008);
        assert_eq!(air.fetch(0x400004).unwrap().addr, 0x400004);
        assert!(air.fetch(0x400002).is_none());
        assert!(air.fetch(0x400008).is_none());
        assert!(air.fetch(0).is_none());
    }

    #[test]
    fn end_saturates() {
        let mut air = Air::new(0xFFFF_FFF8, 4);
        air.add_stmt(stmt(0xFFFF_FFF8));
        air.add_stmt(stmt(0xFFFF_FFFC));
        assert_eq!(air.end(), u32::MAX);
        assert_eq!(air.fetch(0xFFFF_FFFC).unwrap().addr, 0xFFFF_FFFC);
    }
}
