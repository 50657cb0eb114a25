use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;

use crate::symbol::{FxMap, Register};

/// Selectable assembly dialect.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Flavor {
    #[default]
    Intel,
    Att,
    MipsAsm,
    MipsMml,
    Riscv,
}

/// Instruction set behind a flavor. Intel and AT&T share one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Isa {
    X86,
    Mips,
    Riscv,
}

/// Whether lines start with an explicit hex instruction address.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressPrefix {
    Forbidden,
    Optional,
    Required,
}

/// Everything the lexer, parser and machine need to know about a flavor.
#[derive(Debug)]
pub struct FlavorSpec {
    pub flavor: Flavor,
    pub isa: Isa,
    /// Starts a comment running to end of line.
    pub comment: char,
    /// Marks an immediate. Unprefixed numbers are then absolute addresses.
    pub imm_prefix: Option<char>,
    /// Marks a register name.
    pub reg_prefix: Option<char>,
    /// Register names are recognised without a prefix.
    pub bare_registers: bool,
    /// Source order is `src, dest` and must be flipped.
    pub reversed_operands: bool,
    /// Address distance between consecutive instructions.
    pub addr_step: u32,
    pub default_start: u32,
    pub data_base: u32,
    /// Data segment stride of a `.WORD`.
    pub word_size: u32,
    pub address_prefix: AddressPrefix,
    /// Optional operand-size suffix on mnemonics, as in `movl`.
    pub mnemonic_suffix: Option<char>,
}

const INTEL: FlavorSpec = FlavorSpec {
    flavor: Flavor::Intel,
    isa: Isa::X86,
    comment: ';',
    imm_prefix: None,
    reg_prefix: None,
    bare_registers: true,
    reversed_operands: false,
    addr_step: 1,
    default_start: 0,
    data_base: 0,
    word_size: 1,
    address_prefix: AddressPrefix::Forbidden,
    mnemonic_suffix: None,
};

const ATT: FlavorSpec = FlavorSpec {
    flavor: Flavor::Att,
    isa: Isa::X86,
    comment: '#',
    imm_prefix: Some('$'),
    reg_prefix: Some('%'),
    bare_registers: false,
    reversed_operands: true,
    addr_step: 1,
    default_start: 0,
    data_base: 0,
    word_size: 1,
    address_prefix: AddressPrefix::Forbidden,
    mnemonic_suffix: Some('L'),
};

const MIPS_ASM: FlavorSpec = FlavorSpec {
    flavor: Flavor::MipsAsm,
    isa: Isa::Mips,
    comment: '#',
    imm_prefix: None,
    reg_prefix: Some('$'),
    bare_registers: true,
    reversed_operands: false,
    addr_step: 4,
    default_start: 0x0040_0000,
    data_base: 0x1001_0000,
    word_size: 4,
    address_prefix: AddressPrefix::Optional,
    mnemonic_suffix: None,
};

const MIPS_MML: FlavorSpec = FlavorSpec {
    flavor: Flavor::MipsMml,
    reg_prefix: None,
    address_prefix: AddressPrefix::Required,
    ..MIPS_ASM
};

const RISCV: FlavorSpec = FlavorSpec {
    flavor: Flavor::Riscv,
    isa: Isa::Riscv,
    comment: '#',
    imm_prefix: None,
    reg_prefix: None,
    bare_registers: true,
    reversed_operands: false,
    addr_step: 4,
    default_start: 0,
    data_base: 0x1000_0000,
    word_size: 4,
    address_prefix: AddressPrefix::Forbidden,
    mnemonic_suffix: None,
};

impl Flavor {
    pub const ALL: [Flavor; 5] = [
        Flavor::Intel,
        Flavor::Att,
        Flavor::MipsAsm,
        Flavor::MipsMml,
        Flavor::Riscv,
    ];

    pub fn spec(self) -> &'static FlavorSpec {
        match self {
            Flavor::Intel => &INTEL,
            Flavor::Att => &ATT,
            Flavor::MipsAsm => &MIPS_ASM,
            Flavor::MipsMml => &MIPS_MML,
            Flavor::Riscv => &RISCV,
        }
    }

    pub fn isa(self) -> Isa {
        self.spec().isa
    }

    pub fn is_mips(self) -> bool {
        self.isa() == Isa::Mips
    }

    pub fn name(self) -> &'static str {
        match self {
            Flavor::Intel => "intel",
            Flavor::Att => "att",
            Flavor::MipsAsm => "mips_asm",
            Flavor::MipsMml => "mips_mml",
            Flavor::Riscv => "riscv",
        }
    }
}

impl FromStr for Flavor {
    type Err = String;
    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let lower = string.to_ascii_lowercase();
        Flavor::ALL
            .into_iter()
            .find(|flavor| flavor.name() == lower)
            .ok_or_else(|| {
                format!(
                    "Unknown flavor '{}', expected one of intel, att, mips_asm, mips_mml, riscv",
                    string
                )
            })
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const X86_NAMES: [&str; 8] = ["EAX", "EBX", "ECX", "EDX", "ESI", "EDI", "ESP", "EBP"];

#[rustfmt::skip]
const MIPS_NAMES: [&str; 34] = [
    "R0", "R1", "R2", "R3", "R4", "R5", "R6", "R7",
    "R8", "R9", "R10", "R11", "R12", "R13", "R14", "R15",
    "R16", "R17", "R18", "R19", "R20", "R21", "R22", "R23",
    "R24", "R25", "R26", "R27", "R28", "R29", "R30", "R31",
    "HI", "LO",
];

#[rustfmt::skip]
const MIPS_ALIASES: [&str; 32] = [
    "ZERO", "AT", "V0", "V1", "A0", "A1", "A2", "A3",
    "T0", "T1", "T2", "T3", "T4", "T5", "T6", "T7",
    "S0", "S1", "S2", "S3", "S4", "S5", "S6", "S7",
    "T8", "T9", "K0", "K1", "GP", "SP", "FP", "RA",
];

#[rustfmt::skip]
const RISCV_NAMES: [&str; 32] = [
    "X0", "X1", "X2", "X3", "X4", "X5", "X6", "X7",
    "X8", "X9", "X10", "X11", "X12", "X13", "X14", "X15",
    "X16", "X17", "X18", "X19", "X20", "X21", "X22", "X23",
    "X24", "X25", "X26", "X27", "X28", "X29", "X30", "X31",
];

#[rustfmt::skip]
const RISCV_ALIASES: [&str; 32] = [
    "ZERO", "RA", "SP", "GP", "TP", "T0", "T1", "T2",
    "S0", "S1", "A0", "A1", "A2", "A3", "A4", "A5",
    "A6", "A7", "S2", "S3", "S4", "S5", "S6", "S7",
    "S8", "S9", "S10", "S11", "T3", "T4", "T5", "T6",
];

const X86_FLOAT_NAMES: [&str; 8] = ["ST0", "ST1", "ST2", "ST3", "ST4", "ST5", "ST6", "ST7"];

#[rustfmt::skip]
const MIPS_FLOAT_NAMES: [&str; 32] = [
    "F0", "F1", "F2", "F3", "F4", "F5", "F6", "F7",
    "F8", "F9", "F10", "F11", "F12", "F13", "F14", "F15",
    "F16", "F17", "F18", "F19", "F20", "F21", "F22", "F23",
    "F24", "F25", "F26", "F27", "F28", "F29", "F30", "F31",
];

fn table(names: &'static [&'static str]) -> Vec<Register> {
    names
        .iter()
        .enumerate()
        .map(|(num, name)| Register::new(*name, num as u8))
        .collect()
}

fn float_table(names: &'static [&'static str]) -> Vec<Register> {
    names
        .iter()
        .enumerate()
        .map(|(num, name)| Register::float(*name, num as u8))
        .collect()
}

/// Add the floating-point bank under its canonical names.
fn with_floats(
    mut map: FxMap<String, Register>,
    floats: &[Register],
) -> FxMap<String, Register> {
    for reg in floats {
        map.insert(reg.name().to_string(), *reg);
    }
    map
}

fn index(registers: &[Register], aliases: &[&str]) -> FxMap<String, Register> {
    let mut map: FxMap<String, Register> = registers
        .iter()
        .map(|reg| (reg.name().to_string(), *reg))
        .collect();
    for (reg, alias) in registers.iter().zip(aliases) {
        map.insert(alias.to_string(), *reg);
    }
    map
}

lazy_static! {
    static ref X86_REGISTERS: Vec<Register> = table(&X86_NAMES);
    static ref MIPS_REGISTERS: Vec<Register> = table(&MIPS_NAMES);
    static ref RISCV_REGISTERS: Vec<Register> = table(&RISCV_NAMES);
    static ref X86_FLOATS: Vec<Register> = float_table(&X86_FLOAT_NAMES);
    static ref MIPS_FLOATS: Vec<Register> = float_table(&MIPS_FLOAT_NAMES);
    static ref X86_INDEX: FxMap<String, Register> =
        with_floats(index(&X86_REGISTERS, &[]), &X86_FLOATS);
    static ref MIPS_INDEX: FxMap<String, Register> =
        with_floats(index(&MIPS_REGISTERS, &[]), &MIPS_FLOATS);
    static ref MIPS_ALIAS_INDEX: FxMap<String, Register> = {
        let mut map = index(&MIPS_REGISTERS[..32], &MIPS_ALIASES);
        // `$fp` and `$s8` name the same register
        map.insert("S8".to_string(), MIPS_REGISTERS[30]);
        for reg in &MIPS_REGISTERS[..32] {
            map.insert(reg.num().to_string(), *reg);
        }
        with_floats(map, &MIPS_FLOATS)
    };
    static ref RISCV_INDEX: FxMap<String, Register> = {
        let mut map = index(&RISCV_REGISTERS, &RISCV_ALIASES);
        map.insert("FP".to_string(), RISCV_REGISTERS[8]);
        map
    };
}

impl FlavorSpec {
    /// Every register of the flavor, in display order.
    pub fn registers(&self) -> &'static [Register] {
        match self.isa {
            Isa::X86 => &X86_REGISTERS[..],
            Isa::Mips => &MIPS_REGISTERS[..],
            Isa::Riscv => &RISCV_REGISTERS[..],
        }
    }

    /// Floating-point register bank, empty for RISC-V.
    pub fn float_registers(&self) -> &'static [Register] {
        match self.isa {
            Isa::X86 => &X86_FLOATS[..],
            Isa::Mips => &MIPS_FLOATS[..],
            Isa::Riscv => &[],
        }
    }

    /// Look up a register written without a prefix.
    pub fn bare_register(&self, name: &str) -> Option<Register> {
        if !self.bare_registers {
            return None;
        }
        self.lookup(name, false)
    }

    /// Look up a register written after the flavor's register prefix.
    pub fn prefixed_register(&self, name: &str) -> Option<Register> {
        self.reg_prefix?;
        self.lookup(name, true)
    }

    fn lookup(&self, name: &str, prefixed: bool) -> Option<Register> {
        let upper = name.to_ascii_uppercase();
        let index: &FxMap<String, Register> = match (self.isa, prefixed) {
            (Isa::X86, _) => &*X86_INDEX,
            (Isa::Mips, false) => &*MIPS_INDEX,
            (Isa::Mips, true) => &*MIPS_ALIAS_INDEX,
            (Isa::Riscv, _) => &*RISCV_INDEX,
        };
        index.get(&upper).copied()
    }

    /// Register named `name` in the canonical table, for tests and callers that seed state.
    pub fn register(&self, name: &str) -> Option<Register> {
        let upper = name.to_ascii_uppercase();
        self.registers()
            .iter()
            .chain(self.float_registers())
            .find(|reg| reg.name() == upper)
            .copied()
    }
}
