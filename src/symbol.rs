use std::fmt;
use std::str::FromStr;

use fxhash::FxBuildHasher;
use indexmap::{IndexMap, IndexSet};

pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;
pub type FxSet<T> = IndexSet<T, FxBuildHasher>;

/// Machine register, named as it appears in the flavor's register table.
///
/// `num` is the hardware register number used by the MIPS encoder. Registers
/// outside the numbered file (`HI`, `LO`, Intel registers) carry their table
/// position instead, which is never encoded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Register {
    name: &'static str,
    num: u8,
    /// Lives in the floating-point bank
    float: bool,
}

impl Register {
    pub const fn new(name: &'static str, num: u8) -> Self {
        Register {
            name,
            num,
            float: false,
        }
    }

    pub const fn float(name: &'static str, num: u8) -> Self {
        Register {
            name,
            num,
            float: true,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn num(&self) -> u8 {
        self.num
    }

    pub fn is_float(&self) -> bool {
        self.float
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Status flags shared by every flavor.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Flag {
    Carry,
    Overflow,
    Sign,
    Zero,
}

impl Flag {
    pub const ALL: [Flag; 4] = [Flag::Carry, Flag::Overflow, Flag::Sign, Flag::Zero];

    pub fn name(&self) -> &'static str {
        match self {
            Flag::Carry => "CF",
            Flag::Overflow => "OF",
            Flag::Sign => "SF",
            Flag::Zero => "ZF",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Symbolic reference to a code or data address.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric base, used both for literals and for displaying machine state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub enum Radix {
    #[default]
    Dec,
    Hex,
}

impl Radix {
    /// Render `value` as a 32-bit quantity in this base.
    pub fn format(&self, value: i64) -> String {
        match self {
            Radix::Dec => value.to_string(),
            Radix::Hex if value < 0 => format!("0x{:X}", value as u32),
            Radix::Hex => format!("0x{:X}", value),
        }
    }
}

impl FromStr for Radix {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dec" | "decimal" => Ok(Radix::Dec),
            "hex" | "hexadecimal" => Ok(Radix::Hex),
            _ => Err(format!("Unknown base '{}'", s)),
        }
    }
}

impl fmt::Display for Radix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Radix::Dec => f.write_str("dec"),
            Radix::Hex => f.write_str("hex"),
        }
    }
}

/// Something the last instruction wrote to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Location {
    Register(&'static str),
    Flag(Flag),
    Memory(u32),
    Stack(u32),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Register(name) => f.write_str(name),
            Location::Flag(flag) => write!(f, "{}", flag),
            Location::Memory(addr) | Location::Stack(addr) => write!(f, "{:X}", addr),
        }
    }
}
