mod aarch64;
mod x86_64;

/// Instruction-set architecture whose SDT argument syntax and register file
/// are used to interpret probe operands.
#[cfg_attr(feature = "user", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "user", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// How a memory operand is spelled in an argument string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOperand {
    /// AT&T style, `-8(%rbp)`
    Parenthesized,
    /// ARM style, `[sp, 16]`
    Bracketed,
}

/// A register after normalization: the field of `struct pt_regs` that holds
/// it and the width in bytes of the named view (`%eax` is 4, `%rax` is 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub name: &'static str,
    pub size: i32,
}

impl Default for Arch {
    fn default() -> Self {
        Self::native()
    }
}

impl Arch {
    #[cfg(target_arch = "aarch64")]
    pub const fn native() -> Self {
        Self::Aarch64
    }

    #[cfg(not(target_arch = "aarch64"))]
    pub const fn native() -> Self {
        Self::X86_64
    }

    pub fn normalize_register(&self, name: &str) -> Option<Register> {
        match self {
            Arch::X86_64 => x86_64::normalize(name),
            Arch::Aarch64 => aarch64::normalize(name),
        }
    }

    /// Prefix in front of register names, if the syntax uses one.
    pub const fn register_sigil(&self) -> Option<u8> {
        match self {
            Arch::X86_64 => Some(b'%'),
            Arch::Aarch64 => None,
        }
    }

    /// Prefix in front of immediate operands, if the syntax uses one.
    pub const fn constant_sigil(&self) -> Option<u8> {
        match self {
            Arch::X86_64 => Some(b'$'),
            Arch::Aarch64 => None,
        }
    }

    pub const fn memory_operand(&self) -> MemoryOperand {
        match self {
            Arch::X86_64 => MemoryOperand::Parenthesized,
            Arch::Aarch64 => MemoryOperand::Bracketed,
        }
    }

    pub const fn pointer_size(&self) -> i32 {
        8
    }

    /// Canonical name of the program counter, used for pc-relative globals.
    pub const fn program_counter(&self) -> &'static str {
        match self {
            Arch::X86_64 => x86_64::PROGRAM_COUNTER,
            Arch::Aarch64 => aarch64::PROGRAM_COUNTER,
        }
    }
}
