use super::Register;

pub(super) const PROGRAM_COUNTER: &str = "ip";

/// (assembler name, pt_regs field, width)
const REGISTERS: &[(&str, &str, i32)] = &[
    ("rax", "ax", 8), ("eax", "ax", 4), ("ax", "ax", 2), ("al", "ax", 1),
    ("rbx", "bx", 8), ("ebx", "bx", 4), ("bx", "bx", 2), ("bl", "bx", 1),
    ("rcx", "cx", 8), ("ecx", "cx", 4), ("cx", "cx", 2), ("cl", "cx", 1),
    ("rdx", "dx", 8), ("edx", "dx", 4), ("dx", "dx", 2), ("dl", "dx", 1),
    ("rsi", "si", 8), ("esi", "si", 4), ("si", "si", 2), ("sil", "si", 1),
    ("rdi", "di", 8), ("edi", "di", 4), ("di", "di", 2), ("dil", "di", 1),
    ("rbp", "bp", 8), ("ebp", "bp", 4), ("bp", "bp", 2), ("bpl", "bp", 1),
    ("rsp", "sp", 8), ("esp", "sp", 4), ("sp", "sp", 2), ("spl", "sp", 1),
    ("r8", "r8", 8), ("r8d", "r8", 4), ("r8w", "r8", 2), ("r8b", "r8", 1),
    ("r9", "r9", 8), ("r9d", "r9", 4), ("r9w", "r9", 2), ("r9b", "r9", 1),
    ("r10", "r10", 8), ("r10d", "r10", 4), ("r10w", "r10", 2), ("r10b", "r10", 1),
    ("r11", "r11", 8), ("r11d", "r11", 4), ("r11w", "r11", 2), ("r11b", "r11", 1),
    ("r12", "r12", 8), ("r12d", "r12", 4), ("r12w", "r12", 2), ("r12b", "r12", 1),
    ("r13", "r13", 8), ("r13d", "r13", 4), ("r13w", "r13", 2), ("r13b", "r13", 1),
    ("r14", "r14", 8), ("r14d", "r14", 4), ("r14w", "r14", 2), ("r14b", "r14", 1),
    ("r15", "r15", 8), ("r15d", "r15", 4), ("r15w", "r15", 2), ("r15b", "r15", 1),
    ("rip", PROGRAM_COUNTER, 8), ("eip", PROGRAM_COUNTER, 4),
];

pub(super) fn normalize(name: &str) -> Option<Register> {
    REGISTERS
        .iter()
        .find(|(asm, _, _)| *asm == name)
        .map(|&(_, field, size)| Register { name: field, size })
}
