use super::Register;

pub(super) const PROGRAM_COUNTER: &str = "pc";

/// `user_pt_regs.regs[N]` for x0..x30
const GENERAL: [&str; 31] = [
    "regs[0]", "regs[1]", "regs[2]", "regs[3]", "regs[4]", "regs[5]", "regs[6]", "regs[7]",
    "regs[8]", "regs[9]", "regs[10]", "regs[11]", "regs[12]", "regs[13]", "regs[14]", "regs[15]",
    "regs[16]", "regs[17]", "regs[18]", "regs[19]", "regs[20]", "regs[21]", "regs[22]", "regs[23]",
    "regs[24]", "regs[25]", "regs[26]", "regs[27]", "regs[28]", "regs[29]", "regs[30]",
];

pub(super) fn normalize(name: &str) -> Option<Register> {
    match name {
        "sp" => return Some(Register { name: "sp", size: 8 }),
        "wsp" => return Some(Register { name: "sp", size: 4 }),
        "pc" => return Some(Register { name: PROGRAM_COUNTER, size: 8 }),
        _ => {}
    }

    let size = match name.as_bytes().first()? {
        b'x' => 8,
        b'w' => 4,
        _ => return None,
    };
    let digits = &name[1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: usize = digits.parse().ok()?;
    GENERAL.get(index).map(|field| Register { name: field, size })
}
