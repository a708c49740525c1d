//! Layout constants of SystemTap SDT (USDT) ELF notes.

/// Owner name of every SDT note.
pub const NOTE_NAME: &[u8] = b"stapsdt";

/// Note type used by SDT v3, the only version emitted by `sys/sdt.h` today.
pub const NT_STAPSDT: u32 = 3;

/// Section whose link-time address is recorded in every note. If the binary
/// was prelinked, the difference between the section's current address and the
/// recorded one must be applied to the probe pc and semaphore.
pub const BASE_SECTION: &[u8] = b".stapsdt.base";
