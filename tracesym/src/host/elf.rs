use anyhow::{Context, Result};
use object::read::elf::{FileHeader, SectionHeader};
use object::{elf::FileHeader64, Endian, Endianness, Object, ObjectKind, ObjectSegment, ObjectSymbol, SymbolFlags};
use symbolic::common::ByteView;
use tracesym_common::sdt;
use tracing::debug;

use super::{BinaryInspector, UsdtNote};
use crate::symbolication::Symbol;

/// Reads binaries from disk with `object`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElfInspector;

fn open(path: &str) -> Result<ByteView<'static>> {
    ByteView::open(path).with_context(|| format!("failed to open {path}"))
}

impl BinaryInspector for ElfInspector {
    fn symbols(&self, path: &str) -> Result<Vec<Symbol>> {
        let data = open(path)?;
        let obj = object::File::parse(&*data).with_context(|| format!("failed to parse {path}"))?;

        let mut symbols = Vec::new();
        for sym in obj.symbols().chain(obj.dynamic_symbols()) {
            if !sym.is_definition() {
                continue;
            }
            // `$x`/`$d` are ARM mapping symbols, not code
            let name = match sym.name() {
                Ok(name) if !name.is_empty() && !name.starts_with('$') => name,
                _ => continue,
            };
            let flags = match sym.flags() {
                SymbolFlags::Elf { st_info, .. } => st_info as u32,
                _ => 0,
            };
            symbols.push(Symbol {
                name: name.to_owned(),
                start: sym.address(),
                size: sym.size(),
                flags,
            });
        }
        debug!("{path}: {} symbols", symbols.len());
        Ok(symbols)
    }

    fn load_address(&self, path: &str) -> Result<u64> {
        let data = open(path)?;
        let obj = object::File::parse(&*data).with_context(|| format!("failed to parse {path}"))?;
        let addr = obj.segments().next().map(|s| s.address()).unwrap_or(0);
        Ok(addr)
    }

    fn is_shared_object(&self, path: &str) -> Result<bool> {
        let data = open(path)?;
        let obj = object::File::parse(&*data).with_context(|| format!("failed to parse {path}"))?;
        Ok(obj.kind() == ObjectKind::Dynamic)
    }

    fn usdt_notes(&self, path: &str) -> Result<Vec<UsdtNote>> {
        let data = open(path)?;
        let data: &[u8] = &data;
        let header = FileHeader64::<Endianness>::parse(data)
            .with_context(|| format!("{path} is not a 64-bit ELF"))?;
        let endian = header.endian()?;
        let sections = header.sections(endian, data)?;

        let base_section = sections
            .section_by_name(endian, sdt::BASE_SECTION)
            .map(|(_, s)| s.sh_addr(endian));

        let mut notes = Vec::new();
        for section in sections.iter() {
            let Some(mut iter) = section.notes(endian, data)? else {
                continue;
            };
            while let Some(note) = iter.next()? {
                if note.name() != sdt::NOTE_NAME || note.n_type(endian) != sdt::NT_STAPSDT {
                    continue;
                }
                match parse_note_desc(note.desc(), endian, base_section) {
                    Some(n) => notes.push(n),
                    None => debug!("{path}: malformed stapsdt note"),
                }
            }
        }
        Ok(notes)
    }
}

/// Decodes the payload of a `stapsdt` note.
///
/// The payload is three target-width words (pc, link-time base of
/// `.stapsdt.base`, semaphore) followed by three NUL-terminated strings.
/// When the binary has been prelinked the recorded base differs from the
/// section's actual address and pc/semaphore are shifted by the difference.
pub fn parse_note_desc<E: Endian>(desc: &[u8], endian: E, base_section: Option<u64>) -> Option<UsdtNote> {
    const WORD: usize = 8;
    if desc.len() < 3 * WORD {
        return None;
    }
    let word = |i: usize| -> u64 {
        let mut bytes = [0u8; WORD];
        bytes.copy_from_slice(&desc[i * WORD..(i + 1) * WORD]);
        endian.read_u64_bytes(bytes)
    };
    let mut pc = word(0);
    let note_base = word(1);
    let mut semaphore = word(2);

    if let Some(actual) = base_section {
        if note_base != 0 {
            let delta = actual.wrapping_sub(note_base);
            pc = pc.wrapping_add(delta);
            if semaphore != 0 {
                semaphore = semaphore.wrapping_add(delta);
            }
        }
    }

    let mut strings = desc[3 * WORD..].split(|b| *b == 0);
    let provider = std::str::from_utf8(strings.next()?).ok()?;
    let name = std::str::from_utf8(strings.next()?).ok()?;
    let arg_fmt = strings
        .next()
        .and_then(|s| std::str::from_utf8(s).ok())
        .unwrap_or("");
    if provider.is_empty() || name.is_empty() {
        return None;
    }

    Some(UsdtNote {
        provider: provider.to_owned(),
        name: name.to_owned(),
        pc,
        semaphore,
        arg_fmt: arg_fmt.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use object::LittleEndian;

    fn desc(pc: u64, base: u64, sem: u64, strings: &[&str]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&pc.to_le_bytes());
        out.extend_from_slice(&base.to_le_bytes());
        out.extend_from_slice(&sem.to_le_bytes());
        for s in strings {
            out.extend_from_slice(s.as_bytes());
            out.push(0);
        }
        out
    }

    #[test]
    fn decodes_note() {
        let raw = desc(0x1130, 0x2004, 0x4010, &["libfoo", "start", "-4@%edi 8@%rsi"]);
        let note = parse_note_desc(&raw, LittleEndian, Some(0x2004)).unwrap();
        assert_eq!(note.provider, "libfoo");
        assert_eq!(note.name, "start");
        assert_eq!(note.pc, 0x1130);
        assert_eq!(note.semaphore, 0x4010);
        assert_eq!(note.arg_fmt, "-4@%edi 8@%rsi");
    }

    #[test]
    fn prelinked_note_is_shifted() {
        let raw = desc(0x1130, 0x2004, 0x4010, &["p", "n", ""]);
        let note = parse_note_desc(&raw, LittleEndian, Some(0x3004)).unwrap();
        assert_eq!(note.pc, 0x2130);
        assert_eq!(note.semaphore, 0x5010);

        let raw = desc(0x1130, 0x2004, 0, &["p", "n", ""]);
        let note = parse_note_desc(&raw, LittleEndian, Some(0x3004)).unwrap();
        assert_eq!(note.semaphore, 0);
    }

    #[test]
    fn truncated_note_is_rejected() {
        assert!(parse_note_desc(&[0u8; 12], LittleEndian, None).is_none());
        let raw = desc(1, 0, 0, &[]);
        assert!(parse_note_desc(&raw, LittleEndian, None).is_none());
    }
}
