use std::fmt;

use thiserror::Error;
use tracesym_common::{Arch, MemoryOperand};
use tracing::warn;

use super::Argument;

const VALID_SIZES: [u64; 4] = [1, 2, 4, 8];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot parse argument `{input}` at position {position}")]
pub struct ParseError {
    pub position: usize,
    pub input: String,
}

impl ParseError {
    /// The input with a caret under the offending byte.
    pub fn marker(&self) -> String {
        format!("{}\n{:>width$}", self.input, "^", width = self.position + 1)
    }
}

/// Reads SDT argument descriptors (`-4@%edi 8@-16(%rbp) 8@$5`) one at a time.
///
/// The first construct recognized at the current position commits. After a
/// failure the parser stops: `done()` turns true and every further `parse`
/// call reports the same position.
pub struct OperandParser<'a> {
    arch: Arch,
    input: &'a str,
    pos: usize,
    failed: bool,
}

impl fmt::Debug for OperandParser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperandParser")
            .field("arch", &self.arch)
            .field("input", &self.input)
            .field("pos", &self.pos)
            .finish()
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'.'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

impl<'a> OperandParser<'a> {
    pub fn new(arch: Arch, input: &'a str) -> Self {
        let mut parser = Self {
            arch,
            input,
            pos: 0,
            failed: false,
        };
        parser.skip_whitespace();
        parser
    }

    pub fn done(&self) -> bool {
        self.failed || self.pos >= self.input.len()
    }

    pub fn parse(&mut self) -> Result<Argument, ParseError> {
        if self.failed || self.done() {
            return Err(self.error(self.pos));
        }
        match self.parse_argument(self.pos) {
            Ok((arg, end)) => {
                self.pos = end;
                self.skip_whitespace();
                Ok(arg)
            }
            Err(position) => {
                self.failed = true;
                self.pos = position;
                let err = self.error(position);
                warn!("{err}\n{}", err.marker());
                Err(err)
            }
        }
    }

    fn error(&self, position: usize) -> ParseError {
        ParseError {
            position,
            input: self.input.to_owned(),
        }
    }

    fn at(&self, pos: usize) -> Option<u8> {
        self.input.as_bytes().get(pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.at(self.pos).map_or(false, |b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_spaces_from(&self, mut pos: usize) -> usize {
        while self.at(pos) == Some(b' ') {
            pos += 1;
        }
        pos
    }

    fn expect(&self, pos: usize, b: u8) -> Result<usize, usize> {
        if self.at(pos) == Some(b) {
            Ok(pos + 1)
        } else {
            Err(pos)
        }
    }

    /// `['-'|'+'] (digits | 0x hexdigits)`, `None` if it does not fit an `i64`.
    fn scan_number(&self, pos: usize) -> Option<(i64, usize)> {
        let mut cur = pos;
        let negative = match self.at(cur) {
            Some(b'-') => {
                cur += 1;
                true
            }
            Some(b'+') => {
                cur += 1;
                false
            }
            _ => false,
        };
        let hex = self.at(cur) == Some(b'0') && matches!(self.at(cur + 1), Some(b'x') | Some(b'X'));
        let digits_start = if hex { cur + 2 } else { cur };
        let mut end = digits_start;
        while self
            .at(end)
            .map_or(false, |b| if hex { b.is_ascii_hexdigit() } else { b.is_ascii_digit() })
        {
            end += 1;
        }
        if end == digits_start {
            return None;
        }
        let digits = &self.input[digits_start..end];
        let magnitude = if hex {
            u64::from_str_radix(digits, 16).ok()?
        } else {
            digits.parse::<u64>().ok()?
        };
        let value = if negative {
            0i64.checked_sub_unsigned(magnitude)?
        } else {
            i64::try_from(magnitude).ok()?
        };
        Some((value, end))
    }

    fn scan_identifier(&self, pos: usize) -> Option<(&'a str, usize)> {
        if !self.at(pos).map_or(false, is_ident_start) {
            return None;
        }
        let mut end = pos + 1;
        while self.at(end).map_or(false, is_ident_char) {
            end += 1;
        }
        Some((&self.input[pos..end], end))
    }

    fn parse_argument(&self, pos: usize) -> Result<(Argument, usize), usize> {
        let mut arg = Argument::default();
        let mut cur = pos;

        // size prefix, only when followed by '@'
        if let Some((size, end)) = self.scan_number(cur) {
            if self.at(end) == Some(b'@') {
                if !VALID_SIZES.contains(&size.unsigned_abs()) {
                    return Err(cur);
                }
                arg.arg_size = i32::try_from(size).ok();
                cur = end + 1;
            }
        }

        let end = match self.arch.memory_operand() {
            MemoryOperand::Parenthesized => self.parse_att_expr(cur, &mut arg)?,
            MemoryOperand::Bracketed => self.parse_bracketed_expr(cur, &mut arg)?,
        };

        match self.at(end) {
            None => {}
            Some(b) if b.is_ascii_whitespace() => {}
            Some(_) => return Err(end),
        }
        if arg.arg_size.is_none() {
            arg.arg_size = Some(self.arch.pointer_size());
        }
        Ok((arg, end))
    }

    /// Register name at `pos`, including the sigil if the syntax has one.
    fn parse_register(&self, pos: usize, arg: &mut Argument) -> Result<usize, usize> {
        let mut cur = pos;
        if let Some(sigil) = self.arch.register_sigil() {
            cur = self.expect(cur, sigil)?;
        }
        let start = cur;
        while self.at(cur).map_or(false, |b| b.is_ascii_alphanumeric()) {
            cur += 1;
        }
        let reg = self
            .arch
            .normalize_register(&self.input[start..cur])
            .ok_or(pos)?;
        arg.register_name = Some(reg.name.to_owned());
        arg.register_size = Some(reg.size);
        Ok(cur)
    }

    fn parse_att_expr(&self, pos: usize, arg: &mut Argument) -> Result<usize, usize> {
        match self.at(pos) {
            Some(b) if Some(b) == self.arch.constant_sigil() => {
                let (value, end) = self.scan_number(pos + 1).ok_or(pos + 1)?;
                arg.constant = Some(value);
                Ok(end)
            }
            Some(b'%') => {
                let end = self.parse_register(pos, arg)?;
                arg.apply_register_size();
                Ok(end)
            }
            Some(b'(') => {
                arg.deref_offset = Some(0);
                self.parse_att_base(pos, arg)
            }
            Some(b) if is_ident_start(b) => self.parse_att_global(pos, 0, arg),
            Some(_) => {
                let (offset, end) = self.scan_number(pos).ok_or(pos)?;
                match self.at(end) {
                    Some(b'(') => {
                        arg.deref_offset = Some(offset);
                        self.parse_att_base(end, arg)
                    }
                    Some(b'+') if self.at(end + 1).map_or(false, is_ident_start) => {
                        self.parse_att_global(end + 1, offset, arg)
                    }
                    _ => Err(end),
                }
            }
            None => Err(pos),
        }
    }

    /// `ident [('+'|'-') number] ['@' mode] '(' reg ')'`
    fn parse_att_global(&self, pos: usize, leading: i64, arg: &mut Argument) -> Result<usize, usize> {
        let (ident, mut cur) = self.scan_identifier(pos).ok_or(pos)?;
        let mut offset = leading;
        if matches!(self.at(cur), Some(b'+') | Some(b'-')) {
            let (n, end) = self.scan_number(cur).ok_or(cur)?;
            offset = offset.wrapping_add(n);
            cur = end;
        }
        if self.at(cur) == Some(b'@') {
            // relocation flavour such as GOTPCREL; the address is resolved the same way
            let (_, end) = self.scan_identifier(cur + 1).ok_or(cur + 1)?;
            cur = end;
        }
        arg.deref_ident = Some(ident.to_owned());
        if offset != 0 {
            arg.deref_offset = Some(offset);
        }
        self.parse_att_base(cur, arg)
    }

    /// `'(' reg ')'`
    fn parse_att_base(&self, pos: usize, arg: &mut Argument) -> Result<usize, usize> {
        let cur = self.expect(pos, b'(')?;
        let cur = self.parse_register(cur, arg)?;
        self.expect(cur, b')')
    }

    fn parse_bracketed_expr(&self, pos: usize, arg: &mut Argument) -> Result<usize, usize> {
        match self.at(pos) {
            Some(b'[') => {
                let cur = self.skip_spaces_from(pos + 1);
                let mut cur = self.parse_register(cur, arg)?;
                cur = self.skip_spaces_from(cur);
                let mut offset = 0;
                if self.at(cur) == Some(b',') {
                    cur = self.skip_spaces_from(cur + 1);
                    if self.at(cur) == Some(b'#') {
                        cur += 1;
                    }
                    let (n, end) = self.scan_number(cur).ok_or(cur)?;
                    offset = n;
                    cur = self.skip_spaces_from(end);
                }
                arg.deref_offset = Some(offset);
                self.expect(cur, b']')
            }
            Some(b) if b.is_ascii_alphabetic() => {
                let end = self.parse_register(pos, arg)?;
                arg.apply_register_size();
                Ok(end)
            }
            Some(b) => {
                let start = if Some(b) == self.arch.constant_sigil() { pos + 1 } else { pos };
                let (value, end) = self.scan_number(start).ok_or(start)?;
                arg.constant = Some(value);
                Ok(end)
            }
            None => Err(pos),
        }
    }
}

/// Parses a whole descriptor string, stopping at the first malformed token.
pub fn parse_all(arch: Arch, input: &str) -> Result<Vec<Argument>, ParseError> {
    let mut parser = OperandParser::new(arch, input);
    let mut args = Vec::new();
    while !parser.done() {
        args.push(parser.parse()?);
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(arch: Arch, input: &str) -> Argument {
        let mut p = OperandParser::new(arch, input);
        let arg = p.parse().unwrap();
        assert!(p.done(), "{input} not fully consumed");
        arg
    }

    #[test]
    fn x86_constant() {
        let arg = one(Arch::X86_64, "4@$5");
        assert_eq!(arg.arg_size, Some(4));
        assert_eq!(arg.constant, Some(5));
        assert!(arg.register_name.is_none());

        assert_eq!(one(Arch::X86_64, "-8@$-0x10").constant, Some(-16));
        assert_eq!(one(Arch::X86_64, "$42").arg_size(), 8);
    }

    #[test]
    fn x86_register_width_defaults_size() {
        let arg = one(Arch::X86_64, "%edi");
        assert_eq!(arg.register_name.as_deref(), Some("di"));
        assert_eq!(arg.arg_size, Some(4));

        let arg = one(Arch::X86_64, "-2@%ax");
        assert_eq!(arg.arg_size, Some(-2));
        assert_eq!(arg.register_name.as_deref(), Some("ax"));
    }

    #[test]
    fn x86_deref() {
        let arg = one(Arch::X86_64, "8@-16(%rbp)");
        assert_eq!(arg.deref_offset, Some(-16));
        assert_eq!(arg.register_name.as_deref(), Some("bp"));
        assert_eq!(arg.arg_size, Some(8));

        let arg = one(Arch::X86_64, "(%rsp)");
        assert_eq!(arg.deref_offset, Some(0));
        assert_eq!(arg.arg_size(), 8);

        let arg = one(Arch::X86_64, "-4@0x18(%r12)");
        assert_eq!(arg.deref_offset, Some(0x18));
        assert_eq!(arg.register_name.as_deref(), Some("r12"));
    }

    #[test]
    fn x86_globals() {
        let arg = one(Arch::X86_64, "4@counter(%rip)");
        assert_eq!(arg.deref_ident.as_deref(), Some("counter"));
        assert_eq!(arg.register_name.as_deref(), Some("ip"));
        assert_eq!(arg.deref_offset, None);

        let arg = one(Arch::X86_64, "8@table+16(%rip)");
        assert_eq!(arg.deref_ident.as_deref(), Some("table"));
        assert_eq!(arg.deref_offset, Some(16));

        let arg = one(Arch::X86_64, "8@4+table-2@GOTPCREL(%rip)");
        assert_eq!(arg.deref_ident.as_deref(), Some("table"));
        assert_eq!(arg.deref_offset, Some(2));
    }

    #[test]
    fn x86_sequence() {
        let args = parse_all(Arch::X86_64, "-4@%edi 8@%rsi  8@-8(%rbp) -1@$3").unwrap();
        assert_eq!(args.len(), 4);
        assert_eq!(args[0].ctype(), "int32_t");
        assert_eq!(args[1].ctype(), "uint64_t");
        assert_eq!(args[3].ctype(), "int8_t");
        assert!(parse_all(Arch::X86_64, "").unwrap().is_empty());
        assert!(parse_all(Arch::X86_64, "   ").unwrap().is_empty());
    }

    #[test]
    fn aarch64_forms() {
        let arg = one(Arch::Aarch64, "-4@w1");
        assert_eq!(arg.register_name.as_deref(), Some("regs[1]"));
        assert_eq!(arg.arg_size, Some(-4));

        let arg = one(Arch::Aarch64, "x19");
        assert_eq!(arg.arg_size, Some(8));

        let arg = one(Arch::Aarch64, "8@[sp, 16]");
        assert_eq!(arg.register_name.as_deref(), Some("sp"));
        assert_eq!(arg.deref_offset, Some(16));

        let arg = one(Arch::Aarch64, "4@[x0]");
        assert_eq!(arg.deref_offset, Some(0));

        let arg = one(Arch::Aarch64, "8@[x2, #-8]");
        assert_eq!(arg.deref_offset, Some(-8));

        assert_eq!(one(Arch::Aarch64, "4@-5").constant, Some(-5));
    }

    #[test]
    fn malformed_input_reports_position() {
        let mut p = OperandParser::new(Arch::X86_64, "8@%rdi 4@%bogus 8@%rsi");
        assert!(p.parse().is_ok());
        let err = p.parse().unwrap_err();
        assert_eq!(err.position, 9);
        assert!(p.done());
        assert_eq!(p.parse().unwrap_err().position, 9);
        assert!(err.marker().ends_with("\n         ^"));
    }

    #[test]
    fn rejects_bad_tokens() {
        for input in ["3@%rax", "8@", "8@%rax)", "8@-16(%rbp", "8@5", "8@(rbp)", "8@%rax,"] {
            assert!(parse_all(Arch::X86_64, input).is_err(), "{input}");
        }
        for input in ["8@[x0", "8@[x0, ]", "8@%x0", "8@[q0]"] {
            assert!(parse_all(Arch::Aarch64, input).is_err(), "{input}");
        }
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        for arch in [Arch::X86_64, Arch::Aarch64] {
            for input in [
                "-9223372036854775808@x0",
                "18446744073709551615@x0",
                "99999999999999999999@x0",
                "4294967300@x0",
            ] {
                let input = match arch {
                    Arch::X86_64 => input.replace("x0", "%rax"),
                    Arch::Aarch64 => input.to_owned(),
                };
                let err = parse_all(arch, &input).unwrap_err();
                assert_eq!(err.position, 0, "{input}");
            }
        }
        assert!(parse_all(Arch::X86_64, "8@$18446744073709551615").is_err());
        assert_eq!(one(Arch::X86_64, "8@$-9223372036854775808").constant, Some(i64::MIN));
    }

    #[test]
    fn unsized_arguments_take_pointer_width() {
        for (arch, input) in [(Arch::X86_64, "-16(%rbp)"), (Arch::Aarch64, "[sp, 8]"), (Arch::Aarch64, "7")] {
            assert_eq!(one(arch, input).arg_size, Some(arch.pointer_size()), "{input}");
        }
        assert_eq!(one(Arch::Aarch64, "-4@-5").constant, Some(-5));
    }

    #[test]
    fn parse_terminates_on_any_input() {
        for input in ["@@@@", "%%%%", "((((", "8@8@8@", "\u{e9}\u{e9}"] {
            let mut p = OperandParser::new(Arch::X86_64, input);
            let mut rounds = 0;
            while !p.done() {
                let _ = p.parse();
                rounds += 1;
                assert!(rounds < 16);
            }
        }
    }
}
