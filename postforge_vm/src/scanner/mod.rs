//! The PostScript tokenizer.
//!
//! One call to [`scan_token`] extracts the next object from a byte source
//! (a file or an executable string) and pushes it onto the operand stack;
//! the caller decides whether to hand it to `exec`. `{` and `<<` emit mark
//! tokens, `}`, `]`, and `>>` emit executable names whose systemdict
//! bindings assemble the composite — procedure bodies defer execution via
//! the context's `proc_count`.

pub mod binary;
pub mod number;
pub mod strings;

use crate::context::Context;
use crate::dict_stack;
use postforge_core::{
    Attrib, Error, ErrorKind, FileId, MarkKind, Name, Object, PsResult, StringRef, Value,
};

// Character classes (PLRM Table 3.1).
pub const NUL: u8 = 0;
pub const TAB: u8 = 9;
pub const LINE_FEED: u8 = 10;
pub const FORM_FEED: u8 = 12;
pub const RETURN: u8 = 13;
pub const SPACE: u8 = 32;

#[inline]
pub fn is_whitespace(b: u8) -> bool {
    matches!(b, NUL | TAB | LINE_FEED | FORM_FEED | RETURN | SPACE)
}

#[inline]
pub fn is_newline(b: u8) -> bool {
    matches!(b, LINE_FEED | FORM_FEED | RETURN)
}

/// Self-delimiting characters: `( ) < > [ ] { } / %`.
#[inline]
pub fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

#[inline]
pub fn is_binary_prefix(b: u8) -> bool {
    (128..=159).contains(&b)
}

/// Where the scanner reads from.
pub enum ScanSource {
    File(FileId),
    /// An executable string; `pos` is the relative read position so the
    /// caller can advance the string object by the bytes consumed.
    Str { sref: StringRef, pos: usize },
}

impl ScanSource {
    /// Bytes consumed so far (string sources only).
    pub fn consumed(&self) -> usize {
        match self {
            ScanSource::Str { pos, .. } => *pos,
            ScanSource::File(_) => 0,
        }
    }
}

/// Result of one scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Source exhausted; nothing was pushed.
    Eof,
    /// A token was pushed onto the operand stack.
    Token {
        /// Whether the engine should hand the token to `exec` (false for
        /// immediately-evaluated `//name` substitutions).
        do_exec: bool,
    },
}

pub fn read_byte(ctx: &mut Context, src: &mut ScanSource) -> PsResult<Option<u8>> {
    match src {
        ScanSource::File(id) => ctx.files.get(*id)?.read_byte(),
        ScanSource::Str { sref, pos } => {
            if *pos >= sref.len {
                return Ok(None);
            }
            // A job-boundary restore may have reclaimed the backing slot
            // out from under a partially consumed program string; that
            // reads as end-of-source.
            match ctx.memory.string_get(*sref, *pos) {
                Ok(b) => {
                    *pos += 1;
                    Ok(Some(b))
                }
                Err(_) => Ok(None),
            }
        }
    }
}

pub fn unread_byte(ctx: &mut Context, src: &mut ScanSource, byte: u8) -> PsResult<()> {
    match src {
        ScanSource::File(id) => {
            ctx.files.get(*id)?.unread(byte);
        }
        ScanSource::Str { pos, .. } => {
            *pos = pos.saturating_sub(1);
        }
    }
    Ok(())
}

/// CR, LF, FF, and CR LF each count as one newline (PLRM 3.2.2).
pub(crate) fn handle_newline(ctx: &mut Context, src: &mut ScanSource, b: u8) -> PsResult<()> {
    if let ScanSource::File(id) = src {
        ctx.files.get(*id)?.line_num += 1;
    }
    if b == RETURN {
        if let Some(next) = read_byte(ctx, src)? {
            if next != LINE_FEED {
                unread_byte(ctx, src, next)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn syntax_error(ctx: &mut Context, src: &mut ScanSource, diag: &str) -> Error {
    // An unterminated construct poisons the stream: close files, abandon
    // deferred procedure bodies.
    if let ScanSource::File(id) = src {
        ctx.files.close(*id);
    }
    ctx.proc_count = 0;
    Error::new(ErrorKind::SyntaxError, Name::from_str(diag))
}

/// Scan one token from `src`, pushing it onto the operand stack.
///
/// `from_exec` marks engine-driven scans (the source sits on the execution
/// stack); only those participate in `{ … }` deferral bookkeeping.
pub fn scan_token(
    ctx: &mut Context,
    src: &mut ScanSource,
    from_exec: bool,
) -> PsResult<ScanOutcome> {
    loop {
        let mut b = match read_byte(ctx, src)? {
            Some(b) => b,
            None => return Ok(ScanOutcome::Eof),
        };

        // Skip whitespace and stray control bytes below the printable
        // range (binary-token prefixes are above it).
        while is_whitespace(b) || b < 32 {
            if is_newline(b) {
                handle_newline(ctx, src, b)?;
            }
            b = match read_byte(ctx, src)? {
                Some(b) => b,
                None => return Ok(ScanOutcome::Eof),
            };
        }

        if is_binary_prefix(b) {
            return binary::scan_binary_token(ctx, src, b);
        }

        match b {
            b'(' => return strings::scan_literal_string(ctx, src),
            b')' => return Err(syntax_error(ctx, src, "unbalanced )")),
            b'/' => return scan_name_token(ctx, src),
            b'[' => {
                ctx.o_stack.push(Object::mark_of(MarkKind::Bracket));
                return Ok(ScanOutcome::Token { do_exec: true });
            }
            b']' => {
                ctx.o_stack.push(Object::executable_name(Name::new(b"]")));
                return Ok(ScanOutcome::Token { do_exec: true });
            }
            b'{' => {
                ctx.o_stack.push(Object::mark_of(MarkKind::Brace));
                if from_exec {
                    ctx.proc_count += 1;
                }
                return Ok(ScanOutcome::Token { do_exec: true });
            }
            b'}' => {
                ctx.o_stack.push(Object::executable_name(Name::new(b"}")));
                if from_exec {
                    ctx.proc_count = ctx.proc_count.saturating_sub(1);
                }
                return Ok(ScanOutcome::Token { do_exec: true });
            }
            b'<' => {
                let next = read_byte(ctx, src)?;
                match next {
                    None => return Err(syntax_error(ctx, src, "unbalanced <")),
                    Some(b'<') => {
                        ctx.o_stack.push(Object::mark_of(MarkKind::DictOpen));
                        return Ok(ScanOutcome::Token { do_exec: true });
                    }
                    Some(b'~') => return strings::scan_ascii85_string(ctx, src),
                    Some(other) => {
                        unread_byte(ctx, src, other)?;
                        return strings::scan_hex_string(ctx, src);
                    }
                }
            }
            b'>' => {
                match read_byte(ctx, src)? {
                    Some(b'>') => {
                        ctx.o_stack.push(Object::executable_name(Name::new(b">>")));
                        return Ok(ScanOutcome::Token { do_exec: true });
                    }
                    Some(other) => {
                        unread_byte(ctx, src, other)?;
                        return Err(syntax_error(ctx, src, "unexpected >"));
                    }
                    None => {
                        return Err(syntax_error(ctx, src, "unexpected >"));
                    }
                }
            }
            b'%' => {
                // Comment to end of line.
                loop {
                    match read_byte(ctx, src)? {
                        None => return Ok(ScanOutcome::Eof),
                        Some(c) if is_newline(c) => {
                            handle_newline(ctx, src, c)?;
                            break;
                        }
                        Some(_) => {}
                    }
                }
                continue;
            }
            _ => return number::scan_number_or_name(ctx, src, b),
        }
    }
}

/// `/name` literal and `//name` immediate tokens.
fn scan_name_token(ctx: &mut Context, src: &mut ScanSource) -> PsResult<ScanOutcome> {
    let mut data = Vec::new();
    let immediate = match read_byte(ctx, src)? {
        // A bare `/` at EOF is the valid empty literal name.
        None => {
            ctx.o_stack.push(Object::literal_name(Name::new(b"")));
            return Ok(ScanOutcome::Token { do_exec: true });
        }
        Some(b'/') => true,
        Some(other) => {
            unread_byte(ctx, src, other)?;
            false
        }
    };

    loop {
        match read_byte(ctx, src)? {
            None => break,
            Some(b) if is_whitespace(b) || is_delimiter(b) || is_binary_prefix(b) => {
                unread_byte(ctx, src, b)?;
                break;
            }
            Some(b) => data.push(b),
        }
    }

    let name = Name::new(&data);
    if immediate {
        // `//name` is substitution at scan time, not execution
        // (PLRM 3.12.2): the binding itself is emitted.
        match dict_stack::lookup_name(ctx, name) {
            Some(obj) => {
                ctx.o_stack.push(obj);
                Ok(ScanOutcome::Token { do_exec: false })
            }
            None => Err(Error::new(ErrorKind::Undefined, name)),
        }
    } else {
        ctx.o_stack.push(Object::literal_name(name));
        Ok(ScanOutcome::Token { do_exec: true })
    }
}
