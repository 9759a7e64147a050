//! String token scanning: `(…)` literals, `<…>` hex, `<~…~>` ASCII85.

use super::{is_newline, syntax_error, ScanOutcome, ScanSource};
use crate::context::Context;
use postforge_core::PsResult;

/// `(...)` with nested-paren counting, backslash escapes, octal escapes,
/// and backslash-newline continuation (PLRM 3.2.2).
pub fn scan_literal_string(ctx: &mut Context, src: &mut ScanSource) -> PsResult<ScanOutcome> {
    let mut depth = 1u32;
    let mut data: Vec<u8> = Vec::new();

    while depth > 0 {
        let b = match super::read_byte(ctx, src)? {
            Some(b) => b,
            None => return Err(syntax_error(ctx, src, "unbalanced (")),
        };
        match b {
            b'(' => {
                depth += 1;
                data.push(b);
            }
            b')' => {
                depth -= 1;
                if depth > 0 {
                    data.push(b);
                }
            }
            b'\\' => {
                let esc = match super::read_byte(ctx, src)? {
                    Some(e) => e,
                    None => return Err(syntax_error(ctx, src, "unbalanced (")),
                };
                match esc {
                    b'n' => data.push(b'\n'),
                    b'r' => data.push(b'\r'),
                    b't' => data.push(b'\t'),
                    b'b' => data.push(8),
                    b'f' => data.push(12),
                    b'\\' | b'(' | b')' => data.push(esc),
                    b'0'..=b'7' => {
                        // Up to three octal digits; high-order overflow is
                        // ignored (masked to 8 bits).
                        let mut value = (esc - b'0') as u32;
                        for _ in 0..2 {
                            match super::read_byte(ctx, src)? {
                                Some(d @ b'0'..=b'7') => value = value * 8 + (d - b'0') as u32,
                                Some(other) => {
                                    super::unread_byte(ctx, src, other)?;
                                    break;
                                }
                                None => break,
                            }
                        }
                        data.push((value & 0xFF) as u8);
                    }
                    e if is_newline(e) => {
                        // Line continuation: both characters vanish.
                        super::handle_newline(ctx, src, e)?;
                    }
                    // Unknown escape: the backslash is dropped, the
                    // character stands.
                    other => data.push(other),
                }
            }
            _ => data.push(b),
        }
    }

    let obj = ctx.new_string(data);
    ctx.o_stack.push(obj);
    Ok(ScanOutcome::Token { do_exec: true })
}

/// `<…>` hex string; whitespace ignored, odd final digit padded with zero.
pub fn scan_hex_string(ctx: &mut Context, src: &mut ScanSource) -> PsResult<ScanOutcome> {
    let mut data: Vec<u8> = Vec::new();
    let mut pending: Option<u8> = None;

    loop {
        let b = match super::read_byte(ctx, src)? {
            Some(b) => b,
            None => return Err(syntax_error(ctx, src, "unbalanced <")),
        };
        if super::is_whitespace(b) {
            continue;
        }
        if b == b'>' {
            if let Some(hi) = pending {
                data.push(hi << 4);
            }
            break;
        }
        let digit = match hex_value(b) {
            Some(d) => d,
            None => return Err(syntax_error(ctx, src, "invalid hex digit")),
        };
        match pending.take() {
            Some(hi) => data.push((hi << 4) | digit),
            None => pending = Some(digit),
        }
    }

    let obj = ctx.new_string(data);
    ctx.o_stack.push(obj);
    Ok(ScanOutcome::Token { do_exec: true })
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// `<~…~>` ASCII85 (PLRM 3.2.2): base-85 5-tuples, `z` shorthand for four
/// zero bytes, partial final groups of 2–4 characters.
pub fn scan_ascii85_string(ctx: &mut Context, src: &mut ScanSource) -> PsResult<ScanOutcome> {
    let mut data: Vec<u8> = Vec::new();
    let mut group: Vec<u8> = Vec::with_capacity(5);

    loop {
        let b = match super::read_byte(ctx, src)? {
            Some(b) => b,
            None => return Err(syntax_error(ctx, src, "unbalanced <~")),
        };
        match b {
            b'~' => {
                match super::read_byte(ctx, src)? {
                    Some(b'>') => {
                        match group.len() {
                            0 => {}
                            1 => return Err(syntax_error(ctx, src, "ascii85 partial group")),
                            _ => {
                                if decode_group(&group, &mut data).is_err() {
                                    return Err(syntax_error(ctx, src, "ascii85 group"));
                                }
                            }
                        }
                        let obj = ctx.new_string(data);
                        ctx.o_stack.push(obj);
                        return Ok(ScanOutcome::Token { do_exec: true });
                    }
                    Some(other) => {
                        super::unread_byte(ctx, src, other)?;
                    }
                    None => return Err(syntax_error(ctx, src, "unbalanced <~")),
                }
            }
            b'z' => {
                if !group.is_empty() {
                    return Err(syntax_error(ctx, src, "ascii85 z inside group"));
                }
                data.extend_from_slice(&[0, 0, 0, 0]);
            }
            b'!'..=b'u' => {
                group.push(b - b'!');
                if group.len() == 5 {
                    if decode_group(&group, &mut data).is_err() {
                        return Err(syntax_error(ctx, src, "ascii85 group"));
                    }
                    group.clear();
                }
            }
            _ if super::is_whitespace(b) => {}
            _ => return Err(syntax_error(ctx, src, "invalid ascii85 character")),
        }
    }
}

/// Decode one 2–5 digit base-85 group into 1–4 bytes.
fn decode_group(group: &[u8], out: &mut Vec<u8>) -> Result<(), ()> {
    debug_assert!((2..=5).contains(&group.len()));
    let mut value: u64 = 0;
    // Pad with 'u' (84) to a full 5-tuple.
    for i in 0..5 {
        let digit = group.get(i).copied().unwrap_or(84) as u64;
        value = value * 85 + digit;
    }
    if value > u32::MAX as u64 {
        return Err(());
    }
    let bytes = (value as u32).to_be_bytes();
    out.extend_from_slice(&bytes[..group.len() - 1]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_decoding_matches_plrm() {
        let digits: Vec<u8> = b"87cUR".iter().map(|c| c - b'!').collect();
        let mut out = Vec::new();
        decode_group(&digits, &mut out).unwrap();
        assert_eq!(out, b"Hell");
    }

    #[test]
    fn partial_groups_shrink_output() {
        let digits: Vec<u8> = b"87c".iter().map(|c| c - b'!').collect();
        let mut out = Vec::new();
        decode_group(&digits, &mut out).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn hex_digit_classification() {
        assert_eq!(hex_value(b'0'), Some(0));
        assert_eq!(hex_value(b'f'), Some(15));
        assert_eq!(hex_value(b'F'), Some(15));
        assert_eq!(hex_value(b'g'), None);
    }
}
