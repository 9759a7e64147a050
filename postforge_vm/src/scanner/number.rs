//! Number and executable-name token scanning.
//!
//! A regular-character run is tried as a decimal integer, then a real,
//! then a radix literal `base#digits`; anything else is an executable
//! name. Integer literals past the 32-bit range promote to reals at the
//! exact PLRM boundary; radix literals wrap as unsigned twos-complement.

use super::{is_binary_prefix, is_delimiter, is_newline, is_whitespace, ScanOutcome, ScanSource};
use crate::context::Context;
use postforge_core::{Error, ErrorKind, Name, Object, PsResult};

pub fn scan_number_or_name(
    ctx: &mut Context,
    src: &mut ScanSource,
    first: u8,
) -> PsResult<ScanOutcome> {
    let mut data = vec![first];
    loop {
        match super::read_byte(ctx, src)? {
            None => break,
            Some(b) if is_whitespace(b) => {
                if is_newline(b) {
                    super::handle_newline(ctx, src, b)?;
                }
                break;
            }
            Some(b) if is_delimiter(b) || is_binary_prefix(b) => {
                super::unread_byte(ctx, src, b)?;
                break;
            }
            Some(b) => data.push(b),
        }
    }

    let token = parse_numeric(&data);
    match token {
        Ok(Some(obj)) => {
            ctx.o_stack.push(obj);
            Ok(ScanOutcome::Token { do_exec: true })
        }
        Ok(None) => {
            ctx.o_stack.push(Object::executable_name(Name::new(&data)));
            Ok(ScanOutcome::Token { do_exec: true })
        }
        Err(kind) => Err(Error::new(kind, Name::new(&data))),
    }
}

/// `Ok(Some)` for a numeric token, `Ok(None)` for a name, `Err` for a
/// malformed radix literal or an overflowing real.
pub fn parse_numeric(data: &[u8]) -> Result<Option<Object>, ErrorKind> {
    let text = match std::str::from_utf8(data) {
        Ok(t) => t,
        Err(_) => return Ok(None),
    };

    if let Ok(i) = text.parse::<i64>() {
        // PLRM: an integer literal beyond the implementation limit is
        // converted to a real object.
        return Ok(Some(if i < i32::MIN as i64 || i > i32::MAX as i64 {
            Object::real(i as f64)
        } else {
            Object::integer(i as i32)
        }));
    }

    if looks_like_real(text) {
        if let Ok(r) = text.parse::<f64>() {
            if r.is_infinite() {
                return Err(ErrorKind::LimitCheck);
            }
            return Ok(Some(Object::real(r)));
        }
    }

    if let Some(hash) = text.find('#') {
        let (base_text, digits) = text.split_at(hash);
        let digits = &digits[1..];
        // Only a numeric base makes this a radix literal; names may
        // legitimately contain `#`.
        if let Ok(base) = base_text.parse::<i64>() {
            if !(2..=36).contains(&base) {
                return Err(ErrorKind::SyntaxError);
            }
            match u64::from_str_radix(digits, base as u32) {
                Ok(value) => {
                    if value > 0xFFFF_FFFF {
                        return Err(ErrorKind::LimitCheck);
                    }
                    // Unsigned digits reinterpreted as twos-complement.
                    return Ok(Some(Object::integer(value as u32 as i32)));
                }
                Err(_) => return Err(ErrorKind::SyntaxError),
            }
        }
    }

    Ok(None)
}

/// Shapes `str::parse::<f64>` accepts that PostScript does too: digits
/// with a decimal point and/or exponent. Leading/trailing dot forms
/// (`.5`, `6.`) are valid.
fn looks_like_real(text: &str) -> bool {
    let mut digits = false;
    let mut dot_or_exp = false;
    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => digits = true,
            '+' | '-' => {
                let prev = text.as_bytes().get(i.wrapping_sub(1));
                if i != 0 && prev != Some(&b'e') && prev != Some(&b'E') {
                    return false;
                }
            }
            '.' => dot_or_exp = true,
            'e' | 'E' => {
                if !digits && !dot_or_exp {
                    return false;
                }
                dot_or_exp = true;
            }
            _ => return false,
        }
    }
    digits && dot_or_exp
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_integers() {
        assert_eq!(parse_numeric(b"42").unwrap(), Some(Object::integer(42)));
        assert_eq!(parse_numeric(b"-7").unwrap(), Some(Object::integer(-7)));
        assert_eq!(parse_numeric(b"+7").unwrap(), Some(Object::integer(7)));
    }

    #[test]
    fn overflow_promotes_exactly_at_boundary() {
        assert_eq!(
            parse_numeric(b"2147483647").unwrap(),
            Some(Object::integer(2147483647))
        );
        assert_eq!(
            parse_numeric(b"2147483648").unwrap(),
            Some(Object::real(2147483648.0))
        );
        assert_eq!(
            parse_numeric(b"-2147483648").unwrap(),
            Some(Object::integer(-2147483648))
        );
        assert_eq!(
            parse_numeric(b"-2147483649").unwrap(),
            Some(Object::real(-2147483649.0))
        );
    }

    #[test]
    fn reals_and_scientific() {
        assert_eq!(parse_numeric(b".5").unwrap(), Some(Object::real(0.5)));
        assert_eq!(parse_numeric(b"6.").unwrap(), Some(Object::real(6.0)));
        assert_eq!(parse_numeric(b"1E-3").unwrap(), Some(Object::real(0.001)));
    }

    #[test]
    fn radix_twos_complement_wrap() {
        assert_eq!(
            parse_numeric(b"16#FFFFFFFF").unwrap(),
            Some(Object::integer(-1))
        );
        assert_eq!(parse_numeric(b"36#z").unwrap(), Some(Object::integer(35)));
    }

    #[test]
    fn bad_radix_is_syntaxerror() {
        assert_eq!(parse_numeric(b"1#0"), Err(ErrorKind::SyntaxError));
        assert_eq!(parse_numeric(b"8#99"), Err(ErrorKind::SyntaxError));
    }

    #[test]
    fn names_fall_through() {
        assert_eq!(parse_numeric(b"add").unwrap(), None);
        assert_eq!(parse_numeric(b"1e").unwrap(), None);
        // `#` inside a non-numeric base is a name, not a radix literal.
        assert_eq!(parse_numeric(b"@#x").unwrap(), None);
    }
}
