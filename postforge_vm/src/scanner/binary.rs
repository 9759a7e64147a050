//! Binary tokens (PLRM 3.14.1, Table 3.2).
//!
//! Codes 128–131 introduce binary object sequences, 132–149 single binary
//! tokens, 150–159 are reserved. The common fixed-width number, boolean,
//! and string tokens are decoded; object sequences and the system name
//! table (which this interpreter does not ship) raise the PLRM errors.

use super::{ScanOutcome, ScanSource};
use crate::context::Context;
use postforge_core::{Error, ErrorKind, Name, Object, PsResult};

fn take(ctx: &mut Context, src: &mut ScanSource, n: usize) -> PsResult<Vec<u8>> {
    let mut bytes = Vec::with_capacity(n);
    for _ in 0..n {
        match super::read_byte(ctx, src)? {
            Some(b) => bytes.push(b),
            None => return Err(Error::new(ErrorKind::SyntaxError, Name::new(b"binary token"))),
        }
    }
    Ok(bytes)
}

pub fn scan_binary_token(
    ctx: &mut Context,
    src: &mut ScanSource,
    code: u8,
) -> PsResult<ScanOutcome> {
    let obj = match code {
        // Binary object sequences need the full object-format machinery;
        // they are rejected like any other unsupported stream content.
        128..=131 => {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                Name::new(b"binary object sequence"),
            ))
        }
        // 32-bit integer, high/low byte order.
        132 | 133 => {
            let b = take(ctx, src, 4)?;
            let raw = [b[0], b[1], b[2], b[3]];
            let v = if code == 132 {
                i32::from_be_bytes(raw)
            } else {
                i32::from_le_bytes(raw)
            };
            Object::integer(v)
        }
        // 16-bit integer, high/low byte order.
        134 | 135 => {
            let b = take(ctx, src, 2)?;
            let raw = [b[0], b[1]];
            let v = if code == 134 {
                i16::from_be_bytes(raw)
            } else {
                i16::from_le_bytes(raw)
            };
            Object::integer(v as i32)
        }
        // 8-bit integer.
        136 => {
            let b = take(ctx, src, 1)?;
            Object::integer(b[0] as i8 as i32)
        }
        // 16/32-bit fixed point: one scale byte then a 32-bit mantissa.
        137 => {
            let b = take(ctx, src, 5)?;
            let scale = b[0] & 0x7F;
            let raw = [b[1], b[2], b[3], b[4]];
            let mantissa = if b[0] & 0x80 == 0 {
                i32::from_be_bytes(raw)
            } else {
                i32::from_le_bytes(raw)
            };
            Object::real(mantissa as f64 / f64::from(1u32 << scale.min(31)))
        }
        // 32-bit IEEE real, high/low byte order.
        138 | 139 => {
            let b = take(ctx, src, 4)?;
            let raw = [b[0], b[1], b[2], b[3]];
            let v = if code == 138 {
                f32::from_be_bytes(raw)
            } else {
                f32::from_le_bytes(raw)
            };
            Object::real(v as f64)
        }
        // Native real.
        140 => {
            let b = take(ctx, src, 4)?;
            Object::real(f32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f64)
        }
        // Boolean.
        141 => {
            let b = take(ctx, src, 1)?;
            Object::boolean(b[0] != 0)
        }
        // String: 8-bit length, then 16-bit high/low lengths.
        142 => {
            let len = take(ctx, src, 1)?[0] as usize;
            let bytes = take(ctx, src, len)?;
            ctx.new_string(bytes)
        }
        143 | 144 => {
            let b = take(ctx, src, 2)?;
            let len = if code == 143 {
                u16::from_be_bytes([b[0], b[1]])
            } else {
                u16::from_le_bytes([b[0], b[1]])
            } as usize;
            let bytes = take(ctx, src, len)?;
            ctx.new_string(bytes)
        }
        // System and user name indices: no name table is configured.
        145 | 146 => {
            return Err(Error::new(
                ErrorKind::Undefined,
                Name::new(b"binary name index"),
            ))
        }
        // Homogeneous number arrays and the reserved range.
        _ => {
            return Err(Error::new(
                ErrorKind::SyntaxError,
                Name::new(b"binary token"),
            ))
        }
    };
    ctx.o_stack.push(obj);
    Ok(ScanOutcome::Token { do_exec: true })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::scanner::{scan_token, ScanOutcome};

    fn scan_bytes(ctx: &mut Context, bytes: &[u8]) -> Object {
        let obj = ctx.new_string(bytes.to_vec());
        let sref = obj.as_string().unwrap();
        let mut src = ScanSource::Str { sref, pos: 0 };
        let out = scan_token(ctx, &mut src, false).unwrap();
        assert!(matches!(out, ScanOutcome::Token { .. }));
        ctx.pop().unwrap()
    }

    #[test]
    fn int32_both_byte_orders() {
        let mut ctx = Context::new();
        assert_eq!(
            scan_bytes(&mut ctx, &[132, 0, 0, 1, 0]),
            Object::integer(256)
        );
        assert_eq!(
            scan_bytes(&mut ctx, &[133, 0, 1, 0, 0]),
            Object::integer(256)
        );
    }

    #[test]
    fn real32_decodes() {
        let mut ctx = Context::new();
        let bits = 1.5f32.to_be_bytes();
        let tok = scan_bytes(&mut ctx, &[138, bits[0], bits[1], bits[2], bits[3]]);
        assert_eq!(tok, Object::real(1.5));
    }

    #[test]
    fn short_string_token() {
        let mut ctx = Context::new();
        let tok = scan_bytes(&mut ctx, &[142, 2, b'h', b'i']);
        let sref = tok.as_string().unwrap();
        assert_eq!(ctx.memory.string(sref).unwrap(), b"hi");
    }

    #[test]
    fn reserved_codes_are_syntaxerror() {
        let mut ctx = Context::new();
        let obj = ctx.new_string(vec![155]);
        let sref = obj.as_string().unwrap();
        let mut src = ScanSource::Str { sref, pos: 0 };
        let err = scan_token(&mut ctx, &mut src, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }
}
