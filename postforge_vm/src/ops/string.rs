//! String operators: allocation, search, and `token`.

use crate::context::Context;
use crate::scanner::{self, ScanOutcome, ScanSource};
use postforge_core::{
    Access, ErrorKind, MarkKind, Object, PsResult, StringRef, Value,
};

/// int `string` string — n zero bytes.
pub fn string(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_int(0)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    let obj = ctx.new_string(vec![0u8; n as usize]);
    ctx.push(obj)
}

/// string seek `anchorsearch` post match true | string false
pub fn anchorsearch(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let seek = ctx.peek_string(0)?;
    let hay = ctx.peek_string(1)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    ctx.require_access(ctx.peek(1)?, Access::ReadOnly)?;
    let hay_obj = *ctx.peek(1)?;
    let matches = {
        let seek_bytes = ctx.memory.string(seek)?;
        let hay_bytes = ctx.memory.string(hay)?;
        hay_bytes.starts_with(seek_bytes)
    };
    ctx.reserve(1)?;
    ctx.pop()?;
    ctx.pop()?;
    if matches {
        let m = Object {
            value: Value::String(StringRef {
                len: seek.len,
                ..hay
            }),
            ..hay_obj
        };
        let post = Object {
            value: Value::String(StringRef {
                start: hay.start + seek.len,
                len: hay.len - seek.len,
                ..hay
            }),
            ..hay_obj
        };
        ctx.push(post)?;
        ctx.push(m)?;
        ctx.push(Object::boolean(true))
    } else {
        ctx.push(hay_obj)?;
        ctx.push(Object::boolean(false))
    }
}

/// string seek `search` post match pre true | string false
pub fn search(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let seek = ctx.peek_string(0)?;
    let hay = ctx.peek_string(1)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    ctx.require_access(ctx.peek(1)?, Access::ReadOnly)?;
    let hay_obj = *ctx.peek(1)?;
    let found = {
        let seek_bytes = ctx.memory.string(seek)?.to_vec();
        let hay_bytes = ctx.memory.string(hay)?;
        if seek_bytes.is_empty() {
            Some(0)
        } else {
            hay_bytes
                .windows(seek_bytes.len())
                .position(|w| w == seek_bytes.as_slice())
        }
    };
    ctx.reserve(2)?;
    ctx.pop()?;
    ctx.pop()?;
    match found {
        Some(at) => {
            let slice = |start: usize, len: usize| Object {
                value: Value::String(StringRef {
                    start: hay.start + start,
                    len,
                    ..hay
                }),
                ..hay_obj
            };
            ctx.push(slice(at + seek.len, hay.len - at - seek.len))?;
            ctx.push(slice(at, seek.len))?;
            ctx.push(slice(0, at))?;
            ctx.push(Object::boolean(true))
        }
        None => {
            ctx.push(hay_obj)?;
            ctx.push(Object::boolean(false))
        }
    }
}

/// file|string `token` … — scan one complete object. Composite openers
/// keep scanning until the matching closer, so `token` always returns a
/// finished array, procedure, or dictionary.
pub fn token(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let source = *ctx.peek(0)?;
    ctx.require_access(&source, Access::ReadOnly)?;
    let mut src = match source.value {
        Value::String(sref) => ScanSource::Str { sref, pos: 0 },
        Value::File(id) => ScanSource::File(id),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };

    // Scan with the source still on the stack; a failed scan truncates
    // any partial tokens so the operand comes back intact.
    let base = ctx.o_stack.len();
    let produced = match scan_complete_object(ctx, &mut src) {
        Ok(p) => p,
        Err(e) => {
            ctx.o_stack.truncate(base);
            return Err(e);
        }
    };

    match produced {
        Some(obj) => {
            ctx.pop()?; // the source
            if let ScanSource::Str { sref, pos } = src {
                let consumed = pos.min(sref.len);
                let post = Object {
                    value: Value::String(StringRef {
                        start: sref.start + consumed,
                        len: sref.len - consumed,
                        ..sref
                    }),
                    ..source
                };
                ctx.push(post)?;
            }
            ctx.push(obj)?;
            ctx.push(Object::boolean(true))
        }
        None => {
            ctx.pop()?;
            ctx.push(Object::boolean(false))
        }
    }
}

/// Scan one object, recursing through `[`/`{`/`<<` so composites come
/// back whole. Returns `None` at end of source.
fn scan_complete_object(ctx: &mut Context, src: &mut ScanSource) -> PsResult<Option<Object>> {
    match scanner::scan_token(ctx, src, false)? {
        ScanOutcome::Eof => Ok(None),
        ScanOutcome::Token { .. } => {
            let tok = *ctx.peek(0)?;
            match tok.value {
                Value::Mark(kind) => {
                    ctx.pop()?;
                    scan_nested(ctx, src, kind).map(Some)
                }
                _ => Ok(Some(ctx.pop()?)),
            }
        }
    }
}

fn scan_nested(ctx: &mut Context, src: &mut ScanSource, kind: MarkKind) -> PsResult<Object> {
    ctx.push(Object::mark_of(kind))?;
    let closer: &[u8] = match kind {
        MarkKind::Bracket => b"]",
        MarkKind::Brace => b"}",
        MarkKind::DictOpen => b">>",
    };
    loop {
        match scanner::scan_token(ctx, src, false)? {
            ScanOutcome::Eof => return Err(ErrorKind::SyntaxError.into()),
            ScanOutcome::Token { .. } => {
                let inner = *ctx.peek(0)?;
                if let Value::Name(n) = inner.value {
                    if inner.is_executable() && n.as_bytes() == closer {
                        ctx.pop()?;
                        match kind {
                            MarkKind::Bracket => super::array::array_close(ctx)?,
                            MarkKind::Brace => super::array::proc_close(ctx)?,
                            MarkKind::DictOpen => super::dict::dict_close(ctx)?,
                        }
                        return ctx.pop();
                    }
                }
                if let Value::Mark(inner_kind) = inner.value {
                    ctx.pop()?;
                    let nested = scan_nested(ctx, src, inner_kind)?;
                    ctx.push(nested)?;
                }
            }
        }
    }
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "string", string);
    super::define_op(ctx, "anchorsearch", anchorsearch);
    super::define_op(ctx, "search", search);
    super::define_op(ctx, "token", token);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_of(ctx: &Context, obj: &Object) -> Vec<u8> {
        ctx.memory.string_vec(obj.as_string().unwrap()).unwrap()
    }

    #[test]
    fn search_splits_three_ways() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(abcdef) (cd) search").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        let pre = ctx.pop().unwrap();
        let m = ctx.pop().unwrap();
        let post = ctx.pop().unwrap();
        assert_eq!(string_of(&ctx, &pre), b"ab");
        assert_eq!(string_of(&ctx, &m), b"cd");
        assert_eq!(string_of(&ctx, &post), b"ef");
    }

    #[test]
    fn search_miss_returns_original() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(abc) (xy) search").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        let original = ctx.pop().unwrap();
        assert_eq!(string_of(&ctx, &original), b"abc");
    }

    #[test]
    fn anchorsearch_only_matches_prefix() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(abc) (ab) anchorsearch").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        let matched = ctx.pop().unwrap();
        let post = ctx.pop().unwrap();
        assert_eq!(string_of(&ctx, &matched), b"ab");
        assert_eq!(string_of(&ctx, &post), b"c");

        ctx.run_bytes(b"(abc) (bc) anchorsearch").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn token_scans_simple_values() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(15 (St1)) token").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(15));
        // token consumed the terminating whitespace along with the
        // number.
        let post = ctx.pop().unwrap();
        assert_eq!(string_of(&ctx, &post), b"(St1)");
    }

    #[test]
    fn token_assembles_whole_procedures() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"({1 2 add} rest) token").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        let proc = ctx.pop().unwrap();
        assert!(proc.is_executable());
        assert_eq!(proc.as_array().unwrap().len, 3);
        let post = ctx.pop().unwrap();
        assert_eq!(string_of(&ctx, &post), b" rest");
    }

    #[test]
    fn token_on_exhausted_string_is_false() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(   ) token").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        assert!(ctx.o_stack.is_empty());
    }
}
