//! Array operators, including the `]` and `}` composite builders the
//! scanner's mark tokens resolve to.

use crate::context::Context;
use postforge_core::{
    Access, Attrib, ErrorKind, MarkKind, Object, PsResult, Value,
};

/// int `array` array — n nulls.
pub fn array(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_int(0)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    let obj = ctx.new_array(vec![Object::null(); n as usize]);
    ctx.push(obj)
}

/// Collect operand-stack objects down to the matching mark into a vec
/// (bottom-first). Returns `None` when no such mark exists.
pub fn collect_to_mark(ctx: &mut Context, kind: MarkKind) -> Option<Vec<Object>> {
    let pos = ctx
        .o_stack
        .iter()
        .rposition(|o| matches!(o.value, Value::Mark(k) if k == kind))?;
    let elems = ctx.o_stack.split_off(pos + 1);
    ctx.o_stack.pop(); // the mark
    Some(elems)
}

/// mark obj0 … objn-1 `]` array
pub fn array_close(ctx: &mut Context) -> PsResult<()> {
    let elems = collect_to_mark(ctx, MarkKind::Bracket).ok_or(ErrorKind::UnmatchedMark)?;
    let obj = ctx.new_array(elems);
    ctx.push(obj)
}

/// mark obj0 … objn-1 `}` proc — executable, packed under `setpacking`.
pub fn proc_close(ctx: &mut Context) -> PsResult<()> {
    let elems = collect_to_mark(ctx, MarkKind::Brace).ok_or(ErrorKind::UnmatchedMark)?;
    let r = ctx.memory.alloc_array(ctx.alloc_space(), elems);
    let obj = if ctx.packing {
        Object::new(Value::PackedArray(r))
            .executable()
            .with_access(Access::ReadOnly)
    } else {
        Object::new(Value::Array(r)).executable()
    };
    ctx.push(obj)
}

/// array `aload` a0 … an-1 array
pub fn aload(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_array(0)?;
    let obj = *ctx.peek(0)?;
    ctx.require_access(&obj, Access::ReadOnly)?;
    ctx.reserve(r.len)?;
    ctx.pop()?;
    for i in 0..r.len {
        let elem = ctx.memory.array_get(r, i)?;
        ctx.push(elem)?;
    }
    ctx.push(obj)
}

/// any0 … anyn-1 array `astore` array
pub fn astore(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let r = match obj.value {
        Value::Array(r) => r,
        Value::PackedArray(_) => return Err(ErrorKind::InvalidAccess.into()),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.require_access(&obj, Access::Unlimited)?;
    ctx.need(r.len + 1)?;
    ctx.pop()?;
    let base = ctx.o_stack.len() - r.len;
    let elems = ctx.o_stack.split_off(base);
    ctx.memory.array_put_interval(r, 0, elems)?;
    ctx.push(obj)
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "array", array);
    super::define_op(ctx, "]", array_close);
    super::define_op(ctx, "}", proc_close);
    super::define_op(ctx, "aload", aload);
    super::define_op(ctx, "astore", astore);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_syntax_builds_literal_array() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[1 2 3]").unwrap();
        let obj = ctx.pop().unwrap();
        let r = obj.as_array().unwrap();
        assert_eq!(obj.attrib, Attrib::Literal);
        assert_eq!(r.len, 3);
        assert_eq!(ctx.memory.array_get(r, 1).unwrap(), Object::integer(2));
    }

    #[test]
    fn brace_syntax_builds_executable_array() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{1 2 add}").unwrap();
        let obj = ctx.pop().unwrap();
        assert_eq!(obj.attrib, Attrib::Executable);
        assert_eq!(obj.as_array().unwrap().len, 3);
    }

    #[test]
    fn nested_procs_stay_data() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ {1} } exec").unwrap();
        // Executing the outer proc pushes the inner proc as data.
        let inner = ctx.pop().unwrap();
        assert_eq!(inner.attrib, Attrib::Executable);
        assert_eq!(inner.as_array().unwrap().len, 1);
    }

    #[test]
    fn aload_spreads_then_pushes_array() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[10 20] aload").unwrap();
        let arr = ctx.pop().unwrap();
        assert!(arr.as_array().is_some());
        assert_eq!(ctx.pop().unwrap().as_int(), Some(20));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(10));
    }

    #[test]
    fn astore_collects_from_stack() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"7 8 9 3 array astore").unwrap();
        let obj = ctx.pop().unwrap();
        let r = obj.as_array().unwrap();
        assert_eq!(ctx.memory.array_get(r, 0).unwrap(), Object::integer(7));
        assert_eq!(ctx.memory.array_get(r, 2).unwrap(), Object::integer(9));
        assert!(ctx.o_stack.is_empty());
    }

    #[test]
    fn unmatched_bracket_raises() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ ] } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
