//! Relational, boolean, and bitwise operators.

use crate::context::Context;
use postforge_core::{Access, ErrorKind, Object, PsResult, Value};
use std::cmp::Ordering;

/// `eq` semantics (PLRM 3.3.1): numbers compare numerically, strings by
/// content, strings and names across types by content, composites by
/// shared value identity.
pub fn objects_equal(ctx: &Context, a: &Object, b: &Object) -> bool {
    match (a.value, b.value) {
        (Value::Integer(_) | Value::Real(_), Value::Integer(_) | Value::Real(_)) => {
            a.number() == b.number()
        }
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::Null, Value::Null) => true,
        (Value::Mark(_), Value::Mark(_)) => true,
        (Value::Name(x), Value::Name(y)) => x == y,
        (Value::String(x), Value::String(y)) => {
            x == y
                || match (ctx.memory.string(x), ctx.memory.string(y)) {
                    (Ok(bx), Ok(by)) => bx == by,
                    _ => false,
                }
        }
        (Value::Name(n), Value::String(s)) | (Value::String(s), Value::Name(n)) => {
            matches!(ctx.memory.string(s), Ok(bytes) if bytes == n.as_bytes())
        }
        (Value::Array(x), Value::Array(y)) => x == y,
        (Value::PackedArray(x), Value::PackedArray(y)) => x == y,
        (Value::Dict(x), Value::Dict(y)) => x == y,
        (Value::Operator(x), Value::Operator(y)) => x == y,
        (Value::File(x), Value::File(y)) => x == y,
        (Value::Save(x), Value::Save(y)) => x == y,
        (Value::Font(x), Value::Font(y)) => x == y,
        (Value::GState(x), Value::GState(y)) => x == y,
        _ => false,
    }
}

/// Ordering for lt/le/gt/ge: numbers numerically, strings bytewise.
fn compare(ctx: &Context, a: &Object, b: &Object) -> PsResult<Ordering> {
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return x.partial_cmp(&y).ok_or_else(|| ErrorKind::UndefinedResult.into());
    }
    if let (Some(x), Some(y)) = (a.as_string(), b.as_string()) {
        if ctx.memory.access_of(a) < Access::ReadOnly || ctx.memory.access_of(b) < Access::ReadOnly
        {
            return Err(ErrorKind::InvalidAccess.into());
        }
        let bx = ctx.memory.string(x)?;
        let by = ctx.memory.string(y)?;
        return Ok(bx.cmp(by));
    }
    Err(ErrorKind::TypeCheck.into())
}

fn eq_impl(ctx: &mut Context, negate: bool) -> PsResult<()> {
    ctx.need(2)?;
    let b = *ctx.peek(0)?;
    let a = *ctx.peek(1)?;
    let eq = objects_equal(ctx, &a, &b);
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::boolean(eq != negate))
}

pub fn eq(ctx: &mut Context) -> PsResult<()> {
    eq_impl(ctx, false)
}

pub fn ne(ctx: &mut Context) -> PsResult<()> {
    eq_impl(ctx, true)
}

fn ord_impl(ctx: &mut Context, accept: fn(Ordering) -> bool) -> PsResult<()> {
    ctx.need(2)?;
    let b = *ctx.peek(0)?;
    let a = *ctx.peek(1)?;
    let ord = compare(ctx, &a, &b)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::boolean(accept(ord)))
}

pub fn gt(ctx: &mut Context) -> PsResult<()> {
    ord_impl(ctx, |o| o == Ordering::Greater)
}

pub fn ge(ctx: &mut Context) -> PsResult<()> {
    ord_impl(ctx, |o| o != Ordering::Less)
}

pub fn lt(ctx: &mut Context) -> PsResult<()> {
    ord_impl(ctx, |o| o == Ordering::Less)
}

pub fn le(ctx: &mut Context) -> PsResult<()> {
    ord_impl(ctx, |o| o != Ordering::Greater)
}

/// Boolean or bitwise, by operand type.
fn logical(
    ctx: &mut Context,
    bools: fn(bool, bool) -> bool,
    ints: fn(i32, i32) -> i32,
) -> PsResult<()> {
    ctx.need(2)?;
    let b = *ctx.peek(0)?;
    let a = *ctx.peek(1)?;
    let result = match (a.value, b.value) {
        (Value::Boolean(x), Value::Boolean(y)) => Object::boolean(bools(x, y)),
        (Value::Integer(x), Value::Integer(y)) => Object::integer(ints(x, y)),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(result)
}

pub fn and(ctx: &mut Context) -> PsResult<()> {
    logical(ctx, |a, b| a && b, |a, b| a & b)
}

pub fn or(ctx: &mut Context) -> PsResult<()> {
    logical(ctx, |a, b| a || b, |a, b| a | b)
}

pub fn xor(ctx: &mut Context) -> PsResult<()> {
    logical(ctx, |a, b| a != b, |a, b| a ^ b)
}

pub fn not(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let result = match ctx.peek(0)?.value {
        Value::Boolean(b) => Object::boolean(!b),
        Value::Integer(i) => Object::integer(!i),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.push(result)
}

/// int shift `bitshift` int — positive shifts left, negative right
/// (arithmetic).
pub fn bitshift(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let shift = ctx.peek_int(0)?;
    let value = ctx.peek_int(1)?;
    ctx.pop()?;
    ctx.pop()?;
    let result = if shift.abs() >= 32 {
        if shift > 0 {
            0
        } else {
            value >> 31
        }
    } else if shift >= 0 {
        ((value as u32) << shift) as i32
    } else {
        value >> (-shift)
    };
    ctx.push(Object::integer(result))
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "eq", eq);
    super::define_op(ctx, "ne", ne);
    super::define_op(ctx, "gt", gt);
    super::define_op(ctx, "ge", ge);
    super::define_op(ctx, "lt", lt);
    super::define_op(ctx, "le", le);
    super::define_op(ctx, "and", and);
    super::define_op(ctx, "or", or);
    super::define_op(ctx, "xor", xor);
    super::define_op(ctx, "not", not);
    super::define_op(ctx, "bitshift", bitshift);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_bool(ctx: &mut Context) -> bool {
        ctx.pop().unwrap().as_bool().unwrap()
    }

    #[test]
    fn numeric_eq_across_types() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"4 4.0 eq").unwrap();
        assert!(top_bool(&mut ctx));
    }

    #[test]
    fn string_eq_by_content() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(abc) (abc) eq (abc) /abc eq").unwrap();
        assert!(top_bool(&mut ctx));
        assert!(top_bool(&mut ctx));
    }

    #[test]
    fn array_eq_by_identity() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[1] [1] eq [1] dup eq").unwrap();
        assert!(top_bool(&mut ctx));
        assert!(!top_bool(&mut ctx));
    }

    #[test]
    fn string_ordering_bytewise() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(abc) (abd) lt").unwrap();
        assert!(top_bool(&mut ctx));
    }

    #[test]
    fn bitwise_and_boolean_forms() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"12 10 and true false and").unwrap();
        assert!(!top_bool(&mut ctx));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(8));
    }

    #[test]
    fn bitshift_directions() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 4 bitshift -16 -2 bitshift").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(-4));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(16));
    }
}
