//! Polymorphic composite operators: `length`, `get`, `put`, `getinterval`,
//! `putinterval`, `forall`, and composite `copy`. Each dispatches on the
//! operand type the way the PLRM defines the shared operator.

use crate::context::Context;
use crate::engine::{ExecItem, LoopFrame};
use postforge_core::{
    Access, ArrayRef, ErrorKind, Object, PsResult, StringRef, Value,
};

/// array|packedarray|dict|string|name `length` int
pub fn length(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    ctx.require_access(&obj, Access::ReadOnly)?;
    let len = match obj.value {
        Value::Array(r) | Value::PackedArray(r) => r.len,
        Value::String(r) => r.len,
        Value::Dict(r) => ctx.memory.dict(r)?.len(),
        Value::Name(n) => n.len(),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.push(Object::integer(len as i32))
}

/// composite index|key `get` any
pub fn get(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let container = *ctx.peek(1)?;
    ctx.require_access(&container, Access::ReadOnly)?;
    match container.value {
        Value::Array(r) | Value::PackedArray(r) => {
            let i = ctx.peek_int(0)?;
            if i < 0 || i as usize >= r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let elem = ctx.memory.array_get(r, i as usize)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.push(elem)
        }
        Value::String(r) => {
            let i = ctx.peek_int(0)?;
            if i < 0 || i as usize >= r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let byte = ctx.memory.string_get(r, i as usize)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.push(Object::integer(byte as i32))
        }
        Value::Dict(r) => {
            let key = ctx.memory.dict_key(ctx.peek(0)?)?;
            match ctx.memory.dict_get(r, key)? {
                Some(value) => {
                    ctx.pop()?;
                    ctx.pop()?;
                    ctx.push(value)
                }
                None => Err(ErrorKind::Undefined.into()),
            }
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

/// composite index|key any `put` –
pub fn put(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let container = *ctx.peek(2)?;
    ctx.require_access(&container, Access::Unlimited)?;
    let value = *ctx.peek(0)?;
    match container.value {
        Value::Array(r) => {
            let i = ctx.peek_int(1)?;
            if i < 0 || i as usize >= r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            // Local values must not leak into global arrays.
            if container.is_global() && value.is_composite() && !value.is_global() {
                return Err(ErrorKind::InvalidAccess.into());
            }
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.array_put(r, i as usize, value)
        }
        Value::PackedArray(_) => Err(ErrorKind::InvalidAccess.into()),
        Value::String(r) => {
            let i = ctx.peek_int(1)?;
            let byte = ctx.peek_int(0)?;
            if i < 0 || i as usize >= r.len || !(0..=255).contains(&byte) {
                return Err(ErrorKind::RangeCheck.into());
            }
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.string_put(r, i as usize, byte as u8)
        }
        Value::Dict(r) => {
            let key = ctx.memory.dict_key(ctx.peek(1)?)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.dict_put(r, key, value)
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

/// array|string index count `getinterval` subarray|substring — a view
/// sharing the backing store.
pub fn getinterval(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let container = *ctx.peek(2)?;
    ctx.require_access(&container, Access::ReadOnly)?;
    let index = ctx.peek_int(1)?;
    let count = ctx.peek_int(0)?;
    if index < 0 || count < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let (index, count) = (index as usize, count as usize);
    let view = match container.value {
        Value::Array(r) => {
            if index + count > r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            Object {
                value: Value::Array(ArrayRef {
                    start: r.start + index,
                    len: count,
                    ..r
                }),
                ..container
            }
        }
        Value::PackedArray(r) => {
            if index + count > r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            Object {
                value: Value::PackedArray(ArrayRef {
                    start: r.start + index,
                    len: count,
                    ..r
                }),
                ..container
            }
        }
        Value::String(r) => {
            if index + count > r.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            Object {
                value: Value::String(StringRef {
                    start: r.start + index,
                    len: count,
                    ..r
                }),
                ..container
            }
        }
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(view)
}

/// array|string index source `putinterval` –
pub fn putinterval(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let target = *ctx.peek(2)?;
    let source = *ctx.peek(0)?;
    ctx.require_access(&target, Access::Unlimited)?;
    ctx.require_access(&source, Access::ReadOnly)?;
    let index = ctx.peek_int(1)?;
    if index < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let index = index as usize;
    match (target.value, source.value) {
        (Value::Array(dst), Value::Array(src) | Value::PackedArray(src)) => {
            if index + src.len > dst.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let elems = ctx.memory.array(src)?.to_vec();
            // Local values must not leak into global arrays.
            if target.is_global()
                && elems
                    .iter()
                    .any(|e| e.is_composite() && !e.is_global())
            {
                return Err(ErrorKind::InvalidAccess.into());
            }
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.array_put_interval(dst, index, elems)
        }
        (Value::String(dst), Value::String(src)) => {
            if index + src.len > dst.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let bytes = ctx.memory.string_vec(src)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.string_put_interval(dst, index, &bytes)
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

/// composite proc `forall` – — installs a Loop frame per container kind.
pub fn forall(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let body = *ctx.peek_proc(0)?;
    let container = *ctx.peek(1)?;
    ctx.require_access(&container, Access::ReadOnly)?;
    let frame = match container.value {
        Value::Array(r) | Value::PackedArray(r) => LoopFrame::ForallArray {
            array: r,
            index: 0,
            body,
        },
        Value::String(r) => LoopFrame::ForallString {
            string: r,
            index: 0,
            body,
        },
        Value::Dict(r) => {
            let entries = ctx
                .memory
                .dict(r)?
                .iter_ordered()
                .map(|(k, v)| (k.to_object(), v))
                .collect();
            LoopFrame::ForallDict {
                entries,
                index: 0,
                body,
            }
        }
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.pop()?;
    ctx.e_stack.push(ExecItem::Loop(Box::new(frame)));
    Ok(())
}

/// composite1 composite2 `copy` composite2' — copy contents into the
/// second operand, returning the filled prefix view.
pub fn copy_composite(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let src = *ctx.peek(1)?;
    let dst = *ctx.peek(0)?;
    ctx.require_access(&src, Access::ReadOnly)?;
    ctx.require_access(&dst, Access::Unlimited)?;
    match (src.value, dst.value) {
        (Value::Array(s) | Value::PackedArray(s), Value::Array(d)) => {
            if s.len > d.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let elems = ctx.memory.array(s)?.to_vec();
            // Local values must not leak into global arrays.
            if dst.is_global()
                && elems
                    .iter()
                    .any(|e| e.is_composite() && !e.is_global())
            {
                return Err(ErrorKind::InvalidAccess.into());
            }
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.array_put_interval(d, 0, elems)?;
            let view = Object {
                value: Value::Array(ArrayRef { len: s.len, ..d }),
                ..dst
            };
            ctx.push(view)
        }
        (Value::String(s), Value::String(d)) => {
            if s.len > d.len {
                return Err(ErrorKind::RangeCheck.into());
            }
            let bytes = ctx.memory.string_vec(s)?;
            ctx.pop()?;
            ctx.pop()?;
            ctx.memory.string_put_interval(d, 0, &bytes)?;
            let view = Object {
                value: Value::String(StringRef { len: s.len, ..d }),
                ..dst
            };
            ctx.push(view)
        }
        (Value::Dict(s), Value::Dict(d)) => {
            // Level 2: the destination need not be empty; entries merge in.
            let entries: Vec<_> = ctx.memory.dict(s)?.iter_ordered().collect();
            ctx.pop()?;
            ctx.pop()?;
            for (k, v) in entries {
                ctx.memory.dict_put(d, k, v)?;
            }
            ctx.push(dst)
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "length", length);
    super::define_op(ctx, "get", get);
    super::define_op(ctx, "put", put);
    super::define_op(ctx, "getinterval", getinterval);
    super::define_op(ctx, "putinterval", putinterval);
    super::define_op(ctx, "forall", forall);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn getinterval_shares_backing() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(hello) dup 1 3 getinterval 0 (E) putinterval")
            .unwrap();
        let s = ctx.pop().unwrap().as_string().unwrap();
        assert_eq!(ctx.memory.string(s).unwrap(), b"hEllo");
    }

    #[test]
    fn shared_mutation_via_dup() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(hello) dup 0 (H) putinterval").unwrap();
        let s = ctx.pop().unwrap().as_string().unwrap();
        assert_eq!(ctx.memory.string(s).unwrap(), b"Hello");
    }

    #[test]
    fn dict_get_missing_is_undefined() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ 1 dict /missing get } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn forall_over_array_accumulates() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 [1 2 3 4] {add} forall").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(10));
    }

    #[test]
    fn forall_over_string_pushes_codes() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(AB) {} forall").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(66));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(65));
    }

    #[test]
    fn forall_over_dict_pushes_pairs() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 dict dup /k 42 put {} forall").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
        assert_eq!(
            ctx.pop().unwrap().as_name(),
            Some(postforge_core::Name::new(b"k"))
        );
    }

    #[test]
    fn put_into_packed_array_denied() {
        let mut ctx = Context::new();
        // Packing is on before the procedure body is scanned, so the
        // nested { x } builds as a read-only packed array.
        ctx.run_bytes(b"true setpacking").unwrap();
        ctx.run_bytes(b"{ { x } 0 1 put } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn putinterval_rejects_local_into_global() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"true setglobal /g [null null] def false setglobal")
            .unwrap();
        ctx.run_bytes(b"{ g 0 [ (loc) ] putinterval } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        ctx.o_stack.clear();
        // Scalars are values, not references; they install fine.
        ctx.run_bytes(b"g 0 [1 2] putinterval g 1 get").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn copy_rejects_local_into_global() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"true setglobal /g [null null] def false setglobal")
            .unwrap();
        ctx.run_bytes(b"{ [ (loc) null ] g copy } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn string_length_counts_view() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"(hello) 1 3 getinterval length").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }
}
