//! Dictionary operators and the `>>` builder.

use crate::context::Context;
use crate::dict_stack;
use postforge_core::{Access, ErrorKind, MarkKind, Object, PsResult, Value};

/// int `dict` dict
pub fn dict(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_int(0)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    let obj = ctx.new_dict(n as usize);
    ctx.push(obj)
}

/// mark key1 value1 … `>>` dict
pub fn dict_close(ctx: &mut Context) -> PsResult<()> {
    // Validate the pair count before consuming anything.
    let pos = ctx
        .o_stack
        .iter()
        .rposition(|o| matches!(o.value, Value::Mark(MarkKind::DictOpen)))
        .ok_or(ErrorKind::UnmatchedMark)?;
    if (ctx.o_stack.len() - pos - 1) % 2 != 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let elems = super::array::collect_to_mark(ctx, MarkKind::DictOpen)
        .ok_or(ErrorKind::UnmatchedMark)?;
    let obj = ctx.new_dict(elems.len() / 2 + 4);
    let dref = obj.as_dict().ok_or(ErrorKind::VmError)?;
    for pair in elems.chunks_exact(2) {
        let key = ctx.memory.dict_key(&pair[0])?;
        ctx.memory.dict_put(dref, key, pair[1])?;
    }
    ctx.push(obj)
}

/// dict `begin` –
pub fn begin(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let dref = obj.as_dict().ok_or(ErrorKind::TypeCheck)?;
    ctx.memory.dict(dref)?.require_access(Access::ReadOnly)?;
    if ctx.params.max_dict_stack != 0 && ctx.d_stack.len() >= ctx.params.max_dict_stack {
        return Err(ErrorKind::DictStackOverflow.into());
    }
    ctx.pop()?;
    ctx.d_stack.push(obj);
    Ok(())
}

/// `end` – — the three permanent dictionaries never pop.
pub fn end(ctx: &mut Context) -> PsResult<()> {
    if ctx.d_stack.len() <= 3 {
        return Err(ErrorKind::DictStackUnderflow.into());
    }
    ctx.d_stack.pop();
    Ok(())
}

/// key value `def` –
pub fn def(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let key = ctx.memory.dict_key(ctx.peek(1)?)?;
    let value = *ctx.peek(0)?;
    dict_stack::define(ctx, key, value)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok(())
}

/// key `load` value
pub fn load(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let key = ctx.memory.dict_key(ctx.peek(0)?)?;
    match dict_stack::lookup(ctx, key) {
        Some(value) => {
            ctx.pop()?;
            ctx.push(value)
        }
        None => Err(ErrorKind::Undefined.into()),
    }
}

/// key value `store` – — replaces where defined, else defines in the
/// current dictionary.
pub fn store(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let key = ctx.memory.dict_key(ctx.peek(1)?)?;
    let value = *ctx.peek(0)?;
    match dict_stack::where_defined(ctx, key) {
        Some(dict_obj) => {
            let dref = dict_obj.as_dict().ok_or(ErrorKind::TypeCheck)?;
            ctx.memory.dict(dref)?.require_access(Access::Unlimited)?;
            ctx.memory.dict_put(dref, key, value)?;
        }
        None => dict_stack::define(ctx, key, value)?,
    }
    ctx.pop()?;
    ctx.pop()?;
    Ok(())
}

/// dict key `undef` –
pub fn undef(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let dref = ctx.peek_dict(1)?;
    let key = ctx.memory.dict_key(ctx.peek(0)?)?;
    ctx.memory.dict(dref)?.require_access(Access::Unlimited)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.memory.dict_mut(dref)?.remove(key);
    Ok(())
}

/// dict key `known` bool
pub fn known(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let dref = ctx.peek_dict(1)?;
    let key = ctx.memory.dict_key(ctx.peek(0)?)?;
    ctx.memory.dict(dref)?.require_access(Access::ReadOnly)?;
    let found = ctx.memory.dict(dref)?.contains(key);
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::boolean(found))
}

/// key `where` dict true | false
pub fn where_op(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let key = ctx.memory.dict_key(ctx.peek(0)?)?;
    match dict_stack::where_defined(ctx, key) {
        Some(dict_obj) => {
            ctx.reserve(1)?;
            ctx.pop()?;
            ctx.push(dict_obj)?;
            ctx.push(Object::boolean(true))
        }
        None => {
            ctx.pop()?;
            ctx.push(Object::boolean(false))
        }
    }
}

/// `currentdict` dict
pub fn currentdict(ctx: &mut Context) -> PsResult<()> {
    let top = *ctx.d_stack.last().ok_or(ErrorKind::DictStackUnderflow)?;
    ctx.push(top)
}

/// `countdictstack` int
pub fn countdictstack(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let n = ctx.d_stack.len() as i32;
    ctx.push(Object::integer(n))
}

/// array `dictstack` subarray
pub fn dictstack(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let r = match obj.value {
        Value::Array(r) => r,
        Value::PackedArray(_) => return Err(ErrorKind::InvalidAccess.into()),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.require_access(&obj, Access::Unlimited)?;
    if ctx.d_stack.len() > r.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    let dicts = ctx.d_stack.clone();
    let n = dicts.len();
    ctx.memory.array_put_interval(r, 0, dicts)?;
    let view = Object {
        value: Value::Array(postforge_core::ArrayRef { len: n, ..r }),
        ..obj
    };
    ctx.push(view)
}

/// `cleardictstack` – — pop to the permanent three.
pub fn cleardictstack(ctx: &mut Context) -> PsResult<()> {
    ctx.d_stack.truncate(3);
    Ok(())
}

/// dict `maxlength` int
pub fn maxlength(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let dref = ctx.peek_dict(0)?;
    ctx.memory.dict(dref)?.require_access(Access::ReadOnly)?;
    let max = ctx.memory.dict(dref)?.max_length as i32;
    ctx.pop()?;
    ctx.push(Object::integer(max))
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "dict", dict);
    super::define_op(ctx, ">>", dict_close);
    super::define_op(ctx, "begin", begin);
    super::define_op(ctx, "end", end);
    super::define_op(ctx, "def", def);
    super::define_op(ctx, "load", load);
    super::define_op(ctx, "store", store);
    super::define_op(ctx, "undef", undef);
    super::define_op(ctx, "known", known);
    super::define_op(ctx, "where", where_op);
    super::define_op(ctx, "currentdict", currentdict);
    super::define_op(ctx, "countdictstack", countdictstack);
    super::define_op(ctx, "dictstack", dictstack);
    super::define_op(ctx, "cleardictstack", cleardictstack);
    super::define_op(ctx, "maxlength", maxlength);
}

#[cfg(test)]
mod tests {
    use super::*;
    use postforge_core::Name;

    #[test]
    fn def_load_round_trip() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/x 10 def /x load").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(10));
    }

    #[test]
    fn dict_literal_syntax() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"<< /a 1 /b 2 >> /b get").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn begin_end_scoping() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/x 1 def 2 dict begin /x 2 def x end x")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn store_replaces_shadowed_binding() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/x 1 def 2 dict begin /x 9 store x end x")
            .unwrap();
        // store found x in userdict and replaced it there.
        assert_eq!(ctx.pop().unwrap().as_int(), Some(9));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(9));
    }

    #[test]
    fn end_protects_permanent_dicts() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ end } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.d_stack.len(), 3);
    }

    #[test]
    fn where_reports_defining_dict() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/v 5 def /v where").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        let d = ctx.pop().unwrap();
        assert_eq!(d, dict_stack::userdict(&ctx));
    }

    #[test]
    fn string_and_name_keys_unify() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/k 3 def (k) load").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
        let _ = Name::new(b"k");
    }

    #[test]
    fn integer_and_real_keys_unify() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2 dict dup 1 /one put 1.0 get").unwrap();
        assert_eq!(
            ctx.pop().unwrap().as_name(),
            Some(Name::new(b"one"))
        );
    }
}
