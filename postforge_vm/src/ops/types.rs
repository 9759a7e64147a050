//! Type, attribute, and conversion operators.

use crate::context::Context;
use postforge_core::{
    format_real, Access, Attrib, ErrorKind, Name, Object, PsResult, StringRef, Value,
};

/// any `type` name — the executable type name.
pub fn ps_type(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let name = Name::from_str(ctx.peek(0)?.type_name());
    ctx.pop()?;
    ctx.push(Object::executable_name(name))
}

/// any `cvlit` any
pub fn cvlit(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let mut obj = ctx.pop()?;
    obj.attrib = Attrib::Literal;
    ctx.push(obj)
}

/// any `cvx` any
pub fn cvx(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let mut obj = ctx.pop()?;
    obj.attrib = Attrib::Executable;
    ctx.push(obj)
}

/// any `xcheck` bool
pub fn xcheck(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let exec = ctx.peek(0)?.attrib == Attrib::Executable;
    ctx.pop()?;
    ctx.push(Object::boolean(exec))
}

/// Tighten access on the operand. Access never widens: requesting a
/// weaker restriction than the current one is invalidaccess.
fn restrict(ctx: &mut Context, level: Access) -> PsResult<()> {
    ctx.need(1)?;
    let mut obj = *ctx.peek(0)?;
    match obj.value {
        Value::Array(_) | Value::PackedArray(_) | Value::String(_) | Value::File(_) => {
            if obj.access < level {
                return Err(ErrorKind::InvalidAccess.into());
            }
            ctx.pop()?;
            obj.access = level;
            ctx.push(obj)
        }
        Value::Dict(r) => {
            // Dictionary access lives on the shared value.
            if ctx.memory.dict(r)?.access < level {
                return Err(ErrorKind::InvalidAccess.into());
            }
            ctx.memory.dict_mut(r)?.access = level;
            ctx.pop()?;
            ctx.push(obj)
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

pub fn executeonly(ctx: &mut Context) -> PsResult<()> {
    // executeonly applies to arrays, files, and strings only.
    if ctx.peek(0)?.as_dict().is_some() {
        return Err(ErrorKind::TypeCheck.into());
    }
    restrict(ctx, Access::ExecuteOnly)
}

pub fn noaccess(ctx: &mut Context) -> PsResult<()> {
    restrict(ctx, Access::None)
}

pub fn readonly(ctx: &mut Context) -> PsResult<()> {
    restrict(ctx, Access::ReadOnly)
}

/// any `rcheck` bool
pub fn rcheck(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let readable = ctx.memory.access_of(&obj) >= Access::ReadOnly;
    ctx.pop()?;
    ctx.push(Object::boolean(readable))
}

/// any `wcheck` bool
pub fn wcheck(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let writable = ctx.memory.access_of(&obj) >= Access::Unlimited;
    ctx.pop()?;
    ctx.push(Object::boolean(writable))
}

/// num|string `cvi` int
pub fn cvi(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = coerce_number(ctx, 0)?;
    let t = n.trunc();
    if t < i32::MIN as f64 || t > i32::MAX as f64 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.push(Object::integer(t as i32))
}

/// num|string `cvr` real
pub fn cvr(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = coerce_number(ctx, 0)?;
    ctx.pop()?;
    ctx.push(Object::real(n))
}

/// Interpret a numeric operand or a string spelling a number.
fn coerce_number(ctx: &Context, depth: usize) -> PsResult<f64> {
    let obj = ctx.peek(depth)?;
    if let Some(n) = obj.number() {
        return Ok(n);
    }
    let r = obj.as_string().ok_or(ErrorKind::TypeCheck)?;
    ctx.require_access(obj, Access::ReadOnly)?;
    let bytes = ctx.memory.string(r)?;
    match crate::scanner::number::parse_numeric(bytes) {
        Ok(Some(tok)) => tok.number().ok_or_else(|| ErrorKind::TypeCheck.into()),
        Ok(None) => Err(ErrorKind::SyntaxError.into()),
        Err(kind) => Err(kind.into()),
    }
}

/// string `cvn` name — keeps the string's attribute.
pub fn cvn(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let r = obj.as_string().ok_or(ErrorKind::TypeCheck)?;
    ctx.require_access(&obj, Access::ReadOnly)?;
    let name = Name::new(ctx.memory.string(r)?);
    ctx.pop()?;
    let mut out = Object::literal_name(name);
    out.attrib = obj.attrib;
    ctx.push(out)
}

/// num radix string `cvrs` substring
pub fn cvrs(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let r = ctx.peek_string(0)?;
    let radix = ctx.peek_int(1)?;
    let num = ctx.peek_number(2)?;
    if !(2..=36).contains(&radix) {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.require_access(ctx.peek(0)?, Access::Unlimited)?;
    let text = if radix == 10 {
        let obj = *ctx.peek(2)?;
        render_decimal(&obj)
    } else {
        // Non-decimal radix renders the twos-complement integer value.
        let i = num.trunc() as i64 as u32;
        to_radix(i, radix as u32)
    };
    if text.len() > r.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.memory.string_put_interval(r, 0, text.as_bytes())?;
    let view = Object::new(Value::String(StringRef {
        len: text.len(),
        ..r
    }));
    ctx.push(view)
}

/// any string `cvs` substring
pub fn cvs(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::Unlimited)?;
    let obj = *ctx.peek(1)?;
    let text = to_text(ctx, &obj)?;
    if text.len() > r.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.memory.string_put_interval(r, 0, &text)?;
    let view = Object::new(Value::String(StringRef {
        len: text.len(),
        ..r
    }));
    ctx.push(view)
}

fn render_decimal(obj: &Object) -> String {
    match obj.value {
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => format_real(r),
        _ => String::new(),
    }
}

fn to_radix(mut value: u32, radix: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % radix) as usize]);
        value /= radix;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// The `cvs` rendering of any object (PLRM: numbers, booleans, strings,
/// names, and operators convert; everything else is --nostringval--).
pub fn to_text(ctx: &Context, obj: &Object) -> PsResult<Vec<u8>> {
    Ok(match obj.value {
        Value::Integer(i) => i.to_string().into_bytes(),
        Value::Real(r) => format_real(r).into_bytes(),
        Value::Boolean(b) => (if b { "true" } else { "false" }).into(),
        Value::Name(n) => n.as_bytes().to_vec(),
        Value::String(r) => {
            ctx.require_access(obj, Access::ReadOnly)?;
            ctx.memory.string_vec(r)?
        }
        Value::Operator(id) => ctx.ops.name_of(id).as_bytes().to_vec(),
        _ => b"--nostringval--".to_vec(),
    })
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "type", ps_type);
    super::define_op(ctx, "cvlit", cvlit);
    super::define_op(ctx, "cvx", cvx);
    super::define_op(ctx, "xcheck", xcheck);
    super::define_op(ctx, "executeonly", executeonly);
    super::define_op(ctx, "noaccess", noaccess);
    super::define_op(ctx, "readonly", readonly);
    super::define_op(ctx, "rcheck", rcheck);
    super::define_op(ctx, "wcheck", wcheck);
    super::define_op(ctx, "cvi", cvi);
    super::define_op(ctx, "cvn", cvn);
    super::define_op(ctx, "cvr", cvr);
    super::define_op(ctx, "cvrs", cvrs);
    super::define_op(ctx, "cvs", cvs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"42 type 3.5 type (s) type /n type").unwrap();
        assert_eq!(ctx.pop().unwrap().as_name(), Some(Name::new(b"nametype")));
        assert_eq!(
            ctx.pop().unwrap().as_name(),
            Some(Name::new(b"stringtype"))
        );
        assert_eq!(ctx.pop().unwrap().as_name(), Some(Name::new(b"realtype")));
        assert_eq!(
            ctx.pop().unwrap().as_name(),
            Some(Name::new(b"integertype"))
        );
    }

    #[test]
    fn cvx_cvlit_round_trip_on_attribute() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/n cvx cvlit xcheck").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        ctx.run_bytes(b"/n cvx xcheck").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn cvi_truncates_and_parses_strings() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3.9 cvi (42) cvi -2.5 cvi").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(-2));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }

    #[test]
    fn cvs_renders_into_buffer() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"123 10 string cvs").unwrap();
        let s = ctx.pop().unwrap().as_string().unwrap();
        assert_eq!(ctx.memory.string(s).unwrap(), b"123");
    }

    #[test]
    fn cvrs_hex() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"255 16 8 string cvrs").unwrap();
        let s = ctx.pop().unwrap().as_string().unwrap();
        assert_eq!(ctx.memory.string(s).unwrap(), b"ff");
    }

    #[test]
    fn access_only_tightens() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[1 2] readonly wcheck").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        // Widening back is not possible; rcheck still succeeds.
        ctx.run_bytes(b"[3] noaccess rcheck").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn copy_on_lookup_protects_dict_entries() {
        let mut ctx = Context::new();
        // cvx on the loaded value must not make the stored value
        // executable.
        ctx.run_bytes(b"/v [1 2] def /v load cvx pop /v load xcheck")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }
}
