//! Interpreter parameter operators (`setuserparams`, `setsystemparams`,
//! and friends).

use crate::context::Context;
use postforge_core::{ErrorKind, Name, Object, PsResult, Value};
use postforge_runtime::DictKey;

fn key(n: &[u8]) -> DictKey {
    DictKey::Name(Name::new(n))
}

/// dict `setuserparams` – — unknown keys are ignored (PLRM).
pub fn setuserparams(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let dref = ctx.peek_dict(0)?;
    let entries: Vec<(DictKey, Object)> = ctx.memory.dict(dref)?.iter_ordered().collect();
    ctx.pop()?;
    for (k, v) in entries {
        let name = match k {
            DictKey::Name(n) => n,
            _ => continue,
        };
        match name.as_bytes() {
            b"MaxOpStack" => {
                if let Some(n) = v.as_int() {
                    ctx.params.max_op_stack = n.max(0) as usize;
                }
            }
            b"MaxExecStack" => {
                if let Some(n) = v.as_int() {
                    ctx.params.max_exec_stack = n.max(0) as usize;
                }
            }
            b"MaxDictStack" => {
                if let Some(n) = v.as_int() {
                    ctx.params.max_dict_stack = n.max(0) as usize;
                }
            }
            b"ExecutionHistory" => {
                if let Some(on) = v.as_bool() {
                    ctx.params.execution_history = on;
                    if !on {
                        ctx.history.buf.clear();
                    }
                }
            }
            b"ExecutionHistorySize" => {
                if let Some(n) = v.as_int() {
                    if n > 0 {
                        ctx.params.execution_history_size = n as usize;
                        while ctx.history.buf.len() > n as usize {
                            ctx.history.buf.pop_front();
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// `currentuserparams` dict
pub fn currentuserparams(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let obj = ctx.new_dict(8);
    let dref = obj.as_dict().ok_or(ErrorKind::VmError)?;
    let entries: Vec<(&[u8], Object)> = vec![
        (
            b"MaxOpStack",
            Object::integer(ctx.params.max_op_stack as i32),
        ),
        (
            b"MaxExecStack",
            Object::integer(ctx.params.max_exec_stack as i32),
        ),
        (
            b"MaxDictStack",
            Object::integer(ctx.params.max_dict_stack as i32),
        ),
        (
            b"ExecutionHistory",
            Object::boolean(ctx.params.execution_history),
        ),
        (
            b"ExecutionHistorySize",
            Object::integer(ctx.params.execution_history_size as i32),
        ),
    ];
    for (k, v) in entries {
        ctx.memory.dict_put(dref, key(k), v)?;
    }
    ctx.push(obj)
}

/// dict `setsystemparams` – — requires the system password when one is
/// set; `StartJobPassword` is write-only.
pub fn setsystemparams(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let dref = ctx.peek_dict(0)?;
    let entries: Vec<(DictKey, Object)> = ctx.memory.dict(dref)?.iter_ordered().collect();

    // Password check first, before any mutation.
    let supplied = entries.iter().find_map(|(k, v)| {
        matches!(k, DictKey::Name(n) if n.as_bytes() == b"Password").then_some(*v)
    });
    if !ctx.system.system_params_password.is_empty() {
        let ok = match supplied {
            Some(p) => password_matches(ctx, &p, &ctx.system.system_params_password.clone())?,
            None => false,
        };
        if !ok {
            return Err(ErrorKind::InvalidAccess.into());
        }
    }
    ctx.pop()?;

    for (k, v) in entries {
        let name = match k {
            DictKey::Name(n) => n,
            _ => continue,
        };
        match name.as_bytes() {
            b"StartJobPassword" => {
                ctx.system.start_job_password = password_bytes(ctx, &v)?;
            }
            b"SystemParamsPassword" => {
                ctx.system.system_params_password = password_bytes(ctx, &v)?;
            }
            b"MaxFontCache" => {
                if let Some(n) = v.as_int() {
                    ctx.system.max_font_cache = n;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// `currentsystemparams` dict — passwords never read back.
pub fn currentsystemparams(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let obj = ctx.new_dict(8);
    let dref = obj.as_dict().ok_or(ErrorKind::VmError)?;
    let max_font_cache = ctx.system.max_font_cache;
    let entries: Vec<(&[u8], Object)> = vec![
        (b"MaxFontCache", Object::integer(max_font_cache)),
        (b"CurFontCache", Object::integer(0)),
        (b"ByteOrder", Object::boolean(true)),
        (b"RealFormat", {
            let s = ctx.new_string(b"IEEE".to_vec());
            s
        }),
    ];
    for (k, v) in entries {
        ctx.memory.dict_put(dref, key(k), v)?;
    }
    ctx.push(obj)
}

/// A password operand is a string or an integer rendered in decimal.
pub fn password_bytes(ctx: &Context, obj: &Object) -> PsResult<Vec<u8>> {
    match obj.value {
        Value::String(r) => ctx.memory.string_vec(r),
        Value::Integer(i) => Ok(i.to_string().into_bytes()),
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

pub fn password_matches(ctx: &Context, obj: &Object, expected: &[u8]) -> PsResult<bool> {
    Ok(password_bytes(ctx, obj)? == expected)
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "setuserparams", setuserparams);
    super::define_op(ctx, "currentuserparams", currentuserparams);
    super::define_op(ctx, "setsystemparams", setsystemparams);
    super::define_op(ctx, "currentsystemparams", currentsystemparams);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_params_round_trip() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"<< /MaxOpStack 64 /ExecutionHistory true >> setuserparams")
            .unwrap();
        assert_eq!(ctx.params.max_op_stack, 64);
        assert!(ctx.params.execution_history);
        ctx.run_bytes(b"currentuserparams /MaxOpStack get").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(64));
    }

    #[test]
    fn stack_limit_fires_exactly_at_max() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"<< /MaxOpStack 3 >> setuserparams").unwrap();
        ctx.run_bytes(b"1 2 3").unwrap();
        assert_eq!(ctx.o_stack.len(), 3);
        // The next push overflows; the engine's literal path bypasses the
        // limit, so drive it through an operator.
        ctx.run_bytes(b"{ 1 dup } stopped").unwrap();
        assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn wrong_system_password_is_invalidaccess() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ << /Password (nope) /MaxFontCache 1 >> setsystemparams } stopped")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_ne!(ctx.system.max_font_cache, 1);
    }

    #[test]
    fn start_job_password_is_write_only() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"<< /Password (0) /StartJobPassword (secret) >> setsystemparams")
            .unwrap();
        assert_eq!(ctx.system.start_job_password, b"secret");
        ctx.run_bytes(b"currentsystemparams /StartJobPassword known")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }
}
