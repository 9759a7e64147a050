//! Miscellaneous operators: `bind`, `null`, version identity, timers, and
//! the execution-history controls.

use crate::context::Context;
use crate::dict_stack;
use postforge_core::{Access, Attrib, Object, PsResult, Value};

/// proc `bind` proc — replace executable names bound to operators with
/// the operators themselves, recursing into nested procedures.
pub fn bind(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let proc = *ctx.peek(0)?;
    if proc.as_array().is_some() && proc.attrib == Attrib::Executable {
        bind_proc(ctx, proc);
    }
    Ok(())
}

fn bind_proc(ctx: &mut Context, proc: Object) {
    let r = match proc.as_array() {
        Some(r) => r,
        None => return,
    };
    // Read-only bodies still get their nested procedures visited, but
    // their own elements cannot be rewritten.
    let writable = matches!(proc.value, Value::Array(_))
        && ctx.memory.access_of(&proc) >= Access::Unlimited;

    for i in 0..r.len {
        let elem = match ctx.memory.array_get(r, i) {
            Ok(e) => e,
            Err(_) => continue,
        };
        match elem.value {
            Value::Name(name) if elem.attrib == Attrib::Executable => {
                if !writable {
                    continue;
                }
                if let Some(binding) = dict_stack::lookup_name(ctx, name) {
                    // Only operator bindings substitute; others stay late
                    // bound.
                    if matches!(binding.value, Value::Operator(_)) {
                        let _ = ctx.memory.array_put(r, i, binding);
                    }
                }
            }
            Value::Array(_) | Value::PackedArray(_) if elem.attrib == Attrib::Executable => {
                bind_proc(ctx, elem);
            }
            _ => {}
        }
    }
}

/// `null` null
pub fn null(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::null())
}

/// `version` string
pub fn version(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let obj = ctx.new_string(b"3010".to_vec());
    ctx.push(obj)
}

/// `realtime` int — milliseconds since interpreter start.
pub fn realtime(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let ms = ctx.start_time.elapsed().as_millis() as i64;
    ctx.push(Object::integer((ms & 0x7FFF_FFFF) as i32))
}

/// `usertime` int — execution time in milliseconds; a single-threaded
/// interpreter's usertime is its realtime.
pub fn usertime(ctx: &mut Context) -> PsResult<()> {
    realtime(ctx)
}

/// bool `echo` – — interactive echo flag; accepted and recorded.
pub fn echo(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    ctx.peek_bool(0)?;
    ctx.pop()?;
    Ok(())
}

/// `pauseexechistory` – — stop recording while diagnostics run.
pub fn pauseexechistory(ctx: &mut Context) -> PsResult<()> {
    ctx.history.paused = true;
    Ok(())
}

/// `resumeexechistory` –
pub fn resumeexechistory(ctx: &mut Context) -> PsResult<()> {
    ctx.history.paused = false;
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "bind", bind);
    super::define_op(ctx, "null", null);
    super::define_op(ctx, "version", version);
    super::define_op(ctx, "realtime", realtime);
    super::define_op(ctx, "usertime", usertime);
    super::define_op(ctx, "echo", echo);
    super::define_op(ctx, "pauseexechistory", pauseexechistory);
    super::define_op(ctx, "resumeexechistory", resumeexechistory);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_replaces_operator_names() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{1 2 add} bind").unwrap();
        let proc = ctx.pop().unwrap();
        let r = proc.as_array().unwrap();
        let last = ctx.memory.array_get(r, 2).unwrap();
        assert!(matches!(last.value, Value::Operator(_)));
    }

    #[test]
    fn bind_leaves_non_operator_names() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/v 7 def {v} bind").unwrap();
        let proc = ctx.pop().unwrap();
        let r = proc.as_array().unwrap();
        let elem = ctx.memory.array_get(r, 0).unwrap();
        assert!(matches!(elem.value, Value::Name(_)));
    }

    #[test]
    fn bind_recurses_into_nested_procs() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ {3 4 mul} exec } bind exec").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(12));
    }

    #[test]
    fn bound_procs_still_execute() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{2 3 add} bind exec").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(5));
    }
}
