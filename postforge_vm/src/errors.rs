//! The PLRM error protocol: `errordict`, `$error`, and `handleerror`.
//!
//! Each `errordict` entry is a two-element procedure
//! `{ /errorname .recorderror }`. The engine pushes the offending command
//! and the entry; `.recorderror` captures state into `$error`, reverts to
//! local allocation mode, and performs `stop`. `handleerror` prints the
//! standard report and clears `newerror`.

use crate::context::Context;
use crate::dict_stack;
use crate::engine::{self, ExecItem};
use postforge_core::{ErrorKind, Name, Object, PsResult, Space, Value};
use postforge_runtime::DictKey;

fn key(n: &[u8]) -> DictKey {
    DictKey::Name(Name::new(n))
}

/// Build `errordict` and `$error` into systemdict. Runs during bootstrap,
/// after the operator table exists.
pub fn init_error_machinery(ctx: &mut Context) {
    // $error starts with newerror false.
    let error_state = ctx.new_dict_in(Space::Local, 12);
    let dref = error_state.as_dict().expect("fresh dict");
    let init: Vec<(&[u8], Object)> = vec![
        (b"newerror", Object::boolean(false)),
        (b"errorname", Object::null()),
        (b"command", Object::null()),
        (b"errorinfo", Object::null()),
        (b"ostackarray", Object::null()),
        (b"estackarray", Object::null()),
        (b"dstackarray", Object::null()),
        (b"recordstacks", Object::boolean(true)),
        (b"binary", Object::boolean(false)),
    ];
    for (k, v) in init {
        ctx.memory.dict_put(dref, key(k), v).expect("$error init");
    }
    dict_stack::define_system(ctx, "$error", error_state);

    // errordict: one { /name .recorderror } procedure per error, plus
    // handleerror.
    let recorder = dict_stack::lookup_name(ctx, Name::new(b".recorderror"))
        .expect(".recorderror installed before errordict");
    let errordict = ctx.new_dict_in(Space::Local, ErrorKind::ALL.len() + 2);
    let edref = errordict.as_dict().expect("fresh dict");
    for kind in ErrorKind::ALL {
        let proc = ctx.new_array_in(
            Space::Local,
            vec![Object::literal_name(kind.name()), recorder],
        );
        ctx.memory
            .dict_put(edref, DictKey::Name(kind.name()), proc.executable())
            .expect("errordict init");
    }
    let handler = dict_stack::lookup_name(ctx, Name::new(b"handleerror"))
        .expect("handleerror installed before errordict");
    ctx.memory
        .dict_put(edref, key(b"handleerror"), handler)
        .expect("errordict init");
    dict_stack::define_system(ctx, "errordict", errordict);
}

fn error_dict(ctx: &Context) -> Option<postforge_core::DictRef> {
    dict_stack::lookup_name(ctx, Name::new(b"$error")).and_then(|o| o.as_dict())
}

/// command errorname `.recorderror` – — the default errordict handler
/// body.
pub fn recorderror(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let errorname = *ctx.peek(0)?;
    let command = *ctx.peek(1)?;
    ctx.pop()?;
    ctx.pop()?;

    if let Some(dref) = error_dict(ctx) {
        let record_stacks = ctx
            .memory
            .dict_get(dref, key(b"recordstacks"))
            .ok()
            .flatten()
            .and_then(|o| o.as_bool())
            .unwrap_or(true);

        ctx.memory.dict_put(dref, key(b"newerror"), Object::boolean(true))?;
        ctx.memory.dict_put(dref, key(b"errorname"), errorname)?;
        ctx.memory.dict_put(dref, key(b"command"), command)?;
        ctx.memory.dict_put(dref, key(b"errorinfo"), Object::null())?;

        if record_stacks {
            let ostack = ctx.o_stack.clone();
            let oarr = ctx.new_array_in(Space::Local, ostack);
            let estack: Vec<Object> = ctx
                .e_stack
                .iter()
                .map(|item| match item {
                    ExecItem::Obj(o) => *o,
                    _ => Object::null().executable(),
                })
                .collect();
            let earr = ctx.new_array_in(Space::Local, estack);
            let dstack = ctx.d_stack.clone();
            let darr = ctx.new_array_in(Space::Local, dstack);
            ctx.memory.dict_put(dref, key(b"ostackarray"), oarr)?;
            ctx.memory.dict_put(dref, key(b"estackarray"), earr)?;
            ctx.memory.dict_put(dref, key(b"dstackarray"), darr)?;
        }
    }

    // Standard handlers revert to local VM allocation (PLRM).
    ctx.alloc_global = false;
    engine::do_stop(ctx);
    Ok(())
}

/// `handleerror` – — print the standard report and reset `newerror`.
pub fn handleerror(ctx: &mut Context) -> PsResult<()> {
    let Some(dref) = error_dict(ctx) else {
        return Ok(());
    };
    let newerror = ctx
        .memory
        .dict_get(dref, key(b"newerror"))?
        .and_then(|o| o.as_bool())
        .unwrap_or(false);
    if !newerror {
        return Ok(());
    }
    let errorname = ctx
        .memory
        .dict_get(dref, key(b"errorname"))?
        .unwrap_or_else(Object::null);
    let command = ctx
        .memory
        .dict_get(dref, key(b"command"))?
        .unwrap_or_else(Object::null);

    let mut report = Vec::with_capacity(64);
    report.extend_from_slice(b"%%[ Error: ");
    report.extend_from_slice(&crate::ops::types::to_text(ctx, &errorname)?);
    report.extend_from_slice(b"; OffendingCommand: ");
    report.extend_from_slice(&crate::ops::types::to_text(ctx, &command)?);
    report.extend_from_slice(b" ]%%\n");
    ctx.files.write_stdout(&report)?;
    let stdout = ctx.files.stdout_id;
    ctx.files.get(stdout)?.flush()?;

    ctx.memory
        .dict_put(dref, key(b"newerror"), Object::boolean(false))?;
    ctx.history.paused = false;
    Ok(())
}

pub fn install_ops(ctx: &mut Context) {
    crate::ops::define_op(ctx, ".recorderror", recorderror);
    crate::ops::define_op(ctx, "handleerror", handleerror);
}

/// True when `$error.newerror` is set (a job-fatal error escaped).
pub fn pending_error(ctx: &Context) -> bool {
    error_dict(ctx)
        .and_then(|d| ctx.memory.dict_get(d, key(b"newerror")).ok().flatten())
        .and_then(|o| o.as_bool())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_populates_dollar_error() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ (a) 1 add } stopped pop").unwrap();
        ctx.run_bytes(b"$error /errorname get $error /command get")
            .unwrap();
        let command = ctx.pop().unwrap();
        let errorname = ctx.pop().unwrap();
        assert_eq!(errorname.as_name(), Some(Name::new(b"typecheck")));
        assert_eq!(command.as_name(), Some(Name::new(b"add")));
    }

    #[test]
    fn stack_snapshots_recorded() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ 7 (a) 1 add } stopped pop").unwrap();
        ctx.run_bytes(b"$error /ostackarray get").unwrap();
        let arr = ctx.pop().unwrap().as_array().unwrap();
        // The snapshot holds the untouched operands: 7, (a), 1.
        assert_eq!(arr.len, 3);
        assert_eq!(ctx.memory.array_get(arr, 0).unwrap().as_int(), Some(7));
    }

    #[test]
    fn handleerror_clears_newerror() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ /nope load } stopped pop handleerror").unwrap();
        assert!(!pending_error(&ctx));
    }

    #[test]
    fn user_replaced_errordict_entry_runs() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"errordict /typecheck { pop 999 } put").unwrap();
        ctx.run_bytes(b"(a) 1 add").unwrap();
        // The custom handler consumed the command name and pushed 999;
        // the original operands are untouched beneath it.
        assert_eq!(ctx.pop().unwrap().as_int(), Some(999));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
    }
}
