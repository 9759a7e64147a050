//! Control operators: conditionals, the looping family, stop/stopped,
//! and execution-stack introspection.

use crate::context::Context;
use crate::engine::{self, ExecItem, LoopFrame};
use postforge_core::{ErrorKind, Object, PsResult, Value};

/// any `exec` –
pub fn exec(ctx: &mut Context) -> PsResult<()> {
    engine::exec_gate(ctx)
}

/// bool proc `if` –
pub fn ps_if(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let proc = *ctx.peek_proc(0)?;
    let cond = ctx.peek_bool(1)?;
    ctx.exec_room()?;
    ctx.pop()?;
    ctx.pop()?;
    if cond {
        ctx.e_stack.push(ExecItem::Obj(proc));
    }
    Ok(())
}

/// bool proc1 proc2 `ifelse` –
pub fn ifelse(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let proc2 = *ctx.peek_proc(0)?;
    let proc1 = *ctx.peek_proc(1)?;
    let cond = ctx.peek_bool(2)?;
    ctx.exec_room()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.e_stack
        .push(ExecItem::Obj(if cond { proc1 } else { proc2 }));
    Ok(())
}

/// initial increment limit proc `for` –
pub fn ps_for(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let body = *ctx.peek_proc(0)?;
    let limit = ctx.peek_number(1)?;
    let increment = ctx.peek_number(2)?;
    let initial = ctx.peek_number(3)?;
    // The control variable stays integer iff all three are integers.
    let int_mode = matches!(ctx.peek(1)?.value, Value::Integer(_))
        && matches!(ctx.peek(2)?.value, Value::Integer(_))
        && matches!(ctx.peek(3)?.value, Value::Integer(_));
    for _ in 0..4 {
        ctx.pop()?;
    }
    ctx.e_stack.push(ExecItem::Loop(Box::new(LoopFrame::For {
        control: initial,
        increment,
        limit,
        int_mode,
        body,
    })));
    Ok(())
}

/// int proc `repeat` –
pub fn repeat(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let body = *ctx.peek_proc(0)?;
    let count = ctx.peek_int(1)?;
    if count < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    if count > 0 {
        ctx.e_stack
            .push(ExecItem::Loop(Box::new(LoopFrame::Repeat {
                remaining: count,
                body,
            })));
    }
    Ok(())
}

/// proc `loop` –
pub fn ps_loop(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let body = *ctx.peek_proc(0)?;
    ctx.pop()?;
    ctx.e_stack
        .push(ExecItem::Loop(Box::new(LoopFrame::Loop { body })));
    Ok(())
}

/// `exit` –
pub fn exit(ctx: &mut Context) -> PsResult<()> {
    engine::do_exit(ctx)
}

/// `stop` –
pub fn stop(ctx: &mut Context) -> PsResult<()> {
    engine::do_stop(ctx);
    Ok(())
}

/// any `stopped` bool
pub fn stopped(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = ctx.pop()?;
    ctx.e_stack.push(ExecItem::Stopped);
    // The engine executes executable objects and bounces literals back
    // to the operand stack; either way the Stopped frame reports.
    ctx.e_stack.push(ExecItem::Obj(obj));
    Ok(())
}

/// `countexecstack` int
pub fn countexecstack(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let n = ctx.e_stack.len() as i32;
    ctx.push(Object::integer(n))
}

/// array `execstack` subarray — marker frames surface as null objects.
pub fn execstack(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let r = match obj.value {
        Value::Array(r) => r,
        Value::PackedArray(_) => return Err(ErrorKind::InvalidAccess.into()),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.require_access(&obj, postforge_core::Access::Unlimited)?;
    if ctx.e_stack.len() > r.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    let snapshot: Vec<Object> = ctx
        .e_stack
        .iter()
        .map(|item| match item {
            ExecItem::Obj(o) => *o,
            _ => Object::null().executable(),
        })
        .collect();
    let n = snapshot.len();
    ctx.memory.array_put_interval(r, 0, snapshot)?;
    let view = Object {
        value: Value::Array(postforge_core::ArrayRef { len: n, ..r }),
        ..obj
    };
    ctx.push(view)
}

/// `quit` – — terminates the interpreter loop (the job server turns this
/// into end-of-job).
pub fn quit(ctx: &mut Context) -> PsResult<()> {
    ctx.quit_requested = true;
    Ok(())
}

/// int `.quitwithcode` – — exit status for shell propagation.
pub fn quit_with_code(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let code = ctx.peek_int(0)?;
    ctx.pop()?;
    ctx.exit_code = code;
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "exec", exec);
    super::define_op(ctx, "if", ps_if);
    super::define_op(ctx, "ifelse", ifelse);
    super::define_op(ctx, "for", ps_for);
    super::define_op(ctx, "repeat", repeat);
    super::define_op(ctx, "loop", ps_loop);
    super::define_op(ctx, "exit", exit);
    super::define_op(ctx, "stop", stop);
    super::define_op(ctx, "stopped", stopped);
    super::define_op(ctx, "countexecstack", countexecstack);
    super::define_op(ctx, "execstack", execstack);
    super::define_op(ctx, "quit", quit);
    super::define_op(ctx, ".quitwithcode", quit_with_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn if_true_runs_proc() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"true {42} if").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
    }

    #[test]
    fn ifelse_picks_branch() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"false {1} {2} ifelse").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn for_sums_and_stays_integer() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 1 1 4 {add} for").unwrap();
        let top = ctx.pop().unwrap();
        assert_eq!(top.as_int(), Some(10));
    }

    #[test]
    fn for_with_real_operand_pushes_reals() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0.0 0.5 1.0 {} for count").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
        assert!(matches!(
            ctx.o_stack.last().unwrap().value,
            Value::Real(_)
        ));
    }

    #[test]
    fn for_descending() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3 -1 1 {} for count").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }

    #[test]
    fn repeat_runs_n_times() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 5 {1 add} repeat").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(5));
    }

    #[test]
    fn loop_with_exit() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 { 1 add dup 3 eq {exit} if } loop").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }

    #[test]
    fn exit_escapes_only_innermost_loop() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 2 { 1 1 3 { pop exit } for 1 add } repeat")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn stopped_false_on_clean_run() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{1 2 add} stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }

    #[test]
    fn stop_unwinds_to_stopped() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ 1 stop 2 } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        // 2 never executed; 1 remains.
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
    }

    #[test]
    fn deep_tail_recursion_does_not_grow_exec_stack() {
        let mut ctx = Context::new();
        // Tail-recursive countdown: the last element of the proc is the
        // recursive call, exercised 20k deep.
        ctx.run_bytes(b"/f { dup 0 gt { 1 sub f } { pop } ifelse } def 20000 f")
            .unwrap();
        assert!(ctx.o_stack.is_empty());
    }

    #[test]
    fn exit_through_executed_file_escapes_loop() {
        use crate::files::StreamKind;
        let mut ctx = Context::new();
        let id = ctx.files.register(
            b"%sub".to_vec(),
            StreamKind::Reader(Box::new(std::io::Cursor::new(b"exit".to_vec()))),
        );
        let file = Object::new(Value::File(id)).executable();
        ctx.push(file).unwrap();
        // The file executes inside the loop body; its `exit` closes the
        // file and unwinds to the enclosing loop, not invalidexit.
        ctx.run_bytes(b"{ dup exec } loop 42").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
        assert!(matches!(ctx.pop().unwrap().value, Value::File(_)));
        assert!(!ctx.files.status(id));
    }

    #[test]
    fn non_tail_recursion_overflows_exec_stack() {
        let mut ctx = Context::new();
        // The recursive call is not in tail position, so every level
        // holds a frame until the configured limit fires.
        ctx.run_bytes(b"/f { f 1 } def { f } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn invalid_exit_caught_by_stopped() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ exit } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
