//! Job-control operators: `startjob` and `exitserver` (PLRM 3.7.7).

use crate::context::{Context, JobRecord};
use crate::ops::params::password_matches;
use postforge_core::{ErrorKind, Name, Object, PsResult, Value};
use tracing::debug;

/// bool password `startjob` bool
///
/// Succeeds only when (a) the context supports job encapsulation, (b) the
/// password matches `StartJobPassword`, and (c) the save nesting level
/// equals the current job's entry level. On success the current job ends
/// (stacks reset, VM restored if encapsulated) and a new one begins —
/// unencapsulated when the bool operand is true.
pub fn startjob(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let password = *ctx.peek(0)?;
    if !matches!(password.value, Value::String(_) | Value::Integer(_)) {
        return Err(ErrorKind::TypeCheck.into());
    }
    let unencapsulated = ctx.peek_bool(1)?;

    let supports = ctx.system.job_encapsulation;
    let password_ok = password_matches(ctx, &password, &ctx.system.start_job_password.clone())?;
    let level_ok = match ctx.job_stack.last() {
        Some(job) => ctx.memory.local.save_level() == job.entry_level,
        None => true,
    };

    ctx.pop()?;
    ctx.pop()?;

    if !(supports && password_ok && level_ok) {
        debug!(password_ok, level_ok, "startjob refused");
        return ctx.push(Object::boolean(false));
    }

    end_current_job(ctx)?;
    begin_job(ctx, !unencapsulated);
    debug!(unencapsulated, "startjob");
    ctx.push(Object::boolean(true))
}

/// End the running job: clear the operand stack, reset the dictionary
/// stack to `[systemdict, globaldict, userdict]`, and restore VM when the
/// job was encapsulated.
fn end_current_job(ctx: &mut Context) -> PsResult<()> {
    ctx.o_stack.clear();
    ctx.d_stack.truncate(3);
    if let Some(job) = ctx.job_stack.pop() {
        if let Some(sref) = job.save {
            if ctx.memory.local.has_save(sref.serial) {
                crate::ops::vm::do_restore(ctx, sref)?;
            }
        }
    }
    Ok(())
}

/// Begin a job, optionally inside a fresh save boundary.
pub fn begin_job(ctx: &mut Context, encapsulated: bool) {
    ctx.alloc_global = false;
    let save = encapsulated.then(|| crate::ops::vm::do_save(ctx));
    ctx.job_stack.push(JobRecord {
        save,
        entry_level: ctx.memory.local.save_level(),
    });
}

/// password `exitserver` – — `true password startjob` with the PLRM
/// message on success, `invalidaccess` on failure; also drops
/// `serverdict` from the dictionary stack.
pub fn exitserver(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let password = *ctx.peek(0)?;
    if !matches!(password.value, Value::String(_) | Value::Integer(_)) {
        return Err(ErrorKind::TypeCheck.into());
    }
    ctx.pop()?;
    ctx.push(Object::boolean(true))?;
    ctx.push(password)?;
    startjob(ctx)?;
    let succeeded = ctx.pop()?.as_bool().unwrap_or(false);
    if !succeeded {
        return Err(ErrorKind::InvalidAccess.into());
    }

    ctx.files
        .write_stdout(b"%%[exitserver: permanent state may be changed]%%\n")?;

    // Remove serverdict from the dictionary stack, keeping the permanent
    // three.
    let serverdict = crate::dict_stack::lookup_name(ctx, Name::new(b"serverdict"))
        .and_then(|o| o.as_dict());
    if let Some(sd) = serverdict {
        for i in (3..ctx.d_stack.len()).rev() {
            if ctx.d_stack[i].as_dict() == Some(sd) {
                ctx.d_stack.remove(i);
                break;
            }
        }
    }
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "startjob", startjob);
    super::define_op(ctx, "exitserver", exitserver);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{self, ExecItem};
    use crate::files::StreamKind;
    use crate::job;
    use postforge_core::Value;

    /// Drive a program through a registry-backed stream, the way the job
    /// server drives files. Streams live outside VM, so a mid-program
    /// `startjob` restore cannot reclaim the program text.
    fn run_stream(ctx: &mut Context, program: &[u8]) {
        let id = ctx.files.register(
            b"%test".to_vec(),
            StreamKind::Reader(Box::new(std::io::Cursor::new(program.to_vec()))),
        );
        ctx.e_stack
            .push(ExecItem::Obj(Object::new(Value::File(id)).executable()));
        engine::run(ctx).unwrap();
    }

    #[test]
    fn wrong_password_returns_false_and_changes_nothing() {
        let mut ctx = Context::new();
        job::begin_encapsulated_job(&mut ctx);
        run_stream(&mut ctx, b"/keep 1 def false (wrong) startjob");
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
        run_stream(&mut ctx, b"/keep where");
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        ctx.pop().unwrap();
    }

    #[test]
    fn encapsulated_startjob_rolls_back_previous_job() {
        let mut ctx = Context::new();
        job::begin_encapsulated_job(&mut ctx);
        run_stream(&mut ctx, b"/lost 1 def false (0) startjob");
        assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(true));
        run_stream(&mut ctx, b"/lost where");
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn unencapsulated_job_persists_definitions() {
        let mut ctx = Context::new();
        job::begin_encapsulated_job(&mut ctx);
        run_stream(&mut ctx, b"true (0) startjob pop /kept 42 def");
        // A later encapsulated job still sees the definition.
        run_stream(&mut ctx, b"false (0) startjob pop kept");
        assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
    }

    #[test]
    fn startjob_refused_inside_nested_save() {
        let mut ctx = Context::new();
        job::begin_encapsulated_job(&mut ctx);
        run_stream(&mut ctx, b"save pop false (0) startjob");
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn exitserver_with_bad_password_is_invalidaccess() {
        let mut ctx = Context::new();
        job::begin_encapsulated_job(&mut ctx);
        run_stream(&mut ctx, b"{ (bad) exitserver } stopped");
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
