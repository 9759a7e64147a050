//! The job server: each top-level input runs as an encapsulated job —
//! save, execute inside a `stopped` boundary, report, restore.

use crate::context::{Context, JobRecord};
use crate::engine::{self, ExecItem};
use postforge_core::{Object, PsResult, Value};
use tracing::debug;

/// Open an encapsulated job frame without running anything (hosts driving
/// the interpreter incrementally call this once up front).
pub fn begin_encapsulated_job(ctx: &mut Context) {
    crate::ops::job::begin_job(ctx, true);
}

/// Execute a named PostScript file as one encapsulated job.
pub fn exec_job_file(ctx: &mut Context, path: &[u8]) -> PsResult<()> {
    let id = ctx.files.open(path, false)?;
    let obj = Object::new(Value::File(id)).executable();
    exec_job(ctx, obj)
}

/// Execute PostScript program text as one encapsulated job.
pub fn exec_job_bytes(ctx: &mut Context, program: &[u8]) -> PsResult<()> {
    // The program string allocates in global VM so the job save (taken
    // below) does not reclaim it mid-run.
    let was_global = ctx.alloc_global;
    ctx.alloc_global = true;
    let obj = ctx.new_string(program.to_vec()).executable();
    ctx.alloc_global = was_global;
    exec_job(ctx, obj)
}

/// The job server sequence (PLRM 3.7.7): save, clear stacks, initgraphics,
/// local allocation mode, run under a stopped boundary, report any
/// escaped error, then restore.
pub fn exec_job(ctx: &mut Context, program: Object) -> PsResult<()> {
    // 1. The outermost save captures both heaps.
    crate::ops::job::begin_job(ctx, true);
    let job = *ctx.job_stack.last().expect("job just pushed");

    // 2–4. Fresh stacks and graphics for the job.
    ctx.o_stack.clear();
    ctx.d_stack.truncate(3);
    let m = crate::ops::device::default_matrix(ctx);
    ctx.gstate.init_graphics(m);
    ctx.alloc_global = false;

    // 5. Run under a stopped boundary.
    ctx.e_stack.push(ExecItem::Stopped);
    ctx.e_stack.push(ExecItem::Obj(program));
    engine::run(ctx)?;

    // The boundary leaves a bool; report when an error escaped the job's
    // own handlers.
    let stopped = ctx
        .o_stack
        .pop()
        .and_then(|o| o.as_bool())
        .unwrap_or(false);
    if stopped && crate::errors::pending_error(ctx) {
        crate::errors::handleerror(ctx)?;
    }
    debug!(stopped, "job finished");

    cleanup_job(ctx, job)
}

/// Steps 7–9: clear stacks, drop nested startjob frames, restore VM.
fn cleanup_job(ctx: &mut Context, job: JobRecord) -> PsResult<()> {
    ctx.o_stack.clear();
    ctx.e_stack.clear();
    ctx.d_stack.truncate(3);
    // quit ends the job, not the interpreter.
    ctx.quit_requested = false;

    // Jobs started inside this file end with it.
    while let Some(top) = ctx.job_stack.last() {
        let is_this_job = match (top.save, job.save) {
            (Some(a), Some(b)) => a.serial == b.serial,
            (None, None) => top.entry_level == job.entry_level,
            _ => false,
        };
        ctx.job_stack.pop();
        if is_this_job {
            break;
        }
    }

    if let Some(sref) = job.save {
        if ctx.memory.local.has_save(sref.serial) {
            crate::ops::vm::do_restore(ctx, sref)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_isolate_vm_state() {
        let mut ctx = Context::new();
        exec_job_bytes(&mut ctx, b"/leak 1 def").unwrap();
        exec_job_bytes(&mut ctx, b"/check /leak where { pop true } { false } ifelse def")
            .unwrap();
        // Both jobs rolled back; nothing persists.
        let mut probe = Context::new();
        let _ = probe;
        assert!(ctx.job_stack.is_empty());
        assert_eq!(ctx.memory.local.save_level(), 0);
    }

    #[test]
    fn job_survives_postscript_error() {
        let mut ctx = Context::new();
        exec_job_bytes(&mut ctx, b"1 0 div").unwrap();
        // The error was handled and the interpreter is reusable.
        exec_job_bytes(&mut ctx, b"2 2 add pop").unwrap();
        assert!(ctx.o_stack.is_empty());
        assert_eq!(ctx.memory.local.save_level(), 0);
    }

    #[test]
    fn unencapsulated_startjob_escapes_rollback() {
        let mut ctx = Context::new();
        exec_job_bytes(&mut ctx, b"true (0) startjob pop /persist 7 def").unwrap();
        // The definition survived the end of the file because the job
        // escalated to unencapsulated.
        let mut found = false;
        if let Some(obj) =
            crate::dict_stack::lookup_name(&ctx, postforge_core::Name::new(b"persist"))
        {
            found = obj.as_int() == Some(7);
        }
        assert!(found);
    }
}
