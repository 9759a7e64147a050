//! VM operators: save/restore, allocation mode, and user objects.
//!
//! `save` arms copy-on-write on the local heap (and on the global heap for
//! the outermost, job-level save) and pushes a graphics-state snapshot;
//! `restore` reinstalls logged stores, drops post-save allocations, and
//! performs the implicit `grestoreall`.

use crate::context::{Context, MAX_GSTATE_STACK};
use crate::dict_stack;
use postforge_core::{
    ErrorKind, Name, Object, PsResult, SaveRef, Value,
};
use postforge_runtime::DictKey;
use tracing::trace;

/// `save` save
pub fn save(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    if ctx.gstate_stack.len() >= MAX_GSTATE_STACK {
        return Err(ErrorKind::LimitCheck.into());
    }
    let sref = do_save(ctx);
    ctx.push(Object::new(Value::Save(sref)))
}

/// Arm a save level and push the graphics state. The outermost save also
/// snapshots global VM (job encapsulation).
pub fn do_save(ctx: &mut Context) -> SaveRef {
    let serial = ctx.next_save_serial();
    let job_level = ctx.memory.local.save_level() == 0;
    ctx.memory.local.begin_save(serial);
    if job_level {
        ctx.memory.global.begin_save(serial);
    }
    ctx.save_params
        .push((serial, ctx.packing, ctx.alloc_global));
    ctx.gstate_stack.push(ctx.gstate.snapshot(true));
    trace!(serial, job_level, "save");
    SaveRef { serial }
}

/// save `restore` –
pub fn restore(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let sref = match ctx.peek(0)?.value {
        Value::Save(s) => s,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    if !ctx.memory.local.has_save(sref.serial) {
        return Err(ErrorKind::InvalidRestore.into());
    }

    // Live stacks must not reference local composites younger than the
    // snapshot (PLRM 3.7.3). The save operand itself is exempt.
    for obj in ctx.o_stack.iter().rev().skip(1) {
        if ctx.memory.newer_than_save(obj, sref.serial) {
            return Err(ErrorKind::InvalidRestore.into());
        }
    }
    for item in ctx.e_stack.iter() {
        if let crate::engine::ExecItem::Obj(obj) = item {
            if ctx.memory.newer_than_save(obj, sref.serial) {
                return Err(ErrorKind::InvalidRestore.into());
            }
        }
    }
    for obj in ctx.d_stack.iter() {
        if ctx.memory.newer_than_save(obj, sref.serial) {
            return Err(ErrorKind::InvalidRestore.into());
        }
    }

    ctx.pop()?;
    do_restore(ctx, sref)
}

/// Roll VM and per-context parameters back to the snapshot.
pub fn do_restore(ctx: &mut Context, sref: SaveRef) -> PsResult<()> {
    let levels_before = ctx.memory.local.save_level();
    ctx.memory.local.restore_to(sref.serial)?;
    if ctx.memory.global.has_save(sref.serial) {
        ctx.memory.global.restore_to(sref.serial)?;
    }
    let levels_popped = levels_before - ctx.memory.local.save_level();

    // Per-context parameters are subject to save: packing and allocation
    // mode revert to their values at save time.
    while let Some((serial, packing, alloc_global)) = ctx.save_params.pop() {
        if serial <= sref.serial {
            ctx.packing = packing;
            ctx.alloc_global = alloc_global;
            break;
        }
    }

    // Implicit grestoreall, then drop the graphics state each unwound
    // save pushed (restoring past nested saves discards theirs too).
    for _ in 0..levels_popped.max(1) {
        crate::ops::gstate::do_grestoreall(ctx);
        if ctx
            .gstate_stack
            .last()
            .map(|g| g.saved_by_save)
            .unwrap_or(false)
        {
            let top = ctx.gstate_stack.pop().expect("checked non-empty");
            ctx.gstate = top;
            ctx.gstate.saved_by_save = false;
        }
    }
    trace!(serial = sref.serial, "restore");
    Ok(())
}

/// bool `setglobal` –
pub fn setglobal(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let mode = ctx.peek_bool(0)?;
    ctx.pop()?;
    ctx.alloc_global = mode;
    Ok(())
}

/// `currentglobal` bool
pub fn currentglobal(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let mode = ctx.alloc_global;
    ctx.push(Object::boolean(mode))
}

/// any `gcheck` bool — composites report their heap; simple objects are
/// values, not references, and report true.
pub fn gcheck(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = ctx.pop()?;
    let global = if obj.is_composite() {
        obj.is_global()
    } else {
        true
    };
    ctx.push(Object::boolean(global))
}

/// `vmstatus` level used maximum
pub fn vmstatus(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(3)?;
    let level = ctx.memory.local.save_level() as i32;
    let used = if ctx.alloc_global {
        ctx.memory.global.used_bytes()
    } else {
        ctx.memory.local.used_bytes()
    } as i32;
    ctx.push(Object::integer(level))?;
    ctx.push(Object::integer(used))?;
    ctx.push(Object::integer(1 << 24))
}

/// `vmreclaim` and `setvmthreshold` accept their operand and do nothing;
/// collection is the host allocator's business.
pub fn vmreclaim(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    ctx.peek_int(0)?;
    ctx.pop()?;
    Ok(())
}

const USER_OBJECTS: &[u8] = b"UserObjects";

fn user_objects(ctx: &Context) -> PsResult<Option<Object>> {
    let udict = dict_stack::userdict(ctx)
        .as_dict()
        .ok_or(ErrorKind::TypeCheck)?;
    ctx.memory
        .dict_get(udict, DictKey::Name(Name::new(USER_OBJECTS)))
}

/// index any `defineuserobject` –
pub fn defineuserobject(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let index = ctx.peek_int(1)?;
    if index < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let index = index as usize;
    let value = *ctx.peek(0)?;

    let existing = user_objects(ctx)?;
    let arr = match existing.and_then(|o| o.as_array()) {
        Some(r) if index < r.len => Object::new(Value::Array(r)),
        maybe => {
            // Create or grow: UserObjects always lives in local VM.
            let old_len = maybe.map(|r| r.len).unwrap_or(0);
            let new_len = (index + 1).max(old_len * 2).max(4);
            let mut elems = vec![Object::null(); new_len];
            if let Some(r) = maybe {
                let old = ctx.memory.array(r)?.to_vec();
                elems[..old.len()].copy_from_slice(&old);
            }
            let new_arr = ctx.new_array_in(postforge_core::Space::Local, elems);
            let udict = dict_stack::userdict(ctx)
                .as_dict()
                .ok_or(ErrorKind::TypeCheck)?;
            ctx.memory.dict_put(
                udict,
                DictKey::Name(Name::new(USER_OBJECTS)),
                new_arr,
            )?;
            new_arr
        }
    };
    ctx.pop()?;
    ctx.pop()?;
    let r = arr.as_array().ok_or(ErrorKind::TypeCheck)?;
    ctx.memory.array_put(r, index, value)
}

/// index `execuserobject` –
pub fn execuserobject(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let index = ctx.peek_int(0)?;
    if index < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let arr = user_objects(ctx)?
        .and_then(|o| o.as_array())
        .ok_or(ErrorKind::Undefined)?;
    if index as usize >= arr.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    let obj = ctx.memory.array_get(arr, index as usize)?;
    ctx.pop()?;
    ctx.e_stack.push(crate::engine::ExecItem::Obj(obj));
    Ok(())
}

/// index `undefineuserobject` –
pub fn undefineuserobject(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let index = ctx.peek_int(0)?;
    if index < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let arr = user_objects(ctx)?
        .and_then(|o| o.as_array())
        .ok_or(ErrorKind::Undefined)?;
    if index as usize >= arr.len {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.memory.array_put(arr, index as usize, Object::null())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "save", save);
    super::define_op(ctx, "restore", restore);
    super::define_op(ctx, "setglobal", setglobal);
    super::define_op(ctx, "currentglobal", currentglobal);
    super::define_op(ctx, "gcheck", gcheck);
    super::define_op(ctx, "vmstatus", vmstatus);
    super::define_op(ctx, "vmreclaim", vmreclaim);
    super::define_op(ctx, "setvmthreshold", vmreclaim);
    super::define_op(ctx, "defineuserobject", defineuserobject);
    super::define_op(ctx, "execuserobject", execuserobject);
    super::define_op(ctx, "undefineuserobject", undefineuserobject);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_restore_rolls_back_definitions() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"save /x 10 def /x 20 def restore").unwrap();
        // The pre-save userdict contents are reinstated; x is gone.
        ctx.run_bytes(b"/x where").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn scenario_second_def_rolled_back() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/x 10 def save /x 20 def restore /x load")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(10));
    }

    #[test]
    fn noop_save_restore_preserves_composites() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/a [1 2 3] def save restore a 1 get").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn restore_with_newer_composite_on_stack_fails() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ save [1 2 3] exch restore } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn vmstatus_counts_save_nesting() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"save save vmstatus").unwrap();
        ctx.pop().unwrap(); // maximum
        ctx.pop().unwrap(); // used
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }

    #[test]
    fn gcheck_reports_allocation_space() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[1] gcheck 42 gcheck true setglobal [1] gcheck false setglobal")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn setglobal_rolls_back_with_restore() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"save true setglobal restore currentglobal")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
    }

    #[test]
    fn user_objects_round_trip() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3 {1 2 add} defineuserobject 3 execuserobject")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
        ctx.run_bytes(b"3 undefineuserobject").unwrap();
    }

    #[test]
    fn restore_of_stale_save_fails() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"save dup restore { restore } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
