//! Operand-stack manipulation operators.

use crate::context::Context;
use postforge_core::{ErrorKind, MarkKind, Object, PsResult, Value};

/// any `pop` –
pub fn pop(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    ctx.pop()?;
    Ok(())
}

/// any1 any2 `exch` any2 any1
pub fn exch(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let len = ctx.o_stack.len();
    ctx.o_stack.swap(len - 1, len - 2);
    Ok(())
}

/// any `dup` any any
pub fn dup(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    ctx.reserve(1)?;
    let top = *ctx.peek(0)?;
    ctx.push(top)
}

/// any1 … anyn n `copy` any1 … anyn any1 … anyn
/// (the composite `copy` lives with the polymorphic operators)
pub fn copy_n(ctx: &mut Context, n: usize) -> PsResult<()> {
    ctx.need(n + 1)?;
    ctx.reserve(n)?;
    ctx.pop()?;
    let len = ctx.o_stack.len();
    for i in 0..n {
        let obj = ctx.o_stack[len - n + i];
        ctx.o_stack.push(obj);
    }
    Ok(())
}

/// anyn … any0 n `index` anyn … any0 anyn
pub fn index(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_int(0)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.need(n as usize + 2)?;
    ctx.pop()?;
    let obj = *ctx.peek(n as usize)?;
    ctx.push(obj)
}

/// an-1 … a0 n j `roll` …
pub fn roll(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let j = ctx.peek_int(0)?;
    let n = ctx.peek_int(1)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let n = n as usize;
    ctx.need(n + 2)?;
    ctx.pop()?;
    ctx.pop()?;
    if n == 0 {
        return Ok(());
    }
    let len = ctx.o_stack.len();
    let window = &mut ctx.o_stack[len - n..];
    let shift = j.rem_euclid(n as i32) as usize;
    window.rotate_right(shift);
    Ok(())
}

/// `clear` –
pub fn clear(ctx: &mut Context) -> PsResult<()> {
    ctx.o_stack.clear();
    Ok(())
}

/// `count` int
pub fn count(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let depth = ctx.o_stack.len() as i32;
    ctx.push(Object::integer(depth))
}

/// `mark` mark
pub fn mark(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::mark())
}

/// mark … `cleartomark` –
pub fn cleartomark(ctx: &mut Context) -> PsResult<()> {
    match topmost_mark(ctx) {
        Some(pos) => {
            ctx.o_stack.truncate(pos);
            Ok(())
        }
        None => Err(ErrorKind::UnmatchedMark.into()),
    }
}

/// mark obj1 … objn `counttomark` mark obj1 … objn n
pub fn counttomark(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match topmost_mark(ctx) {
        Some(pos) => {
            let n = (ctx.o_stack.len() - pos - 1) as i32;
            ctx.push(Object::integer(n))
        }
        None => Err(ErrorKind::UnmatchedMark.into()),
    }
}

/// Index of the topmost mark of any kind.
fn topmost_mark(ctx: &Context) -> Option<usize> {
    ctx.o_stack
        .iter()
        .rposition(|o| matches!(o.value, Value::Mark(_)))
}

fn op_copy_or_poly(ctx: &mut Context) -> PsResult<()> {
    // `copy` splits: integer count duplicates stack entries, composites
    // copy contents (handled by the polymorphic module).
    ctx.need(1)?;
    match ctx.peek(0)?.value {
        Value::Integer(n) => {
            if n < 0 {
                return Err(ErrorKind::RangeCheck.into());
            }
            copy_n(ctx, n as usize)
        }
        _ => super::composite::copy_composite(ctx),
    }
}

fn op_bracket_mark(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::mark_of(MarkKind::Bracket))
}

fn op_dict_mark(ctx: &mut Context) -> PsResult<()> {
    ctx.push(Object::mark_of(MarkKind::DictOpen))
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "pop", pop);
    super::define_op(ctx, "exch", exch);
    super::define_op(ctx, "dup", dup);
    super::define_op(ctx, "copy", op_copy_or_poly);
    super::define_op(ctx, "index", index);
    super::define_op(ctx, "roll", roll);
    super::define_op(ctx, "clear", clear);
    super::define_op(ctx, "count", count);
    super::define_op(ctx, "mark", mark);
    super::define_op(ctx, "[", op_bracket_mark);
    super::define_op(ctx, "<<", op_dict_mark);
    super::define_op(ctx, "cleartomark", cleartomark);
    super::define_op(ctx, "counttomark", counttomark);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_rotates_topmost_window() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 2 3 3 1 roll").unwrap();
        let ints: Vec<i32> = ctx.o_stack.iter().filter_map(|o| o.as_int()).collect();
        assert_eq!(ints, vec![3, 1, 2]);
    }

    #[test]
    fn roll_negative_shift() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 2 3 3 -1 roll").unwrap();
        let ints: Vec<i32> = ctx.o_stack.iter().filter_map(|o| o.as_int()).collect();
        assert_eq!(ints, vec![2, 3, 1]);
    }

    #[test]
    fn index_reaches_below() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"10 20 30 2 index").unwrap();
        assert_eq!(ctx.o_stack.last().and_then(|o| o.as_int()), Some(10));
        assert_eq!(ctx.o_stack.len(), 4);
    }

    #[test]
    fn counttomark_counts_above_mark() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"mark 7 8 counttomark").unwrap();
        assert_eq!(ctx.o_stack.last().and_then(|o| o.as_int()), Some(2));
    }

    #[test]
    fn copy_duplicates_top_n() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 2 3 2 copy").unwrap();
        let ints: Vec<i32> = ctx.o_stack.iter().filter_map(|o| o.as_int()).collect();
        assert_eq!(ints, vec![1, 2, 3, 2, 3]);
    }
}
