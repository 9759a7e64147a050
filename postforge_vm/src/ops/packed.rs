//! Packed-array operators. Packed arrays are always read-only.

use crate::context::Context;
use postforge_core::{Access, ErrorKind, Object, PsResult, Value};

/// any0 … anyn-1 n `packedarray` packedarray
pub fn packedarray(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_int(0)?;
    if n < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let n = n as usize;
    ctx.need(n + 1)?;
    ctx.pop()?;
    let base = ctx.o_stack.len() - n;
    let elems = ctx.o_stack.split_off(base);
    let r = ctx.memory.alloc_array(ctx.alloc_space(), elems);
    ctx.push(
        Object::new(Value::PackedArray(r)).with_access(Access::ReadOnly),
    )
}

/// bool `setpacking` – — selects the representation `{ … }` builds.
pub fn setpacking(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let mode = ctx.peek_bool(0)?;
    ctx.pop()?;
    ctx.packing = mode;
    Ok(())
}

/// `currentpacking` bool
pub fn currentpacking(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let packing = ctx.packing;
    ctx.push(Object::boolean(packing))
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "packedarray", packedarray);
    super::define_op(ctx, "setpacking", setpacking);
    super::define_op(ctx, "currentpacking", currentpacking);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packedarray_collects_operands() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 2 3 3 packedarray").unwrap();
        let obj = ctx.pop().unwrap();
        assert!(matches!(obj.value, Value::PackedArray(_)));
        assert_eq!(obj.access, Access::ReadOnly);
        assert_eq!(obj.as_array().unwrap().len, 3);
    }

    #[test]
    fn setpacking_changes_procedure_representation() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"true setpacking {1 2} currentpacking").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
        let proc = ctx.pop().unwrap();
        assert!(matches!(proc.value, Value::PackedArray(_)));
        assert!(proc.is_executable());
    }

    #[test]
    fn packed_procedures_execute() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"true setpacking {1 2 add} exec").unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
    }
}
