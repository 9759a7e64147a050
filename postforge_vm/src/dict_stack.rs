//! Dictionary-stack name resolution (PLRM 3.4.3).
//!
//! Lookup walks the stack top→bottom, skipping dictionaries without read
//! access. A hit installs a *copy* of the value so in-place attribute
//! changes (`cvlit`, `cvx`) cannot mutate the dictionary entry; operators
//! are immutable and returned as-is.

use crate::context::Context;
use postforge_core::{ErrorKind, Name, Object, PsResult, Value};
use postforge_runtime::DictKey;

/// Indexes of the permanent dictionaries on the stack bottom.
pub const SYSTEMDICT_INDEX: usize = 0;
pub const GLOBALDICT_INDEX: usize = 1;
pub const USERDICT_INDEX: usize = 2;

pub fn systemdict(ctx: &Context) -> Object {
    ctx.d_stack[SYSTEMDICT_INDEX]
}

pub fn globaldict(ctx: &Context) -> Object {
    ctx.d_stack[GLOBALDICT_INDEX]
}

pub fn userdict(ctx: &Context) -> Object {
    ctx.d_stack[USERDICT_INDEX]
}

/// Look a key up through the dictionary stack. Returns the object that
/// should replace the name on the execution stack: operators by reference,
/// everything else by copy (`Object` is `Copy`, so the returned value is
/// already detached from the dictionary entry).
pub fn lookup(ctx: &Context, key: DictKey) -> Option<Object> {
    for entry in ctx.d_stack.iter().rev() {
        let dref = match entry.value {
            Value::Dict(d) => d,
            _ => continue,
        };
        let store = match ctx.memory.dict(dref) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if store.access < postforge_core::Access::ReadOnly {
            continue;
        }
        if let Some(found) = store.get(key) {
            return Some(found);
        }
    }
    None
}

/// Look up a name, as the engine's Path N does.
pub fn lookup_name(ctx: &Context, name: Name) -> Option<Object> {
    lookup(ctx, DictKey::Name(name))
}

/// `where` semantics: the topmost dictionary defining `key`, if any.
pub fn where_defined(ctx: &Context, key: DictKey) -> Option<Object> {
    for entry in ctx.d_stack.iter().rev() {
        let dref = match entry.value {
            Value::Dict(d) => d,
            _ => continue,
        };
        let store = match ctx.memory.dict(dref) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if store.access < postforge_core::Access::ReadOnly {
            continue;
        }
        if store.contains(key) {
            return Some(*entry);
        }
    }
    None
}

/// `def` into the current (topmost) dictionary.
pub fn define(ctx: &mut Context, key: DictKey, value: Object) -> PsResult<()> {
    let top = *ctx.d_stack.last().ok_or(ErrorKind::DictStackUnderflow)?;
    let dref = top.as_dict().ok_or(ErrorKind::TypeCheck)?;
    ctx.memory.dict(dref)?.require_access(postforge_core::Access::Unlimited)?;
    ctx.memory.dict_put(dref, key, value)
}

/// Define a named entry in systemdict during bootstrap (bypasses the
/// read-only latch systemdict gets afterwards).
pub fn define_system(ctx: &mut Context, name: &str, value: Object) {
    let dref = systemdict(ctx)
        .as_dict()
        .expect("systemdict must be a dictionary");
    let key = DictKey::Name(Name::from_str(name));
    ctx.memory
        .dict_mut(dref)
        .expect("systemdict store")
        .put(key, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn lookup_walks_top_down() {
        let mut ctx = Context::new();
        let name = Name::new(b"x");
        // Define in userdict, then shadow in a new dict on top.
        define(&mut ctx, DictKey::Name(name), Object::integer(1)).unwrap();
        let d = ctx.new_dict(4);
        ctx.d_stack.push(d);
        define(&mut ctx, DictKey::Name(name), Object::integer(2)).unwrap();

        assert_eq!(
            lookup_name(&ctx, name).and_then(|o| o.as_int()),
            Some(2)
        );
        ctx.d_stack.pop();
        assert_eq!(
            lookup_name(&ctx, name).and_then(|o| o.as_int()),
            Some(1)
        );
    }

    #[test]
    fn operators_resolve_from_systemdict() {
        let ctx = Context::new();
        let add = lookup_name(&ctx, Name::new(b"add")).expect("add must be defined");
        assert!(matches!(add.value, Value::Operator(_)));
    }

    #[test]
    fn missing_names_return_none() {
        let ctx = Context::new();
        assert!(lookup_name(&ctx, Name::new(b"no-such-name")).is_none());
    }
}
