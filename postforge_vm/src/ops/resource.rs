//! Named resource operators (PLRM 3.9): `defineresource`,
//! `findresource`, `undefineresource`, `resourcestatus`,
//! `resourceforall`.
//!
//! Instances live in per-category dictionaries under the hidden
//! `.resources` entry in systemdict; the Font category aliases
//! FontDirectory so `findfont` and `/Font findresource` agree.

use crate::context::Context;
use crate::dict_stack;
use crate::engine::{ExecItem, LoopFrame};
use postforge_core::{Access, ErrorKind, Name, Object, PsResult};
use postforge_runtime::DictKey;

/// The built-in resource categories.
const CATEGORIES: &[&str] = &[
    "Font",
    "Encoding",
    "Pattern",
    "ColorSpace",
    "Form",
    "Halftone",
    "ProcSet",
    "CMap",
    "CIDFont",
    "ColorRendering",
    "Category",
    "Generic",
];

pub fn is_category(name: Name) -> bool {
    CATEGORIES
        .iter()
        .any(|c| Name::from_str(c) == name)
}

fn registry(ctx: &Context) -> PsResult<postforge_core::DictRef> {
    dict_stack::lookup_name(ctx, Name::new(b".resources"))
        .and_then(|o| o.as_dict())
        .ok_or_else(|| ErrorKind::Undefined.into())
}

/// The instance dictionary of one category.
fn category_dict(ctx: &mut Context, category: Name) -> PsResult<postforge_core::DictRef> {
    if !is_category(category) {
        return Err(ErrorKind::UndefinedResource.into());
    }
    if category == Name::new(b"Font") {
        return dict_stack::lookup_name(ctx, Name::new(b"FontDirectory"))
            .and_then(|o| o.as_dict())
            .ok_or_else(|| ErrorKind::Undefined.into());
    }
    let reg = registry(ctx)?;
    if let Some(existing) = ctx.memory.dict_get(reg, DictKey::Name(category))? {
        return existing.as_dict().ok_or_else(|| ErrorKind::TypeCheck.into());
    }
    let fresh = ctx.new_dict_in(postforge_core::Space::Global, 16);
    ctx.memory.dict_put(reg, DictKey::Name(category), fresh)?;
    fresh
        .as_dict()
        .ok_or_else(|| ErrorKind::VmError.into())
}

/// Install the hidden registry during bootstrap.
pub fn init_registry(ctx: &mut Context) {
    let reg = ctx.new_dict_in(postforge_core::Space::Global, CATEGORIES.len() + 2);
    dict_stack::define_system(ctx, ".resources", reg);
}

/// key instance category `defineresource` instance
pub fn defineresource(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let category = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let instance = *ctx.peek(1)?;
    let k = ctx.memory.dict_key(ctx.peek(2)?)?;
    let dict = category_dict(ctx, category)?;
    ctx.memory.dict_put(dict, k, instance)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(instance)
}

/// key category `undefineresource` –
pub fn undefineresource(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let category = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let k = ctx.memory.dict_key(ctx.peek(1)?)?;
    let dict = category_dict(ctx, category)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.memory.dict_mut(dict)?.remove(k);
    Ok(())
}

/// key category `findresource` instance
pub fn findresource(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let category = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let k = ctx.memory.dict_key(ctx.peek(1)?)?;
    let dict = category_dict(ctx, category)?;
    match ctx.memory.dict_get(dict, k)? {
        Some(instance) => {
            ctx.pop()?;
            ctx.pop()?;
            ctx.push(instance)
        }
        None => {
            // Built-in fallbacks keep the standard names resolvable.
            if category == Name::new(b"Encoding") {
                if let DictKey::Name(n) = k {
                    if n == Name::new(b"StandardEncoding") {
                        if let Some(enc) =
                            dict_stack::lookup_name(ctx, Name::new(b"StandardEncoding"))
                        {
                            ctx.pop()?;
                            ctx.pop()?;
                            return ctx.push(enc);
                        }
                    }
                }
            }
            Err(ErrorKind::UndefinedResource.into())
        }
    }
}

/// key category `resourcestatus` status size true | false
pub fn resourcestatus(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let category = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let k = ctx.memory.dict_key(ctx.peek(1)?)?;
    let dict = category_dict(ctx, category)?;
    let found = ctx.memory.dict(dict)?.contains(k);
    ctx.reserve(1)?;
    ctx.pop()?;
    ctx.pop()?;
    if found {
        // Status 0: defined in VM; size is not meaningful here.
        ctx.push(Object::integer(0))?;
        ctx.push(Object::integer(0))?;
        ctx.push(Object::boolean(true))
    } else {
        ctx.push(Object::boolean(false))
    }
}

/// template proc scratch category `resourceforall` –
pub fn resourceforall(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let category = ctx.peek(0)?.as_name().ok_or(ErrorKind::TypeCheck)?;
    let scratch = ctx.peek_string(1)?;
    ctx.require_access(ctx.peek(1)?, Access::Unlimited)?;
    let body = *ctx.peek_proc(2)?;
    let template_ref = ctx.peek_string(3)?;
    let template = ctx.memory.string_vec(template_ref)?;
    let dict = category_dict(ctx, category)?;

    let mut names: Vec<Vec<u8>> = ctx
        .memory
        .dict(dict)?
        .iter_ordered()
        .filter_map(|(k, _)| match k {
            DictKey::Name(n) => Some(n.as_bytes().to_vec()),
            _ => None,
        })
        .filter(|name| template_match(&template, name))
        .collect();
    names.sort();

    for _ in 0..4 {
        ctx.pop()?;
    }
    ctx.e_stack
        .push(ExecItem::Loop(Box::new(LoopFrame::FilenameForall {
            names,
            index: 0,
            scratch,
            body,
        })));
    Ok(())
}

fn template_match(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => (0..=name.len()).any(|s| template_match(rest, &name[s..])),
        (Some((b'?', rest)), Some((_, tail))) => template_match(rest, tail),
        (Some((p, rest)), Some((n, tail))) if p == n => template_match(rest, tail),
        _ => false,
    }
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "defineresource", defineresource);
    super::define_op(ctx, "undefineresource", undefineresource);
    super::define_op(ctx, "findresource", findresource);
    super::define_op(ctx, "resourcestatus", resourcestatus);
    super::define_op(ctx, "resourceforall", resourceforall);
}
