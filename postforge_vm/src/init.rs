//! Interpreter bootstrap: dictionaries, operators, error machinery, and
//! the initial graphics environment.

use crate::context::Context;
use crate::dict_stack;
use postforge_core::{Access, Name, Object, Space};
use postforge_runtime::DictKey;

/// Turn a bare context into a full interpreter.
///
/// Order matters: the permanent dictionaries must exist before operators
/// can be defined into systemdict, and the error machinery references
/// operators by name.
pub fn bootstrap(ctx: &mut Context) {
    // The permanent dictionary stack: [systemdict, globaldict, userdict].
    let systemdict = ctx.new_dict_in(Space::Global, 512);
    let globaldict = ctx.new_dict_in(Space::Global, 64);
    let userdict = ctx.new_dict_in(Space::Local, 128);
    ctx.d_stack.push(systemdict);
    ctx.d_stack.push(globaldict);
    ctx.d_stack.push(userdict);

    // Self-references and the permanent dictionaries by name.
    dict_stack::define_system(ctx, "systemdict", systemdict);
    dict_stack::define_system(ctx, "globaldict", globaldict);
    dict_stack::define_system(ctx, "userdict", userdict);

    // Constants.
    dict_stack::define_system(ctx, "true", Object::boolean(true));
    dict_stack::define_system(ctx, "false", Object::boolean(false));
    dict_stack::define_system(ctx, "languagelevel", Object::integer(2));
    let product = ctx.new_string_in(Space::Global, b"PostForge".to_vec());
    dict_stack::define_system(ctx, "product", product.with_access(Access::ReadOnly));
    dict_stack::define_system(ctx, "revision", Object::integer(1));
    dict_stack::define_system(ctx, "serialnumber", Object::integer(0));

    // The operator registry.
    crate::ops::install_all(ctx);
    crate::errors::install_ops(ctx);

    // Error protocol (needs .recorderror and handleerror).
    crate::errors::init_error_machinery(ctx);

    // Font registries and StandardEncoding.
    let font_dir = ctx.new_dict_in(Space::Local, 32);
    dict_stack::define_system(ctx, "FontDirectory", font_dir);
    let global_font_dir = ctx.new_dict_in(Space::Global, 32);
    dict_stack::define_system(ctx, "GlobalFontDirectory", global_font_dir);
    let encoding = crate::ops::font::build_standard_encoding(ctx);
    dict_stack::define_system(ctx, "StandardEncoding", encoding);
    dict_stack::define_system(ctx, "ISOLatin1Encoding", encoding);

    // Resource registry.
    crate::ops::resource::init_registry(ctx);

    // Level 1 compatibility dictionaries.
    let statusdict = ctx.new_dict_in(Space::Global, 16);
    dict_stack::define_system(ctx, "statusdict", statusdict);
    let serverdict = ctx.new_dict_in(Space::Global, 8);
    dict_stack::define_system(ctx, "serverdict", serverdict);

    // Standard file objects by name.
    let stdin_obj = Object::new(postforge_core::Value::File(ctx.files.stdin_id)).executable();
    let stdout_obj = Object::new(postforge_core::Value::File(ctx.files.stdout_id));
    let stderr_obj = Object::new(postforge_core::Value::File(ctx.files.stderr_id));
    dict_stack::define_system(ctx, "%stdin", stdin_obj);
    dict_stack::define_system(ctx, "%stdout", stdout_obj);
    dict_stack::define_system(ctx, "%stderr", stderr_obj);

    // userdict conveniences: #copies for Level 1 programs.
    if let Some(udref) = userdict.as_dict() {
        let _ = ctx.memory.dict_put(
            udref,
            DictKey::Name(Name::new(b"#copies")),
            Object::integer(1),
        );
    }

    // Initial graphics environment: default page device, CTM, full-page
    // clip.
    let pd = crate::ops::device::build_default_page_device(ctx);
    ctx.gstate.page_device = Some(pd);
    let m = crate::ops::device::default_matrix(ctx);
    ctx.gstate.init_graphics(m);
    let outline = crate::ops::device::page_outline(ctx);
    ctx.gstate.clip_path = outline;

    // systemdict latches read-only once fully populated.
    if let Some(dref) = systemdict.as_dict() {
        if let Ok(store) = ctx.memory.dict_mut(dref) {
            store.access = Access::ReadOnly;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use postforge_core::ErrorKind;

    #[test]
    fn initial_dict_stack_shape() {
        let ctx = Context::new();
        assert_eq!(ctx.d_stack.len(), 3);
        let sys = dict_stack::systemdict(&ctx).as_dict().unwrap();
        assert_eq!(ctx.memory.dict(sys).unwrap().access, Access::ReadOnly);
    }

    #[test]
    fn systemdict_rejects_definitions() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ systemdict /x 1 put } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn def_targets_userdict() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"/probe 5 def userdict /probe known").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn errordict_has_all_error_names() {
        let mut ctx = Context::new();
        for kind in ErrorKind::ALL {
            let program = format!("errordict /{} known", kind.ps_name());
            ctx.run_bytes(program.as_bytes()).unwrap();
            assert_eq!(
                ctx.pop().unwrap().as_bool(),
                Some(true),
                "missing errordict entry for {}",
                kind.ps_name()
            );
        }
    }

    #[test]
    fn operator_count_is_substantial() {
        let ctx = Context::new();
        assert!(ctx.ops.len() > 200, "got {} operators", ctx.ops.len());
    }
}
