//! The operator registry.
//!
//! Every built-in is a named `fn(&mut Context) -> PsResult<()>` sharing one
//! contract: validate with non-destructive peeks, then pop, act, and push.
//! On the error path the operand stack is untouched and the raised error
//! carries the operator's PostScript name.

pub mod array;
pub mod composite;
pub mod control;
pub mod device;
pub mod dict;
pub mod file;
pub mod font;
pub mod gstate;
pub mod insideness;
pub mod job;
pub mod math;
pub mod matrix;
pub mod misc;
pub mod packed;
pub mod paint;
pub mod params;
pub mod path;
pub mod relational;
pub mod resource;
pub mod stack;
pub mod string;
pub mod types;
pub mod vm;

use crate::context::Context;
use postforge_core::{ErrorKind, Name, Object, OperatorId, PsResult};

/// The callable signature shared by all operators.
pub type OpFn = fn(&mut Context) -> PsResult<()>;

/// Registry of built-in operators. Operator objects carry only an id;
/// the name here is the error-reporting identity.
pub struct OperatorTable {
    entries: Vec<(Name, OpFn)>,
}

impl OperatorTable {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(256),
        }
    }

    pub fn register(&mut self, name: Name, func: OpFn) -> OperatorId {
        let id = OperatorId(self.entries.len() as u16);
        self.entries.push((name, func));
        id
    }

    pub fn entry(&self, id: OperatorId) -> PsResult<(Name, OpFn)> {
        self.entries
            .get(id.0 as usize)
            .copied()
            .ok_or_else(|| ErrorKind::Unregistered.into())
    }

    pub fn name_of(&self, id: OperatorId) -> Name {
        self.entries
            .get(id.0 as usize)
            .map(|(n, _)| *n)
            .unwrap_or_else(|| Name::new(b"--unregistered--"))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OperatorTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Register one operator and bind it in systemdict.
pub fn define_op(ctx: &mut Context, name: &str, func: OpFn) {
    let n = Name::from_str(name);
    let id = ctx.ops.register(n, func);
    crate::dict_stack::define_system(ctx, name, Object::operator(id));
}

/// Install every operator category into systemdict.
pub fn install_all(ctx: &mut Context) {
    stack::install(ctx);
    math::install(ctx);
    array::install(ctx);
    packed::install(ctx);
    dict::install(ctx);
    string::install(ctx);
    composite::install(ctx);
    relational::install(ctx);
    control::install(ctx);
    types::install(ctx);
    vm::install(ctx);
    misc::install(ctx);
    matrix::install(ctx);
    file::install(ctx);
    gstate::install(ctx);
    path::install(ctx);
    paint::install(ctx);
    insideness::install(ctx);
    device::install(ctx);
    font::install(ctx);
    params::install(ctx);
    resource::install(ctx);
    job::install(ctx);
}
