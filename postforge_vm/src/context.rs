//! The per-interpreter execution context.
//!
//! Everything the engine and operators touch hangs off one `Context`
//! handle: the four stacks, dual VM, graphics state, file registry,
//! operator table, user/system parameters, and job bookkeeping. There is
//! no process-wide mutable state apart from the name intern table.

use crate::device::{CaptureDevice, Device};
use crate::engine::ExecItem;
use crate::files::FileRegistry;
use crate::ops::OperatorTable;
use postforge_core::{
    Access, ArrayRef, Attrib, ErrorKind, Name, Object, PsResult, Space, StringRef, Value,
};
use postforge_graphics::{DisplayList, GraphicsState};
use postforge_runtime::Memory;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Default stack capacities (PLRM Appendix B typical limits).
pub const DEFAULT_MAX_OP_STACK: usize = 500;
pub const DEFAULT_MAX_EXEC_STACK: usize = 250;
pub const DEFAULT_MAX_DICT_STACK: usize = 250;
pub const MAX_GSTATE_STACK: usize = 31;

/// User interpreter parameters (`setuserparams`). A limit of zero disables
/// the corresponding check.
#[derive(Clone, Debug)]
pub struct UserParams {
    pub max_op_stack: usize,
    pub max_exec_stack: usize,
    pub max_dict_stack: usize,
    pub execution_history: bool,
    pub execution_history_size: usize,
}

impl Default for UserParams {
    fn default() -> Self {
        Self {
            max_op_stack: DEFAULT_MAX_OP_STACK,
            max_exec_stack: DEFAULT_MAX_EXEC_STACK,
            max_dict_stack: DEFAULT_MAX_DICT_STACK,
            execution_history: false,
            execution_history_size: 20,
        }
    }
}

/// System parameters (`setsystemparams`). The job password is write-only
/// through the PostScript interface.
#[derive(Clone, Debug)]
pub struct SystemParams {
    pub start_job_password: Vec<u8>,
    pub system_params_password: Vec<u8>,
    pub max_font_cache: i32,
    pub job_encapsulation: bool,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            start_job_password: b"0".to_vec(),
            system_params_password: b"0".to_vec(),
            max_font_cache: 67_108_864,
            job_encapsulation: true,
        }
    }
}

/// Ring buffer of recently dispatched objects, for post-mortem diagnostics.
pub struct ExecHistory {
    pub buf: VecDeque<Object>,
    pub paused: bool,
}

/// One active job on the job server's nesting stack.
#[derive(Clone, Copy, Debug)]
pub struct JobRecord {
    /// The VM snapshot bounding this job; `None` for unencapsulated jobs.
    pub save: Option<postforge_core::SaveRef>,
    /// Local-VM save depth at job entry, for the `startjob` level check.
    pub entry_level: u32,
}

pub struct Context {
    pub memory: Memory,
    pub ops: OperatorTable,
    pub files: FileRegistry,

    pub o_stack: Vec<Object>,
    pub e_stack: Vec<ExecItem>,
    /// Dictionary stack; every entry is a `Value::Dict` object.
    pub d_stack: Vec<Object>,

    pub gstate: GraphicsState,
    pub gstate_stack: Vec<GraphicsState>,
    /// Registry backing `gstate`/`currentgstate`/`setgstate` objects.
    pub gstate_objects: FxHashMap<u32, GraphicsState>,
    next_gstate_id: u32,

    pub display_list: DisplayList,
    /// Clip version the display list last synchronized to; a paint after
    /// grestore re-emits the active clip when this falls behind.
    pub emitted_clip_version: u64,
    /// Output devices, keyed by the `/OutputDevice` page-device name.
    pub devices: FxHashMap<Name, Box<dyn Device>>,

    /// VM allocation mode: `true` targets global VM.
    pub alloc_global: bool,
    /// Array packing mode (`setpacking`), subject to save/restore.
    pub packing: bool,
    /// Deferred-execution depth while `{ … }` bodies are being scanned.
    pub proc_count: usize,

    pub params: UserParams,
    pub system: SystemParams,

    pub history: ExecHistory,

    /// Monotonic source for save serials.
    next_save_serial: u64,
    /// `(serial, packing, alloc_global)` at each save, for restore.
    pub save_params: Vec<(u64, bool, bool)>,
    /// FontID mint for `definefont`.
    next_font_id: u32,

    pub job_stack: Vec<JobRecord>,

    /// Periodic engine callback (interactive hosts pump their event loop).
    pub pump: Option<Box<dyn FnMut()>>,
    pub pump_counter: u32,
    /// External cancellation: checked at the top of the engine loop and
    /// injected as an `interrupt` error.
    pub interrupt: Arc<AtomicBool>,
    /// Set by `quit`; the engine drains and returns.
    pub quit_requested: bool,
    pub exit_code: i32,

    /// Linear-congruential state for `rand`/`srand`/`rrand`.
    pub rand_state: u32,

    pub start_time: Instant,
}

impl Context {
    /// A bare context: stacks, VM, file proxies, and an empty operator
    /// table. [`crate::init::bootstrap`] turns it into a full interpreter.
    pub fn bare() -> Self {
        Self {
            memory: Memory::new(),
            ops: OperatorTable::new(),
            files: FileRegistry::with_standard_io(),
            o_stack: Vec::with_capacity(64),
            e_stack: Vec::with_capacity(64),
            d_stack: Vec::with_capacity(8),
            gstate: GraphicsState::new(),
            gstate_stack: Vec::new(),
            gstate_objects: FxHashMap::default(),
            next_gstate_id: 0,
            display_list: DisplayList::new(),
            emitted_clip_version: 0,
            devices: FxHashMap::default(),
            alloc_global: false,
            packing: false,
            proc_count: 0,
            params: UserParams::default(),
            system: SystemParams::default(),
            history: ExecHistory {
                buf: VecDeque::with_capacity(20),
                paused: false,
            },
            next_save_serial: 0,
            save_params: Vec::new(),
            next_font_id: 0,
            job_stack: Vec::new(),
            pump: None,
            pump_counter: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            quit_requested: false,
            exit_code: 0,
            rand_state: 0x2545_F491,
            start_time: Instant::now(),
        }
    }

    /// A fully initialized interpreter with systemdict, errordict, the
    /// default page device, and a capture output device installed.
    pub fn new() -> Self {
        let mut ctx = Self::bare();
        ctx.devices
            .insert(Name::new(b"Capture"), Box::new(CaptureDevice::new()));
        crate::init::bootstrap(&mut ctx);
        ctx
    }

    // -------------------------------------------------------------------
    // Operand stack
    // -------------------------------------------------------------------

    /// Push with the configured capacity check: `stackoverflow` fires
    /// exactly at the limit, never one short.
    pub fn push(&mut self, obj: Object) -> PsResult<()> {
        if self.params.max_op_stack != 0 && self.o_stack.len() >= self.params.max_op_stack {
            return Err(ErrorKind::StackOverflow.into());
        }
        self.o_stack.push(obj);
        Ok(())
    }

    /// Room for `n` more results, checked before any mutation.
    pub fn reserve(&self, n: usize) -> PsResult<()> {
        if self.params.max_op_stack != 0 && self.o_stack.len() + n > self.params.max_op_stack {
            return Err(ErrorKind::StackOverflow.into());
        }
        Ok(())
    }

    /// Non-destructive peek, `depth` objects below the top.
    pub fn peek(&self, depth: usize) -> PsResult<&Object> {
        let len = self.o_stack.len();
        if depth >= len {
            return Err(ErrorKind::StackUnderflow.into());
        }
        Ok(&self.o_stack[len - 1 - depth])
    }

    /// Room for one more execution-stack frame (`execstackoverflow`
    /// otherwise).
    pub fn exec_room(&self) -> PsResult<()> {
        if self.params.max_exec_stack != 0 && self.e_stack.len() >= self.params.max_exec_stack {
            return Err(ErrorKind::ExecStackOverflow.into());
        }
        Ok(())
    }

    /// Validate that at least `n` operands are present.
    pub fn need(&self, n: usize) -> PsResult<()> {
        if self.o_stack.len() < n {
            return Err(ErrorKind::StackUnderflow.into());
        }
        Ok(())
    }

    /// Pop after validation has already succeeded.
    pub fn pop(&mut self) -> PsResult<Object> {
        self.o_stack.pop().ok_or_else(|| ErrorKind::StackUnderflow.into())
    }

    // -------------------------------------------------------------------
    // Typed operand accessors (non-destructive; operators peek, validate,
    // then pop)
    // -------------------------------------------------------------------

    pub fn peek_number(&self, depth: usize) -> PsResult<f64> {
        self.peek(depth)?
            .number()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    pub fn peek_int(&self, depth: usize) -> PsResult<i32> {
        self.peek(depth)?
            .as_int()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    pub fn peek_bool(&self, depth: usize) -> PsResult<bool> {
        self.peek(depth)?
            .as_bool()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    pub fn peek_string(&self, depth: usize) -> PsResult<StringRef> {
        self.peek(depth)?
            .as_string()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    pub fn peek_array(&self, depth: usize) -> PsResult<ArrayRef> {
        self.peek(depth)?
            .as_array()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    pub fn peek_dict(&self, depth: usize) -> PsResult<postforge_core::DictRef> {
        self.peek(depth)?
            .as_dict()
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    }

    /// A procedure operand: an executable array or packed array.
    pub fn peek_proc(&self, depth: usize) -> PsResult<&Object> {
        let obj = self.peek(depth)?;
        match obj.value {
            Value::Array(_) | Value::PackedArray(_) if obj.attrib == Attrib::Executable => Ok(obj),
            _ => Err(ErrorKind::TypeCheck.into()),
        }
    }

    /// Enforce a minimum access level on an operand.
    pub fn require_access(&self, obj: &Object, min: Access) -> PsResult<()> {
        if self.memory.access_of(obj) < min {
            return Err(ErrorKind::InvalidAccess.into());
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // Allocation in the current VM mode
    // -------------------------------------------------------------------

    #[inline]
    pub fn alloc_space(&self) -> Space {
        if self.alloc_global {
            Space::Global
        } else {
            Space::Local
        }
    }

    pub fn new_array(&mut self, elems: Vec<Object>) -> Object {
        let r = self.memory.alloc_array(self.alloc_space(), elems);
        Object::new(Value::Array(r))
    }

    pub fn new_string(&mut self, bytes: Vec<u8>) -> Object {
        let r = self.memory.alloc_string(self.alloc_space(), bytes);
        Object::new(Value::String(r))
    }

    pub fn new_dict(&mut self, capacity: usize) -> Object {
        let r = self.memory.alloc_dict(self.alloc_space(), capacity);
        Object::new(Value::Dict(r))
    }

    /// Allocate in an explicit space regardless of the current mode.
    pub fn new_dict_in(&mut self, space: Space, capacity: usize) -> Object {
        let r = self.memory.alloc_dict(space, capacity);
        Object::new(Value::Dict(r))
    }

    pub fn new_string_in(&mut self, space: Space, bytes: Vec<u8>) -> Object {
        let r = self.memory.alloc_string(space, bytes);
        Object::new(Value::String(r))
    }

    pub fn new_array_in(&mut self, space: Space, elems: Vec<Object>) -> Object {
        let r = self.memory.alloc_array(space, elems);
        Object::new(Value::Array(r))
    }

    // -------------------------------------------------------------------
    // Identifiers
    // -------------------------------------------------------------------

    pub fn next_save_serial(&mut self) -> u64 {
        self.next_save_serial += 1;
        self.next_save_serial
    }

    pub fn next_font_id(&mut self) -> postforge_core::FontId {
        self.next_font_id += 1;
        postforge_core::FontId(self.next_font_id)
    }

    pub fn next_gstate_id(&mut self) -> u32 {
        self.next_gstate_id += 1;
        self.next_gstate_id
    }

    // -------------------------------------------------------------------
    // Execution history
    // -------------------------------------------------------------------

    pub fn record_execution(&mut self, obj: Object) {
        if !self.params.execution_history || self.history.paused {
            return;
        }
        if self.history.buf.len() >= self.params.execution_history_size.max(1) {
            self.history.buf.pop_front();
        }
        self.history.buf.push_back(obj);
    }

    // -------------------------------------------------------------------
    // Convenience entry points
    // -------------------------------------------------------------------

    /// Execute PostScript program text against this context, without job
    /// encapsulation. Stacks and VM state persist across calls.
    pub fn run_bytes(&mut self, program: &[u8]) -> PsResult<()> {
        let obj = self
            .new_string(program.to_vec())
            .executable();
        self.e_stack.push(ExecItem::Obj(obj));
        crate::engine::run(self)
    }

    /// Captured pages of the default capture device, for hosts and tests.
    pub fn captured_pages(&self) -> Vec<DisplayList> {
        self.devices
            .get(&Name::new(b"Capture"))
            .and_then(|d| d.as_capture())
            .map(|c| c.pages())
            .unwrap_or_default()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
