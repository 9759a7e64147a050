//! The execution engine: a flat state machine over the execution stack.
//!
//! Each iteration classifies the top frame into one of five paths —
//! literal, operator, executable name, tokenizable, procedure — or one of
//! the control markers (Stopped, Loop, HardReturn). PostScript errors are
//! in-band: a failing operator returns `Err`, and [`handle_error`] arranges
//! the PLRM error protocol on the stacks instead of unwinding the host.

use crate::context::Context;
use crate::dict_stack;
use crate::scanner::{self, ScanOutcome, ScanSource};
use postforge_core::{
    Access, ArrayRef, Attrib, Error, ErrorKind, Name, Object, PsResult, StringRef, Value,
};
use postforge_graphics::{Matrix, PathSeg};
use std::sync::atomic::Ordering;
use tracing::debug;

/// Engine iterations between pump-callback invocations.
const PUMP_INTERVAL: u32 = 10_000;

/// One frame of the execution stack.
pub enum ExecItem {
    Obj(Object),
    /// An active looping context with its per-iteration state.
    Loop(Box<LoopFrame>),
    /// `stopped` boundary: reached naturally, pushes `false`.
    Stopped,
    /// Returns control from an embedded job without unwinding further.
    HardReturn,
}

/// Per-variant state for looping contexts (PLRM looping operators).
pub enum LoopFrame {
    Loop {
        body: Object,
    },
    Repeat {
        remaining: i32,
        body: Object,
    },
    For {
        control: f64,
        increment: f64,
        limit: f64,
        /// Control variable stays an integer while all three operands were
        /// integers.
        int_mode: bool,
        body: Object,
    },
    ForallArray {
        array: ArrayRef,
        index: usize,
        body: Object,
    },
    ForallString {
        string: StringRef,
        index: usize,
        body: Object,
    },
    ForallDict {
        entries: Vec<(Object, Object)>,
        index: usize,
        body: Object,
    },
    PathForall {
        segs: Vec<PathSeg>,
        index: usize,
        /// Inverse CTM at loop start: coordinates report in user space.
        ictm: Matrix,
        move_proc: Object,
        line_proc: Object,
        curve_proc: Object,
        close_proc: Object,
    },
    FilenameForall {
        names: Vec<Vec<u8>>,
        index: usize,
        scratch: StringRef,
        body: Object,
    },
    Kshow {
        string: StringRef,
        index: usize,
        body: Object,
    },
    Cshow {
        string: StringRef,
        index: usize,
        body: Object,
    },
}

/// Drain the entire execution stack.
pub fn run(ctx: &mut Context) -> PsResult<()> {
    run_above(ctx, 0);
    Ok(())
}

/// Drive the engine until the execution stack drops back to `base` depth.
pub fn run_above(ctx: &mut Context, base: usize) {
    while ctx.e_stack.len() > base {
        if ctx.quit_requested {
            ctx.e_stack.truncate(base);
            break;
        }

        ctx.pump_counter += 1;
        if ctx.pump_counter >= PUMP_INTERVAL {
            ctx.pump_counter = 0;
            if let Some(pump) = ctx.pump.as_mut() {
                pump();
            }
        }

        if ctx.interrupt.swap(false, Ordering::Relaxed) {
            handle_error(
                ctx,
                Error::new(ErrorKind::Interrupt, Name::new(b"interrupt")),
            );
            continue;
        }

        if let Err(err) = step(ctx) {
            handle_error(ctx, err);
        }
    }
}

/// Execute an object as a nested call (EndPage procedures, tint
/// transforms): a HardReturn frame bounds the unwind.
pub fn call_procedure(ctx: &mut Context, proc: Object) -> PsResult<()> {
    let base = ctx.e_stack.len();
    ctx.e_stack.push(ExecItem::HardReturn);
    ctx.e_stack.push(ExecItem::Obj(proc));
    run_above(ctx, base);
    Ok(())
}

/// One engine iteration.
fn step(ctx: &mut Context) -> PsResult<()> {
    let top_index = ctx.e_stack.len() - 1;
    match &mut ctx.e_stack[top_index] {
        ExecItem::Stopped => {
            // Reached naturally: no stop fired inside.
            ctx.e_stack.pop();
            ctx.o_stack.push(Object::boolean(false));
            Ok(())
        }
        ExecItem::HardReturn => {
            ctx.e_stack.pop();
            Ok(())
        }
        ExecItem::Loop(_) => step_loop(ctx, top_index),
        ExecItem::Obj(obj) => {
            let obj = *obj;
            step_object(ctx, obj, top_index)
        }
    }
}

fn record_history(ctx: &mut Context, obj: &Object) {
    if !ctx.params.execution_history || ctx.history.paused {
        return;
    }
    // The history-control operators themselves stay out of the trace.
    if let Value::Operator(id) = obj.value {
        let name = ctx.ops.name_of(id);
        if name == Name::new(b"pauseexechistory") || name == Name::new(b"resumeexechistory") {
            return;
        }
    }
    ctx.record_execution(*obj);
}

fn step_object(ctx: &mut Context, obj: Object, top_index: usize) -> PsResult<()> {
    // PATH L: literals push onto the operand stack.
    if obj.is_simple_literal_type() || obj.attrib == Attrib::Literal {
        record_history(ctx, &obj);
        ctx.e_stack.pop();
        ctx.o_stack.push(obj);
        return Ok(());
    }

    match obj.value {
        // PATH O: operators execute their callable.
        Value::Operator(id) => {
            record_history(ctx, &obj);
            ctx.e_stack.pop();
            let (name, func) = ctx.ops.entry(id)?;
            func(ctx).map_err(|mut e| {
                if e.command.is_none() {
                    e.command = Some(name);
                }
                e
            })
        }

        // PATH N: executable names resolve through the dictionary stack
        // and the binding replaces the name for the next iteration.
        Value::Name(name) => {
            record_history(ctx, &obj);
            match dict_stack::lookup_name(ctx, name) {
                // Copy-on-lookup is inherent: `Object` is a value; the
                // dictionary entry cannot be mutated through this copy.
                Some(found) => {
                    ctx.e_stack[top_index] = ExecItem::Obj(found);
                    Ok(())
                }
                None => Err(Error::new(ErrorKind::Undefined, name)),
            }
        }

        // PATH T: tokenizable objects yield one token per iteration.
        Value::File(_) | Value::String(_) => step_tokenize(ctx, obj, top_index),

        // PATH A: procedures peel their front element.
        Value::Array(r) | Value::PackedArray(r) => step_procedure(ctx, r, top_index),

        // Executable scalars of other types behave as literals.
        _ => {
            record_history(ctx, &obj);
            ctx.e_stack.pop();
            ctx.o_stack.push(obj);
            Ok(())
        }
    }
}

/// PATH T: ask the scanner for one token; EOF pops the stream.
fn step_tokenize(ctx: &mut Context, obj: Object, top_index: usize) -> PsResult<()> {
    let mut src = match obj.value {
        Value::File(id) => ScanSource::File(id),
        Value::String(sref) => ScanSource::Str { sref, pos: 0 },
        _ => return Err(ErrorKind::TypeCheck.into()),
    };

    let outcome = scanner::scan_token(ctx, &mut src, true);

    // Executable strings are consumed in place: the object on the
    // execution stack shrinks by the bytes scanned.
    if let ScanSource::Str { pos, .. } = src {
        if let Some(ExecItem::Obj(top)) = ctx.e_stack.get_mut(top_index) {
            if let Value::String(r) = &mut top.value {
                let eaten = pos.min(r.len);
                r.start += eaten;
                r.len -= eaten;
            }
        }
    }

    match outcome? {
        ScanOutcome::Eof => {
            if let Value::File(id) = obj.value {
                ctx.files.close(id);
            }
            ctx.e_stack.pop();
            Ok(())
        }
        ScanOutcome::Token { do_exec } => {
            if do_exec {
                exec_gate(ctx)
            } else {
                Ok(())
            }
        }
    }
}

/// PATH A: peel the front element of a procedure.
///
/// The last element replaces the procedure frame when it is itself
/// executable (tail-call optimization): deep PostScript recursion does not
/// grow the execution stack.
fn step_procedure(ctx: &mut Context, r: ArrayRef, top_index: usize) -> PsResult<()> {
    if r.len == 0 {
        ctx.e_stack.pop();
        return Ok(());
    }

    let elem = ctx.memory.array_get(r, 0)?;
    let is_nested_proc = matches!(elem.value, Value::Array(_) | Value::PackedArray(_))
        && elem.attrib == Attrib::Executable;

    let advance = |ctx: &mut Context| {
        if let Some(ExecItem::Obj(top)) = ctx.e_stack.get_mut(top_index) {
            if let Value::Array(ar) | Value::PackedArray(ar) = &mut top.value {
                ar.start += 1;
                ar.len -= 1;
            }
        }
    };

    if is_nested_proc || elem.attrib == Attrib::Literal {
        // Nested procedures are data: they push like literals.
        advance(ctx);
        ctx.o_stack.push(elem);
        // A lone trailing literal leaves an empty frame; drop it now.
        if r.len == 1 {
            ctx.e_stack.pop();
        }
        Ok(())
    } else if r.len == 1 {
        // Tail position: the element replaces the exhausted procedure.
        ctx.e_stack[top_index] = ExecItem::Obj(elem);
        Ok(())
    } else {
        ctx.exec_room()?;
        advance(ctx);
        ctx.e_stack.push(ExecItem::Obj(elem));
        Ok(())
    }
}

/// The `exec` gate shared by the engine's tokenizer path and the `exec`
/// operator: executable objects move to the execution stack, everything
/// else stays put. While a procedure body is being collected
/// (`proc_count > 0`) only the closing `}` executes.
pub fn exec_gate(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    ctx.exec_room()?;
    let obj = *ctx.peek(0)?;
    if ctx.memory.access_of(&obj) < Access::ReadOnly && obj.is_composite() {
        return Err(ErrorKind::InvalidAccess.into());
    }

    // `}` closes a deferred procedure body and always executes.
    if let Value::Name(n) = obj.value {
        if obj.attrib == Attrib::Executable && n == Name::new(b"}") {
            ctx.pop()?;
            ctx.e_stack.push(ExecItem::Obj(obj));
            return Ok(());
        }
    }

    if ctx.proc_count != 0 {
        return Ok(());
    }

    match obj.value {
        Value::File(_) | Value::String(_) if obj.attrib == Attrib::Executable => {
            ctx.pop()?;
            ctx.e_stack.push(ExecItem::Obj(obj));
        }
        Value::Name(name) if obj.attrib == Attrib::Executable => {
            let found =
                dict_stack::lookup_name(ctx, name).ok_or(Error::new(ErrorKind::Undefined, name))?;
            ctx.pop()?;
            ctx.e_stack.push(ExecItem::Obj(found));
        }
        Value::Operator(_) => {
            ctx.pop()?;
            ctx.e_stack.push(ExecItem::Obj(obj));
        }
        Value::Array(_) | Value::PackedArray(_) if obj.attrib == Attrib::Executable => {
            ctx.pop()?;
            ctx.e_stack.push(ExecItem::Obj(obj));
        }
        _ => {}
    }
    Ok(())
}

/// What one loop-frame dispatch decided, computed while the frame is
/// borrowed and performed after the borrow ends.
enum LoopAction {
    /// Loop finished: pop the frame.
    Pop,
    /// Schedule another iteration: push `values` then the body copy.
    Iterate { values: Vec<Object>, body: Object },
    /// Last repeat iteration: the body replaces the frame.
    Replace(Object),
    /// Fetch `array[index]`, push it, then the body.
    ArrayElem {
        array: ArrayRef,
        index: usize,
        body: Object,
    },
    /// Fetch `string[index]`, push it as an integer, then the body.
    StringByte {
        string: StringRef,
        index: usize,
        body: Object,
    },
    /// `filenameforall`: copy a filename into the scratch string.
    Filename {
        name: Vec<u8>,
        scratch: StringRef,
        body: Object,
    },
    /// `kshow`/`cshow`: fetch the byte at `index`, then paint or report
    /// widths before running the body.
    StringPending {
        string: StringRef,
        index: usize,
        body: Object,
        kshow: bool,
    },
}

/// Advance one iteration of the loop frame at `top_index`.
fn step_loop(ctx: &mut Context, top_index: usize) -> PsResult<()> {
    let frame = match &mut ctx.e_stack[top_index] {
        ExecItem::Loop(frame) => frame.as_mut(),
        _ => return Err(ErrorKind::Unregistered.into()),
    };

    let action = match frame {
        LoopFrame::Loop { body } => LoopAction::Iterate {
            values: Vec::new(),
            body: *body,
        },

        LoopFrame::Repeat { remaining, body } => {
            if *remaining == 0 {
                LoopAction::Pop
            } else {
                *remaining -= 1;
                if *remaining == 0 {
                    LoopAction::Replace(*body)
                } else {
                    LoopAction::Iterate {
                        values: Vec::new(),
                        body: *body,
                    }
                }
            }
        }

        LoopFrame::For {
            control,
            increment,
            limit,
            int_mode,
            body,
        } => {
            let done = if *increment >= 0.0 {
                *control > *limit
            } else {
                *control < *limit
            };
            if done {
                LoopAction::Pop
            } else {
                let value = if *int_mode {
                    Object::integer(*control as i32)
                } else {
                    Object::real(*control)
                };
                *control += *increment;
                LoopAction::Iterate {
                    values: vec![value],
                    body: *body,
                }
            }
        }

        LoopFrame::ForallArray { array, index, body } => {
            if *index >= array.len {
                LoopAction::Pop
            } else {
                let i = *index;
                *index += 1;
                LoopAction::ArrayElem {
                    array: *array,
                    index: i,
                    body: *body,
                }
            }
        }

        LoopFrame::ForallString {
            string,
            index,
            body,
        } => {
            if *index >= string.len {
                LoopAction::Pop
            } else {
                let i = *index;
                *index += 1;
                LoopAction::StringByte {
                    string: *string,
                    index: i,
                    body: *body,
                }
            }
        }

        LoopFrame::ForallDict {
            entries,
            index,
            body,
        } => {
            if *index >= entries.len() {
                LoopAction::Pop
            } else {
                let (key, value) = entries[*index];
                *index += 1;
                LoopAction::Iterate {
                    values: vec![key, value],
                    body: *body,
                }
            }
        }

        LoopFrame::PathForall {
            segs,
            index,
            ictm,
            move_proc,
            line_proc,
            curve_proc,
            close_proc,
        } => {
            if *index >= segs.len() {
                LoopAction::Pop
            } else {
                let seg = segs[*index];
                *index += 1;
                let (proc, device_points): (Object, Vec<(f64, f64)>) = match seg {
                    PathSeg::MoveTo(p) => (*move_proc, vec![(p.x, p.y)]),
                    PathSeg::LineTo(p) => (*line_proc, vec![(p.x, p.y)]),
                    PathSeg::CurveTo(c1, c2, p) => {
                        (*curve_proc, vec![(c1.x, c1.y), (c2.x, c2.y), (p.x, p.y)])
                    }
                    PathSeg::ClosePath => (*close_proc, Vec::new()),
                };
                // Coordinates report in user space through the inverse CTM.
                let mut values = Vec::with_capacity(device_points.len() * 2);
                for (x, y) in device_points {
                    let (ux, uy) = ictm.apply(x, y);
                    values.push(Object::real(ux));
                    values.push(Object::real(uy));
                }
                LoopAction::Iterate { values, body: proc }
            }
        }

        LoopFrame::FilenameForall {
            names,
            index,
            scratch,
            body,
        } => {
            if *index >= names.len() {
                LoopAction::Pop
            } else {
                let name = names[*index].clone();
                *index += 1;
                LoopAction::Filename {
                    name,
                    scratch: *scratch,
                    body: *body,
                }
            }
        }

        LoopFrame::Kshow {
            string,
            index,
            body,
        } => {
            if *index >= string.len {
                LoopAction::Pop
            } else {
                let i = *index;
                *index += 1;
                LoopAction::StringPending {
                    string: *string,
                    index: i,
                    body: *body,
                    kshow: true,
                }
            }
        }

        LoopFrame::Cshow {
            string,
            index,
            body,
        } => {
            if *index >= string.len {
                LoopAction::Pop
            } else {
                let i = *index;
                *index += 1;
                LoopAction::StringPending {
                    string: *string,
                    index: i,
                    body: *body,
                    kshow: false,
                }
            }
        }
    };

    perform_loop_action(ctx, top_index, action)
}

fn perform_loop_action(ctx: &mut Context, top_index: usize, action: LoopAction) -> PsResult<()> {
    match action {
        LoopAction::Pop => {
            ctx.e_stack.pop();
            Ok(())
        }
        LoopAction::Replace(body) => {
            ctx.e_stack[top_index] = ExecItem::Obj(body);
            Ok(())
        }
        LoopAction::Iterate { values, body } => {
            for v in values {
                ctx.o_stack.push(v);
            }
            ctx.e_stack.push(ExecItem::Obj(body));
            Ok(())
        }
        LoopAction::ArrayElem { array, index, body } => {
            let elem = ctx.memory.array_get(array, index)?;
            ctx.o_stack.push(elem);
            ctx.e_stack.push(ExecItem::Obj(body));
            Ok(())
        }
        LoopAction::StringByte {
            string,
            index,
            body,
        } => {
            let byte = ctx.memory.string_get(string, index)?;
            ctx.o_stack.push(Object::integer(byte as i32));
            ctx.e_stack.push(ExecItem::Obj(body));
            Ok(())
        }
        LoopAction::Filename {
            name,
            scratch,
            body,
        } => {
            if name.len() > scratch.len {
                return Err(Error::new(
                    ErrorKind::RangeCheck,
                    Name::new(b"filenameforall"),
                ));
            }
            ctx.memory.string_put_interval(scratch, 0, &name)?;
            let view = StringRef {
                len: name.len(),
                ..scratch
            };
            ctx.o_stack.push(Object::new(Value::String(view)));
            ctx.e_stack.push(ExecItem::Obj(body));
            Ok(())
        }
        LoopAction::StringPending {
            string,
            index,
            body,
            kshow,
        } => {
            let code = ctx.memory.string_get(string, index)?;
            if kshow {
                crate::ops::font::show_single_char(ctx, code)?;
                if index + 1 < string.len {
                    let next = ctx.memory.string_get(string, index + 1)?;
                    ctx.o_stack.push(Object::integer(code as i32));
                    ctx.o_stack.push(Object::integer(next as i32));
                    ctx.e_stack.push(ExecItem::Obj(body));
                }
            } else {
                let (wx, wy) = crate::ops::font::char_width(ctx, code)?;
                // charcode deepest, wy on top (PLRM).
                ctx.o_stack.push(Object::integer(code as i32));
                ctx.o_stack.push(Object::real(wx));
                ctx.o_stack.push(Object::real(wy));
                ctx.e_stack.push(ExecItem::Obj(body));
            }
            Ok(())
        }
    }
}

/// Convert a raised error into the PLRM error protocol: push the offending
/// command, then dispatch through `errordict` (user-replaceable).
pub fn handle_error(ctx: &mut Context, err: Error) {
    // Freeze the trace so error handling does not pollute it.
    ctx.history.paused = true;
    let command = err.command.unwrap_or_else(|| Name::new(b"--nostringval--"));
    debug!(error = err.kind.ps_name(), command = %command, "postscript error");

    let handler = dict_stack::lookup_name(ctx, Name::new(b"errordict")).and_then(|ed| {
        let dref = ed.as_dict()?;
        ctx.memory
            .dict_get(dref, postforge_runtime::DictKey::Name(err.kind.name()))
            .ok()
            .flatten()
    });

    match handler {
        Some(h) => {
            ctx.o_stack.push(Object::literal_name(command));
            ctx.e_stack.push(ExecItem::Obj(h));
        }
        None => {
            // Bootstrap failure: report on stderr and unwind.
            let _ = ctx.files.write_stderr(
                format!(
                    "%%[ Error: {}; OffendingCommand: {} ]%%\n",
                    err.kind.ps_name(),
                    command
                )
                .as_bytes(),
            );
            do_stop(ctx);
        }
    }
}

/// `stop` semantics: unwind the execution stack to the nearest `stopped`
/// boundary, pushing `true`. Files popped on the way are closed.
pub fn do_stop(ctx: &mut Context) {
    while let Some(top) = ctx.e_stack.last() {
        match top {
            ExecItem::Stopped => {
                ctx.e_stack.pop();
                ctx.o_stack.push(Object::boolean(true));
                ctx.history.paused = false;
                return;
            }
            ExecItem::Obj(o) => {
                if let Value::File(id) = o.value {
                    ctx.files.close(id);
                }
                ctx.e_stack.pop();
            }
            _ => {
                ctx.e_stack.pop();
            }
        }
    }
    // No enclosing stopped context: the job is over.
    let _ = ctx
        .files
        .write_stderr(b"%%[ Error: stop with no stopped context ]%%\n");
    ctx.history.paused = false;
}

/// `exit` semantics: unwind to the innermost looping context.
pub fn do_exit(ctx: &mut Context) -> PsResult<()> {
    while let Some(top) = ctx.e_stack.last() {
        match top {
            ExecItem::Loop(_) => {
                ctx.e_stack.pop();
                return Ok(());
            }
            ExecItem::Stopped | ExecItem::HardReturn => {
                // Escaping a stopped or job context is invalid; the
                // boundary stays in place.
                return Err(Error::new(ErrorKind::InvalidExit, Name::new(b"exit")));
            }
            ExecItem::Obj(o) => {
                // A file being executed inside the loop body closes and
                // pops; the scan keeps looking for the looping context.
                if let Value::File(id) = o.value {
                    ctx.files.close(id);
                }
                ctx.e_stack.pop();
            }
        }
    }
    let _ = ctx
        .files
        .write_stderr(b"%%[ Error: exit with no looping context ]%%\n");
    ctx.quit_requested = true;
    Ok(())
}
