//! File and I/O operators, including the printing family (`print`, `=`,
//! `==`, `stack`, `pstack`) that writes through the standard-stream
//! proxies.

use crate::context::Context;
use crate::engine::ExecItem;
use postforge_core::{
    Access, Attrib, ErrorKind, Name, Object, PsResult, StringRef, Value,
};

/// filename access `file` file
pub fn file(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let access_ref = ctx.peek_string(0)?;
    let name_ref = ctx.peek_string(1)?;
    let access = ctx.memory.string_vec(access_ref)?;
    let name = ctx.memory.string_vec(name_ref)?;
    let write = match access.as_slice() {
        b"r" => false,
        b"w" | b"a" => true,
        _ => return Err(ErrorKind::InvalidFileAccess.into()),
    };
    let id = ctx.files.open(&name, write)?;
    ctx.pop()?;
    ctx.pop()?;
    let mut obj = Object::new(Value::File(id));
    if write {
        obj.access = Access::Unlimited;
    } else {
        obj = obj.executable();
    }
    ctx.push(obj)
}

/// file `closefile` –
pub fn closefile(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.files.close(id);
    Ok(())
}

/// file `read` byte true | false
pub fn read(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.reserve(1)?;
    let byte = ctx.files.get(id)?.read_byte()?;
    ctx.pop()?;
    match byte {
        Some(b) => {
            ctx.push(Object::integer(b as i32))?;
            ctx.push(Object::boolean(true))
        }
        None => ctx.push(Object::boolean(false)),
    }
}

/// file byte `write` –
pub fn write(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let byte = ctx.peek_int(0)?;
    let id = match ctx.peek(1)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    if !(0..=255).contains(&byte) {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.files.get(id)?.write_all(&[byte as u8])
}

/// file string `readstring` substring bool
pub fn readstring(ctx: &mut Context) -> PsResult<()> {
    read_into(ctx, ReadMode::Raw)
}

/// file string `readline` substring bool
pub fn readline(ctx: &mut Context) -> PsResult<()> {
    read_into(ctx, ReadMode::Line)
}

/// file string `readhexstring` substring bool
pub fn readhexstring(ctx: &mut Context) -> PsResult<()> {
    read_into(ctx, ReadMode::Hex)
}

enum ReadMode {
    Raw,
    Line,
    Hex,
}

fn read_into(ctx: &mut Context, mode: ReadMode) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::Unlimited)?;
    let id = match ctx.peek(1)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let obj = *ctx.peek(0)?;

    let mut data = Vec::with_capacity(r.len);
    let mut eof = false;
    let mut newline = false;
    while data.len() < r.len {
        let byte = ctx.files.get(id)?.read_byte()?;
        match byte {
            None => {
                eof = true;
                break;
            }
            Some(b) => match mode {
                ReadMode::Raw => data.push(b),
                ReadMode::Line => {
                    if b == b'\n' || b == b'\r' {
                        // CR LF folds into one line end.
                        if b == b'\r' {
                            if let Some(next) = ctx.files.get(id)?.read_byte()? {
                                if next != b'\n' {
                                    ctx.files.get(id)?.unread(next);
                                }
                            }
                        }
                        newline = true;
                        break;
                    }
                    data.push(b);
                }
                ReadMode::Hex => {
                    let hi = match hex_digit(b) {
                        Some(d) => d,
                        None => continue,
                    };
                    // Pull non-hex bytes until the second half arrives.
                    let mut lo = None;
                    loop {
                        match ctx.files.get(id)?.read_byte()? {
                            None => {
                                eof = true;
                                break;
                            }
                            Some(c) => match hex_digit(c) {
                                Some(d) => {
                                    lo = Some(d);
                                    break;
                                }
                                None => continue,
                            },
                        }
                    }
                    match lo {
                        Some(lo) => data.push((hi << 4) | lo),
                        None => {
                            data.push(hi << 4);
                            break;
                        }
                    }
                }
            },
        }
    }

    // A line longer than the buffer is a rangecheck before anything is
    // consumed from the operand stack's point of view.
    if matches!(mode, ReadMode::Line) && !newline && !eof {
        return Err(ErrorKind::RangeCheck.into());
    }

    ctx.pop()?;
    ctx.pop()?;
    let n = data.len();
    ctx.memory.string_put_interval(r, 0, &data)?;
    let view = Object {
        value: Value::String(StringRef { len: n, ..r }),
        ..obj
    };
    ctx.push(view)?;
    let ok = match mode {
        ReadMode::Line => newline,
        _ => !eof && n == r.len,
    };
    ctx.push(Object::boolean(ok))
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// file string `writestring` –
pub fn writestring(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    let id = match ctx.peek(1)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.files.get(id)?.write_all(&bytes)
}

/// file string `writehexstring` –
pub fn writehexstring(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    let id = match ctx.peek(1)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let bytes = ctx.memory.string_vec(r)?;
    let mut hex = Vec::with_capacity(bytes.len() * 2);
    for b in bytes {
        hex.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('0') as u8);
        hex.push(char::from_digit((b & 15) as u32, 16).unwrap_or('0') as u8);
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.files.get(id)?.write_all(&hex)
}

/// file `bytesavailable` int
pub fn bytesavailable(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let n = ctx.files.get(id)?.bytes_available();
    ctx.pop()?;
    ctx.push(Object::integer(n))
}

/// `flush` – — flush standard output.
pub fn flush(ctx: &mut Context) -> PsResult<()> {
    let id = ctx.files.stdout_id;
    ctx.files.get(id)?.flush()
}

/// file `flushfile` –
pub fn flushfile(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    ctx.files.get(id)?.flush()
}

/// file `resetfile` –
pub fn resetfile(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.pop()?;
    if let Ok(f) = ctx.files.get(id) {
        f.ungot = None;
    }
    Ok(())
}

/// file `status` bool
pub fn status(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let open = ctx.files.status(id);
    ctx.pop()?;
    ctx.push(Object::boolean(open))
}

/// file `fileposition` int
pub fn fileposition(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let id = match ctx.peek(0)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    let pos = ctx.files.get(id)?.position as i32;
    ctx.pop()?;
    ctx.push(Object::integer(pos))
}

/// file int `setfileposition` –
pub fn setfileposition(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let pos = ctx.peek_int(0)?;
    let id = match ctx.peek(1)?.value {
        Value::File(id) => id,
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    if pos < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.files.get(id)?.seek_to(pos as u64)
}

/// filename `run` – — execute a named program file.
pub fn run(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_string(0)?;
    let name = ctx.memory.string_vec(r)?;
    let id = ctx.files.open(&name, false)?;
    ctx.pop()?;
    let obj = Object::new(Value::File(id)).executable();
    ctx.e_stack.push(ExecItem::Obj(obj));
    Ok(())
}

/// `currentfile` file — the innermost file on the execution stack.
pub fn currentfile(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let found = ctx
        .e_stack
        .iter()
        .rev()
        .find_map(|item| match item {
            ExecItem::Obj(o) => match o.value {
                Value::File(_) => Some(*o),
                _ => None,
            },
            _ => None,
        });
    match found {
        Some(mut f) => {
            f.attrib = Attrib::Literal;
            ctx.push(f)
        }
        None => {
            // No file is being executed: an invalid (closed) file object.
            let obj = Object::new(Value::File(postforge_core::FileId(u32::MAX)));
            ctx.push(obj)
        }
    }
}

/// filename `deletefile` –
pub fn deletefile(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_string(0)?;
    let name = ctx.memory.string_vec(r)?;
    let path = String::from_utf8_lossy(&name).into_owned();
    std::fs::remove_file(path).map_err(|_| ErrorKind::UndefinedFilename)?;
    ctx.pop()?;
    Ok(())
}

/// old new `renamefile` –
pub fn renamefile(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let new_r = ctx.peek_string(0)?;
    let old_r = ctx.peek_string(1)?;
    let new_name = ctx.memory.string_vec(new_r)?;
    let old_name = ctx.memory.string_vec(old_r)?;
    std::fs::rename(
        String::from_utf8_lossy(&old_name).into_owned(),
        String::from_utf8_lossy(&new_name).into_owned(),
    )
    .map_err(|_| ErrorKind::UndefinedFilename)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok(())
}

/// template proc scratch `filenameforall` –
pub fn filenameforall(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let scratch = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::Unlimited)?;
    let body = *ctx.peek_proc(1)?;
    let template_ref = ctx.peek_string(2)?;
    let template = ctx.memory.string_vec(template_ref)?;
    let names = matching_filenames(&template);
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.e_stack.push(ExecItem::Loop(Box::new(
        crate::engine::LoopFrame::FilenameForall {
            names,
            index: 0,
            scratch,
            body,
        },
    )));
    Ok(())
}

/// Enumerate filenames matching a `*`/`?` template in the current
/// directory tree (one level).
fn matching_filenames(template: &[u8]) -> Vec<Vec<u8>> {
    let pattern = String::from_utf8_lossy(template).into_owned();
    let (dir, leaf) = match pattern.rfind('/') {
        Some(at) => (pattern[..at].to_string(), pattern[at + 1..].to_string()),
        None => (".".to_string(), pattern.clone()),
    };
    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&dir) {
        for entry in entries.flatten() {
            let fname = entry.file_name();
            let fname = fname.to_string_lossy();
            if glob_match(leaf.as_bytes(), fname.as_bytes()) {
                let full = if dir == "." {
                    fname.into_owned()
                } else {
                    format!("{}/{}", dir, fname)
                };
                out.push(full.into_bytes());
            }
        }
    }
    out.sort();
    out
}

fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.split_first(), name.split_first()) {
        (None, None) => true,
        (Some((b'*', rest)), _) => {
            (0..=name.len()).any(|skip| glob_match(rest, &name[skip..]))
        }
        (Some((b'?', rest)), Some((_, tail))) => glob_match(rest, tail),
        (Some((p, rest)), Some((n, tail))) if p == n => glob_match(rest, tail),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Printing family
// ---------------------------------------------------------------------------

/// string `print` –
pub fn print(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let r = ctx.peek_string(0)?;
    ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
    let bytes = ctx.memory.string_vec(r)?;
    ctx.pop()?;
    ctx.files.write_stdout(&bytes)
}

/// any `=` – — text form plus newline.
pub fn equals(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let mut text = crate::ops::types::to_text(ctx, &obj)?;
    ctx.pop()?;
    text.push(b'\n');
    ctx.files.write_stdout(&text)
}

/// any `==` – — syntactic form plus newline.
pub fn equals_equals(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let mut text = render_syntactic(ctx, &obj, 0);
    ctx.pop()?;
    text.push(b'\n');
    ctx.files.write_stdout(&text)
}

/// `stack` – — `=` each operand, topmost first, leaving the stack intact.
pub fn stack(ctx: &mut Context) -> PsResult<()> {
    let snapshot: Vec<Object> = ctx.o_stack.iter().rev().copied().collect();
    for obj in snapshot {
        let mut text = crate::ops::types::to_text(ctx, &obj)?;
        text.push(b'\n');
        ctx.files.write_stdout(&text)?;
    }
    Ok(())
}

/// `pstack` – — `==` each operand, topmost first.
pub fn pstack(ctx: &mut Context) -> PsResult<()> {
    let snapshot: Vec<Object> = ctx.o_stack.iter().rev().copied().collect();
    for obj in snapshot {
        let mut text = render_syntactic(ctx, &obj, 0);
        text.push(b'\n');
        ctx.files.write_stdout(&text)?;
    }
    Ok(())
}

/// The `==` rendering: strings parenthesized with escapes, names with
/// `/`, arrays bracketed, procedures braced.
pub fn render_syntactic(ctx: &Context, obj: &Object, depth: usize) -> Vec<u8> {
    if depth > 8 {
        return b"...".to_vec();
    }
    match obj.value {
        Value::String(r) => {
            let mut out = vec![b'('];
            if let Ok(bytes) = ctx.memory.string(r) {
                for &b in bytes {
                    match b {
                        b'(' | b')' | b'\\' => {
                            out.push(b'\\');
                            out.push(b);
                        }
                        b'\n' => out.extend_from_slice(b"\\n"),
                        b'\r' => out.extend_from_slice(b"\\r"),
                        b'\t' => out.extend_from_slice(b"\\t"),
                        _ => out.push(b),
                    }
                }
            }
            out.push(b')');
            out
        }
        Value::Name(n) => {
            let mut out = Vec::with_capacity(n.len() + 1);
            if obj.attrib == Attrib::Literal {
                out.push(b'/');
            }
            out.extend_from_slice(n.as_bytes());
            out
        }
        Value::Array(r) | Value::PackedArray(r) => {
            let braces = obj.attrib == Attrib::Executable;
            let mut out = vec![if braces { b'{' } else { b'[' }];
            if let Ok(elems) = ctx.memory.array(r) {
                let elems: Vec<Object> = elems.to_vec();
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    out.extend_from_slice(&render_syntactic(ctx, elem, depth + 1));
                }
            }
            out.push(if braces { b'}' } else { b']' });
            out
        }
        Value::Dict(_) => b"-dict-".to_vec(),
        Value::Operator(id) => {
            let mut out = b"--".to_vec();
            out.extend_from_slice(ctx.ops.name_of(id).as_bytes());
            out.extend_from_slice(b"--");
            out
        }
        Value::File(_) => b"-file-".to_vec(),
        Value::Save(_) => b"-save-".to_vec(),
        Value::Font(_) => b"-fontID-".to_vec(),
        Value::GState(_) => b"-gstate-".to_vec(),
        _ => format!("{}", obj).into_bytes(),
    }
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "file", file);
    super::define_op(ctx, "closefile", closefile);
    super::define_op(ctx, "read", read);
    super::define_op(ctx, "write", write);
    super::define_op(ctx, "readstring", readstring);
    super::define_op(ctx, "readline", readline);
    super::define_op(ctx, "readhexstring", readhexstring);
    super::define_op(ctx, "writestring", writestring);
    super::define_op(ctx, "writehexstring", writehexstring);
    super::define_op(ctx, "bytesavailable", bytesavailable);
    super::define_op(ctx, "flush", flush);
    super::define_op(ctx, "flushfile", flushfile);
    super::define_op(ctx, "resetfile", resetfile);
    super::define_op(ctx, "status", status);
    super::define_op(ctx, "fileposition", fileposition);
    super::define_op(ctx, "setfileposition", setfileposition);
    super::define_op(ctx, "run", run);
    super::define_op(ctx, "currentfile", currentfile);
    super::define_op(ctx, "deletefile", deletefile);
    super::define_op(ctx, "renamefile", renamefile);
    super::define_op(ctx, "filenameforall", filenameforall);
    super::define_op(ctx, "print", print);
    super::define_op(ctx, "=", equals);
    super::define_op(ctx, "==", equals_equals);
    super::define_op(ctx, "stack", stack);
    super::define_op(ctx, "pstack", pstack);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(glob_match(b"*.ps", b"test.ps"));
        assert!(glob_match(b"a?c", b"abc"));
        assert!(!glob_match(b"a?c", b"ac"));
        assert!(glob_match(b"*", b"anything"));
        assert!(!glob_match(b"*.ps", b"test.pdf"));
    }

    #[test]
    fn syntactic_rendering_of_nested_values() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"[1 (a(b)) /n {add}]").unwrap();
        let obj = ctx.pop().unwrap();
        let text = render_syntactic(&ctx, &obj, 0);
        assert_eq!(text, b"[1 (a\\(b\\)) /n {add}]".to_vec());
    }
}
