//! End-to-end interpreter scenarios: program text in, stdout and display
//! lists out.

use postforge_core::Name;
use postforge_graphics::{DlElement, Rgb, WindingRule};
use postforge_vm::files::FileRegistry;
use postforge_vm::{job, Context};
use std::cell::RefCell;
use std::io;
use std::rc::Rc;

/// A `Write` handle into a shared byte buffer, so tests can read what the
/// interpreter printed.
#[derive(Clone)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A context whose stdout lands in an inspectable buffer.
fn capture_context() -> (Context, Rc<RefCell<Vec<u8>>>) {
    let buf = Rc::new(RefCell::new(Vec::new()));
    let mut ctx = Context::bare();
    ctx.files = FileRegistry::with_streams(
        Box::new(io::Cursor::new(Vec::new())),
        Box::new(SharedBuf(Rc::clone(&buf))),
        Box::new(io::sink()),
    );
    ctx.devices.insert(
        Name::new(b"Capture"),
        Box::new(postforge_vm::CaptureDevice::new()),
    );
    postforge_vm::init::bootstrap(&mut ctx);
    (ctx, buf)
}

fn stdout_of(buf: &Rc<RefCell<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&buf.borrow()).into_owned()
}

#[test]
fn scenario_add_and_print() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"3 4 add ==").unwrap();
    assert_eq!(stdout_of(&out), "7\n");
    assert!(ctx.o_stack.is_empty());
}

#[test]
fn scenario_def_load_print() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"/x 10 def /x load 5 add ==").unwrap();
    assert_eq!(stdout_of(&out), "15\n");
    ctx.run_bytes(b"userdict /x get").unwrap();
    assert_eq!(ctx.pop().unwrap().as_int(), Some(10));
}

#[test]
fn scenario_save_restore_rollback() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"/x 10 def save /x 20 def restore /x load ==")
        .unwrap();
    assert_eq!(stdout_of(&out), "10\n");
}

#[test]
fn scenario_triangle_display_list() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"0 0 moveto 100 0 lineto 100 100 lineto closepath fill showpage")
        .unwrap();
    let pages = ctx.captured_pages();
    assert_eq!(pages.len(), 1);
    let elements = &pages[0].elements;
    assert!(matches!(elements[0], DlElement::MoveTo { x, y } if x == 0.0 && y == 0.0));
    assert!(matches!(elements[1], DlElement::LineTo { x, y } if x == 100.0 && y == 0.0));
    assert!(matches!(elements[2], DlElement::LineTo { x, y } if x == 100.0 && y == 100.0));
    assert!(matches!(elements[3], DlElement::ClosePath));
    assert!(matches!(
        elements[4],
        DlElement::Fill {
            color: Rgb { r: 0.0, g: 0.0, b: 0.0 },
            rule: WindingRule::NonZero,
        }
    ));
    assert!(matches!(elements[5], DlElement::ErasePage));
}

#[test]
fn scenario_stopped_catches_division() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"{ 1 0 div } stopped == $error /newerror false put clear")
        .unwrap();
    assert_eq!(stdout_of(&out), "true\n");
    assert!(ctx.o_stack.is_empty());
    // No $error leak into subsequent operations.
    ctx.run_bytes(b"2 3 add ==").unwrap();
    assert_eq!(stdout_of(&out), "true\n5\n");
}

#[test]
fn scenario_shared_string_mutation() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"(hello) dup 0 (H) putinterval").unwrap();
    let s = ctx.pop().unwrap().as_string().unwrap();
    assert_eq!(ctx.memory.string(s).unwrap(), b"Hello");
}

#[test]
fn cvx_cvlit_identity_on_attribute() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"/n cvx cvlit type").unwrap();
    assert_eq!(
        ctx.pop().unwrap().as_name(),
        Some(Name::new(b"nametype"))
    );
}

#[test]
fn tokenize_serialize_round_trip() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"(42 3.5 /name (str)) token pop == ").unwrap();
    assert_eq!(stdout_of(&out), "42\n");
    ctx.o_stack.clear();
    out.borrow_mut().clear();
    ctx.run_bytes(b"3.5 ==").unwrap();
    assert_eq!(stdout_of(&out), "3.5\n");
}

#[test]
fn operand_stack_limit_is_exact() {
    let (mut ctx, _) = capture_context();
    // Build the probes first so only operator pushes are measured.
    ctx.run_bytes(b"/p { dup } def /try { { p } stopped } def").unwrap();
    ctx.run_bytes(b"<< /MaxOpStack 5 >> setuserparams").unwrap();
    ctx.run_bytes(b"1 2 3 4 try").unwrap();
    // The fifth element fits exactly at the limit...
    assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(false));
    assert_eq!(ctx.o_stack.len(), 5);
    // ...and the sixth overflows, never one short, never one over.
    ctx.run_bytes(b"try").unwrap();
    assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(true));
    assert_eq!(ctx.o_stack.len(), 5);
}

#[test]
fn for_control_variable_type_rule() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"1 1 3 { == } for").unwrap();
    assert_eq!(stdout_of(&out), "1\n2\n3\n");
    out.borrow_mut().clear();
    ctx.run_bytes(b"1 1.0 3 { == } for").unwrap();
    assert_eq!(stdout_of(&out), "1.0\n2.0\n3.0\n");
}

#[test]
fn integer_literal_overflow_boundary() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"2147483647 type 2147483648 type").unwrap();
    assert_eq!(ctx.pop().unwrap().as_name(), Some(Name::new(b"realtype")));
    assert_eq!(
        ctx.pop().unwrap().as_name(),
        Some(Name::new(b"integertype"))
    );
}

#[test]
fn jobs_are_isolated_and_reusable() {
    let (mut ctx, out) = capture_context();
    job::exec_job_bytes(&mut ctx, b"/page1 1 def (first) = ").unwrap();
    job::exec_job_bytes(&mut ctx, b"/page1 where { pop (leaked) } { (clean) } ifelse = ")
        .unwrap();
    assert_eq!(stdout_of(&out), "first\nclean\n");
}

#[test]
fn job_error_reports_and_recovers() {
    let (mut ctx, out) = capture_context();
    job::exec_job_bytes(&mut ctx, b"undefined_operator_xyz").unwrap();
    let text = stdout_of(&out);
    assert!(text.contains("undefined"));
    assert!(text.contains("undefined_operator_xyz"));
    out.borrow_mut().clear();
    job::exec_job_bytes(&mut ctx, b"(still alive) = ").unwrap();
    assert_eq!(stdout_of(&out), "still alive\n");
}

#[test]
fn exitserver_prints_plrm_message() {
    let (mut ctx, out) = capture_context();
    job::exec_job_bytes(&mut ctx, b"(0) exitserver").unwrap();
    assert!(stdout_of(&out)
        .contains("%%[exitserver: permanent state may be changed]%%"));
}

#[test]
fn gsave_grestore_roundtrip_is_noop() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"3 setlinewidth 0.5 setgray gsave 9 setlinewidth 0 setgray grestore")
        .unwrap();
    assert_eq!(ctx.gstate.line_width, 3.0);
    assert_eq!(ctx.gstate.color.as_slice(), &[0.5]);
}

#[test]
fn clip_reemission_after_grestore() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(
        b"gsave 0 0 moveto 50 0 lineto 50 50 lineto closepath clip grestore \
          0 0 moveto 10 0 lineto fill",
    )
    .unwrap();
    // The clip emitted inside gsave; the paint after grestore re-emits
    // the restored clip before its geometry.
    let clips: Vec<bool> = ctx
        .display_list
        .elements
        .iter()
        .filter_map(|e| match e {
            DlElement::Clip { is_initclip, .. } => Some(*is_initclip),
            _ => None,
        })
        .collect();
    assert_eq!(clips, vec![false, true]);
    assert!(ctx
        .display_list
        .elements
        .iter()
        .any(|e| matches!(e, DlElement::Fill { .. })));
}

#[test]
fn deep_procedure_nesting_executes() {
    let (mut ctx, out) = capture_context();
    ctx.run_bytes(b"{ { { { 5 } exec } exec } exec } exec ==").unwrap();
    assert_eq!(stdout_of(&out), "5\n");
}

#[test]
fn immediate_name_substitution() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"/v 41 def { //v 1 add } exec").unwrap();
    assert_eq!(ctx.pop().unwrap().as_int(), Some(42));
    // Redefining v later does not affect the already-substituted proc.
    ctx.run_bytes(b"/p { //v } def /v 0 def p").unwrap();
    assert_eq!(ctx.pop().unwrap().as_int(), Some(41));
}

#[test]
fn execution_history_records_dispatch() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"<< /ExecutionHistory true /ExecutionHistorySize 8 >> setuserparams")
        .unwrap();
    ctx.run_bytes(b"1 2 add pop").unwrap();
    assert!(!ctx.history.buf.is_empty());
    assert!(ctx.history.buf.len() <= 8);
}

#[test]
fn interrupt_is_catchable() {
    use std::sync::atomic::Ordering;
    let (mut ctx, _) = capture_context();
    // The pump fires every ~10k iterations; cancelling from it lands the
    // interrupt mid-loop where the stopped boundary can catch it.
    let flag = std::sync::Arc::clone(&ctx.interrupt);
    ctx.pump = Some(Box::new(move || flag.store(true, Ordering::Relaxed)));
    ctx.run_bytes(b"{ 0 { 1 add } loop } stopped").unwrap();
    assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(true));
}

#[test]
fn packed_procedures_roll_back_with_restore() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"save true setpacking restore currentpacking")
        .unwrap();
    assert_eq!(ctx.pop().unwrap().as_bool(), Some(false));
}

#[test]
fn restored_composites_forget_mutations() {
    let (mut ctx, _) = capture_context();
    ctx.run_bytes(b"/a [1 2 3] def save a 0 99 put restore a 0 get")
        .unwrap();
    assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
}
