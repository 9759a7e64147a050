//! Device setup and page output: `setpagedevice`, `showpage`,
//! `copypage`, `nulldevice`.
//!
//! The page device dictionary is the recognized-keys contract between the
//! interpreter and the output device; `showpage` resolves the device by
//! the `/OutputDevice` name and hands it the display list.

use crate::context::Context;
use crate::device::PageSetup;
use crate::engine;
use postforge_core::{ErrorKind, Name, Object, PsResult, Value};
use postforge_graphics::{DlElement, Matrix, Path, Point, TextRenderingMode};
use postforge_runtime::DictKey;

fn key(n: &[u8]) -> DictKey {
    DictKey::Name(Name::new(n))
}

/// Read a `[w h]` numeric pair from the page device dictionary.
fn dict_pair(ctx: &Context, dref: postforge_core::DictRef, k: &[u8]) -> Option<(f64, f64)> {
    let arr = ctx.memory.dict_get(dref, key(k)).ok()??.as_array()?;
    let elems = ctx.memory.array(arr).ok()?;
    match elems {
        [a, b, ..] => Some((a.number()?, b.number()?)),
        _ => None,
    }
}

fn dict_number(ctx: &Context, dref: postforge_core::DictRef, k: &[u8]) -> Option<f64> {
    ctx.memory.dict_get(dref, key(k)).ok()??.number()
}

fn dict_name(ctx: &Context, dref: postforge_core::DictRef, k: &[u8]) -> Option<Name> {
    ctx.memory.dict_get(dref, key(k)).ok()??.as_name()
}

/// The current page device dictionary, if one is installed.
pub fn page_device(ctx: &Context) -> Option<postforge_core::DictRef> {
    ctx.gstate.page_device.and_then(|o| o.as_dict())
}

/// Page size in points (PLRM default letter).
pub fn page_size(ctx: &Context) -> (f64, f64) {
    page_device(ctx)
        .and_then(|d| dict_pair(ctx, d, b"PageSize"))
        .unwrap_or((612.0, 792.0))
}

/// The device default CTM. The default device maps user points 1:1 onto
/// device units with the origin at the lower-left, scaled by
/// `HWResolution`/72.
pub fn default_matrix(ctx: &Context) -> Matrix {
    let (dpi_x, dpi_y) = page_device(ctx)
        .and_then(|d| dict_pair(ctx, d, b"HWResolution"))
        .unwrap_or((72.0, 72.0));
    Matrix::scaling(dpi_x / 72.0, dpi_y / 72.0)
}

/// The full-page outline in device space (the initial clip).
pub fn page_outline(ctx: &Context) -> Path {
    let (w, h) = page_size(ctx);
    let m = default_matrix(ctx);
    let mut p = Path::new();
    let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    for (i, (x, y)) in corners.iter().enumerate() {
        let (dx, dy) = m.apply(*x, *y);
        if i == 0 {
            p.move_to(Point::new(dx, dy));
        } else {
            p.line_to(Point::new(dx, dy));
        }
    }
    p.close();
    p
}

/// The text rendering mode selected by the page device.
pub fn text_rendering_mode(ctx: &Context) -> TextRenderingMode {
    match page_device(ctx).and_then(|d| dict_name(ctx, d, b"TextRenderingMode")) {
        Some(n) if n.as_bytes() == b"GlyphPaths" => TextRenderingMode::GlyphPaths,
        _ => TextRenderingMode::TextObjs,
    }
}

fn null_device_active(ctx: &Context) -> bool {
    page_device(ctx)
        .and_then(|d| ctx.memory.dict_get(d, key(b".NullDevice")).ok())
        .flatten()
        .is_some()
}

/// Append to the display list unless the null device swallows marks.
pub fn emit(ctx: &mut Context, element: DlElement) {
    if null_device_active(ctx) {
        return;
    }
    ctx.display_list.push(element);
}

/// Re-emit the active clip when a paint arrives after a grestore rolled
/// the clip version back behind what the display list last saw.
pub fn sync_clip(ctx: &mut Context) {
    if ctx.gstate.clip_version == ctx.emitted_clip_version || null_device_active(ctx) {
        return;
    }
    let path = ctx.gstate.clip_path.clone();
    ctx.display_list.push(DlElement::Clip {
        path,
        rule: postforge_graphics::WindingRule::NonZero,
        is_initclip: true,
    });
    ctx.emitted_clip_version = ctx.gstate.clip_version;
}

/// Build the default page device dictionary during bootstrap.
pub fn build_default_page_device(ctx: &mut Context) -> Object {
    let obj = ctx.new_dict_in(postforge_core::Space::Local, 16);
    let dref = obj.as_dict().expect("fresh dict");
    let size_w = Object::real(612.0);
    let size_h = Object::real(792.0);
    let page_size = ctx.new_array(vec![size_w, size_h]);
    let res = ctx.new_array(vec![Object::real(72.0), Object::real(72.0)]);
    let empty_install = ctx.new_array(Vec::new()).executable();
    // Default EndPage: output for showpage/copypage, not for device
    // deactivation (reason 2): `exch pop 2 ne`.
    let endpage = build_default_endpage(ctx);
    let beginpage = build_default_beginpage(ctx);

    let puts: Vec<(&[u8], Object)> = vec![
        (b"OutputDevice", Object::literal_name(Name::new(b"Capture"))),
        (b"PageSize", page_size),
        (b"HWResolution", res),
        (b"MediaSize", page_size),
        (b"NumCopies", Object::null()),
        (b"Install", empty_install),
        (b"BeginPage", beginpage),
        (b"EndPage", endpage),
        (b"PageCount", Object::integer(0)),
        (b".IsPageDevice", Object::boolean(true)),
        (b"LineWidthMin", Object::real(0.0)),
        (
            b"TextRenderingMode",
            Object::literal_name(Name::new(b"TextObjs")),
        ),
        (
            b"StrokeMethod",
            Object::literal_name(Name::new(b"Stroke")),
        ),
    ];
    for (k, v) in puts {
        ctx.memory
            .dict_put(dref, key(k), v)
            .expect("page device init");
    }
    obj
}

fn build_default_endpage(ctx: &mut Context) -> Object {
    // { exch pop 2 ne }
    let elems = vec![
        op_obj(ctx, "exch"),
        op_obj(ctx, "pop"),
        Object::integer(2),
        op_obj(ctx, "ne"),
    ];
    ctx.new_array(elems).executable()
}

fn build_default_beginpage(ctx: &mut Context) -> Object {
    // { pop }
    let elems = vec![op_obj(ctx, "pop")];
    ctx.new_array(elems).executable()
}

fn op_obj(ctx: &Context, name: &str) -> Object {
    crate::dict_stack::lookup_name(ctx, Name::from_str(name))
        .expect("operator must be installed before page device setup")
}

/// dict `setpagedevice` – — merge the request into the current page
/// device and run its Install procedure.
pub fn setpagedevice(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let request = ctx.peek_dict(0)?;
    let current = match ctx.gstate.page_device {
        Some(pd) => pd,
        None => build_default_page_device(ctx),
    };
    let dref = current.as_dict().ok_or(ErrorKind::TypeCheck)?;
    let entries: Vec<(DictKey, Object)> = ctx.memory.dict(request)?.iter_ordered().collect();
    ctx.pop()?;
    for (k, v) in entries {
        ctx.memory.dict_put(dref, k, v)?;
    }
    ctx.gstate.page_device = Some(current);

    // Device reconfiguration implies an initgraphics against the new
    // geometry and a fresh page.
    let m = default_matrix(ctx);
    ctx.gstate.init_graphics(m);
    let outline = page_outline(ctx);
    ctx.gstate.set_clip(outline);

    // Run the Install procedure.
    if let Some(install) = ctx.memory.dict_get(dref, key(b"Install"))? {
        if install.is_executable() {
            engine::call_procedure(ctx, install)?;
        }
    }
    Ok(())
}

/// `currentpagedevice` dict
pub fn currentpagedevice(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    match ctx.gstate.page_device {
        Some(pd) => ctx.push(pd),
        None => {
            let pd = build_default_page_device(ctx);
            ctx.gstate.page_device = Some(pd);
            ctx.push(pd)
        }
    }
}

/// `nulldevice` – — all painting operations become no-ops.
pub fn nulldevice(ctx: &mut Context) -> PsResult<()> {
    let pd = build_default_page_device(ctx);
    let dref = pd.as_dict().ok_or(ErrorKind::TypeCheck)?;
    ctx.memory
        .dict_put(dref, key(b".NullDevice"), Object::boolean(true))?;
    ctx.gstate.page_device = Some(pd);
    ctx.gstate.set_ctm(Matrix::IDENTITY);
    Ok(())
}

fn page_setup(ctx: &Context, dref: postforge_core::DictRef) -> PageSetup {
    let (w, h) = page_size(ctx);
    let (dpi_x, dpi_y) = dict_pair(ctx, dref, b"HWResolution").unwrap_or((72.0, 72.0));
    let copies = dict_number(ctx, dref, b"NumCopies").unwrap_or(1.0) as i32;
    let page_count = dict_number(ctx, dref, b"PageCount").unwrap_or(0.0) as i32;
    PageSetup {
        width: w,
        height: h,
        dpi_x,
        dpi_y,
        copies: copies.max(1),
        page_count,
    }
}

fn show_or_copy(ctx: &mut Context, is_copy: bool) -> PsResult<()> {
    if null_device_active(ctx) {
        return Ok(());
    }
    let pd = match ctx.gstate.page_device {
        Some(pd) => pd,
        None => {
            let pd = build_default_page_device(ctx);
            ctx.gstate.page_device = Some(pd);
            pd
        }
    };
    let dref = pd.as_dict().ok_or(ErrorKind::TypeCheck)?;

    // EndPage decides whether the page transmits: count, reason code.
    let page_count = dict_number(ctx, dref, b"PageCount").unwrap_or(0.0) as i32;
    ctx.push(Object::integer(page_count))?;
    ctx.push(Object::integer(if is_copy { 1 } else { 0 }))?;
    if let Some(endpage) = ctx.memory.dict_get(dref, key(b"EndPage"))? {
        engine::call_procedure(ctx, endpage)?;
    }
    let transmit = ctx
        .pop()?
        .as_bool()
        .ok_or(ErrorKind::TypeCheck)?;

    if transmit {
        let setup = page_setup(ctx, dref);
        let device_name =
            dict_name(ctx, dref, b"OutputDevice").unwrap_or_else(|| Name::new(b"Capture"));
        // The ErasePage marker closes the transmitted list.
        ctx.display_list.push(DlElement::ErasePage);
        let list = std::mem::take(&mut ctx.display_list);
        let mut device = ctx
            .devices
            .remove(&device_name)
            .ok_or(ErrorKind::Undefined)?;
        let outcome = device.show_page(&list, &setup);
        ctx.devices.insert(device_name, device);
        if is_copy {
            // copypage keeps the accumulated contents.
            ctx.display_list = list;
            if let Some(last) = ctx.display_list.elements.last() {
                if matches!(last, DlElement::ErasePage) {
                    ctx.display_list.elements.pop();
                }
            }
        }
        outcome?;
        ctx.memory.dict_put(
            dref,
            key(b"PageCount"),
            Object::integer(page_count + 1),
        )?;
    }

    if !is_copy {
        // showpage reinitializes the graphics state for the next page.
        let m = default_matrix(ctx);
        ctx.gstate.init_graphics(m);
        let outline = page_outline(ctx);
        ctx.gstate.set_clip(outline);
    }

    // BeginPage for the next page: count on the stack.
    ctx.push(Object::integer(page_count + 1))?;
    if let Some(beginpage) = ctx.memory.dict_get(dref, key(b"BeginPage"))? {
        engine::call_procedure(ctx, beginpage)?;
    } else {
        ctx.pop()?;
    }
    Ok(())
}

/// `showpage` –
pub fn showpage(ctx: &mut Context) -> PsResult<()> {
    show_or_copy(ctx, false)
}

/// `copypage` –
pub fn copypage(ctx: &mut Context) -> PsResult<()> {
    show_or_copy(ctx, true)
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "setpagedevice", setpagedevice);
    super::define_op(ctx, "currentpagedevice", currentpagedevice);
    super::define_op(ctx, "nulldevice", nulldevice);
    super::define_op(ctx, "showpage", showpage);
    super::define_op(ctx, "copypage", copypage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_size_is_letter() {
        let ctx = Context::new();
        assert_eq!(page_size(&ctx), (612.0, 792.0));
    }

    #[test]
    fn setpagedevice_merges_and_reinits() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"<< /PageSize [200 100] >> setpagedevice")
            .unwrap();
        assert_eq!(page_size(&ctx), (200.0, 100.0));
    }

    #[test]
    fn showpage_hands_list_to_capture_device() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 0 moveto 10 0 lineto fill showpage").unwrap();
        let pages = ctx.captured_pages();
        assert_eq!(pages.len(), 1);
        assert!(matches!(
            pages[0].elements.last(),
            Some(DlElement::ErasePage)
        ));
        // The in-progress list is cleared for the next page.
        assert!(ctx.display_list.is_empty());
    }

    #[test]
    fn copypage_keeps_contents() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 0 moveto 10 0 lineto fill copypage").unwrap();
        assert_eq!(ctx.captured_pages().len(), 1);
        assert!(!ctx.display_list.is_empty());
    }

    #[test]
    fn nulldevice_discards_output() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"nulldevice 0 0 moveto 10 0 lineto fill showpage")
            .unwrap();
        assert!(ctx.captured_pages().is_empty());
        assert!(ctx.display_list.is_empty());
    }

    #[test]
    fn page_count_increments() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"showpage showpage currentpagedevice /PageCount get")
            .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
    }
}
