//! Painting operators: fills, strokes, rectangles, and the image family.
//!
//! Each consumes the current path (or builds one), resolves the current
//! color to device RGB, and appends display-list elements. The path is
//! cleared afterwards per `newpath` semantics.

use crate::context::Context;
use crate::engine;
use crate::ops::device::emit;
use postforge_core::{Access, ErrorKind, Object, PsResult, Value};
use postforge_graphics::color::ColorSpace;
use postforge_graphics::{
    DlElement, ImageData, Matrix, Path, Point, Rgb, StrokeStyle, WindingRule,
};

/// `erasepage` –
pub fn erasepage(ctx: &mut Context) -> PsResult<()> {
    emit(ctx, DlElement::ErasePage);
    Ok(())
}

fn fill_impl(ctx: &mut Context, rule: WindingRule) -> PsResult<()> {
    if ctx.gstate.path.is_empty() {
        return Ok(());
    }
    crate::ops::device::sync_clip(ctx);
    let path = ctx.gstate.path.clone();

    if let ColorSpace::Pattern { base } = ctx.gstate.color_space.clone() {
        if let Some(pattern) = ctx.gstate.pattern {
            let underlying = match base {
                Some(space) => {
                    let comps = ctx.gstate.color.clone();
                    Some(crate::color_driver::resolve(ctx, &space, &comps)?)
                }
                None => None,
            };
            emit_path(ctx, &path);
            let ctm = ctx.gstate.ctm;
            emit(
                ctx,
                DlElement::PatternFill {
                    pattern,
                    rule,
                    ctm,
                    underlying,
                },
            );
            clear_path(ctx);
            return Ok(());
        }
    }

    let color = crate::color_driver::current_rgb(ctx)?;
    emit_path(ctx, &path);
    emit(ctx, DlElement::Fill { color, rule });
    clear_path(ctx);
    Ok(())
}

fn emit_path(ctx: &mut Context, path: &Path) {
    let mut list = std::mem::take(&mut ctx.display_list);
    list.push_path(path);
    ctx.display_list = list;
}

fn clear_path(ctx: &mut Context) {
    ctx.gstate.path.clear();
    ctx.gstate.current_point = None;
}

/// `fill` –
pub fn fill(ctx: &mut Context) -> PsResult<()> {
    fill_impl(ctx, WindingRule::NonZero)
}

/// `eofill` –
pub fn eofill(ctx: &mut Context) -> PsResult<()> {
    fill_impl(ctx, WindingRule::EvenOdd)
}

/// `stroke` –
pub fn stroke(ctx: &mut Context) -> PsResult<()> {
    if ctx.gstate.path.is_empty() {
        return Ok(());
    }
    crate::ops::device::sync_clip(ctx);
    let color = crate::color_driver::current_rgb(ctx)?;
    let path = ctx.gstate.path.clone();
    emit_path(ctx, &path);
    let style = stroke_style(ctx);
    emit(ctx, DlElement::Stroke { color, style });
    clear_path(ctx);
    Ok(())
}

fn stroke_style(ctx: &Context) -> StrokeStyle {
    StrokeStyle {
        line_width: ctx.gstate.line_width,
        line_cap: ctx.gstate.line_cap as i32,
        line_join: ctx.gstate.line_join as i32,
        miter_limit: ctx.gstate.miter_limit,
        dashes: ctx.gstate.dash.dashes.to_vec(),
        dash_offset: ctx.gstate.dash.offset,
        stroke_adjust: ctx.gstate.stroke_adjust,
        ctm: ctx.gstate.ctm,
    }
}

/// Pop `4n` rect operands or a numarray/numstring; returns device-space
/// rectangle paths.
fn rect_operands(ctx: &mut Context) -> PsResult<Vec<[f64; 4]>> {
    ctx.need(1)?;
    // Array form: [x y w h …]
    if let Some(r) = ctx.peek(0)?.as_array() {
        ctx.require_access(ctx.peek(0)?, Access::ReadOnly)?;
        if r.len % 4 != 0 {
            return Err(ErrorKind::RangeCheck.into());
        }
        let elems = ctx.memory.array(r)?.to_vec();
        let mut rects = Vec::with_capacity(elems.len() / 4);
        for quad in elems.chunks_exact(4) {
            let mut vals = [0.0; 4];
            for (i, e) in quad.iter().enumerate() {
                vals[i] = e.number().ok_or(ErrorKind::TypeCheck)?;
            }
            rects.push(vals);
        }
        ctx.pop()?;
        return Ok(rects);
    }
    // Scalar form: x y w h
    ctx.need(4)?;
    let h = ctx.peek_number(0)?;
    let w = ctx.peek_number(1)?;
    let y = ctx.peek_number(2)?;
    let x = ctx.peek_number(3)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    Ok(vec![[x, y, w, h]])
}

fn rect_path(ctx: &Context, rect: [f64; 4]) -> Path {
    let [x, y, w, h] = rect;
    let m = ctx.gstate.ctm;
    let mut p = Path::new();
    let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)];
    for (i, (ux, uy)) in corners.iter().enumerate() {
        let (dx, dy) = m.apply(*ux, *uy);
        if i == 0 {
            p.move_to(Point::new(dx, dy));
        } else {
            p.line_to(Point::new(dx, dy));
        }
    }
    p.close();
    p
}

/// x y w h `rectfill` – (and the array form)
pub fn rectfill(ctx: &mut Context) -> PsResult<()> {
    let rects = rect_operands(ctx)?;
    crate::ops::device::sync_clip(ctx);
    let color = crate::color_driver::current_rgb(ctx)?;
    for rect in rects {
        let p = rect_path(ctx, rect);
        emit_path(ctx, &p);
        emit(
            ctx,
            DlElement::Fill {
                color,
                rule: WindingRule::NonZero,
            },
        );
    }
    Ok(())
}

/// x y w h `rectstroke` –
pub fn rectstroke(ctx: &mut Context) -> PsResult<()> {
    let rects = rect_operands(ctx)?;
    crate::ops::device::sync_clip(ctx);
    let color = crate::color_driver::current_rgb(ctx)?;
    for rect in rects {
        let p = rect_path(ctx, rect);
        emit_path(ctx, &p);
        let style = stroke_style(ctx);
        emit(ctx, DlElement::Stroke { color, style });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Pull sample data from a procedure, string, or file data source until
/// `needed` bytes arrive (procedure sources are called repeatedly).
fn collect_samples(ctx: &mut Context, source: &Object, needed: usize) -> PsResult<Vec<u8>> {
    let mut data = Vec::with_capacity(needed);
    match source.value {
        Value::String(r) => {
            let bytes = ctx.memory.string_vec(r)?;
            while data.len() < needed && !bytes.is_empty() {
                let take = (needed - data.len()).min(bytes.len());
                data.extend_from_slice(&bytes[..take]);
            }
        }
        Value::File(id) => {
            while data.len() < needed {
                match ctx.files.get(id)?.read_byte()? {
                    Some(b) => data.push(b),
                    None => break,
                }
            }
        }
        Value::Array(_) | Value::PackedArray(_) if source.is_executable() => {
            let mut guard = 0;
            while data.len() < needed {
                engine::call_procedure(ctx, *source)?;
                let chunk = ctx.pop()?;
                let r = chunk.as_string().ok_or(ErrorKind::TypeCheck)?;
                let bytes = ctx.memory.string_vec(r)?;
                if bytes.is_empty() {
                    break;
                }
                data.extend_from_slice(&bytes);
                guard += 1;
                if guard > 1_000_000 {
                    return Err(ErrorKind::LimitCheck.into());
                }
            }
            data.truncate(needed);
        }
        _ => return Err(ErrorKind::TypeCheck.into()),
    }
    Ok(data)
}

fn row_bytes(width: i32, bits: i32, components: i32) -> usize {
    ((width as usize * bits as usize * components as usize) + 7) / 8
}

/// width height bits matrix datasrc `image` – (Level 1 form; the Level 2
/// dictionary form funnels through the same element).
pub fn image(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    if ctx.peek(0)?.as_dict().is_some() {
        return image_from_dict(ctx, false);
    }
    ctx.need(5)?;
    let source = *ctx.peek(0)?;
    let matrix = super::matrix::read_matrix(ctx, ctx.peek(1)?)?;
    let bits = ctx.peek_int(2)?;
    let height = ctx.peek_int(3)?;
    let width = ctx.peek_int(4)?;
    validate_image_geometry(width, height, bits)?;
    for _ in 0..5 {
        ctx.pop()?;
    }
    let needed = row_bytes(width, bits, 1) * height as usize;
    let samples = collect_samples(ctx, &source, needed)?;
    let data = ImageData {
        width,
        height,
        bits_per_component: bits,
        components: 1,
        matrix,
        ctm: ctx.gstate.ctm,
        decode: vec![0.0, 1.0],
        interpolate: false,
        samples,
    };
    emit(ctx, DlElement::Image(data));
    Ok(())
}

fn validate_image_geometry(width: i32, height: i32, bits: i32) -> PsResult<()> {
    if width < 0 || height < 0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    if !matches!(bits, 1 | 2 | 4 | 8 | 12) {
        return Err(ErrorKind::RangeCheck.into());
    }
    Ok(())
}

/// width height polarity matrix datasrc `imagemask` –
pub fn imagemask(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    if ctx.peek(0)?.as_dict().is_some() {
        return image_from_dict(ctx, true);
    }
    ctx.need(5)?;
    let source = *ctx.peek(0)?;
    let matrix = super::matrix::read_matrix(ctx, ctx.peek(1)?)?;
    let polarity = ctx.peek_bool(2)?;
    let height = ctx.peek_int(3)?;
    let width = ctx.peek_int(4)?;
    validate_image_geometry(width, height, 1)?;
    for _ in 0..5 {
        ctx.pop()?;
    }
    let needed = row_bytes(width, 1, 1) * height as usize;
    let samples = collect_samples(ctx, &source, needed)?;
    let color = crate::color_driver::current_rgb(ctx)?;
    let data = ImageData {
        width,
        height,
        bits_per_component: 1,
        components: 1,
        matrix,
        ctm: ctx.gstate.ctm,
        decode: vec![0.0, 1.0],
        interpolate: false,
        samples,
    };
    emit(
        ctx,
        DlElement::ImageMask {
            data,
            color,
            polarity,
        },
    );
    Ok(())
}

/// … ncomp `colorimage` –
pub fn colorimage(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let ncomp = ctx.peek_int(0)?;
    let multi = ctx.peek_bool(1)?;
    if !matches!(ncomp, 1 | 3 | 4) {
        return Err(ErrorKind::RangeCheck.into());
    }
    let nsources = if multi { ncomp as usize } else { 1 };
    ctx.need(2 + nsources + 4)?;
    let mut sources = Vec::with_capacity(nsources);
    for i in 0..nsources {
        sources.push(*ctx.peek(2 + i)?);
    }
    sources.reverse();
    let matrix = super::matrix::read_matrix(ctx, ctx.peek(2 + nsources)?)?;
    let bits = ctx.peek_int(3 + nsources)?;
    let height = ctx.peek_int(4 + nsources)?;
    let width = ctx.peek_int(5 + nsources)?;
    validate_image_geometry(width, height, bits)?;
    for _ in 0..6 + nsources {
        ctx.pop()?;
    }

    let needed = row_bytes(width, bits, if multi { 1 } else { ncomp }) * height as usize;
    let samples = if multi {
        // Interleave the per-component sources plane by plane.
        let mut planes = Vec::with_capacity(nsources);
        for src in &sources {
            planes.push(collect_samples(ctx, src, needed)?);
        }
        let mut merged = Vec::with_capacity(needed * nsources);
        for i in 0..needed {
            for plane in &planes {
                merged.push(plane.get(i).copied().unwrap_or(0));
            }
        }
        merged
    } else {
        collect_samples(ctx, &sources[0], needed)?
    };

    let space = match ncomp {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        _ => "DeviceCMYK",
    };
    let data = ImageData {
        width,
        height,
        bits_per_component: bits,
        components: ncomp,
        matrix,
        ctm: ctx.gstate.ctm,
        decode: vec![0.0, 1.0],
        interpolate: false,
        samples,
    };
    emit(
        ctx,
        DlElement::ColorImage {
            data,
            color_space: space,
        },
    );
    Ok(())
}

/// Level 2 image dictionary form.
fn image_from_dict(ctx: &mut Context, mask: bool) -> PsResult<()> {
    use postforge_runtime::DictKey;
    let dref = ctx.peek_dict(0)?;
    let key = |n: &[u8]| DictKey::Name(postforge_core::Name::new(n));
    let get_int = |ctx: &Context, k: &[u8]| -> PsResult<i32> {
        ctx.memory
            .dict_get(dref, key(k))?
            .and_then(|o| o.as_int())
            .ok_or_else(|| ErrorKind::TypeCheck.into())
    };
    let width = get_int(ctx, b"Width")?;
    let height = get_int(ctx, b"Height")?;
    let bits = get_int(ctx, b"BitsPerComponent")?;
    validate_image_geometry(width, height, bits)?;
    let matrix_obj = ctx
        .memory
        .dict_get(dref, key(b"ImageMatrix"))?
        .ok_or(ErrorKind::TypeCheck)?;
    let matrix = super::matrix::read_matrix(ctx, &matrix_obj)?;
    let source = ctx
        .memory
        .dict_get(dref, key(b"DataSource"))?
        .ok_or(ErrorKind::TypeCheck)?;
    let decode = match ctx.memory.dict_get(dref, key(b"Decode"))? {
        Some(obj) => {
            let r = obj.as_array().ok_or(ErrorKind::TypeCheck)?;
            ctx.memory
                .array(r)?
                .iter()
                .filter_map(|o| o.number())
                .collect()
        }
        None => vec![0.0, 1.0],
    };
    let interpolate = ctx
        .memory
        .dict_get(dref, key(b"Interpolate"))?
        .and_then(|o| o.as_bool())
        .unwrap_or(false);
    let components = if mask {
        1
    } else {
        (decode.len() / 2).max(1) as i32
    };
    ctx.pop()?;

    let needed = row_bytes(width, bits, components) * height as usize;
    let samples = collect_samples(ctx, &source, needed)?;
    let data = ImageData {
        width,
        height,
        bits_per_component: bits,
        components,
        matrix,
        ctm: ctx.gstate.ctm,
        decode,
        interpolate,
        samples,
    };
    if mask {
        let color = crate::color_driver::current_rgb(ctx)?;
        emit(
            ctx,
            DlElement::ImageMask {
                data,
                color,
                polarity: true,
            },
        );
    } else {
        emit(ctx, DlElement::Image(data));
    }
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "erasepage", erasepage);
    super::define_op(ctx, "fill", fill);
    super::define_op(ctx, "eofill", eofill);
    super::define_op(ctx, "stroke", stroke);
    super::define_op(ctx, "rectfill", rectfill);
    super::define_op(ctx, "rectstroke", rectstroke);
    super::define_op(ctx, "image", image);
    super::define_op(ctx, "imagemask", imagemask);
    super::define_op(ctx, "colorimage", colorimage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_scenario_triangle_fill() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"0 0 moveto 100 0 lineto 100 100 lineto closepath fill showpage",
        )
        .unwrap();
        let pages = ctx.captured_pages();
        assert_eq!(pages.len(), 1);
        let e = &pages[0].elements;
        assert!(matches!(e[0], DlElement::MoveTo { x, y } if x == 0.0 && y == 0.0));
        assert!(matches!(e[1], DlElement::LineTo { x, y } if x == 100.0 && y == 0.0));
        assert!(matches!(e[2], DlElement::LineTo { x, y } if x == 100.0 && y == 100.0));
        assert!(matches!(e[3], DlElement::ClosePath));
        assert!(matches!(
            e[4],
            DlElement::Fill {
                color: Rgb {
                    r: 0.0,
                    g: 0.0,
                    b: 0.0
                },
                rule: WindingRule::NonZero
            }
        ));
        assert!(matches!(e[5], DlElement::ErasePage));
    }

    #[test]
    fn fill_clears_the_path() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 0 moveto 10 10 lineto fill").unwrap();
        assert!(ctx.gstate.path.is_empty());
        assert!(ctx.gstate.current_point.is_none());
    }

    #[test]
    fn stroke_records_pen_parameters() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3 setlinewidth 1 setlinecap [2 1] 0 setdash 0 0 moveto 50 0 lineto stroke")
            .unwrap();
        let stroke = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DlElement::Stroke { style, .. } => Some(style.clone()),
                _ => None,
            })
            .expect("stroke element");
        assert_eq!(stroke.line_width, 3.0);
        assert_eq!(stroke.line_cap, 1);
        assert_eq!(stroke.dashes, vec![2.0, 1.0]);
    }

    #[test]
    fn rectfill_emits_closed_rectangle() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 0 0 setrgbcolor 10 10 30 20 rectfill").unwrap();
        let closes = ctx
            .display_list
            .elements
            .iter()
            .filter(|e| matches!(e, DlElement::ClosePath))
            .count();
        assert_eq!(closes, 1);
        assert!(matches!(
            ctx.display_list.elements.last(),
            Some(DlElement::Fill { color, .. }) if color.r > 0.99
        ));
    }

    #[test]
    fn image_consumes_string_source() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2 2 8 [2 0 0 2 0 0] <FF00FF00> image").unwrap();
        let img = ctx
            .display_list
            .elements
            .iter()
            .find_map(|e| match e {
                DlElement::Image(d) => Some(d.clone()),
                _ => None,
            })
            .expect("image element");
        assert_eq!(img.width, 2);
        assert_eq!(img.samples, vec![0xFF, 0x00, 0xFF, 0x00]);
    }

    #[test]
    fn imagemask_carries_current_color() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 1 0 setrgbcolor 8 1 true [1 0 0 1 0 0] <A5> imagemask")
            .unwrap();
        assert!(matches!(
            ctx.display_list.elements.last(),
            Some(DlElement::ImageMask { color, polarity: true, .. }) if color.g > 0.99
        ));
    }
}
