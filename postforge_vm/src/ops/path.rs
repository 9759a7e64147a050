//! Path construction and clipping operators.
//!
//! Coordinates transform through the CTM at call time, so the stored path
//! is device space; `currentpoint` reports back through the inverse CTM.

use crate::context::Context;
use crate::engine::{ExecItem, LoopFrame};
use postforge_core::{ErrorKind, Object, PsResult};
use postforge_graphics::{DlElement, Matrix, Path, PathSeg, Point, WindingRule};

/// `newpath` –
pub fn newpath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path.clear();
    ctx.gstate.current_point = None;
    Ok(())
}

/// `currentpoint` x y — user space via the inverse CTM.
pub fn currentpoint(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(2)?;
    let p = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let (x, y) = ctx.gstate.ictm.apply(p.x, p.y);
    ctx.push(Object::real(x))?;
    ctx.push(Object::real(y))
}

fn pop_xy(ctx: &mut Context) -> PsResult<(f64, f64)> {
    ctx.need(2)?;
    let y = ctx.peek_number(0)?;
    let x = ctx.peek_number(1)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok((x, y))
}

/// x y `moveto` –
pub fn moveto(ctx: &mut Context) -> PsResult<()> {
    let (x, y) = pop_xy(ctx)?;
    let (dx, dy) = ctx.gstate.ctm.apply(x, y);
    let p = Point::new(dx, dy);
    ctx.gstate.path.move_to(p);
    ctx.gstate.current_point = Some(p);
    Ok(())
}

/// dx dy `rmoveto` –
pub fn rmoveto(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let (dx, dy) = pop_xy(ctx)?;
    let (ddx, ddy) = ctx.gstate.ctm.apply_distance(dx, dy);
    let p = Point::new(current.x + ddx, current.y + ddy);
    ctx.gstate.path.move_to(p);
    ctx.gstate.current_point = Some(p);
    Ok(())
}

/// x y `lineto` –
pub fn lineto(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let (x, y) = pop_xy(ctx)?;
    let (dx, dy) = ctx.gstate.ctm.apply(x, y);
    let p = Point::new(dx, dy);
    ctx.gstate.path.line_to(p);
    ctx.gstate.current_point = Some(p);
    Ok(())
}

/// dx dy `rlineto` –
pub fn rlineto(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let (dx, dy) = pop_xy(ctx)?;
    let (ddx, ddy) = ctx.gstate.ctm.apply_distance(dx, dy);
    let p = Point::new(current.x + ddx, current.y + ddy);
    ctx.gstate.path.line_to(p);
    ctx.gstate.current_point = Some(p);
    Ok(())
}

/// x1 y1 x2 y2 x3 y3 `curveto` –
pub fn curveto(ctx: &mut Context) -> PsResult<()> {
    ctx.need(6)?;
    if ctx.gstate.current_point.is_none() {
        return Err(ErrorKind::NoCurrentPoint.into());
    }
    let mut c = [0.0f64; 6];
    for i in 0..6 {
        c[5 - i] = ctx.peek_number(i)?;
    }
    for _ in 0..6 {
        ctx.pop()?;
    }
    let m = ctx.gstate.ctm;
    let (x1, y1) = m.apply(c[0], c[1]);
    let (x2, y2) = m.apply(c[2], c[3]);
    let (x3, y3) = m.apply(c[4], c[5]);
    let end = Point::new(x3, y3);
    ctx.gstate
        .path
        .curve_to(Point::new(x1, y1), Point::new(x2, y2), end);
    ctx.gstate.current_point = Some(end);
    Ok(())
}

/// dx1 dy1 dx2 dy2 dx3 dy3 `rcurveto` –
pub fn rcurveto(ctx: &mut Context) -> PsResult<()> {
    ctx.need(6)?;
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let mut c = [0.0f64; 6];
    for i in 0..6 {
        c[5 - i] = ctx.peek_number(i)?;
    }
    for _ in 0..6 {
        ctx.pop()?;
    }
    let m = ctx.gstate.ctm;
    let rel = |dx: f64, dy: f64| {
        let (ddx, ddy) = m.apply_distance(dx, dy);
        Point::new(current.x + ddx, current.y + ddy)
    };
    let c1 = rel(c[0], c[1]);
    let c2 = rel(c[2], c[3]);
    let end = rel(c[4], c[5]);
    ctx.gstate.path.curve_to(c1, c2, end);
    ctx.gstate.current_point = Some(end);
    Ok(())
}

/// `closepath` –
pub fn closepath(ctx: &mut Context) -> PsResult<()> {
    if let Some(start) = ctx.gstate.path.close() {
        ctx.gstate.current_point = Some(start);
    }
    Ok(())
}

/// x y r ang1 ang2 `arc` – (counterclockwise) / `arcn` – (clockwise)
fn arc_impl(ctx: &mut Context, clockwise: bool) -> PsResult<()> {
    ctx.need(5)?;
    let mut a = [0.0f64; 5];
    for i in 0..5 {
        a[4 - i] = ctx.peek_number(i)?;
    }
    let (cx, cy, radius, ang1, ang2) = (a[0], a[1], a[2], a[3], a[4]);
    if radius < 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    for _ in 0..5 {
        ctx.pop()?;
    }

    let start = ang1.to_radians();
    let mut end = ang2.to_radians();
    if clockwise {
        while end > start {
            end -= std::f64::consts::TAU;
        }
    } else {
        while end < start {
            end += std::f64::consts::TAU;
        }
    }

    // The user-space arc renders as Bézier segments of at most 90°,
    // transformed through the CTM.
    let m = ctx.gstate.ctm;
    let point_at = |ang: f64| {
        let (x, y) = m.apply(cx + radius * ang.cos(), cy + radius * ang.sin());
        Point::new(x, y)
    };

    let first = point_at(start);
    // An arc continues the current path with an implicit lineto when a
    // current point exists.
    if ctx.gstate.current_point.is_some() {
        ctx.gstate.path.line_to(first);
    } else {
        ctx.gstate.path.move_to(first);
    }

    let total = end - start;
    let segments = ((total.abs() / std::f64::consts::FRAC_PI_2).ceil() as usize).max(1);
    let step = total / segments as f64;
    // Magic kappa for a Bézier quarter-arc, scaled to the step angle.
    let k = 4.0 / 3.0 * (step / 4.0).tan();
    for i in 0..segments {
        let a0 = start + step * i as f64;
        let a1 = a0 + step;
        let p0u = (cx + radius * a0.cos(), cy + radius * a0.sin());
        let p1u = (cx + radius * a1.cos(), cy + radius * a1.sin());
        let c1u = (
            p0u.0 - k * radius * a0.sin(),
            p0u.1 + k * radius * a0.cos(),
        );
        let c2u = (
            p1u.0 + k * radius * a1.sin(),
            p1u.1 - k * radius * a1.cos(),
        );
        let (c1x, c1y) = m.apply(c1u.0, c1u.1);
        let (c2x, c2y) = m.apply(c2u.0, c2u.1);
        let (px, py) = m.apply(p1u.0, p1u.1);
        ctx.gstate.path.curve_to(
            Point::new(c1x, c1y),
            Point::new(c2x, c2y),
            Point::new(px, py),
        );
    }
    ctx.gstate.current_point = Some(point_at(end));
    Ok(())
}

pub fn arc(ctx: &mut Context) -> PsResult<()> {
    arc_impl(ctx, false)
}

pub fn arcn(ctx: &mut Context) -> PsResult<()> {
    arc_impl(ctx, true)
}

/// x1 y1 x2 y2 r `arct` – / `arcto` xt1 yt1 xt2 yt2
fn arcto_impl(ctx: &mut Context, report: bool) -> PsResult<()> {
    ctx.need(5)?;
    let current = ctx
        .gstate
        .current_point
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let mut a = [0.0f64; 5];
    for i in 0..5 {
        a[4 - i] = ctx.peek_number(i)?;
    }
    let (x1, y1, x2, y2, radius) = (a[0], a[1], a[2], a[3], a[4]);
    if radius < 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    for _ in 0..5 {
        ctx.pop()?;
    }

    // Work in user space; the current point converts back first.
    let (cx, cy) = ctx.gstate.ictm.apply(current.x, current.y);
    let v1 = (cx - x1, cy - y1);
    let v2 = (x2 - x1, y2 - y1);
    let l1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let l2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if l1 == 0.0 || l2 == 0.0 {
        return Err(ErrorKind::UndefinedResult.into());
    }
    let u1 = (v1.0 / l1, v1.1 / l1);
    let u2 = (v2.0 / l2, v2.1 / l2);
    let cos_a = u1.0 * u2.0 + u1.1 * u2.1;
    let sin_a = (1.0 - cos_a * cos_a).max(1e-12).sqrt();
    let dist = radius * (1.0 + cos_a) / sin_a;

    // Tangent points on each leg.
    let t1 = (x1 + u1.0 * dist, y1 + u1.1 * dist);
    let t2 = (x1 + u2.0 * dist, y1 + u2.1 * dist);

    // lineto the first tangent point, then arc to the second.
    let m = ctx.gstate.ctm;
    let (d1x, d1y) = m.apply(t1.0, t1.1);
    ctx.gstate.path.line_to(Point::new(d1x, d1y));

    // Approximate the corner arc with one Bézier.
    let k = 4.0 / 3.0 * tan_for_arc(cos_a);
    let c1 = (t1.0 + (x1 - t1.0) * k, t1.1 + (y1 - t1.1) * k);
    let c2 = (t2.0 + (x1 - t2.0) * k, t2.1 + (y1 - t2.1) * k);
    let (c1x, c1y) = m.apply(c1.0, c1.1);
    let (c2x, c2y) = m.apply(c2.0, c2.1);
    let (d2x, d2y) = m.apply(t2.0, t2.1);
    ctx.gstate.path.curve_to(
        Point::new(c1x, c1y),
        Point::new(c2x, c2y),
        Point::new(d2x, d2y),
    );
    ctx.gstate.current_point = Some(Point::new(d2x, d2y));

    if report {
        ctx.reserve(4)?;
        ctx.push(Object::real(t1.0))?;
        ctx.push(Object::real(t1.1))?;
        ctx.push(Object::real(t2.0))?;
        ctx.push(Object::real(t2.1))?;
    }
    Ok(())
}

fn tan_for_arc(cos_a: f64) -> f64 {
    // tan(theta/4) for the included corner angle, bounded for safety.
    let theta = cos_a.clamp(-1.0, 1.0).acos();
    ((std::f64::consts::PI - theta) / 4.0).tan().abs().min(1.0)
}

pub fn arct(ctx: &mut Context) -> PsResult<()> {
    arcto_impl(ctx, false)
}

pub fn arcto(ctx: &mut Context) -> PsResult<()> {
    arcto_impl(ctx, true)
}

/// `pathbbox` llx lly urx ury — user-space box of the current path.
pub fn pathbbox(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(4)?;
    let bbox = ctx
        .gstate
        .path
        .bbox()
        .ok_or(ErrorKind::NoCurrentPoint)?;
    let ictm = ctx.gstate.ictm;
    // Transform the four device-space corners and re-box.
    let corners = [
        ictm.apply(bbox.0, bbox.1),
        ictm.apply(bbox.2, bbox.1),
        ictm.apply(bbox.0, bbox.3),
        ictm.apply(bbox.2, bbox.3),
    ];
    let llx = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let lly = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);
    let urx = corners.iter().map(|c| c.0).fold(f64::NEG_INFINITY, f64::max);
    let ury = corners.iter().map(|c| c.1).fold(f64::NEG_INFINITY, f64::max);
    ctx.push(Object::real(llx))?;
    ctx.push(Object::real(lly))?;
    ctx.push(Object::real(urx))?;
    ctx.push(Object::real(ury))
}

/// `flattenpath` –
pub fn flattenpath(ctx: &mut Context) -> PsResult<()> {
    let flat = ctx.gstate.path.flatten(ctx.gstate.flatness);
    ctx.gstate.path = flat;
    Ok(())
}

/// `reversepath` –
pub fn reversepath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path = ctx.gstate.path.reversed();
    Ok(())
}

/// `strokepath` – — replace the path with a stroke outline. The outline
/// is a per-segment quad approximation without joins or caps.
pub fn strokepath(ctx: &mut Context) -> PsResult<()> {
    let (wx, wy) = ctx
        .gstate
        .ctm
        .apply_distance(ctx.gstate.line_width, ctx.gstate.line_width);
    let hw = ((wx.abs() + wy.abs()) / 4.0).max(0.05);
    let flat = ctx.gstate.path.flatten(ctx.gstate.flatness);
    let mut out = Path::new();
    for sub in &flat.subpaths {
        let mut pts: Vec<Point> = Vec::new();
        for seg in sub {
            match *seg {
                PathSeg::MoveTo(p) | PathSeg::LineTo(p) => pts.push(p),
                PathSeg::ClosePath => {
                    if let Some(first) = pts.first().copied() {
                        pts.push(first);
                    }
                }
                PathSeg::CurveTo(..) => {}
            }
        }
        for pair in pts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            let len = (dx * dx + dy * dy).sqrt();
            if len == 0.0 {
                continue;
            }
            let nx = -dy / len * hw;
            let ny = dx / len * hw;
            out.move_to(Point::new(a.x + nx, a.y + ny));
            out.line_to(Point::new(b.x + nx, b.y + ny));
            out.line_to(Point::new(b.x - nx, b.y - ny));
            out.line_to(Point::new(a.x - nx, a.y - ny));
            out.close();
        }
    }
    ctx.gstate.path = out;
    ctx.gstate.current_point = None;
    Ok(())
}

/// `clippath` – — install the clip path as the current path.
pub fn clippath(ctx: &mut Context) -> PsResult<()> {
    ctx.gstate.path = if ctx.gstate.clip_path.is_empty() {
        crate::ops::device::page_outline(ctx)
    } else {
        ctx.gstate.clip_path.clone()
    };
    ctx.gstate.current_point = None;
    Ok(())
}

/// move line curve close `pathforall` –
pub fn pathforall(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let close_proc = *ctx.peek_proc(0)?;
    let curve_proc = *ctx.peek_proc(1)?;
    let line_proc = *ctx.peek_proc(2)?;
    let move_proc = *ctx.peek_proc(3)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    let segs: Vec<PathSeg> = ctx.gstate.path.segments().copied().collect();
    ctx.e_stack
        .push(ExecItem::Loop(Box::new(LoopFrame::PathForall {
            segs,
            index: 0,
            ictm: ctx.gstate.ictm,
            move_proc,
            line_proc,
            curve_proc,
            close_proc,
        })));
    Ok(())
}

fn emit_clip(ctx: &mut Context, rule: WindingRule, is_initclip: bool) {
    let path = ctx.gstate.clip_path.clone();
    ctx.display_list.push(DlElement::Clip {
        path,
        rule,
        is_initclip,
    });
    ctx.emitted_clip_version = ctx.gstate.clip_version;
}

/// `clip` – — intersect with the current path (tracked, not computed:
/// the renderer owns region math).
pub fn clip(ctx: &mut Context) -> PsResult<()> {
    let path = ctx.gstate.path.clone();
    ctx.gstate.set_clip(path);
    emit_clip(ctx, WindingRule::NonZero, false);
    Ok(())
}

/// `eoclip` –
pub fn eoclip(ctx: &mut Context) -> PsResult<()> {
    let path = ctx.gstate.path.clone();
    ctx.gstate.set_clip(path);
    emit_clip(ctx, WindingRule::EvenOdd, false);
    Ok(())
}

/// x y w h `rectclip` –
pub fn rectclip(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    let h = ctx.peek_number(0)?;
    let w = ctx.peek_number(1)?;
    let y = ctx.peek_number(2)?;
    let x = ctx.peek_number(3)?;
    for _ in 0..4 {
        ctx.pop()?;
    }
    let m = ctx.gstate.ctm;
    let mut rect = Path::new();
    let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)];
    for (i, (ux, uy)) in corners.iter().enumerate() {
        let (dx, dy) = m.apply(*ux, *uy);
        if i == 0 {
            rect.move_to(Point::new(dx, dy));
        } else {
            rect.line_to(Point::new(dx, dy));
        }
    }
    rect.close();
    ctx.gstate.set_clip(rect);
    emit_clip(ctx, WindingRule::NonZero, false);
    // rectclip also clears the current path.
    ctx.gstate.path.clear();
    ctx.gstate.current_point = None;
    Ok(())
}

/// `initclip` –
pub fn initclip(ctx: &mut Context) -> PsResult<()> {
    let outline = crate::ops::device::page_outline(ctx);
    ctx.gstate.set_clip(outline);
    emit_clip(ctx, WindingRule::NonZero, true);
    Ok(())
}

/// llx lly urx ury `setbbox` – — accepted; geometry tracking is the
/// renderer's concern.
pub fn setbbox(ctx: &mut Context) -> PsResult<()> {
    ctx.need(4)?;
    for i in 0..4 {
        ctx.peek_number(i)?;
    }
    for _ in 0..4 {
        ctx.pop()?;
    }
    Ok(())
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "newpath", newpath);
    super::define_op(ctx, "currentpoint", currentpoint);
    super::define_op(ctx, "moveto", moveto);
    super::define_op(ctx, "rmoveto", rmoveto);
    super::define_op(ctx, "lineto", lineto);
    super::define_op(ctx, "rlineto", rlineto);
    super::define_op(ctx, "curveto", curveto);
    super::define_op(ctx, "rcurveto", rcurveto);
    super::define_op(ctx, "closepath", closepath);
    super::define_op(ctx, "arc", arc);
    super::define_op(ctx, "arcn", arcn);
    super::define_op(ctx, "arct", arct);
    super::define_op(ctx, "arcto", arcto);
    super::define_op(ctx, "pathbbox", pathbbox);
    super::define_op(ctx, "flattenpath", flattenpath);
    super::define_op(ctx, "reversepath", reversepath);
    super::define_op(ctx, "strokepath", strokepath);
    super::define_op(ctx, "clippath", clippath);
    super::define_op(ctx, "pathforall", pathforall);
    super::define_op(ctx, "clip", clip);
    super::define_op(ctx, "eoclip", eoclip);
    super::define_op(ctx, "rectclip", rectclip);
    super::define_op(ctx, "initclip", initclip);
    super::define_op(ctx, "setbbox", setbbox);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moveto_lineto_build_device_path() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"10 20 moveto 30 40 lineto").unwrap();
        let segs: Vec<_> = ctx.gstate.path.segments().copied().collect();
        assert_eq!(segs[0], PathSeg::MoveTo(Point::new(10.0, 20.0)));
        assert_eq!(segs[1], PathSeg::LineTo(Point::new(30.0, 40.0)));
    }

    #[test]
    fn path_transforms_through_ctm_at_call_time() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2 2 scale 5 5 moveto 1 1 scale 10 10 lineto")
            .unwrap();
        let segs: Vec<_> = ctx.gstate.path.segments().copied().collect();
        // First point under 2x scale, second under the composed (still 2x)
        // CTM.
        assert_eq!(segs[0], PathSeg::MoveTo(Point::new(10.0, 10.0)));
        assert_eq!(segs[1], PathSeg::LineTo(Point::new(20.0, 20.0)));
    }

    #[test]
    fn currentpoint_reports_user_space() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"10 10 translate 5 6 moveto currentpoint")
            .unwrap();
        let y = ctx.pop().unwrap().number().unwrap();
        let x = ctx.pop().unwrap().number().unwrap();
        assert!((x - 5.0).abs() < 1e-9);
        assert!((y - 6.0).abs() < 1e-9);
    }

    #[test]
    fn currentpoint_without_point_raises() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ currentpoint } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }

    #[test]
    fn closepath_restores_subpath_start() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 2 moveto 10 2 lineto closepath currentpoint")
            .unwrap();
        let y = ctx.pop().unwrap().number().unwrap();
        let x = ctx.pop().unwrap().number().unwrap();
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 2.0).abs() < 1e-9);
    }

    #[test]
    fn arc_positions_current_point() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 0 10 0 90 arc currentpoint").unwrap();
        let y = ctx.pop().unwrap().number().unwrap();
        let x = ctx.pop().unwrap().number().unwrap();
        assert!(x.abs() < 1e-6);
        assert!((y - 10.0).abs() < 1e-6);
    }

    #[test]
    fn pathbbox_in_user_space() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2 2 scale 0 0 moveto 10 5 lineto pathbbox")
            .unwrap();
        let ury = ctx.pop().unwrap().number().unwrap();
        let urx = ctx.pop().unwrap().number().unwrap();
        assert!((urx - 10.0).abs() < 1e-9);
        assert!((ury - 5.0).abs() < 1e-9);
    }

    #[test]
    fn pathforall_walks_segments() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"0 0 moveto 5 5 lineto closepath 0 {pop pop 1} {pop pop 2} {} {3} pathforall",
        )
        .unwrap();
        assert_eq!(ctx.pop().unwrap().as_int(), Some(3));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(2));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(1));
        assert_eq!(ctx.pop().unwrap().as_int(), Some(0));
    }

    #[test]
    fn clip_bumps_version_and_emits_element() {
        let mut ctx = Context::new();
        let v0 = ctx.gstate.clip_version;
        ctx.run_bytes(b"0 0 moveto 100 0 lineto 100 100 lineto closepath clip")
            .unwrap();
        assert_eq!(ctx.gstate.clip_version, v0 + 1);
        assert!(matches!(
            ctx.display_list.elements.last(),
            Some(DlElement::Clip { is_initclip: false, .. })
        ));
    }
}
