//! Matrix operators. A PostScript matrix is a six-element array
//! `[a b c d tx ty]`; the deferred forms (`… matrix translate`) fill the
//! supplied array instead of touching the CTM.

use crate::context::Context;
use postforge_core::{Access, ArrayRef, ErrorKind, Object, PsResult, Value};
use postforge_graphics::Matrix;

/// Read a six-element numeric array as a matrix.
pub fn read_matrix(ctx: &Context, obj: &Object) -> PsResult<Matrix> {
    let r = obj.as_array().ok_or(ErrorKind::TypeCheck)?;
    ctx.require_access(obj, Access::ReadOnly)?;
    if r.len != 6 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let elems = ctx.memory.array(r)?;
    let mut m = [0.0f64; 6];
    for (i, e) in elems.iter().enumerate() {
        m[i] = e.number().ok_or(ErrorKind::TypeCheck)?;
    }
    Ok(Matrix::from_slice(&m))
}

/// Store a matrix into a six-element array operand.
pub fn write_matrix(ctx: &mut Context, obj: &Object, m: Matrix) -> PsResult<()> {
    let r = match obj.value {
        Value::Array(r) => r,
        Value::PackedArray(_) => return Err(ErrorKind::InvalidAccess.into()),
        _ => return Err(ErrorKind::TypeCheck.into()),
    };
    ctx.require_access(obj, Access::Unlimited)?;
    if r.len != 6 {
        return Err(ErrorKind::RangeCheck.into());
    }
    let vals = m.to_array();
    for (i, v) in vals.iter().enumerate() {
        ctx.memory.array_put(r, i, Object::real(*v))?;
    }
    Ok(())
}

/// `matrix` matrix — identity.
pub fn matrix(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let obj = identity_array(ctx);
    ctx.push(obj)
}

fn identity_array(ctx: &mut Context) -> Object {
    let elems = Matrix::IDENTITY
        .to_array()
        .iter()
        .map(|&v| Object::real(v))
        .collect();
    ctx.new_array(elems)
}

/// `initmatrix` – — restore the device default CTM.
pub fn initmatrix(ctx: &mut Context) -> PsResult<()> {
    let default = crate::ops::device::default_matrix(ctx);
    ctx.gstate.set_ctm(default);
    Ok(())
}

/// matrix `identmatrix` matrix
pub fn identmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    write_matrix(ctx, &obj, Matrix::IDENTITY)
}

/// matrix `defaultmatrix` matrix
pub fn defaultmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let default = crate::ops::device::default_matrix(ctx);
    write_matrix(ctx, &obj, default)
}

/// matrix `currentmatrix` matrix
pub fn currentmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let ctm = ctx.gstate.ctm;
    write_matrix(ctx, &obj, ctm)
}

/// matrix `setmatrix` –
pub fn setmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let m = read_matrix(ctx, &obj)?;
    ctx.pop()?;
    ctx.gstate.set_ctm(m);
    Ok(())
}

/// Shared shape of translate/scale/rotate: `args op` mutates the CTM,
/// `args matrix op` fills the matrix operand.
fn transform_op(
    ctx: &mut Context,
    nargs: usize,
    build: impl Fn(&[f64]) -> Matrix,
) -> PsResult<()> {
    ctx.need(nargs)?;
    let deferred = ctx.peek(0)?.as_array().is_some();
    if deferred {
        ctx.need(nargs + 1)?;
        let target = *ctx.peek(0)?;
        let mut args = vec![0.0; nargs];
        for i in 0..nargs {
            args[nargs - 1 - i] = ctx.peek_number(i + 1)?;
        }
        write_matrix(ctx, &target, build(&args))?;
        let obj = *ctx.peek(0)?;
        for _ in 0..nargs + 1 {
            ctx.pop()?;
        }
        ctx.push(obj)
    } else {
        let mut args = vec![0.0; nargs];
        for i in 0..nargs {
            args[nargs - 1 - i] = ctx.peek_number(i)?;
        }
        for _ in 0..nargs {
            ctx.pop()?;
        }
        let m = build(&args).concat(ctx.gstate.ctm);
        ctx.gstate.set_ctm(m);
        Ok(())
    }
}

pub fn translate(ctx: &mut Context) -> PsResult<()> {
    transform_op(ctx, 2, |a| Matrix::translation(a[0], a[1]))
}

pub fn scale(ctx: &mut Context) -> PsResult<()> {
    transform_op(ctx, 2, |a| Matrix::scaling(a[0], a[1]))
}

pub fn rotate(ctx: &mut Context) -> PsResult<()> {
    transform_op(ctx, 1, |a| Matrix::rotation(a[0]))
}

/// matrix `concat` –
pub fn concat(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    let m = read_matrix(ctx, &obj)?;
    ctx.pop()?;
    let new = m.concat(ctx.gstate.ctm);
    ctx.gstate.set_ctm(new);
    Ok(())
}

/// m1 m2 m3 `concatmatrix` m3 — m3 = m1 × m2.
pub fn concatmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(3)?;
    let target = *ctx.peek(0)?;
    let m2 = read_matrix(ctx, ctx.peek(1)?)?;
    let m1 = read_matrix(ctx, ctx.peek(2)?)?;
    write_matrix(ctx, &target, m1.concat(m2))?;
    let obj = *ctx.peek(0)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(obj)
}

/// Point transforms, each with a CTM form and a matrix-operand form.
fn point_op(ctx: &mut Context, apply: fn(&Matrix, f64, f64) -> (f64, f64), invert: bool) -> PsResult<()> {
    ctx.need(2)?;
    let explicit = ctx.peek(0)?.as_array().is_some();
    let (m, drop) = if explicit {
        ctx.need(3)?;
        let m = read_matrix(ctx, ctx.peek(0)?)?;
        (if invert { m.invert()? } else { m }, 3)
    } else {
        let m = if invert {
            ctx.gstate.ictm
        } else {
            ctx.gstate.ctm
        };
        (m, 2)
    };
    let y = ctx.peek_number(drop - 2)?;
    let x = ctx.peek_number(drop - 1)?;
    for _ in 0..drop {
        ctx.pop()?;
    }
    let (ox, oy) = apply(&m, x, y);
    ctx.push(Object::real(ox))?;
    ctx.push(Object::real(oy))
}

pub fn transform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| m.apply(x, y), false)
}

pub fn itransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| m.apply(x, y), true)
}

pub fn dtransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| m.apply_distance(x, y), false)
}

pub fn idtransform(ctx: &mut Context) -> PsResult<()> {
    point_op(ctx, |m, x, y| m.apply_distance(x, y), true)
}

/// m1 m2 `invertmatrix` m2
pub fn invertmatrix(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let target = *ctx.peek(0)?;
    let m = read_matrix(ctx, ctx.peek(1)?)?;
    write_matrix(ctx, &target, m.invert()?)?;
    let obj = *ctx.peek(0)?;
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(obj)
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "matrix", matrix);
    super::define_op(ctx, "initmatrix", initmatrix);
    super::define_op(ctx, "identmatrix", identmatrix);
    super::define_op(ctx, "defaultmatrix", defaultmatrix);
    super::define_op(ctx, "currentmatrix", currentmatrix);
    super::define_op(ctx, "setmatrix", setmatrix);
    super::define_op(ctx, "translate", translate);
    super::define_op(ctx, "scale", scale);
    super::define_op(ctx, "rotate", rotate);
    super::define_op(ctx, "concat", concat);
    super::define_op(ctx, "concatmatrix", concatmatrix);
    super::define_op(ctx, "transform", transform);
    super::define_op(ctx, "itransform", itransform);
    super::define_op(ctx, "dtransform", dtransform);
    super::define_op(ctx, "idtransform", idtransform);
    super::define_op(ctx, "invertmatrix", invertmatrix);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top2(ctx: &mut Context) -> (f64, f64) {
        let y = ctx.pop().unwrap().number().unwrap();
        let x = ctx.pop().unwrap().number().unwrap();
        (x, y)
    }

    #[test]
    fn translate_moves_origin() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"10 20 translate 0 0 transform").unwrap();
        let (x, y) = top2(&mut ctx);
        assert_eq!((x, y), (10.0, 20.0));
    }

    #[test]
    fn scale_then_transform() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2 3 scale 5 5 transform").unwrap();
        let (x, y) = top2(&mut ctx);
        assert_eq!((x, y), (10.0, 15.0));
    }

    #[test]
    fn itransform_inverts_transform() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"7 11 translate 2 2 scale 3 4 transform itransform")
            .unwrap();
        let (x, y) = top2(&mut ctx);
        assert!((x - 3.0).abs() < 1e-9);
        assert!((y - 4.0).abs() < 1e-9);
    }

    #[test]
    fn dtransform_ignores_translation() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"100 100 translate 1 0 dtransform").unwrap();
        let (x, y) = top2(&mut ctx);
        assert_eq!((x, y), (1.0, 0.0));
    }

    #[test]
    fn deferred_matrix_form_leaves_ctm_alone() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"10 0 matrix translate pop 0 0 transform")
            .unwrap();
        let (x, y) = top2(&mut ctx);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn concatmatrix_multiplies() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"2 1 matrix scale 0 5 matrix translate matrix concatmatrix aload pop",
        )
        .unwrap();
        let ty = ctx.pop().unwrap().number().unwrap();
        let tx = ctx.pop().unwrap().number().unwrap();
        assert_eq!((tx, ty), (0.0, 5.0));
        let d = ctx.pop().unwrap().number().unwrap();
        ctx.pop().unwrap();
        ctx.pop().unwrap();
        let a = ctx.pop().unwrap().number().unwrap();
        assert_eq!((a, d), (2.0, 1.0));
    }

    #[test]
    fn rotate_90_degrees() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"90 rotate 1 0 transform").unwrap();
        let (x, y) = top2(&mut ctx);
        assert!(x.abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);
    }
}
