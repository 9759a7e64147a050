//! Lazy color resolution.
//!
//! `setcolor` only stores components; this driver turns the graphics
//! state's `(color_space, components)` pair into device RGB when a
//! painting operator builds a display-list element. Tint transforms,
//! Indexed lookup procedures, and CIE decode procedures run as nested
//! procedure calls on the interpreter.

use crate::context::Context;
use crate::engine;
use postforge_core::{Access, ErrorKind, Name, Object, PsResult, Value};
use postforge_graphics::color::{
    self, CieParams, ColorSpace, Components, Rgb,
};

/// Resolve the current color to device RGB.
pub fn current_rgb(ctx: &mut Context) -> PsResult<Rgb> {
    let space = ctx.gstate.color_space.clone();
    let comps = ctx.gstate.color.clone();
    resolve(ctx, &space, &comps)
}

/// Resolve `comps` interpreted in `space` to device RGB.
pub fn resolve(ctx: &mut Context, space: &ColorSpace, comps: &Components) -> PsResult<Rgb> {
    let comp = |i: usize| comps.get(i).copied().unwrap_or(0.0);
    match space {
        ColorSpace::DeviceGray => Ok(color::gray_to_rgb(comp(0))),
        ColorSpace::DeviceRgb => Ok(Rgb::new(comp(0), comp(1), comp(2))),
        ColorSpace::DeviceCmyk => Ok(color::cmyk_to_rgb(comp(0), comp(1), comp(2), comp(3))),

        ColorSpace::CieBasedA(params) => cie_resolve(ctx, params, &[comp(0)]),
        ColorSpace::CieBasedAbc(params)
        | ColorSpace::CieBasedDef(params) => cie_resolve(ctx, params, &[comp(0), comp(1), comp(2)]),
        ColorSpace::CieBasedDefg(params) => {
            cie_resolve(ctx, params, &[comp(0), comp(1), comp(2), comp(3)])
        }

        // No ICC math: the declared alternate space carries the color.
        ColorSpace::IccBased { alternate, .. } => resolve(ctx, alternate, comps),

        ColorSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            let index = comp(0).round().clamp(0.0, *hival as f64) as usize;
            let n = base.components();
            let decoded = indexed_lookup(ctx, lookup, index, n)?;
            resolve(ctx, base, &decoded)
        }

        ColorSpace::Separation {
            alternate, tint, ..
        } => {
            let alt_comps = run_tint(ctx, tint, &[comp(0)], alternate.components())?;
            resolve(ctx, alternate, &alt_comps)
        }

        ColorSpace::DeviceN {
            names,
            alternate,
            tint,
        } => {
            let inputs: Vec<f64> = (0..names.len()).map(comp).collect();
            let alt_comps = run_tint(ctx, tint, &inputs, alternate.components())?;
            resolve(ctx, alternate, &alt_comps)
        }

        // Patterns carry their own paint; the underlying space colors
        // uncolored cells, black otherwise.
        ColorSpace::Pattern { base } => match base {
            Some(underlying) => resolve(ctx, underlying, comps),
            None => Ok(Rgb::BLACK),
        },
    }
}

/// Run a tint-transform procedure: push inputs, execute, pop `out`
/// results.
fn run_tint(
    ctx: &mut Context,
    tint: &Object,
    inputs: &[f64],
    out: usize,
) -> PsResult<Components> {
    if tint.as_array().is_none() {
        return Err(ErrorKind::TypeCheck.into());
    }
    for &v in inputs {
        ctx.push(Object::real(v))?;
    }
    engine::call_procedure(ctx, *tint)?;
    ctx.need(out)?;
    let mut results = Components::new();
    for _ in 0..out {
        let v = ctx.pop()?.number().ok_or(ErrorKind::TypeCheck)?;
        results.push(v);
    }
    results.reverse();
    Ok(results)
}

/// Indexed lookup: a string table slices directly, a procedure is called
/// with the index.
fn indexed_lookup(
    ctx: &mut Context,
    lookup: &Object,
    index: usize,
    n: usize,
) -> PsResult<Components> {
    match lookup.value {
        Value::String(r) => {
            let mut out = Components::new();
            for i in 0..n {
                let at = index * n + i;
                if at >= r.len {
                    return Err(ErrorKind::RangeCheck.into());
                }
                out.push(ctx.memory.string_get(r, at)? as f64 / 255.0);
            }
            Ok(out)
        }
        Value::Array(_) | Value::PackedArray(_) if lookup.is_executable() => {
            ctx.push(Object::integer(index as i32))?;
            engine::call_procedure(ctx, *lookup)?;
            ctx.need(n)?;
            let mut out = Components::new();
            for _ in 0..n {
                let v = ctx.pop()?.number().ok_or(ErrorKind::TypeCheck)?;
                out.push(v);
            }
            out.reverse();
            Ok(out)
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

/// The CIE pipeline: decode → matrix → XYZ → sRGB. Decode procedures run
/// on the interpreter when supplied.
fn cie_resolve(ctx: &mut Context, params: &CieParams, inputs: &[f64]) -> PsResult<Rgb> {
    // Clamp into the declared ranges.
    let mut abc = [0.0f64; 3];
    for i in 0..3 {
        let v = inputs.get(i).copied().unwrap_or_else(|| inputs[0]);
        let lo = params.range.get(i * 2).copied().unwrap_or(0.0);
        let hi = params.range.get(i * 2 + 1).copied().unwrap_or(1.0);
        abc[i] = v.clamp(lo, hi);
    }

    if let Some(decode) = &params.decode_abc {
        abc = run_component_procs(ctx, decode, abc)?;
    }

    let mut lmn = color::mat3_apply(&params.matrix_abc, abc);
    if let Some(decode) = &params.decode_lmn {
        lmn = run_component_procs(ctx, decode, lmn)?;
    }
    let xyz = color::mat3_apply(&params.matrix_lmn, lmn);

    // Normalize against the white point before the sRGB matrix.
    let wp = params.white_point;
    let scale = |v: f64, w: f64| if w > 0.0 { v / w } else { v };
    Ok(color::xyz_to_srgb(
        scale(xyz[0], wp[0]) * 0.9505,
        scale(xyz[1], wp[1]),
        scale(xyz[2], wp[2]) * 1.089,
    ))
}

/// Apply an array of three single-component procedures.
fn run_component_procs(ctx: &mut Context, procs: &Object, v: [f64; 3]) -> PsResult<[f64; 3]> {
    let r = match procs.as_array() {
        Some(r) if r.len == 3 => r,
        _ => return Ok(v),
    };
    let mut out = v;
    for i in 0..3 {
        let proc = ctx.memory.array_get(r, i)?;
        if proc.as_array().is_none() || !proc.is_executable() {
            continue;
        }
        ctx.push(Object::real(v[i]))?;
        engine::call_procedure(ctx, proc)?;
        out[i] = ctx.pop()?.number().ok_or(ErrorKind::TypeCheck)?;
    }
    Ok(out)
}

/// Interpret a `setcolorspace` operand: a family name or an array
/// `[/Family params…]`.
pub fn parse_color_space(ctx: &mut Context, obj: &Object) -> PsResult<ColorSpace> {
    match obj.value {
        Value::Name(n) => family_space(n),
        Value::Array(_) | Value::PackedArray(_) => {
            ctx.require_access(obj, Access::ReadOnly)?;
            let r = obj.as_array().ok_or(ErrorKind::TypeCheck)?;
            if r.len == 0 {
                return Err(ErrorKind::RangeCheck.into());
            }
            let head = ctx.memory.array_get(r, 0)?;
            let family = head.as_name().ok_or(ErrorKind::TypeCheck)?;
            match family.as_bytes() {
                b"DeviceGray" | b"DeviceRGB" | b"DeviceCMYK" => family_space(family),
                b"Indexed" => {
                    if r.len != 4 {
                        return Err(ErrorKind::RangeCheck.into());
                    }
                    let base_obj = ctx.memory.array_get(r, 1)?;
                    let base = parse_color_space(ctx, &base_obj)?;
                    let hival = ctx
                        .memory
                        .array_get(r, 2)?
                        .as_int()
                        .ok_or(ErrorKind::TypeCheck)?;
                    if hival < 0 {
                        return Err(ErrorKind::RangeCheck.into());
                    }
                    let lookup = ctx.memory.array_get(r, 3)?;
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        hival,
                        lookup,
                    })
                }
                b"Separation" => {
                    if r.len != 4 {
                        return Err(ErrorKind::RangeCheck.into());
                    }
                    let name = ctx
                        .memory
                        .array_get(r, 1)?
                        .as_name()
                        .ok_or(ErrorKind::TypeCheck)?;
                    let alt_obj = ctx.memory.array_get(r, 2)?;
                    let alternate = parse_color_space(ctx, &alt_obj)?;
                    let tint = ctx.memory.array_get(r, 3)?;
                    Ok(ColorSpace::Separation {
                        name,
                        alternate: Box::new(alternate),
                        tint,
                    })
                }
                b"DeviceN" => {
                    if r.len < 4 {
                        return Err(ErrorKind::RangeCheck.into());
                    }
                    let names_obj = ctx.memory.array_get(r, 1)?;
                    let names_ref = names_obj.as_array().ok_or(ErrorKind::TypeCheck)?;
                    let mut names = Vec::with_capacity(names_ref.len);
                    for i in 0..names_ref.len {
                        names.push(
                            ctx.memory
                                .array_get(names_ref, i)?
                                .as_name()
                                .ok_or(ErrorKind::TypeCheck)?,
                        );
                    }
                    let alt_obj = ctx.memory.array_get(r, 2)?;
                    let alternate = parse_color_space(ctx, &alt_obj)?;
                    let tint = ctx.memory.array_get(r, 3)?;
                    Ok(ColorSpace::DeviceN {
                        names,
                        alternate: Box::new(alternate),
                        tint,
                    })
                }
                b"CIEBasedA" | b"CIEBasedABC" | b"CIEBasedDEF" | b"CIEBasedDEFG" => {
                    if r.len < 2 {
                        return Err(ErrorKind::RangeCheck.into());
                    }
                    let dict_obj = ctx.memory.array_get(r, 1)?;
                    let params = parse_cie_dict(ctx, &dict_obj, family)?;
                    Ok(match family.as_bytes() {
                        b"CIEBasedA" => ColorSpace::CieBasedA(Box::new(params)),
                        b"CIEBasedABC" => ColorSpace::CieBasedAbc(Box::new(params)),
                        b"CIEBasedDEF" => ColorSpace::CieBasedDef(Box::new(params)),
                        _ => ColorSpace::CieBasedDefg(Box::new(params)),
                    })
                }
                b"ICCBased" => {
                    // [/ICCBased stream-dict] with /N and /Alternate keys.
                    let dict_obj = ctx.memory.array_get(r, 1)?;
                    let dref = dict_obj.as_dict().ok_or(ErrorKind::TypeCheck)?;
                    let n = ctx
                        .memory
                        .dict_get(dref, postforge_runtime::DictKey::Name(Name::new(b"N")))?
                        .and_then(|o| o.as_int())
                        .unwrap_or(3);
                    let alt = ctx.memory.dict_get(
                        dref,
                        postforge_runtime::DictKey::Name(Name::new(b"Alternate")),
                    )?;
                    let alternate = match alt {
                        Some(a) => parse_color_space(ctx, &a)?,
                        None => match n {
                            1 => ColorSpace::DeviceGray,
                            4 => ColorSpace::DeviceCmyk,
                            _ => ColorSpace::DeviceRgb,
                        },
                    };
                    Ok(ColorSpace::IccBased {
                        components: n.max(1) as usize,
                        alternate: Box::new(alternate),
                    })
                }
                b"Pattern" => {
                    let base = if r.len >= 2 {
                        let base_obj = ctx.memory.array_get(r, 1)?;
                        Some(Box::new(parse_color_space(ctx, &base_obj)?))
                    } else {
                        None
                    };
                    Ok(ColorSpace::Pattern { base })
                }
                _ => Err(ErrorKind::Undefined.into()),
            }
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

fn family_space(name: Name) -> PsResult<ColorSpace> {
    match name.as_bytes() {
        b"DeviceGray" => Ok(ColorSpace::DeviceGray),
        b"DeviceRGB" => Ok(ColorSpace::DeviceRgb),
        b"DeviceCMYK" => Ok(ColorSpace::DeviceCmyk),
        b"Pattern" => Ok(ColorSpace::Pattern { base: None }),
        _ => Err(ErrorKind::Undefined.into()),
    }
}

fn parse_cie_dict(ctx: &Context, obj: &Object, family: Name) -> PsResult<CieParams> {
    let dref = obj.as_dict().ok_or(ErrorKind::TypeCheck)?;
    let key = |n: &[u8]| postforge_runtime::DictKey::Name(Name::new(n));

    let components = match family.as_bytes() {
        b"CIEBasedA" => 1,
        b"CIEBasedDEFG" => 4,
        _ => 3,
    };
    let mut params = CieParams::with_white_point([0.9505, 1.0, 1.089], components);

    if let Some(wp) = ctx.memory.dict_get(dref, key(b"WhitePoint"))? {
        if let Some(r) = wp.as_array() {
            let elems = ctx.memory.array(r)?;
            for (i, e) in elems.iter().take(3).enumerate() {
                if let Some(v) = e.number() {
                    params.white_point[i] = v;
                }
            }
        }
    }
    for (dict_key, target_abc) in [(b"MatrixABC".as_slice(), true), (b"MatrixLMN".as_slice(), false)]
    {
        if let Some(m) = ctx.memory.dict_get(dref, key(dict_key))? {
            if let Some(r) = m.as_array() {
                let elems = ctx.memory.array(r)?;
                let target = if target_abc {
                    &mut params.matrix_abc
                } else {
                    &mut params.matrix_lmn
                };
                for (i, e) in elems.iter().take(9).enumerate() {
                    if let Some(v) = e.number() {
                        target[i] = v;
                    }
                }
            }
        }
    }
    let range_key: &[u8] = if components == 1 { b"RangeA" } else { b"RangeABC" };
    if let Some(rg) = ctx.memory.dict_get(dref, key(range_key))? {
        if let Some(r) = rg.as_array() {
            params.range.clear();
            for e in ctx.memory.array(r)? {
                if let Some(v) = e.number() {
                    params.range.push(v);
                }
            }
        }
    }
    let decode_key: &[u8] = if components == 1 {
        b"DecodeA"
    } else {
        b"DecodeABC"
    };
    params.decode_abc = ctx.memory.dict_get(dref, key(decode_key))?;
    params.decode_lmn = ctx.memory.dict_get(dref, key(b"DecodeLMN"))?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_spaces_resolve_directly() {
        let mut ctx = Context::new();
        let comps = Components::from_slice(&[0.5]);
        let rgb = resolve(&mut ctx, &ColorSpace::DeviceGray, &comps).unwrap();
        assert_eq!(rgb, Rgb::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn separation_runs_tint_transform() {
        let mut ctx = Context::new();
        // Tint t maps to gray 1-t via the transform.
        ctx.run_bytes(b"[/Separation /Ink /DeviceGray {1 exch sub}] setcolorspace 0.25 setcolor")
            .unwrap();
        let rgb = current_rgb(&mut ctx).unwrap();
        assert!((rgb.r - 0.75).abs() < 1e-9);
    }

    #[test]
    fn indexed_string_table() {
        let mut ctx = Context::new();
        // Two RGB entries: red, then blue.
        ctx.run_bytes(
            b"[/Indexed /DeviceRGB 1 <FF0000 0000FF>] setcolorspace 1 setcolor",
        )
        .unwrap();
        let rgb = current_rgb(&mut ctx).unwrap();
        assert!(rgb.b > 0.99 && rgb.r < 0.01);
    }

    #[test]
    fn devicen_multiple_tints() {
        let mut ctx = Context::new();
        ctx.run_bytes(
            b"[/DeviceN [/A /B] /DeviceGray {add 2 div}] setcolorspace 0.2 0.6 setcolor",
        )
        .unwrap();
        let rgb = current_rgb(&mut ctx).unwrap();
        assert!((rgb.r - 0.4).abs() < 1e-9);
    }

    #[test]
    fn unknown_family_is_undefined() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"{ [/NoSuchSpace] setcolorspace } stopped").unwrap();
        assert_eq!(ctx.pop().unwrap().as_bool(), Some(true));
    }
}
