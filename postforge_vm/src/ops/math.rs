//! Arithmetic and math operators.
//!
//! Integer arithmetic overflows into reals, matching the PLRM rule that
//! results exceeding the integer range are represented as reals.

use crate::context::Context;
use postforge_core::{ErrorKind, Object, PsResult, Value};

/// Push an f64 result as Int when it came from Int operands and still
/// fits, else as Real.
fn push_arith(ctx: &mut Context, result: f64, ints: bool) -> PsResult<()> {
    if ints && result >= i32::MIN as f64 && result <= i32::MAX as f64 && result == result.trunc() {
        ctx.push(Object::integer(result as i32))
    } else {
        ctx.push(Object::real(result))
    }
}

fn both_ints(ctx: &Context) -> PsResult<bool> {
    Ok(matches!(ctx.peek(0)?.value, Value::Integer(_))
        && matches!(ctx.peek(1)?.value, Value::Integer(_)))
}

fn binary_numeric(ctx: &mut Context) -> PsResult<(f64, f64, bool)> {
    ctx.need(2)?;
    let b = ctx.peek_number(0)?;
    let a = ctx.peek_number(1)?;
    let ints = both_ints(ctx)?;
    ctx.pop()?;
    ctx.pop()?;
    Ok((a, b, ints))
}

pub fn add(ctx: &mut Context) -> PsResult<()> {
    let (a, b, ints) = binary_numeric(ctx)?;
    push_arith(ctx, a + b, ints)
}

pub fn sub(ctx: &mut Context) -> PsResult<()> {
    let (a, b, ints) = binary_numeric(ctx)?;
    push_arith(ctx, a - b, ints)
}

pub fn mul(ctx: &mut Context) -> PsResult<()> {
    let (a, b, ints) = binary_numeric(ctx)?;
    push_arith(ctx, a * b, ints)
}

/// num1 num2 `div` real — always a real result.
pub fn div(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let b = ctx.peek_number(0)?;
    let a = ctx.peek_number(1)?;
    if b == 0.0 {
        return Err(ErrorKind::UndefinedResult.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::real(a / b))
}

/// int1 int2 `idiv` int — truncating integer division.
pub fn idiv(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let b = ctx.peek_int(0)?;
    let a = ctx.peek_int(1)?;
    if b == 0 {
        return Err(ErrorKind::UndefinedResult.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::integer(a.wrapping_div(b)))
}

/// int1 int2 `mod` int — remainder with the sign of the dividend.
pub fn ps_mod(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let b = ctx.peek_int(0)?;
    let a = ctx.peek_int(1)?;
    if b == 0 {
        return Err(ErrorKind::UndefinedResult.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::integer(a.wrapping_rem(b)))
}

pub fn abs(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    match obj.value {
        Value::Integer(i) => {
            ctx.pop()?;
            // |INT_MIN| does not fit; it promotes.
            match i.checked_abs() {
                Some(a) => ctx.push(Object::integer(a)),
                None => ctx.push(Object::real(-(i as f64))),
            }
        }
        Value::Real(r) => {
            ctx.pop()?;
            ctx.push(Object::real(r.abs()))
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

pub fn neg(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    match obj.value {
        Value::Integer(i) => {
            ctx.pop()?;
            match i.checked_neg() {
                Some(n) => ctx.push(Object::integer(n)),
                None => ctx.push(Object::real(-(i as f64))),
            }
        }
        Value::Real(r) => {
            ctx.pop()?;
            ctx.push(Object::real(-r))
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

/// Rounding family: integers pass through unchanged.
fn rounding(ctx: &mut Context, f: fn(f64) -> f64) -> PsResult<()> {
    ctx.need(1)?;
    let obj = *ctx.peek(0)?;
    match obj.value {
        Value::Integer(_) => Ok(()),
        Value::Real(r) => {
            ctx.pop()?;
            ctx.push(Object::real(f(r)))
        }
        _ => Err(ErrorKind::TypeCheck.into()),
    }
}

pub fn ceiling(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f64::ceil)
}

pub fn floor(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f64::floor)
}

/// Nearest integer; ties round toward the greater value (PLRM).
pub fn round(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, |r| (r + 0.5).floor())
}

pub fn truncate(ctx: &mut Context) -> PsResult<()> {
    rounding(ctx, f64::trunc)
}

pub fn sqrt(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_number(0)?;
    if n < 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.push(Object::real(n.sqrt()))
}

/// num den `atan` angle — degrees in [0, 360).
pub fn atan(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let den = ctx.peek_number(0)?;
    let num = ctx.peek_number(1)?;
    if num == 0.0 && den == 0.0 {
        return Err(ErrorKind::UndefinedResult.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    let mut angle = num.atan2(den).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    ctx.push(Object::real(angle))
}

pub fn cos(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let a = ctx.peek_number(0)?;
    ctx.pop()?;
    ctx.push(Object::real(a.to_radians().cos()))
}

pub fn sin(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let a = ctx.peek_number(0)?;
    ctx.pop()?;
    ctx.push(Object::real(a.to_radians().sin()))
}

/// base exponent `exp` real
pub fn exp(ctx: &mut Context) -> PsResult<()> {
    ctx.need(2)?;
    let e = ctx.peek_number(0)?;
    let b = ctx.peek_number(1)?;
    let result = b.powf(e);
    if result.is_nan() {
        return Err(ErrorKind::UndefinedResult.into());
    }
    ctx.pop()?;
    ctx.pop()?;
    ctx.push(Object::real(result))
}

pub fn ln(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_number(0)?;
    if n <= 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.push(Object::real(n.ln()))
}

pub fn log(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let n = ctx.peek_number(0)?;
    if n <= 0.0 {
        return Err(ErrorKind::RangeCheck.into());
    }
    ctx.pop()?;
    ctx.push(Object::real(n.log10()))
}

// Park–Miller pseudorandom sequence for rand/srand/rrand.
fn next_rand(state: &mut u32) -> i32 {
    let mut x = *state as u64;
    if x == 0 {
        x = 1;
    }
    x = x.wrapping_mul(48271) % 0x7FFF_FFFF;
    *state = x as u32;
    (x & 0x7FFF_FFFF) as i32
}

/// `rand` int — uniform in [0, 2^31 − 1].
pub fn rand(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let mut state = ctx.rand_state;
    let value = next_rand(&mut state);
    ctx.rand_state = state;
    ctx.push(Object::integer(value))
}

pub fn srand(ctx: &mut Context) -> PsResult<()> {
    ctx.need(1)?;
    let seed = ctx.peek_int(0)?;
    ctx.pop()?;
    ctx.rand_state = seed as u32;
    Ok(())
}

pub fn rrand(ctx: &mut Context) -> PsResult<()> {
    ctx.reserve(1)?;
    let state = ctx.rand_state as i32;
    ctx.push(Object::integer(state & 0x7FFF_FFFF))
}

pub fn install(ctx: &mut Context) {
    super::define_op(ctx, "add", add);
    super::define_op(ctx, "sub", sub);
    super::define_op(ctx, "mul", mul);
    super::define_op(ctx, "div", div);
    super::define_op(ctx, "idiv", idiv);
    super::define_op(ctx, "mod", ps_mod);
    super::define_op(ctx, "abs", abs);
    super::define_op(ctx, "neg", neg);
    super::define_op(ctx, "ceiling", ceiling);
    super::define_op(ctx, "floor", floor);
    super::define_op(ctx, "round", round);
    super::define_op(ctx, "truncate", truncate);
    super::define_op(ctx, "sqrt", sqrt);
    super::define_op(ctx, "atan", atan);
    super::define_op(ctx, "cos", cos);
    super::define_op(ctx, "sin", sin);
    super::define_op(ctx, "exp", exp);
    super::define_op(ctx, "ln", ln);
    super::define_op(ctx, "log", log);
    super::define_op(ctx, "rand", rand);
    super::define_op(ctx, "srand", srand);
    super::define_op(ctx, "rrand", rrand);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top_int(ctx: &Context) -> i32 {
        ctx.o_stack.last().and_then(|o| o.as_int()).unwrap()
    }

    fn top_real(ctx: &Context) -> f64 {
        ctx.o_stack.last().and_then(|o| o.number()).unwrap()
    }

    #[test]
    fn integer_add_stays_integer() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"3 4 add").unwrap();
        assert_eq!(top_int(&ctx), 7);
        assert!(matches!(
            ctx.o_stack.last().unwrap().value,
            Value::Integer(_)
        ));
    }

    #[test]
    fn integer_overflow_promotes() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"2147483647 1 add").unwrap();
        assert!(matches!(ctx.o_stack.last().unwrap().value, Value::Real(_)));
        assert_eq!(top_real(&ctx), 2147483648.0);
    }

    #[test]
    fn div_always_real() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"6 2 div").unwrap();
        assert!(matches!(ctx.o_stack.last().unwrap().value, Value::Real(_)));
        assert_eq!(top_real(&ctx), 3.0);
    }

    #[test]
    fn mod_takes_dividend_sign() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"-5 3 mod").unwrap();
        assert_eq!(top_int(&ctx), -2);
    }

    #[test]
    fn atan_quadrants() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"0 1 atan").unwrap();
        assert_eq!(top_real(&ctx), 0.0);
        ctx.run_bytes(b"clear -1 0 atan").unwrap();
        assert_eq!(top_real(&ctx), 270.0);
    }

    #[test]
    fn division_by_zero_preserves_operands() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"1 0 {div} stopped").unwrap();
        // stopped caught the error; the failed operator left its operands
        // exactly as they were.
        assert_eq!(ctx.o_stack.pop().unwrap().as_bool(), Some(true));
        assert_eq!(ctx.o_stack.pop().unwrap().as_int(), Some(0));
        assert_eq!(ctx.o_stack.pop().unwrap().as_int(), Some(1));
    }

    #[test]
    fn srand_makes_rand_deterministic() {
        let mut ctx = Context::new();
        ctx.run_bytes(b"42 srand rand 42 srand rand").unwrap();
        let b = ctx.pop().unwrap().as_int().unwrap();
        let a = ctx.pop().unwrap().as_int().unwrap();
        assert_eq!(a, b);
    }
}
