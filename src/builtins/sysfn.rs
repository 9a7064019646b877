//! System built-ins: FRE, INP, PEEK, USR, VARPTR, RND (spec §4.G, §4.H).
//!
//! `POKE`/`OUT`/`WAIT`/`CALL` are statements, handled by the interpreter;
//! the matching read-side functions here (`INP`, `PEEK`, `USR`) have no
//! host memory or I/O port to address in this interpreter, so they raise
//! `IllegalFunctionCall` rather than silently returning zero.
//!
//! `RND` lives here rather than in `math` because it needs the runtime's
//! seed/last-draw state (spec §4.G: "RND(x): seeds/repeats/draws depending
//! on the sign of x").

use super::arg_f64;
use crate::error::BasicError;
use crate::runtime::Runtime;
use crate::value::Value;

pub fn call(name: &str, args: &[Value], rt: &mut Runtime) -> Result<Option<Value>, BasicError> {
    let v = match name {
        "RND" => Value::Double(rnd(rt, args)?),
        "FRE" => Value::Integer(0),
        "INP" | "PEEK" | "USR" | "VARPTR" => return Err(BasicError::IllegalFunctionCall),
        _ => return Ok(None),
    };
    Ok(Some(v))
}

fn rnd(rt: &mut Runtime, args: &[Value]) -> Result<f64, BasicError> {
    let x = if args.is_empty() { 1.0 } else { arg_f64(args, 0)? };
    if x == 0.0 {
        return Ok(rt.last_rnd);
    }
    if x < 0.0 {
        rt.rng_seed = (x.to_bits()) ^ 0x2545F4914F6CDD1D;
    }
    rt.rng_seed ^= rt.rng_seed << 13;
    rt.rng_seed ^= rt.rng_seed >> 7;
    rt.rng_seed ^= rt.rng_seed << 17;
    let draw = (rt.rng_seed >> 11) as f64 / (1u64 << 53) as f64;
    rt.last_rnd = draw;
    Ok(draw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Program;
    use crate::config::{LimitPreset, ResourceLimits};
    use crate::limits::ResourceLimiter;

    fn rt() -> Runtime {
        Runtime::new(&Program::new(), ResourceLimiter::new(ResourceLimits::preset(LimitPreset::Local)))
    }

    #[test]
    fn rnd_draws_are_in_unit_interval() {
        let mut r = rt();
        for _ in 0..10 {
            let v = call("RND", &[Value::Double(1.0)], &mut r).unwrap().unwrap();
            let f = v.as_f64().unwrap();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn rnd_zero_repeats_last_draw() {
        let mut r = rt();
        let first = call("RND", &[Value::Double(1.0)], &mut r).unwrap().unwrap();
        let repeat = call("RND", &[Value::Double(0.0)], &mut r).unwrap().unwrap();
        assert_eq!(first, repeat);
    }

    #[test]
    fn rnd_negative_seeds_deterministically() {
        let mut a = rt();
        let mut b = rt();
        let da = call("RND", &[Value::Double(-5.0)], &mut a).unwrap().unwrap();
        let db = call("RND", &[Value::Double(-5.0)], &mut b).unwrap().unwrap();
        assert_eq!(da, db);
    }

    #[test]
    fn peek_is_illegal_function_call() {
        let mut r = rt();
        assert_eq!(call("PEEK", &[Value::Integer(0)], &mut r), Err(BasicError::IllegalFunctionCall));
    }

    #[test]
    fn unknown_name_returns_none() {
        let mut r = rt();
        assert_eq!(call("LEN", &[], &mut r).unwrap(), None);
    }
}
