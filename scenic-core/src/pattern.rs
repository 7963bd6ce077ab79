//! Structural and regular-expression matching of received messages.
//!
//! A structural pattern is a JSON tree whose string leaves starting with `?`
//! name variables (`?_` matches without binding). Maps match when every
//! pattern key is present in the target with a matching value; arrays match
//! set-like (every pattern element must match some target element);
//! primitives match by equality, with numbers compared numerically.
//!
//! The matcher always runs against a fully-ground pattern (substitution has
//! already expanded every binding reference), so it starts from empty
//! bindings and returns only the new ones.

use regex::Regex;
use serde_json::Value;

use crate::bindings::Bindings;
use crate::error::Error;

/// The anonymous variable: matches anything, binds nothing.
pub const ANY_VAR: &str = "?_";

/// Matches `pattern` against `target`, returning every distinct binding set.
pub fn match_pattern(pattern: &Value, target: &Value) -> Vec<Bindings> {
    match_with(pattern, target, &Bindings::new())
}

fn match_with(pattern: &Value, target: &Value, bs: &Bindings) -> Vec<Bindings> {
    match pattern {
        Value::String(s) if is_variable(s) => {
            if s == ANY_VAR {
                return vec![bs.copy()];
            }
            match bs.get(s) {
                Some(bound) if json_eq(bound, target) => vec![bs.copy()],
                Some(_) => Vec::new(),
                None => {
                    let mut extended = bs.copy();
                    extended.insert(s.clone(), target.clone());
                    vec![extended]
                }
            }
        }
        Value::Object(pm) => {
            let Some(tm) = target.as_object() else {
                return Vec::new();
            };
            let mut acc = vec![bs.copy()];
            for (k, pv) in pm {
                let Some(tv) = tm.get(k) else {
                    return Vec::new();
                };
                let mut next = Vec::new();
                for b in &acc {
                    next.extend(match_with(pv, tv, b));
                }
                if next.is_empty() {
                    return Vec::new();
                }
                acc = dedup(next);
            }
            acc
        }
        Value::Array(ps) => {
            let Some(ts) = target.as_array() else {
                return Vec::new();
            };
            let mut acc = vec![bs.copy()];
            for pv in ps {
                let mut next = Vec::new();
                for b in &acc {
                    for tv in ts {
                        next.extend(match_with(pv, tv, b));
                    }
                }
                if next.is_empty() {
                    return Vec::new();
                }
                acc = dedup(next);
            }
            acc
        }
        prim => {
            if json_eq(prim, target) {
                vec![bs.copy()]
            } else {
                Vec::new()
            }
        }
    }
}

fn is_variable(s: &str) -> bool {
    s.starts_with('?')
}

fn dedup(mut sets: Vec<Bindings>) -> Vec<Bindings> {
    let mut out: Vec<Bindings> = Vec::with_capacity(sets.len());
    for bs in sets.drain(..) {
        if !out.contains(&bs) {
            out.push(bs);
        }
    }
    out
}

/// Structural equality with numeric tolerance: `1` equals `1.0`.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xm), Value::Object(ym)) => {
            xm.len() == ym.len()
                && xm
                    .iter()
                    .all(|(k, x)| ym.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Matches a named-group regular expression against a payload string. Each
/// named group `name` in the first match becomes a `?name` binding.
pub fn regexp_match(pattern: &str, payload: &str) -> Result<Vec<Bindings>, Error> {
    let re = Regex::new(pattern).map_err(|e| Error::broken(format!("bad regexp: {e}")))?;
    let Some(caps) = re.captures(payload) else {
        return Ok(Vec::new());
    };
    let mut bs = Bindings::new();
    for name in re.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            bs.insert(format!("?{name}"), Value::String(m.as_str().to_string()));
        }
    }
    Ok(vec![bs])
}
