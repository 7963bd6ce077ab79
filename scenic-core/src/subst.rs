//! Recursive substitution over strings and JSON trees.
//!
//! One pass expands every `{var}` reference, inlines `{@@path}` file
//! contents, and then honors a whole-string directive: `!!expr` hands the
//! remainder to the script bridge and serializes its result, `@@path` reads a
//! file relative to the context directory. [`Bindings::string_sub`] iterates
//! the pass to a fixed point; a string that keeps changing past the pass
//! bound is a broken error.
//!
//! A binding key that itself contains braces (a `{param}`-style key) is never
//! a substitution source.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::bindings::Bindings;
use crate::ctx::Ctx;
use crate::error::Error;
use crate::script::{self, ScriptValue};

/// Fixed-point pass bound; exceeding it means a substitution cycle.
const SUB_PASS_LIMIT: usize = 32;

static AT_AT_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{@@([^{}]+)\}").expect("inline file-inclusion regex"));

impl Bindings {
    /// Rewrites `s` to a fixed point of [`Bindings::string_sub_once`].
    pub fn string_sub(&self, ctx: &Ctx, s: &str) -> Result<String, Error> {
        let mut cur = s.to_string();
        for _ in 0..SUB_PASS_LIMIT {
            let next = self.string_sub_once(ctx, &cur)?;
            if next == cur {
                return Ok(cur);
            }
            cur = next;
        }
        Err(Error::broken(format!(
            "substitution did not stabilize after {SUB_PASS_LIMIT} passes: {s}"
        )))
    }

    /// One substitution pass: `{var}` expansion, `{@@path}` inlining, then a
    /// whole-string `!!expr` or `@@path` directive (whose output gets one
    /// further `{var}` expansion).
    pub fn string_sub_once(&self, ctx: &Ctx, s: &str) -> Result<String, Error> {
        let s = self.expand_refs(s);
        let s = inline_files(ctx, &s)?;

        let out = if let Some(expr) = s.strip_prefix("!!") {
            debug!(target: "scenic::subst", expr = %script::short(expr), "evaluating substitution expression");
            let env = script::Env {
                bindings: Some(self),
                snapshot: true,
                ..script::Env::default()
            };
            match script::exec(expr, &env)?.value {
                ScriptValue::Failure(msg) => return Err(Error::failure(msg)),
                ScriptValue::Json(Value::String(s)) => s,
                ScriptValue::Json(v) => serde_json::to_string(&v)
                    .map_err(|e| Error::broken(format!("unserializable substitution result: {e}")))?,
            }
        } else if let Some(path) = s.strip_prefix("@@") {
            read_file(ctx, path)?
        } else {
            return Ok(s);
        };

        Ok(self.expand_refs(&out))
    }

    /// Like [`Bindings::string_sub`], but for strings that should carry
    /// structured data: the string is parsed as JSON and substituted
    /// structurally. A string that is not JSON falls back to plain string
    /// substitution.
    pub fn sub(&self, ctx: &Ctx, s: &str) -> Result<String, Error> {
        match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                let out = self.sub_value(ctx, &v)?;
                serde_json::to_string(&out)
                    .map_err(|e| Error::broken(format!("substitution result: {e}")))
            }
            Err(_) => self.string_sub(ctx, s),
        }
    }

    /// Structural substitution: recurses into arrays and objects, passing
    /// every string leaf (and every object key) through
    /// [`Bindings::string_sub`]. The output has the shape of the input.
    pub fn sub_value(&self, ctx: &Ctx, v: &Value) -> Result<Value, Error> {
        Ok(match v {
            Value::String(s) => Value::String(self.string_sub(ctx, s)?),
            Value::Array(xs) => Value::Array(
                xs.iter()
                    .map(|x| self.sub_value(ctx, x))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(m) => {
                let mut out = serde_json::Map::with_capacity(m.len());
                for (k, x) in m {
                    out.insert(self.string_sub(ctx, k)?, self.sub_value(ctx, x)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }

    /// Replaces every `{key}` occurrence with the binding's value: strings
    /// verbatim, everything else in JSON form.
    fn expand_refs(&self, s: &str) -> String {
        let mut out = s.to_string();
        for (k, v) in self.iter() {
            if k.contains('{') || k.contains('}') {
                continue;
            }
            let needle = format!("{{{k}}}");
            if out.contains(&needle) {
                out = out.replace(&needle, &leaf_string(v));
            }
        }
        out
    }
}

fn leaf_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expands `{@@path}` occurrences to the named files' contents.
fn inline_files(ctx: &Ctx, s: &str) -> Result<String, Error> {
    if !s.contains("{@@") {
        return Ok(s.to_string());
    }
    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for caps in AT_AT_INLINE.captures_iter(s) {
        let whole = caps.get(0).expect("regex match");
        out.push_str(&s[last..whole.start()]);
        out.push_str(&read_file(ctx, &caps[1])?);
        last = whole.end();
    }
    out.push_str(&s[last..]);
    Ok(out)
}

fn read_file(ctx: &Ctx, path: &str) -> Result<String, Error> {
    let resolved = ctx.resolve(path.trim());
    std::fs::read_to_string(&resolved)
        .map_err(|e| Error::broken(format!("can't read '{}': {e}", resolved.display())))
}
