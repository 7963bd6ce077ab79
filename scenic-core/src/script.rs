//! The embedded-script bridge.
//!
//! Guards, branches, run steps, and `!!` substitution directives all execute
//! Lua snippets through [`exec`]. Every execution gets a fresh `Lua` state
//! and a whitelist-only environment table: core functions, the `math`,
//! `string`, and `table` libraries, a `print` that writes to the engine log,
//! a `fail` constructor for the failure marker, and the host values described
//! by [`Env`]. An instruction-count hook bounds runaway scripts.
//!
//! The script-side `test.Bindings` table is read back after execution and
//! returned to the caller, which treats it as canonical (script-writes-win).
//! A binding whose value is JSON `null` does not survive the round trip,
//! since a `nil` table entry is indistinguishable from an absent one.

use mlua::{HookTriggers, Lua, Table, Value as LuaValue};
use serde_json::Value;

use crate::bindings::Bindings;
use crate::error::Error;
use crate::msg::Msg;

/// Maximum Lua instructions before a script is aborted as broken.
const MAX_INSTRUCTIONS: u32 = 1_000_000;

/// Thrown-error prefix that marks an error as broken rather than a failure.
const BROKEN_PREFIX: &str = "broken:";

/// Host values seeded into a script's global scope.
#[derive(Debug, Default)]
pub struct Env<'a> {
    /// The current bindings, backing `test.Bindings` and the snapshot.
    pub bindings: Option<&'a Bindings>,
    /// When true, also exposed as `bindings` and `bs` (a snapshot copy).
    pub snapshot: bool,
    /// When true, exposes `test` with a mutable `Bindings` table and an
    /// `ElapsedMs` reading; the table is read back after execution.
    pub with_test: bool,
    /// Milliseconds since the last step, exposed as `elapsed`.
    pub elapsed_ms: Option<f64>,
    /// The matched message, exposed as `msg` with `topic`, `payload`, and
    /// `receivedAt` fields.
    pub msg: Option<&'a Msg>,
    /// Binding sets from the matcher, exposed as `bindingss` and `bss`.
    pub bindingss: Option<&'a [Bindings]>,
}

/// A normalized script result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Json(Value),
    /// The well-known failure marker: `fail("...")` or any table carrying a
    /// string `Failure` field.
    Failure(String),
}

/// The result of one execution: the normalized value plus the read-back
/// bindings when `test` was in scope.
#[derive(Debug)]
pub struct ExecOut {
    pub value: ScriptValue,
    pub bindings: Option<Bindings>,
}

/// Evaluates `source` as a chunk in a fresh scripting state.
///
/// Bare expressions and chunks ending in `return` both work. A returned
/// function is broken; a thrown error is a failure unless its message starts
/// with `broken:`.
pub fn exec(source: &str, env: &Env<'_>) -> Result<ExecOut, Error> {
    let lua = Lua::new();
    let scope = build_scope(&lua, env).map_err(|e| Error::broken(format!("script env: {e}")))?;

    let chunk = lua
        .load(source)
        .set_name("=script")
        .set_environment(scope.clone());

    lua.set_hook(
        HookTriggers::new().every_nth_instruction(MAX_INSTRUCTIONS),
        |_lua, _debug| {
            Err(mlua::Error::RuntimeError(format!(
                "broken: instruction limit exceeded ({MAX_INSTRUCTIONS})"
            )))
        },
    );
    let result: mlua::Result<LuaValue> = chunk.eval();
    lua.remove_hook();

    let value = match result {
        Ok(value) => value,
        Err(e) => return Err(classify_lua_error(&e)),
    };

    let bindings = if env.with_test {
        read_back_bindings(&scope)?
    } else {
        None
    };

    let value = match value {
        LuaValue::Function(_) => {
            return Err(Error::broken("script returned a function"));
        }
        LuaValue::Table(ref t) if is_failure_marker(t) => {
            let msg: String = t.get("Failure").unwrap_or_default();
            ScriptValue::Failure(msg)
        }
        other => ScriptValue::Json(lua_to_json(&other)?),
    };

    Ok(ExecOut { value, bindings })
}

/// Builds the whitelist environment table and seeds the host values.
fn build_scope(lua: &Lua, env: &Env<'_>) -> mlua::Result<Table> {
    let scope = lua.create_table()?;

    let globals = lua.globals();
    for name in &[
        "tostring",
        "tonumber",
        "type",
        "pairs",
        "ipairs",
        "next",
        "select",
        "error",
        "pcall",
        "xpcall",
        "assert",
        "rawget",
        "rawset",
        "rawlen",
        "rawequal",
        "setmetatable",
        "getmetatable",
    ] {
        let val: LuaValue = globals.get(*name)?;
        if !matches!(val, LuaValue::Nil) {
            scope.set(*name, val)?;
        }
    }
    for lib in &["math", "string", "table"] {
        let val: LuaValue = globals.get(*lib)?;
        if !matches!(val, LuaValue::Nil) {
            scope.set(*lib, val)?;
        }
    }

    let print = lua.create_function(|_, args: mlua::MultiValue| {
        let line = args
            .iter()
            .map(lua_display)
            .collect::<Vec<_>>()
            .join("\t");
        tracing::info!(target: "scenic::script", "{line}");
        Ok(())
    })?;
    scope.set("print", print)?;

    let fail = lua.create_function(|lua, msg: Option<String>| {
        let marker = lua.create_table()?;
        marker.set("Failure", msg.unwrap_or_default())?;
        Ok(marker)
    })?;
    scope.set("fail", fail)?;

    if env.snapshot {
        if let Some(bs) = env.bindings {
            let snapshot = bindings_to_table(lua, bs)?;
            scope.set("bindings", &snapshot)?;
            scope.set("bs", &snapshot)?;
        }
    }
    if let Some(ms) = env.elapsed_ms {
        scope.set("elapsed", ms)?;
    }
    if env.with_test {
        let empty = Bindings::new();
        let test = lua.create_table()?;
        let live = bindings_to_table(lua, env.bindings.unwrap_or(&empty))?;
        test.set("Bindings", live)?;
        test.set("ElapsedMs", env.elapsed_ms.unwrap_or(0.0))?;
        scope.set("test", test)?;
    }
    if let Some(msg) = env.msg {
        let m = lua.create_table()?;
        m.set("topic", msg.topic.as_str())?;
        m.set("payload", msg.payload.as_str())?;
        if let Some(at) = msg.received_at {
            m.set("receivedAt", at.to_rfc3339())?;
        }
        scope.set("msg", m)?;
    }
    if let Some(bss) = env.bindingss {
        let arr = lua.create_table()?;
        for (i, bs) in bss.iter().enumerate() {
            arr.raw_set(i + 1, bindings_to_table(lua, bs)?)?;
        }
        scope.set("bindingss", &arr)?;
        scope.set("bss", &arr)?;
    }

    Ok(scope)
}

fn bindings_to_table(lua: &Lua, bs: &Bindings) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (k, v) in bs.iter() {
        table.set(k.as_str(), json_to_lua(lua, v)?)?;
    }
    Ok(table)
}

/// Pulls `test.Bindings` back out of the environment after execution.
fn read_back_bindings(scope: &Table) -> Result<Option<Bindings>, Error> {
    let test: LuaValue = scope
        .get("test")
        .map_err(|e| Error::broken(format!("script env: {e}")))?;
    let LuaValue::Table(test) = test else {
        return Ok(None);
    };
    let bs: LuaValue = test
        .get("Bindings")
        .map_err(|e| Error::broken(format!("script env: {e}")))?;
    let LuaValue::Table(_) = bs else {
        return Err(Error::broken("script replaced test.Bindings with a non-table"));
    };
    match lua_to_json(&bs)? {
        Value::Object(map) => Ok(Some(map.into_iter().collect())),
        _ => Err(Error::broken("test.Bindings must hold named values")),
    }
}

fn is_failure_marker(t: &Table) -> bool {
    matches!(t.get::<LuaValue>("Failure"), Ok(LuaValue::String(_)))
}

fn classify_lua_error(err: &mlua::Error) -> Error {
    let msg = flatten_lua_error(err);
    if let Some(rest) = msg
        .trim_start()
        .strip_prefix(BROKEN_PREFIX)
        .map(str::trim_start)
    {
        Error::broken(format!("script: {rest}"))
    } else {
        Error::failure(format!("script: {msg}"))
    }
}

fn flatten_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => flatten_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {message}"),
        other => other.to_string(),
    }
}

/// Converts a JSON value into a Lua value.
pub(crate) fn json_to_lua(lua: &Lua, v: &Value) -> mlua::Result<LuaValue> {
    Ok(match v {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                LuaValue::Integer(i)
            } else {
                LuaValue::Number(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(xs) => {
            let table = lua.create_table()?;
            for (i, x) in xs.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, x)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(m) => {
            let table = lua.create_table()?;
            for (k, x) in m {
                table.set(k.as_str(), json_to_lua(lua, x)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Converts a Lua value into JSON. Tables with sequence entries become
/// arrays; everything else keyed becomes an object.
pub(crate) fn lua_to_json(v: &LuaValue) -> Result<Value, Error> {
    Ok(match v {
        LuaValue::Nil => Value::Null,
        LuaValue::Boolean(b) => Value::Bool(*b),
        LuaValue::Integer(i) => Value::Number((*i).into()),
        LuaValue::Number(n) => serde_json::Number::from_f64(*n)
            .map(Value::Number)
            .ok_or_else(|| Error::broken("script returned a non-finite number"))?,
        LuaValue::String(s) => Value::String(
            s.to_str()
                .map_err(|_| Error::broken("script returned a non-utf8 string"))?
                .to_string(),
        ),
        LuaValue::Table(table) => {
            let len = table.raw_len();
            if len > 0 {
                let mut arr = Vec::with_capacity(len);
                for i in 1..=len {
                    let x: LuaValue = table
                        .raw_get(i)
                        .map_err(|e| Error::broken(format!("script value: {e}")))?;
                    arr.push(lua_to_json(&x)?);
                }
                Value::Array(arr)
            } else {
                let mut map = serde_json::Map::new();
                for pair in table.pairs::<String, LuaValue>() {
                    let (k, x) =
                        pair.map_err(|e| Error::broken(format!("script value: {e}")))?;
                    map.insert(k, lua_to_json(&x)?);
                }
                Value::Object(map)
            }
        }
        _ => return Err(Error::broken("script returned an unserializable value")),
    })
}

fn lua_display(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => format!("{n}"),
        LuaValue::String(s) => s
            .to_str()
            .map_or_else(|_| "<invalid utf8>".into(), |s| s.to_string()),
        other => format!("{other:?}"),
    }
}

/// Trims a script source for log lines.
pub(crate) fn short(s: &str) -> String {
    let mut out: String = s.chars().take(60).collect();
    if out.len() < s.len() {
        out.push('\u{2026}');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exec_plain(source: &str) -> Result<ExecOut, Error> {
        exec(source, &Env::default())
    }

    #[test]
    fn bare_expression() {
        let out = exec_plain("1 + 2").unwrap();
        assert_eq!(out.value, ScriptValue::Json(json!(3)));
    }

    #[test]
    fn chunk_with_return() {
        let out = exec_plain(r#"local x = "que"; return x .. "so""#).unwrap();
        assert_eq!(out.value, ScriptValue::Json(json!("queso")));
    }

    #[test]
    fn table_round_trip() {
        let out = exec_plain(r#"return { want = "tacos", n = 3 }"#).unwrap();
        assert_eq!(out.value, ScriptValue::Json(json!({"want": "tacos", "n": 3})));
    }

    #[test]
    fn returned_function_is_broken() {
        let err = exec_plain("return function() end").unwrap_err();
        assert!(err.is_broken());
    }

    #[test]
    fn thrown_error_is_failure() {
        let err = exec_plain(r#"error("boom")"#).unwrap_err();
        assert!(!err.is_broken());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn broken_prefix_escalates() {
        let err = exec_plain(r#"error("broken: bad wiring")"#).unwrap_err();
        assert!(err.is_broken());
        assert!(err.to_string().contains("bad wiring"));
    }

    #[test]
    fn failure_marker() {
        let out = exec_plain(r#"return fail("not today")"#).unwrap();
        assert_eq!(out.value, ScriptValue::Failure("not today".to_string()));
    }

    #[test]
    fn bindings_snapshot_visible() {
        let mut bs = Bindings::new();
        bs.insert("?want", json!("queso"));
        let env = Env {
            bindings: Some(&bs),
            snapshot: true,
            ..Env::default()
        };
        let out = exec(r#"return bs["?want"]"#, &env).unwrap();
        assert_eq!(out.value, ScriptValue::Json(json!("queso")));
    }

    #[test]
    fn test_bindings_read_back() {
        let mut bs = Bindings::new();
        bs.insert("?n", json!(1));
        let env = Env {
            bindings: Some(&bs),
            with_test: true,
            elapsed_ms: Some(12.5),
            ..Env::default()
        };
        let out = exec(r#"test.Bindings["?n"] = test.Bindings["?n"] + 41"#, &env).unwrap();
        let back = out.bindings.expect("read-back bindings");
        assert_eq!(back.get("?n"), Some(&json!(42)));
    }

    #[test]
    fn msg_env_fields() {
        let msg = Msg::new("t", r#"{"x":1}"#);
        let env = Env {
            msg: Some(&msg),
            ..Env::default()
        };
        let out = exec("return #msg.payload", &env).unwrap();
        assert_eq!(out.value, ScriptValue::Json(json!(7)));
    }

    #[test]
    fn sandbox_has_no_io() {
        let err = exec_plain(r#"io.open("/etc/passwd")"#).unwrap_err();
        assert!(!err.is_broken());
    }

    #[test]
    fn instruction_limit_is_broken() {
        let err = exec_plain("while true do end").unwrap_err();
        assert!(err.is_broken());
        assert!(err.to_string().contains("instruction limit"));
    }
}
