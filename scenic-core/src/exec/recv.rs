//! The receive step: a wait-match loop over a channel's inbound queue.
//!
//! The timeout bounds the wall-clock wait for the *matching* message: a
//! message that arrives and fails to match is discarded without resetting
//! the timer.

use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::ctx::Ctx;
use crate::duration::parse_duration;
use crate::error::Error;
use crate::pattern;
use crate::schema;
use crate::script::ScriptValue;
use crate::spec::Recv;
use crate::test::{ScriptOpts, Test};

/// Default wait bound when the step names none; the surrounding harness is
/// expected to carry the real deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60 * 20 * 24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Payload,
    Msg,
}

pub(super) async fn recv(t: &mut Test, ctx: &Ctx, r: &Recv) -> Result<(), Error> {
    let target = match r.target.as_str() {
        "" | "payload" | "Payload" => Target::Payload,
        "msg" | "message" | "Message" => Target::Msg,
        other => return Err(Error::broken(format!("bad recv target: '{other}'"))),
    };

    // Temporary bindings never survive into a receive.
    t.bindings.clear_ephemeral();
    if r.clear_bindings {
        info!(target: "scenic::step", count = t.bindings.len(), "clearing bindings by request");
        t.bindings.clear_except_sticky();
    }

    let topic = t.bindings.string_sub(ctx, &r.topic)?;
    if !topic.is_empty() {
        debug!(target: "scenic::step", %topic, "recv topic");
    }

    let mut regexp = String::new();
    let mut pat = Value::Null;
    if !r.regexp.is_empty() {
        if !r.pattern.is_null() {
            return Err(Error::broken("can't have both pattern and regexp"));
        }
        regexp = t.bindings.string_sub(ctx, &r.regexp)?;
        debug!(target: "scenic::step", %regexp, "effective regexp");
    } else {
        let s = match &r.pattern {
            Value::String(s) => s.clone(),
            other => serde_json::to_string(other)
                .map_err(|e| Error::broken(format!("unserializable pattern: {e}")))?,
        };
        let s = t.bindings.sub(ctx, &s)?;
        pat = serde_json::from_str(&s)
            .map_err(|e| Error::broken(format!("malformed pattern after substitution: {e}: {s}")))?;
        debug!(target: "scenic::step", pattern = %pat, "effective pattern");
    }

    let guard = t.bindings.string_sub(ctx, &r.guard)?;
    let run = t.bindings.string_sub(ctx, &r.run)?;

    let timeout = if r.timeout.is_empty() {
        DEFAULT_TIMEOUT
    } else {
        let s = t.bindings.string_sub(ctx, &r.timeout)?;
        let d = parse_duration(&s)?;
        if d.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            d
        }
    };

    t.ensure_chan(ctx, &r.chan).await?;
    let queue = t.chan(&r.chan)?.recv(ctx);
    let mut rx = queue.lock().await;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            _ = ctx.cancelled() => {
                debug!(target: "scenic::step", "recv canceled");
                return Ok(());
            }
            _ = &mut deadline => {
                let wanted = if regexp.is_empty() { pat.to_string() } else { regexp.clone() };
                return Err(Error::failure(format!(
                    "timeout after {timeout:?} waiting for {wanted}"
                )));
            }
            msg = rx.recv() => msg,
        };
        let Some(msg) = msg else {
            return Err(Error::failure(format!(
                "channel '{}' inbound queue closed",
                r.chan
            )));
        };
        debug!(target: "scenic::step", topic = %msg.topic, payload = %msg.payload, "recv dequeue");

        let bss = if regexp.is_empty() {
            let payload: Value = match serde_json::from_str(&msg.payload) {
                Ok(v) => v,
                Err(e) => {
                    return Err(Error::failure(format!(
                        "recv payload is not JSON: {e}: {}",
                        msg.payload
                    )))
                }
            };
            if !r.schema.is_empty() {
                schema::validate(ctx, &r.schema, &msg.payload).await?;
            }
            let match_target = match target {
                Target::Payload => payload,
                Target::Msg => json!({
                    "Topic": msg.topic,
                    "Payload": payload,
                    "ReceivedAt": msg.received_at,
                }),
            };
            debug!(target: "scenic::step", matching = %match_target, "recv match target");
            pattern::match_pattern(&pat, &match_target)
        } else {
            if target != Target::Payload {
                return Err(Error::broken(
                    "can only regexp-match against the payload (not the topic)",
                ));
            }
            pattern::regexp_match(&regexp, &msg.payload)?
        };

        debug!(target: "scenic::step", sets = bss.len(), "recv match result");
        if bss.is_empty() {
            continue;
        }
        if bss.len() > 1 {
            return Err(Error::failure(format!(
                "multiple binding sets: {}",
                serde_json::to_string(&bss).unwrap_or_default()
            )));
        }

        // Extend rather than replace: substitution already folded the prior
        // bindings into the pattern, so only the new ones arrive here.
        for (k, v) in bss[0].iter() {
            if let Some(old) = t.bindings.get(k) {
                if !pattern::json_eq(old, v) {
                    info!(target: "scenic::step", var = %k, "updating binding");
                }
            }
            t.bindings.insert(k.clone(), v.clone());
        }

        if !guard.is_empty() {
            let opts = ScriptOpts {
                snapshot: true,
                msg: Some(&msg),
                bindingss: Some(&bss),
            };
            match t.exec_script(&guard, opts)? {
                ScriptValue::Failure(m) => return Err(Error::failure(m)),
                ScriptValue::Json(Value::Bool(false)) => {
                    debug!(target: "scenic::step", "recv guard not satisfied");
                    continue;
                }
                ScriptValue::Json(Value::Bool(true)) => {
                    debug!(target: "scenic::step", "recv guard satisfied");
                }
                ScriptValue::Json(other) => {
                    return Err(Error::broken(format!(
                        "guard script returned {other} and not a boolean"
                    )));
                }
            }
        }

        if !run.is_empty() {
            let opts = ScriptOpts {
                snapshot: true,
                msg: Some(&msg),
                bindingss: Some(&bss),
            };
            if let ScriptValue::Failure(m) = t.exec_script(&run, opts)? {
                return Err(Error::failure(m));
            }
        }

        debug!(target: "scenic::step", "recv satisfied");
        return Ok(());
    }
}
