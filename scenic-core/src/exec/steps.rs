//! Execution of the non-receive step variants.

use std::sync::Once;

use serde_json::Value;
use tracing::{debug, warn};

use crate::ctx::Ctx;
use crate::duration::parse_duration;
use crate::error::Error;
use crate::msg::Msg;
use crate::schema;
use crate::script::{short, ScriptValue};
use crate::spec::{Ingest, Kill, Pub, Reconnect, Sub};
use crate::test::{ScriptOpts, Test};

/// Substitutes topic and payload, validates against the schema when one is
/// named, publishes, and runs the after-script.
pub(super) async fn publish(t: &mut Test, ctx: &Ctx, p: &Pub) -> Result<(), Error> {
    let topic = t.bindings.string_sub(ctx, &p.topic)?;
    let payload = payload_string(&p.payload)?;
    let payload = t.bindings.sub(ctx, &payload)?;
    debug!(target: "scenic::step", chan = %p.chan, %topic, %payload, "pub");

    if !p.schema.is_empty() {
        schema::validate(ctx, &p.schema, &payload).await?;
    }

    t.ensure_chan(ctx, &p.chan).await?;
    t.chan(&p.chan)?
        .publish(ctx, Msg::new(topic, payload))
        .await?;

    if !p.run.is_empty() {
        let src = t.bindings.string_sub(ctx, &p.run)?;
        debug!(target: "scenic::step", run = %short(&src), "pub after-script");
        if let ScriptValue::Failure(msg) = t.exec_script(&src, ScriptOpts::default())? {
            return Err(Error::failure(msg));
        }
    }
    Ok(())
}

static SUB_PATTERN_DEPRECATION: Once = Once::new();

pub(super) async fn subscribe(t: &mut Test, ctx: &Ctx, s: &Sub) -> Result<(), Error> {
    let mut topic = s.topic.as_str();
    if !s.pattern.is_empty() {
        SUB_PATTERN_DEPRECATION
            .call_once(|| warn!(target: "scenic::step", "sub.pattern is deprecated; use sub.topic"));
        if !s.topic.is_empty() {
            return Err(Error::failure(
                "specify topic only (pattern is a deprecated alias for topic)",
            ));
        }
        topic = s.pattern.as_str();
    }
    let topic = t.bindings.string_sub(ctx, topic)?;
    debug!(target: "scenic::step", chan = %s.chan, %topic, "sub");

    t.ensure_chan(ctx, &s.chan).await?;
    t.chan(&s.chan)?.sub(ctx, &topic).await
}

/// Enqueues a message onto the channel's inbound queue, bypassing pub/sub.
pub(super) async fn ingest(t: &mut Test, ctx: &Ctx, i: &Ingest) -> Result<(), Error> {
    let topic = t.bindings.string_sub(ctx, &i.topic)?;
    let payload = payload_string(&i.payload)?;
    let payload = t.bindings.sub(ctx, &payload)?;
    debug!(target: "scenic::step", chan = %i.chan, %topic, "ingest");

    t.ensure_chan(ctx, &i.chan).await?;
    t.chan(&i.chan)?.to(ctx, Msg::new(topic, payload)).await
}

pub(super) async fn kill(t: &mut Test, ctx: &Ctx, k: &Kill) -> Result<(), Error> {
    debug!(target: "scenic::step", chan = %k.chan, "kill");
    t.ensure_chan(ctx, &k.chan).await?;
    t.chan(&k.chan)?.kill(ctx).await
}

pub(super) async fn reconnect(t: &mut Test, ctx: &Ctx, r: &Reconnect) -> Result<(), Error> {
    debug!(target: "scenic::step", chan = %r.chan, "reconnect");
    t.ensure_chan(ctx, &r.chan).await?;
    t.chan(&r.chan)?.open(ctx).await
}

/// Runs a script for its effects; the returned value is ignored.
pub(super) fn run(t: &mut Test, ctx: &Ctx, source: &str) -> Result<(), Error> {
    let src = t.bindings.string_sub(ctx, source)?;
    debug!(target: "scenic::step", run = %short(&src), "run");
    t.exec_script(
        &src,
        ScriptOpts {
            snapshot: true,
            ..ScriptOpts::default()
        },
    )?;
    debug!(
        target: "scenic::step",
        bindings = %serde_json::to_string(&t.bindings).unwrap_or_default(),
    );
    Ok(())
}

/// Sleeps for a substituted, parsed duration; cancellable.
pub(super) async fn wait(t: &mut Test, ctx: &Ctx, wait: &str) -> Result<(), Error> {
    let s = t.bindings.string_sub(ctx, wait)?;
    let d = parse_duration(&s)?;
    debug!(target: "scenic::step", duration = %s, "wait");
    tokio::select! {
        _ = ctx.cancelled() => {}
        _ = tokio::time::sleep(d) => {}
    }
    Ok(())
}

/// Runs a script that names the next phase.
pub(super) fn branch(t: &mut Test, ctx: &Ctx, source: &str) -> Result<String, Error> {
    let src = t.bindings.string_sub(ctx, source)?;
    debug!(target: "scenic::step", branch = %short(&src), "branch");
    match t.exec_script(
        &src,
        ScriptOpts {
            snapshot: true,
            ..ScriptOpts::default()
        },
    )? {
        ScriptValue::Json(Value::String(next)) => {
            debug!(target: "scenic::step", next = %next, "branch returned");
            Ok(next)
        }
        ScriptValue::Failure(msg) => Err(Error::failure(msg)),
        ScriptValue::Json(other) => Err(Error::broken(format!(
            "branch script returned {other} and not a string"
        ))),
    }
}

fn payload_string(payload: &Value) -> Result<String, Error> {
    match payload {
        Value::String(s) => Ok(s.clone()),
        other => serde_json::to_string(other)
            .map_err(|e| Error::broken(format!("unserializable payload: {e}"))),
    }
}
