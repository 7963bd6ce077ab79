//! Per-test state: the channel table, the bindings, and the elapsed clock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::bindings::Bindings;
use crate::chan::{Chan, ChanRegistry};
use crate::ctx::Ctx;
use crate::error::Error;
use crate::msg::Msg;
use crate::script::{self, ScriptValue};

/// A channel declaration: the kind plus its opaque configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChanDecl {
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

/// One test run.
///
/// A test exclusively owns its bindings and its channel table; channel
/// instances are created at most once per name, lazily, on first reference.
pub struct Test {
    pub id: String,
    pub bindings: Bindings,
    chan_decls: HashMap<String, ChanDecl>,
    chans: HashMap<String, Box<dyn Chan>>,
    elapsed: Duration,
    last_tick: Option<Instant>,
}

impl Test {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bindings: Bindings::new(),
            chan_decls: HashMap::new(),
            chans: HashMap::new(),
            elapsed: Duration::ZERO,
            last_tick: None,
        }
    }

    /// Declares a channel by name; the instance is created on first use.
    pub fn declare_chan(&mut self, name: impl Into<String>, decl: ChanDecl) {
        self.chan_decls.insert(name.into(), decl);
    }

    /// Installs an already-built channel instance under a name. The caller
    /// is responsible for opening it.
    pub fn register_chan(&mut self, name: impl Into<String>, chan: Box<dyn Chan>) {
        self.chans.insert(name.into(), chan);
    }

    /// Resolves a channel by name, instantiating and opening it via the
    /// registry on first reference.
    pub async fn ensure_chan(&mut self, ctx: &Ctx, name: &str) -> Result<(), Error> {
        if self.chans.contains_key(name) {
            return Ok(());
        }
        let decl = self.chan_decls.get(name).cloned().ok_or_else(|| {
            Error::broken(format!("test '{}' has no channel named '{name}'", self.id))
        })?;
        let chan = ChanRegistry::global().make(ctx, &decl.kind, &decl.config)?;
        chan.open(ctx).await?;
        info!(target: "scenic::test", chan = name, kind = %decl.kind, "opened channel");
        self.chans.insert(name.to_string(), chan);
        Ok(())
    }

    /// The channel previously resolved under `name`.
    pub fn chan(&self, name: &str) -> Result<&dyn Chan, Error> {
        self.chans
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| Error::broken(format!("channel '{name}' was never opened")))
    }

    /// Advances the elapsed clock: the time since the previous tick becomes
    /// the reading exposed to scripts.
    pub fn tick(&mut self) {
        let now = Instant::now();
        self.elapsed = match self.last_tick {
            Some(prev) => now.duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);
    }

    /// Milliseconds since the previous step, as scripts see it.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    /// Runs a script with this test in scope and adopts the script-side
    /// bindings as canonical afterwards.
    pub(crate) fn exec_script(
        &mut self,
        source: &str,
        opts: ScriptOpts<'_>,
    ) -> Result<ScriptValue, Error> {
        let env = script::Env {
            bindings: Some(&self.bindings),
            snapshot: opts.snapshot,
            with_test: true,
            elapsed_ms: Some(self.elapsed_ms()),
            msg: opts.msg,
            bindingss: opts.bindingss,
        };
        let out = script::exec(source, &env)?;
        if let Some(bs) = out.bindings {
            self.bindings = bs;
        }
        Ok(out.value)
    }
}

/// Extra scope for a script execution.
#[derive(Debug, Default)]
pub(crate) struct ScriptOpts<'a> {
    /// Expose the `bindings`/`bs` snapshot globals.
    pub snapshot: bool,
    pub msg: Option<&'a Msg>,
    pub bindingss: Option<&'a [Bindings]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chans::MockChan;
    use serde_json::json;

    #[tokio::test]
    async fn ensure_chan_instantiates_once() {
        let ctx = Ctx::new();
        let mut t = Test::new("t");
        t.declare_chan(
            "m",
            ChanDecl {
                kind: "mock".to_string(),
                config: Value::Null,
            },
        );
        t.ensure_chan(&ctx, "m").await.unwrap();
        t.ensure_chan(&ctx, "m").await.unwrap();
        assert_eq!(t.chan("m").unwrap().kind(), "mock");
    }

    #[tokio::test]
    async fn undeclared_chan_is_broken() {
        let ctx = Ctx::new();
        let mut t = Test::new("t");
        let err = t.ensure_chan(&ctx, "ghost").await.unwrap_err();
        assert!(err.is_broken());
    }

    #[tokio::test]
    async fn registered_instance_is_reused() {
        let ctx = Ctx::new();
        let mut t = Test::new("t");
        let chan = MockChan::new(4);
        chan.open(&ctx).await.unwrap();
        t.register_chan("m", Box::new(chan));
        t.ensure_chan(&ctx, "m").await.unwrap();
        t.chan("m").unwrap();
    }

    #[test]
    fn scripts_mutate_bindings() {
        let mut t = Test::new("t");
        t.bindings.insert("?n", json!(1));
        t.exec_script(
            r#"test.Bindings["?n"] = 2"#,
            ScriptOpts {
                snapshot: true,
                ..ScriptOpts::default()
            },
        )
        .unwrap();
        assert_eq!(t.bindings.get("?n"), Some(&json!(2)));
    }

    #[test]
    fn elapsed_clock_ticks() {
        let mut t = Test::new("t");
        t.tick();
        std::thread::sleep(Duration::from_millis(5));
        t.tick();
        assert!(t.elapsed_ms() >= 4.0);
    }
}
