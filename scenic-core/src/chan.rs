//! The channel abstraction and the process-wide kind registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::chans;
use crate::ctx::Ctx;
use crate::error::Error;
use crate::msg::Msg;

/// Handle on a channel's inbound queue, consumed by receive steps.
pub type InboundQueue = Arc<Mutex<mpsc::Receiver<Msg>>>;

/// Lifecycle state of a channel within a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChanState {
    Closed,
    Open,
    Killed,
}

/// A bidirectional message endpoint.
///
/// Implementations are expected to honor context cancellation on blocking
/// calls and to stamp `received_at` when a message enters the inbound queue.
#[async_trait]
pub trait Chan: Send + Sync + std::fmt::Debug {
    /// The channel kind this instance was created from.
    fn kind(&self) -> &str;

    /// Opens (or re-opens) the channel. Idempotent on an open channel.
    async fn open(&self, ctx: &Ctx) -> Result<(), Error>;

    /// Closes the channel.
    async fn close(&self, ctx: &Ctx) -> Result<(), Error>;

    /// Subscribes to a topic.
    async fn sub(&self, ctx: &Ctx, topic: &str) -> Result<(), Error>;

    /// Publishes a message outbound from the test.
    async fn publish(&self, ctx: &Ctx, msg: Msg) -> Result<(), Error>;

    /// The inbound queue handle.
    fn recv(&self, ctx: &Ctx) -> InboundQueue;

    /// Injects a message directly into the inbound queue.
    async fn to(&self, ctx: &Ctx, msg: Msg) -> Result<(), Error>;

    /// Kills the channel; every operation except a re-open must fail until
    /// the channel is reconnected. Kinds may refuse with a failure.
    async fn kill(&self, ctx: &Ctx) -> Result<(), Error>;
}

/// Builds a channel instance from an opaque configuration value.
pub type ChanFactory = Arc<dyn Fn(&Ctx, &Value) -> Result<Box<dyn Chan>, Error> + Send + Sync>;

/// Process-wide mapping from channel kind to factory.
///
/// Built-in kinds are registered when the table is first touched; further
/// registration belongs at program start, before any test runs.
pub struct ChanRegistry {
    factories: RwLock<HashMap<String, ChanFactory>>,
}

static REGISTRY: Lazy<ChanRegistry> = Lazy::new(|| {
    let registry = ChanRegistry {
        factories: RwLock::new(HashMap::new()),
    };
    chans::register_builtins(&registry);
    registry
});

impl ChanRegistry {
    /// The global registry.
    pub fn global() -> &'static ChanRegistry {
        &REGISTRY
    }

    /// Registers a factory for a kind. Duplicate kinds are broken.
    pub fn register(&self, kind: &str, factory: ChanFactory) -> Result<(), Error> {
        let mut factories = self.factories.write();
        if factories.contains_key(kind) {
            return Err(Error::broken(format!(
                "channel kind '{kind}' is already registered"
            )));
        }
        factories.insert(kind.to_string(), factory);
        Ok(())
    }

    /// Looks up the factory for a kind.
    pub fn lookup(&self, kind: &str) -> Option<ChanFactory> {
        self.factories.read().get(kind).cloned()
    }

    /// Instantiates a channel of the given kind.
    pub fn make(&self, ctx: &Ctx, kind: &str, config: &Value) -> Result<Box<dyn Chan>, Error> {
        let factory = self
            .lookup(kind)
            .ok_or_else(|| Error::broken(format!("unknown channel kind '{kind}'")))?;
        factory(ctx, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_mock_is_registered() {
        assert!(ChanRegistry::global().lookup("mock").is_some());
    }

    #[test]
    fn unknown_kind_is_broken() {
        let err = ChanRegistry::global()
            .make(&Ctx::new(), "carrier-pigeon", &Value::Null)
            .unwrap_err();
        assert!(err.is_broken());
    }

    #[test]
    fn duplicate_registration_is_broken() {
        let err = ChanRegistry::global()
            .register(
                "mock",
                Arc::new(|_: &Ctx, _: &Value| Err(Error::broken("unreachable"))),
            )
            .unwrap_err();
        assert!(err.is_broken());
    }
}
