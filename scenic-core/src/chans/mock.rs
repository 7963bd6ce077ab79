//! An in-process echo channel for demos and tests.
//!
//! `publish` feeds the message straight back into the inbound queue, so a
//! spec can talk to itself. Unlike most transports, the mock supports the
//! full closed/open/killed lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::debug;

use crate::chan::{Chan, ChanRegistry, ChanState, InboundQueue};
use crate::ctx::Ctx;
use crate::error::Error;
use crate::msg::Msg;

pub const KIND: &str = "mock";

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
struct MockOpts {
    capacity: Option<usize>,
}

#[derive(Debug)]
pub struct MockChan {
    state: Mutex<ChanState>,
    subs: Mutex<Vec<String>>,
    tx: mpsc::Sender<Msg>,
    rx: InboundQueue,
}

impl MockChan {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            state: Mutex::new(ChanState::Closed),
            subs: Mutex::new(Vec::new()),
            tx,
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Topics subscribed so far, in order.
    pub fn subscriptions(&self) -> Vec<String> {
        self.subs.lock().clone()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match *self.state.lock() {
            ChanState::Open => Ok(()),
            ChanState::Killed => Err(Error::failure("mock channel is killed")),
            ChanState::Closed => Err(Error::failure("mock channel is not open")),
        }
    }
}

pub(crate) fn register(registry: &ChanRegistry) {
    let result = registry.register(
        KIND,
        Arc::new(|_ctx: &Ctx, config: &serde_json::Value| {
            let opts: MockOpts = if config.is_null() {
                MockOpts::default()
            } else {
                serde_json::from_value(config.clone())
                    .map_err(|e| Error::broken(format!("bad mock channel config: {e}")))?
            };
            Ok(Box::new(MockChan::new(
                opts.capacity.unwrap_or(DEFAULT_CAPACITY),
            )) as Box<dyn Chan>)
        }),
    );
    debug_assert!(result.is_ok());
}

#[async_trait]
impl Chan for MockChan {
    fn kind(&self) -> &str {
        KIND
    }

    async fn open(&self, _ctx: &Ctx) -> Result<(), Error> {
        *self.state.lock() = ChanState::Open;
        Ok(())
    }

    async fn close(&self, _ctx: &Ctx) -> Result<(), Error> {
        *self.state.lock() = ChanState::Closed;
        Ok(())
    }

    async fn sub(&self, _ctx: &Ctx, topic: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.subs.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, ctx: &Ctx, msg: Msg) -> Result<(), Error> {
        self.ensure_open()?;
        debug!(target: "scenic::chan", topic = %msg.topic, "mock echo");
        self.to(ctx, msg).await
    }

    fn recv(&self, _ctx: &Ctx) -> InboundQueue {
        self.rx.clone()
    }

    async fn to(&self, _ctx: &Ctx, msg: Msg) -> Result<(), Error> {
        self.ensure_open()?;
        self.tx
            .try_send(msg.stamped())
            .map_err(|_| Error::failure("mock inbound queue is full"))
    }

    async fn kill(&self, _ctx: &Ctx) -> Result<(), Error> {
        *self.state.lock() = ChanState::Killed;
        Ok(())
    }
}
