//! An HTTP-client channel.
//!
//! A published payload is a JSON request description; the response lands on
//! the inbound queue, JSON-decoded when possible, so a subsequent receive
//! can match it. Subscription and kill make no sense here and are refused.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use scenic_core::{Chan, ChanRegistry, Ctx, Error, InboundQueue, Msg};

pub const KIND: &str = "httpclient";

const BUFFER_SIZE: usize = 1024;

/// A complete HTTP request, provided as a message payload in JSON.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct HttpRequest {
    method: String,
    url: String,
    headers: BTreeMap<String, Vec<String>>,
    /// The request body; non-strings are JSON-serialized.
    body: Value,
    /// Form values, an alternative to an explicit body.
    form: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct HttpClientChan {
    client: reqwest::Client,
    tx: mpsc::Sender<Msg>,
    rx: InboundQueue,
}

impl HttpClientChan {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);
        Self {
            client: reqwest::Client::new(),
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

impl Default for HttpClientChan {
    fn default() -> Self {
        Self::new()
    }
}

pub(super) fn register(registry: &ChanRegistry) {
    let result = registry.register(
        KIND,
        Arc::new(|_ctx: &Ctx, _config: &Value| {
            Ok(Box::new(HttpClientChan::new()) as Box<dyn Chan>)
        }),
    );
    debug_assert!(result.is_ok());
}

fn build_request(client: &reqwest::Client, msg: &Msg) -> Result<reqwest::Request, Error> {
    let req: HttpRequest = serde_json::from_str(&msg.payload)
        .map_err(|e| Error::failure(format!("httpclient payload is not a request: {e}")))?;

    let method = reqwest::Method::from_bytes(req.method.as_bytes())
        .map_err(|_| Error::failure(format!("bad HTTP method '{}'", req.method)))?;
    let mut builder = client.request(method, &req.url);

    for (name, values) in &req.headers {
        for value in values {
            builder = builder.header(name, value);
        }
    }

    let body = match &req.body {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            serde_json::to_string(other)
                .map_err(|e| Error::failure(format!("unserializable request body: {e}")))?,
        ),
    };

    if !req.form.is_empty() {
        if body.is_some() {
            return Err(Error::failure("can't specify both body and form"));
        }
        builder = builder.form(&req.form);
    } else if let Some(body) = body {
        builder = builder.body(body);
    }

    builder
        .build()
        .map_err(|e| Error::failure(format!("can't build HTTP request: {e}")))
}

#[async_trait]
impl Chan for HttpClientChan {
    fn kind(&self) -> &str {
        KIND
    }

    async fn open(&self, _ctx: &Ctx) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&self, _ctx: &Ctx) -> Result<(), Error> {
        Ok(())
    }

    async fn sub(&self, _ctx: &Ctx, _topic: &str) -> Result<(), Error> {
        Err(Error::failure("httpclient doesn't support 'sub'"))
    }

    async fn publish(&self, ctx: &Ctx, msg: Msg) -> Result<(), Error> {
        let request = build_request(&self.client, &msg)?;
        debug!(target: "scenic::chan", url = %request.url(), "httpclient request");

        let response = tokio::select! {
            _ = ctx.cancelled() => return Ok(()),
            response = self.client.execute(request) => response
                .map_err(|e| Error::failure(format!("HTTP request failed: {e}")))?,
        };

        let text = response
            .text()
            .await
            .map_err(|e| Error::failure(format!("can't read HTTP response: {e}")))?;
        debug!(target: "scenic::chan", body = %text, "httpclient response");

        // Non-JSON responses stay raw strings on the queue.
        let payload = match serde_json::from_str::<Value>(&text) {
            Ok(_) => text,
            Err(_) => serde_json::to_string(&Value::String(text))
                .map_err(|e| Error::broken(format!("response payload: {e}")))?,
        };

        self.to(ctx, Msg::new(msg.topic, payload)).await
    }

    fn recv(&self, _ctx: &Ctx) -> InboundQueue {
        self.rx.clone()
    }

    async fn to(&self, _ctx: &Ctx, msg: Msg) -> Result<(), Error> {
        self.tx
            .try_send(msg.stamped())
            .map_err(|_| Error::failure("httpclient inbound queue is full"))
    }

    async fn kill(&self, _ctx: &Ctx) -> Result<(), Error> {
        Err(Error::failure("httpclient doesn't support 'kill'"))
    }
}
