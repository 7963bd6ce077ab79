//! Scenario-driven integration tests for message-oriented services.
//!
//! A spec is a named graph of phases, each a sequence of steps. The engine
//! drives channels (message brokers, HTTP services, in-process mocks)
//! through publish/subscribe/receive interactions, matches received messages
//! against structural patterns or regular expressions, binds captured
//! variables, and executes embedded Lua to express guards, branches, and
//! side effects.
//!
//! ```no_run
//! use scenic_core::{ChanDecl, Ctx, Spec, Test};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), scenic_core::Error> {
//! let spec: Spec = serde_json::from_value(json!({
//!     "phases": {
//!         "phase1": {
//!             "steps": [
//!                 { "pub":  { "chan": "self", "payload": { "x": 1 } } },
//!                 { "recv": { "chan": "self", "pattern": { "x": "?v" } } }
//!             ]
//!         }
//!     }
//! }))
//! .expect("spec");
//!
//! let mut test = Test::new("demo");
//! test.declare_chan("self", ChanDecl { kind: "mock".into(), config: json!(null) });
//! test.run(&Ctx::new(), &spec).await?;
//! assert_eq!(test.bindings.get("?v"), Some(&json!(1)));
//! # Ok(())
//! # }
//! ```

mod bindings;
mod chan;
pub mod chans;
mod ctx;
mod duration;
mod error;
mod exec;
mod msg;
pub mod pattern;
pub mod schema;
pub mod script;
mod spec;
mod subst;
mod test;

pub use bindings::{Bindings, EPHEMERAL_PREFIX, STICKY_PREFIX};
pub use chan::{Chan, ChanFactory, ChanRegistry, ChanState, InboundQueue};
pub use ctx::Ctx;
pub use duration::parse_duration;
pub use error::Error;
pub use msg::Msg;
pub use spec::{Ingest, Kill, Phase, Pub, Reconnect, Recv, Spec, Step, Sub, DEFAULT_INITIAL_PHASE};
pub use test::{ChanDecl, Test};
