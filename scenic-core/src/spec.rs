//! The declarative test specification: phases, steps, and their actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Phase executed first when a spec does not name one.
pub const DEFAULT_INITIAL_PHASE: &str = "phase1";

/// A named graph of phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Spec {
    /// The starting phase.
    pub initial_phase: String,
    /// Phases executed, in order, after the main sequence terminates,
    /// cleanly or not.
    pub final_phases: Vec<String>,
    pub phases: BTreeMap<String, Phase>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execution-level checks: the initial phase and every final phase must
    /// exist. Anything beyond that is the loader's business, not ours.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.phases.contains_key(&self.initial_phase) {
            return Err(Error::broken(format!(
                "no phase named '{}'",
                self.initial_phase
            )));
        }
        for name in &self.final_phases {
            if !self.phases.contains_key(name) {
                return Err(Error::broken(format!("no final phase named '{name}'")));
            }
        }
        Ok(())
    }
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            initial_phase: DEFAULT_INITIAL_PHASE.to_string(),
            final_phases: Vec::new(),
            phases: BTreeMap::new(),
        }
    }
}

/// An ordered sequence of steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Phase {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
    pub steps: Vec<Step>,
}

/// A single action unit within a phase.
///
/// A step should carry exactly one action; setting several is legal but
/// under-specified: they execute in a fixed order and a warning is logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Step {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub doc: String,
    /// The step is expected to fail: non-broken errors are swallowed and the
    /// step's `goto` becomes the next phase.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fails: bool,
    /// Skipped steps are no-ops.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skip: bool,

    #[serde(rename = "pub", skip_serializing_if = "Option::is_none")]
    pub publish: Option<Pub>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<Sub>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recv: Option<Recv>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest: Option<Ingest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill: Option<Kill>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<Reconnect>,

    /// Arbitrary script; any returned value is ignored.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub run: String,
    /// A duration string to sleep for.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub wait: String,
    /// Script that returns the name of the next phase; must be last in its
    /// phase.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub branch: String,
    /// The next phase; also the landing phase for `fails: true` steps.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub goto: String,
}

impl Step {
    /// How many action fields are set.
    pub(crate) fn action_count(&self) -> usize {
        [
            self.publish.is_some(),
            self.sub.is_some(),
            self.recv.is_some(),
            self.ingest.is_some(),
            self.kill.is_some(),
            self.reconnect.is_some(),
            !self.run.is_empty(),
            !self.wait.is_empty(),
            !self.branch.is_empty(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Publishes a message to a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pub {
    pub chan: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// JSON Schema URI the substituted payload must satisfy before
    /// publishing.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema: String,
    /// The payload; non-strings are serialized to JSON before substitution.
    pub payload: Value,
    /// Script executed after a successful publish, with `test` and `elapsed`
    /// in scope.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub run: String,
}

/// Subscribes to a topic on a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Sub {
    pub chan: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Deprecated alias for `topic`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pattern: String,
}

/// Receives a message from a channel, gated by a pattern or regexp and an
/// optional guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recv {
    pub chan: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub topic: String,
    /// Structural pattern; string leaves starting with `?` bind variables.
    /// A string-typed pattern is parsed as JSON after substitution.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub pattern: Value,
    /// Named-group regular expression, an alternative to `pattern`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub regexp: String,
    /// Wall-clock bound for the *matching* message, as a duration string.
    /// Empty or `0` means the (very large) default.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    /// What to match against: `payload` (default) or `msg`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target: String,
    /// Remove every non-sticky binding before this step.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub clear_bindings: bool,
    /// Script returning a boolean: `false` keeps waiting.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub guard: String,
    /// Script executed after a satisfied match.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub run: String,
    /// JSON Schema URI incoming payloads must satisfy (pattern mode only).
    #[serde(skip_serializing_if = "String::is_empty")]
    pub schema: String,
}

/// Enqueues a message directly onto a channel's inbound queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ingest {
    pub chan: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub topic: String,
    pub payload: Value,
}

/// Kills a channel unceremoniously.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kill {
    pub chan: String,
}

/// Re-opens a killed channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconnect {
    pub chan: String,
}
