//! The per-test variable store.
//!
//! Keys carry their lifetime in a sigil: `?name` is an ordinary variable
//! captured by matching or set by scripts, `?*name` is ephemeral (removed at
//! the start of every receive), `?!name` is sticky (survives an explicit
//! clear), and a sigil-free `name` is a constant referenced as `{name}` in
//! substitution contexts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of variables removed before every receive.
pub const EPHEMERAL_PREFIX: &str = "?*";
/// Prefix of variables that survive a requested clear.
pub const STICKY_PREFIX: &str = "?!";

/// An ordered mapping from variable names to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, Value>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stores a value under a name, as-is.
    pub fn set_key_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert(name, value);
    }

    /// Parses a `name=value` assignment. When the value parses as JSON the
    /// JSON value is stored; otherwise the raw string is.
    pub fn set(&mut self, assignment: &str) -> Result<(), crate::Error> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            crate::Error::broken(format!("binding assignment '{assignment}' lacks '='"))
        })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.insert(name, value);
        Ok(())
    }

    /// Removes every `?*`-prefixed binding.
    pub fn clear_ephemeral(&mut self) {
        self.0.retain(|k, _| !k.starts_with(EPHEMERAL_PREFIX));
    }

    /// Removes every binding that is not `?!`-prefixed.
    pub fn clear_except_sticky(&mut self) {
        self.0.retain(|k, _| k.starts_with(STICKY_PREFIX));
    }

    /// A deep clone; mutations of the copy never reach the original.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn from_map(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Bindings {
    type Item = (&'a String, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_parses_json_values() {
        let mut bs = Bindings::new();
        bs.set(r#"want="queso""#).unwrap();
        bs.set("like=tacos").unwrap();
        bs.set("n=3").unwrap();

        assert_eq!(bs.get("want"), Some(&json!("queso")));
        assert_eq!(bs.get("like"), Some(&json!("tacos")));
        assert_eq!(bs.get("n"), Some(&json!(3)));
    }

    #[test]
    fn set_without_equals_is_broken() {
        let mut bs = Bindings::new();
        assert!(bs.set("queso").unwrap_err().is_broken());
    }

    #[test]
    fn copy_is_disjoint() {
        let mut bs0 = Bindings::new();
        bs0.insert("want", json!("queso"));
        let mut bs1 = bs0.copy();
        bs1.insert("want", json!("tacos"));

        assert_eq!(bs0.get("want"), Some(&json!("queso")));
        assert_eq!(bs1.get("want"), Some(&json!("tacos")));
    }

    #[test]
    fn sigil_lifetimes() {
        let mut bs = Bindings::new();
        bs.insert("?v", json!(1));
        bs.insert("?*tmp", json!(2));
        bs.insert("?!keep", json!(3));
        bs.insert("const", json!(4));

        bs.clear_ephemeral();
        assert!(bs.get("?*tmp").is_none());
        assert_eq!(bs.len(), 3);

        bs.clear_except_sticky();
        assert_eq!(bs.get("?!keep"), Some(&json!(3)));
        assert_eq!(bs.len(), 1);
    }
}
