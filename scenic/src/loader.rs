//! Loads spec documents from disk.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use scenic_core::{ChanDecl, Error, Spec};

/// A spec document: the phase graph plus the channel declarations and
/// initial bindings that surround it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecDoc {
    /// Name for the test run; defaults to the file stem.
    pub name: String,
    pub doc: String,
    /// Channel declarations: name to kind plus configuration.
    pub channels: BTreeMap<String, ChanDecl>,
    /// Initial bindings.
    pub bindings: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub spec: Spec,
}

/// Reads and validates a JSON spec document.
pub fn load(path: &Path) -> Result<SpecDoc, Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::broken(format!("can't read spec '{}': {e}", path.display())))?;
    let mut doc: SpecDoc = serde_json::from_str(&text)
        .map_err(|e| Error::broken(format!("can't parse spec '{}': {e}", path.display())))?;
    if doc.name.is_empty() {
        doc.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test".to_string());
    }
    doc.spec.validate()?;
    Ok(doc)
}
