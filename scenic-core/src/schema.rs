//! JSON Schema validation of message payloads.
//!
//! A `schema:` URI on a publish or receive step names the schema to validate
//! the (substituted) payload against. `file://` URIs and bare paths resolve
//! against the context directory; `http(s)://` URIs are fetched. Loading or
//! compiling the schema is broken; payload complaints are a test failure
//! carrying every complaint.

use serde_json::Value;
use tracing::debug;

use crate::ctx::Ctx;
use crate::error::Error;

/// Validates `payload` against the schema named by `uri`.
pub async fn validate(ctx: &Ctx, uri: &str, payload: &str) -> Result<(), Error> {
    debug!(target: "scenic::schema", %uri, "validating payload");
    let doc: Value = serde_json::from_str(payload)
        .map_err(|e| Error::broken(format!("schema validation error: payload is not JSON: {e}")))?;

    let schema = load(ctx, uri).await?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| Error::broken(format!("schema ({uri}) compile error: {e}")))?;

    let complaints: Vec<String> = validator.iter_errors(&doc).map(|e| e.to_string()).collect();
    if complaints.is_empty() {
        debug!(target: "scenic::schema", %uri, "schema validated");
        Ok(())
    } else {
        Err(Error::failure(format!(
            "schema ({uri}) validation errors: {}",
            complaints.join("; ")
        )))
    }
}

async fn load(ctx: &Ctx, uri: &str) -> Result<Value, Error> {
    let text = if uri.starts_with("http://") || uri.starts_with("https://") {
        fetch(ctx, uri).await?
    } else {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        let resolved = ctx.resolve(path);
        std::fs::read_to_string(&resolved)
            .map_err(|e| Error::broken(format!("can't read schema '{}': {e}", resolved.display())))?
    };
    serde_json::from_str(&text).map_err(|e| Error::broken(format!("schema ({uri}) is not JSON: {e}")))
}

async fn fetch(ctx: &Ctx, uri: &str) -> Result<String, Error> {
    tokio::select! {
        _ = ctx.cancelled() => Err(Error::failure(format!("schema fetch canceled: {uri}"))),
        response = reqwest::get(uri) => {
            let response = response
                .map_err(|e| Error::broken(format!("can't fetch schema '{uri}': {e}")))?;
            response
                .text()
                .await
                .map_err(|e| Error::broken(format!("can't read schema '{uri}': {e}")))
        }
    }
}
