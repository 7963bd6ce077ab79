//! The driving context handed to every blocking operation.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

/// Cancellation plus the base directory for relative file references.
///
/// The token propagates from the outer harness into every suspension point:
/// queue receives, sleeps, and schema fetches. The directory anchors `@@path`
/// file inlining and file-based schema URIs.
#[derive(Debug, Clone)]
pub struct Ctx {
    token: CancellationToken,
    dir: PathBuf,
}

impl Ctx {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            dir: PathBuf::from("."),
        }
    }

    /// A context whose relative paths resolve against `dir`.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            token: CancellationToken::new(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolves `path` against the context directory unless it is absolute.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.dir.join(p)
        }
    }

    /// Requests cancellation of everything driven by this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

impl Default for Ctx {
    fn default() -> Self {
        Self::new()
    }
}
