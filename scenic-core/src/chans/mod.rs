//! Built-in channel kinds.

pub mod mock;

use crate::chan::ChanRegistry;

pub use mock::MockChan;

/// Registers the channel kinds that ship with the engine.
pub(crate) fn register_builtins(registry: &ChanRegistry) {
    mock::register(registry);
}
