//! Channel kinds shipped with the CLI.

pub mod http;

use once_cell::sync::OnceCell;

use scenic_core::ChanRegistry;

static REGISTERED: OnceCell<()> = OnceCell::new();

/// Registers the CLI's channel kinds; safe to call more than once.
pub fn register_all() {
    REGISTERED.get_or_init(|| {
        http::register(ChanRegistry::global());
    });
}
