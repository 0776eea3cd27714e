pub mod config;
pub mod core;
pub mod error;
pub mod store;
pub mod sync;

use std::sync::atomic::{AtomicBool, Ordering};

/// Set from `debug_logging` in config.json at startup; lowers wick's own log
/// threshold from info to debug.
static DEBUG_LOGGING: AtomicBool = AtomicBool::new(false);

pub fn set_debug_logging(enabled: bool) {
    DEBUG_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn debug_logging() -> bool {
    DEBUG_LOGGING.load(Ordering::Relaxed)
}
