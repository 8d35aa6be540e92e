//! tally-core
//!
//! Business logic over tally-domain: the document command/query surface,
//! account registry, and the running-balance engine. No UI, no storage
//! I/O; persistence and presentation live outside this crate.

pub mod accounts;
pub mod document;
pub mod error;
pub mod ledger;
pub mod report;

pub use accounts::AccountRegistry;
pub use document::{ChangeObserver, Document};
pub use error::{CoreError, Result};
pub use ledger::{Entry, Ledger, TextField};
pub use report::{EntryFilter, TotalsReport};

use std::sync::Once;

static INIT_TRACING: Once = Once::new();

/// Initializes the global tracing subscriber with sensible defaults.
pub fn init() {
    INIT_TRACING.call_once(|| {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter =
            EnvFilter::from_default_env().add_directive("tally_core=info".parse().unwrap());

        fmt().with_env_filter(filter).init();
    });
}
