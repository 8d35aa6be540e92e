//! tally-domain
//!
//! Pure domain models (Currency, Amount, Account, Split, Transaction).
//! No I/O, no services, no storage. Only data types and core enums.

pub mod account;
pub mod amount;
pub mod common;
pub mod currency;
pub mod transaction;

pub use account::*;
pub use amount::*;
pub use common::*;
pub use currency::*;
pub use transaction::*;
