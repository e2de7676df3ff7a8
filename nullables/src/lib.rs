//! Nullable infrastructure for deterministic testing.
//!
//! External dependencies (the wall clock and the ledger contract) are
//! abstracted behind traits in `tally-types` and `tally-ledger`. This crate
//! provides test-friendly implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically (advance time, hold a call mid-flight)
//! - Never touch the network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod ledger;

pub use clock::NullClock;
pub use ledger::{HeldCall, NullLedger, ReadCall, WriteCall};
