//! Fundamental types for the tally voting client.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! ledger addresses, transaction hashes, session/candidate identifiers,
//! timestamps and the clock abstraction used to observe "now".

pub mod address;
pub mod clock;
pub mod error;
pub mod hash;
pub mod ids;
pub mod time;

pub use address::Address;
pub use clock::{Clock, SystemClock};
pub use error::TypesError;
pub use hash::TxHash;
pub use ids::{CandidateId, SessionId};
pub use time::Timestamp;
