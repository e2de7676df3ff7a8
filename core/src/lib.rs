//! Core of the tally voting client.
//!
//! Turns raw, eventually-visible ledger reads into a consistent view of
//! voting sessions and coordinates writes against that view:
//!
//! - [`SessionRepository`]: fans out reads into an immutable [`Snapshot`],
//!   publishing only the most recently initiated fetch
//! - [`status`]: session lifecycle as a pure function of flag, window and now
//! - [`whitelist`]: eligibility gate and the versioned whitelist snapshot
//! - [`results`]: winner / tie / percentages for ended sessions
//! - [`VoteCoordinator`]: single-flight vote submission as an explicit
//!   five-state machine, followed by a re-fetch
//! - [`AdminConsole`]: validated administrative writes, command-then-refetch
//!
//! Nothing here mutates a published snapshot. Every write is confirmed on
//! the ledger and then re-read; the ledger stays the source of truth.

pub mod admin;
pub mod client;
pub mod error;
pub mod flight;
pub mod guard;
pub mod model;
pub mod repository;
pub mod results;
pub mod roles;
pub mod status;
pub mod view;
pub mod vote;
pub mod whitelist;

pub use admin::{parse_address_list, AdminConsole, AdminKey, SessionDraft};
pub use client::TallyClient;
pub use error::{ClientError, ValidationError};
pub use flight::{FlightGuard, SingleFlight};
pub use guard::{Publication, SequenceGuard, Ticket};
pub use model::{Candidate, Session, SessionFilter, SessionQuery, Snapshot, WriteOutcome};
pub use repository::SessionRepository;
pub use results::{aggregate, history, Outcome, SessionResult, Standing};
pub use roles::{resolve_role, Role};
pub use status::SessionStatus;
pub use view::{candidate_targets, dashboard, Dashboard, SessionView};
pub use vote::{VoteCoordinator, VoteKey, VotePhase};
pub use whitelist::{eligible, WhitelistRepository, WhitelistSnapshot};
