//! One handle wiring every component to a single ledger and clock.

use std::sync::Arc;
use tally_ledger::{Ledger, SessionReader};
use tally_types::{Address, Clock};

use crate::admin::AdminConsole;
use crate::error::ClientError;
use crate::repository::SessionRepository;
use crate::roles::{resolve_role, Role};
use crate::vote::VoteCoordinator;
use crate::whitelist::WhitelistRepository;

pub struct TallyClient {
    pub sessions: Arc<SessionRepository>,
    pub whitelist: Arc<WhitelistRepository>,
    pub votes: VoteCoordinator,
    pub admin: AdminConsole,
    reader: Arc<dyn SessionReader>,
    clock: Arc<dyn Clock>,
}

impl TallyClient {
    pub fn new<L: Ledger + 'static>(ledger: Arc<L>, clock: Arc<dyn Clock>) -> Self {
        let reader: Arc<dyn SessionReader> = ledger.clone();
        let sessions = Arc::new(SessionRepository::new(reader.clone(), clock.clone()));
        let whitelist = Arc::new(WhitelistRepository::new(ledger.clone(), clock.clone()));
        let votes = VoteCoordinator::new(ledger.clone(), sessions.clone(), clock.clone());
        let admin = AdminConsole::new(
            ledger.clone(),
            ledger,
            sessions.clone(),
            whitelist.clone(),
            clock.clone(),
        );
        Self {
            sessions,
            whitelist,
            votes,
            admin,
            reader,
            clock,
        }
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub async fn role(&self, account: &Address) -> Result<Role, ClientError> {
        resolve_role(self.reader.as_ref(), account).await
    }
}
