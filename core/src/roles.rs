use serde::Serialize;
use std::fmt;
use tally_ledger::SessionReader;
use tally_types::Address;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Voter,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Admin => "admin",
            Role::Voter => "voter",
        })
    }
}

/// `Admin` iff `account` is the contract's admin address. Addresses compare
/// by value, so textual case never matters.
pub async fn resolve_role(
    reader: &dyn SessionReader,
    account: &Address,
) -> Result<Role, ClientError> {
    let admin = reader.admin_address().await?;
    Ok(if admin == *account {
        Role::Admin
    } else {
        Role::Voter
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tally_nullables::{NullClock, NullLedger};

    #[tokio::test]
    async fn admin_detection_ignores_case() {
        let admin: Address = "0xABCDEFabcdef0123456789ABCDEF0123456789ab".parse().unwrap();
        let ledger = NullLedger::new(admin, Arc::new(NullClock::new(0)));

        let same: Address = "0xabcdefABCDEF0123456789abcdef0123456789AB".parse().unwrap();
        assert_eq!(resolve_role(&ledger, &same).await.unwrap(), Role::Admin);

        let other = Address::new([1; 20]);
        assert_eq!(resolve_role(&ledger, &other).await.unwrap(), Role::Voter);
    }
}
