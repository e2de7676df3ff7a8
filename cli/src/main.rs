//! `tally`: command-line client for a voting contract behind a gateway.

mod config;
mod output;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tally_core::{
    candidate_targets, dashboard, history, Role, SessionDraft, SessionFilter, SessionQuery,
    TallyClient,
};
use tally_ledger::RpcLedger;
use tally_types::{Address, CandidateId, Clock, SessionId, SystemClock, Timestamp};
use tally_utils::{init_logging, LogFormat};

use crate::config::{ClientConfig, Overrides};

#[derive(Parser)]
#[command(name = "tally", about = "Voting sessions, votes and results on a ledger contract")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars override them.
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway URL.
    #[arg(long, env = "TALLY_ENDPOINT")]
    endpoint: Option<String>,

    /// Voting contract address.
    #[arg(long, env = "TALLY_CONTRACT")]
    contract: Option<String>,

    /// Account the gateway signs as.
    #[arg(long, env = "TALLY_ACCOUNT")]
    account: Option<Address>,

    /// Confirmation polling interval in milliseconds.
    #[arg(long, env = "TALLY_POLL_MS")]
    poll_ms: Option<u64>,

    /// Log output: "human" or "json".
    #[arg(long, env = "TALLY_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "TALLY_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Ended,
}

impl From<FilterArg> for SessionFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => SessionFilter::All,
            FilterArg::Active => SessionFilter::FlagActive,
            FilterArg::Ended => SessionFilter::Ended,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show whether the configured account is the admin or a voter.
    Role,

    /// List sessions with their status and candidates.
    Sessions {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,

        /// Read per-session vote flags for this address (defaults to the
        /// configured account).
        #[arg(long)]
        voter: Option<Address>,
    },

    /// Show the active and upcoming sessions the configured account can act on.
    Dashboard,

    /// Results of every ended session, most recent first.
    Results,

    /// Cast a vote as the configured account.
    Vote { session: u64, candidate: u64 },

    /// Administrative commands (admin account only).
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Create a session. Times are unix seconds, or `+N` for N seconds from now.
    CreateSession {
        #[arg(long)]
        description: String,
        #[arg(long, allow_hyphen_values = true)]
        start: String,
        #[arg(long, allow_hyphen_values = true)]
        end: String,
    },
    /// Add a candidate to a session that has not started yet.
    AddCandidate { session: u64, name: String },
    /// Activate or deactivate a session.
    SetStatus {
        session: u64,
        #[arg(action = clap::ArgAction::Set)]
        active: bool,
    },
    /// Turn the voter whitelist requirement on or off.
    WhitelistRequired {
        #[arg(action = clap::ArgAction::Set)]
        required: bool,
    },
    /// Whitelist one address.
    WhitelistAdd { address: String },
    /// Whitelist every address in a newline-separated file ("-" for stdin).
    WhitelistAddMany { file: PathBuf },
    /// Remove one address from the whitelist.
    WhitelistRemove { address: String },
}

/// `+N` is relative to `now`; anything else is absolute unix seconds.
fn parse_time(raw: &str, now: Timestamp) -> anyhow::Result<Timestamp> {
    let raw = raw.trim();
    if let Some(offset) = raw.strip_prefix('+') {
        let secs: u64 = offset.parse().with_context(|| format!("bad offset {raw:?}"))?;
        return Ok(now.plus_secs(secs));
    }
    let secs: u64 = raw.parse().with_context(|| format!("bad unix time {raw:?}"))?;
    Ok(Timestamp::from_unix_secs(secs))
}

fn read_list(path: &PathBuf) -> anyhow::Result<String> {
    if path.as_os_str() == "-" {
        return std::io::read_to_string(std::io::stdin()).context("failed to read stdin");
    }
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let base = match &cli.config {
        Some(path) => ClientConfig::from_toml_file(path)?,
        None => ClientConfig::default(),
    };
    Ok(base.with_overrides(Overrides {
        endpoint: cli.endpoint.clone(),
        contract: cli.contract.clone(),
        account: cli.account,
        confirmation_poll_ms: cli.poll_ms,
        log_format: cli.log_format,
        log_level: cli.log_level.clone(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(config.log_format, &config.log_level);

    let mut ledger = RpcLedger::new(
        config.endpoint.clone(),
        config.contract()?,
        config.request_timeout(),
    )?
    .with_poll_interval(config.poll_interval());
    if let Some(account) = config.account {
        ledger = ledger.with_account(account);
    }
    tracing::debug!(endpoint = ledger.endpoint(), "connecting to gateway");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = TallyClient::new(Arc::new(ledger), clock.clone());

    match cli.command {
        Command::Role => {
            let account = config.account()?;
            println!("{account}: {}", client.role(&account).await?);
        }

        Command::Sessions { filter, voter } => {
            let mut query = SessionQuery::new(filter.into());
            if let Some(viewer) = voter.or(config.account) {
                query = query.for_viewer(viewer);
            }
            let snapshot = client.sessions.fetch_all(query).await?;
            let now = clock.now();
            if snapshot.is_empty() {
                println!("no sessions");
            }
            for session in &snapshot.sessions {
                println!("{}", output::session_block(session, now));
            }
        }

        Command::Dashboard => {
            let account = config.account()?;
            let role = client.role(&account).await?;
            let whitelist = client.whitelist.fetch(Some(account)).await?;
            let snapshot = client
                .sessions
                .fetch_all(SessionQuery::new(SessionFilter::FlagActive).for_viewer(account))
                .await?;
            let now = clock.now();
            let board = dashboard(&snapshot, now, &whitelist, &account, role);

            if role == Role::Admin {
                println!("signed in as admin; admins do not vote");
            } else if !whitelist.allows(&account) {
                println!("{account} is not on the voter whitelist");
            }
            println!("active sessions: {}", board.active.len());
            for view in &board.active {
                println!("{}", output::view_block(view, now));
            }
            println!("upcoming sessions: {}", board.upcoming.len());
            for view in &board.upcoming {
                println!("{}", output::view_block(view, now));
            }
        }

        Command::Results => {
            let mut query = SessionQuery::new(SessionFilter::Ended);
            if let Some(account) = config.account {
                query = query.for_viewer(account);
            }
            let snapshot = client.sessions.fetch_all(query).await?;
            let results = history(&snapshot, clock.now());
            if results.is_empty() {
                println!("no ended sessions");
            }
            for result in &results {
                println!("{}", output::result_block(result));
            }
        }

        Command::Vote { session, candidate } => {
            let account = config.account()?;
            let id = SessionId(session);
            let snapshot = client
                .sessions
                .fetch_all(SessionQuery::default().for_viewer(account))
                .await?;
            if snapshot.session(id).is_none() {
                bail!("session {id} does not exist");
            }
            let whitelist = client.whitelist.fetch(Some(account)).await?;

            let outcome = client
                .votes
                .cast_vote(&snapshot, id, CandidateId(candidate), account, &whitelist)
                .await?;
            println!("vote confirmed in block {} ({})", outcome.tx.block, outcome.tx.hash);
            if let Some(session) = outcome.refreshed.as_ref().and_then(|s| s.session(id)) {
                println!("{}", output::session_block(session, clock.now()));
            }
        }

        Command::Admin { action } => {
            let account = config.account()?;
            if client.role(&account).await? != Role::Admin {
                bail!("{account} is not the contract admin");
            }
            run_admin(&client, action, clock.now()).await?;
        }
    }

    Ok(())
}

async fn run_admin(
    client: &TallyClient,
    action: AdminAction,
    now: Timestamp,
) -> anyhow::Result<()> {
    let admin = &client.admin;
    match action {
        AdminAction::CreateSession {
            description,
            start,
            end,
        } => {
            let draft = SessionDraft {
                description,
                start_time: parse_time(&start, now)?,
                end_time: parse_time(&end, now)?,
            };
            let outcome = admin.create_session(draft).await?;
            println!("session created in block {}", outcome.tx.block);
            if let Some(created) = outcome.refreshed.as_ref().and_then(|s| s.sessions.last()) {
                println!("{}", output::session_line(created, now));
            }
        }
        AdminAction::AddCandidate { session, name } => {
            // Candidate validation checks the current snapshot.
            let snapshot = client.sessions.fetch_all(SessionQuery::default()).await?;
            let id = SessionId(session);
            let targets = candidate_targets(&snapshot, now);
            if !targets.iter().any(|s| s.id == id) {
                bail!(
                    "session {id} does not take candidates\n{}",
                    output::target_list(&targets, now)
                );
            }
            let outcome = admin.add_candidate(id, &name).await?;
            println!("candidate added in block {}", outcome.tx.block);
        }
        AdminAction::SetStatus { session, active } => {
            let outcome = admin.set_session_status(SessionId(session), active).await?;
            println!("session status set in block {}", outcome.tx.block);
        }
        AdminAction::WhitelistRequired { required } => {
            let outcome = admin.set_whitelist_required(required).await?;
            match outcome.refreshed {
                Some(snapshot) => println!("whitelist required: {}", snapshot.required),
                None => println!("whitelist mode set in block {}", outcome.tx.block),
            }
        }
        AdminAction::WhitelistAdd { address } => {
            let outcome = admin.add_voter(&address).await?;
            println!("whitelisted in block {}", outcome.tx.block);
        }
        AdminAction::WhitelistAddMany { file } => {
            let text = read_list(&file)?;
            let outcome = admin.add_voters(&text).await?;
            println!("whitelisted batch in block {}", outcome.tx.block);
        }
        AdminAction::WhitelistRemove { address } => {
            let outcome = admin.remove_voter(&address).await?;
            println!("removed from whitelist in block {}", outcome.tx.block);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_and_absolute_times() {
        let now = Timestamp::new(1_000);
        assert_eq!(parse_time("+3600", now).unwrap(), Timestamp::new(4_600));
        assert_eq!(parse_time(" 2000 ", now).unwrap(), Timestamp::new(2_000));
        assert!(parse_time("tomorrow", now).is_err());
        assert!(parse_time("+x", now).is_err());
    }

    #[test]
    fn cli_parses_admin_subcommands() {
        let cli = Cli::try_parse_from([
            "tally",
            "--contract",
            "0xabc",
            "admin",
            "create-session",
            "--description",
            "Board",
            "--start",
            "+60",
            "--end",
            "+120",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Admin {
                action: AdminAction::CreateSession { .. }
            }
        ));
        let config = load_config(&cli).unwrap();
        assert_eq!(config.contract().unwrap(), "0xabc");
    }

    #[test]
    fn set_status_takes_an_explicit_bool() {
        let cli = Cli::try_parse_from(["tally", "admin", "set-status", "3", "false"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Admin {
                action: AdminAction::SetStatus {
                    session: 3,
                    active: false
                }
            }
        ));
    }
}
