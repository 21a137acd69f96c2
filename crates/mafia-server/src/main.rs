//! The `mafiad` binary: configuration from environment, then run.
//!
//! Configuration surface (all optional):
//!   MAFIAD_ADDR           listen address, default 127.0.0.1:9000
//!   MAFIAD_MIN_PLAYERS    players required to auto-start a game
//!   MAFIAD_MAX_PLAYERS    lobby capacity
//!   MAFIAD_MAFIA_RATIO    one Mafia member per this many players
//!   MAFIAD_DAY_SECS       Day phase time budget
//!   MAFIAD_NIGHT_SECS     Night phase time budget
//!   MAFIAD_REVEAL_CHECKS  "true" broadcasts the Sheriff's findings
//!   RUST_LOG              tracing filter, default "info"

use std::time::Duration;

use mafia_game::GameRules;
use mafia_server::{MafiaServer, ServerError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr =
        std::env::var("MAFIAD_ADDR").unwrap_or_else(|_| "127.0.0.1:9000".into());
    let rules = rules_from_env()?;

    tracing::info!(
        %addr,
        min_players = rules.min_players,
        max_players = rules.max_players,
        "starting mafiad"
    );

    let server = MafiaServer::builder()
        .bind(&addr)
        .rules(rules)
        .build()
        .await?;
    server.run().await
}

fn rules_from_env() -> Result<GameRules, ServerError> {
    let defaults = GameRules::default();
    let rules = GameRules {
        min_players: env_parse("MAFIAD_MIN_PLAYERS", defaults.min_players)?,
        max_players: env_parse("MAFIAD_MAX_PLAYERS", defaults.max_players)?,
        mafia_ratio: env_parse("MAFIAD_MAFIA_RATIO", defaults.mafia_ratio)?,
        day_budget: Duration::from_secs(env_parse(
            "MAFIAD_DAY_SECS",
            defaults.day_budget.as_secs(),
        )?),
        night_budget: Duration::from_secs(env_parse(
            "MAFIAD_NIGHT_SECS",
            defaults.night_budget.as_secs(),
        )?),
        reveal_sheriff_checks: env_parse(
            "MAFIAD_REVEAL_CHECKS",
            defaults.reveal_sheriff_checks,
        )?,
    };

    if rules.min_players < 1 || rules.max_players < rules.min_players {
        return Err(ServerError::Config(format!(
            "player bounds make no sense: min {}, max {}",
            rules.min_players, rules.max_players
        )));
    }
    if rules.mafia_ratio == 0 {
        return Err(ServerError::Config("MAFIAD_MAFIA_RATIO must be > 0".into()));
    }
    Ok(rules)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ServerError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ServerError::Config(format!("cannot parse {key}={raw}"))),
        Err(_) => Ok(default),
    }
}
