use crate::cli::actions::{server, Action};
use anyhow::Result;
use secrecy::SecretString;

/// Map parsed CLI matches to an [`Action`].
///
/// # Errors
/// Returns an error if a required argument is missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server(server::Args {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        db_username: matches
            .get_one("db-username")
            .map(|s: &String| s.to_string()),
        db_password: matches
            .get_one("db-password")
            .map(|s: &String| SecretString::from(s.to_string())),
    }))
}
