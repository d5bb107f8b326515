//! # Enketo (Questionnaire Collection API)
//!
//! `enketo` collects questionnaire answers and serves simple aggregate
//! statistics over HTTP, backed by PostgreSQL.
//!
//! ## Surface
//!
//! - **Intro choice** — a binary yes/no vote, one row per user with
//!   last-choice-wins upsert semantics, plus a percentage read-out.
//! - **Question responses** — scale and multiple-choice answers are aggregated
//!   at write time into `(questionnaire_type, question_id, response_value)`
//!   counter rows; free-text answers are stored verbatim, append-only.
//! - **Submissions** — a questionnaire completion is one submission row plus
//!   its answer rows, written in a single transaction.
//! - **Accounts** — minimal signup/login with PBKDF2-HMAC-SHA256 salted
//!   password hashes. Login failures are deliberately indistinguishable
//!   between an unknown identifier and a wrong password.
//!
//! ## Consistency
//!
//! Counter updates for the same aggregate tuple go through a single atomic
//! `INSERT ... ON CONFLICT ... DO UPDATE` statement, so concurrent writers
//! never lose updates. No state is held in process between requests.

pub mod cli;
pub mod enketo;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
