pub mod health;
pub use self::health::health;

pub mod intro;
pub use self::intro::{intro_choice, intro_stats};

pub mod questions;
pub use self::questions::{question_response, question_stats};

pub mod submissions;
pub use self::submissions::{batch_answers, user_submissions};

pub mod signup;
pub use self::signup::signup;

pub mod login;
pub use self::login::login;

// common types and functions for the handlers
use serde::{Deserialize, Deserializer};

/// Intro vote value. Closed set, anything else is rejected before any store call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Choice {
    Yes,
    No,
}

impl Choice {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yes" => Some(Self::Yes),
            "no" => Some(Self::No),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

/// Question kind. Scale and multiple-choice answers are aggregated into
/// counter rows at write time, text input is stored verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuestionType {
    Scale,
    MultipleChoice,
    TextInput,
}

impl QuestionType {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scale-question" => Some(Self::Scale),
            "multiple-choice" => Some(Self::MultipleChoice),
            "text-input" => Some(Self::TextInput),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scale => "scale-question",
            Self::MultipleChoice => "multiple-choice",
            Self::TextInput => "text-input",
        }
    }

    #[must_use]
    pub const fn is_counted(self) -> bool {
        !matches!(self, Self::TextInput)
    }
}

// Older clients send question ids as JSON numbers, newer ones as strings.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

/// Trim an optional field, mapping empty strings to `None`.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
pub(crate) mod test_db {
    use anyhow::{Context, Result};
    use sqlx::{postgres::PgPoolOptions, Connection, PgConnection, PgPool};

    const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

    /// Connect to the database named by `ENKETO_TEST_DSN` and apply the schema.
    /// Returns `None` when the variable is unset so storage tests skip cleanly.
    pub(crate) async fn pool() -> Result<Option<PgPool>> {
        let Ok(dsn) = std::env::var("ENKETO_TEST_DSN") else {
            eprintln!("Skipping storage test: ENKETO_TEST_DSN is not set");
            return Ok(None);
        };

        apply_schema(&dsn).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&dsn)
            .await
            .context("failed to connect test pool")?;

        Ok(Some(pool))
    }

    async fn apply_schema(dsn: &str) -> Result<()> {
        let mut connection = PgConnection::connect(dsn)
            .await
            .context("failed to connect for schema setup")?;

        for (index, statement) in split_sql_statements(SCHEMA_SQL).iter().enumerate() {
            sqlx::query(statement)
                .execute(&mut connection)
                .await
                .with_context(|| format!("failed to execute schema statement {}", index + 1))?;
        }

        Ok(())
    }

    fn split_sql_statements(sql: &str) -> Vec<String> {
        let mut statements = Vec::new();
        let mut current = String::new();

        for line in sql.lines() {
            current.push_str(line);
            current.push('\n');

            if line.trim().ends_with(';') {
                let statement = current.trim();
                if !statement.is_empty() {
                    statements.push(statement.to_string());
                }
                current.clear();
            }
        }

        let leftover = current.trim();
        if !leftover.is_empty() {
            statements.push(leftover.to_string());
        }

        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn choice_parses_closed_set() {
        assert_eq!(Choice::parse("yes"), Some(Choice::Yes));
        assert_eq!(Choice::parse("no"), Some(Choice::No));
        assert_eq!(Choice::parse("maybe"), None);
        assert_eq!(Choice::parse("YES"), None);
        assert_eq!(Choice::parse(""), None);
    }

    #[test]
    fn choice_round_trips_as_str() {
        for choice in [Choice::Yes, Choice::No] {
            assert_eq!(Choice::parse(choice.as_str()), Some(choice));
        }
    }

    #[test]
    fn question_type_parses_closed_set() {
        assert_eq!(
            QuestionType::parse("scale-question"),
            Some(QuestionType::Scale)
        );
        assert_eq!(
            QuestionType::parse("multiple-choice"),
            Some(QuestionType::MultipleChoice)
        );
        assert_eq!(
            QuestionType::parse("text-input"),
            Some(QuestionType::TextInput)
        );
        assert_eq!(QuestionType::parse("essay"), None);
    }

    #[test]
    fn question_type_counted_split() {
        assert!(QuestionType::Scale.is_counted());
        assert!(QuestionType::MultipleChoice.is_counted());
        assert!(!QuestionType::TextInput.is_counted());
    }

    #[test]
    fn string_or_number_accepts_both() {
        assert_eq!(string_or_number(json!("q-12")).unwrap(), "q-12");
        assert_eq!(string_or_number(json!(12)).unwrap(), "12");
        assert!(string_or_number(json!({"id": 1})).is_err());
    }

    #[test]
    fn normalize_optional_trims_and_drops_empty() {
        assert_eq!(
            normalize_optional(Some(" a@example.com ".to_string())),
            Some("a@example.com".to_string())
        );
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(normalize_optional(None), None);
    }
}
