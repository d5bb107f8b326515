use crate::enketo::handlers::Choice;
use anyhow::{Context, Result};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IntroChoice {
    pub user_id: String,
    pub choice: String,
}

#[derive(ToSchema, Serialize, Debug, PartialEq, Eq)]
pub struct IntroStats {
    pub yes_count: i64,
    pub no_count: i64,
    pub total: i64,
    pub yes_percentage: i64,
}

impl IntroStats {
    /// Percentage is rounded; an empty data set reads as an even split.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn from_counts(yes_count: i64, no_count: i64) -> Self {
        let total = yes_count + no_count;
        let yes_percentage = if total == 0 {
            50
        } else {
            ((yes_count as f64 / total as f64) * 100.0).round() as i64
        };

        Self {
            yes_count,
            no_count,
            total,
            yes_percentage,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::from_counts(0, 0)
    }
}

#[utoipa::path(
    post,
    path = "/api/intro-choice",
    request_body = IntroChoice,
    responses(
        (status = 200, description = "Choice saved", content_type = "application/json"),
        (status = 400, description = "Missing or invalid field", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "intro"
)]
pub async fn intro_choice(
    pool: Extension<PgPool>,
    payload: Option<Json<IntroChoice>>,
) -> impl IntoResponse {
    let request: IntroChoice = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing user_id".to_string()).into_response();
    }

    let Some(choice) = Choice::parse(request.choice.trim()) else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid choice, expected 'yes' or 'no'".to_string(),
        )
            .into_response();
    };

    match upsert_choice(&pool, user_id, choice).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => {
            error!("Failed to save intro choice: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error saving intro choice".to_string(),
            )
                .into_response()
        }
    }
}

// Replaying the same call leaves the same final state: one row per user,
// latest choice wins.
async fn upsert_choice(pool: &PgPool, user_id: &str, choice: Choice) -> Result<()> {
    let query = r"
        INSERT INTO intro_choices (user_id, choice)
        VALUES ($1, $2)
        ON CONFLICT (user_id)
        DO UPDATE SET choice = EXCLUDED.choice, updated_at = NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(choice.as_str())
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert intro choice")?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/intro-stats",
    responses(
        (status = 200, description = "Vote counts and percentage", body = IntroStats),
    ),
    tag = "intro"
)]
pub async fn intro_stats(pool: Extension<PgPool>) -> impl IntoResponse {
    match fetch_counts(&pool).await {
        Ok((yes_count, no_count)) => (
            StatusCode::OK,
            Json(IntroStats::from_counts(yes_count, no_count)),
        ),
        Err(err) => {
            // Stats reads degrade to zeroed defaults instead of failing the request
            error!("Failed to read intro stats: {err}");
            (StatusCode::OK, Json(IntroStats::empty()))
        }
    }
}

async fn fetch_counts(pool: &PgPool) -> Result<(i64, i64)> {
    let query = r"
        SELECT
            COUNT(*) FILTER (WHERE choice = 'yes') AS yes_count,
            COUNT(*) FILTER (WHERE choice = 'no') AS no_count
        FROM intro_choices
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count intro choices")?;

    Ok((row.get("yes_count"), row.get("no_count")))
}
