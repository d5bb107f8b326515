use crate::enketo::handlers::QuestionType;
use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{error, info_span, Instrument};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct QuestionResponse {
    pub questionnaire_type: String,
    #[serde(deserialize_with = "super::string_or_number")]
    pub question_id: String,
    pub question_type: String,
    pub response_value: String,
}

/// One write-time aggregate: how many times a given answer value was submitted.
#[derive(ToSchema, Serialize, Debug)]
pub struct AggregateRow {
    pub questionnaire_type: String,
    pub question_id: String,
    pub question_type: String,
    pub response_value: String,
    pub count: i64,
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct StatsParams {
    pub questionnaire_type: Option<String>,
    pub question_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/question-responses",
    request_body = QuestionResponse,
    responses(
        (status = 200, description = "Response recorded", content_type = "application/json"),
        (status = 400, description = "Missing field or unknown question_type", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "questions"
)]
pub async fn question_response(
    pool: Extension<PgPool>,
    payload: Option<Json<QuestionResponse>>,
) -> impl IntoResponse {
    let request: QuestionResponse = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let questionnaire_type = request.questionnaire_type.trim();
    if questionnaire_type.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing questionnaire_type".to_string(),
        )
            .into_response();
    }

    let question_id = request.question_id.trim();
    if question_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing question_id".to_string()).into_response();
    }

    let response_value = request.response_value.trim();
    if response_value.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing response_value".to_string()).into_response();
    }

    let Some(question_type) = QuestionType::parse(request.question_type.trim()) else {
        return (
            StatusCode::BAD_REQUEST,
            "Invalid question_type".to_string(),
        )
            .into_response();
    };

    let outcome = if question_type.is_counted() {
        increment_response(
            &pool,
            questionnaire_type,
            question_id,
            question_type,
            response_value,
        )
        .await
    } else {
        insert_text_response(&pool, questionnaire_type, question_id, response_value).await
    };

    match outcome {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => {
            error!("Failed to record question response: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error recording response".to_string(),
            )
                .into_response()
        }
    }
}

// One atomic statement, so concurrent writers to the same tuple never lose an
// increment.
async fn increment_response(
    pool: &PgPool,
    questionnaire_type: &str,
    question_id: &str,
    question_type: QuestionType,
    response_value: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO question_responses
            (questionnaire_type, question_id, question_type, response_value, count)
        VALUES ($1, $2, $3, $4, 1)
        ON CONFLICT (questionnaire_type, question_id, response_value)
        DO UPDATE SET count = question_responses.count + 1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(questionnaire_type)
        .bind(question_id)
        .bind(question_type.as_str())
        .bind(response_value)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to increment question response")?;

    Ok(())
}

// Free-text answers are append-only, never merged.
async fn insert_text_response(
    pool: &PgPool,
    questionnaire_type: &str,
    question_id: &str,
    response_value: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO text_responses (questionnaire_type, question_id, response_value)
        VALUES ($1, $2, $3)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(questionnaire_type)
        .bind(question_id)
        .bind(response_value)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert text response")?;

    Ok(())
}

#[utoipa::path(
    get,
    path = "/api/question-stats",
    params(StatsParams),
    responses(
        (status = 200, description = "Aggregate rows for the question", body = [AggregateRow]),
        (status = 400, description = "Missing query parameter", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "questions"
)]
pub async fn question_stats(
    pool: Extension<PgPool>,
    Query(params): Query<StatsParams>,
) -> impl IntoResponse {
    let Some(questionnaire_type) = params
        .questionnaire_type
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing questionnaire_type".to_string(),
        )
            .into_response();
    };

    let Some(question_id) = params
        .question_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "Missing question_id".to_string()).into_response();
    };

    match fetch_stats(&pool, questionnaire_type, question_id).await {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => {
            error!("Failed to read question stats: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error reading question stats".to_string(),
            )
                .into_response()
        }
    }
}

// Aggregation already happened at write time; this is a filtered read.
async fn fetch_stats(
    pool: &PgPool,
    questionnaire_type: &str,
    question_id: &str,
) -> Result<Vec<AggregateRow>> {
    let query = r"
        SELECT questionnaire_type, question_id, question_type, response_value, count
        FROM question_responses
        WHERE questionnaire_type = $1 AND question_id = $2
        ORDER BY response_value
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(questionnaire_type)
        .bind(question_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch question stats")?;

    Ok(rows
        .into_iter()
        .map(|row| AggregateRow {
            questionnaire_type: row.get("questionnaire_type"),
            question_id: row.get("question_id"),
            question_type: row.get("question_type"),
            response_value: row.get("response_value"),
            count: row.get("count"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enketo::handlers::test_db;
    use anyhow::Result;
    use ulid::Ulid;

    #[tokio::test]
    async fn increment_creates_then_counts() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };

        let question_id = format!("q-{}", Ulid::new());
        for _ in 0..3 {
            increment_response(&pool, "mother", &question_id, QuestionType::Scale, "4").await?;
        }
        increment_response(&pool, "mother", &question_id, QuestionType::Scale, "5").await?;

        let rows = fetch_stats(&pool, "mother", &question_id).await?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].response_value, "4");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[1].response_value, "5");
        assert_eq!(rows[1].count, 1);

        Ok(())
    }

    #[tokio::test]
    async fn concurrent_increments_lose_no_updates() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };

        const WRITERS: usize = 16;
        let question_id = format!("q-{}", Ulid::new());

        let mut tasks = Vec::with_capacity(WRITERS);
        for _ in 0..WRITERS {
            let pool = pool.clone();
            let question_id = question_id.clone();
            tasks.push(tokio::spawn(async move {
                increment_response(
                    &pool,
                    "corporate",
                    &question_id,
                    QuestionType::MultipleChoice,
                    "agree",
                )
                .await
            }));
        }
        for task in tasks {
            task.await??;
        }

        let rows = fetch_stats(&pool, "corporate", &question_id).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, i64::try_from(WRITERS)?);

        Ok(())
    }

    #[tokio::test]
    async fn text_responses_are_append_only() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };

        let question_id = format!("q-{}", Ulid::new());
        insert_text_response(&pool, "other", &question_id, "first thought").await?;
        insert_text_response(&pool, "other", &question_id, "first thought").await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM text_responses WHERE question_id = $1",
        )
        .bind(&question_id)
        .fetch_one(&pool)
        .await?;
        let total: i64 = row.get("total");
        assert_eq!(total, 2);

        // Text answers never become aggregate rows
        let rows = fetch_stats(&pool, "other", &question_id).await?;
        assert!(rows.is_empty());

        Ok(())
    }
}
