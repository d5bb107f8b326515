use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BatchAnswers {
    pub user_id: String,
    #[serde(rename = "type")]
    pub questionnaire_type: String,
    pub corporate_role: Option<String>,
    pub answers: Vec<AnswerInput>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AnswerInput {
    #[serde(deserialize_with = "super::string_or_number")]
    pub question_id: String,
    pub response_value: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct Submission {
    pub submission_id: Uuid,
    pub questionnaire_type: String,
    pub corporate_role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub answers: Vec<SubmissionAnswer>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct SubmissionAnswer {
    pub question_id: String,
    pub response_value: String,
}

#[utoipa::path(
    post,
    path = "/api/submissions",
    request_body = BatchAnswers,
    responses(
        (status = 200, description = "Submission and answers saved", content_type = "application/json"),
        (status = 400, description = "Missing field", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "submissions"
)]
pub async fn batch_answers(
    pool: Extension<PgPool>,
    payload: Option<Json<BatchAnswers>>,
) -> impl IntoResponse {
    let request: BatchAnswers = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing user_id".to_string()).into_response();
    }

    let questionnaire_type = request.questionnaire_type.trim();
    if questionnaire_type.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing type".to_string()).into_response();
    }

    if request.answers.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing answers".to_string()).into_response();
    }

    let corporate_role = request
        .corporate_role
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match insert_submission(
        &pool,
        user_id,
        questionnaire_type,
        corporate_role,
        &request.answers,
    )
    .await
    {
        Ok(submission_id) => (
            StatusCode::OK,
            Json(json!({ "success": true, "submission_id": submission_id })),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to save submission: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error saving answers".to_string(),
            )
                .into_response()
        }
    }
}

// Submission and answers are all-or-nothing: any failed insert drops the
// transaction and rolls the whole batch back.
async fn insert_submission(
    pool: &PgPool,
    user_id: &str,
    questionnaire_type: &str,
    corporate_role: Option<&str>,
    answers: &[AnswerInput],
) -> Result<Uuid> {
    let mut tx = pool.begin().await.context("begin submission transaction")?;

    let submission_id = Uuid::new_v4();

    let query = r"
        INSERT INTO questionnaire_submissions
            (submission_id, user_id, questionnaire_type, corporate_role)
        VALUES ($1, $2, $3, $4)
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(submission_id)
        .bind(user_id)
        .bind(questionnaire_type)
        .bind(corporate_role)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert submission")?;

    let query = r"
        INSERT INTO question_answers (submission_id, question_id, response_value)
        VALUES ($1, $2, $3)
    ";
    for answer in answers {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(submission_id)
            .bind(answer.question_id.trim())
            .bind(&answer.response_value)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert answer")?;
    }

    tx.commit().await.context("commit submission transaction")?;

    Ok(submission_id)
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/submissions",
    params(
        ("user_id" = String, Path, description = "Owner of the submissions")
    ),
    responses(
        (status = 200, description = "Submissions with nested answers", content_type = "application/json"),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "submissions"
)]
pub async fn user_submissions(
    pool: Extension<PgPool>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match fetch_user_submissions(&pool, &user_id).await {
        Ok(submissions) => (
            StatusCode::OK,
            Json(json!({ "user_id": user_id, "submissions": submissions })),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to load submissions: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error loading submissions".to_string(),
            )
                .into_response()
        }
    }
}

async fn fetch_user_submissions(pool: &PgPool, user_id: &str) -> Result<Vec<Submission>> {
    let query = r"
        SELECT submission_id, questionnaire_type, corporate_role, created_at
        FROM questionnaire_submissions
        WHERE user_id = $1
        ORDER BY created_at DESC
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch submissions")?;

    let mut submissions = Vec::with_capacity(rows.len());
    for row in rows {
        let submission_id: Uuid = row.get("submission_id");
        let answers = fetch_answers(pool, submission_id).await?;
        submissions.push(Submission {
            submission_id,
            questionnaire_type: row.get("questionnaire_type"),
            corporate_role: row.get("corporate_role"),
            created_at: row.get("created_at"),
            answers,
        });
    }

    Ok(submissions)
}

async fn fetch_answers(pool: &PgPool, submission_id: Uuid) -> Result<Vec<SubmissionAnswer>> {
    let query = r"
        SELECT question_id, response_value
        FROM question_answers
        WHERE submission_id = $1
        ORDER BY id
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(submission_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch answers")?;

    Ok(rows
        .into_iter()
        .map(|row| SubmissionAnswer {
            question_id: row.get("question_id"),
            response_value: row.get("response_value"),
        })
        .collect())
}
