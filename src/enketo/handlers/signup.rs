use crate::enketo::credentials;
use anyhow::{Context, Result};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Signup {
    pub user_id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: String,
}

#[utoipa::path(
    post,
    path = "/api/signup",
    request_body = Signup,
    responses(
        (status = 201, description = "Account created or updated", content_type = "application/json"),
        (status = 400, description = "Missing field", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "accounts"
)]
pub async fn signup(
    pool: Extension<PgPool>,
    payload: Option<Json<Signup>>,
) -> impl IntoResponse {
    let request: Signup = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing user_id".to_string()).into_response();
    }

    let Some(username) = super::normalize_optional(request.username) else {
        return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
    };

    let password = request.password.trim();
    if password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    }

    let email = super::normalize_optional(request.email);
    let phone_number = super::normalize_optional(request.phone_number);
    if email.is_none() && phone_number.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            "Missing email or phone_number".to_string(),
        )
            .into_response();
    }

    let hashed = match credentials::hash_password(password) {
        Ok(hashed) => hashed,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating account".to_string(),
            )
                .into_response();
        }
    };

    match upsert_user(
        &pool,
        user_id,
        &username,
        email.as_deref(),
        phone_number.as_deref(),
        &hashed,
    )
    .await
    {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "success": true }))).into_response(),
        Err(err) => {
            error!("Failed to save account: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error creating account".to_string(),
            )
                .into_response()
        }
    }
}

// Signing up again with the same user_id replaces the profile and the
// credentials, it never duplicates the account.
pub(crate) async fn upsert_user(
    pool: &PgPool,
    user_id: &str,
    username: &str,
    email: Option<&str>,
    phone_number: Option<&str>,
    hashed: &credentials::PasswordHash,
) -> Result<()> {
    let query = r"
        INSERT INTO users
            (user_id, username, email, phone_number, password_hash, password_salt)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id)
        DO UPDATE SET
            username = EXCLUDED.username,
            email = EXCLUDED.email,
            phone_number = EXCLUDED.phone_number,
            password_hash = EXCLUDED.password_hash,
            password_salt = EXCLUDED.password_salt,
            updated_at = NOW()
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(username)
        .bind(email)
        .bind(phone_number)
        .bind(&hashed.hash)
        .bind(&hashed.salt)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to upsert user")?;

    Ok(())
}
