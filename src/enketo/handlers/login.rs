use crate::enketo::credentials;
use anyhow::{Context, Result};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::{error, info_span, Instrument};
use utoipa::ToSchema;

// Unknown identifier and wrong password answer with the same body, so the
// response never reveals which accounts exist.
const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Login {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub password: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

struct StoredUser {
    profile: UserProfile,
    password_hash: String,
    password_salt: String,
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = Login,
    responses(
        (status = 200, description = "Credentials accepted, profile returned", content_type = "application/json"),
        (status = 400, description = "Missing field", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 500, description = "Store failure", body = String),
    ),
    tag = "accounts"
)]
pub async fn login(pool: Extension<PgPool>, payload: Option<Json<Login>>) -> impl IntoResponse {
    let request: Login = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = super::normalize_optional(request.email);
    let phone_number = super::normalize_optional(request.phone_number);

    let Some(password) = request
        .password
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "Missing password".to_string()).into_response();
    };

    let lookup = if let Some(email) = email.as_deref() {
        lookup_by_email(&pool, email).await
    } else if let Some(phone_number) = phone_number.as_deref() {
        lookup_by_phone(&pool, phone_number).await
    } else {
        return (
            StatusCode::BAD_REQUEST,
            "Missing email or phone_number".to_string(),
        )
            .into_response();
    };

    let user = match lookup {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to look up account: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error logging in".to_string(),
            )
                .into_response();
        }
    };

    if !credentials::verify_password(password, &user.password_salt, &user.password_hash) {
        return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response();
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "user": user.profile })),
    )
        .into_response()
}

async fn lookup_by_email(pool: &PgPool, email: &str) -> Result<Option<StoredUser>> {
    let query = r"
        SELECT user_id, username, email, phone_number, password_hash, password_salt
        FROM users
        WHERE email = $1
    ";
    fetch_user(pool, query, email).await
}

async fn lookup_by_phone(pool: &PgPool, phone_number: &str) -> Result<Option<StoredUser>> {
    let query = r"
        SELECT user_id, username, email, phone_number, password_hash, password_salt
        FROM users
        WHERE phone_number = $1
    ";
    fetch_user(pool, query, phone_number).await
}

async fn fetch_user(pool: &PgPool, query: &str, identifier: &str) -> Result<Option<StoredUser>> {
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(identifier)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user")?;

    Ok(row.map(|row| StoredUser {
        profile: UserProfile {
            user_id: row.get("user_id"),
            username: row.get("username"),
            email: row.get("email"),
            phone_number: row.get("phone_number"),
        },
        password_hash: row.get("password_hash"),
        password_salt: row.get("password_salt"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enketo::handlers::{signup, test_db};
    use anyhow::Result;
    use ulid::Ulid;

    #[tokio::test]
    async fn signup_then_login_round_trip() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };

        let user_id = format!("user-{}", Ulid::new());
        let email = format!("{user_id}@example.com");
        let phone = format!("+1555{}", &user_id[5..12]);

        let hashed = credentials::hash_password("correct horse")?;
        signup::upsert_user(
            &pool,
            &user_id,
            "lina",
            Some(&email),
            Some(&phone),
            &hashed,
        )
        .await?;

        let by_email = lookup_by_email(&pool, &email).await?.expect("user by email");
        assert_eq!(by_email.profile.user_id, user_id);
        assert_eq!(by_email.profile.username, "lina");
        assert!(credentials::verify_password(
            "correct horse",
            &by_email.password_salt,
            &by_email.password_hash
        ));
        assert!(!credentials::verify_password(
            "wrong horse",
            &by_email.password_salt,
            &by_email.password_hash
        ));

        let by_phone = lookup_by_phone(&pool, &phone).await?.expect("user by phone");
        assert_eq!(by_phone.profile.user_id, user_id);

        Ok(())
    }

    #[test]
    fn success_payload_never_exposes_hash_or_salt() {
        let profile = UserProfile {
            user_id: "user-1".to_string(),
            username: "lina".to_string(),
            email: Some("lina@example.com".to_string()),
            phone_number: None,
        };

        // Same shape the handler returns on success
        let payload = json!({ "success": true, "user": profile });

        let user = payload["user"].as_object().expect("user object");
        assert!(user.get("password_hash").is_none());
        assert!(user.get("password_salt").is_none());
        assert_eq!(user["user_id"], "user-1");
        assert_eq!(user["username"], "lina");
    }

    #[tokio::test]
    async fn unknown_identifier_finds_nothing() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };

        let missing = format!("missing-{}@example.com", Ulid::new());
        assert!(lookup_by_email(&pool, &missing).await?.is_none());

        Ok(())
    }
}
