use crate::enketo::handlers::{health, intro, login, questions, signup, submissions};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;

pub mod credentials;
pub(crate) mod handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        intro::intro_choice,
        intro::intro_stats,
        questions::question_response,
        questions::question_stats,
        submissions::batch_answers,
        submissions::user_submissions,
        signup::signup,
        login::login,
    ),
    components(schemas(
        intro::IntroChoice,
        intro::IntroStats,
        questions::QuestionResponse,
        questions::AggregateRow,
        submissions::BatchAnswers,
        submissions::AnswerInput,
        submissions::Submission,
        submissions::SubmissionAnswer,
        signup::Signup,
        login::Login,
        login::UserProfile,
    )),
    tags(
        (name = "enketo", description = "Questionnaire collection API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let app = Router::new()
        .route("/", get(|| async { "📋" }))
        .route("/api/intro-choice", post(handlers::intro_choice))
        .route("/api/intro-stats", get(handlers::intro_stats))
        .route("/api/question-responses", post(handlers::question_response))
        .route("/api/question-stats", get(handlers::question_stats))
        .route("/api/submissions", post(handlers::batch_answers))
        .route(
            "/api/users/:user_id/submissions",
            get(handlers::user_submissions),
        )
        .route("/api/signup", post(handlers::signup))
        .route("/api/login", post(handlers::login))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
