//! HTTP surface: warp filters over the account and content services

pub mod api;
pub mod auth;

use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::guard::{Actor, IdentityGuard};
use crate::auth::token::{extract_bearer_token, TokenService};
use crate::auth::user::User;
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::BlogError;
use crate::mail::Mailer;
use crate::security::with_api_security_headers;
use crate::security_logger::SecurityLogger;
use crate::services::{AccountService, ContentService};
use crate::storage::StorageProvider;

/// Largest accepted JSON body
const MAX_BODY_BYTES: u64 = 16 * 1024;

pub type HandlerResult = std::result::Result<warp::reply::Response, Rejection>;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub content: Arc<ContentService>,
    pub storage: Arc<dyn StorageProvider>,
    pub security: Arc<SecurityLogger>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        storage: Arc<dyn StorageProvider>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        security: Arc<SecurityLogger>,
    ) -> Self {
        let tokens = Arc::new(
            TokenService::with_clock(&config.secret_key, clock).with_ttls(config.token_ttl, config.session_ttl),
        );
        let accounts = AccountService::new(config, storage.clone(), tokens, mailer, security.clone());
        let content = ContentService::new(storage.clone(), IdentityGuard::default(), security.clone());

        Self {
            accounts: Arc::new(accounts),
            content: Arc::new(content),
            storage,
            security,
        }
    }

    pub fn guard(&self) -> &IdentityGuard {
        self.content.guard()
    }
}

/// Service error carried through warp's rejection chain
#[derive(Debug)]
pub struct ApiRejection(pub BlogError);

impl warp::reject::Reject for ApiRejection {}

pub fn reject(err: BlogError) -> Rejection {
    warp::reject::custom(ApiRejection(err))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Status, machine code and client-facing message of a service error
pub fn classify(err: &BlogError) -> (StatusCode, &'static str, String) {
    match err {
        BlogError::Token(token_err) => (
            StatusCode::BAD_REQUEST,
            "invalid_token",
            token_err.public_message().to_string(),
        ),
        BlogError::EmailConflict => (StatusCode::CONFLICT, "email_conflict", err.to_string()),
        BlogError::UsernameTaken => (StatusCode::CONFLICT, "username_taken", err.to_string()),
        BlogError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string()),
        BlogError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", err.to_string()),
        BlogError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", err.to_string()),
        BlogError::MustConfirmFirst => (StatusCode::FORBIDDEN, "unconfirmed", err.to_string()),
        BlogError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        BlogError::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone()),
        BlogError::MailError(_) => (
            StatusCode::BAD_GATEWAY,
            "mail_error",
            "The message could not be sent".to_string(),
        ),
        BlogError::StorageError(_) | BlogError::SystemError(_) | BlogError::ConfigError(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error".to_string(),
        ),
    }
}

/// Turn rejections into JSON error responses
pub async fn handle_rejection(rejection: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let (status, error, message) = if let Some(ApiRejection(err)) = rejection.find::<ApiRejection>() {
        let classified = classify(err);
        if classified.0.is_server_error() {
            log::error!("Request failed: {}", err);
        }
        classified
    } else if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "bad_request", e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", "Request body too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "Method not allowed".to_string())
    } else {
        log::error!("Unhandled rejection: {:?}", rejection);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { error, message }),
        status,
    ))
}

pub fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

// Helper function to include app state in request
pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// JSON request body with a size cap
pub fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: serde::de::DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

/// Resolve the acting identity from the Authorization header.
/// No header means anonymous; a bad bearer token is rejected.
pub fn with_actor(state: AppState) -> impl Filter<Extract = (Actor,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(with_state(state))
        .and_then(resolve_actor)
}

async fn resolve_actor(header: Option<String>, state: AppState) -> std::result::Result<Actor, Rejection> {
    let header = match header {
        Some(header) => header,
        None => return Ok(Actor::Anonymous),
    };
    let token = extract_bearer_token(&header).ok_or_else(|| reject(BlogError::Unauthorized))?;
    state.accounts.resolve_session(&token).await.map_err(reject)
}

/// Authenticated user of the request or a 401
pub fn require_user(actor: &Actor) -> std::result::Result<&User, Rejection> {
    actor.user().ok_or_else(|| reject(BlogError::Unauthorized))
}

async fn health(state: AppState) -> HandlerResult {
    let storage = state.storage.health_check().await.map_err(reject)?;
    Ok(json_reply(
        &serde_json::json!({ "status": "ok", "storage": storage }),
        StatusCode::OK,
    ))
}

/// Every route of the service with error recovery and security headers
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health);

    health_route
        .or(auth::routes(state.clone()))
        .or(api::routes(state))
        .recover(handle_rejection)
        .map(|reply| with_api_security_headers(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TokenError;

    #[test]
    fn test_token_failures_share_one_response() {
        let bodies: Vec<_> = [TokenError::Invalid, TokenError::Expired, TokenError::Mismatch]
            .into_iter()
            .map(|e| classify(&BlogError::Token(e)))
            .collect();
        assert!(bodies.iter().all(|b| b.0 == StatusCode::BAD_REQUEST));
        assert!(bodies.windows(2).all(|w| w[0].2 == w[1].2));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(classify(&BlogError::Forbidden).0, StatusCode::FORBIDDEN);
        let (status, code, _) = classify(&BlogError::MustConfirmFirst);
        assert_eq!((status, code), (StatusCode::FORBIDDEN, "unconfirmed"));
        assert_eq!(classify(&BlogError::EmailConflict).0, StatusCode::CONFLICT);
        assert_eq!(
            classify(&BlogError::ValidationError("x".into())).0,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        let (_, _, message) = classify(&BlogError::StorageError("disk path /var/db".into()));
        assert!(!message.contains("/var/db"));
    }
}
