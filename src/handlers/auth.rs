//! Account endpoints under `/auth`
//!
//! These are the endpoints an unconfirmed account may still reach.
//! Tokens arrive either in the path (links from mails) or in the body.

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::{json_body, json_reply, reject, require_user, with_actor, with_state, AppState, HandlerResult};
use crate::auth::guard::Actor;
use crate::auth::user::UserProfile;
use crate::services::ConfirmOutcome;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeEmailRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
    pub confirmed: bool,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

fn message(text: &'static str, status: StatusCode) -> warp::reply::Response {
    json_reply(&MessageResponse { message: text }, status)
}

async fn register(request: RegisterRequest, state: AppState) -> HandlerResult {
    let user = state
        .accounts
        .register(&request.email, &request.username, &request.password)
        .await
        .map_err(reject)?;
    Ok(json_reply(&user.to_profile(), StatusCode::CREATED))
}

async fn login(request: LoginRequest, state: AppState) -> HandlerResult {
    let session = state
        .accounts
        .login(&request.email, &request.password)
        .await
        .map_err(reject)?;
    Ok(json_reply(
        &LoginResponse {
            token: session.token,
            confirmed: session.user.confirmed,
            user: session.user.to_profile(),
        },
        StatusCode::OK,
    ))
}

async fn confirm_account(token: String, actor: Actor, state: AppState) -> HandlerResult {
    let user = require_user(&actor)?;
    let outcome = state.accounts.confirm(user.id, &token).await.map_err(reject)?;
    let text = match outcome {
        ConfirmOutcome::Confirmed => "You have confirmed your account.",
        ConfirmOutcome::AlreadyConfirmed => "Your account is already confirmed.",
    };
    Ok(message(text, StatusCode::OK))
}

async fn resend_confirmation(actor: Actor, state: AppState) -> HandlerResult {
    let user = require_user(&actor)?;
    let sent = state.accounts.resend_confirmation(user.id).await.map_err(reject)?;
    if sent {
        Ok(message(
            "A new confirmation email has been sent to you by email.",
            StatusCode::ACCEPTED,
        ))
    } else {
        Ok(message("Your account is already confirmed.", StatusCode::OK))
    }
}

async fn change_password(request: ChangePasswordRequest, actor: Actor, state: AppState) -> HandlerResult {
    let user = require_user(&actor)?;
    state
        .accounts
        .change_password(user.id, &request.old_password, &request.password)
        .await
        .map_err(reject)?;
    Ok(message("Your password has been updated.", StatusCode::OK))
}

async fn request_reset(request: ResetRequest, state: AppState) -> HandlerResult {
    state
        .accounts
        .request_password_reset(&request.email)
        .await
        .map_err(reject)?;
    Ok(message(
        "An email with instructions to reset your password has been sent to you.",
        StatusCode::ACCEPTED,
    ))
}

async fn reset_password(token: String, request: ResetPasswordRequest, state: AppState) -> HandlerResult {
    state
        .accounts
        .reset_password(&request.email, &token, &request.password)
        .await
        .map_err(reject)?;
    Ok(message("Your password has been updated.", StatusCode::OK))
}

async fn request_email_change(request: ChangeEmailRequest, actor: Actor, state: AppState) -> HandlerResult {
    let user = require_user(&actor)?;
    state
        .accounts
        .request_email_change(user.id, &request.email, &request.password)
        .await
        .map_err(reject)?;
    Ok(message(
        "An email with instructions to confirm your new email address has been sent to you.",
        StatusCode::ACCEPTED,
    ))
}

async fn change_email(token: String, actor: Actor, state: AppState) -> HandlerResult {
    let user = require_user(&actor)?;
    let email = state.accounts.change_email(user.id, &token).await.map_err(reject)?;
    Ok(json_reply(
        &serde_json::json!({ "message": "Your email address has been updated.", "email": email }),
        StatusCode::OK,
    ))
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let register_route = warp::path!("auth" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(register);

    let login_route = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(login);

    let confirm_route = warp::path!("auth" / "confirm" / String)
        .and(warp::get())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(confirm_account);

    let resend_route = warp::path!("auth" / "confirm")
        .and(warp::post())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(resend_confirmation);

    let change_password_route = warp::path!("auth" / "change-password")
        .and(warp::post())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(change_password);

    let request_reset_route = warp::path!("auth" / "reset")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(request_reset);

    let reset_route = warp::path!("auth" / "reset" / String)
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(reset_password);

    let request_email_change_route = warp::path!("auth" / "change-email")
        .and(warp::post())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(request_email_change);

    let change_email_route = warp::path!("auth" / "change-email" / String)
        .and(warp::get())
        .and(with_actor(state.clone()))
        .and(with_state(state))
        .and_then(change_email);

    register_route
        .or(login_route)
        .or(confirm_route)
        .or(resend_route)
        .or(change_password_route)
        .or(request_reset_route)
        .or(reset_route)
        .or(request_email_change_route)
        .or(change_email_route)
}
