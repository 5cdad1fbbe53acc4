//! Versioned JSON API for profiles, posts, comments and follows
//!
//! Reads are open to anonymous callers. A signed-in account that is not
//! yet confirmed gets 403 `unconfirmed` everywhere under `/api`.

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use super::{json_body, json_reply, reject, with_actor, with_state, AppState, HandlerResult};
use crate::auth::guard::Actor;
use crate::auth::user::{UserId, UserProfile};
use crate::storage::{CommentId, PostId};

#[derive(Debug, Deserialize)]
pub struct BodyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationRequest {
    pub disabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub followers: usize,
    pub following: usize,
    /// Whether the caller follows this user; absent for anonymous callers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followed_by_you: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    pub following: bool,
    /// False when the request did not change anything
    pub changed: bool,
}

async fn get_user(id: u64, actor: Actor, state: AppState) -> HandlerResult {
    state.content.require_reader(&actor, "api.get_user").await.map_err(reject)?;
    let user = state.accounts.get_user(UserId(id)).await.map_err(reject)?;
    let followers = state.content.followers(user.id).await.map_err(reject)?.len();
    let following = state.content.followed(user.id).await.map_err(reject)?.len();
    let followed_by_you = match actor.user() {
        Some(me) => Some(state.content.is_following(me.id, user.id).await.map_err(reject)?),
        None => None,
    };

    Ok(json_reply(
        &ProfileResponse {
            profile: user.to_profile(),
            followers,
            following,
            followed_by_you,
        },
        StatusCode::OK,
    ))
}

async fn user_posts(id: u64, actor: Actor, state: AppState) -> HandlerResult {
    let user = state.accounts.get_user(UserId(id)).await.map_err(reject)?;
    let posts = state.content.posts_by(&actor, user.id).await.map_err(reject)?;
    Ok(json_reply(&posts, StatusCode::OK))
}

async fn create_post(request: BodyRequest, actor: Actor, state: AppState) -> HandlerResult {
    let post = state.content.create_post(&actor, &request.body).await.map_err(reject)?;
    Ok(json_reply(&post, StatusCode::CREATED))
}

async fn edit_post(id: u64, request: BodyRequest, actor: Actor, state: AppState) -> HandlerResult {
    let post = state
        .content
        .edit_post(&actor, PostId(id), &request.body)
        .await
        .map_err(reject)?;
    Ok(json_reply(&post, StatusCode::OK))
}

async fn post_comments(id: u64, actor: Actor, state: AppState) -> HandlerResult {
    let comments = state.content.post_comments(&actor, PostId(id)).await.map_err(reject)?;
    Ok(json_reply(&comments, StatusCode::OK))
}

async fn add_comment(id: u64, request: BodyRequest, actor: Actor, state: AppState) -> HandlerResult {
    let comment = state
        .content
        .add_comment(&actor, PostId(id), &request.body)
        .await
        .map_err(reject)?;
    Ok(json_reply(&comment, StatusCode::CREATED))
}

async fn moderate_comment(id: u64, request: ModerationRequest, actor: Actor, state: AppState) -> HandlerResult {
    let comment = state
        .content
        .set_comment_disabled(&actor, CommentId(id), request.disabled)
        .await
        .map_err(reject)?;
    Ok(json_reply(&comment, StatusCode::OK))
}

async fn follow(username: String, actor: Actor, state: AppState) -> HandlerResult {
    let changed = state.content.follow(&actor, &username).await.map_err(reject)?;
    Ok(json_reply(&FollowResponse { following: true, changed }, StatusCode::OK))
}

async fn unfollow(username: String, actor: Actor, state: AppState) -> HandlerResult {
    let changed = state.content.unfollow(&actor, &username).await.map_err(reject)?;
    Ok(json_reply(&FollowResponse { following: false, changed }, StatusCode::OK))
}

pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let user_route = warp::path!("api" / "v1" / "users" / u64)
        .and(warp::get())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(get_user);

    let user_posts_route = warp::path!("api" / "v1" / "users" / u64 / "posts")
        .and(warp::get())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(user_posts);

    let create_post_route = warp::path!("api" / "v1" / "posts")
        .and(warp::post())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(create_post);

    let edit_post_route = warp::path!("api" / "v1" / "posts" / u64)
        .and(warp::put())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(edit_post);

    let comments_route = warp::path!("api" / "v1" / "posts" / u64 / "comments")
        .and(warp::get())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(post_comments);

    let add_comment_route = warp::path!("api" / "v1" / "posts" / u64 / "comments")
        .and(warp::post())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(add_comment);

    let moderation_route = warp::path!("api" / "v1" / "comments" / u64 / "moderation")
        .and(warp::put())
        .and(json_body())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(moderate_comment);

    let follow_route = warp::path!("api" / "v1" / "users" / String / "follow")
        .and(warp::post())
        .and(with_actor(state.clone()))
        .and(with_state(state.clone()))
        .and_then(follow);

    let unfollow_route = warp::path!("api" / "v1" / "users" / String / "follow")
        .and(warp::delete())
        .and(with_actor(state.clone()))
        .and(with_state(state))
        .and_then(unfollow);

    user_route
        .or(user_posts_route)
        .or(create_post_route)
        .or(edit_post_route)
        .or(comments_route)
        .or(add_comment_route)
        .or(moderation_route)
        .or(follow_route)
        .or(unfollow_route)
}
