//! Posts, comments and the follow graph

use chrono::Utc;
use std::sync::Arc;

use crate::auth::guard::{Actor, IdentityGuard};
use crate::auth::permission::Permission;
use crate::auth::user::{User, UserId};
use crate::error::{BlogError, Result};
use crate::security::{contains_xss_patterns, render_comment_markdown, render_markdown};
use crate::security_logger::SecurityLogger;
use crate::services::{authorize_logged, require_confirmed_logged};
use crate::storage::{CommentId, FollowRecord, PostId, StorageProvider, StoredComment, StoredPost};

const MAX_BODY_LENGTH: usize = 64 * 1024;

pub struct ContentService {
    storage: Arc<dyn StorageProvider>,
    guard: IdentityGuard,
    security: Arc<SecurityLogger>,
}

impl ContentService {
    pub fn new(storage: Arc<dyn StorageProvider>, guard: IdentityGuard, security: Arc<SecurityLogger>) -> Self {
        Self {
            storage,
            guard,
            security,
        }
    }

    pub fn guard(&self) -> &IdentityGuard {
        &self.guard
    }

    async fn authorize<'a>(&self, actor: &'a Actor, endpoint: &str, permission: Permission) -> Result<&'a User> {
        authorize_logged(&self.guard, &self.security, actor, endpoint, permission).await?;
        self.guard.require_authenticated(actor)
    }

    pub async fn create_post(&self, actor: &Actor, body: &str) -> Result<StoredPost> {
        let author = self.authorize(actor, "api.create_post", Permission::WRITE_ARTICLES).await?;
        let body = validate_body(body)?;

        let mut post = StoredPost {
            id: PostId(0),
            author_id: author.id,
            body_html: render_markdown(&body),
            body,
            timestamp: Utc::now(),
        };
        post.id = self.storage.post_storage().create_post(post.clone()).await?;
        log::debug!("User {} created post {}", author.id, post.id);
        Ok(post)
    }

    /// Replace a post body; only its author or an administrator may edit
    pub async fn edit_post(&self, actor: &Actor, post_id: PostId, body: &str) -> Result<StoredPost> {
        let editor = self.authorize(actor, "api.edit_post", Permission::NONE).await?;
        let mut post = self.get_post(post_id).await?;

        if post.author_id != editor.id && !actor.is_administrator() {
            authorize_logged(&self.guard, &self.security, actor, "api.edit_post", Permission::ADMINISTER).await?;
        }

        let body = validate_body(body)?;
        post.body_html = render_markdown(&body);
        post.body = body;
        self.storage.post_storage().update_post(post.clone()).await?;
        Ok(post)
    }

    pub async fn get_post(&self, post_id: PostId) -> Result<StoredPost> {
        self.storage
            .post_storage()
            .get_post(post_id)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("Post {} not found", post_id)))
    }

    /// Read access for `endpoint`: open to anonymous callers, closed to
    /// unconfirmed accounts
    pub async fn require_reader(&self, actor: &Actor, endpoint: &str) -> Result<()> {
        require_confirmed_logged(&self.guard, &self.security, actor, endpoint).await
    }

    /// Posts of an author, newest first
    pub async fn posts_by(&self, actor: &Actor, author_id: UserId) -> Result<Vec<StoredPost>> {
        self.require_reader(actor, "api.user_posts").await?;
        self.storage.post_storage().get_posts_by_author(author_id).await
    }

    pub async fn add_comment(&self, actor: &Actor, post_id: PostId, body: &str) -> Result<StoredComment> {
        let author = self.authorize(actor, "api.add_comment", Permission::COMMENT).await?;
        let body = validate_body(body)?;
        self.get_post(post_id).await?;

        let mut comment = StoredComment {
            id: CommentId(0),
            post_id,
            author_id: author.id,
            body_html: render_comment_markdown(&body),
            body,
            timestamp: Utc::now(),
            disabled: false,
        };
        comment.id = self.storage.comment_storage().create_comment(comment.clone()).await?;
        Ok(comment)
    }

    /// Hide or restore a comment
    pub async fn set_comment_disabled(
        &self,
        actor: &Actor,
        comment_id: CommentId,
        disabled: bool,
    ) -> Result<StoredComment> {
        let moderator = self
            .authorize(actor, "api.moderate", Permission::MODERATE_COMMENTS)
            .await?;

        let mut comment = self
            .storage
            .comment_storage()
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("Comment {} not found", comment_id)))?;

        if comment.disabled != disabled {
            comment.disabled = disabled;
            self.storage.comment_storage().update_comment(comment.clone()).await?;
            log::info!(
                "Comment {} {} by user {}",
                comment_id,
                if disabled { "disabled" } else { "enabled" },
                moderator.id
            );
        }
        Ok(comment)
    }

    /// Comments on an existing post; disabled ones only for moderators
    pub async fn post_comments(&self, actor: &Actor, post_id: PostId) -> Result<Vec<StoredComment>> {
        self.require_reader(actor, "api.post_comments").await?;
        self.get_post(post_id).await?;
        let show_disabled = self.guard.can(actor, Permission::MODERATE_COMMENTS);
        let comments = self.storage.comment_storage().get_post_comments(post_id).await?;
        Ok(comments
            .into_iter()
            .filter(|c| show_disabled || !c.disabled)
            .collect())
    }

    /// Follow `username`; returns false if already following
    pub async fn follow(&self, actor: &Actor, username: &str) -> Result<bool> {
        let follower = self.authorize(actor, "api.follow", Permission::FOLLOW).await?;
        let target = self.user_by_name(username).await?;
        if target.id == follower.id {
            return Err(BlogError::ValidationError("You cannot follow yourself".to_string()));
        }
        self.storage.follow_storage().follow(follower.id, target.id).await
    }

    /// Unfollow `username`; returns false if not following
    pub async fn unfollow(&self, actor: &Actor, username: &str) -> Result<bool> {
        let follower = self.authorize(actor, "api.unfollow", Permission::FOLLOW).await?;
        let target = self.user_by_name(username).await?;
        self.storage.follow_storage().unfollow(follower.id, target.id).await
    }

    pub async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.storage.follow_storage().is_following(follower, followed).await
    }

    pub async fn is_followed_by(&self, followed: UserId, follower: UserId) -> Result<bool> {
        self.is_following(follower, followed).await
    }

    pub async fn followers(&self, user_id: UserId) -> Result<Vec<FollowRecord>> {
        self.storage.follow_storage().followers(user_id).await
    }

    pub async fn followed(&self, user_id: UserId) -> Result<Vec<FollowRecord>> {
        self.storage.follow_storage().followed(user_id).await
    }

    async fn user_by_name(&self, username: &str) -> Result<User> {
        self.storage
            .user_storage()
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| BlogError::NotFound(format!("User {} not found", username)))
    }
}

fn validate_body(body: &str) -> Result<String> {
    let body = body.trim();
    if body.is_empty() {
        return Err(BlogError::ValidationError("Body must not be empty".to_string()));
    }
    if body.len() > MAX_BODY_LENGTH {
        return Err(BlogError::ValidationError("Body is too long".to_string()));
    }
    if contains_xss_patterns(body) {
        // Stripped by the sanitizer, so this is only worth a note
        log::debug!("Body contains script-like markup");
    }
    Ok(body.to_string())
}
