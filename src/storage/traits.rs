//! Abstract storage interfaces for pluggable backends
//!
//! This module defines traits for the record store behind the service:
//! roles, users, follow relations, posts and comments. Implementations
//! must enforce email and username uniqueness themselves; application
//! level pre-checks are only a fast path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::auth::password::PasswordDigest;
use crate::auth::permission::{Role, RoleId};
use crate::auth::user::{User, UserId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Follow relation between two users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowRecord {
    pub follower_id: UserId,
    pub followed_id: UserId,
    pub timestamp: DateTime<Utc>,
}

/// Blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPost {
    pub id: PostId,
    pub author_id: UserId,
    pub body: String,
    /// Cleaned HTML rendering of the markdown `body`, refreshed on every body change
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
}

/// Comment on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredComment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub body: String,
    pub body_html: String,
    pub timestamp: DateTime<Utc>,
    /// Hidden by a moderator
    pub disabled: bool,
}

/// Role storage interface
#[async_trait]
pub trait RoleStorage: Send + Sync {
    /// Create a new role; names are unique
    async fn create_role(&self, role: Role) -> Result<RoleId>;

    /// Get role by ID
    async fn get_role(&self, role_id: RoleId) -> Result<Option<Role>>;

    /// Get role by name
    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>>;

    /// Get the role flagged as default, if any
    async fn get_default_role(&self) -> Result<Option<Role>>;

    /// Replace the stored permissions and default flag of a role
    async fn update_role(&self, role: Role) -> Result<()>;

}

/// User data storage interface
#[async_trait]
pub trait UserStorage: Send + Sync {
    /// Create a new user and return its assigned ID.
    /// Fails with `EmailConflict` or `UsernameTaken` on duplicates.
    async fn create_user(&self, user: User) -> Result<UserId>;

    /// Get user by ID
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;

    /// Get user by username
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // Single-field writes. Each applies to the current stored record, so
    // concurrent changes to different fields of one user all survive.

    /// Mark the account confirmed; returns false if it already was
    async fn set_confirmed(&self, user_id: UserId) -> Result<bool>;

    /// Replace the password digest
    async fn set_password(&self, user_id: UserId, password: PasswordDigest) -> Result<()>;

    /// Move the account to a new email; fails with `EmailConflict` if
    /// another user holds it
    async fn set_email(&self, user_id: UserId, email: &str) -> Result<()>;

    async fn set_role(&self, user_id: UserId, role_id: RoleId) -> Result<()>;

    /// Update user's last seen timestamp
    async fn update_last_seen(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()>;
}

/// Follow graph storage interface
#[async_trait]
pub trait FollowStorage: Send + Sync {
    /// Record a follow; returns false if it already existed
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<bool>;

    /// Remove a follow; returns false if there was none
    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<bool>;

    async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool>;

    /// Relations where `user_id` is followed
    async fn followers(&self, user_id: UserId) -> Result<Vec<FollowRecord>>;

    /// Relations where `user_id` is the follower
    async fn followed(&self, user_id: UserId) -> Result<Vec<FollowRecord>>;
}

/// Post storage interface
#[async_trait]
pub trait PostStorage: Send + Sync {
    async fn create_post(&self, post: StoredPost) -> Result<PostId>;

    async fn get_post(&self, post_id: PostId) -> Result<Option<StoredPost>>;

    async fn update_post(&self, post: StoredPost) -> Result<()>;

    /// Posts by an author, newest first
    async fn get_posts_by_author(&self, author_id: UserId) -> Result<Vec<StoredPost>>;
}

/// Comment storage interface
#[async_trait]
pub trait CommentStorage: Send + Sync {
    async fn create_comment(&self, comment: StoredComment) -> Result<CommentId>;

    async fn get_comment(&self, comment_id: CommentId) -> Result<Option<StoredComment>>;

    async fn update_comment(&self, comment: StoredComment) -> Result<()>;

    /// Comments on a post, oldest first
    async fn get_post_comments(&self, post_id: PostId) -> Result<Vec<StoredComment>>;
}

/// Combined storage provider interface
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn role_storage(&self) -> &dyn RoleStorage;

    fn user_storage(&self) -> &dyn UserStorage;

    fn follow_storage(&self) -> &dyn FollowStorage;

    fn post_storage(&self) -> &dyn PostStorage;

    fn comment_storage(&self) -> &dyn CommentStorage;

    /// Initialize the storage backend (create tables, etc.)
    async fn initialize(&self) -> Result<()>;

    /// Health check for the storage backend
    async fn health_check(&self) -> Result<bool>;
}
