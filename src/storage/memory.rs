//! In-memory storage implementation for development and testing
//!
//! This provides a complete storage implementation that keeps all data
//! in memory. Suitable for development, testing, or small deployments.
//! User writes take a single write lock covering the record and both
//! unique indexes, so concurrent writers cannot claim the same email.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::*;
use crate::auth::permission::{Role, RoleId};
use crate::auth::password::PasswordDigest;
use crate::auth::user::{normalize_email, User, UserId};
use crate::error::{BlogError, Result};

#[derive(Default)]
struct RoleTable {
    roles: HashMap<RoleId, Role>,
    next_id: u64,
}

#[derive(Default)]
struct UserTable {
    users: HashMap<UserId, User>,
    emails: HashMap<String, UserId>,    // email -> user_id
    usernames: HashMap<String, UserId>, // username -> user_id
    next_id: u64,
}

impl UserTable {
    fn user_mut(&mut self, user_id: UserId) -> Result<&mut User> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| BlogError::NotFound(format!("User {} not found", user_id)))
    }
}

/// In-memory combined storage provider
pub struct MemoryStorageProvider {
    roles: Arc<RwLock<RoleTable>>,
    users: Arc<RwLock<UserTable>>,
    follows: Arc<RwLock<HashMap<(UserId, UserId), FollowRecord>>>, // (follower, followed) -> record
    posts: Arc<RwLock<HashMap<PostId, StoredPost>>>,
    comments: Arc<RwLock<HashMap<CommentId, StoredComment>>>,
    next_post_id: AtomicU64,
    next_comment_id: AtomicU64,
}

impl MemoryStorageProvider {
    pub fn new() -> Self {
        Self {
            roles: Arc::new(RwLock::new(RoleTable::default())),
            users: Arc::new(RwLock::new(UserTable::default())),
            follows: Arc::new(RwLock::new(HashMap::new())),
            posts: Arc::new(RwLock::new(HashMap::new())),
            comments: Arc::new(RwLock::new(HashMap::new())),
            next_post_id: AtomicU64::new(1),
            next_comment_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryStorageProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorageProvider {
    fn role_storage(&self) -> &dyn RoleStorage {
        self
    }

    fn user_storage(&self) -> &dyn UserStorage {
        self
    }

    fn follow_storage(&self) -> &dyn FollowStorage {
        self
    }

    fn post_storage(&self) -> &dyn PostStorage {
        self
    }

    fn comment_storage(&self) -> &dyn CommentStorage {
        self
    }

    async fn initialize(&self) -> Result<()> {
        // Nothing to initialize for memory storage
        log::info!("Memory storage provider initialized");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        // Memory storage is always healthy
        Ok(true)
    }
}

#[async_trait]
impl RoleStorage for MemoryStorageProvider {
    async fn create_role(&self, mut role: Role) -> Result<RoleId> {
        let mut table = self.roles.write().await;

        if table.roles.values().any(|r| r.name == role.name) {
            return Err(BlogError::StorageError(format!("Role {} already exists", role.name)));
        }

        table.next_id += 1;
        let id = RoleId(table.next_id);
        role.id = id;
        table.roles.insert(id, role);
        Ok(id)
    }

    async fn get_role(&self, role_id: RoleId) -> Result<Option<Role>> {
        let table = self.roles.read().await;
        Ok(table.roles.get(&role_id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        let table = self.roles.read().await;
        Ok(table.roles.values().find(|r| r.name == name).cloned())
    }

    async fn get_default_role(&self) -> Result<Option<Role>> {
        let table = self.roles.read().await;
        Ok(table
            .roles
            .values()
            .filter(|r| r.default)
            .min_by_key(|r| r.id)
            .cloned())
    }

    async fn update_role(&self, role: Role) -> Result<()> {
        let mut table = self.roles.write().await;

        if table.roles.values().any(|r| r.name == role.name && r.id != role.id) {
            return Err(BlogError::StorageError(format!("Role {} already exists", role.name)));
        }

        match table.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role;
                Ok(())
            }
            None => Err(BlogError::NotFound(format!("Role {} not found", role.id))),
        }
    }

}

#[async_trait]
impl UserStorage for MemoryStorageProvider {
    async fn create_user(&self, mut user: User) -> Result<UserId> {
        let mut table = self.users.write().await;

        // Check for conflicts
        if table.emails.contains_key(user.email()) {
            return Err(BlogError::EmailConflict);
        }
        if table.usernames.contains_key(&user.username) {
            return Err(BlogError::UsernameTaken);
        }

        table.next_id += 1;
        let id = UserId(table.next_id);
        user.id = id;

        table.emails.insert(user.email().to_string(), id);
        table.usernames.insert(user.username.clone(), id);
        table.users.insert(id, user);

        Ok(id)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table.users.get(&user_id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let table = self.users.read().await;
        Ok(table
            .usernames
            .get(username)
            .and_then(|id| table.users.get(id))
            .cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let table = self.users.read().await;
        let email = normalize_email(email);
        Ok(table
            .emails
            .get(&email)
            .and_then(|id| table.users.get(id))
            .cloned())
    }

    async fn set_confirmed(&self, user_id: UserId) -> Result<bool> {
        let mut table = self.users.write().await;
        let user = table.user_mut(user_id)?;
        let changed = !user.confirmed;
        user.confirmed = true;
        Ok(changed)
    }

    async fn set_password(&self, user_id: UserId, password: PasswordDigest) -> Result<()> {
        let mut table = self.users.write().await;
        table.user_mut(user_id)?.replace_password(password);
        Ok(())
    }

    async fn set_email(&self, user_id: UserId, email: &str) -> Result<()> {
        let mut table = self.users.write().await;
        let email = normalize_email(email);

        match table.emails.get(&email) {
            Some(owner) if *owner == user_id => return Ok(()),
            Some(_) => return Err(BlogError::EmailConflict),
            None => {}
        }

        let user = table.user_mut(user_id)?;
        let old_email = user.email().to_string();
        user.set_email(&email);
        table.emails.remove(&old_email);
        table.emails.insert(email, user_id);
        Ok(())
    }

    async fn set_role(&self, user_id: UserId, role_id: RoleId) -> Result<()> {
        let mut table = self.users.write().await;
        table.user_mut(user_id)?.role_id = Some(role_id);
        Ok(())
    }

    async fn update_last_seen(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        let mut table = self.users.write().await;
        table.user_mut(user_id)?.last_seen = at;
        Ok(())
    }
}

#[async_trait]
impl FollowStorage for MemoryStorageProvider {
    async fn follow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let mut follows = self.follows.write().await;
        if follows.contains_key(&(follower, followed)) {
            return Ok(false);
        }
        follows.insert(
            (follower, followed),
            FollowRecord {
                follower_id: follower,
                followed_id: followed,
                timestamp: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn unfollow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let mut follows = self.follows.write().await;
        Ok(follows.remove(&(follower, followed)).is_some())
    }

    async fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        let follows = self.follows.read().await;
        Ok(follows.contains_key(&(follower, followed)))
    }

    async fn followers(&self, user_id: UserId) -> Result<Vec<FollowRecord>> {
        let follows = self.follows.read().await;
        let mut results: Vec<FollowRecord> = follows
            .values()
            .filter(|f| f.followed_id == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(results)
    }

    async fn followed(&self, user_id: UserId) -> Result<Vec<FollowRecord>> {
        let follows = self.follows.read().await;
        let mut results: Vec<FollowRecord> = follows
            .values()
            .filter(|f| f.follower_id == user_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(results)
    }
}

#[async_trait]
impl PostStorage for MemoryStorageProvider {
    async fn create_post(&self, mut post: StoredPost) -> Result<PostId> {
        let id = PostId(self.next_post_id.fetch_add(1, Ordering::SeqCst));
        post.id = id;
        self.posts.write().await.insert(id, post);
        Ok(id)
    }

    async fn get_post(&self, post_id: PostId) -> Result<Option<StoredPost>> {
        Ok(self.posts.read().await.get(&post_id).cloned())
    }

    async fn update_post(&self, post: StoredPost) -> Result<()> {
        let mut posts = self.posts.write().await;
        match posts.get_mut(&post.id) {
            Some(existing) => {
                *existing = post;
                Ok(())
            }
            None => Err(BlogError::NotFound(format!("Post {} not found", post.id))),
        }
    }

    async fn get_posts_by_author(&self, author_id: UserId) -> Result<Vec<StoredPost>> {
        let posts = self.posts.read().await;
        let mut results: Vec<StoredPost> = posts
            .values()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        Ok(results)
    }
}

#[async_trait]
impl CommentStorage for MemoryStorageProvider {
    async fn create_comment(&self, mut comment: StoredComment) -> Result<CommentId> {
        if !self.posts.read().await.contains_key(&comment.post_id) {
            return Err(BlogError::NotFound(format!("Post {} not found", comment.post_id)));
        }

        let id = CommentId(self.next_comment_id.fetch_add(1, Ordering::SeqCst));
        comment.id = id;
        self.comments.write().await.insert(id, comment);
        Ok(id)
    }

    async fn get_comment(&self, comment_id: CommentId) -> Result<Option<StoredComment>> {
        Ok(self.comments.read().await.get(&comment_id).cloned())
    }

    async fn update_comment(&self, comment: StoredComment) -> Result<()> {
        let mut comments = self.comments.write().await;
        match comments.get_mut(&comment.id) {
            Some(existing) => {
                *existing = comment;
                Ok(())
            }
            None => Err(BlogError::NotFound(format!("Comment {} not found", comment.id))),
        }
    }

    async fn get_post_comments(&self, post_id: PostId) -> Result<Vec<StoredComment>> {
        let comments = self.comments.read().await;
        let mut results: Vec<StoredComment> = comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::permission::Permission;

    fn user(email: &str, username: &str) -> User {
        User::new(email, username, PasswordDigest::new("storage-pass").unwrap())
    }

    #[tokio::test]
    async fn test_user_uniqueness_on_create() {
        let storage = MemoryStorageProvider::new();
        let id = storage.create_user(user("a@example.com", "alice")).await.unwrap();
        assert_eq!(id, UserId(1));

        assert!(matches!(
            storage.create_user(user("A@Example.com", "other")).await,
            Err(BlogError::EmailConflict)
        ));
        assert!(matches!(
            storage.create_user(user("b@example.com", "alice")).await,
            Err(BlogError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_field_writes_keep_other_fields() {
        let storage = MemoryStorageProvider::new();
        let id = storage.create_user(user("a@example.com", "alice")).await.unwrap();
        storage.create_user(user("b@example.com", "bob")).await.unwrap();

        // A stale copy read before the writes below
        let stale = storage.get_user(id).await.unwrap().unwrap();

        assert!(storage.set_confirmed(id).await.unwrap());
        assert!(!storage.set_confirmed(id).await.unwrap());
        storage
            .set_password(id, PasswordDigest::new("rotated-pass").unwrap())
            .await
            .unwrap();
        storage.set_role(id, RoleId(3)).await.unwrap();
        assert!(matches!(
            storage.set_email(id, "B@example.com").await,
            Err(BlogError::EmailConflict)
        ));
        storage.set_email(id, "c@example.com").await.unwrap();

        let current = storage.get_user(id).await.unwrap().unwrap();
        assert!(!stale.confirmed);
        assert!(current.confirmed);
        assert!(current.verify_password("rotated-pass"));
        assert_eq!(current.role_id, Some(RoleId(3)));
        assert_eq!(current.email(), "c@example.com");
        assert!(storage.get_user_by_email("a@example.com").await.unwrap().is_none());
        assert!(matches!(
            storage.set_confirmed(UserId(99)).await,
            Err(BlogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_roles_by_name_and_default() {
        let storage = MemoryStorageProvider::new();
        let user_role = storage
            .create_role(Role::new(RoleId(0), "User", Permission::FOLLOW, true))
            .await
            .unwrap();
        storage
            .create_role(Role::new(RoleId(0), "Administrator", Permission::ALL, false))
            .await
            .unwrap();

        assert_eq!(storage.get_default_role().await.unwrap().unwrap().id, user_role);
        assert!(storage.get_role_by_name("Administrator").await.unwrap().is_some());
        assert!(storage
            .create_role(Role::new(RoleId(0), "User", Permission::NONE, false))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_follow_is_idempotent() {
        let storage = MemoryStorageProvider::new();
        assert!(storage.follow(UserId(1), UserId(2)).await.unwrap());
        assert!(!storage.follow(UserId(1), UserId(2)).await.unwrap());
        assert!(storage.is_following(UserId(1), UserId(2)).await.unwrap());
        assert!(!storage.is_following(UserId(2), UserId(1)).await.unwrap());
        assert_eq!(storage.followers(UserId(2)).await.unwrap().len(), 1);
        assert!(storage.unfollow(UserId(1), UserId(2)).await.unwrap());
        assert!(!storage.unfollow(UserId(1), UserId(2)).await.unwrap());
    }

    #[tokio::test]
    async fn test_comment_requires_post() {
        let storage = MemoryStorageProvider::new();
        let comment = StoredComment {
            id: CommentId(0),
            post_id: PostId(99),
            author_id: UserId(1),
            body: "hi".to_string(),
            body_html: "<p>hi</p>".to_string(),
            timestamp: Utc::now(),
            disabled: false,
        };
        assert!(matches!(
            storage.create_comment(comment).await,
            Err(BlogError::NotFound(_))
        ));
    }
}
