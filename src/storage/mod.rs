//! Persistence collaborators for roles, users and blog content

pub mod memory;
pub mod traits;

// Re-export the storage interfaces and the in-memory backend
pub use memory::MemoryStorageProvider;
pub use traits::{
    CommentId, CommentStorage, FollowRecord, FollowStorage, PostId, PostStorage, RoleStorage,
    StorageProvider, StoredComment, StoredPost, UserStorage,
};
