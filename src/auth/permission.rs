use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use crate::constants::{ROLE_ADMINISTRATOR, ROLE_MODERATOR, ROLE_USER};

/// Set of capabilities, one bit per capability.
///
/// Single flags are combined with `|`; a check succeeds only when every
/// requested bit is granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(u32);

impl Permission {
    pub const NONE: Permission = Permission(0);
    pub const FOLLOW: Permission = Permission(0x01);
    pub const COMMENT: Permission = Permission(0x02);
    pub const WRITE_ARTICLES: Permission = Permission(0x04);
    pub const MODERATE_COMMENTS: Permission = Permission(0x08);
    pub const ADMINISTER: Permission = Permission(0x80);
    /// Every bit an administrator holds, including unassigned ones
    pub const ALL: Permission = Permission(0xff);

    const NAMED: [(Permission, &'static str); 5] = [
        (Permission::FOLLOW, "FOLLOW"),
        (Permission::COMMENT, "COMMENT"),
        (Permission::WRITE_ARTICLES, "WRITE_ARTICLES"),
        (Permission::MODERATE_COMMENTS, "MODERATE_COMMENTS"),
        (Permission::ADMINISTER, "ADMINISTER"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Permission(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True iff every bit of `required` is set in `self`
    pub const fn contains(self, required: Permission) -> bool {
        self.0 & required.0 == required.0
    }

    /// Names of the named flags present in this set
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permission {
    type Output = Permission;

    fn bitand(self, rhs: Permission) -> Permission {
        Permission(self.0 & rhs.0)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names = self.names();
        if names.is_empty() {
            write!(f, "{:#04x}", self.0)
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Storage identifier of a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named permission bitmask assigned to users
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: Permission,
    /// Assigned to new users when no other rule applies
    pub default: bool,
}

impl Role {
    pub fn new(id: RoleId, name: impl Into<String>, permissions: Permission, default: bool) -> Self {
        Self {
            id,
            name: name.into(),
            permissions,
            default,
        }
    }

    /// Check if this role grants every requested permission
    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(permission)
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMINISTER)
    }
}

/// Permission check against a role that may be missing; a missing role denies
pub fn can_role(role: Option<&Role>, permission: Permission) -> bool {
    role.map_or(false, |role| role.can(permission))
}

/// One entry of the built-in role catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: &'static str,
    pub permissions: Permission,
    pub default: bool,
}

/// Built-in roles. Reseeding makes stored roles match this table exactly.
pub const ROLE_CATALOG: [RoleSpec; 3] = [
    RoleSpec {
        name: ROLE_USER,
        permissions: Permission::from_bits(
            Permission::FOLLOW.bits() | Permission::COMMENT.bits() | Permission::WRITE_ARTICLES.bits(),
        ),
        default: true,
    },
    RoleSpec {
        name: ROLE_MODERATOR,
        permissions: Permission::from_bits(
            Permission::FOLLOW.bits()
                | Permission::COMMENT.bits()
                | Permission::WRITE_ARTICLES.bits()
                | Permission::MODERATE_COMMENTS.bits(),
        ),
        default: false,
    },
    RoleSpec {
        name: ROLE_ADMINISTRATOR,
        permissions: Permission::ALL,
        default: false,
    },
];
