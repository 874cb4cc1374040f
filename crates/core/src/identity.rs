//! Caller identity as produced by token verification

use serde::{Deserialize, Serialize};

/// Role attached to a verified identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

/// Identity of the connected user
///
/// Immutable for the lifetime of a connection once verified. Anonymous
/// connections carry a placeholder identity until an `auth` or `user_info`
/// frame upgrades it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id
    pub user_id: String,
    /// Role (`user` | `admin`)
    pub role: Role,
}

impl Identity {
    /// Create a verified identity
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    /// Placeholder identity for unauthenticated connections
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            role: Role::User,
        }
    }

    /// Is this the anonymous placeholder?
    pub fn is_anonymous(&self) -> bool {
        self.user_id == "anonymous"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert!(identity.is_anonymous());
        assert_eq!(identity.role, Role::User);
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }
}
