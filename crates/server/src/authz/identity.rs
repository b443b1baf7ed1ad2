use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::SqliteExecutor;

use crate::{
    db::models::{Id, UserSummary},
    error::{AppError, Result},
};

pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "member";

/// Global capabilities, checked by exact name against the effective set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ManageProjects,
    ManageTasks,
    ManageComments,
    ManageTags,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageProjects => "manage_projects",
            Permission::ManageTasks => "manage_tasks",
            Permission::ManageComments => "manage_comments",
            Permission::ManageTags => "manage_tags",
        }
    }
}

/// The authenticated actor together with everything it is allowed to do globally.
///
/// `permissions` is the effective set: the union of what every assigned role
/// grants and what was granted to the user directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    #[serde(flatten)]
    pub user: UserSummary,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
}

impl Identity {
    pub fn new(user: UserSummary) -> Self {
        Self {
            user,
            roles: BTreeSet::new(),
            permissions: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> Id {
        self.user.id
    }

    /// Adds a role and everything it grants.
    pub fn with_role<I, S>(mut self, role: &str, grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(role.to_string());
        self.permissions.extend(grants.into_iter().map(Into::into));
        self
    }

    pub fn with_permission(mut self, permission: &str) -> Self {
        self.permissions.insert(permission.to_string());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.has_permission(permission.as_str())
    }

    pub fn permissions(&self) -> impl Iterator<Item = &str> {
        self.permissions.iter().map(String::as_str)
    }

    /// Loads a user with its roles, role grants and direct grants.
    pub async fn load(pool: &sqlx::SqlitePool, user_id: Id) -> Result<Self> {
        let user = sqlx::query_as::<_, UserSummary>("SELECT id, name, email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let role_grants = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            SELECT r.name, p.name
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            LEFT JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let direct = sqlx::query_scalar::<_, String>(
            r#"
            SELECT p.name
            FROM user_permissions up
            JOIN permissions p ON p.id = up.permission_id
            WHERE up.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut identity = Identity::new(user);
        for (role, permission) in role_grants {
            identity = identity.with_role(&role, permission);
        }
        for permission in direct {
            identity = identity.with_permission(&permission);
        }

        Ok(identity)
    }
}

/// Assigns a global role by name. Returns false when no such role is seeded.
pub async fn assign_role<'e, E>(executor: E, user_id: Id, role: &str) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_roles (user_id, role_id) SELECT ?, id FROM roles WHERE name = ?",
    )
    .bind(user_id)
    .bind(role)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Grants a permission directly to a user, outside of any role.
pub async fn grant_permission<'e, E>(executor: E, user_id: Id, permission: &str) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        "INSERT OR IGNORE INTO user_permissions (user_id, permission_id) SELECT ?, id FROM permissions WHERE name = ?",
    )
    .bind(user_id)
    .bind(permission)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Id) -> UserSummary {
        UserSummary {
            id,
            name: format!("user{id}"),
            email: format!("user{id}@example.com"),
        }
    }

    #[test]
    fn effective_permissions_are_union_of_roles_and_direct_grants() {
        let identity = Identity::new(user(1))
            .with_role("member", ["manage_tasks", "manage_comments"])
            .with_permission("manage_tags");

        assert!(identity.can(Permission::ManageTasks));
        assert!(identity.can(Permission::ManageComments));
        assert!(identity.can(Permission::ManageTags));
        assert!(!identity.can(Permission::ManageProjects));
        assert!(identity.has_role("member"));
        assert!(!identity.has_role(ADMIN_ROLE));
    }

    #[test]
    fn absent_grants_yield_false() {
        let identity = Identity::new(user(2));
        assert!(!identity.has_permission("manage_projects"));
        assert!(!identity.has_permission(""));
        assert!(!identity.has_role("admin"));
        assert_eq!(identity.permissions().count(), 0);
    }

    #[test]
    fn role_without_grants_still_counts_as_role() {
        let identity = Identity::new(user(3)).with_role("auditor", Vec::<String>::new());
        assert!(identity.has_role("auditor"));
        assert_eq!(identity.permissions().count(), 0);
    }
}
