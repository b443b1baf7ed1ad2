use chrono::Utc;
use serde::Serialize;
use sqlx::SqliteExecutor;

use crate::{
    db::models::{Id, MemberRole, Project, ProjectMember},
    error::Result,
};

/// What an actor is to one project: owner, a membership role, both, or nothing.
///
/// The owner is tracked on the project row, never as a membership row, so an
/// owner without a row has `role == None` yet still counts as a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectAccess {
    pub is_owner: bool,
    pub role: Option<MemberRole>,
}

impl ProjectAccess {
    pub const NONE: ProjectAccess = ProjectAccess {
        is_owner: false,
        role: None,
    };

    pub fn new(project: &Project, user_id: Id, role: Option<MemberRole>) -> Self {
        Self {
            is_owner: project.owner_id == user_id,
            role,
        }
    }

    pub fn is_member(&self) -> bool {
        self.is_owner || self.role.is_some()
    }

    pub fn role_in_project(&self) -> Option<MemberRole> {
        self.role
    }

    pub fn is_manager_or_owner(&self) -> bool {
        self.is_owner || self.role == Some(MemberRole::ProjectManager)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MemberSummary {
    pub user_id: Id,
    pub name: String,
    pub email: String,
    pub role: MemberRole,
}

pub async fn role_in_project<'e, E>(executor: E, project_id: Id, user_id: Id) -> Result<Option<MemberRole>>
where
    E: SqliteExecutor<'e>,
{
    let role = sqlx::query_scalar::<_, MemberRole>(
        "SELECT role FROM project_members WHERE project_id = ? AND user_id = ?",
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(role)
}

pub async fn access<'e, E>(executor: E, project: &Project, user_id: Id) -> Result<ProjectAccess>
where
    E: SqliteExecutor<'e>,
{
    let role = role_in_project(executor, project.id, user_id).await?;
    Ok(ProjectAccess::new(project, user_id, role))
}

pub async fn is_member<'e, E>(executor: E, project: &Project, user_id: Id) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    if project.owner_id == user_id {
        return Ok(true);
    }
    Ok(role_in_project(executor, project.id, user_id).await?.is_some())
}

pub async fn is_manager_or_owner<'e, E>(executor: E, project: &Project, user_id: Id) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    Ok(access(executor, project, user_id).await?.is_manager_or_owner())
}

/// Upserts the membership row: an existing row has its role overwritten.
pub async fn add_member<'e, E>(
    executor: E,
    project_id: Id,
    user_id: Id,
    role: MemberRole,
) -> Result<ProjectMember>
where
    E: SqliteExecutor<'e>,
{
    let now = Utc::now();

    let member = sqlx::query_as::<_, ProjectMember>(
        r#"
        INSERT INTO project_members (project_id, user_id, role, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (project_id, user_id) DO UPDATE SET role = excluded.role, updated_at = excluded.updated_at
        RETURNING project_id, user_id, role, created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .bind(role)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await?;

    Ok(member)
}

/// Deletes the membership row. Returns whether a row existed.
pub async fn remove_member<'e, E>(executor: E, project_id: Id, user_id: Id) -> Result<bool>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("DELETE FROM project_members WHERE project_id = ? AND user_id = ?")
        .bind(project_id)
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_members<'e, E>(executor: E, project_id: Id) -> Result<Vec<MemberSummary>>
where
    E: SqliteExecutor<'e>,
{
    let members = sqlx::query_as::<_, MemberSummary>(
        r#"
        SELECT u.id AS user_id, u.name, u.email, pm.role
        FROM project_members pm
        JOIN users u ON pm.user_id = u.id
        WHERE pm.project_id = ?
        ORDER BY u.name ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(executor)
    .await?;

    Ok(members)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::db::models::ProjectStatus;

    fn project(owner_id: Id) -> Project {
        Project {
            id: 10,
            name: "Apollo".to_string(),
            description: None,
            status: ProjectStatus::Active,
            starts_at: None,
            ends_at: None,
            owner_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn owner_is_member_without_row() {
        let access = ProjectAccess::new(&project(1), 1, None);
        assert!(access.is_member());
        assert!(access.is_manager_or_owner());
        assert_eq!(access.role_in_project(), None);
    }

    #[test]
    fn authority_ordering() {
        let p = project(1);
        let manager = ProjectAccess::new(&p, 2, Some(MemberRole::ProjectManager));
        let member = ProjectAccess::new(&p, 3, Some(MemberRole::Member));
        let outsider = ProjectAccess::new(&p, 4, None);

        assert!(manager.is_member() && manager.is_manager_or_owner());
        assert!(member.is_member() && !member.is_manager_or_owner());
        assert!(!outsider.is_member() && !outsider.is_manager_or_owner());
        assert_eq!(outsider, ProjectAccess::NONE);
    }
}
