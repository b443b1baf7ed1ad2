//! The authorization table. Every gate in the services goes through
//! [`evaluate`], so the rules live in exactly one place.

use crate::{
    authz::{
        identity::{Identity, Permission, ADMIN_ROLE},
        membership::ProjectAccess,
    },
    db::models::Id,
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ViewProject(ProjectAccess),
    /// Create, update, delete or restore a project.
    ManageProject,
    ManageMembers,
    ViewTask(ProjectAccess),
    /// Create, update, delete or restore a task.
    ManageTask,
    UpdateTaskStatus { assignee_id: Option<Id> },
    CreateComment(ProjectAccess),
    UpdateComment { access: ProjectAccess, author_id: Id },
    DeleteComment(ProjectAccess),
    CreateAttachment(ProjectAccess),
    DeleteAttachment(ProjectAccess),
    /// Create, update or delete a tag.
    ManageTag,
    /// Assign a tag to, or remove it from, a task.
    AssignTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    Allow,
    Forbidden,
}

impl Decision {
    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Decision::Allow
        } else {
            Decision::Forbidden
        }
    }

    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

pub fn evaluate(actor: &Identity, action: Action) -> Decision {
    let allowed = match action {
        Action::ViewProject(access) | Action::ViewTask(access) => access.is_member(),
        Action::ManageProject | Action::ManageMembers => actor.can(Permission::ManageProjects),
        Action::ManageTask => actor.can(Permission::ManageTasks),
        Action::UpdateTaskStatus { assignee_id } => {
            actor.can(Permission::ManageTasks) || assignee_id == Some(actor.id())
        }
        Action::CreateComment(access) | Action::CreateAttachment(access) => access.is_member(),
        Action::UpdateComment { access, author_id } => {
            access.is_member()
                && (author_id == actor.id()
                    || access.is_manager_or_owner()
                    || actor.can(Permission::ManageComments))
        }
        Action::DeleteComment(access) => {
            access.is_manager_or_owner()
                || actor.has_role(ADMIN_ROLE)
                || actor.can(Permission::ManageComments)
        }
        // Checks manage_projects, not manage_comments, unlike comment deletion.
        Action::DeleteAttachment(access) => {
            access.is_manager_or_owner()
                || actor.has_role(ADMIN_ROLE)
                || actor.can(Permission::ManageProjects)
        }
        Action::ManageTag => actor.can(Permission::ManageTags),
        Action::AssignTag => actor.can(Permission::ManageTasks) || actor.can(Permission::ManageTags),
    };

    Decision::from_bool(allowed)
}

/// Evaluates the action and turns a denial into `AppError::Forbidden`.
pub fn authorize(actor: &Identity, action: Action) -> Result<()> {
    match evaluate(actor, action) {
        Decision::Allow => Ok(()),
        Decision::Forbidden => {
            tracing::debug!(actor_id = actor.id(), ?action, "authorization denied");
            Err(AppError::Forbidden(denial_message(action).to_string()))
        }
    }
}

fn denial_message(action: Action) -> &'static str {
    match action {
        Action::ViewProject(_) | Action::ViewTask(_) => "Forbidden",
        Action::CreateComment(_) | Action::CreateAttachment(_) => "Not a member of this project",
        Action::UpdateComment { .. } => "Cannot update this comment",
        Action::DeleteComment(_) => "Cannot delete this comment",
        Action::DeleteAttachment(_) => "Cannot delete this attachment",
        Action::UpdateTaskStatus { .. } => "Only the assignee or a task manager can change status",
        Action::ManageProject
        | Action::ManageMembers
        | Action::ManageTask
        | Action::ManageTag
        | Action::AssignTag => "Insufficient permissions",
    }
}
