//! Resolution of polymorphic "project or task" references.
//!
//! Comments and attachments store only a kind and an id. Everything that needs
//! to know which project such a record rolls up to goes through [`resolve`].

use serde::Serialize;

use crate::{
    db::{
        lookup,
        models::{Attachment, Comment, Id, Project, TargetKind, Task},
    },
    error::{AppError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "on", content = "id", rename_all = "lowercase")]
pub enum Target {
    Project(Id),
    Task(Id),
}

impl Target {
    /// Parses a client-supplied kind. Anything outside the closed set is
    /// rejected here, before any lookup happens.
    pub fn parse(kind: &str, id: Id) -> Result<Self> {
        match kind {
            "project" => Ok(Target::Project(id)),
            "task" => Ok(Target::Task(id)),
            other => Err(AppError::InvalidTarget(format!(
                "'{other}' is not a valid target, expected 'project' or 'task'"
            ))),
        }
    }

    pub fn from_stored(kind: TargetKind, id: Id) -> Self {
        match kind {
            TargetKind::Project => Target::Project(id),
            TargetKind::Task => Target::Task(id),
        }
    }

    pub fn kind(&self) -> TargetKind {
        match self {
            Target::Project(_) => TargetKind::Project,
            Target::Task(_) => TargetKind::Task,
        }
    }

    pub fn id(&self) -> Id {
        match self {
            Target::Project(id) | Target::Task(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TargetEntity {
    Project(Project),
    Task(Task),
}

/// A loaded target and the project it belongs to. For a project target both
/// are the same record.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub entity: TargetEntity,
    pub project: Project,
}

pub async fn resolve(pool: &sqlx::SqlitePool, target: Target) -> Result<Resolved> {
    match target {
        Target::Project(id) => {
            let project = lookup::project(pool, id).await?;
            Ok(Resolved {
                entity: TargetEntity::Project(project.clone()),
                project,
            })
        }
        Target::Task(id) => {
            let task = lookup::task(pool, id).await?;
            let project = lookup::project(pool, task.project_id).await?;
            Ok(Resolved {
                entity: TargetEntity::Task(task),
                project,
            })
        }
    }
}

/// Parses and resolves in one step, as the route layer receives it.
pub async fn resolve_kind(pool: &sqlx::SqlitePool, kind: &str, id: Id) -> Result<Resolved> {
    let target = Target::parse(kind, id)?;
    resolve(pool, target).await
}

/// Records attached to a project or a task.
pub trait Polymorphic {
    fn target(&self) -> Target;
}

impl Polymorphic for Comment {
    fn target(&self) -> Target {
        Target::from_stored(self.target_type, self.target_id)
    }
}

impl Polymorphic for Attachment {
    fn target(&self) -> Target {
        Target::from_stored(self.target_type, self.target_id)
    }
}

/// Re-derives the owning project of a stored polymorphic record.
pub async fn resolve_owning_project<R: Polymorphic>(
    pool: &sqlx::SqlitePool,
    record: &R,
) -> Result<Project> {
    Ok(resolve(pool, record.target()).await?.project)
}
