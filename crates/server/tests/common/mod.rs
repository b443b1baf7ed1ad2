#![allow(dead_code)]

use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use taskboard_server::{
    authz::{identity, Identity},
    config::Config,
    db::{
        models::{Id, MemberRole, TaskStatus},
        Database,
    },
    services::{
        cache::ListCache,
        notify::{Notifier, TaskAssigned},
        storage::StorageService,
    },
    AppState,
};

pub struct TestApp {
    pub state: AppState,
    pub notifications: mpsc::Receiver<TaskAssigned>,
    pub storage_dir: TempDir,
}

pub fn test_config(storage_path: &str) -> Config {
    Config {
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        storage_path: storage_path.to_string(),
        jwt_secret: "test-secret".to_string(),
        list_cache_ttl_secs: 60,
        notify_queue_capacity: 16,
    }
}

pub async fn setup() -> TestApp {
    let storage_dir = tempfile::tempdir().unwrap();
    let config = test_config(&storage_dir.path().to_string_lossy());

    let db = Database::connect(&config.database_url).await.unwrap();
    db.run_migrations().await.unwrap();

    let storage = StorageService::new(storage_dir.path());
    storage.init().await.unwrap();

    let (notifier, notifications) = Notifier::channel(config.notify_queue_capacity);

    let state = AppState {
        db,
        cache: ListCache::new(Duration::from_secs(config.list_cache_ttl_secs)),
        config,
        notifier,
        storage,
    };

    TestApp {
        state,
        notifications,
        storage_dir,
    }
}

/// Inserts a user holding the given global roles and direct permissions.
pub async fn user(state: &AppState, name: &str, roles: &[&str], permissions: &[&str]) -> Identity {
    let now = Utc::now();
    let id = sqlx::query_scalar::<_, Id>(
        "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, 'x', ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(format!("{}@example.com", name.to_lowercase()))
    .bind(now)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await
    .unwrap();

    for role in roles {
        assert!(identity::assign_role(&state.db.pool, id, role).await.unwrap());
    }
    for permission in permissions {
        assert!(identity::grant_permission(&state.db.pool, id, permission)
            .await
            .unwrap());
    }

    Identity::load(&state.db.pool, id).await.unwrap()
}

pub async fn project(state: &AppState, owner_id: Id, name: &str) -> Id {
    let now = Utc::now();
    sqlx::query_scalar::<_, Id>(
        "INSERT INTO projects (name, status, owner_id, created_at, updated_at) VALUES (?, 'active', ?, ?, ?) RETURNING id",
    )
    .bind(name)
    .bind(owner_id)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await
    .unwrap()
}

pub async fn task(state: &AppState, project_id: Id, title: &str, assignee_id: Option<Id>) -> Id {
    let now = Utc::now();
    sqlx::query_scalar::<_, Id>(
        "INSERT INTO tasks (project_id, assignee_id, title, status, priority, created_at, updated_at) VALUES (?, ?, ?, 'todo', 'medium', ?, ?) RETURNING id",
    )
    .bind(project_id)
    .bind(assignee_id)
    .bind(title)
    .bind(now)
    .bind(now)
    .fetch_one(&state.db.pool)
    .await
    .unwrap()
}

/// Tombstones the project row directly, leaving its tasks untouched.
pub async fn trash_project(state: &AppState, id: Id) {
    sqlx::query("UPDATE projects SET deleted_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id)
        .execute(&state.db.pool)
        .await
        .unwrap();
}

pub async fn member(state: &AppState, project_id: Id, user_id: Id, role: MemberRole) {
    taskboard_server::authz::membership::add_member(&state.db.pool, project_id, user_id, role)
        .await
        .unwrap();
}

pub async fn task_status(state: &AppState, id: Id) -> (TaskStatus, bool) {
    let (status, completed): (TaskStatus, Option<chrono::DateTime<Utc>>) =
        sqlx::query_as("SELECT status, completed_at FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_one(&state.db.pool)
            .await
            .unwrap();
    (status, completed.is_some())
}
