mod common;

use taskboard_server::{
    authz::membership,
    db::{lookup, models::MemberRole},
    error::AppError,
    services::projects,
};

use common::{project, setup, user};

#[tokio::test]
async fn owner_is_member_without_a_membership_row() {
    let app = setup().await;
    let pool = &app.state.db.pool;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let outsider = user(&app.state, "Outsider", &[], &[]).await;
    let p = lookup::project(pool, project(&app.state, owner.id(), "Alpha").await)
        .await
        .unwrap();

    assert!(membership::is_member(pool, &p, owner.id()).await.unwrap());
    assert!(membership::is_manager_or_owner(pool, &p, owner.id()).await.unwrap());
    assert_eq!(membership::role_in_project(pool, p.id, owner.id()).await.unwrap(), None);

    assert!(!membership::is_member(pool, &p, outsider.id()).await.unwrap());
}

#[tokio::test]
async fn add_member_is_an_idempotent_upsert() {
    let app = setup().await;
    let pool = &app.state.db.pool;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let bob = user(&app.state, "Bob", &[], &[]).await;
    let p = lookup::project(pool, project(&app.state, owner.id(), "Alpha").await)
        .await
        .unwrap();

    membership::add_member(pool, p.id, bob.id(), MemberRole::Member).await.unwrap();
    membership::add_member(pool, p.id, bob.id(), MemberRole::Member).await.unwrap();

    let members = membership::list_members(pool, p.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].role, MemberRole::Member);

    membership::add_member(pool, p.id, bob.id(), MemberRole::ProjectManager)
        .await
        .unwrap();
    assert_eq!(
        membership::role_in_project(pool, p.id, bob.id()).await.unwrap(),
        Some(MemberRole::ProjectManager)
    );
    assert!(membership::is_manager_or_owner(pool, &p, bob.id()).await.unwrap());
    assert_eq!(membership::list_members(pool, p.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn add_then_remove_restores_previous_state() {
    let app = setup().await;
    let pool = &app.state.db.pool;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let bob = user(&app.state, "Bob", &[], &[]).await;
    let p = lookup::project(pool, project(&app.state, owner.id(), "Alpha").await)
        .await
        .unwrap();

    assert!(!membership::is_member(pool, &p, bob.id()).await.unwrap());

    membership::add_member(pool, p.id, bob.id(), MemberRole::Member).await.unwrap();
    assert!(membership::is_member(pool, &p, bob.id()).await.unwrap());

    assert!(membership::remove_member(pool, p.id, bob.id()).await.unwrap());
    assert!(!membership::is_member(pool, &p, bob.id()).await.unwrap());
    assert!(membership::list_members(pool, p.id).await.unwrap().is_empty());

    // Removing again is a no-op.
    assert!(!membership::remove_member(pool, p.id, bob.id()).await.unwrap());
}

#[tokio::test]
async fn member_management_requires_manage_projects() {
    let app = setup().await;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let manager = user(&app.state, "Manager", &["project_manager"], &[]).await;
    let bob = user(&app.state, "Bob", &[], &[]).await;
    let p = project(&app.state, owner.id(), "Alpha").await;

    // Owning the project is not enough.
    let err = projects::add_member(&app.state, &owner, p, bob.id(), MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let member = projects::add_member(&app.state, &manager, p, bob.id(), MemberRole::Member)
        .await
        .unwrap();
    assert_eq!(member.user_id, bob.id());

    let err = projects::add_member(&app.state, &manager, p, 9999, MemberRole::Member)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    projects::remove_member(&app.state, &manager, p, bob.id()).await.unwrap();
    let members = projects::list_members(&app.state, &owner, p).await.unwrap();
    assert!(members.is_empty());
}

#[tokio::test]
async fn membership_change_refreshes_member_project_index() {
    let app = setup().await;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let manager = user(&app.state, "Manager", &["project_manager"], &[]).await;
    let bob = user(&app.state, "Bob", &[], &[]).await;
    let p = project(&app.state, owner.id(), "Alpha").await;

    let filters = projects::ProjectFilters::default();
    let before = projects::list_projects(&app.state, &bob, &filters).await.unwrap();
    assert_eq!(before.meta.total, 0);

    projects::add_member(&app.state, &manager, p, bob.id(), MemberRole::Member)
        .await
        .unwrap();

    let after = projects::list_projects(&app.state, &bob, &filters).await.unwrap();
    assert_eq!(after.meta.total, 1);
    assert_eq!(after.data[0].project.id, p);
    assert_eq!(after.data[0].members_count, 1);
}
