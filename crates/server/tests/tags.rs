mod common;

use taskboard_server::{
    error::AppError,
    services::{
        tags::{self, NewTag, TagChanges, TagFilters},
        tasks::{self, TaskFilters},
    },
};

use common::{project, setup, task, user};

fn new_tag(name: &str) -> NewTag {
    NewTag {
        name: name.to_string(),
        slug: None,
        description: None,
    }
}

#[tokio::test]
async fn duplicate_slug_is_a_conflict() {
    let app = setup().await;
    let curator = user(&app.state, "Curator", &[], &["manage_tags"]).await;

    let tag = tags::create_tag(&app.state, &curator, new_tag("Needs Review")).await.unwrap();
    assert_eq!(tag.slug, "needs-review");

    let err = tags::create_tag(&app.state, &curator, new_tag("needs review!"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn tag_management_requires_manage_tags() {
    let app = setup().await;
    let member = user(&app.state, "Member", &["member"], &[]).await;

    let err = tags::create_tag(&app.state, &member, new_tag("Urgent")).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn renaming_rederives_the_slug() {
    let app = setup().await;
    let curator = user(&app.state, "Curator", &[], &["manage_tags"]).await;
    let tag = tags::create_tag(&app.state, &curator, new_tag("Bug")).await.unwrap();

    let renamed = tags::update_tag(
        &app.state,
        &curator,
        tag.id,
        TagChanges {
            name: Some("Critical Bug".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.slug, "critical-bug");

    let explicit = tags::update_tag(
        &app.state,
        &curator,
        tag.id,
        TagChanges {
            slug: Some("p0".to_string()),
            description: Some(Some("Drop everything".to_string())),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(explicit.name, "Critical Bug");
    assert_eq!(explicit.slug, "p0");
    assert_eq!(explicit.description.as_deref(), Some("Drop everything"));

    let listed = tags::list_tags(
        &app.state,
        &TagFilters {
            q: Some("Critical".to_string()),
            page: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(listed.meta.total, 1);

    tags::delete_tag(&app.state, &curator, tag.id).await.unwrap();
    assert!(matches!(
        tags::get_tag(&app.state, tag.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn assigning_tags_is_idempotent_and_filterable() {
    let app = setup().await;
    let owner = user(&app.state, "Owner", &[], &[]).await;
    let curator = user(&app.state, "Curator", &[], &["manage_tags"]).await;
    let worker = user(&app.state, "Worker", &["member"], &[]).await;
    let outsider = user(&app.state, "Outsider", &[], &[]).await;
    let p = project(&app.state, owner.id(), "Alpha").await;
    let t = task(&app.state, p, "Fix login", None).await;
    let tag = tags::create_tag(&app.state, &curator, new_tag("Backend")).await.unwrap();

    tags::assign_tag(&app.state, &worker, t, tag.id).await.unwrap();
    tags::assign_tag(&app.state, &curator, t, tag.id).await.unwrap();

    let err = tags::assign_tag(&app.state, &outsider, t, tag.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = tags::assign_tag(&app.state, &worker, 999, tag.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let view = tasks::get_task(&app.state, &owner, t).await.unwrap();
    assert_eq!(view.tags, vec!["Backend".to_string()]);

    let by_tag = tasks::list_tasks(
        &app.state,
        &owner,
        &TaskFilters {
            tag: Some("backend".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_tag.meta.total, 1);

    tags::unassign_tag(&app.state, &worker, t, tag.id).await.unwrap();
    assert!(tasks::get_task(&app.state, &owner, t).await.unwrap().tags.is_empty());
}
