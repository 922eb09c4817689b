use std::sync::Arc;

use taskdeck::GroupStore;
use taskdeck::StoreError;
use taskdeck::models::GroupRole;
use taskdeck::remote::{MemoryStore, UserIdentity};
use taskdeck::session::SessionContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "taskdeck=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn identity(id: &str) -> UserIdentity {
    UserIdentity {
        id: id.to_string(),
        email: format!("{id}@example.com"),
    }
}

fn setup() -> (Arc<SessionContext>, Arc<MemoryStore>, GroupStore) {
    init_tracing();
    let session = Arc::new(SessionContext::new());
    session.sign_in(identity("u1"));
    let remote = Arc::new(MemoryStore::new(Arc::clone(&session)));
    let store = GroupStore::new(remote.clone());
    (session, remote, store)
}

#[tokio::test]
async fn create_group_makes_caller_owner() {
    let (_session, _remote, mut store) = setup();

    let group_id = store
        .create_group("Trip planning", Some("#ff8800"))
        .await
        .expect("create group");

    assert_eq!(store.groups().len(), 1);
    let group = &store.groups()[0];
    assert_eq!(group.group_id, group_id);
    assert_eq!(group.name, "Trip planning");
    assert_eq!(group.color.as_deref(), Some("#ff8800"));
    assert_eq!(group.role, GroupRole::Owner);
}

#[tokio::test]
async fn create_group_rejects_blank_name() {
    let (_session, _remote, mut store) = setup();
    let err = store.create_group("   ", None).await.expect_err("blank");
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(store.error().is_some());
}

#[tokio::test]
async fn invite_flow_accept_joins_group_and_consumes_invite() {
    let (session, _remote, mut store) = setup();
    let group_id = store.create_group("Shared", None).await.expect("create");
    let token = store
        .create_invite(&group_id, "u2@example.com")
        .await
        .expect("invite");

    session.sign_in(identity("u2"));
    let mut u2_store = store;
    assert!(u2_store.fetch_invites().await);
    assert_eq!(u2_store.invites().len(), 1);
    assert_eq!(u2_store.invites()[0].group_name, "Shared");

    assert!(u2_store.accept_invite(&token).await);
    assert!(u2_store.invites().is_empty(), "invite consumed");
    assert_eq!(u2_store.groups().len(), 1);
    assert_eq!(u2_store.groups()[0].role, GroupRole::Member);
}

#[tokio::test]
async fn decline_removes_invite_without_membership() {
    let (session, _remote, mut store) = setup();
    let group_id = store.create_group("Shared", None).await.expect("create");
    let token = store
        .create_invite(&group_id, "u2@example.com")
        .await
        .expect("invite");

    session.sign_in(identity("u2"));
    assert!(store.decline_invite(&token).await);
    assert!(store.invites().is_empty());
    assert!(store.groups().is_empty());
}

#[tokio::test]
async fn transfer_ownership_swaps_roles_atomically() {
    let (session, remote, mut store) = setup();
    let group_id = store.create_group("Shared", None).await.expect("create");
    let token = store
        .create_invite(&group_id, "u2@example.com")
        .await
        .expect("invite");

    session.sign_in(identity("u2"));
    assert!(store.accept_invite(&token).await);

    session.sign_in(identity("u1"));
    let mut owner_store = GroupStore::new(remote.clone());
    owner_store
        .transfer_ownership(&group_id, "u2")
        .await
        .expect("transfer");

    let members = owner_store
        .fetch_members(&group_id, true)
        .await
        .expect("members");
    let role_of = |id: &str| {
        members
            .iter()
            .find(|m| m.user_id == id)
            .map(|m| m.role)
            .expect("member present")
    };
    assert_eq!(role_of("u2"), GroupRole::Owner);
    assert_eq!(role_of("u1"), GroupRole::Admin);
}

#[tokio::test]
async fn set_member_role_patches_cache_in_place() {
    let (session, _remote, mut store) = setup();
    let group_id = store.create_group("Shared", None).await.expect("create");
    let token = store
        .create_invite(&group_id, "u2@example.com")
        .await
        .expect("invite");
    session.sign_in(identity("u2"));
    assert!(store.accept_invite(&token).await);

    session.sign_in(identity("u1"));
    let _ = store.fetch_members(&group_id, true).await.expect("warm cache");
    store
        .set_member_role(&group_id, "u2", GroupRole::Admin)
        .await
        .expect("set role");

    let cached = store.cached_members(&group_id).expect("cached");
    let member = cached.iter().find(|m| m.user_id == "u2").expect("u2");
    assert_eq!(member.role, GroupRole::Admin);
}

#[tokio::test]
async fn update_group_patches_only_supplied_fields() {
    let (_session, _remote, mut store) = setup();
    let group_id = store
        .create_group("Old name", Some("#112233"))
        .await
        .expect("create");

    store
        .update_group(&group_id, Some("New name"), None)
        .await
        .expect("rename");

    let group = &store.groups()[0];
    assert_eq!(group.name, "New name");
    assert_eq!(group.color.as_deref(), Some("#112233"), "color untouched");

    let err = store
        .update_group(&group_id, Some("  "), None)
        .await
        .expect_err("blank name");
    assert!(matches!(err, StoreError::Validation(_)));
}

#[tokio::test]
async fn delete_group_drops_group_and_cached_members() {
    let (_session, _remote, mut store) = setup();
    let group_id = store.create_group("Doomed", None).await.expect("create");
    let _ = store.fetch_members(&group_id, true).await.expect("warm cache");

    assert!(store.delete_group(&group_id).await);
    assert!(store.groups().is_empty());
    assert!(store.cached_members(&group_id).is_none());
}

#[tokio::test]
async fn member_cache_serves_hits_until_forced() {
    let (_session, remote, mut store) = setup();
    let group_id = store.create_group("Shared", None).await.expect("create");

    let first = store.fetch_members(&group_id, false).await.expect("fill cache");
    assert_eq!(first.len(), 1);

    // A queued failure is not consumed by a cache hit.
    remote.queue_failure("unreachable");
    let cached = store.fetch_members(&group_id, false).await.expect("cache hit");
    assert_eq!(cached.len(), 1);

    let err = store
        .fetch_members(&group_id, true)
        .await
        .expect_err("forced refresh bypasses cache");
    assert!(matches!(err, StoreError::Remote(_)));
}

#[tokio::test]
async fn failed_fetch_groups_clears_list_and_records_error() {
    let (_session, remote, mut store) = setup();
    let _ = store.create_group("Shared", None).await.expect("create");
    assert_eq!(store.groups().len(), 1);

    remote.queue_failure("timeout");
    assert!(!store.fetch_groups().await);
    assert!(store.groups().is_empty());
    assert_eq!(store.error(), Some("timeout"));
}

#[tokio::test]
async fn fetch_groups_without_identity_is_an_auth_failure() {
    let (session, _remote, mut store) = setup();
    session.sign_out();
    assert!(!store.fetch_groups().await);
    assert_eq!(store.error(), Some("Not authenticated"));
}
