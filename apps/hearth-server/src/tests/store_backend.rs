//! StoreBackend tests.

use chrono::{Duration, Utc};
use hearth_storage::*;

use super::common::*;
use crate::backend::StoreBackend;
use hearth_store_sqlite::DEFAULT_LOCK_TIMEOUT;

#[tokio::test]
async fn store_backend_opens_by_url_scheme() {
    let backend = StoreBackend::open("sqlite::memory:", DEFAULT_LOCK_TIMEOUT)
        .await
        .unwrap();
    assert_eq!(backend.kind(), "sqlite");
}

#[tokio::test]
async fn store_backend_delegates_accept() {
    let backend = StoreBackend::open("sqlite::memory:", DEFAULT_LOCK_TIMEOUT)
        .await
        .unwrap();
    let owner = new_user();
    let tenant = new_user();

    let property = backend
        .create_property(&CreatePropertyParams {
            owner_id: owner.clone(),
            name: "Loft".to_string(),
            address: "3 Mill Lane".to_string(),
            owner_display_name: "Sam".to_string(),
        })
        .await
        .unwrap();
    let invite = backend
        .create_invite(&CreateInviteParams {
            property_id: property.id.clone(),
            created_by: owner.clone(),
            token_hash: "feedface".to_string(),
            intended_email: None,
            delivery_method: DeliveryMethod::Code,
            expires_at: Utc::now() + Duration::hours(1),
            max_uses: 1,
        })
        .await
        .unwrap();
    assert_eq!(
        backend.get_invite_by_hash("feedface").await.unwrap().id,
        invite.id
    );

    let outcome = backend
        .accept_invite(&AcceptInviteParams {
            token_hash: "feedface".to_string(),
            tenant_id: tenant.clone(),
            now: Utc::now(),
        })
        .await
        .unwrap();
    assert_eq!(outcome.as_str(), "linked");

    let link = backend.get_link(&tenant, &property.id).await.unwrap();
    assert_eq!(link.owner_id, owner);
    assert_eq!(link.invite_id, Some(invite.id.clone()));
    assert_eq!(backend.list_links(&property.id).await.unwrap().len(), 1);

    let profile = backend.get_profile(&tenant).await.unwrap();
    assert_eq!(profile.role, Some(ProfileRole::Tenant));

    assert!(backend.revoke_invite(&invite.id, Utc::now()).await.unwrap());
    assert!(!backend.revoke_invite(&invite.id, Utc::now()).await.unwrap());
}
