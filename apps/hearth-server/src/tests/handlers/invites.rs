//! Invite handler tests.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use hearth_limits::RateLimitConfig;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::handlers::invites::{
    self, AcceptResponseBody, CreateInviteBody, TokenBody, ValidateResponse,
};
use crate::handlers::AuthenticatedUser;
use crate::server::HearthServer;
use crate::tests::common::*;

fn token(value: &str) -> Json<TokenBody> {
    Json(TokenBody {
        token: value.to_string(),
    })
}

fn from_client(ip: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static(ip));
    headers
}

async fn validate(server: &HearthServer, value: &str) -> ValidateResponse {
    let Json(body) = invites::validate_invite(
        State(server.clone()),
        from_client("198.51.100.7"),
        token(value),
    )
    .await
    .unwrap();
    body
}

async fn accept(
    server: &HearthServer,
    tenant: &hearth_storage::UserId,
    value: &str,
) -> (StatusCode, AcceptResponseBody) {
    let response = invites::accept_invite(
        State(server.clone()),
        AuthenticatedUser(tenant.clone()),
        token(value),
    )
    .await;
    let status = response.status();
    (status, body_json(response).await)
}

#[tokio::test]
async fn test_create_invite_returns_token_once() {
    let server = create_test_server().await;
    let owner = new_user();
    let property = create_property(&server, &owner).await;

    let (status, Json(created)) = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "code".to_string(),
            intended_email: None,
            max_uses: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.token.len(), 12);
    assert!(created.token.chars().all(|c| c.is_ascii_alphanumeric()));

    // The owner's listing never carries the token
    let Json(listed) = invites::list_invites(
        State(server.clone()),
        AuthenticatedUser(owner),
        Path(property.id.0),
    )
    .await
    .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].invite_id, created.invite_id);
    assert_eq!(listed[0].state, "active");
    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains(&created.token));
}

#[tokio::test]
async fn test_create_invite_rejects_bad_requests() {
    let server = create_test_server().await;
    let owner = new_user();
    let property = create_property(&server, &owner).await;

    let bad_method = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "carrier-pigeon".to_string(),
            intended_email: None,
            max_uses: None,
        }),
    )
    .await;
    assert_eq!(
        bad_method.unwrap_err().status_code(),
        StatusCode::BAD_REQUEST
    );

    let email_without_address = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "email".to_string(),
            intended_email: None,
            max_uses: None,
        }),
    )
    .await;
    assert_eq!(
        email_without_address.unwrap_err().status_code(),
        StatusCode::BAD_REQUEST
    );

    let zero_uses = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "code".to_string(),
            intended_email: None,
            max_uses: Some(0),
        }),
    )
    .await;
    assert_eq!(zero_uses.unwrap_err().status_code(), StatusCode::BAD_REQUEST);

    let unknown_property = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner),
        Json(CreateInviteBody {
            property_id: Uuid::now_v7(),
            delivery_method: "code".to_string(),
            intended_email: None,
            max_uses: None,
        }),
    )
    .await;
    assert_eq!(
        unknown_property.unwrap_err().status_code(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_only_owner_manages_invites() {
    let server = create_test_server().await;
    let owner = new_user();
    let stranger = new_user();
    let property = create_property(&server, &owner).await;
    let created = issue_invite(&server, &owner, &property, None).await;

    let create = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(stranger.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "code".to_string(),
            intended_email: None,
            max_uses: None,
        }),
    )
    .await;
    assert_eq!(create.unwrap_err().status_code(), StatusCode::FORBIDDEN);

    let list = invites::list_invites(
        State(server.clone()),
        AuthenticatedUser(stranger.clone()),
        Path(property.id.0),
    )
    .await;
    assert_eq!(list.unwrap_err().status_code(), StatusCode::FORBIDDEN);

    let revoke = invites::revoke_invite(
        State(server.clone()),
        AuthenticatedUser(stranger),
        Path(created.invite_id),
    )
    .await;
    assert_eq!(revoke.unwrap_err().status_code(), StatusCode::FORBIDDEN);

    // Still usable
    assert!(validate(&server, &created.token).await.valid);
}

#[tokio::test]
async fn test_validate_shows_property_without_consuming() {
    let server = create_test_server().await;
    let owner = new_user();
    let property = create_property(&server, &owner).await;
    let created = issue_invite(&server, &owner, &property, Some(3)).await;

    for _ in 0..3 {
        let body = validate(&server, &created.token).await;
        assert!(body.valid);
        let shown = body.property.unwrap();
        assert_eq!(shown.property_id, property.id.0);
        assert_eq!(shown.name, "Elm Street Duplex");
        assert_eq!(shown.owner_display_name, "Robin Landlord");
        assert_eq!(body.max_uses, Some(3));
        assert_eq!(body.use_count, Some(0));
    }

    // Surrounding whitespace from copy/paste is ignored
    assert!(validate(&server, &format!("  {}\n", created.token)).await.valid);
}

#[tokio::test]
async fn test_validate_unknown_token_reveals_nothing() {
    let server = create_test_server().await;
    let body = validate(&server, "AAAAAAAAAAAA").await;
    assert!(!body.valid);
    assert!(body.property.is_none());

    let json = serde_json::to_value(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "valid": false }));
}

#[tokio::test]
async fn test_validate_is_throttled_per_client() {
    let config = ServerConfig {
        rate_limit: RateLimitConfig {
            max_attempts: 2,
            window: Duration::from_secs(60),
        },
        ..ServerConfig::ephemeral()
    };
    let server = create_test_server_with(config).await;

    for _ in 0..2 {
        invites::validate_invite(
            State(server.clone()),
            from_client("203.0.113.5"),
            token("guess0000000"),
        )
        .await
        .unwrap();
    }

    let err = invites::validate_invite(
        State(server.clone()),
        from_client("203.0.113.5"),
        token("guess0000001"),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let response = err.into_response();
    assert!(response.headers().contains_key("retry-after"));

    // Another client has its own budget
    invites::validate_invite(
        State(server.clone()),
        from_client("203.0.113.6"),
        token("guess0000002"),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_accept_links_tenant_once() {
    let server = create_test_server().await;
    let owner = new_user();
    let tenant = new_user();
    let property = create_property(&server, &owner).await;
    let created = issue_invite(&server, &owner, &property, None).await;

    let (status, body) = accept(&server, &tenant, &created.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "ok");
    assert_eq!(body.property.unwrap().property_id, property.id.0);

    // Retrying after a lost response is harmless
    let (status, body) = accept(&server, &tenant, &created.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "already_linked");
    assert!(body.property.is_some());

    // A second redeemer of a single-use invite gets the generic answer
    let (status, body) = accept(&server, &new_user(), &created.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.status, "invalid");
    assert!(body.property.is_none());

    assert!(!validate(&server, &created.token).await.valid);

    let Json(listed) = invites::list_invites(
        State(server.clone()),
        AuthenticatedUser(owner),
        Path(property.id.0),
    )
    .await
    .unwrap();
    assert_eq!(listed[0].state, "exhausted");
    assert_eq!(listed[0].accepted_by, Some(tenant.0));
    assert_eq!(listed[0].use_count, 1);
}

#[tokio::test]
async fn test_accept_reports_capacity_when_configured() {
    let mut config = ServerConfig::ephemeral();
    config.invite.expose_capacity_reached = true;
    let server = create_test_server_with(config).await;
    let owner = new_user();
    let property = create_property(&server, &owner).await;
    let created = issue_invite(&server, &owner, &property, Some(2)).await;

    assert_eq!(accept(&server, &new_user(), &created.token).await.1.status, "ok");
    assert_eq!(accept(&server, &new_user(), &created.token).await.1.status, "ok");
    assert_eq!(
        accept(&server, &new_user(), &created.token).await.1.status,
        "capacity_reached"
    );
}

#[tokio::test]
async fn test_revoke_invite() {
    let server = create_test_server().await;
    let owner = new_user();
    let property = create_property(&server, &owner).await;
    let created = issue_invite(&server, &owner, &property, None).await;

    let status = invites::revoke_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Path(created.invite_id),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Revoking twice is not an error
    let status = invites::revoke_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Path(created.invite_id),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(!validate(&server, &created.token).await.valid);
    let (_, body) = accept(&server, &new_user(), &created.token).await;
    assert_eq!(body.status, "invalid");

    let missing = invites::revoke_invite(
        State(server.clone()),
        AuthenticatedUser(owner),
        Path(Uuid::now_v7()),
    )
    .await;
    assert_eq!(missing.unwrap_err().status_code(), StatusCode::NOT_FOUND);
}
