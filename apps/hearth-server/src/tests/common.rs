//! Common test helpers for server tests.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use hearth_storage::{CreatePropertyParams, Property, Store, UserId};
use hearth_store_sqlite::SqliteStore;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::backend::StoreBackend;
use crate::config::ServerConfig;
use crate::handlers::invites::{self, CreateInviteBody, CreateInviteResponse};
use crate::handlers::AuthenticatedUser;
use crate::server::HearthServer;

/// Test helper: Create a HearthServer with in-memory SQLite and default config
pub async fn create_test_server() -> HearthServer {
    create_test_server_with(ServerConfig::ephemeral()).await
}

pub async fn create_test_server_with(config: ServerConfig) -> HearthServer {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    HearthServer::new(StoreBackend::Sqlite(store), &config).unwrap()
}

pub fn new_user() -> UserId {
    UserId(Uuid::now_v7())
}

/// Test helper: Register a property owned by `owner`
pub async fn create_property(server: &HearthServer, owner: &UserId) -> Property {
    server
        .store
        .create_property(&CreatePropertyParams {
            owner_id: owner.clone(),
            name: "Elm Street Duplex".to_string(),
            address: "12 Elm Street".to_string(),
            owner_display_name: "Robin Landlord".to_string(),
        })
        .await
        .unwrap()
}

/// Test helper: Issue a code invite through the HTTP handler
pub async fn issue_invite(
    server: &HearthServer,
    owner: &UserId,
    property: &Property,
    max_uses: Option<i32>,
) -> CreateInviteResponse {
    let (_, Json(created)) = invites::create_invite(
        State(server.clone()),
        AuthenticatedUser(owner.clone()),
        Json(CreateInviteBody {
            property_id: property.id.0,
            delivery_method: "code".to_string(),
            intended_email: None,
            max_uses,
        }),
    )
    .await
    .unwrap();
    created
}

pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
