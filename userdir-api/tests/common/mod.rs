//! Common test utilities for API tests
//!
//! This module provides shared infrastructure for router tests:
//! - An in-memory store seeded with two sites
//! - A router built exactly as the server builds it
//! - JWT token generation
//! - Request helpers returning status and JSON body

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use userdir_api::app::{build_router, AppState};
use userdir_api::config::{ApiConfig, CacheConfig, Config, JwtConfig};
use userdir_shared::auth::jwt::{create_token, Claims};
use userdir_shared::cache::MemoryQueryCache;
use userdir_shared::db::pool::DatabaseConfig;
use userdir_shared::directory::{resolver::HostSiteResolver, UserDirectory};
use userdir_shared::models::site::Site;
use userdir_shared::store::{memory::MemoryStore, Store};

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub main_site: Site,
    pub blog_site: Site,
}

impl TestContext {
    /// Creates a context with `www.example.com` (oldest) and `blog.example.com`
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());

        let mut main_site = Site::new("Main", "https://www.example.com");
        main_site.created_at = main_site.created_at - chrono::Duration::days(1);
        let blog_site = Site::new("Blog", "https://blog.example.com");

        let mut session = store.begin().await.expect("Failed to begin session");
        session.save_site(&main_site).await.expect("Failed to save site");
        session.save_site(&blog_site).await.expect("Failed to save site");
        session.commit().await.expect("Failed to commit");

        let directory = UserDirectory::new(store.clone(), Arc::new(HostSiteResolver))
            .with_cache(Arc::new(MemoryQueryCache::default()));
        let app = build_router(AppState::new(directory, test_config()));

        Self {
            app,
            store,
            main_site,
            blog_site,
        }
    }

    /// Sends a request and returns the status plus the JSON body (Null when empty)
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "www.example.com");

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send_request(request).await
    }

    /// Sends a prebuilt request
    pub async fn send_request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");

        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("Response body is not JSON")
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None, None).await
    }

    /// Creates a user through the API and returns its JSON
    pub async fn create_user(&self, email: &str, is_active: bool) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/v1/users",
                Some(serde_json::json!({
                    "email": email,
                    "first_name": "Test",
                    "is_active": is_active,
                })),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        body
    }
}

pub fn test_config() -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
        },
        database: DatabaseConfig {
            url: "postgresql://unused".to_string(),
            ..Default::default()
        },
        cache: CacheConfig {
            redis_url: None,
            ttl_seconds: 300,
        },
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
        },
    }
}

/// Signed token naming `email` as the principal
pub fn token_for(email: &str) -> String {
    create_token(&Claims::new(email), JWT_SECRET).expect("Failed to create token")
}
