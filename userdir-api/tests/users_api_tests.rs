/// Router tests for the user directory API
///
/// These drive the real router with `tower::ServiceExt::oneshot` against an
/// in-memory store, so no database is needed.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::{Duration, Utc};
use common::{token_for, TestContext};
use serde_json::{json, Value};
use userdir_shared::store::Store;
use uuid::Uuid;

fn id_of(user: &Value) -> Uuid {
    user["id"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_reports_connected_store() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_create_and_fetch_user() {
    let ctx = TestContext::new().await;

    let created = ctx.create_user("  ada@example.com ", true).await;
    assert_eq!(created["email"], "ada@example.com");
    assert_eq!(created["sites"], json!([ctx.main_site.id]));

    let (status, fetched) = ctx.get(&format!("/v1/users/{}", id_of(&created))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["email"], "ada@example.com");
    assert_eq!(fetched["first_name"], "Test");
}

#[tokio::test]
async fn test_create_joins_site_for_host() {
    let ctx = TestContext::new().await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/users")
        .header(header::HOST, "blog.example.com")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "email": "writer@example.com" }).to_string()))
        .unwrap();
    let (status, created) = ctx.send_request(request).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["is_active"], true);
    assert_eq!(created["sites"], json!([ctx.blog_site.id]));

    let site = ctx.store.get_site(ctx.blog_site.id).await.unwrap().unwrap();
    assert!(site.users.unwrap().contains(&id_of(&created)));
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let ctx = TestContext::new().await;
    ctx.create_user("dup@example.com", true).await;

    let (status, body) = ctx
        .send(
            "POST",
            "/v1/users",
            Some(json!({ "email": " dup@example.com" })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx
        .send("POST", "/v1/users", Some(json!({ "email": "not-an-email" })), None)
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"][0]["field"], "email");
}

#[tokio::test]
async fn test_missing_user_is_404() {
    let ctx = TestContext::new().await;

    let (status, body) = ctx.get(&format!("/v1/users/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_update_user() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("grace@example.com", true).await;
    let other = ctx.create_user("taken@example.com", true).await;
    let uri = format!("/v1/users/{}", id_of(&user));

    let (status, updated) = ctx
        .send(
            "PUT",
            &uri,
            Some(json!({
                "email": "grace@example.com",
                "first_name": "Grace",
                "last_name": "Hopper",
                "is_active": false,
            })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["last_name"], "Hopper");
    assert_eq!(updated["is_active"], false);

    let (status, _) = ctx
        .send(
            "PUT",
            &uri,
            Some(json!({ "email": other["email"], "is_active": true })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = ctx
        .send(
            "PUT",
            &format!("/v1/users/{}", Uuid::new_v4()),
            Some(json!({ "email": "new@example.com", "is_active": true })),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_user_frees_email() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("temp@example.com", true).await;

    let (_, body) = ctx.get("/v1/users/unique-email?email=temp@example.com").await;
    assert_eq!(body["unique"], false);

    let uri = format!("/v1/users/{}", id_of(&user));
    let (status, _) = ctx.send("DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = ctx.get("/v1/users/unique-email?email=temp@example.com").await;
    assert_eq!(body["unique"], true);

    let (status, _) = ctx.send("DELETE", &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let site = ctx.store.get_site(ctx.main_site.id).await.unwrap().unwrap();
    assert!(site.users.unwrap().is_empty());
}

#[tokio::test]
async fn test_unique_email_with_exclusion() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("self@example.com", true).await;

    let (status, body) = ctx
        .get(&format!(
            "/v1/users/unique-email?email=self@example.com&exclude={}",
            id_of(&user)
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unique"], true);
}

#[tokio::test]
async fn test_lookup_by_email() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("lookup@example.com", true).await;

    let (status, body) = ctx.get("/v1/users/by-email?email=lookup@example.com").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user["id"]);

    let (status, _) = ctx.get("/v1/users/by-email?email=nobody@example.com").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lookup_by_reset_guid_respects_expiry() {
    let ctx = TestContext::new().await;
    let created = ctx.create_user("reset@example.com", true).await;
    let id = id_of(&created);

    // Issue one live token and write it through the store
    let mut user = ctx.store.get_user(id).await.unwrap().unwrap();
    let live = user.start_password_reset(Utc::now() + Duration::hours(1));
    let mut session = ctx.store.begin().await.unwrap();
    session.update_user(&user).await.unwrap();
    session.commit().await.unwrap();

    let (status, body) = ctx.get(&format!("/v1/users/by-reset-guid/{}", live)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], created["id"]);

    let expired = user.start_password_reset(Utc::now() - Duration::minutes(5));
    let mut session = ctx.store.begin().await.unwrap();
    session.update_user(&user).await.unwrap();
    session.commit().await.unwrap();

    let (status, _) = ctx.get(&format!("/v1/users/by-reset-guid/{}", expired)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_paging_and_stats() {
    let ctx = TestContext::new().await;
    for i in 0..12 {
        ctx.create_user(&format!("user{:02}@example.com", i), i < 8).await;
    }

    let (status, all) = ctx.get("/v1/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 12);

    let (_, page_one) = ctx.get("/v1/users/paged").await;
    assert_eq!(page_one["items"].as_array().unwrap().len(), 10);
    assert_eq!(page_one["page_number"], 1);
    assert_eq!(page_one["total_count"], 12);
    assert_eq!(page_one["page_count"], 2);
    assert_eq!(page_one["has_next_page"], true);

    let (_, page_two) = ctx.get("/v1/users/paged?page=2").await;
    assert_eq!(page_two["items"].as_array().unwrap().len(), 2);
    assert_eq!(page_two["has_previous_page"], true);
    assert_eq!(page_two["has_next_page"], false);

    let (status, body) = ctx.get("/v1/users/paged?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (_, stats) = ctx.get("/v1/users/stats").await;
    assert_eq!(stats["active"], 8);
    assert_eq!(stats["inactive"], 4);
}

#[tokio::test]
async fn test_me_requires_and_follows_token() {
    let ctx = TestContext::new().await;
    let user = ctx.create_user("me@example.com", true).await;

    let (status, _) = ctx.get("/v1/me").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = token_for("me@example.com");
    let (status, body) = ctx.send("GET", "/v1/me", None, Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], user["id"]);

    let stranger = token_for("stranger@example.com");
    let (status, _) = ctx.send("GET", "/v1/me", None, Some(&stranger)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = ctx.send("GET", "/v1/me", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}
