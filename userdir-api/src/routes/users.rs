/// User directory endpoints
///
/// # Endpoints
///
/// - `GET /v1/users` - All users
/// - `GET /v1/users/paged?page=N` - One page of 10 users (1-based)
/// - `POST /v1/users` - Add a user to the site serving the request host
/// - `GET /v1/users/:id` - One user with its sites
/// - `PUT /v1/users/:id` - Update a user
/// - `DELETE /v1/users/:id` - Delete a user
/// - `GET /v1/users/by-email?email=` - Lookup by email
/// - `GET /v1/users/by-reset-guid/:guid` - Lookup by unexpired reset token
/// - `GET /v1/users/unique-email?email=&exclude=` - Email availability
/// - `GET /v1/users/stats` - Active / inactive counts

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::RequestCtx,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use userdir_shared::models::user::{NewUser, User};
use userdir_shared::paging::PagedList;
use uuid::Uuid;
use validator::Validate;

/// Create user request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// First name
    #[validate(length(max = 255, message = "First name must be at most 255 characters"))]
    pub first_name: Option<String>,

    /// Last name
    #[validate(length(max = 255, message = "Last name must be at most 255 characters"))]
    pub last_name: Option<String>,

    /// Whether the account starts active (default: true)
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Update user request
///
/// Every field replaces the stored value.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// First name
    #[validate(length(max = 255, message = "First name must be at most 255 characters"))]
    pub first_name: Option<String>,

    /// Last name
    #[validate(length(max = 255, message = "Last name must be at most 255 characters"))]
    pub last_name: Option<String>,

    /// Whether the account is active
    pub is_active: bool,
}

/// `?page=N`
#[derive(Debug, Deserialize)]
pub struct PageParams {
    /// 1-based page number (default: 1)
    pub page: Option<i64>,
}

/// `?email=`
#[derive(Debug, Deserialize)]
pub struct EmailParams {
    pub email: String,
}

/// `?email=&exclude=`
#[derive(Debug, Deserialize)]
pub struct UniqueEmailParams {
    /// Email to check
    pub email: String,

    /// User ID to ignore, e.g. the user being edited
    pub exclude: Option<Uuid>,
}

/// Email availability response
#[derive(Debug, Serialize, Deserialize)]
pub struct UniqueEmailResponse {
    pub unique: bool,
}

/// User count response
#[derive(Debug, Serialize, Deserialize)]
pub struct UserStatsResponse {
    /// Users with `is_active = true`
    pub active: i64,

    /// Users with `is_active = false`
    pub inactive: i64,
}

/// List every user, oldest first
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.directory.get_all_users().await?))
}

/// List one page of users
///
/// # Errors
///
/// - `400 Bad Request`: `page` is below 1
pub async fn list_users_paged(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<PagedList<User>>> {
    let page = params.page.unwrap_or(1);
    Ok(Json(state.directory.get_all_users_paged(page).await?))
}

/// Add a user
///
/// # Endpoint
///
/// ```text
/// POST /v1/users
/// Host: blog.example.com
/// Content-Type: application/json
///
/// {
///   "email": "editor@example.com",
///   "first_name": "Ada",
///   "last_name": "Lovelace"
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: Email already in use
/// - `422 Unprocessable Entity`: Validation failed
/// - `404 Not Found`: No site configured
pub async fn create_user(
    State(state): State<AppState>,
    RequestCtx(ctx): RequestCtx,
    Json(mut req): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    req.email = req.email.trim().to_string();
    req.validate()?;

    if !state.directory.is_unique_email(&req.email, None).await? {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    let user = User::new(NewUser {
        email: req.email,
        first_name: req.first_name,
        last_name: req.last_name,
        is_active: req.is_active,
    });

    let user = state.directory.add_user(user, &ctx).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Fetch one user
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    find_user(&state, id).await.map(Json)
}

/// Replace a user's editable fields
///
/// # Errors
///
/// - `404 Not Found`: No such user
/// - `409 Conflict`: Email used by another user
/// - `422 Unprocessable Entity`: Validation failed
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut req): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    req.email = req.email.trim().to_string();
    req.validate()?;

    let mut user = find_user(&state, id).await?;

    if !state.directory.is_unique_email(&req.email, Some(id)).await? {
        return Err(ApiError::Conflict("Email already exists".to_string()));
    }

    user.email = req.email;
    user.first_name = req.first_name;
    user.last_name = req.last_name;
    user.is_active = req.is_active;

    state.directory.save_user(&user).await?;
    find_user(&state, id).await.map(Json)
}

/// Delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let user = find_user(&state, id).await?;
    state.directory.delete_user(user).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lookup by email (surrounding whitespace ignored)
pub async fn get_user_by_email(
    State(state): State<AppState>,
    Query(params): Query<EmailParams>,
) -> ApiResult<Json<User>> {
    state
        .directory
        .get_user_by_email(&params.email)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

/// Lookup by a reset token that has not expired
pub async fn get_user_by_reset_guid(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
    RequestCtx(ctx): RequestCtx,
) -> ApiResult<Json<User>> {
    state
        .directory
        .get_user_by_reset_guid(guid, ctx.now)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Reset token not found or expired".to_string()))
}

/// Whether an email is free to use
pub async fn unique_email(
    State(state): State<AppState>,
    Query(params): Query<UniqueEmailParams>,
) -> ApiResult<Json<UniqueEmailResponse>> {
    let unique = state
        .directory
        .is_unique_email(&params.email, params.exclude)
        .await?;
    Ok(Json(UniqueEmailResponse { unique }))
}

/// Active and inactive user counts
pub async fn user_stats(State(state): State<AppState>) -> ApiResult<Json<UserStatsResponse>> {
    Ok(Json(UserStatsResponse {
        active: state.directory.active_users().await?,
        inactive: state.directory.non_active_users().await?,
    }))
}

async fn find_user(state: &AppState, id: Uuid) -> ApiResult<User> {
    state
        .directory
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {} not found", id)))
}
