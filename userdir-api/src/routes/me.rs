/// Current user endpoint
///
/// # Endpoint
///
/// ```text
/// GET /v1/me
/// Authorization: Bearer <jwt_token>
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: No bearer token
/// - `404 Not Found`: The token's principal has no account

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::RequestCtx,
};
use axum::{extract::State, Json};
use userdir_shared::models::user::User;

pub async fn current_user(
    State(state): State<AppState>,
    RequestCtx(ctx): RequestCtx,
) -> ApiResult<Json<User>> {
    if !ctx.is_authenticated() {
        return Err(ApiError::Unauthorized("Missing authorization header".to_string()));
    }

    state
        .directory
        .get_current_user(&ctx)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No account for the signed-in principal".to_string()))
}
