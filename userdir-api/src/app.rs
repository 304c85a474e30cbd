/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use userdir_api::{app::{build_router, AppState}, config::Config};
/// use userdir_shared::db::pool::create_pool;
/// use userdir_shared::directory::{resolver::HostSiteResolver, UserDirectory};
/// use userdir_shared::store::postgres::PgStore;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = create_pool(config.database.clone()).await?;
/// let directory = UserDirectory::new(Arc::new(PgStore::new(pool)), Arc::new(HostSiteResolver));
/// let app = build_router(AppState::new(directory, config));
/// # Ok(())
/// # }
/// ```

use crate::config::Config;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use userdir_shared::directory::UserDirectory;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// User directory service
    pub directory: Arc<UserDirectory>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Creates new application state
    pub fn new(directory: UserDirectory, config: Config) -> Self {
        Self {
            directory: Arc::new(directory),
            config: Arc::new(config),
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── GET /health                          # Store connectivity
/// └── /v1/
///     ├── GET  /me                         # Current user (bearer token)
///     └── /users/
///         ├── GET    /                     # All users
///         ├── POST   /                     # Add user to the current site
///         ├── GET    /paged?page=N         # One page of 10
///         ├── GET    /by-email?email=
///         ├── GET    /by-reset-guid/:guid
///         ├── GET    /unique-email?email=&exclude=
///         ├── GET    /stats                # Active / inactive counts
///         ├── GET    /:id
///         ├── PUT    /:id
///         └── DELETE /:id
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Principal extraction (`/v1` only)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    // Health check (public, no auth)
    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let user_routes = Router::new()
        .route(
            "/",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .route("/paged", get(routes::users::list_users_paged))
        .route("/by-email", get(routes::users::get_user_by_email))
        .route("/by-reset-guid/:guid", get(routes::users::get_user_by_reset_guid))
        .route("/unique-email", get(routes::users::unique_email))
        .route("/stats", get(routes::users::user_stats))
        .route(
            "/:id",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .delete(routes::users::delete_user),
        );

    let v1_routes = Router::new()
        .route("/me", get(routes::me::current_user))
        .nest("/users", user_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::principal::principal_layer,
        ));

    let cors = if state.config.allows_any_origin() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
