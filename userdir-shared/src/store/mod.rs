/// Persistence layer for the user directory
///
/// A [`Store`] serves pooled reads and opens [`Session`]s. A session is one
/// atomic unit of work: everything written through it becomes visible on
/// [`Session::commit`] and is discarded on [`Session::rollback`] or when the
/// session is dropped without committing.
///
/// # Implementations
///
/// - [`postgres::PgStore`]: PostgreSQL via sqlx, one database transaction per session
/// - [`memory::MemoryStore`]: in-process store for development and tests
///
/// # Relations
///
/// `User::sites` and `Site::users` follow the same rule everywhere: `None`
/// leaves stored memberships untouched, `Some(set)` makes the memberships on
/// that side equal the set.
///
/// # Example
///
/// ```
/// use userdir_shared::models::site::Site;
/// use userdir_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), userdir_shared::store::StoreError> {
/// let store = MemoryStore::new();
///
/// let site = Site::new("Main", "https://example.com");
/// let mut session = store.begin().await?;
/// session.save_site(&site).await?;
/// session.commit().await?;
///
/// assert!(store.get_site(site.id).await?.is_some());
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod postgres;

use crate::models::{site::Site, user::User};
use async_trait::async_trait;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Entity to update or delete does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind ("user", "site")
        entity: &'static str,
        /// Missing ID
        id: Uuid,
    },

    /// Unique or foreign key constraint violated
    #[error("Constraint violation: {0}")]
    Conflict(String),

    /// Any other database failure
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn user_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "user", id }
    }

    pub(crate) fn site_not_found(id: Uuid) -> Self {
        StoreError::NotFound { entity: "site", id }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            // 23505 unique_violation, 23503 foreign_key_violation
            if matches!(db_err.code().as_deref(), Some("23505") | Some("23503")) {
                let what = db_err
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db_err.message().to_string());
                return StoreError::Conflict(what);
            }
        }
        StoreError::Database(err)
    }
}

/// Store result type alias
pub type StoreResult<T> = Result<T, StoreError>;

/// Filter on the `is_active` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveFilter {
    /// Active and inactive users
    #[default]
    Any,

    /// Only users with `is_active = true`
    Active,

    /// Only users with `is_active = false`
    Inactive,
}

impl ActiveFilter {
    /// Whether a user with the given flag passes the filter
    pub fn matches(&self, is_active: bool) -> bool {
        match self {
            ActiveFilter::Any => true,
            ActiveFilter::Active => is_active,
            ActiveFilter::Inactive => !is_active,
        }
    }
}

/// User query: filters plus optional paging
///
/// All filters are conjunctive. Results are ordered by `created_at`, then
/// `id`, so paging is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    /// Exact email match
    pub email: Option<String>,

    /// Exact reset token match
    pub reset_password_guid: Option<Uuid>,

    /// Exclude this user ID
    pub exclude_id: Option<Uuid>,

    /// Activation filter
    pub active: ActiveFilter,

    /// Maximum rows to return (ignored by counts)
    pub limit: Option<i64>,

    /// Rows to skip (ignored by counts)
    pub offset: i64,
}

impl UserQuery {
    /// Matches every user
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches users with exactly this email
    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    /// Matches users with this reset token
    pub fn by_reset_guid(guid: Uuid) -> Self {
        Self {
            reset_password_guid: Some(guid),
            ..Self::default()
        }
    }

    /// Matches users by activation flag
    pub fn by_active(active: ActiveFilter) -> Self {
        Self {
            active,
            ..Self::default()
        }
    }

    /// Excludes one user ID
    pub fn excluding(mut self, id: Option<Uuid>) -> Self {
        self.exclude_id = id;
        self
    }

    /// Restricts to one page
    pub fn paged(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    /// Whether a user passes every filter
    pub fn matches(&self, user: &User) -> bool {
        self.email.as_deref().map_or(true, |email| user.email == email)
            && self
                .reset_password_guid
                .map_or(true, |guid| user.reset_password_guid == Some(guid))
            && self.exclude_id.map_or(true, |id| user.id != id)
            && self.active.matches(user.is_active)
    }
}

/// Pooled reads and session factory
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a new transactional session
    async fn begin(&self) -> StoreResult<Box<dyn Session>>;

    /// Fetches a user with `sites` loaded
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Runs a user query; relations are left unloaded
    async fn find_users(&self, query: &UserQuery) -> StoreResult<Vec<User>>;

    /// Counts users matching a query's filters
    async fn count_users(&self, query: &UserQuery) -> StoreResult<i64>;

    /// Fetches a site with `users` loaded
    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>>;

    /// Lists every site, oldest first; relations are left unloaded
    async fn list_sites(&self) -> StoreResult<Vec<Site>>;

    /// Verifies the backing storage is reachable
    async fn ping(&self) -> StoreResult<()>;
}

/// One atomic unit of work
#[async_trait]
pub trait Session: Send {
    /// Fetches a user with `sites` loaded
    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>>;

    /// Fetches a site with `users` loaded
    async fn get_site(&mut self, id: Uuid) -> StoreResult<Option<Site>>;

    /// IDs of the users stored as members of a site
    async fn site_user_ids(&mut self, site_id: Uuid) -> StoreResult<BTreeSet<Uuid>>;

    /// Removes one membership, if present, leaving every other row alone
    async fn remove_site_user(&mut self, site_id: Uuid, user_id: Uuid) -> StoreResult<()>;

    /// Inserts a new user (and its memberships, if loaded)
    async fn save_user(&mut self, user: &User) -> StoreResult<()>;

    /// Updates an existing user (and its memberships, if loaded)
    ///
    /// Fails with [`StoreError::NotFound`] if the user does not exist.
    async fn update_user(&mut self, user: &User) -> StoreResult<()>;

    /// Deletes a user and its memberships
    ///
    /// Fails with [`StoreError::NotFound`] if the user does not exist.
    async fn delete_user(&mut self, user: &User) -> StoreResult<()>;

    /// Inserts a new site (and its memberships, if loaded)
    async fn save_site(&mut self, site: &Site) -> StoreResult<()>;

    /// Updates an existing site (and its memberships, if loaded)
    ///
    /// Fails with [`StoreError::NotFound`] if the site does not exist.
    async fn update_site(&mut self, site: &Site) -> StoreResult<()>;

    /// Makes every write in this session durable
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discards every write in this session
    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
