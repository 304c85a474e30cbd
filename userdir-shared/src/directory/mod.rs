/// User directory service
///
/// [`UserDirectory`] is the single entry point for user queries and writes.
/// Every write runs in one store session and commits atomically; reads marked
/// cacheable go through the configured [`QueryCache`].
///
/// # Collaborators
///
/// - [`Store`]: persistence ([`crate::store::postgres::PgStore`] or
///   [`crate::store::memory::MemoryStore`])
/// - [`SiteResolver`]: picks the site a new user joins
/// - [`UserDeletionHook`]: runs before a user row is removed
/// - [`QueryCache`]: result cache, disabled by default
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use userdir_shared::context::RequestContext;
/// use userdir_shared::directory::{resolver::FixedSiteResolver, UserDirectory};
/// use userdir_shared::models::{site::Site, user::{NewUser, User}};
/// use userdir_shared::store::{memory::MemoryStore, Store};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(MemoryStore::new());
/// let site = Site::new("Main", "https://example.com");
/// let mut session = store.begin().await?;
/// session.save_site(&site).await?;
/// session.commit().await?;
///
/// let directory = UserDirectory::new(store, Arc::new(FixedSiteResolver::new(site.id)));
/// let user = directory
///     .add_user(
///         User::new(NewUser {
///             email: "editor@example.com".to_string(),
///             first_name: None,
///             last_name: None,
///             is_active: true,
///         }),
///         &RequestContext::default(),
///     )
///     .await?;
///
/// assert!(!directory.is_unique_email("editor@example.com", None).await?);
/// assert_eq!(directory.get_user(user.id).await?.map(|u| u.email), Some(user.email));
/// # Ok(())
/// # }
/// ```

pub mod error;
pub mod hooks;
pub mod linking;
pub mod resolver;

pub use error::{DirectoryError, DirectoryResult};

use crate::cache::{NoopQueryCache, QueryCache};
use crate::context::RequestContext;
use crate::models::user::{normalize_email, User};
use crate::paging::{offset_for, PagedList, DEFAULT_PAGE_SIZE};
use crate::store::{ActiveFilter, Session, Store, StoreError, UserQuery};
use chrono::{DateTime, Utc};
use hooks::{DetachFromSites, UserDeletionHook};
use linking::link_user_to_site;
use resolver::SiteResolver;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

const ALL_USERS_KEY: &str = "users:all";
const ACTIVE_COUNT_KEY: &str = "users:count:active";
const INACTIVE_COUNT_KEY: &str = "users:count:inactive";

fn email_key(email: &str) -> String {
    format!("users:email:{}", email)
}

fn reset_key(guid: Uuid) -> String {
    format!("users:reset:{}", guid)
}

/// User directory service
#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn Store>,
    cache: Arc<dyn QueryCache>,
    deletion_hook: Arc<dyn UserDeletionHook>,
    site_resolver: Arc<dyn SiteResolver>,
}

impl UserDirectory {
    /// Creates a directory without caching, detaching users from their sites
    /// on delete
    pub fn new(store: Arc<dyn Store>, site_resolver: Arc<dyn SiteResolver>) -> Self {
        Self {
            store,
            cache: Arc::new(NoopQueryCache),
            deletion_hook: Arc::new(DetachFromSites),
            site_resolver,
        }
    }

    /// Replaces the query cache
    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the deletion hook
    pub fn with_deletion_hook(mut self, hook: Arc<dyn UserDeletionHook>) -> Self {
        self.deletion_hook = hook;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Adds a new user to the site serving `ctx`
    ///
    /// The user and the site are linked on both sides, then the user is
    /// inserted with its memberships and the site updated in one transaction.
    /// Existing memberships of the site are never rewritten.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::SiteNotFound`] if no site serves the request
    /// - [`DirectoryError::Store`] if any write fails; nothing is persisted
    pub async fn add_user(&self, mut user: User, ctx: &RequestContext) -> DirectoryResult<User> {
        user.email = normalize_email(&user.email).to_string();
        let site_id = self
            .site_resolver
            .current_site(self.store.as_ref(), ctx)
            .await?
            .id;

        let mut session = self.store.begin().await?;
        let result = async {
            // Reload inside the session; the resolved copy may be stale
            let mut site = session
                .get_site(site_id)
                .await?
                .ok_or_else(|| StoreError::site_not_found(site_id))?;
            link_user_to_site(&mut user, &mut site);

            session.save_user(&user).await?;
            session.update_site(&site.without_relations()).await?;
            Ok::<(), DirectoryError>(())
        }
        .await;
        self.finish(session, result).await?;

        info!(user_id = %user.id, email = %user.email, site_id = %site_id, "User added");
        Ok(user)
    }

    /// Persists changes to an existing user's own fields
    ///
    /// Site memberships are left as stored; they change only through
    /// [`UserDirectory::add_user`] and [`UserDirectory::delete_user`].
    ///
    /// # Errors
    ///
    /// Returns a store `NotFound` error if the user does not exist.
    pub async fn save_user(&self, user: &User) -> DirectoryResult<()> {
        let mut session = self.store.begin().await?;
        let result = session
            .update_user(&user.without_relations())
            .await
            .map_err(Into::into);
        self.finish(session, result).await?;

        info!(user_id = %user.id, email = %user.email, "User saved");
        Ok(())
    }

    /// Fetches a user with its sites loaded
    pub async fn get_user(&self, id: Uuid) -> DirectoryResult<Option<User>> {
        debug!(user_id = %id, "Fetching user");
        Ok(self.store.get_user(id).await?)
    }

    /// Every user, oldest first
    pub async fn get_all_users(&self) -> DirectoryResult<Vec<User>> {
        debug!("Fetching all users");
        self.cached(ALL_USERS_KEY, || async {
            self.store
                .find_users(&UserQuery::all())
                .await
                .map_err(DirectoryError::from)
        })
        .await
    }

    /// One page of users, [`DEFAULT_PAGE_SIZE`] per page, 1-based
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidPage`] if `page` is below 1.
    pub async fn get_all_users_paged(&self, page: i64) -> DirectoryResult<PagedList<User>> {
        if page < 1 {
            return Err(DirectoryError::InvalidPage(page));
        }
        debug!(page, "Fetching users page");

        let total = self.store.count_users(&UserQuery::all()).await?;
        let items = match offset_for(page, DEFAULT_PAGE_SIZE) {
            Some(offset) => {
                let query = UserQuery::all().paged(DEFAULT_PAGE_SIZE, offset);
                self.store.find_users(&query).await?
            }
            // Past any representable offset, so past the end
            None => Vec::new(),
        };

        Ok(PagedList::new(items, page, DEFAULT_PAGE_SIZE, total))
    }

    /// The user with this email, after trimming whitespace
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::AmbiguousResult`] if several users share the
    /// email.
    pub async fn get_user_by_email(&self, email: &str) -> DirectoryResult<Option<User>> {
        let email = normalize_email(email);
        debug!(email, "Fetching user by email");

        let matches: Vec<User> = self
            .cached(&email_key(email), || async {
                self.store
                    .find_users(&UserQuery::by_email(email).paged(2, 0))
                    .await
                    .map_err(DirectoryError::from)
            })
            .await?;

        single_or_none(matches, || format!("email {}", email))
    }

    /// The user holding this reset token, if it is still valid at `now`
    pub async fn get_user_by_reset_guid(
        &self,
        guid: Uuid,
        now: DateTime<Utc>,
    ) -> DirectoryResult<Option<User>> {
        debug!(%guid, "Fetching user by reset token");

        let matches: Vec<User> = self
            .cached(&reset_key(guid), || async move {
                self.store
                    .find_users(&UserQuery::by_reset_guid(guid).paged(2, 0))
                    .await
                    .map_err(DirectoryError::from)
            })
            .await?;

        let valid: Vec<User> = matches
            .into_iter()
            .filter(|user| user.reset_token_valid_at(now))
            .collect();

        single_or_none(valid, || format!("reset token {}", guid))
    }

    /// The user the request's principal names, if any
    pub async fn get_current_user(&self, ctx: &RequestContext) -> DirectoryResult<Option<User>> {
        match &ctx.principal {
            Some(principal) => self.get_user_by_email(&principal.name).await,
            None => Ok(None),
        }
    }

    /// Deletes a user after running the deletion hook
    ///
    /// # Errors
    ///
    /// Returns a store `NotFound` error if the user does not exist.
    pub async fn delete_user(&self, mut user: User) -> DirectoryResult<()> {
        let mut session = self.store.begin().await?;
        let result = async {
            self.deletion_hook
                .on_deleting(session.as_mut(), &mut user)
                .await?;
            session.delete_user(&user).await?;
            Ok::<(), DirectoryError>(())
        }
        .await;
        self.finish(session, result).await?;

        info!(user_id = %user.id, email = %user.email, "User deleted");
        Ok(())
    }

    /// Whether no user other than `exclude_id` has this email
    pub async fn is_unique_email(
        &self,
        email: &str,
        exclude_id: Option<Uuid>,
    ) -> DirectoryResult<bool> {
        let query = UserQuery::by_email(normalize_email(email)).excluding(exclude_id);
        Ok(self.store.count_users(&query).await? == 0)
    }

    /// Number of active users
    pub async fn active_users(&self) -> DirectoryResult<i64> {
        self.count_cached(ACTIVE_COUNT_KEY, ActiveFilter::Active).await
    }

    /// Number of inactive users
    pub async fn non_active_users(&self) -> DirectoryResult<i64> {
        self.count_cached(INACTIVE_COUNT_KEY, ActiveFilter::Inactive)
            .await
    }

    async fn count_cached(&self, key: &str, filter: ActiveFilter) -> DirectoryResult<i64> {
        self.cached(key, || async move {
            self.store
                .count_users(&UserQuery::by_active(filter))
                .await
                .map_err(DirectoryError::from)
        })
        .await
    }

    /// Commits on success, rolls back on failure, and invalidates the cache
    /// after a commit
    async fn finish(
        &self,
        session: Box<dyn Session>,
        result: DirectoryResult<()>,
    ) -> DirectoryResult<()> {
        match result {
            Ok(()) => {
                session.commit().await?;
                self.cache.invalidate().await;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Rolling back directory write");
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn cached<T, F, Fut>(&self, key: &str, load: F) -> DirectoryResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = DirectoryResult<T>>,
    {
        // Taken before loading so a write landing mid-load discards the put
        let generation = self.cache.generation().await;

        if let Some(raw) = self.cache.get(key).await {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "Query cache hit");
                    return Ok(value);
                }
                Err(e) => warn!(key, error = %e, "Discarding unreadable cache entry"),
            }
        }

        let value = load().await?;
        if let Some(generation) = generation {
            match serde_json::to_string(&value) {
                Ok(raw) => self.cache.put(key, raw, generation).await,
                Err(e) => warn!(key, error = %e, "Failed to serialize query result"),
            }
        }
        Ok(value)
    }
}

fn single_or_none(
    mut matches: Vec<User>,
    lookup: impl FnOnce() -> String,
) -> DirectoryResult<Option<User>> {
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(DirectoryError::AmbiguousResult {
            lookup: lookup(),
            count,
        }),
    }
}
