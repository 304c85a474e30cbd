/// PostgreSQL store
///
/// Reads use a pooled connection; each [`Session`] wraps one database
/// transaction. A session dropped without commit is rolled back by sqlx.
///
/// # Example
///
/// ```no_run
/// use userdir_shared::db::pool::{create_pool, DatabaseConfig};
/// use userdir_shared::store::{postgres::PgStore, Store, UserQuery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig {
///     url: std::env::var("DATABASE_URL")?,
///     ..Default::default()
/// })
/// .await?;
///
/// let store = PgStore::new(pool);
/// let total = store.count_users(&UserQuery::all()).await?;
/// println!("{} users", total);
/// # Ok(())
/// # }
/// ```

use super::{ActiveFilter, Session, Store, StoreError, StoreResult, UserQuery};
use crate::db::pool::health_check;
use crate::models::{
    site::Site,
    site_user::SiteUser,
    user::{User, USER_COLUMNS},
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};
use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

/// Postgres implementation of [`Store`]
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Appends the WHERE clause for a query's filters
fn push_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a UserQuery) {
    builder.push(" WHERE TRUE");

    if let Some(email) = &query.email {
        builder.push(" AND email = ").push_bind(email);
    }
    if let Some(guid) = query.reset_password_guid {
        builder.push(" AND reset_password_guid = ").push_bind(guid);
    }
    if let Some(id) = query.exclude_id {
        builder.push(" AND id <> ").push_bind(id);
    }
    match query.active {
        ActiveFilter::Any => {}
        ActiveFilter::Active => {
            builder.push(" AND is_active");
        }
        ActiveFilter::Inactive => {
            builder.push(" AND NOT is_active");
        }
    }
}

async fn load_user(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<User>> {
    let Some(mut user) = User::find_by_id(&mut *conn, id).await? else {
        return Ok(None);
    };
    user.sites = Some(SiteUser::site_ids_for_user(conn, id).await?);
    Ok(Some(user))
}

async fn load_site(conn: &mut PgConnection, id: Uuid) -> StoreResult<Option<Site>> {
    let Some(mut site) = Site::find_by_id(&mut *conn, id).await? else {
        return Ok(None);
    };
    site.users = Some(SiteUser::user_ids_for_site(conn, id).await?);
    Ok(Some(site))
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        debug!("Opened database transaction");
        Ok(Box::new(PgSession { tx }))
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.pool.acquire().await?;
        load_user(&mut conn, id).await
    }

    async fn find_users(&self, query: &UserQuery) -> StoreResult<Vec<User>> {
        let mut builder = QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
        push_filters(&mut builder, query);
        builder.push(" ORDER BY created_at ASC, id ASC");

        if let Some(limit) = query.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        if query.offset > 0 {
            builder.push(" OFFSET ").push_bind(query.offset);
        }

        let users = builder
            .build_query_as::<User>()
            .fetch_all(&self.pool)
            .await?;

        Ok(users)
    }

    async fn count_users(&self, query: &UserQuery) -> StoreResult<i64> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM users");
        push_filters(&mut builder, query);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>> {
        let mut conn = self.pool.acquire().await?;
        load_site(&mut conn, id).await
    }

    async fn list_sites(&self) -> StoreResult<Vec<Site>> {
        let mut conn = self.pool.acquire().await?;
        Ok(Site::list(&mut conn).await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        health_check(&self.pool).await.map_err(StoreError::from)
    }
}

/// Session over one database transaction
struct PgSession {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Session for PgSession {
    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        load_user(&mut self.tx, id).await
    }

    async fn get_site(&mut self, id: Uuid) -> StoreResult<Option<Site>> {
        load_site(&mut self.tx, id).await
    }

    async fn site_user_ids(&mut self, site_id: Uuid) -> StoreResult<BTreeSet<Uuid>> {
        Ok(SiteUser::user_ids_for_site(&mut self.tx, site_id).await?)
    }

    async fn remove_site_user(&mut self, site_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        Ok(SiteUser::unlink(&mut self.tx, site_id, user_id).await?)
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        User::insert(&mut self.tx, user).await?;
        if let Some(site_ids) = &user.sites {
            SiteUser::sync_user_sites(&mut self.tx, user.id, site_ids).await?;
        }
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        if !User::update(&mut self.tx, user).await? {
            return Err(StoreError::user_not_found(user.id));
        }
        if let Some(site_ids) = &user.sites {
            SiteUser::sync_user_sites(&mut self.tx, user.id, site_ids).await?;
        }
        Ok(())
    }

    async fn delete_user(&mut self, user: &User) -> StoreResult<()> {
        if !User::delete(&mut self.tx, user.id).await? {
            return Err(StoreError::user_not_found(user.id));
        }
        Ok(())
    }

    async fn save_site(&mut self, site: &Site) -> StoreResult<()> {
        Site::insert(&mut self.tx, site).await?;
        if let Some(user_ids) = &site.users {
            SiteUser::sync_site_users(&mut self.tx, site.id, user_ids).await?;
        }
        Ok(())
    }

    async fn update_site(&mut self, site: &Site) -> StoreResult<()> {
        if !Site::update(&mut self.tx, site).await? {
            return Err(StoreError::site_not_found(site.id));
        }
        if let Some(user_ids) = &site.users {
            SiteUser::sync_site_users(&mut self.tx, site.id, user_ids).await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        debug!("Committed database transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        debug!("Rolled back database transaction");
        Ok(())
    }
}
