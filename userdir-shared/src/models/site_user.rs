/// Site membership link and database operations
///
/// This module provides the many-to-many link between users and sites.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE site_users (
///     site_id UUID NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (site_id, user_id)
/// );
/// ```
///
/// Both sides of the relation (`User::sites`, `Site::users`) are projections
/// of these rows. The `sync_*` helpers make the rows for one side match a
/// loaded set exactly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::collections::BTreeSet;
use uuid::Uuid;

/// A single user-site membership row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SiteUser {
    /// Site ID
    pub site_id: Uuid,

    /// User ID
    pub user_id: Uuid,

    /// When the membership was created
    pub created_at: DateTime<Utc>,
}

impl SiteUser {
    /// Adds a membership, ignoring one that already exists
    pub async fn link(
        conn: &mut PgConnection,
        site_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO site_users (site_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (site_id, user_id) DO NOTHING
            "#,
        )
        .bind(site_id)
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Removes a membership, if present
    pub async fn unlink(
        conn: &mut PgConnection,
        site_id: Uuid,
        user_id: Uuid,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM site_users WHERE site_id = $1 AND user_id = $2")
            .bind(site_id)
            .bind(user_id)
            .execute(conn)
            .await?;

        Ok(())
    }

    /// IDs of every site the user belongs to
    pub async fn site_ids_for_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<BTreeSet<Uuid>, sqlx::Error> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT site_id FROM site_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(conn)
            .await?;

        Ok(ids.into_iter().collect())
    }

    /// IDs of every user belonging to the site
    pub async fn user_ids_for_site(
        conn: &mut PgConnection,
        site_id: Uuid,
    ) -> Result<BTreeSet<Uuid>, sqlx::Error> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT user_id FROM site_users WHERE site_id = $1")
            .bind(site_id)
            .fetch_all(conn)
            .await?;

        Ok(ids.into_iter().collect())
    }

    /// Makes the user's memberships equal `site_ids`
    pub async fn sync_user_sites(
        conn: &mut PgConnection,
        user_id: Uuid,
        site_ids: &BTreeSet<Uuid>,
    ) -> Result<(), sqlx::Error> {
        let keep: Vec<Uuid> = site_ids.iter().copied().collect();

        sqlx::query("DELETE FROM site_users WHERE user_id = $1 AND NOT (site_id = ANY($2))")
            .bind(user_id)
            .bind(&keep)
            .execute(&mut *conn)
            .await?;

        for site_id in site_ids {
            Self::link(&mut *conn, *site_id, user_id).await?;
        }

        Ok(())
    }

    /// Makes the site's memberships equal `user_ids`
    pub async fn sync_site_users(
        conn: &mut PgConnection,
        site_id: Uuid,
        user_ids: &BTreeSet<Uuid>,
    ) -> Result<(), sqlx::Error> {
        let keep: Vec<Uuid> = user_ids.iter().copied().collect();

        sqlx::query("DELETE FROM site_users WHERE site_id = $1 AND NOT (user_id = ANY($2))")
            .bind(site_id)
            .bind(&keep)
            .execute(&mut *conn)
            .await?;

        for user_id in user_ids {
            Self::link(&mut *conn, site_id, *user_id).await?;
        }

        Ok(())
    }
}
