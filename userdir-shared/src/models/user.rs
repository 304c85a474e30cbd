/// User model and database operations
///
/// This module provides the User model and the row-level operations the
/// Postgres store runs inside its sessions. Users can belong to multiple sites
/// via the `site_users` link table (see [`super::site_user`]).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     email TEXT NOT NULL,
///     first_name VARCHAR(255),
///     last_name VARCHAR(255),
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     reset_password_guid UUID UNIQUE,
///     reset_password_expiry TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// Email is indexed but not unique-constrained; uniqueness is checked by
/// `UserDirectory::is_unique_email` before accounts are created or edited.
///
/// # Example
///
/// ```
/// use userdir_shared::models::user::{NewUser, User};
///
/// let user = User::new(NewUser {
///     email: "  editor@example.com ".to_string(),
///     first_name: Some("Ada".to_string()),
///     last_name: None,
///     is_active: true,
/// });
///
/// assert_eq!(user.email, "editor@example.com");
/// assert!(user.sites.is_none());
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Column list shared by every user query
pub(crate) const USER_COLUMNS: &str = "id, email, first_name, last_name, is_active, \
     reset_password_guid, reset_password_expiry, created_at, updated_at";

/// User model representing an account in the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v4, generated on construction)
    pub id: Uuid,

    /// Email address, the secondary natural key
    pub email: String,

    /// Optional first name
    pub first_name: Option<String>,

    /// Optional last name
    pub last_name: Option<String>,

    /// Whether the account is active
    pub is_active: bool,

    /// Password reset token, if a reset is pending
    pub reset_password_guid: Option<Uuid>,

    /// When the pending reset token stops being accepted
    pub reset_password_expiry: Option<DateTime<Utc>>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,

    /// Sites this user belongs to
    ///
    /// `None` means the relation was not loaded. Persisting a user with
    /// `Some(set)` makes the stored memberships for this user equal the set.
    #[sqlx(skip)]
    #[serde(default)]
    pub sites: Option<BTreeSet<Uuid>>,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    /// Email address (surrounding whitespace is trimmed)
    pub email: String,

    /// Optional first name
    pub first_name: Option<String>,

    /// Optional last name
    pub last_name: Option<String>,

    /// Whether the account starts active
    pub is_active: bool,
}

/// Trims an email address the way every lookup and write does
pub fn normalize_email(email: &str) -> &str {
    email.trim()
}

impl User {
    /// Builds a new, not yet persisted, user with a fresh ID
    pub fn new(data: NewUser) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            email: normalize_email(&data.email).to_string(),
            first_name: data.first_name,
            last_name: data.last_name,
            is_active: data.is_active,
            reset_password_guid: None,
            reset_password_expiry: None,
            created_at: now,
            updated_at: now,
            sites: None,
        }
    }

    /// Issues a new password reset token valid until `expiry`
    pub fn start_password_reset(&mut self, expiry: DateTime<Utc>) -> Uuid {
        let guid = Uuid::new_v4();
        self.reset_password_guid = Some(guid);
        self.reset_password_expiry = Some(expiry);
        guid
    }

    /// Whether the pending reset token is still accepted at `now`
    ///
    /// A token is accepted while its expiry is at or after `now`. A user
    /// without an expiry never matches.
    pub fn reset_token_valid_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.reset_password_expiry, Some(expiry) if expiry >= now)
    }

    /// Copy of this user with the relation stripped, as rows are stored
    pub(crate) fn without_relations(&self) -> Self {
        Self {
            sites: None,
            ..self.clone()
        }
    }

    /// Inserts a new user row
    ///
    /// # Errors
    ///
    /// Returns an error if the ID or reset token already exists, or if the
    /// database connection fails.
    pub async fn insert(conn: &mut PgConnection, user: &User) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, first_name, last_name, is_active,
                               reset_password_guid, reset_password_expiry,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.reset_password_guid)
        .bind(user.reset_password_expiry)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Finds a user row by ID
    ///
    /// The `sites` relation is left unloaded.
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Overwrites every column of an existing user row
    ///
    /// `updated_at` is set to the current time.
    ///
    /// # Returns
    ///
    /// True if the row existed and was updated
    pub async fn update(conn: &mut PgConnection, user: &User) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2,
                first_name = $3,
                last_name = $4,
                is_active = $5,
                reset_password_guid = $6,
                reset_password_expiry = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.is_active)
        .bind(user.reset_password_guid)
        .bind(user.reset_password_expiry)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deletes a user row by ID
    ///
    /// Memberships are removed by the `ON DELETE CASCADE` on `site_users`.
    ///
    /// # Returns
    ///
    /// True if user was deleted, false if user didn't exist
    pub async fn delete(conn: &mut PgConnection, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample() -> User {
        User::new(NewUser {
            email: "test@example.com".to_string(),
            first_name: None,
            last_name: None,
            is_active: true,
        })
    }

    #[test]
    fn test_new_user_trims_email() {
        let user = User::new(NewUser {
            email: "\t test@example.com  ".to_string(),
            first_name: None,
            last_name: None,
            is_active: false,
        });

        assert_eq!(user.email, "test@example.com");
        assert!(!user.is_active);
        assert_eq!(user.created_at, user.updated_at);
        assert!(user.reset_password_guid.is_none());
    }

    #[test]
    fn test_reset_token_validity_window() {
        let mut user = sample();
        let now = Utc::now();
        assert!(!user.reset_token_valid_at(now));

        let expiry = now + Duration::hours(1);
        let guid = user.start_password_reset(expiry);
        assert_eq!(user.reset_password_guid, Some(guid));

        assert!(user.reset_token_valid_at(now));
        assert!(user.reset_token_valid_at(expiry));
        assert!(!user.reset_token_valid_at(expiry + Duration::seconds(1)));
    }

    #[test]
    fn test_without_relations() {
        let mut user = sample();
        user.sites = Some(BTreeSet::from([Uuid::new_v4()]));

        let stored = user.without_relations();
        assert!(stored.sites.is_none());
        assert_eq!(stored.id, user.id);
    }

    // Postgres round trips live in tests/postgres_store_tests.rs
}
