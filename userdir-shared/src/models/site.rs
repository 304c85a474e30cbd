/// Site model and database operations
///
/// A site is the multitenancy boundary: every user belongs to one or more
/// sites via the `site_users` link table.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE sites (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     base_url VARCHAR(512) NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
///
/// # Example
///
/// ```
/// use userdir_shared::models::site::{host_of, Site};
///
/// let site = Site::new("Main", "https://www.example.com/");
/// assert_eq!(host_of(&site.base_url), "www.example.com");
/// assert!(site.serves_host("WWW.example.com"));
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use std::collections::BTreeSet;
use uuid::Uuid;

const SITE_COLUMNS: &str = "id, name, base_url, created_at, updated_at";

/// Site (tenant) model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Site {
    /// Unique site ID (UUID v4)
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Base URL the site is served from, e.g. `https://www.example.com`
    pub base_url: String,

    /// When the site was created
    pub created_at: DateTime<Utc>,

    /// When the site was last updated
    pub updated_at: DateTime<Utc>,

    /// Users belonging to this site
    ///
    /// `None` means the relation was not loaded. Persisting a site with
    /// `Some(set)` makes the stored memberships for this site equal the set.
    #[sqlx(skip)]
    #[serde(default)]
    pub users: Option<BTreeSet<Uuid>>,
}

/// Extracts the lowercased `host[:port]` authority from a URL or Host header
///
/// Scheme, path, query, and trailing slashes are dropped. Inputs without a
/// scheme are treated as bare authorities.
pub fn host_of(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };

    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

impl Site {
    /// Builds a new, not yet persisted, site with a fresh ID
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            base_url: base_url.into(),
            created_at: now,
            updated_at: now,
            users: None,
        }
    }

    /// Whether requests for `host` are served by this site
    pub fn serves_host(&self, host: &str) -> bool {
        let host = host_of(host);
        !host.is_empty() && host_of(&self.base_url) == host
    }

    /// Copy of this site with the relation stripped, as rows are stored
    pub(crate) fn without_relations(&self) -> Self {
        Self {
            users: None,
            ..self.clone()
        }
    }

    /// Inserts a new site row
    pub async fn insert(conn: &mut PgConnection, site: &Site) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sites (id, name, base_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(&site.base_url)
        .bind(site.created_at)
        .bind(site.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Finds a site by ID
    pub async fn find_by_id(conn: &mut PgConnection, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM sites WHERE id = $1", SITE_COLUMNS);

        sqlx::query_as::<_, Site>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Lists every site, oldest first
    pub async fn list(conn: &mut PgConnection) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM sites ORDER BY created_at ASC, id ASC",
            SITE_COLUMNS
        );

        sqlx::query_as::<_, Site>(&query).fetch_all(conn).await
    }

    /// Updates name and base URL of an existing site
    ///
    /// # Returns
    ///
    /// True if the row existed and was updated
    pub async fn update(conn: &mut PgConnection, site: &Site) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sites
            SET name = $2, base_url = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(site.id)
        .bind(&site.name)
        .bind(&site.base_url)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("https://Example.com/"), "example.com");
        assert_eq!(host_of("http://localhost:8080/admin?x=1"), "localhost:8080");
        assert_eq!(host_of("cms.example.org"), "cms.example.org");
        assert_eq!(host_of("  "), "");
    }

    #[test]
    fn test_serves_host() {
        let site = Site::new("Blog", "https://blog.example.com");

        assert!(site.serves_host("blog.example.com"));
        assert!(site.serves_host("BLOG.EXAMPLE.COM"));
        assert!(!site.serves_host("shop.example.com"));
        assert!(!site.serves_host(""));
    }

    #[test]
    fn test_new_site_has_unloaded_users() {
        let site = Site::new("Main", "https://example.com");
        assert!(site.users.is_none());
        assert_eq!(site.without_relations(), site);
    }
}
