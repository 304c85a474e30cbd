use super::error::{DirectoryError, DirectoryResult};
use crate::context::RequestContext;
use crate::models::site::Site;
use crate::store::Store;
use async_trait::async_trait;
use uuid::Uuid;

/// Determines which site a request belongs to
#[async_trait]
pub trait SiteResolver: Send + Sync {
    /// The site serving `ctx`, with its `users` relation loaded
    async fn current_site(&self, store: &dyn Store, ctx: &RequestContext) -> DirectoryResult<Site>;
}

/// Always resolves to one configured site
#[derive(Debug, Clone, Copy)]
pub struct FixedSiteResolver {
    site_id: Uuid,
}

impl FixedSiteResolver {
    pub fn new(site_id: Uuid) -> Self {
        Self { site_id }
    }
}

#[async_trait]
impl SiteResolver for FixedSiteResolver {
    async fn current_site(&self, store: &dyn Store, ctx: &RequestContext) -> DirectoryResult<Site> {
        store
            .get_site(self.site_id)
            .await?
            .ok_or_else(|| DirectoryError::SiteNotFound {
                host: ctx.host.clone(),
            })
    }
}

/// Matches the request host against each site's base URL
///
/// Falls back to the oldest site when no base URL matches, or when the
/// request carries no host.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSiteResolver;

#[async_trait]
impl SiteResolver for HostSiteResolver {
    async fn current_site(&self, store: &dyn Store, ctx: &RequestContext) -> DirectoryResult<Site> {
        let sites = store.list_sites().await?;

        let matched = ctx
            .host
            .as_deref()
            .and_then(|host| sites.iter().find(|site| site.serves_host(host)))
            .or_else(|| sites.first());

        let Some(site) = matched else {
            return Err(DirectoryError::SiteNotFound {
                host: ctx.host.clone(),
            });
        };

        // Reload so the membership set comes with it
        store
            .get_site(site.id)
            .await?
            .ok_or_else(|| DirectoryError::SiteNotFound {
                host: ctx.host.clone(),
            })
    }
}
