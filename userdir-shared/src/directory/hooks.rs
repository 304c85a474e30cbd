use crate::models::user::User;
use crate::store::{Session, StoreResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

/// Runs inside the delete transaction before the user row is removed
#[async_trait]
pub trait UserDeletionHook: Send + Sync {
    /// Prepares `user` for deletion; an error aborts the delete
    async fn on_deleting(&self, session: &mut dyn Session, user: &mut User) -> StoreResult<()>;
}

/// Removes the user from every site it belongs to
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachFromSites;

#[async_trait]
impl UserDeletionHook for DetachFromSites {
    async fn on_deleting(&self, session: &mut dyn Session, user: &mut User) -> StoreResult<()> {
        // The caller's copy may predate memberships added since
        let mut site_ids = user.sites.take().unwrap_or_default();
        if let Some(stored) = session.get_user(user.id).await? {
            site_ids.extend(stored.sites.unwrap_or_default());
        }

        for site_id in site_ids {
            session.remove_site_user(site_id, user.id).await?;
            debug!(user_id = %user.id, site_id = %site_id, "Detached user from site");
        }

        user.sites = Some(BTreeSet::new());
        Ok(())
    }
}

/// Deletion hook that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDeletionHook;

#[async_trait]
impl UserDeletionHook for NoopDeletionHook {
    async fn on_deleting(&self, _session: &mut dyn Session, _user: &mut User) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::linking::link_user_to_site;
    use crate::models::{site::Site, user::NewUser};
    use crate::store::{memory::MemoryStore, Store};

    #[tokio::test]
    async fn test_detach_from_sites_clears_both_sides() {
        let store = MemoryStore::new();
        let mut site = Site::new("Main", "https://example.com");
        let mut user = User::new(NewUser {
            email: "a@example.com".to_string(),
            first_name: None,
            last_name: None,
            is_active: true,
        });

        let mut session = store.begin().await.unwrap();
        session.save_site(&site).await.unwrap();
        link_user_to_site(&mut user, &mut site);
        session.save_user(&user).await.unwrap();
        session.commit().await.unwrap();

        // Relation unloaded: the hook loads it from the session
        user.sites = None;
        let mut session = store.begin().await.unwrap();
        DetachFromSites
            .on_deleting(session.as_mut(), &mut user)
            .await
            .unwrap();
        session.commit().await.unwrap();

        assert_eq!(user.sites, Some(BTreeSet::new()));
        let stored_site = store.get_site(site.id).await.unwrap().unwrap();
        assert_eq!(stored_site.users, Some(BTreeSet::new()));
    }
}
