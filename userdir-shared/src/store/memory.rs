/// In-memory store
///
/// Keeps users, sites, and memberships in process, mirroring the relational
/// layout of the Postgres schema: entities are stored without relations and
/// memberships live in their own set.
///
/// Sessions hold the store lock for their whole lifetime and work on a copy
/// of the state, which replaces the shared state on commit. Writers are
/// therefore serialized and a rollback (or drop) discards everything.
///
/// # Example
///
/// ```
/// use userdir_shared::store::{memory::MemoryStore, Store, UserQuery};
///
/// # async fn example() -> Result<(), userdir_shared::store::StoreError> {
/// let store = MemoryStore::new();
/// assert_eq!(store.count_users(&UserQuery::all()).await?, 0);
/// # Ok(())
/// # }
/// ```

use super::{Session, Store, StoreError, StoreResult, UserQuery};
use crate::models::{site::Site, user::User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    sites: HashMap<Uuid, Site>,
    /// (site_id, user_id)
    links: BTreeSet<(Uuid, Uuid)>,
}

impl MemoryState {
    fn site_ids_for_user(&self, user_id: Uuid) -> BTreeSet<Uuid> {
        self.links
            .iter()
            .filter(|(_, uid)| *uid == user_id)
            .map(|(sid, _)| *sid)
            .collect()
    }

    fn user_ids_for_site(&self, site_id: Uuid) -> BTreeSet<Uuid> {
        self.links
            .range((site_id, Uuid::nil())..=(site_id, Uuid::max()))
            .map(|(_, uid)| *uid)
            .collect()
    }

    fn load_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|user| User {
            sites: Some(self.site_ids_for_user(id)),
            ..user.clone()
        })
    }

    fn load_site(&self, id: Uuid) -> Option<Site> {
        self.sites.get(&id).map(|site| Site {
            users: Some(self.user_ids_for_site(id)),
            ..site.clone()
        })
    }

    fn link(&mut self, site_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        if !self.sites.contains_key(&site_id) {
            return Err(StoreError::site_not_found(site_id));
        }
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::user_not_found(user_id));
        }
        self.links.insert((site_id, user_id));
        Ok(())
    }

    fn sync_user_sites(&mut self, user_id: Uuid, site_ids: &BTreeSet<Uuid>) -> StoreResult<()> {
        self.links
            .retain(|(sid, uid)| *uid != user_id || site_ids.contains(sid));
        for site_id in site_ids {
            self.link(*site_id, user_id)?;
        }
        Ok(())
    }

    fn sync_site_users(&mut self, site_id: Uuid, user_ids: &BTreeSet<Uuid>) -> StoreResult<()> {
        self.links
            .retain(|(sid, uid)| *sid != site_id || user_ids.contains(uid));
        for user_id in user_ids {
            self.link(site_id, *user_id)?;
        }
        Ok(())
    }

    fn query(&self, query: &UserQuery) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .values()
            .filter(|user| query.matches(user))
            .cloned()
            .collect();

        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let skip = usize::try_from(query.offset).unwrap_or(0);
        let take = query
            .limit
            .map(|limit| usize::try_from(limit).unwrap_or(0))
            .unwrap_or(usize::MAX);

        users.into_iter().skip(skip).take(take).collect()
    }
}

/// In-memory implementation of [`Store`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        debug!("Opened in-memory session");

        Ok(Box::new(MemorySession { guard, working }))
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.lock().await.load_user(id))
    }

    async fn find_users(&self, query: &UserQuery) -> StoreResult<Vec<User>> {
        Ok(self.state.lock().await.query(query))
    }

    async fn count_users(&self, query: &UserQuery) -> StoreResult<i64> {
        let state = self.state.lock().await;
        let count = state.users.values().filter(|user| query.matches(user)).count();
        Ok(count as i64)
    }

    async fn get_site(&self, id: Uuid) -> StoreResult<Option<Site>> {
        Ok(self.state.lock().await.load_site(id))
    }

    async fn list_sites(&self) -> StoreResult<Vec<Site>> {
        let state = self.state.lock().await;
        let mut sites: Vec<Site> = state.sites.values().cloned().collect();
        sites.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(sites)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Session over a private copy of the store state
struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl Session for MemorySession {
    async fn get_user(&mut self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.working.load_user(id))
    }

    async fn get_site(&mut self, id: Uuid) -> StoreResult<Option<Site>> {
        Ok(self.working.load_site(id))
    }

    async fn site_user_ids(&mut self, site_id: Uuid) -> StoreResult<BTreeSet<Uuid>> {
        Ok(self.working.user_ids_for_site(site_id))
    }

    async fn remove_site_user(&mut self, site_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        self.working.links.remove(&(site_id, user_id));
        Ok(())
    }

    async fn save_user(&mut self, user: &User) -> StoreResult<()> {
        if self.working.users.contains_key(&user.id) {
            return Err(StoreError::Conflict(format!("users_pkey ({})", user.id)));
        }
        if let Some(guid) = user.reset_password_guid {
            if self
                .working
                .users
                .values()
                .any(|other| other.reset_password_guid == Some(guid))
            {
                return Err(StoreError::Conflict(
                    "users_reset_password_guid_key".to_string(),
                ));
            }
        }

        self.working.users.insert(user.id, user.without_relations());
        if let Some(site_ids) = &user.sites {
            self.working.sync_user_sites(user.id, site_ids)?;
        }
        Ok(())
    }

    async fn update_user(&mut self, user: &User) -> StoreResult<()> {
        let Some(stored) = self.working.users.get_mut(&user.id) else {
            return Err(StoreError::user_not_found(user.id));
        };

        *stored = User {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..user.without_relations()
        };

        if let Some(site_ids) = &user.sites {
            self.working.sync_user_sites(user.id, site_ids)?;
        }
        Ok(())
    }

    async fn delete_user(&mut self, user: &User) -> StoreResult<()> {
        if self.working.users.remove(&user.id).is_none() {
            return Err(StoreError::user_not_found(user.id));
        }
        self.working.links.retain(|(_, uid)| *uid != user.id);
        Ok(())
    }

    async fn save_site(&mut self, site: &Site) -> StoreResult<()> {
        if self.working.sites.contains_key(&site.id) {
            return Err(StoreError::Conflict(format!("sites_pkey ({})", site.id)));
        }

        self.working.sites.insert(site.id, site.without_relations());
        if let Some(user_ids) = &site.users {
            self.working.sync_site_users(site.id, user_ids)?;
        }
        Ok(())
    }

    async fn update_site(&mut self, site: &Site) -> StoreResult<()> {
        let Some(stored) = self.working.sites.get_mut(&site.id) else {
            return Err(StoreError::site_not_found(site.id));
        };

        *stored = Site {
            created_at: stored.created_at,
            updated_at: Utc::now(),
            ..site.without_relations()
        };

        if let Some(user_ids) = &site.users {
            self.working.sync_site_users(site.id, user_ids)?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemorySession { mut guard, working } = *self;
        *guard = working;
        debug!("Committed in-memory session");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        debug!("Rolled back in-memory session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::NewUser;
    use crate::store::ActiveFilter;

    fn user(email: &str, is_active: bool) -> User {
        User::new(NewUser {
            email: email.to_string(),
            first_name: None,
            last_name: None,
            is_active,
        })
    }

    async fn seeded() -> (MemoryStore, Site) {
        let store = MemoryStore::new();
        let site = Site::new("Main", "https://example.com");

        let mut session = store.begin().await.unwrap();
        session.save_site(&site).await.unwrap();
        session.commit().await.unwrap();

        (store, site)
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let (store, site) = seeded().await;
        let mut u = user("a@example.com", true);
        u.sites = Some(BTreeSet::from([site.id]));

        let mut session = store.begin().await.unwrap();
        session.save_user(&u).await.unwrap();
        session.commit().await.unwrap();

        let loaded = store.get_user(u.id).await.unwrap().unwrap();
        assert_eq!(loaded.email, "a@example.com");
        assert_eq!(loaded.sites, Some(BTreeSet::from([site.id])));

        let site = store.get_site(site.id).await.unwrap().unwrap();
        assert_eq!(site.users, Some(BTreeSet::from([u.id])));
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let (store, _) = seeded().await;

        let a = user("a@example.com", true);
        let mut session = store.begin().await.unwrap();
        session.save_user(&a).await.unwrap();
        session.rollback().await.unwrap();

        let b = user("b@example.com", true);
        {
            let mut session = store.begin().await.unwrap();
            session.save_user(&b).await.unwrap();
        }

        assert!(store.get_user(a.id).await.unwrap().is_none());
        assert!(store.get_user(b.id).await.unwrap().is_none());
        assert_eq!(store.count_users(&UserQuery::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_link_to_missing_site_fails() {
        let store = MemoryStore::new();
        let mut u = user("a@example.com", true);
        let missing = Uuid::new_v4();
        u.sites = Some(BTreeSet::from([missing]));

        let mut session = store.begin().await.unwrap();
        let err = session.save_user(&u).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "site", id } if id == missing));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_user() {
        let store = MemoryStore::new();
        let ghost = user("ghost@example.com", true);

        let mut session = store.begin().await.unwrap();
        assert!(matches!(
            session.update_user(&ghost).await,
            Err(StoreError::NotFound { entity: "user", .. })
        ));
        assert!(matches!(
            session.delete_user(&ghost).await,
            Err(StoreError::NotFound { entity: "user", .. })
        ));
    }

    #[tokio::test]
    async fn test_unloaded_relation_leaves_links_alone() {
        let (store, site) = seeded().await;
        let mut u = user("a@example.com", true);
        u.sites = Some(BTreeSet::from([site.id]));

        let mut session = store.begin().await.unwrap();
        session.save_user(&u).await.unwrap();
        session.commit().await.unwrap();

        let mut edited = u.clone();
        edited.sites = None;
        edited.is_active = false;

        let mut session = store.begin().await.unwrap();
        session.update_user(&edited).await.unwrap();
        let mut renamed = site.clone();
        renamed.name = "Renamed".to_string();
        session.update_site(&renamed).await.unwrap();
        session.commit().await.unwrap();

        let loaded = store.get_user(u.id).await.unwrap().unwrap();
        assert!(!loaded.is_active);
        assert_eq!(loaded.sites, Some(BTreeSet::from([site.id])));
        assert_eq!(loaded.created_at, u.created_at);
    }

    #[tokio::test]
    async fn test_delete_removes_links() {
        let (store, site) = seeded().await;
        let mut u = user("a@example.com", true);
        u.sites = Some(BTreeSet::from([site.id]));

        let mut session = store.begin().await.unwrap();
        session.save_user(&u).await.unwrap();
        session.delete_user(&u).await.unwrap();
        session.commit().await.unwrap();

        let site = store.get_site(site.id).await.unwrap().unwrap();
        assert_eq!(site.users, Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn test_query_ordering_filters_and_paging() {
        let store = MemoryStore::new();
        let mut session = store.begin().await.unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut u = user(&format!("user{}@example.com", i), i % 2 == 0);
            u.created_at += chrono::Duration::seconds(i);
            ids.push(u.id);
            session.save_user(&u).await.unwrap();
        }
        session.commit().await.unwrap();

        let all = store.find_users(&UserQuery::all()).await.unwrap();
        assert_eq!(all.iter().map(|u| u.id).collect::<Vec<_>>(), ids);

        let page = store
            .find_users(&UserQuery::all().paged(2, 2))
            .await
            .unwrap();
        assert_eq!(page.iter().map(|u| u.id).collect::<Vec<_>>(), ids[2..4]);

        let active = UserQuery::by_active(ActiveFilter::Active);
        assert_eq!(store.count_users(&active).await.unwrap(), 3);
        // counts ignore paging
        assert_eq!(store.count_users(&active.paged(1, 0)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_reset_guid_conflicts() {
        let store = MemoryStore::new();
        let mut a = user("a@example.com", true);
        let guid = a.start_password_reset(Utc::now());
        let mut b = user("b@example.com", true);
        b.reset_password_guid = Some(guid);

        let mut session = store.begin().await.unwrap();
        session.save_user(&a).await.unwrap();
        assert!(matches!(
            session.save_user(&b).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
