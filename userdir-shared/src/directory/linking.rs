use crate::models::{site::Site, user::User};
use std::collections::BTreeSet;

/// Makes `user` and `site` reference each other
///
/// Unloaded collections are initialised to empty sets first, so the caller
/// must load `site.users` beforehand if existing memberships are to be kept.
/// Calling it twice has the same effect as calling it once.
pub fn link_user_to_site(user: &mut User, site: &mut Site) {
    user.sites.get_or_insert_with(BTreeSet::new).insert(site.id);
    site.users.get_or_insert_with(BTreeSet::new).insert(user.id);
}
