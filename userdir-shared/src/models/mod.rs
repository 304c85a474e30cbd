/// Database models for the user directory
///
/// This module contains the entities the directory manages and the row-level
/// SQL the Postgres store runs for them.
///
/// # Models
///
/// - `user`: User accounts, reset tokens, activation flag
/// - `site`: Sites (tenants) users belong to
/// - `site_user`: The many-to-many link between users and sites
///
/// # Example
///
/// ```
/// use userdir_shared::models::{site::Site, user::{NewUser, User}};
///
/// let site = Site::new("Main", "https://example.com");
/// let user = User::new(NewUser {
///     email: "user@example.com".to_string(),
///     first_name: None,
///     last_name: None,
///     is_active: true,
/// });
///
/// assert_ne!(site.id, user.id);
/// ```

pub mod site;
pub mod site_user;
pub mod user;
