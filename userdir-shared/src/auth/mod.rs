/// Principal identification
///
/// The directory does not authenticate anyone. Callers present a signed token
/// naming the principal, and [`jwt`] turns it into a
/// [`crate::context::Principal`] for `UserDirectory::get_current_user`.
///
/// # Modules
///
/// - [`jwt`]: HS256 principal tokens

pub mod jwt;
