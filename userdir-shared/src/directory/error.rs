use crate::store::StoreError;

/// Directory error types
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Storage or transaction failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// More than one row matched a lookup that expects at most one
    #[error("Expected at most one user for {lookup}, found {count}")]
    AmbiguousResult {
        /// Which lookup was ambiguous, e.g. `email a@example.com`
        lookup: String,
        /// Number of matching rows seen
        count: usize,
    },

    /// Page numbers are 1-based
    #[error("Invalid page number {0}, pages start at 1")]
    InvalidPage(i64),

    /// No site could be resolved for the request
    #[error("No site found for host {host:?}")]
    SiteNotFound {
        /// Request host, if any
        host: Option<String>,
    },
}

impl DirectoryError {
    /// Whether the error means the addressed entity does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DirectoryError::Store(StoreError::NotFound { .. }) | DirectoryError::SiteNotFound { .. }
        )
    }
}

/// Directory result type alias
pub type DirectoryResult<T> = Result<T, DirectoryError>;
