/// Paged query results
///
/// Pages are 1-based. A page past the end is empty but still reports the
/// totals, so callers can render pagers without a second query.
///
/// # Example
///
/// ```
/// use userdir_shared::paging::PagedList;
///
/// let page = PagedList::new(vec!["a", "b"], 2, 10, 12);
/// assert_eq!(page.page_count, 2);
/// assert!(page.has_previous_page);
/// assert!(!page.has_next_page);
/// ```

use serde::{Deserialize, Serialize};

/// Page size used by directory listings
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// One page of results plus paging metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedList<T> {
    /// Items on this page
    pub items: Vec<T>,

    /// 1-based page number
    pub page_number: i64,

    /// Maximum items per page
    pub page_size: i64,

    /// Total items across all pages
    pub total_count: i64,

    /// Number of pages (0 when there are no items)
    pub page_count: i64,

    /// Whether a page precedes this one
    pub has_previous_page: bool,

    /// Whether a page follows this one
    pub has_next_page: bool,
}

impl<T> PagedList<T> {
    /// Wraps a page of items with metadata derived from the totals
    pub fn new(items: Vec<T>, page_number: i64, page_size: i64, total_count: i64) -> Self {
        let page_count = page_count(total_count, page_size);

        Self {
            items,
            page_number,
            page_size,
            total_count,
            page_count,
            has_previous_page: page_number > 1,
            has_next_page: page_number < page_count,
        }
    }

    /// Number of items on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Rows to skip before `page_number`, or `None` if that overflows `i64`
pub fn offset_for(page_number: i64, page_size: i64) -> Option<i64> {
    page_number.max(1).checked_sub(1)?.checked_mul(page_size)
}

fn page_count(total_count: i64, page_size: i64) -> i64 {
    if page_size <= 0 || total_count <= 0 {
        return 0;
    }
    (total_count + page_size - 1) / page_size
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_for() {
        assert_eq!(offset_for(1, 10), Some(0));
        assert_eq!(offset_for(2, 10), Some(10));
        assert_eq!(offset_for(5, 10), Some(40));
    }

    #[test]
    fn test_offset_for_huge_page_is_none() {
        assert_eq!(offset_for(i64::MAX, 10), None);
        assert_eq!(offset_for(i64::MAX / 10 + 2, 10), None);
        assert_eq!(offset_for(i64::MAX / 10, 10), Some((i64::MAX / 10 - 1) * 10));
    }

    #[test]
    fn test_page_count_rounds_up() {
        assert_eq!(PagedList::<u8>::new(vec![], 1, 10, 0).page_count, 0);
        assert_eq!(PagedList::<u8>::new(vec![], 1, 10, 10).page_count, 1);
        assert_eq!(PagedList::<u8>::new(vec![], 1, 10, 11).page_count, 2);
    }

    #[test]
    fn test_first_and_last_page_flags() {
        let first = PagedList::new(vec![1; 10], 1, 10, 25);
        assert!(!first.has_previous_page);
        assert!(first.has_next_page);

        let last = PagedList::new(vec![1; 5], 3, 10, 25);
        assert!(last.has_previous_page);
        assert!(!last.has_next_page);
        assert_eq!(last.len(), 5);
    }

    #[test]
    fn test_page_past_end_keeps_totals() {
        let page = PagedList::<u8>::new(vec![], 7, 10, 25);
        assert!(page.is_empty());
        assert_eq!(page.total_count, 25);
        assert_eq!(page.page_count, 3);
        assert!(!page.has_next_page);
    }
}
