//! Offset paging for library listings

use serde::{Deserialize, Serialize};

/// Zero-based page of a listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// ```
    /// use core_library::repositories::PageRequest;
    ///
    /// let request = PageRequest::new(2, 25);
    /// assert_eq!(request.offset(), 50);
    /// assert_eq!(request.limit(), 25);
    /// ```
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

/// One page of rows plus the size of the whole listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Rows across all pages
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, request: PageRequest) -> Self {
        let total_pages = match request.page_size {
            0 => 0,
            size => u32::try_from(total.div_ceil(u64::from(size))).unwrap_or(u32::MAX),
        };

        Self {
            items,
            total,
            page: request.page,
            page_size: request.page_size,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page::new(vec!["Help!"; 10], 25, PageRequest::new(0, 10));
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
        assert!(!page.has_previous());

        let last = Page::new(vec!["Help!"; 5], 25, PageRequest::new(2, 10));
        assert!(!last.has_next());
        assert!(last.has_previous());
    }

    #[test]
    fn test_empty_listing() {
        let page: Page<i64> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next());

        let zero_sized: Page<i64> = Page::new(vec![], 12, PageRequest::new(0, 0));
        assert_eq!(zero_sized.total_pages, 0);
    }

    #[test]
    fn test_map_keeps_paging() {
        let page = Page::new(vec![1i64, 2], 4, PageRequest::new(1, 2)).map(|id| id * 10);
        assert_eq!(page.items, vec![10, 20]);
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 2);
    }
}
