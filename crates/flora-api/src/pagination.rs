//! Page arithmetic shared by list views

/// Position within a paginated list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub total: u64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(page: u32, total: u64, limit: u32) -> Self {
        Self { page, total, limit }
    }

    pub fn page_count(&self) -> u32 {
        if self.limit == 0 {
            return 0;
        }
        u32::try_from(self.total.div_ceil(u64::from(self.limit))).unwrap_or(u32::MAX)
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        1..=self.page_count()
    }

    /// Page selectors are hidden when there is nothing to page through
    pub fn is_visible(&self) -> bool {
        self.page_count() > 1
    }

    /// Page to request after the user picks `requested`.
    ///
    /// Returns `None` when no request should be issued: the page is out of
    /// range or already current.
    pub fn change_page(&self, requested: u32) -> Option<u32> {
        if requested == 0 || requested > self.page_count() || requested == self.page {
            return None;
        }
        Some(requested)
    }

    pub fn next(&self) -> Option<u32> {
        self.change_page(self.page.saturating_add(1))
    }

    pub fn prev(&self) -> Option<u32> {
        self.change_page(self.page.saturating_sub(1))
    }
}
