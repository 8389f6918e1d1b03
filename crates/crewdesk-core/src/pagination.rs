use serde::Serialize;

/// 1-based page window for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    /// Pages below 1 (or absent) clamp to the first page.
    #[must_use]
    pub fn new(page: Option<u32>, per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.max(1),
        }
    }

    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }

    /// Total page count for `total` rows; zero rows means zero pages.
    #[must_use]
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        let per_page = i64::from(self.per_page);
        (total + per_page - 1) / per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_zero_page_is_first_page() {
        assert_eq!(Pagination::new(None, 10).page, 1);
        assert_eq!(Pagination::new(Some(0), 10).page, 1);
        assert_eq!(Pagination::new(Some(0), 10).offset(), 0);
    }

    #[test]
    fn offset_advances_by_page_size() {
        let p = Pagination::new(Some(3), 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(None, 10);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(1), 1);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);
    }
}
