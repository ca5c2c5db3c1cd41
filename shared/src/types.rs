//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Pagination parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Pagination {
    pub const MAX_PER_PAGE: u32 = 100;

    /// Page size clamped to 1..=MAX_PER_PAGE
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page.clamp(1, Self::MAX_PER_PAGE))
    }

    /// Row offset of the first item on the page (pages start at 1)
    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * self.limit()
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: &Pagination, total_items: u64) -> Self {
        let per_page = pagination.limit() as u64;
        Self {
            data,
            pagination: PaginationMeta {
                page: pagination.page.max(1),
                per_page: per_page as u32,
                total_items,
                total_pages: total_items.div_ceil(per_page) as u32,
            },
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_and_limit() {
        let p = Pagination { page: 3, per_page: 20 };
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 40);

        let clamped = Pagination { page: 0, per_page: 500 };
        assert_eq!(clamped.limit(), 100);
        assert_eq!(clamped.offset(), 0);
    }

    #[test]
    fn test_total_pages() {
        let response = PaginatedResponse::new(vec![1, 2], &Pagination::default(), 41);
        assert_eq!(response.pagination.total_pages, 3);

        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], &Pagination::default(), 0);
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
