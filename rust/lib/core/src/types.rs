use serde::{Deserialize, Serialize};

/// Smallest page size a caller may request.
pub const MIN_PER_PAGE: usize = 5;

/// Largest page size a caller may request.
pub const MAX_PER_PAGE: usize = 50;

/// Default page size when the caller gives none.
pub const DEFAULT_PER_PAGE: usize = 10;

/// Page number and size for offset pagination.
///
/// Always holds clamped values: `page >= 1`, `per_page` within
/// [`MIN_PER_PAGE`, `MAX_PER_PAGE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page: usize,
    per_page: usize,
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = page.max(1) as usize;
        let per_page = per_page.clamp(MIN_PER_PAGE as i64, MAX_PER_PAGE as i64) as usize;
        Self { page, per_page }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> usize {
        (self.page - 1) * self.per_page
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PER_PAGE as i64)
    }
}

/// One page of results plus the total row count for the filter set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
}

impl<T: Serialize> Page<T> {
    /// An empty page for a filter set that matched nothing.
    pub fn empty(req: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: req.page(),
            per_page: req.per_page(),
        }
    }

    /// Number of pages needed to show `total` rows.
    pub fn page_count(&self) -> usize {
        self.total.div_ceil(self.per_page.max(1))
    }
}

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
